use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use bytes::Bytes;
use tokio::{runtime::Handle, time::timeout};

use crate::defer;
use crate::proto::rpc_types::{
    controller::Controller,
    error::{Result, TransportError},
};

use super::{handle_cache::MethodHandle, server::Server, RpcController};

/// The transport a stub sends its calls through.
#[async_trait::async_trait]
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait Channel: Send + Sync + 'static {
    /// Send one encoded request to `handle`'s route and wait for its encoded response.
    async fn unary_call(
        &self,
        handle: Arc<MethodHandle>,
        ctrl: RpcController,
        input: Bytes,
    ) -> Result<Bytes>;
}

/// A transport plus the call options and runtime stubs derived from it use.
///
/// Never mutated; `with_options` builds a new handle sharing the same transport.
#[derive(Clone)]
pub struct ChannelHandle {
    transport: Arc<dyn Channel>,
    options: RpcController,
    runtime: Handle,
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("options", &self.options)
            .finish()
    }
}

impl ChannelHandle {
    /// Bind `transport` to the tokio runtime of the calling context.
    pub fn new(transport: Arc<dyn Channel>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(TransportError::from)?;
        Ok(Self::with_runtime(transport, runtime))
    }

    pub fn with_runtime(transport: Arc<dyn Channel>, runtime: Handle) -> Self {
        Self {
            transport,
            options: RpcController::default(),
            runtime,
        }
    }

    pub fn with_options(&self, options: RpcController) -> Self {
        Self {
            transport: self.transport.clone(),
            options,
            runtime: self.runtime.clone(),
        }
    }

    pub fn options(&self) -> &RpcController {
        &self.options
    }

    pub fn transport(&self) -> &Arc<dyn Channel> {
        &self.transport
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

/// In-process transport that hands calls straight to a [`Server`].
pub struct LocalChannel {
    server: Arc<Server>,
    closed: AtomicBool,
    inflight: Arc<AtomicUsize>,
}

impl LocalChannel {
    pub fn new(server: Arc<Server>) -> Self {
        Self {
            server,
            closed: AtomicBool::new(false),
            inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Refuse every later call with `TransportError::Shutdown`.
    pub fn shutdown(&self) {
        tracing::info!("local channel shutdown");
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Channel for LocalChannel {
    async fn unary_call(
        &self,
        handle: Arc<MethodHandle>,
        ctrl: RpcController,
        input: Bytes,
    ) -> Result<Bytes> {
        if self.is_shutdown() {
            return Err(TransportError::Shutdown.into());
        }

        self.inflight.fetch_add(1, Ordering::Relaxed);
        let inflight = self.inflight.clone();
        defer!(inflight.fetch_sub(1, Ordering::Relaxed););

        let route = handle.full_method_name();
        let timeout_dur = std::time::Duration::from_millis(ctrl.timeout_ms().max(0) as u64);
        tracing::trace!(%route, trace_id = ctrl.trace_id(), len = input.len(), "send rpc");

        let ret = timeout(
            timeout_dur,
            self.server.handle_rpc_request(route, ctrl, input),
        )
        .await;

        match ret {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%route, "rpc timed out");
                Err(TransportError::Timeout(e).into())
            }
        }
    }
}

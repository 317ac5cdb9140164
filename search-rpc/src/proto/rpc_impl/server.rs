use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bytes::Bytes;
use tokio::time::timeout;

use crate::defer;
use crate::proto::rpc_types::{controller::Controller, error::Result};

use super::{service_registry::ServiceRegistry, RpcController};

pub struct Server {
    registry: Arc<ServiceRegistry>,
    inflight: Arc<AtomicUsize>,
}

impl Server {
    pub fn new() -> Self {
        Server::new_with_registry(Arc::new(ServiceRegistry::new()))
    }

    pub fn new_with_registry(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Run one request against the registry, bounded by the caller's timeout.
    pub async fn handle_rpc_request(
        &self,
        route: &str,
        ctrl: RpcController,
        input: Bytes,
    ) -> Result<Bytes> {
        let timeout_duration = std::time::Duration::from_millis(ctrl.timeout_ms().max(0) as u64);
        let trace_id = ctrl.trace_id();

        self.inflight.fetch_add(1, Ordering::Relaxed);
        let inflight = self.inflight.clone();
        defer!(inflight.fetch_sub(1, Ordering::Relaxed););

        let now = std::time::Instant::now();
        let ret = timeout(
            timeout_duration,
            self.registry.call_method(route, ctrl, input),
        )
        .await;
        let runtime_us = now.elapsed().as_micros() as u64;

        match &ret {
            Ok(Ok(_)) => tracing::trace!(%route, trace_id, runtime_us, "rpc handled"),
            Ok(Err(err)) => tracing::debug!(%route, trace_id, runtime_us, ?err, "rpc failed"),
            Err(_) => tracing::warn!(%route, trace_id, runtime_us, "rpc handler timed out"),
        }

        ret?
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.load(Ordering::Relaxed)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

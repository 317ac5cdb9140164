//! Client stubs.
//!
//! One call core, [`StubCore`], resolves the method handle and drives the transport; the three stub
//! styles only differ in how they hand its single outcome back to the caller.
use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;

use crate::proto::rpc_types::{
    __rt,
    descriptor::{full_method_name, ServiceDefinition},
    error::{Result, TransportError},
    handler::{SinkGuard, UnarySink},
};

use super::{
    channel::ChannelHandle,
    future::UnaryFuture,
    handle_cache::{HandleCache, MethodHandle},
    RpcController,
};

/// Channel and service definition shared by every stub style.
#[derive(Clone)]
pub struct StubCore {
    channel: ChannelHandle,
    definition: Arc<ServiceDefinition>,
    cache: &'static HandleCache,
}

impl std::fmt::Debug for StubCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubCore")
            .field("service", &self.definition.name())
            .field("channel", &self.channel)
            .finish()
    }
}

impl StubCore {
    pub fn new(channel: ChannelHandle, definition: Arc<ServiceDefinition>) -> Self {
        Self {
            channel,
            definition,
            cache: HandleCache::global(),
        }
    }

    pub fn with_options(&self, options: RpcController) -> Self {
        Self {
            channel: self.channel.with_options(options),
            definition: self.definition.clone(),
            cache: self.cache,
        }
    }

    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    pub fn definition(&self) -> &Arc<ServiceDefinition> {
        &self.definition
    }

    /// Resolve the process-wide handle for `method`, building it on first use.
    pub fn prepare(&self, method: &str) -> Result<Arc<MethodHandle>> {
        self.cache.handle_for(&self.definition, method)
    }

    /// The full call for `method`, ready to be driven by any stub style.
    fn invocation<I, O>(
        &self,
        method: &str,
        input: I,
    ) -> Result<(String, impl Future<Output = Result<O>> + Send + 'static)>
    where
        I: prost::Message + Send + 'static,
        O: prost::Message + Default + Send + 'static,
    {
        let handle = self.prepare(method)?;
        let route = handle.full_method_name().to_string();
        let span = if handle.is_sampled_to_local_tracing() {
            tracing::info_span!("rpc_call", route = %route)
        } else {
            tracing::Span::none()
        };

        let transport = self.channel.transport().clone();
        let ctrl = self.channel.options().clone();
        let fut = async move { __rt::call_method(transport, handle, ctrl, input).await }
            .instrument(span);
        Ok((route, fut))
    }
}

/// Stub whose calls block the calling thread until the response arrives.
///
/// Must be used from a thread that is not driving a tokio runtime; from inside one, calls fail with
/// `TransportError::BlockingInRuntime`.
#[derive(Clone, Debug)]
pub struct BlockingStub {
    core: StubCore,
}

impl BlockingStub {
    pub fn new(channel: ChannelHandle, definition: Arc<ServiceDefinition>) -> Self {
        Self {
            core: StubCore::new(channel, definition),
        }
    }

    pub fn with_options(&self, options: RpcController) -> Self {
        Self {
            core: self.core.with_options(options),
        }
    }

    pub fn core(&self) -> &StubCore {
        &self.core
    }

    pub fn call<I, O>(&self, method: &str, input: I) -> Result<O>
    where
        I: prost::Message + Send + 'static,
        O: prost::Message + Default + Send + 'static,
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(TransportError::BlockingInRuntime.into());
        }

        let (route, fut) = self.core.invocation(method, input)?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.core.channel.runtime().spawn(async move {
            let _ = tx.send(fut.await);
        });

        rx.blocking_recv().map_err(|_| {
            TransportError::Disconnected(format!("call task for {} ended without a result", route))
        })?
    }
}

/// Stub whose calls return immediately and report their outcome to a sink.
#[derive(Clone, Debug)]
pub struct AsyncStub {
    core: StubCore,
}

impl AsyncStub {
    pub fn new(channel: ChannelHandle, definition: Arc<ServiceDefinition>) -> Self {
        Self {
            core: StubCore::new(channel, definition),
        }
    }

    pub fn with_options(&self, options: RpcController) -> Self {
        Self {
            core: self.core.with_options(options),
        }
    }

    pub fn core(&self) -> &StubCore {
        &self.core
    }

    /// Start the call; `sink` receives exactly one outcome, on a runtime worker, never on the
    /// calling thread. If the runtime drops the call first, the outcome is `Disconnected`.
    pub fn call<I, O, S>(&self, method: &str, input: I, sink: S)
    where
        I: prost::Message + Send + 'static,
        O: prost::Message + Default + Send + 'static,
        S: UnarySink<O>,
    {
        let runtime = self.core.channel.runtime();
        match self.core.invocation(method, input) {
            Ok((route, fut)) => {
                let guard = SinkGuard::new(route, sink);
                runtime.spawn(async move {
                    guard.deliver(fut.await);
                });
            }
            Err(e) => {
                let route = full_method_name(self.core.definition.name(), method);
                let guard = SinkGuard::new(route, sink);
                runtime.spawn(async move {
                    guard.deliver(Err(e));
                });
            }
        }
    }
}

/// Stub whose calls return a cancellable [`UnaryFuture`].
#[derive(Clone, Debug)]
pub struct FutureStub {
    core: StubCore,
}

impl FutureStub {
    pub fn new(channel: ChannelHandle, definition: Arc<ServiceDefinition>) -> Self {
        Self {
            core: StubCore::new(channel, definition),
        }
    }

    pub fn with_options(&self, options: RpcController) -> Self {
        Self {
            core: self.core.with_options(options),
        }
    }

    pub fn core(&self) -> &StubCore {
        &self.core
    }

    pub fn call<I, O>(&self, method: &str, input: I) -> UnaryFuture<O>
    where
        I: prost::Message + Send + 'static,
        O: prost::Message + Default + Send + 'static,
    {
        match self.core.invocation(method, input) {
            Ok((route, fut)) => UnaryFuture::spawn(self.core.channel.runtime(), route, fut),
            Err(e) => UnaryFuture::ready(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::proto::rpc_impl::{
        channel::LocalChannel, server::Server, service_registry::BoundService,
    };
    use crate::proto::rpc_types::{
        descriptor::MethodDefinition, error::Error, handler::unary_handler,
    };

    #[derive(Clone, PartialEq, prost::Message)]
    struct Num {
        #[prost(int64, tag = "1")]
        value: i64,
    }

    fn definition() -> Arc<ServiceDefinition> {
        ServiceDefinition::define(
            "test.Math",
            vec![
                MethodDefinition::unary("Double", "test.Num", "test.Num")
                    .sampled_to_local_tracing(true),
                MethodDefinition::unary("Slow", "test.Num", "test.Num"),
            ],
        )
        .unwrap()
    }

    fn local_channel(runtime: tokio::runtime::Handle) -> ChannelHandle {
        let server = Arc::new(Server::new());
        server.registry().register(
            BoundService::builder(definition())
                .add_unary(
                    "Double",
                    unary_handler(|_ctrl, req: Num| async move {
                        Ok(Num {
                            value: req.value * 2,
                        })
                    }),
                )
                .unwrap()
                .add_unary(
                    "Slow",
                    unary_handler(|_ctrl, req: Num| async move {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        Ok(req)
                    }),
                )
                .unwrap()
                .build(),
        );
        ChannelHandle::with_runtime(Arc::new(LocalChannel::new(server)), runtime)
    }

    #[test]
    fn blocking_call_outside_runtime() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let stub = BlockingStub::new(local_channel(rt.handle().clone()), definition());

        let out: Num = stub.call("Double", Num { value: 21 }).unwrap();
        assert_eq!(out.value, 42);

        let ret: Result<Num> = stub.call("Triple", Num { value: 1 });
        assert!(matches!(ret, Err(Error::MethodNotFound(route)) if route == "test.Math/Triple"));
    }

    #[tokio::test]
    async fn async_call_delivers_to_sink() {
        let stub = AsyncStub::new(
            local_channel(tokio::runtime::Handle::current()),
            definition(),
        );

        let (tx, rx) = tokio::sync::oneshot::channel();
        stub.call::<_, Num, _>("Double", Num { value: 5 }, move |r: Result<Num>| {
            let _ = tx.send(r);
        });
        assert_eq!(rx.await.unwrap().unwrap().value, 10);

        let (tx, rx) = tokio::sync::oneshot::channel();
        stub.call::<_, Num, _>("Nope", Num { value: 5 }, move |r: Result<Num>| {
            let _ = tx.send(r);
        });
        assert!(matches!(rx.await.unwrap(), Err(Error::MethodNotFound(_))));
    }

    #[tokio::test]
    async fn async_call_never_delivers_on_calling_thread() {
        let stub = AsyncStub::new(
            local_channel(tokio::runtime::Handle::current()),
            definition(),
        );

        let delivered = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let flag = delivered.clone();
        stub.call::<_, Num, _>("Nope", Num { value: 5 }, move |r: Result<Num>| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            let _ = tx.send(r);
        });
        assert!(!delivered.load(std::sync::atomic::Ordering::SeqCst));
        assert!(matches!(rx.await.unwrap(), Err(Error::MethodNotFound(_))));
    }

    #[test]
    fn async_call_dropped_by_runtime_shutdown_reports_disconnect() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let stub = AsyncStub::new(local_channel(rt.handle().clone()), definition());

        let (tx, rx) = std::sync::mpsc::channel();
        stub.call::<_, Num, _>("Slow", Num { value: 1 }, move |r: Result<Num>| {
            let _ = tx.send(r);
        });
        rt.shutdown_timeout(Duration::from_millis(10));

        let ret = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            ret,
            Err(Error::TransportError(TransportError::Disconnected(_)))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocking_call_inside_runtime_is_rejected() {
        let stub = BlockingStub::new(
            local_channel(tokio::runtime::Handle::current()),
            definition(),
        );
        let ret: Result<Num> = stub.call("Double", Num { value: 1 });
        assert!(matches!(
            ret,
            Err(Error::TransportError(TransportError::BlockingInRuntime))
        ));
    }

    #[tokio::test]
    async fn future_call_times_out_with_short_deadline() {
        let stub = FutureStub::new(
            local_channel(tokio::runtime::Handle::current()),
            definition(),
        );
        let hasty = stub.with_options(RpcController::default().with_timeout_ms(50));

        let ret: Result<Num> = hasty.call("Slow", Num { value: 1 }).await;
        assert!(matches!(
            ret,
            Err(Error::TransportError(TransportError::Timeout(_)))
        ));

        let out: Num = stub.call("Double", Num { value: 4 }).await.unwrap();
        assert_eq!(out.value, 8);
        assert_eq!(stub.core().channel().options().timeout_ms, 5000);
    }
}

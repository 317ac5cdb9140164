//! Traits and adapters for server-side RPC handlers.
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;

use super::{
    __rt,
    controller::BaseController,
    descriptor::ServiceDefinition,
    error::{Error, Result, TransportError},
};

/// A boxed, `'static` future resolving to an RPC result.
pub type RpcFuture<T> = BoxFuture<'static, Result<T>>;

/// The uniform invocation closure a bound method is stored as.
pub type MethodHandler = Arc<dyn Fn(BaseController, Bytes) -> RpcFuture<Bytes> + Send + Sync>;

/// Receives the single outcome of a unary call.
///
/// Taking `self` by value is what makes the unary contract hold: a sink can be completed once.
pub trait UnarySink<T>: Send + 'static {
    fn deliver(self, result: Result<T>);
}

impl<T, F> UnarySink<T> for F
where
    F: FnOnce(Result<T>) + Send + 'static,
{
    fn deliver(self, result: Result<T>) {
        self(result)
    }
}

/// Owns a sink until the call it belongs to produces its outcome.
///
/// If the guard is dropped first, e.g. because the runtime dropped the call task, the sink still
/// receives `TransportError::Disconnected`.
pub struct SinkGuard<T, S: UnarySink<T>> {
    sink: Option<S>,
    route: String,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T, S: UnarySink<T>> SinkGuard<T, S> {
    pub fn new(route: impl Into<String>, sink: S) -> Self {
        Self {
            sink: Some(sink),
            route: route.into(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn deliver(mut self, result: Result<T>) {
        if let Some(sink) = self.sink.take() {
            sink.deliver(result);
        }
    }
}

impl<T, S: UnarySink<T>> Drop for SinkGuard<T, S> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            tracing::debug!(route = %self.route, "call dropped before completion");
            sink.deliver(Err(TransportError::Disconnected(format!(
                "call task for {} ended without a result",
                self.route
            ))
            .into()));
        }
    }
}

/// An implementation of a raw RPC handler for a whole service.
///
/// This can be an actual implementation of a service, or something that will forward a request
/// elsewhere to fulfill it.
#[async_trait::async_trait]
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait Handler: Send + Sync + 'static {
    /// The definition of the service whose requests this handler can handle.
    fn service_definition(&self) -> Arc<ServiceDefinition>;

    /// Perform a raw call to the specified method.
    async fn call(&self, ctrl: BaseController, method: &str, input: Bytes) -> Result<Bytes>;
}

/// Wrap a typed handler into a [`MethodHandler`].
///
/// The adapter decodes the request, invokes `f` once and encodes its single result.
pub fn unary_handler<I, O, F, Fut>(f: F) -> MethodHandler
where
    I: prost::Message + Default + 'static,
    O: prost::Message + 'static,
    F: Fn(BaseController, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    Arc::new(move |ctrl, input| {
        let decoded: Result<I> = __rt::decode(input);
        let fut = decoded.map(|req| f(ctrl, req));
        Box::pin(async move { __rt::encode(fut?.await?) })
    })
}

/// The handler bound to methods an implementation does not provide.
pub fn unimplemented_handler(route: String) -> MethodHandler {
    Arc::new(move |_ctrl, _input| {
        let route = route.clone();
        Box::pin(async move { Err(Error::Unimplemented(route)) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Echo {
        #[prost(string, tag = "1")]
        text: String,
    }

    #[tokio::test]
    async fn unary_handler_decodes_invokes_and_encodes() {
        let h = unary_handler(|_ctrl, req: Echo| async move {
            Ok(Echo {
                text: format!("{}!", req.text),
            })
        });

        let input = __rt::encode(Echo {
            text: "hi".to_string(),
        })
        .unwrap();
        let out = h(BaseController::default(), input).await.unwrap();
        let out: Echo = __rt::decode(out).unwrap();
        assert_eq!(out.text, "hi!");
    }

    #[tokio::test]
    async fn unary_handler_reports_malformed_input() {
        let h = unary_handler(|_ctrl, req: Echo| async move { Ok(req) });
        let ret = h(BaseController::default(), Bytes::from_static(&[0xff, 0xff])).await;
        assert!(matches!(ret, Err(Error::DecodeError(_))));
    }

    #[tokio::test]
    async fn unimplemented_handler_names_the_route() {
        let h = unimplemented_handler("svc/Method".to_string());
        let ret = h(BaseController::default(), Bytes::new()).await;
        assert!(matches!(ret, Err(Error::Unimplemented(route)) if route == "svc/Method"));
    }

    #[test]
    fn dropped_guard_reports_disconnect() {
        let (tx, rx) = std::sync::mpsc::channel();
        let guard = SinkGuard::new("svc/M", move |r: Result<u32>| tx.send(r).unwrap());
        drop(guard);
        assert!(matches!(
            rx.recv().unwrap(),
            Err(Error::TransportError(TransportError::Disconnected(_)))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn guard_delivers_once() {
        let (tx, rx) = std::sync::mpsc::channel();
        let guard = SinkGuard::new("svc/M", move |r: Result<u32>| tx.send(r).unwrap());
        guard.deliver(Ok(5));
        assert_eq!(rx.recv().unwrap().unwrap(), 5);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn closures_are_sinks() {
        let (tx, rx) = std::sync::mpsc::channel();
        let sink = move |r: Result<u32>| tx.send(r.unwrap()).unwrap();
        sink.deliver(Ok(3));
        assert_eq!(rx.recv().unwrap(), 3);
    }
}

use std::sync::Arc;
use std::time::Duration;

use super::rpc_impl::{
    channel::{ChannelHandle, LocalChannel},
    server::Server,
    RpcController,
};
use super::rpc_types::error::{Error, Result, TransportError};
use super::search::search_service::{self, Service};
use super::search::{SearchRequest, SearchResponse};

const GREETING: &str = "Hello from apis.v1.search.Search";

#[derive(Clone)]
pub struct SearchService {
    pub delay_ms: u64,
}

#[async_trait::async_trait]
impl Service for SearchService {
    async fn search(&self, _ctrl: RpcController, input: SearchRequest) -> Result<SearchResponse> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(SearchResponse {
            result: input.query,
        })
    }

    async fn hello(&self, _ctrl: RpcController, _input: SearchRequest) -> Result<SearchResponse> {
        Ok(SearchResponse {
            result: GREETING.to_string(),
        })
    }
}

/// Implements only `Search`; `Hello` keeps its default body.
pub struct SearchOnly;

#[async_trait::async_trait]
impl Service for SearchOnly {
    async fn search(&self, _ctrl: RpcController, input: SearchRequest) -> Result<SearchResponse> {
        Ok(SearchResponse {
            result: input.query,
        })
    }
}

struct TestContext {
    server: Arc<Server>,
    transport: Arc<LocalChannel>,
}

impl TestContext {
    fn new() -> Self {
        let server = Arc::new(Server::new());
        let transport = Arc::new(LocalChannel::new(server.clone()));
        Self { server, transport }
    }

    fn with_service(service: impl Service) -> Self {
        let ctx = Self::new();
        ctx.server
            .registry()
            .register(search_service::bind_service(service).unwrap());
        ctx
    }

    fn channel(&self, runtime: tokio::runtime::Handle) -> ChannelHandle {
        ChannelHandle::with_runtime(self.transport.clone(), runtime)
    }
}

fn query(q: &str) -> SearchRequest {
    SearchRequest {
        query: q.to_string(),
    }
}

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn blocking_stub_end_to_end() {
    let rt = test_runtime();
    let ctx = TestContext::with_service(SearchService { delay_ms: 0 });
    let stub = search_service::new_blocking_stub(ctx.channel(rt.handle().clone()));

    assert_eq!(stub.search(query("x")).unwrap().result, "x");
    assert_eq!(stub.hello(query("x")).unwrap().result, GREETING);
    assert_eq!(stub.hello(query("something else")).unwrap().result, GREETING);
    assert_eq!(ctx.transport.inflight_count(), 0);
    assert_eq!(ctx.server.inflight_count(), 0);
}

#[test]
fn blocking_stub_from_many_threads() {
    let rt = test_runtime();
    let ctx = TestContext::with_service(SearchService { delay_ms: 10 });
    let stub = search_service::new_blocking_stub(ctx.channel(rt.handle().clone()));

    std::thread::scope(|s| {
        for i in 0..8 {
            let stub = stub.clone();
            s.spawn(move || {
                let q = format!("query-{}", i);
                assert_eq!(stub.search(query(&q)).unwrap().result, q);
            });
        }
    });

    let h1 = search_service::Method::Search.handle().unwrap();
    let h2 = search_service::Method::Search.handle().unwrap();
    assert!(Arc::ptr_eq(&h1, &h2));
}

#[tokio::test]
async fn async_stub_end_to_end() {
    let ctx = TestContext::with_service(SearchService { delay_ms: 0 });
    let stub = search_service::new_stub(ctx.channel(tokio::runtime::Handle::current()));

    let (tx, rx) = tokio::sync::oneshot::channel();
    stub.search(query("x"), move |r: Result<SearchResponse>| {
        let _ = tx.send(r);
    });
    assert_eq!(rx.await.unwrap().unwrap().result, "x");

    let (tx, rx) = tokio::sync::oneshot::channel();
    stub.hello(query("x"), move |r: Result<SearchResponse>| {
        let _ = tx.send(r);
    });
    assert_eq!(rx.await.unwrap().unwrap().result, GREETING);
}

#[test]
fn async_stub_reports_disconnect_when_runtime_shuts_down() {
    let rt = test_runtime();
    let ctx = TestContext::with_service(SearchService { delay_ms: 300 });
    let stub = search_service::new_stub(ctx.channel(rt.handle().clone()));

    let (tx, rx) = std::sync::mpsc::channel();
    stub.search(query("x"), move |r: Result<SearchResponse>| {
        let _ = tx.send(r);
    });
    rt.shutdown_timeout(Duration::from_millis(10));

    assert!(matches!(
        rx.recv_timeout(Duration::from_secs(1)).unwrap(),
        Err(Error::TransportError(TransportError::Disconnected(_)))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn blocking_stub_inside_runtime_fails_instead_of_panicking() {
    let ctx = TestContext::with_service(SearchService { delay_ms: 0 });
    let stub = search_service::new_blocking_stub(ctx.channel(tokio::runtime::Handle::current()));

    assert!(matches!(
        stub.hello(query("x")),
        Err(Error::TransportError(TransportError::BlockingInRuntime))
    ));

    let future_stub =
        search_service::new_future_stub(ctx.channel(tokio::runtime::Handle::current()));
    assert!(matches!(
        future_stub.hello(query("x")).wait(),
        Err(Error::TransportError(TransportError::BlockingInRuntime))
    ));
}

#[tokio::test]
async fn future_stub_end_to_end() {
    let ctx = TestContext::with_service(SearchService { delay_ms: 0 });
    let stub = search_service::new_future_stub(ctx.channel(tokio::runtime::Handle::current()));

    let (search, hello) = tokio::join!(stub.search(query("x")), stub.hello(query("y")));
    assert_eq!(search.unwrap().result, "x");
    assert_eq!(hello.unwrap().result, GREETING);
}

#[tokio::test]
async fn future_stub_cancel() {
    let ctx = TestContext::with_service(SearchService { delay_ms: 300 });
    let stub = search_service::new_future_stub(ctx.channel(tokio::runtime::Handle::current()));

    let pending = stub.search(query("late"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(pending.cancel());
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(matches!(pending.await, Err(Error::CallCancelled)));

    let done = stub.hello(query("x"));
    while !done.is_done() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!done.cancel());
    assert_eq!(done.await.unwrap().result, GREETING);
}

#[tokio::test]
async fn unimplemented_method_fails_per_call() {
    let ctx = TestContext::with_service(SearchOnly);
    let stub = search_service::new_future_stub(ctx.channel(tokio::runtime::Handle::current()));

    let ret = stub.hello(query("x")).await;
    assert!(
        matches!(ret, Err(Error::Unimplemented(route)) if route == "apis.v1.search.Search/Hello")
    );
    // the server keeps serving other methods
    assert_eq!(stub.search(query("still here")).await.unwrap().result, "still here");
}

#[tokio::test]
async fn unregistered_service_is_method_not_found() {
    let ctx = TestContext::new();
    let stub = search_service::new_future_stub(ctx.channel(tokio::runtime::Handle::current()));

    let ret = stub.search(query("x")).await;
    assert!(
        matches!(ret, Err(Error::MethodNotFound(route)) if route == "apis.v1.search.Search/Search")
    );

    ctx.server
        .registry()
        .register(search_service::bind_service(SearchService { delay_ms: 0 }).unwrap());
    assert_eq!(stub.search(query("x")).await.unwrap().result, "x");

    ctx.server.registry().unregister(search_service::SERVICE_NAME);
    assert!(matches!(
        stub.search(query("x")).await,
        Err(Error::MethodNotFound(_))
    ));
}

#[tokio::test]
async fn with_options_does_not_touch_shared_channel() {
    let ctx = TestContext::with_service(SearchService { delay_ms: 200 });
    let stub = search_service::new_future_stub(ctx.channel(tokio::runtime::Handle::current()));
    let hasty = stub.with_options(RpcController::default().with_timeout_ms(20));

    let ret = hasty.search(query("x")).await;
    assert!(matches!(
        ret,
        Err(Error::TransportError(TransportError::Timeout(_)))
    ));
    assert!(ret.unwrap_err().is_transport());

    assert_eq!(stub.search(query("x")).await.unwrap().result, "x");
}

#[tokio::test]
async fn shutdown_channel_reports_transport_error() {
    let ctx = TestContext::with_service(SearchService { delay_ms: 0 });
    let stub = search_service::new_future_stub(ctx.channel(tokio::runtime::Handle::current()));
    assert_eq!(stub.hello(query("x")).await.unwrap().result, GREETING);

    ctx.transport.shutdown();
    assert!(matches!(
        stub.hello(query("x")).await,
        Err(Error::TransportError(TransportError::Shutdown))
    ));
}

#[test]
fn channel_outside_runtime_needs_explicit_handle() {
    let ctx = TestContext::new();
    let ret = ChannelHandle::new(ctx.transport.clone());
    assert!(matches!(
        ret,
        Err(Error::TransportError(TransportError::NoRuntime(_)))
    ));
}

#[test]
fn service_descriptor_lists_both_methods() {
    let schema = search_service::service_descriptor();
    assert_eq!(schema.full_name, "apis.v1.search.Search");
    assert_eq!(schema.package, "apis.v1.search");

    let names: Vec<_> = schema.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Search", "Hello"]);
    for m in &schema.methods {
        assert!(m.sampled_to_local_tracing);
        assert_eq!(m.request_type.as_str(), "apis.v1.search.SearchRequest");
        assert_eq!(m.response_type.as_str(), "apis.v1.search.SearchResponse");
    }
    assert!(Arc::ptr_eq(&schema, &search_service::service_descriptor()));
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use search_rpc::common::config::{ConfigLoader, TomlConfigLoader};
use search_rpc::proto::rpc_impl::{
    channel::{ChannelHandle, LocalChannel},
    server::Server,
    RpcController,
};
use search_rpc::proto::rpc_types::error::Result as RpcResult;
use search_rpc::proto::search::{
    search_service::{self, Service},
    SearchRequest, SearchResponse,
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum CallStyle {
    Blocking,
    Async,
    Future,
}

#[derive(Parser, Debug)]
#[command(name = "search-rpc", author, version = search_rpc::VERSION, about, long_about = None)]
struct Cli {
    #[arg(short, long, help = "path to a toml config file")]
    config: Option<PathBuf>,

    #[arg(long, help = "console log level, overrides the config file")]
    console_log_level: Option<String>,

    #[arg(long, help = "call timeout in milliseconds, overrides the config file")]
    timeout_ms: Option<i32>,

    #[arg(long, value_enum, default_value = "blocking", help = "stub call style")]
    style: CallStyle,

    #[arg(short, long, default_value = "hello world", help = "query sent to Search")]
    query: String,
}

struct DemoSearch;

#[async_trait::async_trait]
impl Service for DemoSearch {
    async fn search(&self, ctrl: RpcController, input: SearchRequest) -> RpcResult<SearchResponse> {
        tracing::info!(trace_id = ctrl.trace_id, query = %input.query, "search");
        Ok(SearchResponse {
            result: input.query,
        })
    }

    async fn hello(&self, _ctrl: RpcController, _input: SearchRequest) -> RpcResult<SearchResponse> {
        Ok(SearchResponse {
            result: "Hello from apis.v1.search.Search".to_string(),
        })
    }
}

fn call_blocking(channel: ChannelHandle, req: SearchRequest) -> RpcResult<(String, String)> {
    let stub = search_service::new_blocking_stub(channel);
    let search = stub.search(req.clone())?;
    let hello = stub.hello(req)?;
    Ok((search.result, hello.result))
}

fn call_async(channel: ChannelHandle, req: SearchRequest) -> anyhow::Result<(String, String)> {
    let stub = search_service::new_stub(channel);
    let (tx, rx) = std::sync::mpsc::channel();

    let search_tx = tx.clone();
    stub.search(req.clone(), move |r: RpcResult<SearchResponse>| {
        let _ = search_tx.send(("search", r));
    });
    stub.hello(req, move |r: RpcResult<SearchResponse>| {
        let _ = tx.send(("hello", r));
    });

    let mut search = None;
    let mut hello = None;
    for (method, r) in rx.iter().take(2) {
        let result = r.with_context(|| format!("{} failed", method))?.result;
        match method {
            "search" => search = Some(result),
            _ => hello = Some(result),
        }
    }

    Ok((
        search.context("no search result")?,
        hello.context("no hello result")?,
    ))
}

fn call_future(channel: ChannelHandle, req: SearchRequest) -> RpcResult<(String, String)> {
    let stub = search_service::new_future_stub(channel);
    let search = stub.search(req.clone());
    let hello = stub.hello(req);
    Ok((search.wait()?.result, hello.wait()?.result))
}

fn run_main(cli: Cli) -> anyhow::Result<()> {
    let cfg = match &cli.config {
        Some(path) => TomlConfigLoader::new(path)?,
        None => TomlConfigLoader::default(),
    };
    if cli.console_log_level.is_some() || cli.config.is_none() {
        cfg.set_console_log_level(Some(
            cli.console_log_level.clone().unwrap_or("info".to_string()),
        ));
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        let mut client = cfg.get_client_config();
        client.timeout_ms = timeout_ms;
        cfg.set_client_config(client);
    }
    let _guard = search_rpc::common::log::init(&cfg)?;
    tracing::debug!("running with config:\n{}", cfg.dump());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_context(|| "failed to build tokio runtime")?;

    let server = Arc::new(Server::new());
    server
        .registry()
        .register(search_service::bind_service(DemoSearch)?);

    let options = RpcController::from(&cfg.get_client_config());
    let channel = ChannelHandle::with_runtime(
        Arc::new(LocalChannel::new(server.clone())),
        rt.handle().clone(),
    )
    .with_options(options);

    let req = SearchRequest { query: cli.query };
    tracing::info!(style = ?cli.style, services = ?server.registry().service_names(), "calling");

    let (search, hello) = match cli.style {
        CallStyle::Blocking => call_blocking(channel, req)?,
        CallStyle::Async => call_async(channel, req)?,
        CallStyle::Future => call_future(channel, req)?,
    };

    println!("Search: {}", search);
    println!("Hello: {}", hello);
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_main(cli) {
        eprintln!("error: {:?}", e);
        std::process::exit(1);
    }
}

pub type RpcController = super::rpc_types::controller::BaseController;

pub mod channel;
pub mod client;
pub mod future;
pub mod handle_cache;
pub mod reflection;
pub mod server;
pub mod service_registry;

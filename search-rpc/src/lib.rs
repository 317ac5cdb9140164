pub mod common;
pub mod proto;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

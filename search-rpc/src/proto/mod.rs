pub mod rpc_impl;
pub mod rpc_types;

pub mod search;

#[cfg(test)]
pub mod tests;

//! Utility functions used by generated code; this is *not* part of the crate's public API!
use std::sync::Arc;

use bytes;
use prost;

use super::controller;
use super::error;
use crate::proto::rpc_impl::{channel::Channel, handle_cache::MethodHandle};

pub use async_trait::async_trait;
pub use once_cell::sync::Lazy;

/// Efficiently decode a particular message type from a byte buffer.
pub fn decode<M>(buf: bytes::Bytes) -> error::Result<M>
where
    M: prost::Message + Default,
{
    let message = prost::Message::decode(buf)?;
    Ok(message)
}

/// Efficiently encode a particular message into a byte buffer.
pub fn encode<M>(message: M) -> error::Result<bytes::Bytes>
where
    M: prost::Message,
{
    let len = prost::Message::encoded_len(&message);
    let mut buf = ::bytes::BytesMut::with_capacity(len);
    prost::Message::encode(&message, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode `input`, send it through `channel` and decode the single response.
pub async fn call_method<I, O>(
    channel: Arc<dyn Channel>,
    handle: Arc<MethodHandle>,
    ctrl: controller::BaseController,
    input: I,
) -> error::Result<O>
where
    I: prost::Message,
    O: prost::Message + Default,
{
    let input_bytes = encode(input)?;
    let ret_msg = channel.unary_call(handle, ctrl, input_bytes).await?;
    decode(ret_msg)
}

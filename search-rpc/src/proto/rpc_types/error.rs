//! Error type definitions for errors that can occur during RPC interactions.
use std::result;

use prost;
use thiserror;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Duplicate method name: {0}")]
    DuplicateMethodName(String),

    #[error("Invalid service definition: {0}")]
    InvalidServiceDefinition(String),

    #[error(transparent)]
    HandleConstruction(#[from] HandleConstructionError),

    #[error("Method not implemented: {0}")]
    Unimplemented(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),

    #[error("Call cancelled")]
    CallCancelled,

    #[error("Decode error: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("Encode error: {0}")]
    EncodeError(#[from] prost::EncodeError),

    #[error("Execution error: {0}")]
    ExecutionError(#[from] anyhow::Error),
}

/// Failure of a lazy method handle construction.
///
/// Every caller that waited on the failed attempt receives a clone of the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to construct method handle for {route}: {reason}")]
pub struct HandleConstructionError {
    pub route: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Timeout: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Shutdown")]
    Shutdown,

    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("Call task disconnected: {0}")]
    Disconnected(String),

    #[error("Blocking call from within a tokio runtime")]
    BlockingInRuntime,
}

impl Error {
    /// True for failures reported by the channel rather than by the remote handler.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::TransportError(_))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::TransportError(TransportError::Timeout(e))
    }
}

pub type Result<T> = result::Result<T, Error>;

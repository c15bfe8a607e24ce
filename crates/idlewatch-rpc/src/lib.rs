//! Transport layer for idlewatch
//!
//! Provides:
//! - WebSocket dialing with bearer authentication and optional TLS
//! - Reconnect loop with exponential backoff and cancellation
//! - JSON-RPC request/response correlation over a single connection

mod connection;
mod connector;
mod tls;

pub use connection::*;
pub use connector::*;
pub use tls::client_config;

use idlewatch_api::RpcErrorObject;
use std::time::Duration;
use thiserror::Error;

/// Errors from a call over an established connection
#[derive(Debug, Error)]
pub enum RpcError {
    /// The server answered with a JSON-RPC error object
    #[error("JSON-RPC error {code}: {message}{}", .data.as_deref().map(|d| format!(" (data: {d})")).unwrap_or_default())]
    Protocol {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// The connection failed while sending or awaiting the response
    #[error("Transport lost: {0}")]
    TransportLost(String),

    #[error("Request '{method}' timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Unexpected result for '{method}': {source}")]
    InvalidResult {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RpcError {
    /// Whether the connection should be considered dead after this error
    pub fn is_transport_lost(&self) -> bool {
        matches!(self, RpcError::TransportLost(_) | RpcError::Timeout { .. })
    }

    /// Protocol error code, if the server sent one
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<RpcErrorObject> for RpcError {
    fn from(error: RpcErrorObject) -> Self {
        RpcError::Protocol {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

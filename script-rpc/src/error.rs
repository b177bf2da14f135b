use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::io;

/// JSON-RPC 2.0 standard error codes used by this crate.
pub const PARSE_ERROR_CODE: i64 = -32700;
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;
pub const INVALID_PARAMS_CODE: i64 = -32602;
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// The wire error object carried by a response envelope.
///
/// Serializes to `{code, message, data?}` and round-trips through both
/// encodings unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
  pub code: i64,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<JsonValue>,
}

impl RemoteError {
  pub fn new(code: i64, message: impl Into<String>) -> Self {
    RemoteError {
      code,
      message: message.into(),
      data: None,
    }
  }

  pub fn with_data(code: i64, message: impl Into<String>, data: JsonValue) -> Self {
    RemoteError {
      code,
      message: message.into(),
      data: Some(data),
    }
  }

  pub fn parse_error(message: impl Into<String>) -> Self {
    RemoteError::new(PARSE_ERROR_CODE, message)
  }

  pub fn method_not_found(method: &str) -> Self {
    RemoteError::new(METHOD_NOT_FOUND_CODE, format!("method not found: {}", method))
  }

  pub fn invalid_params(message: impl Into<String>) -> Self {
    RemoteError::new(INVALID_PARAMS_CODE, message)
  }

  pub fn internal(message: impl Into<String>) -> Self {
    RemoteError::new(INTERNAL_ERROR_CODE, message)
  }
}

impl fmt::Display for RemoteError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "remote error {}: {}", self.code, self.message)
  }
}

impl std::error::Error for RemoteError {}

/// Failure to turn an outbound envelope into a wire payload.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
  #[error("failed to encode json payload: {0}")]
  Json(#[from] serde_json::Error),
  #[error("failed to encode messagepack payload: {0}")]
  MessagePack(#[from] rmp_serde::encode::Error),
}

/// Failure to turn an inbound payload into an envelope.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
  #[error("invalid json payload: {0}")]
  Json(#[from] serde_json::Error),
  #[error("invalid messagepack payload: {0}")]
  MessagePack(#[from] rmp_serde::decode::Error),
  #[error("expected a json-rpc object, got: {0}")]
  NotAnObject(JsonValue),
  #[error("envelope carries neither id nor method: {0}")]
  InvalidEnvelope(JsonValue),
}

/// Failure reported by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
  #[error("transport is closed")]
  Closed,
  #[error(transparent)]
  Io(#[from] io::Error),
  #[error("transport failure: {0}")]
  Other(String),
}

/// Caller-facing RPC error.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
  /// The caller passed a scalar or null where the protocol requires a
  /// structured value. Raised before anything touches the wire.
  #[error("params must be an array or an object, got: {0}")]
  InvalidParams(JsonValue),
  #[error("capability and slot names must not be empty")]
  InvalidName,
  #[error("duplicate injection slot: {0}")]
  DuplicateSlot(String),
  /// The remote peer answered with an error object.
  #[error(transparent)]
  Remote(#[from] RemoteError),
  /// The peer was dropped before the response arrived.
  #[error("peer disconnected before the response arrived")]
  PeerDisconnect,
  #[error(transparent)]
  Encode(#[from] EncodeError),
  #[error(transparent)]
  Internal(#[from] anyhow::Error),
}

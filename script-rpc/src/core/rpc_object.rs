use crate::error::{DecodeError, RemoteError};
use serde_json::Value as JsonValue;
use std::fmt;

/// A decoded JSON-RPC envelope, prior to classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcObject(pub JsonValue);

/// The three envelope shapes of the protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
  /// `{jsonrpc, id, method, params?}` — expects exactly one response.
  Request {
    id: u64,
    method: String,
    params: JsonValue,
  },
  /// `{jsonrpc, id, result}` or `{jsonrpc, id, error}`.
  Response {
    id: u64,
    payload: Result<JsonValue, RemoteError>,
  },
  /// `{jsonrpc, method, params?}` — never elicits a reply.
  Notification { method: String, params: JsonValue },
}

impl RpcObject {
  pub fn get_id(&self) -> Option<u64> {
    self.0.get("id").and_then(JsonValue::as_u64)
  }

  pub fn get_method(&self) -> Option<&str> {
    self.0.get("method").and_then(JsonValue::as_str)
  }

  pub fn is_response(&self) -> bool {
    self.get_id().is_some() && self.get_method().is_none()
  }

  /// Classifies the envelope.
  ///
  /// An envelope carrying both `id` and `method` is a request; `id` alone is
  /// a response; `method` alone is a notification. A response that carries
  /// neither `result` nor `error` (or a malformed `error` object) classifies
  /// as a parse-error rejection so the matching pending call still settles.
  pub fn into_message(self) -> Result<RpcMessage, DecodeError> {
    let id = self.get_id();
    let method = self.get_method().map(str::to_string);
    match (id, method) {
      (Some(id), Some(method)) => {
        let params = self.0.get("params").cloned().unwrap_or(JsonValue::Null);
        Ok(RpcMessage::Request { id, method, params })
      },
      (Some(id), None) => Ok(RpcMessage::Response {
        id,
        payload: response_payload(self.0),
      }),
      (None, Some(method)) => {
        let params = self.0.get("params").cloned().unwrap_or(JsonValue::Null);
        Ok(RpcMessage::Notification { method, params })
      },
      (None, None) => Err(DecodeError::InvalidEnvelope(self.0)),
    }
  }
}

fn response_payload(mut envelope: JsonValue) -> Result<JsonValue, RemoteError> {
  if let Some(result) = envelope.get_mut("result") {
    return Ok(result.take());
  }
  match envelope.get_mut("error") {
    Some(error) => match serde_json::from_value::<RemoteError>(error.take()) {
      Ok(remote) => Err(remote),
      Err(err) => Err(RemoteError::parse_error(format!(
        "malformed error object in response: {}",
        err
      ))),
    },
    None => Err(RemoteError::parse_error(
      "response carries neither result nor error",
    )),
  }
}

impl fmt::Display for RpcObject {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<JsonValue> for RpcObject {
  fn from(value: JsonValue) -> Self {
    RpcObject(value)
  }
}

use crate::error::RemoteError;
use serde_json::Value as JsonValue;

/// Typed view over a response body.
pub trait ResponseParser {
  type ValueType: Send + Sync + 'static;
  fn parse_json(payload: JsonValue) -> Result<Self::ValueType, RemoteError>;
}

/// Discards the response body.
pub struct EmptyResponseParser;
impl ResponseParser for EmptyResponseParser {
  type ValueType = ();

  fn parse_json(_payload: JsonValue) -> Result<Self::ValueType, RemoteError> {
    Ok(())
  }
}

/// Hands the response body back untouched.
pub struct ValueResponseParser;
impl ResponseParser for ValueResponseParser {
  type ValueType = JsonValue;

  fn parse_json(payload: JsonValue) -> Result<Self::ValueType, RemoteError> {
    Ok(payload)
  }
}

use crate::core::rpc_object::RpcObject;
use crate::error::{DecodeError, EncodeError};
use bytes::Bytes;
use serde_json::Value as JsonValue;

/// Wire encoding applied to outbound envelopes. The receive side never
/// consults this: decoding auto-detects per message, so a peer may receive a
/// mix of both encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
  Json,
  #[default]
  MessagePack,
}

/// A single transport-level message.
#[derive(Debug, Clone)]
pub enum Payload {
  /// UTF-8 text, normally JSON.
  Text(String),
  /// Raw bytes, normally MessagePack.
  Binary(Bytes),
  /// An envelope the transport already parsed.
  Value(JsonValue),
}

impl Payload {
  pub fn as_text(&self) -> Option<&str> {
    match self {
      Payload::Text(text) => Some(text),
      _ => None,
    }
  }

  pub fn is_binary(&self) -> bool {
    matches!(self, Payload::Binary(_))
  }
}

pub fn encode(envelope: &JsonValue, encoding: Encoding) -> Result<Payload, EncodeError> {
  match encoding {
    Encoding::Json => Ok(Payload::Text(serde_json::to_string(envelope)?)),
    Encoding::MessagePack => Ok(Payload::Binary(Bytes::from(rmp_serde::to_vec_named(
      envelope,
    )?))),
  }
}

/// Decodes an inbound payload into an envelope.
///
/// Text whose first non-whitespace byte is `{` is taken as JSON; any other
/// text is treated as MessagePack over its bytes. Binary payloads are always
/// MessagePack. Pre-parsed values pass through untouched.
pub fn decode(payload: Payload) -> Result<RpcObject, DecodeError> {
  let value: JsonValue = match payload {
    Payload::Value(value) => value,
    Payload::Text(text) => {
      if text.trim_start().starts_with('{') {
        serde_json::from_str(&text)?
      } else {
        rmp_serde::from_slice(text.as_bytes())?
      }
    },
    Payload::Binary(bytes) => rmp_serde::from_slice(&bytes)?,
  };
  if value.is_object() {
    Ok(RpcObject(value))
  } else {
    Err(DecodeError::NotAnObject(value))
  }
}

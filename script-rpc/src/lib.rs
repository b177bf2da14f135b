//! Bidirectional JSON-RPC 2.0 substrate connecting a host and an isolated
//! script over an opaque message channel.
//!
//! The crate provides the symmetric peer used on both sides of the channel:
//! request/response correlation, notification fan-out, a connect-gated send
//! queue and a JSON/MessagePack codec with auto-detecting decode. Transports
//! are supplied by the embedder through [`core::transport::Transport`].

pub mod core;
pub mod error;

use script_rpc::core::event_bus::SubscriptionId;
use script_rpc::core::parser::ResponseParser;
use script_rpc::core::peer::RpcPeer;
use script_rpc::error::RpcError;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A local proxy for a named plugin on the remote peer.
///
/// Method invocations go out as `{plugin}.{method}` calls with the arguments
/// as a positional array; event subscriptions bind to notifications under the
/// same qualified convention, `{plugin}.{event}`. Stubs are synthesized
/// locally: constructing one involves no wire traffic.
pub struct Capability {
  name: String,
  peer: RpcPeer,
}

impl std::fmt::Debug for Capability {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Capability").field("name", &self.name).finish()
  }
}

impl Capability {
  pub(crate) fn new(name: impl Into<String>, peer: RpcPeer) -> Self {
    Capability {
      name: name.into(),
      peer,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  fn wire_name(&self, member: &str) -> String {
    format!("{}.{}", self.name, member)
  }

  /// Invokes a plugin method and awaits its result.
  pub async fn call(&self, method: &str, args: Vec<JsonValue>) -> Result<JsonValue, RpcError> {
    self
      .peer
      .call(&self.wire_name(method), Some(JsonValue::Array(args)))?
      .await
  }

  /// Invokes a plugin method and parses the result through `P`.
  pub async fn call_with<P: ResponseParser>(
    &self,
    method: &str,
    args: Vec<JsonValue>,
  ) -> Result<P::ValueType, RpcError> {
    let value = self.call(method, args).await?;
    Ok(P::parse_json(value)?)
  }

  /// Fires a one-way plugin notification.
  pub fn notify(&self, method: &str, args: Vec<JsonValue>) -> Result<(), RpcError> {
    self
      .peer
      .notify(&self.wire_name(method), Some(JsonValue::Array(args)))
  }

  /// Subscribes to the plugin notification `{plugin}.{event}`. Purely local.
  pub fn on_event<F>(&self, event: &str, handler: F) -> SubscriptionId
  where
    F: Fn(&JsonValue) -> anyhow::Result<()> + Send + Sync + 'static,
  {
    self.peer.on(&self.wire_name(event), handler)
  }

  pub fn once_event<F>(&self, event: &str, handler: F) -> SubscriptionId
  where
    F: Fn(&JsonValue) -> anyhow::Result<()> + Send + Sync + 'static,
  {
    self.peer.once(&self.wire_name(event), handler)
  }

  pub fn off_event(&self, event: &str, id: SubscriptionId) -> bool {
    self.peer.off(&self.wire_name(event), id)
  }

  /// Streams plugin notifications. Payloads arriving while the buffer is full
  /// are dropped; the subscription lives as long as the peer.
  pub fn event_stream(&self, event: &str, buffer: usize) -> ReceiverStream<JsonValue> {
    let (tx, rx) = mpsc::channel(buffer);
    self.peer.on(&self.wire_name(event), move |payload| {
      let _ = tx.try_send(payload.clone());
      Ok(())
    });
    ReceiverStream::new(rx)
  }
}

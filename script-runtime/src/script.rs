use crate::capability::Capability;
use crate::runtime::ScriptRuntime;
use script_rpc::core::event_bus::ERROR_EVENT;
use script_rpc::error::RpcError;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, trace};

/// User code driven by the script runtime.
pub trait Script: Send + 'static {
  /// Invoked exactly once, after the declared capabilities are bound to
  /// their slots and the transport has connected. A failure here is routed
  /// to the peer's `error` event and does not poison the peer.
  fn system_did_enable(&mut self, ctx: &mut ScriptContext) -> anyhow::Result<()>;
}

/// The capabilities resolved for one script instance, keyed by slot.
pub struct ScriptContext {
  runtime: ScriptRuntime,
  slots: HashMap<String, Arc<Capability>>,
}

impl ScriptContext {
  pub fn capability(&self, slot: &str) -> Option<Arc<Capability>> {
    self.slots.get(slot).cloned()
  }

  pub fn runtime(&self) -> &ScriptRuntime {
    &self.runtime
  }

  pub fn slot_count(&self) -> usize {
    self.slots.len()
  }
}

impl ScriptRuntime {
  /// Starts declaring the capabilities a script wants injected.
  pub fn script(&self) -> ScriptBuilder {
    ScriptBuilder {
      runtime: self.clone(),
      slots: Vec::new(),
    }
  }
}

/// Collects `(slot, plugin)` injection declarations for one script instance.
pub struct ScriptBuilder {
  runtime: ScriptRuntime,
  slots: Vec<(String, String)>,
}

impl ScriptBuilder {
  pub fn inject(mut self, slot: &str, capability: &str) -> Self {
    self.slots.push((slot.to_string(), capability.to_string()));
    self
  }

  /// Resolves the declared capabilities with a single batched handshake,
  /// binds each to its slot and fires `system_did_enable`.
  ///
  /// Empty or duplicate slot declarations fail before anything reaches the
  /// wire. Returns the script so the embedder keeps driving it.
  pub async fn enable<S: Script>(self, mut script: S) -> Result<S, RpcError> {
    for (slot, capability) in &self.slots {
      if slot.is_empty() || capability.is_empty() {
        return Err(RpcError::InvalidName);
      }
    }
    for (index, (slot, _)) in self.slots.iter().enumerate() {
      if self.slots[..index].iter().any(|(seen, _)| seen == slot) {
        return Err(RpcError::DuplicateSlot(slot.clone()));
      }
    }

    let mut names: Vec<&str> = Vec::new();
    for (_, capability) in &self.slots {
      if !names.contains(&capability.as_str()) {
        names.push(capability);
      }
    }

    // Resolving the handshake doubles as the connect gate: the response can
    // only have arrived over a connected transport.
    let capabilities = self.runtime.load_apis(&names).await?;

    let mut slots = HashMap::new();
    for (slot, capability) in &self.slots {
      if let Some(stub) = capabilities.get(capability) {
        slots.insert(slot.clone(), stub.clone());
      }
    }

    let mut ctx = ScriptContext {
      runtime: self.runtime.clone(),
      slots,
    };
    trace!("[RPC] enabling script with {} slot(s)", ctx.slot_count());
    if let Err(err) = script.system_did_enable(&mut ctx) {
      error!("[RPC] system_did_enable failed: {:#}", err);
      self.runtime.peer().emit(
        ERROR_EVENT,
        &json!({ "message": format!("system_did_enable failed: {:#}", err) }),
      );
    }
    Ok(script)
  }
}

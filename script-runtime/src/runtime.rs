use crate::capability::Capability;
use parking_lot::Mutex;
use script_rpc::core::peer::RpcPeer;
use script_rpc::core::transport::Transport;
use script_rpc::error::RpcError;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Method name the host reserves for capability acquisition.
pub const LOAD_COMPONENTS_METHOD: &str = "LoadComponents";

/// The script-side runtime: an [`RpcPeer`] plus the registry of loaded
/// capabilities. Clones share the same registry and peer.
#[derive(Clone)]
pub struct ScriptRuntime {
  peer: RpcPeer,
  loaded: Arc<Mutex<HashMap<String, Arc<Capability>>>>,
}

impl ScriptRuntime {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self::with_peer(RpcPeer::new(transport))
  }

  pub fn with_peer(peer: RpcPeer) -> Self {
    ScriptRuntime {
      peer,
      loaded: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn peer(&self) -> &RpcPeer {
    &self.peer
  }

  /// The stub registered for `name`, if the capability was loaded. Repeated
  /// lookups return the same stub.
  pub fn loaded_capability(&self, name: &str) -> Option<Arc<Capability>> {
    self.loaded.lock().get(name).cloned()
  }

  /// Loads the named plugins and returns their stubs.
  ///
  /// Names already in the registry are served locally. The missing subset is
  /// requested with exactly one `LoadComponents` call whose params hold the
  /// name list as a single positional argument; the host answers with an
  /// error if any name is unknown, and the success body is ignored since
  /// stubs are synthesized client-side.
  pub async fn load_apis(
    &self,
    names: &[&str],
  ) -> Result<HashMap<String, Arc<Capability>>, RpcError> {
    if names.iter().any(|name| name.is_empty()) {
      return Err(RpcError::InvalidName);
    }

    let missing: Vec<String> = {
      let loaded = self.loaded.lock();
      let mut missing = Vec::new();
      for name in names {
        if !loaded.contains_key(*name) && !missing.iter().any(|seen| seen == name) {
          missing.push((*name).to_string());
        }
      }
      missing
    };

    if !missing.is_empty() {
      debug!("[RPC] requesting {} component(s) from host", missing.len());
      self
        .peer
        .call(LOAD_COMPONENTS_METHOD, Some(json!([missing])))?
        .await?;

      let mut loaded = self.loaded.lock();
      for name in missing {
        let stub = Arc::new(Capability::new(name.clone(), self.peer.clone()));
        loaded.entry(name).or_insert(stub);
      }
    }

    let loaded = self.loaded.lock();
    let mut result = HashMap::new();
    for name in names {
      if let Some(stub) = loaded.get(*name) {
        result.insert((*name).to_string(), stub.clone());
      }
    }
    Ok(result)
  }
}

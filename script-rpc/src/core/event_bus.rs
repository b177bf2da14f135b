use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Event a peer uses to report local failures (decode errors, protocol
/// violations, failing handlers). Never emitted recursively.
pub const ERROR_EVENT: &str = "error";

pub type EventHandler = Arc<dyn Fn(&JsonValue) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by `on`/`once`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
  id: SubscriptionId,
  once: bool,
  handler: EventHandler,
}

#[derive(Default)]
struct BusState {
  next_id: u64,
  handlers: HashMap<String, Vec<Registration>>,
}

/// Synchronous named-event pub/sub within one peer.
///
/// Handlers for a name run in registration order on the emitting thread. A
/// failing handler does not stop the ones after it.
#[derive(Default)]
pub struct EventBus {
  inner: Mutex<BusState>,
}

impl EventBus {
  pub fn new() -> Self {
    EventBus::default()
  }

  pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
  where
    F: Fn(&JsonValue) -> anyhow::Result<()> + Send + Sync + 'static,
  {
    self.register(event, false, Arc::new(handler))
  }

  /// Like `on`, but the registration is removed before the body runs the
  /// first time.
  pub fn once<F>(&self, event: &str, handler: F) -> SubscriptionId
  where
    F: Fn(&JsonValue) -> anyhow::Result<()> + Send + Sync + 'static,
  {
    self.register(event, true, Arc::new(handler))
  }

  fn register(&self, event: &str, once: bool, handler: EventHandler) -> SubscriptionId {
    let mut inner = self.inner.lock();
    inner.next_id += 1;
    let id = SubscriptionId(inner.next_id);
    inner
      .handlers
      .entry(event.to_string())
      .or_default()
      .push(Registration { id, once, handler });
    id
  }

  pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
    let mut inner = self.inner.lock();
    match inner.handlers.get_mut(event) {
      Some(list) => {
        let before = list.len();
        list.retain(|registration| registration.id != id);
        list.len() != before
      },
      None => false,
    }
  }

  pub fn handler_count(&self, event: &str) -> usize {
    self
      .inner
      .lock()
      .handlers
      .get(event)
      .map_or(0, |list| list.len())
  }

  /// Invokes exactly the handlers registered for `event` at the time of the
  /// call, in registration order. Handler failures are logged and re-emitted
  /// on [`ERROR_EVENT`]; failures of `error` handlers are only logged.
  pub fn emit(&self, event: &str, payload: &JsonValue) {
    let snapshot: Vec<EventHandler> = {
      let mut inner = self.inner.lock();
      match inner.handlers.get_mut(event) {
        None => return,
        Some(list) => {
          let snapshot = list.iter().map(|r| r.handler.clone()).collect();
          list.retain(|r| !r.once);
          snapshot
        },
      }
    };

    for handler in snapshot {
      if let Err(err) = (*handler)(payload) {
        warn!("[RPC] handler for event {} failed: {}", event, err);
        if event != ERROR_EVENT {
          self.emit(
            ERROR_EVENT,
            &json!({ "event": event, "message": err.to_string() }),
          );
        }
      }
    }
  }
}

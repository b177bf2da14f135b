use crate::core::codec::Payload;
use crate::error::TransportError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub type MessageHandler = Arc<dyn Fn(Payload) + Send + Sync>;
pub type ConnectHandler = Arc<dyn Fn() + Send + Sync>;
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(TransportError) + Send + Sync>;

/// An opaque message channel between two peers.
///
/// `send_message` and `set_on_message` are mandatory. The remaining setters
/// return `false` when the transport has no such event; in particular, a
/// transport without a connect signal is open from construction and the peer
/// synthesizes an immediate connect. The transport must not deliver two
/// messages concurrently.
pub trait Transport: Send + Sync + 'static {
  fn send_message(&self, payload: Payload) -> Result<(), TransportError>;

  fn set_on_message(&self, handler: MessageHandler);

  fn set_on_connect(&self, handler: ConnectHandler) -> bool {
    let _ = handler;
    false
  }

  fn set_on_close(&self, handler: CloseHandler) -> bool {
    let _ = handler;
    false
  }

  fn set_on_error(&self, handler: ErrorHandler) -> bool {
    let _ = handler;
    false
  }
}

/// One end of an in-memory transport pair. Delivery is synchronous: a sent
/// payload is handed to the remote end's message handler on the sending
/// thread. Open from construction (no connect signal).
pub struct LocalPipeTransport {
  remote: Mutex<Weak<LocalPipeTransport>>,
  on_message: Mutex<Option<MessageHandler>>,
  on_close: Mutex<Option<CloseHandler>>,
  closed: AtomicBool,
}

/// Creates a crossed pair of in-memory transports.
pub fn local_pipe() -> (Arc<LocalPipeTransport>, Arc<LocalPipeTransport>) {
  let left = Arc::new(LocalPipeTransport::new());
  let right = Arc::new(LocalPipeTransport::new());
  *left.remote.lock() = Arc::downgrade(&right);
  *right.remote.lock() = Arc::downgrade(&left);
  (left, right)
}

impl LocalPipeTransport {
  fn new() -> Self {
    LocalPipeTransport {
      remote: Mutex::new(Weak::new()),
      on_message: Mutex::new(None),
      on_close: Mutex::new(None),
      closed: AtomicBool::new(false),
    }
  }

  /// Closes both ends; each end's close handler fires once.
  pub fn close(&self) {
    if self.closed.swap(true, Ordering::SeqCst) {
      return;
    }
    let remote = {
      let mut remote = self.remote.lock();
      std::mem::replace(&mut *remote, Weak::new()).upgrade()
    };
    let on_close = self.on_close.lock().clone();
    if let Some(handler) = on_close {
      (*handler)();
    }
    if let Some(remote) = remote {
      remote.close();
    }
  }
}

impl Transport for LocalPipeTransport {
  fn send_message(&self, payload: Payload) -> Result<(), TransportError> {
    if self.closed.load(Ordering::SeqCst) {
      return Err(TransportError::Closed);
    }
    let remote = self
      .remote
      .lock()
      .upgrade()
      .ok_or(TransportError::Closed)?;
    // Clone the handler out of the cell so it may send again re-entrantly.
    let handler = remote.on_message.lock().clone();
    match handler {
      Some(handler) => {
        (*handler)(payload);
        Ok(())
      },
      None => Err(TransportError::Other(
        "remote end has no message handler".to_string(),
      )),
    }
  }

  fn set_on_message(&self, handler: MessageHandler) {
    *self.on_message.lock() = Some(handler);
  }

  fn set_on_close(&self, handler: CloseHandler) -> bool {
    *self.on_close.lock() = Some(handler);
    true
  }
}

use crate::core::codec::{self, Encoding, Payload};
use crate::core::event_bus::{EventBus, SubscriptionId, ERROR_EVENT};
use crate::core::rpc_object::{RpcMessage, RpcObject};
use crate::core::transport::Transport;
use crate::error::{RemoteError, RpcError};
use parking_lot::Mutex;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

const JSONRPC_VERSION: &str = "2.0";

/// Event emitted when the transport reports close. The peer stops flushing
/// but is not otherwise reset; pending calls stay pending.
pub const TRANSPORT_CLOSED_EVENT: &str = "transportClosed";

pub type MethodHandler = Arc<dyn Fn(JsonValue) -> Result<JsonValue, RemoteError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PeerConfig {
  pub send_encoding: Encoding,
  pub log_messages: bool,
}

impl Default for PeerConfig {
  fn default() -> Self {
    PeerConfig {
      send_encoding: Encoding::MessagePack,
      log_messages: false,
    }
  }
}

struct PeerState {
  transport: Arc<dyn Transport>,
  id_counter: AtomicU64,
  pending: Mutex<HashMap<u64, oneshot::Sender<Result<JsonValue, RemoteError>>>>,
  send_queue: Mutex<VecDeque<Payload>>,
  connected: AtomicBool,
  send_encoding: Mutex<Encoding>,
  log_messages: AtomicBool,
  methods: Mutex<HashMap<String, MethodHandler>>,
  events: EventBus,
}

/// One endpoint of the RPC channel.
///
/// The peer is symmetric: both sides of the channel run the same type, and
/// either may issue calls, answer requests and emit notifications. Cloning is
/// cheap and every clone drives the same channel.
///
/// Outbound traffic is held in an ordered queue until the transport reports
/// connectivity, then flushed in issue order; a transport without a connect
/// signal is treated as connected from construction.
pub struct RpcPeer {
  state: Arc<PeerState>,
}

impl Clone for RpcPeer {
  fn clone(&self) -> Self {
    RpcPeer {
      state: self.state.clone(),
    }
  }
}

impl RpcPeer {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self::with_config(transport, PeerConfig::default())
  }

  pub fn with_config(transport: Arc<dyn Transport>, config: PeerConfig) -> Self {
    let peer = RpcPeer {
      state: Arc::new(PeerState {
        transport,
        id_counter: AtomicU64::new(0),
        pending: Mutex::new(HashMap::new()),
        send_queue: Mutex::new(VecDeque::new()),
        connected: AtomicBool::new(false),
        send_encoding: Mutex::new(config.send_encoding),
        log_messages: AtomicBool::new(config.log_messages),
        methods: Mutex::new(HashMap::new()),
        events: EventBus::new(),
      }),
    };
    peer.attach_transport();
    peer
  }

  /// Wires the transport hooks. Callbacks hold a weak reference so dropping
  /// the last peer clone detaches the channel.
  fn attach_transport(&self) {
    let transport = self.state.transport.clone();

    let weak = Arc::downgrade(&self.state);
    transport.set_on_message(Arc::new(move |payload| {
      if let Some(peer) = upgrade(&weak) {
        peer.process_message(payload);
      }
    }));

    let weak = Arc::downgrade(&self.state);
    transport.set_on_close(Arc::new(move || {
      if let Some(peer) = upgrade(&weak) {
        peer.handle_transport_closed();
      }
    }));

    let weak = Arc::downgrade(&self.state);
    transport.set_on_error(Arc::new(move |err| {
      if let Some(peer) = upgrade(&weak) {
        peer.report_error(format!("transport error: {}", err));
      }
    }));

    let weak = Arc::downgrade(&self.state);
    let has_connect_signal = transport.set_on_connect(Arc::new(move || {
      if let Some(peer) = upgrade(&weak) {
        peer.handle_connect();
      }
    }));
    if !has_connect_signal {
      self.handle_connect();
    }
  }

  /// Issues a request and returns a future for its response.
  ///
  /// `params`, when present, must be an array or an object; scalars and null
  /// fail here, before an id is allocated or anything reaches the transport.
  /// The call stays pending until the matching response arrives; there is no
  /// timeout at this level.
  pub fn call(&self, method: &str, params: Option<JsonValue>) -> Result<ResponseFuture, RpcError> {
    let params = check_params(params)?;
    let id = self.state.id_counter.fetch_add(1, Ordering::Relaxed) + 1;
    let envelope = request_envelope(id, method, params);
    let payload = self.encode(&envelope)?;

    let (tx, rx) = oneshot::channel();
    self.state.pending.lock().insert(id, tx);

    trace!("[RPC] call {} id:{}", method, id);
    self.log_outbound(&envelope);
    self.enqueue(payload);
    Ok(ResponseFuture { rx })
  }

  /// Sends a one-way notification: no id, no pending entry, no reply.
  pub fn notify(&self, method: &str, params: Option<JsonValue>) -> Result<(), RpcError> {
    let params = check_params(params)?;
    let envelope = notification_envelope(method, params);
    let payload = self.encode(&envelope)?;
    self.log_outbound(&envelope);
    self.enqueue(payload);
    Ok(())
  }

  /// Entry point from the transport.
  ///
  /// Decode failures and protocol violations are reported on the `error`
  /// event and the message is dropped; they never poison the peer.
  pub fn process_message(&self, raw: Payload) {
    let object = match codec::decode(raw) {
      Ok(object) => object,
      Err(err) => {
        self.report_error(format!("failed to decode inbound payload: {}", err));
        return;
      },
    };
    self.log_inbound(&object);

    match object.into_message() {
      Ok(RpcMessage::Response { id, payload }) => self.handle_response(id, payload),
      Ok(RpcMessage::Request { id, method, params }) => self.handle_request(id, &method, params),
      Ok(RpcMessage::Notification { method, params }) => self.state.events.emit(&method, &params),
      Err(err) => self.report_error(err.to_string()),
    }
  }

  fn handle_response(&self, id: u64, payload: Result<JsonValue, RemoteError>) {
    let sender = self.state.pending.lock().remove(&id);
    match sender {
      Some(tx) => {
        // The caller may have abandoned the future; that is not an error.
        let _ = tx.send(payload);
      },
      None => self.report_error(format!("Response with id:{} has no pending request", id)),
    }
  }

  fn handle_request(&self, id: u64, method: &str, params: JsonValue) {
    let handler = self.state.methods.lock().get(method).cloned();
    let result = match handler {
      Some(handler) => (*handler)(params),
      None => Err(RemoteError::method_not_found(method)),
    };
    self.respond(id, result);
  }

  fn respond(&self, id: u64, result: Result<JsonValue, RemoteError>) {
    let envelope = response_envelope(id, result);
    match self.encode(&envelope) {
      Ok(payload) => {
        self.log_outbound(&envelope);
        self.enqueue(payload);
      },
      Err(err) => error!("[RPC] failed to encode response for id {}: {}", id, err),
    }
  }

  /// Exposes a method the remote peer may call. Unknown inbound methods are
  /// answered with a method-not-found error.
  pub fn register_method<F>(&self, method: &str, handler: F)
  where
    F: Fn(JsonValue) -> Result<JsonValue, RemoteError> + Send + Sync + 'static,
  {
    self
      .state
      .methods
      .lock()
      .insert(method.to_string(), Arc::new(handler));
  }

  pub fn unregister_method(&self, method: &str) -> bool {
    self.state.methods.lock().remove(method).is_some()
  }

  /// Subscribes to a named event: inbound notifications fan out under their
  /// method name, and the peer reports its own lifecycle through
  /// [`ERROR_EVENT`] and [`TRANSPORT_CLOSED_EVENT`].
  pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
  where
    F: Fn(&JsonValue) -> anyhow::Result<()> + Send + Sync + 'static,
  {
    self.state.events.on(event, handler)
  }

  pub fn once<F>(&self, event: &str, handler: F) -> SubscriptionId
  where
    F: Fn(&JsonValue) -> anyhow::Result<()> + Send + Sync + 'static,
  {
    self.state.events.once(event, handler)
  }

  pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
    self.state.events.off(event, id)
  }

  /// Emits a local event on this peer's bus. Used by upper layers to report
  /// failures of user hooks without poisoning the peer.
  pub fn emit(&self, event: &str, payload: &JsonValue) {
    self.state.events.emit(event, payload);
  }

  pub fn pending_requests(&self) -> usize {
    self.state.pending.lock().len()
  }

  pub fn is_connected(&self) -> bool {
    self.state.connected.load(Ordering::Acquire)
  }

  /// Toggles the one-line wire log per send/receive.
  pub fn set_logging(&self, log_messages: bool) {
    self.state.log_messages.store(log_messages, Ordering::Relaxed);
  }

  pub fn set_send_encoding(&self, encoding: Encoding) {
    *self.state.send_encoding.lock() = encoding;
  }

  pub fn send_encoding(&self) -> Encoding {
    *self.state.send_encoding.lock()
  }

  fn encode(&self, envelope: &JsonValue) -> Result<Payload, RpcError> {
    let encoding = *self.state.send_encoding.lock();
    Ok(codec::encode(envelope, encoding)?)
  }

  fn enqueue(&self, payload: Payload) {
    {
      let mut queue = self.state.send_queue.lock();
      if !self.state.connected.load(Ordering::Acquire) {
        queue.push_back(payload);
        return;
      }
    }
    self.transport_send(payload);
  }

  fn transport_send(&self, payload: Payload) {
    if let Err(err) = self.state.transport.send_message(payload) {
      error!("[RPC] transport send failed: {}", err);
      self.report_error(format!("transport send failed: {}", err));
    }
  }

  /// Enters the connected state and drains the queue in insertion order.
  /// Connect fires at most once per peer.
  fn handle_connect(&self) {
    if self.state.connected.swap(true, Ordering::AcqRel) {
      return;
    }
    trace!(
      "[RPC] connected, flushing {} queued message(s)",
      self.state.send_queue.lock().len()
    );
    loop {
      let payload = self.state.send_queue.lock().pop_front();
      match payload {
        Some(payload) => self.transport_send(payload),
        None => break,
      }
    }
  }

  fn handle_transport_closed(&self) {
    debug!("[RPC] transport closed");
    self.state.connected.store(false, Ordering::Release);
    self.state.events.emit(TRANSPORT_CLOSED_EVENT, &JsonValue::Null);
  }

  fn report_error(&self, message: String) {
    self
      .state
      .events
      .emit(ERROR_EVENT, &json!({ "message": message }));
  }

  fn log_enabled(&self) -> bool {
    cfg!(feature = "verbose") || self.state.log_messages.load(Ordering::Relaxed)
  }

  fn log_outbound(&self, envelope: &JsonValue) {
    if self.log_enabled() {
      debug!("[RPC] -> {}", envelope);
    }
  }

  fn log_inbound(&self, object: &RpcObject) {
    if self.log_enabled() {
      debug!("[RPC] <- {}", object);
    }
  }
}

fn upgrade(weak: &Weak<PeerState>) -> Option<RpcPeer> {
  weak.upgrade().map(|state| RpcPeer { state })
}

fn check_params(params: Option<JsonValue>) -> Result<Option<JsonValue>, RpcError> {
  match &params {
    None | Some(JsonValue::Array(_)) | Some(JsonValue::Object(_)) => Ok(params),
    Some(other) => Err(RpcError::InvalidParams(other.clone())),
  }
}

fn request_envelope(id: u64, method: &str, params: Option<JsonValue>) -> JsonValue {
  let mut envelope = Map::new();
  envelope.insert("jsonrpc".to_string(), json!(JSONRPC_VERSION));
  envelope.insert("id".to_string(), json!(id));
  envelope.insert("method".to_string(), json!(method));
  if let Some(params) = params {
    envelope.insert("params".to_string(), params);
  }
  JsonValue::Object(envelope)
}

fn notification_envelope(method: &str, params: Option<JsonValue>) -> JsonValue {
  let mut envelope = Map::new();
  envelope.insert("jsonrpc".to_string(), json!(JSONRPC_VERSION));
  envelope.insert("method".to_string(), json!(method));
  if let Some(params) = params {
    envelope.insert("params".to_string(), params);
  }
  JsonValue::Object(envelope)
}

fn response_envelope(id: u64, result: Result<JsonValue, RemoteError>) -> JsonValue {
  match result {
    Ok(result) => json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result }),
    Err(err) => json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": err }),
  }
}

/// The pending side of a `call`. Resolves with the response's `result`, or
/// rejects with the remote error (code, message and data preserved). Dropping
/// the future leaves the pending entry in place; it is resolved and discarded
/// when the response arrives.
pub struct ResponseFuture {
  rx: oneshot::Receiver<Result<JsonValue, RemoteError>>,
}

impl Future for ResponseFuture {
  type Output = Result<JsonValue, RpcError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match Pin::new(&mut self.rx).poll(cx) {
      Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
      Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(RpcError::Remote(err))),
      Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::PeerDisconnect)),
      Poll::Pending => Poll::Pending,
    }
  }
}

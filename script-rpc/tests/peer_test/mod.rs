use crate::util::{error_messages, record_errors, setup_log, RecordingTransport};
use script_rpc::core::codec::{Encoding, Payload};
use script_rpc::core::peer::{PeerConfig, RpcPeer, TRANSPORT_CLOSED_EVENT};
use script_rpc::error::{RemoteError, RpcError, METHOD_NOT_FOUND_CODE, PARSE_ERROR_CODE};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

fn json_peer(transport: Arc<RecordingTransport>) -> RpcPeer {
  RpcPeer::with_config(
    transport,
    PeerConfig {
      send_encoding: Encoding::Json,
      log_messages: false,
    },
  )
}

#[test]
fn rejects_unstructured_params_without_touching_the_wire() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());

  for bad in [json!(5), json!("x"), json!(null), json!(true)] {
    assert!(matches!(
      peer.call("x", Some(bad.clone())),
      Err(RpcError::InvalidParams(_))
    ));
    assert!(matches!(
      peer.notify("x", Some(bad)),
      Err(RpcError::InvalidParams(_))
    ));
  }

  assert_eq!(peer.pending_requests(), 0);
  assert_eq!(transport.sent_len(), 0);
}

#[test]
fn buffers_outbound_traffic_until_connect() {
  setup_log();
  let transport = RecordingTransport::deferred();
  let peer = json_peer(transport.clone());
  assert!(!peer.is_connected());

  peer.notify("a", None).unwrap();
  let _pending = peer.call("b", None).unwrap();
  assert_eq!(transport.sent_len(), 0);

  transport.fire_connect();
  assert!(peer.is_connected());

  let envelopes = transport.sent_envelopes();
  assert_eq!(envelopes.len(), 2);
  assert_eq!(envelopes[0]["method"], json!("a"));
  assert!(envelopes[0].get("id").is_none());
  assert_eq!(envelopes[1]["method"], json!("b"));
  assert_eq!(envelopes[1]["id"], json!(1));

  // Traffic after connect goes straight through.
  peer.notify("c", None).unwrap();
  assert_eq!(transport.sent_len(), 3);
}

#[test]
fn assigns_strictly_increasing_ids() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());

  for _ in 0..3 {
    let _ = peer.call("tick", None).unwrap();
  }

  let ids: Vec<u64> = transport
    .sent_envelopes()
    .iter()
    .map(|envelope| envelope["id"].as_u64().unwrap())
    .collect();
  assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn resolves_a_call_with_the_matching_result() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());

  let response = peer.call("Methods.bounce", Some(json!([1, "x"]))).unwrap();
  assert_eq!(peer.pending_requests(), 1);

  transport.deliver(Payload::Value(
    json!({ "jsonrpc": "2.0", "id": 1, "result": [1, "x"] }),
  ));

  assert_eq!(response.await.unwrap(), json!([1, "x"]));
  assert_eq!(peer.pending_requests(), 0);
}

#[tokio::test]
async fn rejects_a_call_with_the_remote_error() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());

  let response = peer.call("Methods.fails", None).unwrap();
  transport.deliver(Payload::Value(json!({
    "jsonrpc": "2.0",
    "id": 1,
    "error": { "code": -32602, "message": "Did not receive an argument", "data": { "hint": 1 } }
  })));

  match response.await {
    Err(RpcError::Remote(err)) => {
      assert_eq!(err.code, -32602);
      assert!(err.message.contains("Did not receive an argument"));
      assert_eq!(err.data, Some(json!({ "hint": 1 })));
    },
    other => panic!("expected a remote error, got {:?}", other),
  }
  assert_eq!(peer.pending_requests(), 0);
}

#[tokio::test]
async fn response_lacking_result_and_error_rejects_with_parse_error() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());

  let response = peer.call("m", None).unwrap();
  transport.deliver(Payload::Value(json!({ "jsonrpc": "2.0", "id": 1 })));

  match response.await {
    Err(RpcError::Remote(err)) => assert_eq!(err.code, PARSE_ERROR_CODE),
    other => panic!("expected a parse error, got {:?}", other),
  }
}

#[test]
fn response_without_pending_request_is_reported_and_dropped() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());
  let errors = record_errors(&peer);

  transport.deliver(Payload::Value(
    json!({ "jsonrpc": "2.0", "id": 99, "result": 1 }),
  ));

  let messages = error_messages(&errors);
  assert_eq!(messages.len(), 1);
  assert!(messages[0].contains("Response with id:99 has no pending request"));
  assert_eq!(transport.sent_len(), 0);
}

#[test]
fn malformed_inbound_payloads_are_reported_and_dropped() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());
  let errors = record_errors(&peer);

  transport.deliver(Payload::Text("{oops".to_string()));
  transport.deliver(Payload::Value(json!({ "jsonrpc": "2.0" })));

  let messages = error_messages(&errors);
  assert_eq!(messages.len(), 2);
  assert!(messages[0].contains("failed to decode"));
  assert!(messages[1].contains("neither id nor method"));
}

#[test]
fn fans_notifications_out_in_registration_order() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());
  let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

  for tag in ["first", "second"] {
    let seen = seen.clone();
    peer.on("Board.Move", move |payload| {
      seen.lock().push((tag, payload.clone()));
      Ok(())
    });
  }

  transport.deliver(Payload::Value(
    json!({ "jsonrpc": "2.0", "method": "Board.Move", "params": [2, 2] }),
  ));

  let seen = seen.lock();
  assert_eq!(seen.len(), 2);
  assert_eq!(seen[0], ("first", json!([2, 2])));
  assert_eq!(seen[1], ("second", json!([2, 2])));
}

#[test]
fn answers_registered_methods() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());

  peer.register_method("sum", |params| {
    let total: i64 = params
      .as_array()
      .map(|args| args.iter().filter_map(JsonValue::as_i64).sum())
      .unwrap_or(0);
    Ok(json!(total))
  });

  transport.deliver(Payload::Value(
    json!({ "jsonrpc": "2.0", "id": 7, "method": "sum", "params": [1, 2, 3] }),
  ));

  let envelopes = transport.sent_envelopes();
  assert_eq!(envelopes.len(), 1);
  assert_eq!(envelopes[0]["id"], json!(7));
  assert_eq!(envelopes[0]["result"], json!(6));
}

#[test]
fn unknown_methods_get_a_method_not_found_response() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());

  transport.deliver(Payload::Value(
    json!({ "jsonrpc": "2.0", "id": 8, "method": "nope" }),
  ));

  let envelopes = transport.sent_envelopes();
  assert_eq!(envelopes.len(), 1);
  assert_eq!(envelopes[0]["id"], json!(8));
  assert_eq!(
    envelopes[0]["error"]["code"],
    json!(METHOD_NOT_FOUND_CODE)
  );

  peer.register_method("nope", |_| Err(RemoteError::internal("still broken")));
  transport.deliver(Payload::Value(
    json!({ "jsonrpc": "2.0", "id": 9, "method": "nope" }),
  ));
  let envelopes = transport.sent_envelopes();
  assert_eq!(envelopes[1]["error"]["message"], json!("still broken"));
}

#[test]
fn receives_both_encodings_regardless_of_send_encoding() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = RpcPeer::new(transport.clone());
  let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
  let sink = seen.clone();
  peer.on("ping", move |payload| {
    sink.lock().push(payload.clone());
    Ok(())
  });

  let envelope = json!({ "jsonrpc": "2.0", "method": "ping", "params": [1] });
  transport.deliver(
    script_rpc::core::codec::encode(&envelope, Encoding::MessagePack).unwrap(),
  );
  transport.deliver(script_rpc::core::codec::encode(&envelope, Encoding::Json).unwrap());

  assert_eq!(seen.lock().len(), 2);
}

#[test]
fn send_encoding_defaults_to_messagepack_and_can_be_switched() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = RpcPeer::new(transport.clone());
  assert_eq!(peer.send_encoding(), Encoding::MessagePack);

  peer.notify("a", None).unwrap();
  peer.set_send_encoding(Encoding::Json);
  peer.notify("b", None).unwrap();

  let sent = transport.sent();
  assert!(sent[0].is_binary());
  assert!(sent[1].as_text().is_some());

  // Either way the payloads decode to the same envelope shape.
  let envelopes = transport.sent_envelopes();
  assert_eq!(envelopes[0]["method"], json!("a"));
  assert_eq!(envelopes[1]["method"], json!("b"));
}

#[test]
fn transport_close_is_reported_and_stops_flushing() {
  setup_log();
  let transport = RecordingTransport::immediate();
  let peer = json_peer(transport.clone());
  let closed = Arc::new(parking_lot::Mutex::new(0u32));

  let counter = closed.clone();
  peer.on(TRANSPORT_CLOSED_EVENT, move |_| {
    *counter.lock() += 1;
    Ok(())
  });

  let pending = peer.call("m", None).unwrap();
  drop(pending);
  transport.fire_close();

  assert_eq!(*closed.lock(), 1);
  assert!(!peer.is_connected());
  // Pending entries survive the close; the policy decision is the embedder's.
  assert_eq!(peer.pending_requests(), 1);

  // Outbound traffic buffers once the transport is gone.
  peer.notify("late", None).unwrap();
  assert_eq!(transport.sent_len(), 1);
}

mod common;

use std::time::Duration;

use mqttws_client_v31::{
    codec::{PublishPacket, SubackPacket, SubscribePacket, UnsubscribePacket, WireMessage},
    persistence::Direction,
    ClientError, ConnectOptions, ConnectStatus, ErrorCode, QualityOfService, SubscribeOptions,
    UnsubscribeOptions,
};
use serde_json::json;

use common::{connack, lost, message, Harness, Log};

fn publish(id: Option<u16>, topic: &str, payload: &str, qos: QualityOfService) -> WireMessage {
    WireMessage::Publish(PublishPacket {
        message_identifier: id,
        message: message(topic, payload, qos),
    })
}

fn on_failure_logger(log: &Log) -> impl FnOnce(Option<serde_json::Value>, ErrorCode, &str) {
    let log = log.clone();
    move |context, code, text| log.push(format!("failure {code} {text} {context:?}"))
}

#[test]
fn connect_writes_connect_after_open_and_reports_success() {
    let harness = Harness::new();
    let mut options = ConnectOptions::new();
    let log = harness.log.clone();
    options
        .set_user_name("user")
        .set_password("secret")
        .set_invocation_context(json!({"attempt": 1}))
        .set_on_success(move |context| log.push(format!("connected {}", context.unwrap())));

    harness.client.connect(options).unwrap();
    assert_eq!(harness.client.status(), ConnectStatus::Connecting);
    assert_eq!(*harness.wire.urls.borrow(), vec!["ws://localhost:8083/mqtt"]);
    assert!(harness.written().is_empty());

    harness.open();
    assert_eq!(harness.client.status(), ConnectStatus::AwaitingConnack);
    let written = harness.written();
    let [WireMessage::Connect(connect)] = written.as_slice() else {
        panic!("expected CONNECT, got {written:?}");
    };
    assert_eq!(connect.client_id, "c1");
    assert!(connect.clean_session);
    assert_eq!(connect.keep_alive_interval, 60);
    assert_eq!(connect.user_name.as_deref(), Some("user"));
    assert_eq!(connect.password.as_deref(), Some("secret"));

    harness.deliver(connack(0));
    assert!(harness.client.is_connected());
    assert_eq!(harness.log.take(), vec![r#"connected {"attempt":1}"#]);
}

#[test]
fn connect_twice_is_rejected() {
    let harness = Harness::new();
    harness.client.connect(ConnectOptions::new()).unwrap();
    assert!(matches!(
        harness.client.connect(ConnectOptions::new()),
        Err(ClientError::InvalidState("already connecting"))
    ));

    harness.open();
    harness.deliver(connack(0));
    assert!(matches!(
        harness.client.connect(ConnectOptions::new()),
        Err(ClientError::InvalidState("already connected"))
    ));
}

#[test]
fn bad_connack_fails_the_connect() {
    let harness = Harness::new();
    let mut options = ConnectOptions::new();
    options
        .set_invocation_context(json!("ctx"))
        .set_on_failure(on_failure_logger(&harness.log));

    harness.client.connect(options).unwrap();
    harness.open();
    harness.deliver(connack(5));

    assert!(!harness.client.is_connected());
    assert_eq!(harness.wire.closes.get(), 1);
    assert_eq!(
        harness.log.take(),
        vec![r#"failure 6 AMQJS0006E Bad Connack return code:5 Some(String("ctx"))"#]
    );
}

#[test]
fn connect_times_out() {
    let harness = Harness::new();
    let mut options = ConnectOptions::new();
    options
        .set_timeout(Duration::from_secs(5))
        .set_on_failure(on_failure_logger(&harness.log));

    harness.client.connect(options).unwrap();
    harness.clock.advance(Duration::from_secs(4));
    assert!(harness.log.take().is_empty());

    harness.clock.advance(Duration::from_secs(1));
    assert_eq!(
        harness.log.take(),
        vec!["failure 1 AMQJSC0001E Connect timed out. None"]
    );
    assert_eq!(harness.wire.closes.get(), 1);
    assert_eq!(harness.client.status(), ConnectStatus::Disconnected);

    // a late open of the abandoned socket changes nothing
    harness.open();
    assert!(harness.written().is_empty());
}

#[test]
fn socket_error_while_connecting_fails_the_connect() {
    let harness = Harness::new();
    let mut options = ConnectOptions::new();
    options.set_on_failure(on_failure_logger(&harness.log));

    harness.client.connect(options).unwrap();
    harness.sink().error("refused");
    assert_eq!(
        harness.log.take(),
        vec!["failure 7 AMQJS0007E Socket error:refused None"]
    );
}

#[test]
fn qos0_send_is_delivered_after_the_write() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());
    harness.written();

    harness
        .client
        .send(message("a/b", "hello", QualityOfService::Level0))
        .unwrap();
    let written = harness.written();
    let [WireMessage::Publish(publish)] = written.as_slice() else {
        panic!("expected PUBLISH, got {written:?}");
    };
    assert_eq!(publish.message_identifier, None);
    assert_eq!(publish.message.destination_name(), Some("a/b"));
    assert_eq!(harness.log.take(), vec!["delivered hello"]);
    assert!(harness.client.sent_message_ids().is_empty());
}

#[test]
fn qos1_send_is_persisted_until_puback() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());
    harness.written();

    harness
        .client
        .send(message("a/b", "one", QualityOfService::Level1))
        .unwrap();
    assert_eq!(
        harness.written(),
        vec![publish(Some(1), "a/b", "one", QualityOfService::Level1)]
    );
    assert_eq!(harness.client.sent_message_ids(), vec![1]);
    let key = harness.persistence().key(Direction::Sent, 1);
    assert_eq!(key, "Sent:localhost:8083:c1:1");
    assert!(harness.persistence().restore(&key).unwrap().is_some());
    assert!(harness.log.take().is_empty());

    harness.deliver(WireMessage::Puback(1));
    assert_eq!(harness.log.take(), vec!["delivered one"]);
    assert!(harness.client.sent_message_ids().is_empty());
    assert!(harness.store.is_empty());

    // a duplicate ack is tolerated
    harness.deliver(WireMessage::Puback(1));
    assert!(harness.log.take().is_empty());
    assert!(harness.client.is_connected());
}

#[test]
fn qos2_send_completes_the_handshake() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());
    harness.written();

    harness
        .client
        .send(message("a/b", "two", QualityOfService::Level2))
        .unwrap();
    assert_eq!(harness.written().len(), 1);

    harness.deliver(WireMessage::Pubrec(1));
    assert_eq!(harness.written(), vec![WireMessage::Pubrel(1)]);
    let key = harness.persistence().key(Direction::Sent, 1);
    let stored = harness.persistence().restore(&key).unwrap().unwrap();
    assert!(stored.pub_rec_received);
    assert!(harness.log.take().is_empty());

    harness.deliver(WireMessage::Pubcomp(1));
    assert_eq!(harness.log.take(), vec!["delivered two"]);
    assert!(harness.client.sent_message_ids().is_empty());
    assert!(harness.store.is_empty());
}

#[test]
fn qos1_receive_acks_then_delivers() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());
    harness.written();

    harness.deliver(publish(Some(3), "t", "m", QualityOfService::Level1));
    assert_eq!(harness.written(), vec![WireMessage::Puback(3)]);
    assert_eq!(harness.log.take(), vec!["arrived t m"]);
}

#[test]
fn qos2_receive_delivers_once_on_pubrel() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());
    harness.written();

    harness.deliver(publish(Some(7), "t", "exactly once", QualityOfService::Level2));
    assert_eq!(harness.written(), vec![WireMessage::Pubrec(7)]);
    assert!(harness.log.take().is_empty());
    assert_eq!(harness.client.received_message_ids(), vec![7]);
    let key = harness.persistence().key(Direction::Received, 7);
    assert_eq!(key, "Received:localhost:8083:c1:7");
    assert!(harness.persistence().restore(&key).unwrap().is_some());

    harness.deliver(WireMessage::Pubrel(7));
    assert_eq!(harness.written(), vec![WireMessage::Pubcomp(7)]);
    assert_eq!(harness.log.take(), vec!["arrived t exactly once"]);
    assert!(harness.client.received_message_ids().is_empty());
    assert!(harness.store.is_empty());

    // a repeated PUBREL is completed again but not delivered again
    harness.deliver(WireMessage::Pubrel(7));
    assert_eq!(harness.written(), vec![WireMessage::Pubcomp(7)]);
    assert!(harness.log.take().is_empty());
}

#[test]
fn packets_split_across_frames_are_reassembled() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());

    let mut bytes = publish(None, "t", "first", QualityOfService::Level0)
        .encode()
        .unwrap();
    bytes.extend(
        publish(None, "t", "second", QualityOfService::Level0)
            .encode()
            .unwrap(),
    );
    let (head, tail) = bytes.split_at(4);
    harness.deliver_bytes(head);
    assert!(harness.log.take().is_empty());
    harness.deliver_bytes(tail);
    assert_eq!(harness.log.take(), vec!["arrived t first", "arrived t second"]);
}

#[test]
fn subscribe_success_carries_the_context() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());
    harness.written();

    let mut options = SubscribeOptions::new();
    let log = harness.log.clone();
    options
        .set_qos(QualityOfService::Level1)
        .set_invocation_context(json!({"topic": "a/#"}))
        .set_on_success(move |context| log.push(format!("subscribed {}", context.unwrap())));
    harness.client.subscribe("a/#", options).unwrap();

    assert_eq!(
        harness.written(),
        vec![WireMessage::Subscribe(SubscribePacket {
            message_identifier: 1,
            topics: vec!["a/#".to_owned()],
            requested_qos: vec![QualityOfService::Level1],
        })]
    );
    // subscriptions are never persisted
    assert!(harness.store.is_empty());

    harness.deliver(WireMessage::Suback(SubackPacket {
        message_identifier: 1,
        granted_qos: vec![1],
    }));
    assert_eq!(harness.log.take(), vec![r#"subscribed {"topic":"a/#"}"#]);
    assert!(harness.client.sent_message_ids().is_empty());
}

#[test]
fn subscribe_timeout_fails_and_late_suback_is_silent() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());
    harness.written();

    let mut options = SubscribeOptions::new();
    let log = harness.log.clone();
    options
        .set_timeout(Duration::from_secs(5))
        .set_invocation_context(json!(42))
        .set_on_success(move |_| log.push("subscribed"))
        .set_on_failure(on_failure_logger(&harness.log));
    harness.client.subscribe("slow", options).unwrap();

    harness.clock.advance(Duration::from_secs(5));
    assert_eq!(
        harness.log.take(),
        vec!["failure 2 AMQJS0002E Subscribe timed out. Some(Number(42))"]
    );
    assert_eq!(harness.client.sent_message_ids(), vec![1]);

    harness.deliver(WireMessage::Suback(SubackPacket {
        message_identifier: 1,
        granted_qos: vec![0],
    }));
    assert!(harness.log.take().is_empty());
    assert!(harness.client.sent_message_ids().is_empty());
}

#[test]
fn suback_in_time_cancels_the_timeout() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());

    let mut options = SubscribeOptions::new();
    let log = harness.log.clone();
    options
        .set_timeout(Duration::from_secs(5))
        .set_on_success(move |_| log.push("subscribed"))
        .set_on_failure(on_failure_logger(&harness.log));
    harness.client.subscribe("fast", options).unwrap();
    harness.deliver(WireMessage::Suback(SubackPacket {
        message_identifier: 1,
        granted_qos: vec![0],
    }));

    harness.clock.advance(Duration::from_secs(10));
    assert_eq!(harness.log.take(), vec!["subscribed"]);
}

#[test]
fn unsubscribe_round_trip() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());
    harness.written();

    let mut options = UnsubscribeOptions::new();
    let log = harness.log.clone();
    options.set_on_success(move |context| log.push(format!("unsubscribed {context:?}")));
    harness.client.unsubscribe("a/#", options).unwrap();
    assert_eq!(
        harness.written(),
        vec![WireMessage::Unsubscribe(UnsubscribePacket {
            message_identifier: 1,
            topics: vec!["a/#".to_owned()],
        })]
    );

    harness.deliver(WireMessage::Unsuback(1));
    assert_eq!(harness.log.take(), vec!["unsubscribed None"]);
}

#[test]
fn unsubscribe_timeout_reports_its_own_code() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());

    let mut options = UnsubscribeOptions::new();
    options
        .set_timeout(Duration::from_secs(3))
        .set_on_failure(on_failure_logger(&harness.log));
    harness.client.unsubscribe("a/#", options).unwrap();
    harness.clock.advance(Duration::from_secs(3));
    assert_eq!(
        harness.log.take(),
        vec!["failure 3 AMQJS0003E Unsubscribe timed out. None"]
    );
}

#[test]
fn ping_then_ping_timeout() {
    let harness = Harness::new();
    let mut options = ConnectOptions::new();
    options.set_keep_alive_interval(Duration::from_secs(10));
    harness.connect(options);
    harness.written();

    harness.clock.advance(Duration::from_secs(10));
    assert_eq!(harness.written(), vec![WireMessage::Pingreq]);

    harness.deliver(WireMessage::Pingresp);
    harness.clock.advance(Duration::from_secs(10));
    assert_eq!(harness.written(), vec![WireMessage::Pingreq]);
    assert!(harness.log.take().is_empty());

    // no traffic since the last ping
    harness.clock.advance(Duration::from_secs(10));
    assert!(harness.written().is_empty());
    assert_eq!(
        harness.log.take(),
        vec![lost(ErrorCode::PingTimeout, "AMQJS0004E Ping timed out.")]
    );
    assert!(!harness.client.is_connected());
    assert_eq!(harness.wire.closes.get(), 1);
}

#[test]
fn zero_keep_alive_disables_pings() {
    let harness = Harness::new();
    let mut options = ConnectOptions::new();
    options.set_keep_alive_interval(Duration::ZERO);
    harness.connect(options);
    harness.written();

    harness.clock.advance(Duration::from_secs(3600));
    assert!(harness.written().is_empty());
    assert!(harness.client.is_connected());
}

#[test]
fn fractional_keep_alive_is_rejected() {
    let harness = Harness::new();
    let mut options = ConnectOptions::new();
    options.set_keep_alive_interval(Duration::from_millis(500));
    assert!(matches!(
        harness.client.connect(options),
        Err(ClientError::InvalidArgument(_))
    ));
    assert!(harness.wire.urls.borrow().is_empty());
    assert_eq!(harness.client.status(), ConnectStatus::Disconnected);
}

#[test]
fn malformed_utf_drops_the_connection() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());

    // PUBLISH QoS 0 whose topic is the invalid sequence c3 28
    harness.deliver_bytes(&[0x30, 0x04, 0x00, 0x02, 0xc3, 0x28]);
    assert_eq!(
        harness.log.take(),
        vec![lost(
            ErrorCode::InternalError,
            "AMQJS0005E Internal error. AMQJS0009E Malformed UTF data:c3 28"
        )]
    );
    assert_eq!(harness.wire.closes.get(), 1);
}

#[test]
fn unexpected_packet_type_drops_the_connection() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());

    harness.deliver(WireMessage::Pingreq);
    let log = harness.log.take();
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with("lost 5 AMQJS0005E Internal error."));
}

#[test]
fn socket_close_is_reported_as_connection_lost() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());

    harness.sink().closed();
    assert_eq!(
        harness.log.take(),
        vec![lost(ErrorCode::SocketClose, "AMQJS0008I Socket closed.")]
    );
    assert!(!harness.client.is_connected());
}

#[test]
fn failed_write_is_reported_as_socket_error() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());

    harness.wire.fail_writes.set(true);
    harness
        .client
        .send(message("a", "x", QualityOfService::Level0))
        .unwrap();
    let log = harness.log.take();
    assert_eq!(log, vec![lost(ErrorCode::SocketError, "AMQJS0007E Socket error:Transport error: broken pipe")]);
}

#[test]
fn explicit_disconnect_reports_ok() {
    let harness = Harness::new();
    harness.connect(ConnectOptions::new());
    harness.written();

    harness.client.disconnect().unwrap();
    assert_eq!(harness.written(), vec![WireMessage::Disconnect]);
    assert_eq!(harness.log.take(), vec![lost(ErrorCode::Ok, "AMQJS0000I OK.")]);
    assert_eq!(harness.wire.closes.get(), 1);
    assert!(!harness.client.is_connected());

    // the closed socket reporting its close is ignored
    harness.sink().closed();
    assert!(harness.log.take().is_empty());
    assert!(matches!(
        harness.client.disconnect(),
        Err(ClientError::InvalidState(_))
    ));
}

#[test]
fn disconnect_while_connecting_abandons_the_attempt() {
    let harness = Harness::new();
    let mut options = ConnectOptions::new();
    options.set_on_failure(on_failure_logger(&harness.log));
    harness.client.connect(options).unwrap();

    harness.client.disconnect().unwrap();
    assert_eq!(harness.wire.closes.get(), 1);
    assert_eq!(harness.log.take(), vec!["failure 0 AMQJS0000I OK. None"]);

    harness.open();
    assert!(harness.written().is_empty());

    // a new attempt uses a fresh transport
    harness.connect(ConnectOptions::new());
    assert_eq!(harness.wire.sinks.borrow().len(), 2);
}

#[test]
fn identifiers_wrap_and_skip_those_in_flight() {
    let harness = Harness::new();
    harness.client.set_max_message_identifier(4).unwrap();
    harness.connect(ConnectOptions::new());
    harness.written();

    for payload in ["a", "b", "c"] {
        harness
            .client
            .send(message("t", payload, QualityOfService::Level1))
            .unwrap();
    }
    assert_eq!(harness.client.sent_message_ids(), vec![1, 2, 3]);
    assert!(matches!(
        harness
            .client
            .send(message("t", "d", QualityOfService::Level1)),
        Err(ClientError::TooManyMessages(3))
    ));

    harness.deliver(WireMessage::Puback(2));
    harness.written();
    harness
        .client
        .send(message("t", "e", QualityOfService::Level1))
        .unwrap();
    assert_eq!(
        harness.written(),
        vec![publish(Some(2), "t", "e", QualityOfService::Level1)]
    );
}

#[test]
fn clean_session_purges_in_flight_state() {
    let harness = Harness::new();
    harness.connect_keeping_session();
    harness
        .client
        .send(message("t", "pending", QualityOfService::Level1))
        .unwrap();
    harness.deliver(publish(Some(5), "t", "held", QualityOfService::Level2));
    assert_eq!(harness.store.len(), 2);
    harness.sink().closed();
    harness.log.take();

    harness.connect(ConnectOptions::new());
    assert!(harness.client.sent_message_ids().is_empty());
    assert!(harness.client.received_message_ids().is_empty());
    assert!(harness.store.is_empty());

    // the held message is never delivered
    harness.deliver(WireMessage::Pubrel(5));
    assert!(harness.log.take().is_empty());
}

#[test]
fn session_resume_replays_once_in_order() {
    let harness = Harness::new();
    harness.connect_keeping_session();
    harness.written();
    harness
        .client
        .send(message("t", "one", QualityOfService::Level1))
        .unwrap();
    harness
        .client
        .send(message("t", "two", QualityOfService::Level2))
        .unwrap();
    let first_write = harness.wire.writes.borrow()[0].clone();
    harness.deliver(WireMessage::Pubrec(2));
    harness.sink().closed();
    harness.written();
    harness.log.take();

    harness.client.connect({
        let mut options = ConnectOptions::new();
        options.set_clean_session(false);
        options
    })
    .unwrap();
    harness.open();
    assert!(matches!(
        harness.written().as_slice(),
        [WireMessage::Connect(connect)] if !connect.clean_session
    ));

    harness.deliver(connack(0));
    let replayed = std::mem::take(&mut *harness.wire.writes.borrow_mut());
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0], first_write);
    assert_eq!(
        WireMessage::decode(&replayed[1]).unwrap(),
        WireMessage::Pubrel(2)
    );

    let key = harness.persistence().key(Direction::Sent, 1);
    assert!(!harness
        .persistence()
        .restore(&key)
        .unwrap()
        .unwrap()
        .message
        .duplicate());

    harness.deliver(WireMessage::Puback(1));
    harness.deliver(WireMessage::Pubcomp(2));
    assert_eq!(harness.log.take(), vec!["delivered one", "delivered two"]);
    assert!(harness.store.is_empty());
}

#[test]
fn replay_goes_out_before_work_queued_on_connect() {
    let harness = Harness::new();
    harness.connect_keeping_session();
    harness
        .client
        .send(message("t", "old", QualityOfService::Level1))
        .unwrap();
    harness.sink().closed();
    harness.written();
    harness.log.take();

    let client = harness.client.clone();
    let mut options = ConnectOptions::new();
    options.set_clean_session(false).set_on_success(move |_| {
        client
            .send(message("t", "new", QualityOfService::Level1))
            .unwrap();
    });
    harness.client.connect(options).unwrap();
    harness.open();
    harness.written();

    harness.deliver(connack(0));
    let written = harness.written();
    let payloads: Vec<(Option<u16>, String)> = written
        .iter()
        .map(|packet| match packet {
            WireMessage::Publish(publish) => (
                publish.message_identifier,
                publish.message.payload_string().unwrap().to_owned(),
            ),
            other => panic!("expected PUBLISH, got {other:?}"),
        })
        .collect();
    assert_eq!(
        payloads,
        vec![(Some(1), "old".to_owned()), (Some(2), "new".to_owned())]
    );
}

#[test]
fn new_client_restores_from_the_store() {
    let first = Harness::new();
    first.connect_keeping_session();
    first
        .client
        .send(message("t", "survivor", QualityOfService::Level1))
        .unwrap();
    first
        .deliver(publish(Some(9), "t", "held", QualityOfService::Level2));
    let store = first.store.clone();
    drop(first);

    let second = Harness::with_store(store);
    assert_eq!(second.client.sent_message_ids(), vec![1]);
    assert_eq!(second.client.received_message_ids(), vec![9]);

    second.connect_keeping_session();
    let written = second.written();
    assert!(matches!(
        written.last(),
        Some(WireMessage::Publish(PublishPacket { message_identifier: Some(1), .. }))
    ));

    second.deliver(WireMessage::Pubrel(9));
    assert_eq!(second.log.take(), vec!["arrived t held"]);

    // identifier 1 is still in flight
    second.written();
    second
        .client
        .send(message("t", "next", QualityOfService::Level1))
        .unwrap();
    assert!(matches!(
        second.written().as_slice(),
        [WireMessage::Publish(PublishPacket { message_identifier: Some(2), .. })]
    ));
}

#[test]
fn callbacks_may_call_back_into_the_client() {
    let harness = Harness::new();
    let client = harness.client.clone();
    let log = harness.log.clone();
    let mut options = ConnectOptions::new();
    options.set_on_success(move |_| {
        let mut subscribe = SubscribeOptions::new();
        let log = log.clone();
        subscribe.set_on_success(move |_| log.push("subscribed"));
        client.subscribe("from/callback", subscribe).unwrap();
    });

    harness.connect(options);
    let written = harness.written();
    assert!(matches!(
        written.last(),
        Some(WireMessage::Subscribe(subscribe)) if subscribe.topics == ["from/callback"]
    ));

    harness.deliver(WireMessage::Suback(SubackPacket {
        message_identifier: 1,
        granted_qos: vec![0],
    }));
    assert_eq!(harness.log.take(), vec!["subscribed"]);
}

#[test]
fn operations_need_a_connection_and_valid_input() {
    let harness = Harness::new();
    assert!(matches!(
        harness
            .client
            .subscribe("a", SubscribeOptions::new()),
        Err(ClientError::InvalidState("not connected"))
    ));
    assert!(matches!(
        harness
            .client
            .unsubscribe("a", UnsubscribeOptions::new()),
        Err(ClientError::InvalidState("not connected"))
    ));

    harness.connect(ConnectOptions::new());
    let mut options = SubscribeOptions::new();
    options.set_timeout(Duration::from_secs(1));
    assert!(matches!(
        harness.client.subscribe("a", options),
        Err(ClientError::InvalidArgument(_))
    ));
    assert!(matches!(
        harness
            .client
            .send(mqttws_client_v31::Message::from_string("no topic")),
        Err(ClientError::InvalidArgument(_))
    ));
    assert!(harness.client.sent_message_ids().is_empty());
}

#[test]
fn trace_log_lists_messages_in_flight() {
    let harness = Harness::new();
    harness.client.start_trace();
    harness.connect(ConnectOptions::new());
    harness
        .client
        .send(message("t", "traced", QualityOfService::Level1))
        .unwrap();

    let log = harness.client.get_trace_log().unwrap();
    assert!(log.iter().any(|line| line.starts_with("Client.connect")));
    assert!(log
        .iter()
        .any(|line| line.starts_with("Client.getTraceLog in flight messages 1")));
    assert!(log.iter().any(|line| line.starts_with("_sentMessages 1")));
}

//! Publish fan-out tests (SPEC_FULL §4.5, §8).

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};

use crate::codec::Decoder;
use crate::config::Config;
use crate::protocol::{Packet, QoS};

use super::super::state::BrokerState;
use super::dispatch_publish;

fn register(state: &BrokerState, id: &str) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(8);
    let (kill_tx, _kill_rx) = oneshot::channel();
    state.register_client(Arc::from(id), None, tx, kill_tx);
    rx
}

fn decode_one(bytes: Bytes) -> Packet {
    let mut buf = BytesMut::from(&bytes[..]);
    Decoder::new().decode(&mut buf).unwrap().expect("a complete packet")
}

#[test]
fn fans_out_to_every_subscriber_except_the_sender() {
    let state = BrokerState::new(Config::default());
    let mut rx_a = register(&state, "a");
    let mut rx_b = register(&state, "b");
    state.add_subscription(&Arc::from("a"), "t".to_string());
    state.add_subscription(&Arc::from("b"), "t".to_string());

    dispatch_publish(&state, "a", "t", Bytes::from_static(b"hello"), QoS::AtMostOnce);

    // "a" published, so "a" gets nothing back.
    assert!(rx_a.try_recv().is_err());

    let bytes = rx_b.try_recv().expect("b should receive the PUBLISH");
    match decode_one(bytes) {
        Packet::Publish(p) => {
            assert_eq!(&*p.topic, "t");
            assert_eq!(&p.payload[..], b"hello");
            assert_eq!(p.qos, QoS::AtMostOnce);
            assert!(p.packet_id.is_none());
        }
        other => panic!("expected Publish, got {other:?}"),
    }
}

#[test]
fn qos1_dispatch_carries_the_fixed_outbound_packet_id() {
    let state = BrokerState::new(Config::default());
    let mut rx_b = register(&state, "b");
    state.add_subscription(&Arc::from("b"), "t".to_string());

    dispatch_publish(&state, "a", "t", Bytes::from_static(b"x"), QoS::AtLeastOnce);

    let bytes = rx_b.try_recv().unwrap();
    match decode_one(bytes) {
        Packet::Publish(p) => assert_eq!(p.packet_id, Some(1)),
        other => panic!("expected Publish, got {other:?}"),
    }
}

#[test]
fn non_matching_topic_receives_nothing() {
    let state = BrokerState::new(Config::default());
    let mut rx_b = register(&state, "b");
    state.add_subscription(&Arc::from("b"), "other/topic".to_string());

    dispatch_publish(&state, "a", "t", Bytes::from_static(b"x"), QoS::AtMostOnce);

    assert!(rx_b.try_recv().is_err());
}

#[test]
fn full_outbound_queue_marks_subscriber_disconnected_without_panicking() {
    let state = BrokerState::new(Config::default());
    // Capacity 1: the first enqueue succeeds and is never drained, so the
    // second dispatch finds the queue full.
    let (tx, _rx) = mpsc::channel(1);
    let (kill_tx, _kill_rx) = oneshot::channel();
    let id: Arc<str> = Arc::from("b");
    state.register_client(id.clone(), None, tx, kill_tx);
    state.add_subscription(&id, "t".to_string());

    dispatch_publish(&state, "a", "t", Bytes::from_static(b"one"), QoS::AtMostOnce);
    dispatch_publish(&state, "a", "t", Bytes::from_static(b"two"), QoS::AtMostOnce);

    assert!(!state.list_clients()["b"].connected);
}

#[test]
fn dispatch_to_unknown_topic_is_a_silent_noop() {
    let state = BrokerState::new(Config::default());
    // No subscribers at all; this must not panic or do anything observable.
    dispatch_publish(&state, "a", "nobody/listens", Bytes::from_static(b"x"), QoS::AtMostOnce);
}

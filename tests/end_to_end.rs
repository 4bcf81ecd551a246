//! End-to-end scenarios against a real `TcpListener`, exercising the broker
//! the way a conforming MQTT client would: raw bytes over a socket, not
//! internal APIs.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use mqttbroker::broker::Broker;
use mqttbroker::codec::{decode_connack, decode_suback, decode_unsuback, read_string, read_u16, Encoder};
use mqttbroker::config::Config;
use mqttbroker::protocol::{
    Connect, Disconnect, Packet, QoS, ReturnCode, Subscribe, SubscribeFilter, Unsubscribe,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Reads one full frame (fixed header + body) off the wire and returns the
/// packet type nibble, flags, and raw body bytes.
async fn read_frame(stream: &mut TcpStream) -> (u8, u8, Vec<u8>) {
    let first = stream.read_u8().await.expect("read fixed header byte");
    let type_nibble = first >> 4;
    let flags = first & 0x0F;

    let mut value: u32 = 0;
    let mut multiplier: u32 = 1;
    loop {
        let b = stream.read_u8().await.expect("read remaining-length byte");
        value += (b & 0x7F) as u32 * multiplier;
        if b & 0x80 == 0 {
            break;
        }
        multiplier *= 128;
    }

    let mut body = vec![0u8; value as usize];
    if !body.is_empty() {
        stream.read_exact(&mut body).await.expect("read packet body");
    }
    (type_nibble, flags, body)
}

fn encode(packet: &Packet) -> Bytes {
    let mut buf = BytesMut::new();
    Encoder::new().encode(packet, &mut buf).expect("encode test packet");
    buf.freeze()
}

fn connect_packet(client_id: &str, username: Option<&str>, password: Option<&str>) -> Packet {
    Packet::Connect(Connect {
        protocol_name: "MQTT".to_string(),
        protocol_level: 4,
        clean_session: true,
        keep_alive: 60,
        client_id: client_id.to_string(),
        username: username.map(str::to_string),
        password: password.map(|p| Bytes::from(p.to_string())),
    })
}

async fn connect_with_retry(addr: std::net::SocketAddr) -> TcpStream {
    for _ in 0..50 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("could not connect to {addr}");
}

/// Spawn a broker bound to `addr`, returning its config handle for
/// introspection. The caller's own connections race the broker's bind, so
/// client connects retry briefly.
fn spawn_broker(mut config: Config, addr: std::net::SocketAddr) -> std::sync::Arc<Broker> {
    config.host = addr.ip().to_string();
    config.port = addr.port();
    let broker = std::sync::Arc::new(Broker::new(config));
    let run_handle = broker.clone();
    tokio::spawn(async move {
        let _ = run_handle.run().await;
    });
    broker
}

/// Performs a CONNECT and asserts it is accepted, returning the open socket.
async fn connect_accepted(
    addr: std::net::SocketAddr,
    client_id: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> TcpStream {
    let mut stream = connect_with_retry(addr).await;
    stream
        .write_all(&encode(&connect_packet(client_id, username, password)))
        .await
        .unwrap();
    let (type_nibble, _, body) = read_frame(&mut stream).await;
    assert_eq!(type_nibble, 2, "expected CONNACK");
    let connack = decode_connack(&body).unwrap();
    assert_eq!(connack.return_code, ReturnCode::Accepted);
    stream
}

async fn subscribe(stream: &mut TcpStream, packet_id: u16, topic: &str, qos: QoS) -> Vec<QoS> {
    stream
        .write_all(&encode(&Packet::Subscribe(Subscribe {
            packet_id,
            filters: vec![SubscribeFilter {
                topic: topic.to_string(),
                requested_qos: qos,
            }],
        })))
        .await
        .unwrap();
    let (type_nibble, _, body) = read_frame(stream).await;
    assert_eq!(type_nibble, 9, "expected SUBACK");
    let suback = decode_suback(&body).unwrap();
    assert_eq!(suback.packet_id, packet_id);
    suback.granted_qos
}

fn publish_packet(topic: &str, payload: &str, qos: QoS, packet_id: Option<u16>) -> Packet {
    Packet::Publish(mqttbroker::protocol::Publish {
        dup: false,
        qos,
        retain: false,
        topic: std::sync::Arc::from(topic),
        packet_id,
        payload: Bytes::from(payload.to_string()),
    })
}

/// Reads one PUBLISH frame and returns `(topic, payload)`.
async fn read_publish(stream: &mut TcpStream) -> (String, String) {
    let (type_nibble, flags, body) = read_frame(stream).await;
    assert_eq!(type_nibble, 3, "expected PUBLISH");
    let qos = QoS::from_bits((flags >> 1) & 0x03);
    let (topic, mut pos) = read_string(&body).unwrap();
    let topic = topic.to_string();
    if qos != QoS::AtMostOnce {
        pos += 2;
    }
    let payload = String::from_utf8(body[pos..].to_vec()).unwrap();
    (topic, payload)
}

#[tokio::test]
async fn basic_pub_sub() {
    let addr: std::net::SocketAddr = "127.0.0.1:18901".parse().unwrap();
    let mut config = Config::default();
    config.allow_anonymous = true;
    spawn_broker(config, addr);

    let mut a = connect_accepted(addr, "client-a", None, None).await;
    subscribe(&mut a, 1, "sensors/temp", QoS::AtMostOnce).await;

    let mut b = connect_accepted(addr, "client-b", None, None).await;
    b.write_all(&encode(&publish_packet("sensors/temp", "22.5", QoS::AtMostOnce, None)))
        .await
        .unwrap();

    let (topic, payload) = read_publish(&mut a).await;
    assert_eq!(topic, "sensors/temp");
    assert_eq!(payload, "22.5");

    // B published but isn't itself subscribed, so it should get nothing else
    // to read; a PINGREQ/PINGRESP round trip confirms the socket is still
    // alive and simply has no pending PUBLISH.
    b.write_all(&encode(&Packet::PingReq)).await.unwrap();
    let (type_nibble, _, _) = read_frame(&mut b).await;
    assert_eq!(type_nibble, 13, "expected PINGRESP");
}

#[tokio::test]
async fn qos1_ack() {
    let addr: std::net::SocketAddr = "127.0.0.1:18902".parse().unwrap();
    let mut config = Config::default();
    config.allow_anonymous = true;
    spawn_broker(config, addr);

    let mut a = connect_accepted(addr, "client-a", None, None).await;
    let granted = subscribe(&mut a, 1, "sensors/temp", QoS::AtLeastOnce).await;
    assert_eq!(granted, vec![QoS::AtLeastOnce]);

    let mut b = connect_accepted(addr, "client-b", None, None).await;
    b.write_all(&encode(&publish_packet(
        "sensors/temp",
        "22.5",
        QoS::AtLeastOnce,
        Some(17),
    )))
    .await
    .unwrap();

    let (type_nibble, _, body) = read_frame(&mut b).await;
    assert_eq!(type_nibble, 4, "expected PUBACK");
    assert_eq!(read_u16(&body).unwrap(), 17);

    let (topic, payload) = read_publish(&mut a).await;
    assert_eq!(topic, "sensors/temp");
    assert_eq!(payload, "22.5");
}

#[tokio::test]
async fn auth_reject() {
    let addr: std::net::SocketAddr = "127.0.0.1:18903".parse().unwrap();
    let mut config = Config::default();
    config.allow_anonymous = false;
    config.users.insert("alice".to_string(), "s3cret".to_string());
    let broker = spawn_broker(config, addr);

    let mut stream = connect_with_retry(addr).await;
    stream
        .write_all(&encode(&connect_packet("client-c", Some("alice"), Some("wrong"))))
        .await
        .unwrap();
    let (type_nibble, _, body) = read_frame(&mut stream).await;
    assert_eq!(type_nibble, 2);
    let connack = decode_connack(&body).unwrap();
    assert_eq!(connack.return_code, ReturnCode::RefusedNotAuthorized);

    // the socket should be closed by the broker right after the CONNACK
    let mut buf = [0u8; 1];
    let n = stream.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0, "connection should be closed after a refused CONNECT");

    assert!(broker.list_clients().is_empty());
}

#[tokio::test]
async fn capacity_limit() {
    let addr: std::net::SocketAddr = "127.0.0.1:18904".parse().unwrap();
    let mut config = Config::default();
    config.allow_anonymous = true;
    config.max_connections = 2;
    spawn_broker(config, addr);

    let _c1 = connect_accepted(addr, "c1", None, None).await;
    let _c2 = connect_accepted(addr, "c2", None, None).await;

    let mut c3 = connect_with_retry(addr).await;
    c3.write_all(&encode(&connect_packet("c3", None, None))).await.unwrap();
    let (type_nibble, _, body) = read_frame(&mut c3).await;
    assert_eq!(type_nibble, 2);
    let connack = decode_connack(&body).unwrap();
    assert_eq!(connack.return_code, ReturnCode::RefusedServerUnavailable);
}

#[tokio::test]
async fn duplicate_client_id_eviction() {
    let addr: std::net::SocketAddr = "127.0.0.1:18905".parse().unwrap();
    let mut config = Config::default();
    config.allow_anonymous = true;
    let broker = spawn_broker(config, addr);

    let mut first = connect_accepted(addr, "dev-1", None, None).await;
    subscribe(&mut first, 1, "a/b", QoS::AtMostOnce).await;

    let _second = connect_accepted(addr, "dev-1", None, None).await;

    // the first connection should observe EOF once evicted
    let mut buf = [0u8; 1];
    let n = first.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0, "evicted connection should be closed");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let topics = broker.list_topics();
    assert!(
        !topics.get("a/b").map(|ids| ids.contains(&"dev-1".to_string())).unwrap_or(false),
        "old subscription should have been purged on eviction"
    );
    let clients = broker.list_clients();
    let record = clients.get("dev-1").expect("new dev-1 record should exist");
    assert!(record.subscriptions.is_empty(), "new connection starts with no subscriptions");
}

#[tokio::test]
async fn disconnect_cleanup() {
    let addr: std::net::SocketAddr = "127.0.0.1:18906".parse().unwrap();
    let mut config = Config::default();
    config.allow_anonymous = true;
    let broker = spawn_broker(config, addr);

    let mut c1 = connect_accepted(addr, "c1", None, None).await;
    subscribe(&mut c1, 1, "a", QoS::AtMostOnce).await;
    subscribe(&mut c1, 2, "b", QoS::AtMostOnce).await;
    subscribe(&mut c1, 3, "c", QoS::AtMostOnce).await;

    c1.write_all(&encode(&Packet::Disconnect(Disconnect))).await.unwrap();
    let mut buf = [0u8; 1];
    let n = c1.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0, "socket should be closed after DISCONNECT");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!broker.list_clients().contains_key("c1"));
    let topics = broker.list_topics();
    for topic in ["a", "b", "c"] {
        assert!(!topics.contains_key(topic), "topic {topic} should be gone, only subscriber disconnected");
    }
}

#[tokio::test]
async fn unsubscribe_noop_when_not_subscribed() {
    let addr: std::net::SocketAddr = "127.0.0.1:18907".parse().unwrap();
    let mut config = Config::default();
    config.allow_anonymous = true;
    spawn_broker(config, addr);

    let mut c1 = connect_accepted(addr, "c1", None, None).await;
    c1.write_all(&encode(&Packet::Unsubscribe(Unsubscribe {
        packet_id: 9,
        topics: vec!["never/subscribed".to_string()],
    })))
    .await
    .unwrap();
    let (type_nibble, _, body) = read_frame(&mut c1).await;
    assert_eq!(type_nibble, 11, "expected UNSUBACK");
    let unsuback = decode_unsuback(&body).unwrap();
    assert_eq!(unsuback.packet_id, 9);
}

//! MQTT packet definitions (v3.1.1 subset this broker implements).

use std::sync::Arc;

use bytes::Bytes;

use super::QoS;

/// CONNACK return codes (MQTT 3.1.1 §3.2.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Accepted = 0,
    RefusedProtocol = 1,
    RefusedIdentifier = 2,
    RefusedServerUnavailable = 3,
    RefusedBadUser = 4,
    RefusedNotAuthorized = 5,
}

impl ReturnCode {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => ReturnCode::Accepted,
            1 => ReturnCode::RefusedProtocol,
            2 => ReturnCode::RefusedIdentifier,
            3 => ReturnCode::RefusedServerUnavailable,
            4 => ReturnCode::RefusedBadUser,
            5 => ReturnCode::RefusedNotAuthorized,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Connect {
    /// "MQTT" or "MQIsdp" — both accepted, neither validated further.
    pub protocol_name: String,
    pub protocol_level: u8,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: Arc<str>,
    /// Present iff `qos != AtMostOnce`.
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy)]
pub struct PubAck {
    pub packet_id: u16,
}

#[derive(Debug, Clone)]
pub struct SubscribeFilter {
    pub topic: String,
    pub requested_qos: QoS,
}

#[derive(Debug, Clone)]
pub struct Subscribe {
    pub packet_id: u16,
    pub filters: Vec<SubscribeFilter>,
}

#[derive(Debug, Clone)]
pub struct SubAck {
    pub packet_id: u16,
    pub granted_qos: Vec<QoS>,
}

#[derive(Debug, Clone)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct UnsubAck {
    pub packet_id: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct Disconnect;

/// Tagged union over every packet kind this broker accepts or emits.
#[derive(Debug, Clone)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect(Disconnect),
}

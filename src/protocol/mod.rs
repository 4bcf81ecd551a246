//! Protocol types shared by the codec and the connection handler.

mod error;
mod packet;

pub use error::{DecodeError, EncodeError};
pub use packet::{
    ConnAck, Connect, Disconnect, Packet, PubAck, Publish, ReturnCode, SubAck, Subscribe,
    SubscribeFilter, UnsubAck, Unsubscribe,
};

/// Quality of service. Only the two levels this broker supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
}

impl QoS {
    /// Decode the 2-bit QoS field from a PUBLISH fixed header. The MQTT-reserved
    /// value `0b11` is clamped to `AtLeastOnce` rather than rejected (see DESIGN.md /
    /// SPEC_FULL §8 boundary behaviors).
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0 => QoS::AtMostOnce,
            _ => QoS::AtLeastOnce,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// The packet type nibble occupying the top 4 bits of the fixed header byte,
/// in MQTT 3.1.1 numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        Some(match nibble {
            1 => PacketType::Connect,
            2 => PacketType::ConnAck,
            3 => PacketType::Publish,
            4 => PacketType::PubAck,
            8 => PacketType::Subscribe,
            9 => PacketType::SubAck,
            10 => PacketType::Unsubscribe,
            11 => PacketType::UnsubAck,
            12 => PacketType::PingReq,
            13 => PacketType::PingResp,
            14 => PacketType::Disconnect,
            _ => return None,
        })
    }
}

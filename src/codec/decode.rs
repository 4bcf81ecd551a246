//! MQTT packet decoder.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};

use super::{read_binary, read_string, read_u16, read_variable_int};
use crate::protocol::{
    ConnAck, Connect, DecodeError, Disconnect, Packet, PacketType, PubAck, Publish, QoS,
    ReturnCode, SubAck, Subscribe, SubscribeFilter, UnsubAck, Unsubscribe,
};

/// Decodes one MQTT packet at a time from a growing receive buffer.
///
/// `decode` returns `Ok(None)` when `buf` does not yet contain a complete
/// packet; the caller (the connection read loop) appends more bytes and
/// calls again. The buffer is only advanced once a full packet has been
/// parsed, so a partial trailing packet is never lost.
#[derive(Debug, Default)]
pub struct Decoder;

impl Decoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Packet>, DecodeError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let first_byte = buf[0];
        let type_nibble = first_byte >> 4;
        let flags = first_byte & 0x0F;

        let packet_type = PacketType::from_nibble(type_nibble)
            .ok_or(DecodeError::InvalidPacketType(type_nibble))?;

        let (remaining_length, len_bytes) = match read_variable_int(&buf[1..])? {
            Some(v) => v,
            None => return Ok(None),
        };
        let header_len = 1 + len_bytes;
        let total_len = header_len + remaining_length as usize;

        if buf.len() < total_len {
            return Ok(None);
        }

        let mut frame = buf.split_to(total_len);
        frame.advance(header_len);
        let body: &[u8] = &frame;

        let packet = match packet_type {
            PacketType::Connect => Packet::Connect(decode_connect(body)?),
            PacketType::Publish => Packet::Publish(decode_publish(body, flags)?),
            PacketType::PubAck => Packet::PubAck(decode_puback(body)?),
            PacketType::Subscribe => Packet::Subscribe(decode_subscribe(body)?),
            PacketType::Unsubscribe => Packet::Unsubscribe(decode_unsubscribe(body)?),
            PacketType::PingReq => Packet::PingReq,
            PacketType::Disconnect => Packet::Disconnect(Disconnect),
            // ConnAck/SubAck/UnsubAck/PingResp are broker-to-client only; a
            // conforming client never sends them, so treat as a protocol
            // violation rather than silently accepting.
            PacketType::ConnAck
            | PacketType::SubAck
            | PacketType::UnsubAck
            | PacketType::PingResp => {
                return Err(DecodeError::MalformedPacket(
                    "client sent a server-to-client packet type",
                ));
            }
        };

        Ok(Some(packet))
    }
}

fn decode_connect(body: &[u8]) -> Result<Connect, DecodeError> {
    let (protocol_name, n) = read_string(body)?;
    if protocol_name != "MQTT" && protocol_name != "MQIsdp" {
        return Err(DecodeError::MalformedPacket("unrecognized protocol name"));
    }
    let protocol_name = protocol_name.to_string();
    let mut pos = n;

    if body.len() < pos + 1 {
        return Err(DecodeError::MalformedPacket("truncated CONNECT header"));
    }
    let protocol_level = body[pos];
    pos += 1;

    if body.len() < pos + 1 {
        return Err(DecodeError::MalformedPacket("truncated connect flags"));
    }
    let connect_flags = body[pos];
    pos += 1;

    let clean_session = connect_flags & 0x02 != 0;
    let will_flag = connect_flags & 0x04 != 0;
    let password_flag = connect_flags & 0x40 != 0;
    let username_flag = connect_flags & 0x80 != 0;

    let keep_alive = read_u16(&body[pos..])?;
    pos += 2;

    let (client_id, n) = read_string(&body[pos..])?;
    let client_id = client_id.to_string();
    pos += n;

    // Will topic/payload: parsed and discarded. Last Will and Testament is an
    // explicit non-goal (SPEC_FULL §1); we still need to walk past the bytes
    // to reach username/password.
    if will_flag {
        let (_will_topic, n) = read_string(&body[pos..])?;
        pos += n;
        let (_will_payload, n) = read_binary(&body[pos..])?;
        pos += n;
    }

    let username = if username_flag {
        let (u, n) = read_string(&body[pos..])?;
        pos += n;
        Some(u.to_string())
    } else {
        None
    };

    let password = if password_flag {
        let (p, n) = read_binary(&body[pos..])?;
        pos += n;
        Some(Bytes::copy_from_slice(p))
    } else {
        None
    };
    let _ = pos;

    Ok(Connect {
        protocol_name,
        protocol_level,
        clean_session,
        keep_alive,
        client_id,
        username,
        password,
    })
}

fn decode_publish(body: &[u8], flags: u8) -> Result<Publish, DecodeError> {
    let dup = flags & 0x08 != 0;
    let qos = QoS::from_bits((flags >> 1) & 0x03);
    let retain = flags & 0x01 != 0;

    let (topic, n) = read_string(body)?;
    let topic: Arc<str> = Arc::from(topic);
    let mut pos = n;

    let packet_id = if qos != QoS::AtMostOnce {
        let id = read_u16(&body[pos..])?;
        pos += 2;
        Some(id)
    } else {
        None
    };

    let payload = Bytes::copy_from_slice(&body[pos..]);

    Ok(Publish {
        dup,
        qos,
        retain,
        topic,
        packet_id,
        payload,
    })
}

fn decode_puback(body: &[u8]) -> Result<PubAck, DecodeError> {
    Ok(PubAck {
        packet_id: read_u16(body)?,
    })
}

fn decode_subscribe(body: &[u8]) -> Result<Subscribe, DecodeError> {
    let packet_id = read_u16(body)?;
    let mut pos = 2;
    let mut filters = Vec::new();

    while pos < body.len() {
        let (topic, n) = read_string(&body[pos..])?;
        let topic = topic.to_string();
        pos += n;
        if body.len() < pos + 1 {
            return Err(DecodeError::MalformedPacket("truncated subscribe options"));
        }
        let requested_qos = QoS::from_bits(body[pos] & 0x03);
        pos += 1;
        filters.push(SubscribeFilter {
            topic,
            requested_qos,
        });
    }

    if filters.is_empty() {
        return Err(DecodeError::MalformedPacket(
            "SUBSCRIBE with no topic filters",
        ));
    }

    Ok(Subscribe { packet_id, filters })
}

fn decode_unsubscribe(body: &[u8]) -> Result<Unsubscribe, DecodeError> {
    let packet_id = read_u16(body)?;
    let mut pos = 2;
    let mut topics = Vec::new();

    while pos < body.len() {
        let (topic, n) = read_string(&body[pos..])?;
        topics.push(topic.to_string());
        pos += n;
    }

    if topics.is_empty() {
        return Err(DecodeError::MalformedPacket(
            "UNSUBSCRIBE with no topic filters",
        ));
    }

    Ok(Unsubscribe { packet_id, topics })
}

// Kept for completeness/testing symmetry even though the broker never
// decodes these itself (it only encodes them); useful for integration
// tests that read raw bytes back over a real socket.
pub fn decode_connack(body: &[u8]) -> Result<ConnAck, DecodeError> {
    if body.len() < 2 {
        return Err(DecodeError::MalformedPacket("truncated CONNACK"));
    }
    let session_present = body[0] & 0x01 != 0;
    let return_code = ReturnCode::from_byte(body[1])
        .ok_or(DecodeError::MalformedPacket("unknown CONNACK return code"))?;
    Ok(ConnAck {
        session_present,
        return_code,
    })
}

pub fn decode_suback(body: &[u8]) -> Result<SubAck, DecodeError> {
    let packet_id = read_u16(body)?;
    let granted_qos = body[2..]
        .iter()
        .map(|&b| QoS::from_bits(b & 0x03))
        .collect();
    Ok(SubAck {
        packet_id,
        granted_qos,
    })
}

pub fn decode_unsuback(body: &[u8]) -> Result<UnsubAck, DecodeError> {
    Ok(UnsubAck {
        packet_id: read_u16(body)?,
    })
}

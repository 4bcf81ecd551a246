//! MQTT packet encoder (v3.1.1 framing only).

use bytes::{BufMut, BytesMut};

use super::{write_binary, write_string, write_variable_int};
use crate::protocol::{
    ConnAck, Connect, Disconnect, EncodeError, Packet, PubAck, Publish, QoS, SubAck, Subscribe,
    UnsubAck, Unsubscribe,
};

/// Encodes [`Packet`] values to their MQTT 3.1.1 wire representation.
#[derive(Debug, Default)]
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, packet: &Packet, buf: &mut BytesMut) -> Result<(), EncodeError> {
        match packet {
            Packet::Connect(p) => encode_connect(p, buf),
            Packet::ConnAck(p) => encode_connack(p, buf),
            Packet::Publish(p) => encode_publish(p, buf),
            Packet::PubAck(p) => encode_puback(p, buf),
            Packet::Subscribe(p) => encode_subscribe(p, buf),
            Packet::SubAck(p) => encode_suback(p, buf),
            Packet::Unsubscribe(p) => encode_unsubscribe(p, buf),
            Packet::UnsubAck(p) => encode_unsuback(p, buf),
            Packet::PingReq => {
                buf.put_u8(0xC0);
                buf.put_u8(0x00);
                Ok(())
            }
            Packet::PingResp => {
                buf.put_u8(0xD0);
                buf.put_u8(0x00);
                Ok(())
            }
            Packet::Disconnect(p) => encode_disconnect(p, buf),
        }
    }
}

fn encode_connect(packet: &Connect, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let mut remaining_length = 6; // "MQTT" length-prefixed
    remaining_length += 1; // protocol level
    remaining_length += 1; // connect flags
    remaining_length += 2; // keep alive
    remaining_length += 2 + packet.client_id.len();
    if let Some(ref username) = packet.username {
        remaining_length += 2 + username.len();
    }
    if let Some(ref password) = packet.password {
        remaining_length += 2 + password.len();
    }

    buf.put_u8(0x10);
    write_variable_int(buf, remaining_length as u32)?;
    write_string(buf, "MQTT")?;
    buf.put_u8(packet.protocol_level);

    let mut flags: u8 = 0;
    if packet.clean_session {
        flags |= 0x02;
    }
    if packet.password.is_some() {
        flags |= 0x40;
    }
    if packet.username.is_some() {
        flags |= 0x80;
    }
    buf.put_u8(flags);

    buf.put_u16(packet.keep_alive);
    write_string(buf, &packet.client_id)?;
    if let Some(ref username) = packet.username {
        write_string(buf, username)?;
    }
    if let Some(ref password) = packet.password {
        write_binary(buf, password)?;
    }
    Ok(())
}

fn encode_connack(packet: &ConnAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
    buf.put_u8(0x20);
    write_variable_int(buf, 2)?;
    buf.put_u8(if packet.session_present { 0x01 } else { 0x00 });
    buf.put_u8(packet.return_code.to_byte());
    Ok(())
}

fn encode_publish(packet: &Publish, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let mut remaining_length = 2 + packet.topic.len();
    if packet.qos != QoS::AtMostOnce {
        remaining_length += 2;
    }
    remaining_length += packet.payload.len();

    let mut first_byte: u8 = 0x30;
    if packet.dup {
        first_byte |= 0x08;
    }
    first_byte |= packet.qos.bits() << 1;
    if packet.retain {
        first_byte |= 0x01;
    }
    buf.put_u8(first_byte);
    write_variable_int(buf, remaining_length as u32)?;

    write_string(buf, &packet.topic)?;
    if let Some(packet_id) = packet.packet_id {
        buf.put_u16(packet_id);
    }
    buf.put_slice(&packet.payload);
    Ok(())
}

fn encode_puback(packet: &PubAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
    buf.put_u8(0x40);
    buf.put_u8(0x02);
    buf.put_u16(packet.packet_id);
    Ok(())
}

fn encode_subscribe(packet: &Subscribe, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let mut remaining_length = 2;
    for filter in &packet.filters {
        remaining_length += 2 + filter.topic.len() + 1;
    }

    buf.put_u8(0x82);
    write_variable_int(buf, remaining_length as u32)?;
    buf.put_u16(packet.packet_id);
    for filter in &packet.filters {
        write_string(buf, &filter.topic)?;
        buf.put_u8(filter.requested_qos.bits());
    }
    Ok(())
}

fn encode_suback(packet: &SubAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let remaining_length = 2 + packet.granted_qos.len();
    buf.put_u8(0x90);
    write_variable_int(buf, remaining_length as u32)?;
    buf.put_u16(packet.packet_id);
    for qos in &packet.granted_qos {
        buf.put_u8(qos.bits());
    }
    Ok(())
}

fn encode_unsubscribe(packet: &Unsubscribe, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let mut remaining_length = 2;
    for topic in &packet.topics {
        remaining_length += 2 + topic.len();
    }

    buf.put_u8(0xA2);
    write_variable_int(buf, remaining_length as u32)?;
    buf.put_u16(packet.packet_id);
    for topic in &packet.topics {
        write_string(buf, topic)?;
    }
    Ok(())
}

fn encode_unsuback(packet: &UnsubAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
    // v3.1.1 UNSUBACK has no payload beyond the packet identifier.
    buf.put_u8(0xB0);
    buf.put_u8(0x02);
    buf.put_u16(packet.packet_id);
    Ok(())
}

fn encode_disconnect(_packet: &Disconnect, buf: &mut BytesMut) -> Result<(), EncodeError> {
    // v3.1.1 DISCONNECT has no payload.
    buf.put_u8(0xE0);
    buf.put_u8(0x00);
    Ok(())
}

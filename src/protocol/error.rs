//! Protocol error types

use std::fmt;

/// Errors that can occur during packet decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The stream ended before a full packet body was available.
    UnexpectedEof,
    /// The "remaining length" field would need a fifth continuation byte,
    /// or otherwise does not form a valid variable-length integer.
    MalformedLength,
    /// A length-prefixed string was not valid UTF-8.
    InvalidUtf8,
    /// The fixed-header packet type nibble does not match any known packet type.
    InvalidPacketType(u8),
    /// The packet body did not match the shape required for its declared type
    /// (e.g. a SUBSCRIBE with zero filters).
    MalformedPacket(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of stream"),
            DecodeError::MalformedLength => write!(f, "malformed remaining length"),
            DecodeError::InvalidUtf8 => write!(f, "invalid UTF-8 in length-prefixed string"),
            DecodeError::InvalidPacketType(b) => write!(f, "invalid packet type nibble: {:#x}", b),
            DecodeError::MalformedPacket(what) => write!(f, "malformed packet: {}", what),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors that can occur during packet encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The computed remaining length exceeds what a 4-byte variable-length
    /// integer can represent.
    PacketTooLarge,
    /// A length-prefixed string or binary field exceeds 65535 bytes.
    StringTooLong,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::PacketTooLarge => write!(f, "packet too large to encode"),
            EncodeError::StringTooLong => write!(f, "string or binary field exceeds 65535 bytes"),
        }
    }
}

impl std::error::Error for EncodeError {}

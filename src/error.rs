//! Library-wide error type (SPEC_FULL §7, §10.2).
//!
//! `BrokerError` covers everything that can go wrong while servicing a
//! connection or an admin call. It never crosses a task boundary: the
//! per-connection task matches on it purely to decide a log level and to
//! run the close-transition cleanup (SPEC_FULL §4.3).

use std::fmt;

use crate::protocol::{DecodeError, EncodeError};

#[derive(Debug)]
pub enum BrokerError {
    /// Framing or content malformed, or an out-of-order packet for the
    /// connection's current state (e.g. a second CONNECT).
    Protocol(&'static str),
    /// CONNECT rejected for authentication reasons.
    Auth,
    /// CONNECT rejected because `max_connections` was already reached.
    Capacity,
    /// Socket read/write failure.
    Io(std::io::Error),
    /// Admin-surface call rejected (e.g. `remove_user` for an unknown user).
    Admin(&'static str),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            BrokerError::Auth => write!(f, "authentication refused"),
            BrokerError::Capacity => write!(f, "server at capacity"),
            BrokerError::Io(e) => write!(f, "io error: {e}"),
            BrokerError::Admin(msg) => write!(f, "admin error: {msg}"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        BrokerError::Io(e)
    }
}

impl From<DecodeError> for BrokerError {
    fn from(_: DecodeError) -> Self {
        BrokerError::Protocol("malformed packet")
    }
}

impl From<EncodeError> for BrokerError {
    fn from(_: EncodeError) -> Self {
        BrokerError::Protocol("failed to encode outbound packet")
    }
}

//! A lightweight MQTT 3.1.1 message broker.
//!
//! Implements the subset of the protocol needed to accept TCP connections,
//! authenticate clients, track topic subscriptions, and fan out published
//! messages to matching subscribers, with an in-process administrative
//! surface for configuration and runtime inspection.

pub mod auth;
pub mod broker;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;

pub use broker::Broker;
pub use config::Config;
pub use error::BrokerError;
pub use protocol::QoS;

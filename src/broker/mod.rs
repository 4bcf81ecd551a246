//! MQTT Broker Core
//!
//! Ties the shared broker state, the publish dispatcher, and the
//! per-connection protocol handler together behind a listener and an
//! in-process administrative surface (SPEC_FULL §4.6, §6).

mod connection;
pub mod dispatcher;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::BrokerError;
use crate::protocol::QoS;

pub use state::ClientInfo;

/// The MQTT broker: a listener plus the shared state every connection task
/// and the admin surface operate on (SPEC_FULL §4.6, §5, §6).
pub struct Broker {
    state: Arc<state::BrokerState>,
    shutdown: broadcast::Sender<()>,
}

impl Broker {
    pub fn new(config: Config) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            state: Arc::new(state::BrokerState::new(config)),
            shutdown,
        }
    }

    /// Bind `host:port` and accept connections until `shutdown` fires
    /// (SPEC_FULL §4.6). Admission control happens inside CONNECT, not here.
    pub async fn run(&self) -> Result<(), BrokerError> {
        let config = self.state.get_config();
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|_| BrokerError::Admin("invalid host/port configuration"))?;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "MQTT listener bound");
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                biased;

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted connection");
                            let state = self.state.clone();
                            let conn_shutdown = self.shutdown.subscribe();
                            tokio::spawn(connection::run(stream, peer, state, conn_shutdown));
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    debug!("listener shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Signal every connection task and the accept loop to stop
    /// (SPEC_FULL §5 "Cancellation & timeouts").
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    // ---- administrative surface (SPEC_FULL §6) ----

    pub fn get_config(&self) -> Config {
        self.state.get_config()
    }

    /// Mutates configuration in place; does not re-bind the listener.
    pub fn update_config(&self, new_config: Config) {
        self.state.update_config(new_config);
    }

    pub fn list_users(&self) -> Vec<String> {
        self.state.list_users()
    }

    pub fn add_user(&self, username: String, password: String) {
        self.state.add_user(username, password);
    }

    pub fn remove_user(&self, username: &str) -> bool {
        self.state.remove_user(username)
    }

    pub fn list_clients(&self) -> std::collections::HashMap<String, ClientInfo> {
        self.state.list_clients()
    }

    pub fn list_topics(&self) -> std::collections::HashMap<String, Vec<String>> {
        self.state.list_topics()
    }

    /// Route a message as if published by `sender_id`, used by the admin UI
    /// and the admin-side test client (SPEC_FULL §6).
    pub fn inject_publish(&self, sender_id: &str, topic: &str, payload: Bytes, qos: QoS) {
        dispatcher::dispatch_publish(&self.state, sender_id, topic, payload, qos);
    }
}

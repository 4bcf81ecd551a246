//! Per-connection MQTT protocol handler (SPEC_FULL §4.3).
//!
//! One task owns one accepted `TcpStream` end to end: it decodes inbound
//! packets with the framing codec, applies them to the shared `BrokerState`,
//! and writes outbound packets drawn from its own outbound queue — the same
//! queue the publish dispatcher enqueues fan-out onto (SPEC_FULL §9
//! "Outbound sink per connection"). A single `tokio::select!` loop drives
//! both directions; there is no separate reader/writer task pair.

mod connect;
mod disconnect;
mod publish;
mod subscribe;

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::codec::{Decoder, Encoder};
use crate::error::BrokerError;
use crate::protocol::{DecodeError, Packet};

use super::state::{BrokerState, OUTBOUND_CHANNEL_CAPACITY};

/// Per-connection state machine position (SPEC_FULL §4.3). `Closed` is not
/// represented explicitly: reaching it is modeled by the read loop
/// returning, after which [`Connection::close`] always runs.
enum ConnState {
    AwaitConnect,
    Connected { client_id: Arc<str> },
}

struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<BrokerState>,
    decoder: Decoder,
    read_buf: BytesMut,
    conn_state: ConnState,
    outbound_tx: mpsc::Sender<Bytes>,
    /// Consumed by [`connect::handle_connect`] on acceptance and handed to
    /// `BrokerState::register_client` so a later duplicate CONNECT can evict
    /// this connection (SPEC_FULL §4.3 "Eviction").
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set once `kill_rx` fires. `register_client`'s eviction path already
    /// removed this connection's registry record and purged its index
    /// entries before installing the new one under the same `client_id`;
    /// `close` must not repeat that removal; a newer connection's record
    /// now lives under that id and would be wrongly deleted.
    evicted: bool,
}

/// Drive one accepted connection from CONNECT through close
/// (SPEC_FULL §4.3, §4.6).
pub async fn run(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<BrokerState>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
    let (kill_tx, kill_rx) = oneshot::channel();

    let mut conn = Connection {
        stream,
        addr,
        state,
        decoder: Decoder::new(),
        read_buf: BytesMut::with_capacity(4096),
        conn_state: ConnState::AwaitConnect,
        outbound_tx,
        kill_tx: Some(kill_tx),
        evicted: false,
    };

    conn.drive(outbound_rx, kill_rx, &mut shutdown).await;
    conn.close();
}

impl Connection {
    /// The read/write/cancellation select loop (SPEC_FULL §4.3 "Read loop
    /// shape"). Returns once the connection should be closed, for any
    /// reason; the caller always runs [`Connection::close`] afterward.
    async fn drive(
        &mut self,
        mut outbound_rx: mpsc::Receiver<Bytes>,
        mut kill_rx: oneshot::Receiver<()>,
        shutdown: &mut broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;

                result = self.stream.read_buf(&mut self.read_buf) => {
                    match result {
                        Ok(0) => {
                            if self.read_buf.is_empty() {
                                debug!(addr = %self.addr, "connection closed by peer");
                            } else {
                                // Bytes are buffered but don't form a complete packet
                                // (decode() would have returned Ok(None)): the peer
                                // went away mid-packet (SPEC_FULL §4.1 UnexpectedEof).
                                let err = DecodeError::UnexpectedEof;
                                warn!(addr = %self.addr, error = %err, "connection closed mid-packet");
                            }
                            return;
                        }
                        Ok(_) => match self.process_buffered_packets().await {
                            Ok(ControlFlow::Continue(())) => {}
                            Ok(ControlFlow::Break(())) => {
                                debug!(addr = %self.addr, "DISCONNECT");
                                return;
                            }
                            Err(e) => {
                                debug!(addr = %self.addr, error = %e, "closing connection");
                                return;
                            }
                        },
                        Err(e) => {
                            debug!(addr = %self.addr, error = %e, "read error, closing connection");
                            return;
                        }
                    }
                }

                maybe_bytes = outbound_rx.recv() => {
                    match maybe_bytes {
                        Some(bytes) => {
                            if let Err(e) = self.stream.write_all(&bytes).await {
                                debug!(addr = %self.addr, error = %e, "write error, closing connection");
                                return;
                            }
                        }
                        None => {
                            // outbound_tx dropped along with this Connection only at
                            // shutdown; unreachable in practice since we hold a clone.
                        }
                    }
                }

                _ = &mut kill_rx => {
                    debug!(addr = %self.addr, "evicted by a newer connection with the same client id");
                    self.evicted = true;
                    return;
                }

                _ = shutdown.recv() => {
                    debug!(addr = %self.addr, "shutting down");
                    return;
                }
            }
        }
    }

    async fn process_buffered_packets(&mut self) -> Result<ControlFlow<()>, BrokerError> {
        loop {
            let packet = match self.decoder.decode(&mut self.read_buf) {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(ControlFlow::Continue(())),
                Err(e) => {
                    warn!(addr = %self.addr, error = %e, "malformed packet");
                    return Err(e.into());
                }
            };
            if self.handle_packet(packet).await?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<ControlFlow<()>, BrokerError> {
        match (&self.conn_state, packet) {
            (ConnState::AwaitConnect, Packet::Connect(connect)) => {
                self.handle_connect(connect).await?;
                Ok(ControlFlow::Continue(()))
            }
            (ConnState::AwaitConnect, _) => {
                Err(BrokerError::Protocol("first packet must be CONNECT"))
            }
            (ConnState::Connected { .. }, Packet::Connect(_)) => {
                Err(BrokerError::Protocol("duplicate CONNECT"))
            }
            (ConnState::Connected { .. }, Packet::Publish(publish)) => {
                self.handle_publish(publish).await?;
                Ok(ControlFlow::Continue(()))
            }
            (ConnState::Connected { .. }, Packet::Subscribe(subscribe)) => {
                self.handle_subscribe(subscribe).await?;
                Ok(ControlFlow::Continue(()))
            }
            (ConnState::Connected { .. }, Packet::Unsubscribe(unsubscribe)) => {
                self.handle_unsubscribe(unsubscribe).await?;
                Ok(ControlFlow::Continue(()))
            }
            (ConnState::Connected { .. }, Packet::PingReq) => {
                self.send_packet(&Packet::PingResp).await?;
                Ok(ControlFlow::Continue(()))
            }
            (ConnState::Connected { .. }, Packet::Disconnect(_)) => Ok(ControlFlow::Break(())),
            (ConnState::Connected { .. }, _) => {
                Err(BrokerError::Protocol("unexpected packet type"))
            }
        }
    }

    /// Encode and enqueue a reply on this connection's own outbound queue —
    /// the same queue the dispatcher uses for fan-out (SPEC_FULL §9).
    async fn send_packet(&mut self, packet: &Packet) -> Result<(), BrokerError> {
        let mut buf = BytesMut::new();
        Encoder::new().encode(packet, &mut buf)?;
        self.outbound_tx
            .try_send(buf.freeze())
            .map_err(|_| BrokerError::Protocol("outbound queue closed"))
    }

    fn client_id(&self) -> Option<&Arc<str>> {
        match &self.conn_state {
            ConnState::Connected { client_id } => Some(client_id),
            ConnState::AwaitConnect => None,
        }
    }
}

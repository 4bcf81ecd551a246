//! Connection teardown (SPEC_FULL §4.3 "Closing semantics").

use tracing::debug;

use super::Connection;

impl Connection {
    /// Unconditional cleanup run by [`super::run`] once the select loop
    /// returns, regardless of why: EOF, IO error, malformed packet, a clean
    /// DISCONNECT, eviction by a newer connection, or process shutdown.
    /// A no-op if CONNECT never succeeded. Also a no-op if this connection
    /// was evicted: `register_client`'s eviction path already removed this
    /// client's record and purged its index entries, and a newer
    /// connection's record now occupies that `client_id`.
    pub(super) fn close(&mut self) {
        if self.evicted {
            return;
        }
        if let Some(client_id) = self.client_id() {
            debug!(addr = %self.addr, client_id = %client_id, "removing client from registry");
            self.state.remove_client(client_id);
        }
    }
}

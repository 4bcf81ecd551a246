//! CONNECT packet handling (SPEC_FULL §4.3 "CONNECT handling").

use std::sync::Arc;

use tracing::{debug, info};

use super::{ConnState, Connection};
use crate::auth::AuthOutcome;
use crate::error::BrokerError;
use crate::protocol::{ConnAck, Connect, Packet, ReturnCode};

impl Connection {
    pub(super) async fn handle_connect(&mut self, connect: Connect) -> Result<(), BrokerError> {
        // Non-empty client_id is part of the data model (SPEC_FULL §3); the
        // baseline contract doesn't otherwise specify client-id validation,
        // so this is the one structural check ahead of the ordered return-code
        // computation below (DESIGN.md: Open Question decision).
        if connect.client_id.is_empty() {
            debug!(addr = %self.addr, "rejecting CONNECT with empty client id");
            self.reply_connack(ReturnCode::RefusedIdentifier).await?;
            return Err(BrokerError::Protocol("empty client id"));
        }

        let return_code = self.compute_return_code(&connect);
        self.reply_connack(return_code).await?;

        if return_code != ReturnCode::Accepted {
            debug!(addr = %self.addr, client_id = %connect.client_id, ?return_code, "CONNECT refused");
            return Err(match return_code {
                ReturnCode::RefusedServerUnavailable => BrokerError::Capacity,
                _ => BrokerError::Auth,
            });
        }

        let client_id: Arc<str> = Arc::from(connect.client_id.as_str());
        let kill_tx = self
            .kill_tx
            .take()
            .expect("kill_tx is only taken once, on the single successful CONNECT");
        let evicted = self.state.register_client(
            client_id.clone(),
            connect.username.clone(),
            self.outbound_tx.clone(),
            kill_tx,
        );
        if evicted {
            info!(client_id = %client_id, "evicted previous connection with the same client id");
        }
        info!(addr = %self.addr, client_id = %client_id, "CONNECT accepted");
        self.conn_state = ConnState::Connected { client_id };
        Ok(())
    }

    /// Compute the CONNACK return code in the order SPEC_FULL §4.3 specifies:
    /// capacity first, then anonymous/credential authentication.
    fn compute_return_code(&self, connect: &Connect) -> ReturnCode {
        let max_connections = self.state.get_config().max_connections;
        if self.state.client_count() >= max_connections {
            return ReturnCode::RefusedServerUnavailable;
        }

        match self
            .state
            .authenticate(connect.username.as_deref(), connect.password.as_deref())
        {
            AuthOutcome::Accepted => ReturnCode::Accepted,
            AuthOutcome::Refused => ReturnCode::RefusedNotAuthorized,
        }
    }

    async fn reply_connack(&mut self, return_code: ReturnCode) -> Result<(), BrokerError> {
        self.send_packet(&Packet::ConnAck(ConnAck {
            session_present: false,
            return_code,
        }))
        .await
    }
}

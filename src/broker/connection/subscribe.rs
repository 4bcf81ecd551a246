//! SUBSCRIBE and UNSUBSCRIBE packet handling
//! (SPEC_FULL §4.3 "SUBSCRIBE handling" / "UNSUBSCRIBE handling").

use crate::error::BrokerError;
use crate::protocol::{Packet, SubAck, Subscribe, UnsubAck, Unsubscribe};

use super::Connection;

impl Connection {
    pub(super) async fn handle_subscribe(&mut self, subscribe: Subscribe) -> Result<(), BrokerError> {
        let client_id = self
            .client_id()
            .expect("SUBSCRIBE is only reachable in the Connected state")
            .clone();

        // QoS is already clamped to {0, 1} by the decoder (QoS::from_bits),
        // so the granted level is simply the requested one — no further
        // min(requested, 1) computation is needed (SPEC_FULL §4.3).
        let mut granted_qos = Vec::with_capacity(subscribe.filters.len());
        for filter in &subscribe.filters {
            self.state.add_subscription(&client_id, filter.topic.clone());
            granted_qos.push(filter.requested_qos);
        }

        self.send_packet(&Packet::SubAck(SubAck {
            packet_id: subscribe.packet_id,
            granted_qos,
        }))
        .await
    }

    pub(super) async fn handle_unsubscribe(
        &mut self,
        unsubscribe: Unsubscribe,
    ) -> Result<(), BrokerError> {
        let client_id = self
            .client_id()
            .expect("UNSUBSCRIBE is only reachable in the Connected state")
            .clone();

        for topic in &unsubscribe.topics {
            self.state.remove_subscription(&client_id, topic);
        }

        self.send_packet(&Packet::UnsubAck(UnsubAck {
            packet_id: unsubscribe.packet_id,
        }))
        .await
    }
}

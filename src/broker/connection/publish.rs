//! PUBLISH packet handling (SPEC_FULL §4.3 "PUBLISH handling").

use crate::broker::dispatcher::dispatch_publish;
use crate::error::BrokerError;
use crate::protocol::{Packet, PubAck, Publish, QoS};

use super::Connection;

impl Connection {
    pub(super) async fn handle_publish(&mut self, publish: Publish) -> Result<(), BrokerError> {
        let client_id = self
            .client_id()
            .expect("PUBLISH is only reachable in the Connected state")
            .clone();

        let qos = publish.qos;
        let packet_id = publish.packet_id;

        dispatch_publish(&self.state, &client_id, &publish.topic, publish.payload, qos);

        // PubAck may race with fan-out delivery to subscribers; no ordering
        // is guaranteed between them (SPEC_FULL §4.3).
        if qos == QoS::AtLeastOnce {
            let packet_id = packet_id.expect("decoder guarantees packet_id when qos > 0");
            self.send_packet(&Packet::PubAck(PubAck { packet_id })).await?;
        }
        Ok(())
    }
}

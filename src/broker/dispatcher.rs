//! Publish dispatch: fan-out from one PUBLISH to every matching subscriber
//! (SPEC_FULL §4.5).

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::codec::Encoder;
use crate::protocol::{Packet, Publish, QoS};

use super::state::BrokerState;

#[cfg(test)]
mod tests;

/// Packet id the baseline emits on every outbound QoS-1 PUBLISH (SPEC_FULL
/// §4.5 rule 3, §9 "Outbound packet ids" — preserved as a documented
/// simplification rather than a per-connection allocator).
const FIXED_OUTBOUND_PACKET_ID: u16 = 1;

/// Route `payload` published on `topic` by `sender_id` to every matching,
/// connected subscriber other than the publisher itself.
///
/// Snapshots candidate subscribers under `state`'s lock, releases it, then
/// encodes once and `try_send`s a cheap `Bytes` clone to each (SPEC_FULL §5
/// "the dispatcher snapshots ... then releases it before performing any
/// socket writes"). A full or closed outbound queue is a delivery failure,
/// not a dispatcher error: the subscriber is marked not-connected and
/// dispatch continues (SPEC_FULL §4.5 rule 4, §7 DispatchDeliveryError).
pub fn dispatch_publish(state: &BrokerState, sender_id: &str, topic: &str, payload: Bytes, qos: QoS) {
    let subscribers = state.snapshot_subscribers(topic, sender_id);
    if subscribers.is_empty() {
        return;
    }

    let packet = Packet::Publish(Publish {
        dup: false,
        qos,
        retain: false,
        topic: Arc::from(topic),
        packet_id: (qos != QoS::AtMostOnce).then_some(FIXED_OUTBOUND_PACKET_ID),
        payload,
    });

    let mut buf = BytesMut::new();
    if let Err(e) = Encoder::new().encode(&packet, &mut buf) {
        warn!(topic, error = %e, "failed to encode outbound PUBLISH, dropping dispatch");
        return;
    }
    let encoded = buf.freeze();

    for (client_id, sender) in subscribers {
        match sender.try_send(encoded.clone()) {
            Ok(()) => {
                debug!(from = sender_id, to = %client_id, topic, "dispatched PUBLISH");
            }
            Err(_) => {
                warn!(client_id = %client_id, topic, "outbound queue full or closed, marking disconnected");
                state.mark_disconnected(&client_id);
            }
        }
    }
}

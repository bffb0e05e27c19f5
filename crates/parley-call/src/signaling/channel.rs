//! The signaling seam: per-call publish/subscribe of negotiation messages.

use async_trait::async_trait;
use parley_common::{CallId, ParticipantId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SignalingError;
use crate::protocol::SignalingMessage;

/// Relay for signaling messages, bound to one local participant.
///
/// Delivery is at-least-once with no ordering across message types. The
/// channel never reports connection health; a dead relay shows up as a call
/// that fails to connect in time.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Identity stamped on outgoing messages and used to drop echoes.
    fn participant(&self) -> &ParticipantId;

    /// Start receiving messages for `call_id`. Subscribing again replaces
    /// the previous feed, which then ends.
    async fn subscribe(&self, call_id: &CallId) -> Result<Subscription, SignalingError>;

    /// Release a subscription. Idempotent; a superseded handle is a no-op.
    async fn unsubscribe(&self, subscription: &Subscription);

    /// Fire-and-forget publish.
    async fn send(&self, message: SignalingMessage) -> Result<(), SignalingError>;
}

/// Inbound feed for one call.
///
/// Carries raw wire JSON; decoding happens here so every backend gets the
/// same filtering. Malformed messages, self-originated echoes and messages
/// for other calls are dropped.
#[derive(Debug)]
pub struct Subscription {
    call_id: CallId,
    id: u64,
    local: ParticipantId,
    receiver: mpsc::UnboundedReceiver<serde_json::Value>,
}

impl Subscription {
    pub(crate) fn new(
        call_id: CallId,
        id: u64,
        local: ParticipantId,
        receiver: mpsc::UnboundedReceiver<serde_json::Value>,
    ) -> Self {
        Self {
            call_id,
            id,
            local,
            receiver,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next message addressed to this call from the remote side. `None`
    /// once the feed is released or replaced.
    pub async fn recv(&mut self) -> Option<SignalingMessage> {
        loop {
            let raw = self.receiver.recv().await?;
            if let Some(message) = self.accept(&raw) {
                return Some(message);
            }
        }
    }

    fn accept(&self, raw: &serde_json::Value) -> Option<SignalingMessage> {
        let message = match SignalingMessage::from_wire(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(call_id = %self.call_id, error = %e, "Dropping signaling message");
                return None;
            }
        };
        if message.from == self.local {
            return None;
        }
        if message.call_id != self.call_id {
            debug!(
                call_id = %self.call_id,
                foreign = %message.call_id,
                "Ignoring message for another call"
            );
            return None;
        }
        Some(message)
    }
}

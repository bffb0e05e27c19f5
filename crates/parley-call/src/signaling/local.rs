//! In-process broadcast bus.
//!
//! Every participant gets an endpoint from [`LocalSignalingBus::endpoint`];
//! a message sent on any endpoint reaches every subscriber of its call,
//! sender included, the same way a broadcast relay echoes. Delivery is
//! lossless and the bus keeps a log of everything sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use parley_common::{CallId, ParticipantId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SignalingError;
use crate::protocol::SignalingMessage;

use super::channel::{SignalingChannel, Subscription};

struct Feed {
    id: u64,
    participant: ParticipantId,
    tx: mpsc::UnboundedSender<serde_json::Value>,
}

#[derive(Default)]
struct BusState {
    feeds: HashMap<CallId, Vec<Feed>>,
    next_id: u64,
    sent: Vec<SignalingMessage>,
}

#[derive(Clone, Default)]
pub struct LocalSignalingBus {
    state: Arc<Mutex<BusState>>,
}

impl LocalSignalingBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A channel speaking as `participant`.
    pub fn endpoint(&self, participant: impl Into<ParticipantId>) -> LocalSignaling {
        LocalSignaling {
            bus: self.clone(),
            participant: participant.into(),
        }
    }

    /// Live subscriptions for a call.
    pub fn subscriber_count(&self, call_id: &CallId) -> usize {
        self.lock().feeds.get(call_id).map_or(0, Vec::len)
    }

    /// Every message sent through the bus, in send order.
    pub fn sent(&self) -> Vec<SignalingMessage> {
        self.lock().sent.clone()
    }

    /// Messages of one wire type sent by `from`.
    pub fn sent_by(&self, from: &ParticipantId, kind: &str) -> Vec<SignalingMessage> {
        self.lock()
            .sent
            .iter()
            .filter(|m| &m.from == from && m.kind() == kind)
            .cloned()
            .collect()
    }

    /// Deliver raw JSON to every subscriber of a call, as a relay would.
    pub fn publish_raw(&self, call_id: &CallId, raw: serde_json::Value) {
        let mut state = self.lock();
        if let Some(feeds) = state.feeds.get_mut(call_id) {
            feeds.retain(|feed| feed.tx.send(raw.clone()).is_ok());
        }
    }
}

/// One participant's view of a [`LocalSignalingBus`].
#[derive(Clone)]
pub struct LocalSignaling {
    bus: LocalSignalingBus,
    participant: ParticipantId,
}

#[async_trait]
impl SignalingChannel for LocalSignaling {
    fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    async fn subscribe(&self, call_id: &CallId) -> Result<Subscription, SignalingError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.bus.lock();
        state.next_id += 1;
        let id = state.next_id;

        let feeds = state.feeds.entry(call_id.clone()).or_default();
        feeds.retain(|feed| feed.participant != self.participant);
        feeds.push(Feed {
            id,
            participant: self.participant.clone(),
            tx,
        });
        debug!(call_id = %call_id, participant = %self.participant, "Subscribed");
        Ok(Subscription::new(
            call_id.clone(),
            id,
            self.participant.clone(),
            rx,
        ))
    }

    async fn unsubscribe(&self, subscription: &Subscription) {
        let mut state = self.bus.lock();
        let call_id = subscription.call_id();
        if let Some(feeds) = state.feeds.get_mut(call_id) {
            feeds.retain(|feed| feed.id != subscription.id());
            if feeds.is_empty() {
                state.feeds.remove(call_id);
            }
        }
    }

    async fn send(&self, message: SignalingMessage) -> Result<(), SignalingError> {
        let raw = message.to_wire();
        let call_id = message.call_id.clone();
        self.bus.lock().sent.push(message);
        self.bus.publish_raw(&call_id, raw);
        Ok(())
    }
}

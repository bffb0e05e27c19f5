//! Signaling over Supabase Realtime broadcast.
//!
//! Each call maps to the topic `{prefix}:{call_id}`; the broadcast event
//! name is the message type and the payload is the wire JSON.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parley_common::{CallId, ParticipantId};
use parley_config::schema::SignalingConfig;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SignalingError;
use crate::protocol::{events, SignalingMessage};
use crate::realtime::{ChannelConfig, RealtimeClient, RealtimeConfig, RealtimeEvent};

use super::channel::{SignalingChannel, Subscription};

struct Route {
    id: u64,
    tx: mpsc::UnboundedSender<serde_json::Value>,
}

type Routes = Arc<RwLock<HashMap<String, Route>>>;

pub struct RealtimeSignaling {
    client: RealtimeClient,
    participant: ParticipantId,
    topic_prefix: String,
    routes: Routes,
    next_id: AtomicU64,
    dispatcher: JoinHandle<()>,
}

impl RealtimeSignaling {
    /// Open the relay connection and start routing broadcasts.
    pub fn connect(
        config: &SignalingConfig,
        participant: ParticipantId,
    ) -> Result<Self, SignalingError> {
        if !config.is_configured() {
            return Err(SignalingError::Unconfigured);
        }
        let (client, events) = RealtimeClient::connect(RealtimeConfig::from(config));
        let routes: Routes = Arc::new(RwLock::new(HashMap::new()));
        let dispatcher = tokio::spawn(dispatch(events, Arc::clone(&routes)));

        info!(participant = %participant, "Realtime signaling started");
        Ok(Self {
            client,
            participant,
            topic_prefix: config.topic_prefix.clone(),
            routes,
            next_id: AtomicU64::new(1),
            dispatcher,
        })
    }

    pub fn topic_for(&self, call_id: &CallId) -> String {
        format!("{}:{}", self.topic_prefix, call_id)
    }

    pub async fn is_connected(&self) -> bool {
        self.client.is_connected().await
    }

    /// Leave every topic and close the socket.
    pub async fn shutdown(&self) {
        self.routes.write().await.clear();
        self.client.disconnect().await;
    }
}

impl Drop for RealtimeSignaling {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

#[async_trait]
impl SignalingChannel for RealtimeSignaling {
    fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    async fn subscribe(&self, call_id: &CallId) -> Result<Subscription, SignalingError> {
        let topic = self.topic_for(call_id);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let previous = self
            .routes
            .write()
            .await
            .insert(topic.clone(), Route { id, tx });
        if previous.is_none() {
            self.client
                .join_channel(
                    &topic,
                    ChannelConfig {
                        self_send: false,
                        ack: false,
                    },
                )
                .await;
        }
        debug!(topic = %topic, id, "Subscribed to call topic");
        Ok(Subscription::new(
            call_id.clone(),
            id,
            self.participant.clone(),
            rx,
        ))
    }

    async fn unsubscribe(&self, subscription: &Subscription) {
        let topic = self.topic_for(subscription.call_id());
        let mut routes = self.routes.write().await;
        if routes.get(&topic).is_some_and(|r| r.id == subscription.id()) {
            routes.remove(&topic);
            drop(routes);
            self.client.leave_channel(&topic).await;
            debug!(topic = %topic, "Unsubscribed from call topic");
        }
    }

    async fn send(&self, message: SignalingMessage) -> Result<(), SignalingError> {
        let topic = self.topic_for(&message.call_id);
        self.client
            .broadcast(&topic, message.kind(), message.to_wire())
            .await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

async fn dispatch(mut events: mpsc::Receiver<RealtimeEvent>, routes: Routes) {
    while let Some(event) = events.recv().await {
        match event {
            RealtimeEvent::Broadcast {
                topic,
                event,
                payload,
            } => {
                let mut routes = routes.write().await;
                route_broadcast(&mut routes, &topic, &event, payload);
            }
            RealtimeEvent::ChannelError { topic, message } => {
                warn!(topic = %topic, message = %message, "Signaling channel error");
            }
            RealtimeEvent::Disconnected => warn!("Signaling relay disconnected"),
            RealtimeEvent::Error(message) => warn!(message = %message, "Signaling relay error"),
            RealtimeEvent::Connected | RealtimeEvent::ChannelJoined { .. } => {}
        }
    }
}

/// Hand a broadcast to the subscriber of its topic. Returns whether it was
/// delivered.
fn route_broadcast(
    routes: &mut HashMap<String, Route>,
    topic: &str,
    event: &str,
    payload: serde_json::Value,
) -> bool {
    if !events::ALL.contains(&event) {
        debug!(topic, event, "Ignoring non-signaling broadcast");
        return false;
    }
    let Some(route) = routes.get(topic) else {
        return false;
    };
    if route.tx.send(payload).is_err() {
        routes.remove(topic);
        return false;
    }
    true
}

//! Handle to the background relay connection.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use super::connection::connection_loop;
use super::types::{ChannelConfig, RealtimeCommand, RealtimeConfig, RealtimeEvent};

/// Sends commands to the connection task. Dropping every handle shuts the
/// connection down.
#[derive(Clone)]
pub struct RealtimeClient {
    command_tx: mpsc::Sender<RealtimeCommand>,
    connected: Arc<RwLock<bool>>,
}

impl RealtimeClient {
    /// Spawn the connection task. Returns `(client, event_receiver)`.
    pub fn connect(config: RealtimeConfig) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));

        tokio::spawn(connection_loop(
            config,
            Arc::clone(&connected),
            event_tx,
            command_rx,
        ));

        (
            Self {
                command_tx,
                connected,
            },
            event_rx,
        )
    }

    pub async fn join_channel(&self, topic: &str, config: ChannelConfig) {
        self.command(RealtimeCommand::Join {
            topic: topic.to_owned(),
            config,
        })
        .await;
    }

    pub async fn leave_channel(&self, topic: &str) {
        self.command(RealtimeCommand::Leave {
            topic: topic.to_owned(),
        })
        .await;
    }

    pub async fn broadcast(&self, topic: &str, event: &str, payload: serde_json::Value) {
        self.command(RealtimeCommand::Broadcast {
            topic: topic.to_owned(),
            event: event.to_owned(),
            payload,
        })
        .await;
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    pub async fn disconnect(&self) {
        self.command(RealtimeCommand::Disconnect).await;
    }

    async fn command(&self, command: RealtimeCommand) {
        if self.command_tx.send(command).await.is_err() {
            tracing::debug!("Realtime connection task has stopped");
        }
    }
}

//! Relay configuration, Phoenix envelopes, and client events/commands.

use parley_config::schema::SignalingConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for Supabase Realtime.
#[derive(Clone)]
pub struct RealtimeConfig {
    pub project_ref: String,
    pub api_key: String,
    /// JWT for channels with row-level authorization.
    pub access_token: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .finish_non_exhaustive()
    }
}

impl From<&SignalingConfig> for RealtimeConfig {
    fn from(config: &SignalingConfig) -> Self {
        Self {
            project_ref: config.project_ref.clone(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
            heartbeat_interval_secs: config.heartbeat_interval_secs,
            reconnect_delay_secs: config.reconnect_delay_secs,
            max_reconnect_delay_secs: config.max_reconnect_delay_secs,
        }
    }
}

impl RealtimeConfig {
    pub(crate) fn ws_url(&self) -> String {
        format!(
            "wss://{}.supabase.co/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.project_ref, self.api_key
        )
    }

    /// Next reconnect delay after `current`, doubling up to the cap.
    pub(crate) fn backoff(&self, current: u64) -> u64 {
        current.saturating_mul(2).min(self.max_reconnect_delay_secs).max(1)
    }
}

// ---------------------------------------------------------------------------
// Phoenix envelope
// ---------------------------------------------------------------------------

/// Phoenix Channels v1 JSON frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

/// Full Phoenix topic for a relay topic.
pub(crate) fn phoenix_topic(topic: &str) -> String {
    format!("realtime:{topic}")
}

/// Relay topic of a Phoenix topic.
pub(crate) fn relay_topic(topic: &str) -> &str {
    topic.strip_prefix("realtime:").unwrap_or(topic)
}

// ---------------------------------------------------------------------------
// Channel configuration
// ---------------------------------------------------------------------------

/// Broadcast options for a joined channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Receive our own broadcasts back.
    pub self_send: bool,
    /// Ask the server to acknowledge each broadcast.
    pub ack: bool,
}

impl ChannelConfig {
    /// `phx_join` payload. Presence is left unkeyed: call topics only
    /// carry broadcasts.
    pub(crate) fn to_join_payload(self, access_token: Option<&str>) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "config": {
                "broadcast": { "self": self.self_send, "ack": self.ack },
                "presence": { "key": "" }
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = serde_json::Value::String(token.to_owned());
        }
        payload
    }
}

// ---------------------------------------------------------------------------
// Events & commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Connected,
    Disconnected,
    ChannelJoined {
        topic: String,
    },
    ChannelError {
        topic: String,
        message: String,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    Error(String),
}

#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    Join { topic: String, config: ChannelConfig },
    Leave { topic: String },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    Disconnect,
}

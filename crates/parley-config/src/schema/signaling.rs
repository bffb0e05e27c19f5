//! Signaling relay (Supabase Realtime) configuration.

use serde::{Deserialize, Serialize};

/// Connection settings for the broadcast relay that carries call signaling.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Supabase project reference; empty disables the realtime relay.
    pub project_ref: String,
    /// Supabase anon key (publishable).
    pub api_key: String,
    /// Optional JWT for authenticated channels.
    pub access_token: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    /// Prefix for per-call broadcast topics (`{prefix}:{call_id}`).
    pub topic_prefix: String,
}

impl std::fmt::Debug for SignalingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingConfig")
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .field("topic_prefix", &self.topic_prefix)
            .finish()
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            project_ref: String::new(),
            api_key: String::new(),
            access_token: None,
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            topic_prefix: "call".into(),
        }
    }
}

impl SignalingConfig {
    pub fn is_configured(&self) -> bool {
        !self.project_ref.is_empty() && !self.api_key.is_empty()
    }
}

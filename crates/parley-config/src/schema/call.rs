//! Peer connection configuration: ICE servers, policies, and timeouts.

use serde::{Deserialize, Serialize};

/// A TURN relay with static credentials.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

impl std::fmt::Debug for TurnServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnServer")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &"[REDACTED]")
            .finish()
    }
}

/// How media lines are bundled onto transports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[derive(Default)]
pub enum BundlePolicy {
    Balanced,
    MaxCompat,
    #[default]
    MaxBundle,
}

/// Whether RTP and RTCP must share a port.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[derive(Default)]
pub enum RtcpMuxPolicy {
    Negotiate,
    #[default]
    Require,
}

/// A single ICE server entry in the order it is handed to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServerEntry {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Call negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub stun_servers: Vec<String>,
    pub turn_servers: Vec<TurnServer>,
    /// Pre-gathered candidate pool (valid range: 0-255).
    pub ice_candidate_pool_size: u8,
    pub bundle_policy: BundlePolicy,
    pub rtcp_mux_policy: RtcpMuxPolicy,
    /// Time allowed from call start until the connection is up.
    pub connect_timeout_ms: u64,
    /// Remote candidates held while no remote description exists.
    pub max_pending_candidates: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
                "stun:stun2.l.google.com:19302".into(),
            ],
            turn_servers: vec![TurnServer {
                urls: vec![
                    "turn:openrelay.metered.ca:80".into(),
                    "turn:openrelay.metered.ca:443".into(),
                    "turn:openrelay.metered.ca:443?transport=tcp".into(),
                ],
                username: "openrelayproject".into(),
                credential: "openrelayproject".into(),
            }],
            ice_candidate_pool_size: 10,
            bundle_policy: BundlePolicy::MaxBundle,
            rtcp_mux_policy: RtcpMuxPolicy::Require,
            connect_timeout_ms: 30_000,
            max_pending_candidates: 64,
        }
    }
}

impl CallConfig {
    /// ICE servers in connection order: every STUN url first, then TURN relays.
    pub fn ice_servers(&self) -> Vec<IceServerEntry> {
        let stun = self.stun_servers.iter().map(|url| IceServerEntry {
            urls: vec![url.clone()],
            username: None,
            credential: None,
        });
        let turn = self.turn_servers.iter().map(|t| IceServerEntry {
            urls: t.urls.clone(),
            username: Some(t.username.clone()),
            credential: Some(t.credential.clone()),
        });
        stun.chain(turn).collect()
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }
}

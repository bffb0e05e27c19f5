//! Backend seam for the underlying peer connection.
//!
//! A [`TransportFactory`] builds one [`PeerTransport`] per call together with
//! the receiver of its [`TransportEvent`]s. Callbacks from the backend are
//! turned into events on that channel; the manager drains it in order.

use async_trait::async_trait;
use parley_config::schema::{BundlePolicy, CallConfig, IceServerEntry, RtcpMuxPolicy};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::media::{MediaKind, MediaTrack};

use super::types::{
    IceCandidate, OfferOptions, SessionDescription, TransceiverDirection, TransportEvent,
};

/// Index of a transceiver within its transport, in creation order.
pub type TransceiverId = usize;

pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Settings a backend needs to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerEntry>,
    pub ice_candidate_pool_size: u8,
    pub bundle_policy: BundlePolicy,
    pub rtcp_mux_policy: RtcpMuxPolicy,
}

impl From<&CallConfig> for TransportConfig {
    fn from(config: &CallConfig) -> Self {
        Self {
            ice_servers: config.ice_servers(),
            ice_candidate_pool_size: config.ice_candidate_pool_size,
            bundle_policy: config.bundle_policy,
            rtcp_mux_policy: config.rtcp_mux_policy,
        }
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_transceiver(
        &self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> Result<TransceiverId, TransportError>;

    /// Swap what a sender transmits. Never triggers renegotiation.
    async fn replace_sender_track(
        &self,
        transceiver: TransceiverId,
        track: Option<&MediaTrack>,
    ) -> Result<(), TransportError>;

    async fn create_offer(
        &self,
        options: &OfferOptions,
    ) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    /// Applying the local description starts candidate gathering.
    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), TransportError>;

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        config: &TransportConfig,
    ) -> Result<(Box<dyn PeerTransport>, TransportEvents), TransportError>;
}

//! In-process peer transport: two endpoints joined by a lossless network.
//!
//! Produces real-looking SDP and host candidates and follows the same
//! ordering rules as a browser connection. The connection comes up once
//! both sides hold both descriptions and have applied at least one remote
//! candidate. Every call is recorded in per-endpoint [`EndpointStats`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;
use crate::media::{MediaKind, MediaTrack};

use super::transport::{
    PeerTransport, TransceiverId, TransportConfig, TransportEvents, TransportFactory,
};
use super::types::{
    ConnectionState, IceCandidate, OfferOptions, RemoteTrack, SdpType, SessionDescription,
    TransceiverDirection, TransportEvent,
};

const CANDIDATES_PER_ENDPOINT: usize = 2;

/// What one endpoint has been asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub transceivers: Vec<(MediaKind, TransceiverDirection)>,
    pub offers_created: usize,
    pub answers_created: usize,
    pub local_descriptions: Vec<SdpType>,
    pub remote_descriptions: Vec<SdpType>,
    pub applied_candidates: Vec<IceCandidate>,
    /// `(kind, track id)` per sender replacement, `None` for unbinding.
    pub replaced_tracks: Vec<(MediaKind, Option<String>)>,
    pub closed: bool,
}

struct Transceiver {
    kind: MediaKind,
    direction: TransceiverDirection,
}

struct Endpoint {
    events: mpsc::UnboundedSender<TransportEvent>,
    ufrag: String,
    session_id: String,
    transceivers: Vec<Transceiver>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    gathered: bool,
    state: ConnectionState,
    stats: EndpointStats,
}

impl Endpoint {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state.can_transition_to(next) {
            self.state = next;
            self.emit(TransportEvent::StateChanged(next));
        }
    }

    fn ready(&self) -> bool {
        !self.stats.closed
            && self.local.is_some()
            && self.remote.is_some()
            && !self.stats.applied_candidates.is_empty()
    }
}

#[derive(Default)]
struct NetworkState {
    endpoints: Vec<Endpoint>,
    blackhole: bool,
}

impl NetworkState {
    fn endpoint(&mut self, index: usize) -> Result<&mut Endpoint, TransportError> {
        let endpoint = self
            .endpoints
            .get_mut(index)
            .ok_or_else(|| TransportError::InvalidState("unknown endpoint".into()))?;
        if endpoint.stats.closed {
            return Err(TransportError::Closed);
        }
        Ok(endpoint)
    }

    fn try_connect(&mut self) {
        if self.blackhole || self.endpoints.len() != 2 {
            return;
        }
        if self.endpoints.iter().all(Endpoint::ready) {
            for endpoint in &mut self.endpoints {
                endpoint.set_state(ConnectionState::Connected);
            }
        }
    }
}

/// Shared handle to a two-endpoint network. Also the [`TransportFactory`].
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network whose candidates never produce connectivity.
    pub fn blackhole() -> Self {
        let network = Self::default();
        network.lock().blackhole = true;
        network
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn endpoint_count(&self) -> usize {
        self.lock().endpoints.len()
    }

    pub fn stats(&self, endpoint: usize) -> Option<EndpointStats> {
        self.lock().endpoints.get(endpoint).map(|e| e.stats.clone())
    }

    pub fn connection_state(&self, endpoint: usize) -> Option<ConnectionState> {
        self.lock().endpoints.get(endpoint).map(|e| e.state)
    }
}

#[async_trait]
impl TransportFactory for LoopbackNetwork {
    async fn create(
        &self,
        config: &TransportConfig,
    ) -> Result<(Box<dyn PeerTransport>, TransportEvents), TransportError> {
        let mut state = self.lock();
        let index = state.endpoints.len();
        if index >= 2 {
            return Err(TransportError::Backend(
                "loopback network supports two endpoints".into(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.endpoints.push(Endpoint {
            events: tx,
            ufrag: parley_common::new_correlation_id(),
            session_id: format!("{}", 4_611_731_400_430_051_336u64 + index as u64),
            transceivers: Vec::new(),
            local: None,
            remote: None,
            gathered: false,
            state: ConnectionState::New,
            stats: EndpointStats::default(),
        });
        debug!(
            index,
            ice_servers = config.ice_servers.len(),
            "Loopback endpoint created"
        );

        let transport = LoopbackTransport {
            network: self.clone(),
            index,
        };
        Ok((Box::new(transport), rx))
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

struct LoopbackTransport {
    network: LoopbackNetwork,
    index: usize,
}

fn render_sdp(endpoint: &Endpoint, mlines: &[(MediaKind, TransceiverDirection)]) -> String {
    let mut sdp = format!(
        "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
        endpoint.session_id
    );
    let mids: Vec<String> = (0..mlines.len()).map(|i| i.to_string()).collect();
    sdp.push_str(&format!("a=group:BUNDLE {}\r\n", mids.join(" ")));
    for (mid, (kind, direction)) in mlines.iter().enumerate() {
        let payload = match kind {
            MediaKind::Audio => "111",
            MediaKind::Video => "96",
        };
        sdp.push_str(&format!(
            "m={kind} 9 UDP/TLS/RTP/SAVPF {payload}\r\nc=IN IP4 0.0.0.0\r\na=mid:{mid}\r\na=ice-ufrag:{}\r\na={}\r\na=rtcp-mux\r\n",
            endpoint.ufrag,
            direction.sdp_attribute()
        ));
    }
    sdp
}

/// Media lines of an SDP blob, as `(kind, direction)`.
fn parse_mlines(sdp: &str) -> Vec<(MediaKind, TransceiverDirection)> {
    let mut mlines = Vec::new();
    for line in sdp.split("\r\n") {
        if let Some(rest) = line.strip_prefix("m=") {
            let kind = if rest.starts_with("video") {
                MediaKind::Video
            } else {
                MediaKind::Audio
            };
            mlines.push((kind, TransceiverDirection::SendRecv));
        } else if let Some(last) = mlines.last_mut() {
            last.1 = match line {
                "a=sendonly" => TransceiverDirection::SendOnly,
                "a=recvonly" => TransceiverDirection::RecvOnly,
                "a=inactive" => TransceiverDirection::Inactive,
                "a=sendrecv" => TransceiverDirection::SendRecv,
                _ => last.1,
            };
        }
    }
    mlines
}

fn validate_sdp(description: &SessionDescription) -> Result<(), TransportError> {
    if !description.sdp.starts_with("v=0") {
        return Err(TransportError::Backend(
            "session description is not valid SDP".into(),
        ));
    }
    Ok(())
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn add_transceiver(
        &self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> Result<TransceiverId, TransportError> {
        let mut state = self.network.lock();
        let endpoint = state.endpoint(self.index)?;
        endpoint.transceivers.push(Transceiver { kind, direction });
        endpoint.stats.transceivers.push((kind, direction));
        Ok(endpoint.transceivers.len() - 1)
    }

    async fn replace_sender_track(
        &self,
        transceiver: TransceiverId,
        track: Option<&MediaTrack>,
    ) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let endpoint = state.endpoint(self.index)?;
        let kind = endpoint
            .transceivers
            .get(transceiver)
            .map(|t| t.kind)
            .ok_or_else(|| TransportError::InvalidState("unknown transceiver".into()))?;
        if let Some(track) = track {
            if track.kind() != kind {
                return Err(TransportError::InvalidState(format!(
                    "{} track on {kind} transceiver",
                    track.kind()
                )));
            }
        }
        endpoint
            .stats
            .replaced_tracks
            .push((kind, track.map(|t| t.id().to_owned())));
        Ok(())
    }

    async fn create_offer(
        &self,
        options: &OfferOptions,
    ) -> Result<SessionDescription, TransportError> {
        let mut state = self.network.lock();
        let endpoint = state.endpoint(self.index)?;
        let mut mlines: Vec<_> = endpoint
            .transceivers
            .iter()
            .map(|t| (t.kind, t.direction))
            .collect();
        for (wanted, kind) in [
            (options.offer_to_receive_audio, MediaKind::Audio),
            (options.offer_to_receive_video, MediaKind::Video),
        ] {
            if wanted && !mlines.iter().any(|(k, _)| *k == kind) {
                mlines.push((kind, TransceiverDirection::RecvOnly));
            }
        }
        endpoint.stats.offers_created += 1;
        Ok(SessionDescription::offer(render_sdp(endpoint, &mlines)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let mut state = self.network.lock();
        let endpoint = state.endpoint(self.index)?;
        let offer = match &endpoint.remote {
            Some(d) if d.sdp_type == SdpType::Offer => d.sdp.clone(),
            _ => {
                return Err(TransportError::InvalidState(
                    "no remote offer to answer".into(),
                ))
            }
        };

        // One answer line per offered line; send only where we have a sender.
        let mut used = vec![false; endpoint.transceivers.len()];
        let mlines: Vec<_> = parse_mlines(&offer)
            .into_iter()
            .map(|(kind, _)| {
                let local = endpoint
                    .transceivers
                    .iter()
                    .enumerate()
                    .find(|(i, t)| t.kind == kind && !used[*i]);
                match local {
                    Some((i, t)) => {
                        used[i] = true;
                        (kind, t.direction)
                    }
                    None => (kind, TransceiverDirection::RecvOnly),
                }
            })
            .collect();
        endpoint.stats.answers_created += 1;
        Ok(SessionDescription::answer(render_sdp(endpoint, &mlines)))
    }

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), TransportError> {
        validate_sdp(description)?;
        let mut state = self.network.lock();
        let index = self.index;
        let endpoint = state.endpoint(index)?;
        match (description.sdp_type, &endpoint.remote) {
            (SdpType::Offer, None) => {}
            (SdpType::Answer, Some(remote)) if remote.sdp_type == SdpType::Offer => {}
            (sdp_type, _) => {
                return Err(TransportError::InvalidState(format!(
                    "cannot apply local {sdp_type} in this state"
                )))
            }
        }
        endpoint.local = Some(description.clone());
        endpoint.stats.local_descriptions.push(description.sdp_type);

        if !endpoint.gathered {
            endpoint.gathered = true;
            endpoint.set_state(ConnectionState::Connecting);
            for n in 0..CANDIDATES_PER_ENDPOINT {
                let candidate = IceCandidate {
                    candidate: format!(
                        "candidate:{} 1 udp {} 127.0.0.{} {} typ host",
                        index * 10 + n + 1,
                        2_122_260_223u32 - n as u32,
                        index + 1,
                        50_000 + index * 100 + n
                    ),
                    sdp_mid: Some("0".into()),
                    sdp_mline_index: Some(0),
                    username_fragment: Some(endpoint.ufrag.clone()),
                };
                endpoint.emit(TransportEvent::LocalCandidate(candidate));
            }
            endpoint.emit(TransportEvent::GatheringComplete);
        }
        state.try_connect();
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), TransportError> {
        validate_sdp(description)?;
        let mut state = self.network.lock();
        let endpoint = state.endpoint(self.index)?;
        match (description.sdp_type, &endpoint.local) {
            (SdpType::Offer, None) => {}
            (SdpType::Answer, Some(local)) if local.sdp_type == SdpType::Offer => {}
            (sdp_type, _) => {
                return Err(TransportError::InvalidState(format!(
                    "cannot apply remote {sdp_type} in this state"
                )))
            }
        }
        endpoint.remote = Some(description.clone());
        endpoint.stats.remote_descriptions.push(description.sdp_type);

        let stream_id = format!("remote-{}", endpoint.session_id);
        for (mid, (kind, direction)) in parse_mlines(&description.sdp).into_iter().enumerate() {
            if matches!(
                direction,
                TransceiverDirection::SendRecv | TransceiverDirection::SendOnly
            ) {
                endpoint.emit(TransportEvent::RemoteTrack(RemoteTrack {
                    id: format!("{stream_id}-{mid}"),
                    kind,
                    stream_id: stream_id.clone(),
                }));
            }
        }
        state.try_connect();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let endpoint = state.endpoint(self.index)?;
        if endpoint.remote.is_none() {
            return Err(TransportError::InvalidState(
                "candidate before remote description".into(),
            ));
        }
        if !candidate.candidate.starts_with("candidate:") {
            return Err(TransportError::Backend(format!(
                "unparseable candidate: {}",
                candidate.candidate
            )));
        }
        endpoint.stats.applied_candidates.push(candidate.clone());
        state.try_connect();
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let Some(endpoint) = state.endpoints.get_mut(self.index) else {
            return Ok(());
        };
        if endpoint.stats.closed {
            return Ok(());
        }
        endpoint.stats.closed = true;
        endpoint.state = ConnectionState::Closed;

        let peer = 1 - self.index.min(1);
        if let Some(peer) = state.endpoints.get_mut(peer) {
            if !peer.stats.closed && peer.state != ConnectionState::New {
                peer.set_state(ConnectionState::Disconnected);
            }
        }
        Ok(())
    }
}

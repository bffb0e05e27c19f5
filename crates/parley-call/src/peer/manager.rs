//! Owns one peer connection for the lifetime of a call.

use std::collections::{HashMap, HashSet};

use parley_config::schema::CallConfig;
use tracing::{debug, info, warn};

use crate::error::{NegotiationError, SignalingError, TransportError};
use crate::media::{LocalStream, MediaKind, MediaTrack};
use crate::session::CallKind;

use super::candidates::IceCandidateQueue;
use super::transport::{
    PeerTransport, TransceiverId, TransportConfig, TransportEvents, TransportFactory,
};
use super::types::{
    ConnectionState, IceCandidate, OfferOptions, SessionDescription, TransceiverDirection,
    TransportEvent,
};

/// What happened to a remote candidate handed to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Applied,
    /// Held until the remote description arrives.
    Queued,
    /// Already seen; ignored.
    Duplicate,
    /// The connection is closed.
    Discarded,
}

struct Sender {
    transceiver: TransceiverId,
    track: Option<MediaTrack>,
}

/// Wraps a [`PeerTransport`] with the call's negotiation rules.
///
/// Transceivers are declared up front from the call kind, so swapping what
/// a sender transmits never needs a new offer. Remote candidates that beat
/// the remote description are queued and applied exactly once. The manager
/// is the only writer of sender bindings and track enabled flags.
pub struct PeerConnectionManager {
    kind: CallKind,
    transport: Box<dyn PeerTransport>,
    events: TransportEvents,
    senders: HashMap<MediaKind, Sender>,
    state: ConnectionState,
    pending: IceCandidateQueue,
    seen_candidates: HashSet<IceCandidate>,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    closed: bool,
}

impl PeerConnectionManager {
    pub async fn new(
        factory: &dyn TransportFactory,
        config: &CallConfig,
        kind: CallKind,
    ) -> Result<Self, TransportError> {
        let (transport, events) = factory.create(&TransportConfig::from(config)).await?;

        let mut senders = HashMap::new();
        let audio = transport
            .add_transceiver(MediaKind::Audio, TransceiverDirection::SendRecv)
            .await?;
        senders.insert(
            MediaKind::Audio,
            Sender {
                transceiver: audio,
                track: None,
            },
        );
        if kind.has_video() {
            let video = transport
                .add_transceiver(MediaKind::Video, TransceiverDirection::SendRecv)
                .await?;
            senders.insert(
                MediaKind::Video,
                Sender {
                    transceiver: video,
                    track: None,
                },
            );
        }

        debug!(?kind, transceivers = senders.len(), "Peer connection created");
        Ok(Self {
            kind,
            transport,
            events,
            senders,
            state: ConnectionState::New,
            pending: IceCandidateQueue::new(config.max_pending_candidates),
            seen_candidates: HashSet::new(),
            local_description: None,
            remote_description: None,
            closed: false,
        })
    }

    pub fn call_kind(&self) -> CallKind {
        self.kind
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub fn has_sender(&self, kind: MediaKind) -> bool {
        self.senders.contains_key(&kind)
    }

    /// Track currently bound to the sender of `kind`.
    pub fn sender_track(&self, kind: MediaKind) -> Option<&MediaTrack> {
        self.senders.get(&kind).and_then(|s| s.track.as_ref())
    }

    // -----------------------------------------------------------------------
    // Local media
    // -----------------------------------------------------------------------

    /// Bind each track of the stream to the sender of its kind.
    pub async fn attach_local_stream(&mut self, stream: &LocalStream) -> Result<(), TransportError> {
        for track in stream.tracks() {
            if !self.has_sender(track.kind()) {
                warn!(kind = %track.kind(), "No sender for local track; not attached");
                continue;
            }
            self.replace_track(track.kind(), Some(track.clone())).await?;
        }
        Ok(())
    }

    /// Rebind the sender of `kind` and return the track it had.
    ///
    /// The returned track is not stopped; that is the caller's decision.
    pub async fn replace_track(
        &mut self,
        kind: MediaKind,
        track: Option<MediaTrack>,
    ) -> Result<Option<MediaTrack>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Some(t) = &track {
            if t.kind() != kind {
                return Err(TransportError::InvalidState(format!(
                    "{} track cannot be sent on the {kind} sender",
                    t.kind()
                )));
            }
        }
        let sender = self
            .senders
            .get_mut(&kind)
            .ok_or(TransportError::NoSender(kind))?;

        self.transport
            .replace_sender_track(sender.transceiver, track.as_ref())
            .await?;
        debug!(%kind, track_id = ?track.as_ref().map(|t| t.id().to_owned()), "Sender track replaced");
        Ok(std::mem::replace(&mut sender.track, track))
    }

    /// Flip the enabled flag of the bound track. Returns the previous value.
    pub fn set_track_enabled(
        &mut self,
        kind: MediaKind,
        enabled: bool,
    ) -> Result<bool, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let sender = self.senders.get(&kind).ok_or(TransportError::NoSender(kind))?;
        let track = sender.track.as_ref().ok_or(TransportError::NoSender(kind))?;
        let previous = track.is_enabled();
        track.set_enabled(enabled);
        Ok(previous)
    }

    // -----------------------------------------------------------------------
    // Offer / answer
    // -----------------------------------------------------------------------

    pub async fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError> {
        if self.closed {
            return Err(NegotiationError::CreateOffer("connection closed".into()));
        }
        let options = OfferOptions {
            offer_to_receive_audio: true,
            offer_to_receive_video: self.kind.has_video(),
        };
        self.transport
            .create_offer(&options)
            .await
            .map_err(|e| NegotiationError::CreateOffer(e.to_string()))
    }

    pub async fn create_answer(&mut self) -> Result<SessionDescription, NegotiationError> {
        if self.closed {
            return Err(NegotiationError::CreateAnswer("connection closed".into()));
        }
        self.transport
            .create_answer()
            .await
            .map_err(|e| NegotiationError::CreateAnswer(e.to_string()))
    }

    pub async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        if self.closed {
            return Err(NegotiationError::SetLocal("connection closed".into()));
        }
        self.transport
            .set_local_description(&description)
            .await
            .map_err(|e| NegotiationError::SetLocal(e.to_string()))?;
        self.local_description = Some(description);
        Ok(())
    }

    /// Apply the remote description, then every queued candidate in
    /// receipt order. Returns how many queued candidates were applied.
    pub async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<usize, NegotiationError> {
        if self.closed {
            return Err(NegotiationError::SetRemote("connection closed".into()));
        }
        self.transport
            .set_remote_description(&description)
            .await
            .map_err(|e| NegotiationError::SetRemote(e.to_string()))?;
        info!(sdp_type = %description.sdp_type, "Remote description applied");
        self.remote_description = Some(description);

        let queued = self.pending.drain();
        let mut applied = 0;
        for candidate in queued {
            match self.transport.add_ice_candidate(&candidate).await {
                Ok(()) => applied += 1,
                Err(e) => warn!(error = %e, "Queued candidate rejected"),
            }
        }
        if applied > 0 {
            debug!(applied, "Queued candidates applied");
        }
        Ok(applied)
    }

    // -----------------------------------------------------------------------
    // ICE
    // -----------------------------------------------------------------------

    pub async fn add_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<CandidateOutcome, SignalingError> {
        if self.closed {
            return Ok(CandidateOutcome::Discarded);
        }
        if self.seen_candidates.contains(&candidate) {
            return Ok(CandidateOutcome::Duplicate);
        }

        if self.remote_description.is_none() {
            self.pending.push(candidate.clone())?;
            self.seen_candidates.insert(candidate);
            debug!(pending = self.pending.len(), "Candidate queued");
            return Ok(CandidateOutcome::Queued);
        }

        self.transport
            .add_ice_candidate(&candidate)
            .await
            .map_err(|e| SignalingError::CandidateRejected(e.to_string()))?;
        self.seen_candidates.insert(candidate);
        Ok(CandidateOutcome::Applied)
    }

    // -----------------------------------------------------------------------
    // Events & teardown
    // -----------------------------------------------------------------------

    /// Next transport event, in order. State changes are applied before
    /// they are returned; ones that would regress the state are dropped.
    ///
    /// Returns `None` once the transport has gone away.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            let event = self.events.recv().await?;
            if let TransportEvent::StateChanged(next) = event {
                if !self.state.can_transition_to(next) {
                    debug!(from = %self.state, to = %next, "Ignoring connection state change");
                    continue;
                }
                info!(from = %self.state, to = %next, "Connection state changed");
                self.state = next;
            }
            return Some(event);
        }
    }

    /// Close the transport and unbind every sender. Idempotent.
    ///
    /// Returns the tracks that were bound so the caller can stop them.
    pub async fn close(&mut self) -> Vec<MediaTrack> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        self.pending.dispose();

        let tracks: Vec<MediaTrack> = self
            .senders
            .values_mut()
            .filter_map(|s| s.track.take())
            .collect();

        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Transport close failed");
        }
        self.state = ConnectionState::Closed;
        self.events.close();
        info!("Peer connection closed");
        tracks
    }
}

impl std::fmt::Debug for PeerConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnectionManager")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("pending_candidates", &self.pending.len())
            .field("closed", &self.closed)
            .finish()
    }
}

//! Peer transport backed by the `webrtc` crate.
//!
//! Each [`MediaTrack`] bound to a sender is mirrored by a
//! [`TrackLocalStaticSample`]; capture pipelines look it up with
//! [`NativeTransportFactory::sample_track`] and write encoded samples while
//! the track is enabled.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_config::schema::{BundlePolicy, RtcpMuxPolicy};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::error::TransportError;
use crate::media::{MediaKind, MediaTrack};

use super::transport::{
    PeerTransport, TransceiverId, TransportConfig, TransportEvents, TransportFactory,
};
use super::types::{
    ConnectionState, IceCandidate, OfferOptions, RemoteTrack, SdpType, SessionDescription,
    TransceiverDirection, TransportEvent,
};

const STREAM_ID: &str = "parley";

type SampleTracks = Arc<RwLock<HashMap<String, Arc<TrackLocalStaticSample>>>>;

fn backend(e: webrtc::Error) -> TransportError {
    TransportError::Backend(e.to_string())
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn codec_type(kind: MediaKind) -> RTPCodecType {
    match kind {
        MediaKind::Audio => RTPCodecType::Audio,
        MediaKind::Video => RTPCodecType::Video,
    }
}

fn media_kind(codec: RTPCodecType) -> Option<MediaKind> {
    match codec {
        RTPCodecType::Audio => Some(MediaKind::Audio),
        RTPCodecType::Video => Some(MediaKind::Video),
        _ => None,
    }
}

fn direction(direction: TransceiverDirection) -> RTCRtpTransceiverDirection {
    match direction {
        TransceiverDirection::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
        TransceiverDirection::SendOnly => RTCRtpTransceiverDirection::Sendonly,
        TransceiverDirection::RecvOnly => RTCRtpTransceiverDirection::Recvonly,
        TransceiverDirection::Inactive => RTCRtpTransceiverDirection::Inactive,
    }
}

fn connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn rtc_configuration(config: &TransportConfig) -> RTCConfiguration {
    let ice_servers = config
        .ice_servers
        .iter()
        .map(|entry| RTCIceServer {
            urls: entry.urls.clone(),
            username: entry.username.clone().unwrap_or_default(),
            credential: entry.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect();

    RTCConfiguration {
        ice_servers,
        ice_candidate_pool_size: config.ice_candidate_pool_size,
        bundle_policy: match config.bundle_policy {
            BundlePolicy::Balanced => RTCBundlePolicy::Balanced,
            BundlePolicy::MaxCompat => RTCBundlePolicy::MaxCompat,
            BundlePolicy::MaxBundle => RTCBundlePolicy::MaxBundle,
        },
        rtcp_mux_policy: match config.rtcp_mux_policy {
            RtcpMuxPolicy::Negotiate => RTCRtcpMuxPolicy::Negotiate,
            RtcpMuxPolicy::Require => RTCRtcpMuxPolicy::Require,
        },
        ..Default::default()
    }
}

fn to_rtc_description(
    description: &SessionDescription,
) -> Result<RTCSessionDescription, TransportError> {
    let sdp = description.sdp.clone();
    match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
        SdpType::Rollback => {
            return Err(TransportError::InvalidState(
                "rollback is not supported".into(),
            ))
        }
    }
    .map_err(backend)
}

fn from_rtc_description(description: RTCSessionDescription) -> SessionDescription {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        _ => SdpType::Offer,
    };
    SessionDescription {
        sdp_type,
        sdp: description.sdp,
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Opens real peer connections (ICE, DTLS-SRTP, RTP) via webrtc-rs.
#[derive(Clone)]
pub struct NativeTransportFactory {
    api: Arc<API>,
    samples: SampleTracks,
}

impl NativeTransportFactory {
    pub fn new() -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(backend)?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(backend)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api: Arc::new(api),
            samples: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Outgoing RTP track mirroring the local track with this id.
    pub async fn sample_track(&self, track_id: &str) -> Option<Arc<TrackLocalStaticSample>> {
        self.samples.read().await.get(track_id).cloned()
    }
}

#[async_trait]
impl TransportFactory for NativeTransportFactory {
    async fn create(
        &self,
        config: &TransportConfig,
    ) -> Result<(Box<dyn PeerTransport>, TransportEvents), TransportError> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(rtc_configuration(config))
                .await
                .map_err(backend)?,
        );
        let (tx, rx) = mpsc::unbounded_channel();

        let candidate_tx = tx.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = candidate_tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    let _ = tx.send(TransportEvent::GatheringComplete);
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(TransportEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }));
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize local candidate"),
                }
            })
        }));

        let state_tx = tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let tx = state_tx.clone();
            Box::pin(async move {
                debug!(%state, "Peer connection state");
                if let Some(state) = connection_state(state) {
                    let _ = tx.send(TransportEvent::StateChanged(state));
                }
            })
        }));

        let track_tx = tx;
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                Box::pin(async move {
                    if let Some(kind) = media_kind(track.kind()) {
                        let _ = tx.send(TransportEvent::RemoteTrack(RemoteTrack {
                            id: track.id(),
                            kind,
                            stream_id: track.stream_id(),
                        }));
                    }
                })
            },
        ));

        info!(ice_servers = config.ice_servers.len(), "Native peer connection created");
        let transport = NativeTransport {
            pc,
            transceivers: Mutex::new(Vec::new()),
            samples: self.samples.clone(),
        };
        Ok((Box::new(transport), rx))
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

struct NativeTransport {
    pc: Arc<RTCPeerConnection>,
    transceivers: Mutex<Vec<Arc<RTCRtpTransceiver>>>,
    samples: SampleTracks,
}

impl NativeTransport {
    async fn sample_track_for(&self, track: &MediaTrack) -> Arc<TrackLocalStaticSample> {
        let mut samples = self.samples.write().await;
        samples
            .entry(track.id().to_owned())
            .or_insert_with(|| {
                let mime_type = match track.kind() {
                    MediaKind::Audio => MIME_TYPE_OPUS,
                    MediaKind::Video => MIME_TYPE_VP8,
                };
                Arc::new(TrackLocalStaticSample::new(
                    RTCRtpCodecCapability {
                        mime_type: mime_type.to_owned(),
                        ..Default::default()
                    },
                    track.id().to_owned(),
                    STREAM_ID.to_owned(),
                ))
            })
            .clone()
    }
}

#[async_trait]
impl PeerTransport for NativeTransport {
    async fn add_transceiver(
        &self,
        kind: MediaKind,
        dir: TransceiverDirection,
    ) -> Result<TransceiverId, TransportError> {
        let transceiver = self
            .pc
            .add_transceiver_from_kind(
                codec_type(kind),
                Some(RTCRtpTransceiverInit {
                    direction: direction(dir),
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(backend)?;
        let mut transceivers = self.transceivers.lock().await;
        transceivers.push(transceiver);
        Ok(transceivers.len() - 1)
    }

    async fn replace_sender_track(
        &self,
        transceiver: TransceiverId,
        track: Option<&MediaTrack>,
    ) -> Result<(), TransportError> {
        let transceiver = self
            .transceivers
            .lock()
            .await
            .get(transceiver)
            .cloned()
            .ok_or_else(|| TransportError::InvalidState("unknown transceiver".into()))?;

        let local = match track {
            Some(track) => {
                let sample = self.sample_track_for(track).await;
                Some(sample as Arc<dyn TrackLocal + Send + Sync>)
            }
            None => None,
        };
        let sender = transceiver.sender().await;
        let previous = sender.track().await.map(|t| t.id().to_owned());
        sender.replace_track(local).await.map_err(backend)?;

        // Drop the RTP track of the local track that was swapped out.
        if let Some(previous) = previous {
            if track.map_or(true, |t| t.id() != previous) {
                self.samples.write().await.remove(&previous);
            }
        }
        Ok(())
    }

    async fn create_offer(
        &self,
        _options: &OfferOptions,
    ) -> Result<SessionDescription, TransportError> {
        // Receive directions come from the pre-declared transceivers.
        let offer = self.pc.create_offer(None).await.map_err(backend)?;
        Ok(from_rtc_description(offer))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self.pc.create_answer(None).await.map_err(backend)?;
        Ok(from_rtc_description(answer))
    }

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), TransportError> {
        self.pc
            .set_local_description(to_rtc_description(description)?)
            .await
            .map_err(backend)
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), TransportError> {
        self.pc
            .set_remote_description(to_rtc_description(description)?)
            .await
            .map_err(backend)
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), TransportError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate.clone(),
                sdp_mid: candidate.sdp_mid.clone(),
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment.clone(),
            })
            .await
            .map_err(backend)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let transceivers = self.transceivers.lock().await;
        let mut samples = self.samples.write().await;
        for transceiver in transceivers.iter() {
            if let Some(track) = transceiver.sender().await.track().await {
                samples.remove(track.id());
            }
        }
        drop(samples);
        self.pc.close().await.map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::schema::CallConfig;

    #[test]
    fn configuration_maps_servers_and_policies() {
        let config = TransportConfig::from(&CallConfig::default());
        let rtc = rtc_configuration(&config);
        assert_eq!(rtc.ice_servers.len(), config.ice_servers.len());
        assert_eq!(rtc.ice_candidate_pool_size, 10);
        assert_eq!(rtc.bundle_policy, RTCBundlePolicy::MaxBundle);
        assert_eq!(rtc.rtcp_mux_policy, RTCRtcpMuxPolicy::Require);
        let turn = rtc.ice_servers.last().unwrap();
        assert!(!turn.username.is_empty());
    }

    #[tokio::test]
    async fn offer_contains_declared_media_lines() {
        let factory = NativeTransportFactory::new().unwrap();
        let config = TransportConfig::from(&CallConfig::default());
        let (transport, _events) = factory.create(&config).await.unwrap();
        transport
            .add_transceiver(MediaKind::Audio, TransceiverDirection::SendRecv)
            .await
            .unwrap();
        transport
            .add_transceiver(MediaKind::Video, TransceiverDirection::SendRecv)
            .await
            .unwrap();
        let offer = transport
            .create_offer(&OfferOptions {
                offer_to_receive_audio: true,
                offer_to_receive_video: true,
            })
            .await
            .unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);
        assert!(offer.sdp.contains("m=audio"));
        assert!(offer.sdp.contains("m=video"));
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn replaced_track_releases_its_sample_track() {
        use crate::media::TrackSource;

        let factory = NativeTransportFactory::new().unwrap();
        let config = TransportConfig::from(&CallConfig::default());
        let (transport, _events) = factory.create(&config).await.unwrap();
        let video = transport
            .add_transceiver(MediaKind::Video, TransceiverDirection::SendRecv)
            .await
            .unwrap();

        let first = MediaTrack::new(TrackSource::Camera, "cam-1");
        let second = MediaTrack::new(TrackSource::Camera, "cam-2");
        transport
            .replace_sender_track(video, Some(&first))
            .await
            .unwrap();
        assert!(factory.sample_track(first.id()).await.is_some());

        transport
            .replace_sender_track(video, Some(&second))
            .await
            .unwrap();
        assert!(factory.sample_track(first.id()).await.is_none());
        assert!(factory.sample_track(second.id()).await.is_some());

        transport.replace_sender_track(video, None).await.unwrap();
        assert!(factory.sample_track(second.id()).await.is_none());
        transport.close().await.unwrap();
    }
}

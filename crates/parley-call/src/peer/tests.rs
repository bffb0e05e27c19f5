use std::time::Duration;

use parley_config::schema::CallConfig;
use tokio::time::timeout;

use super::*;
use crate::error::{NegotiationError, SignalingError, TransportError};
use crate::media::{LocalStream, MediaKind, MediaTrack, TrackSource};
use crate::session::CallKind;

async fn manager(network: &LoopbackNetwork, kind: CallKind) -> PeerConnectionManager {
    PeerConnectionManager::new(network, &CallConfig::default(), kind)
        .await
        .unwrap()
}

/// Every event that is already queued (or arrives within a short grace).
async fn drain(pcm: &mut PeerConnectionManager) -> Vec<TransportEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = timeout(Duration::from_millis(25), pcm.next_event()).await {
        events.push(event);
    }
    events
}

fn local_candidates(events: &[TransportEvent]) -> Vec<IceCandidate> {
    events
        .iter()
        .filter_map(|e| match e {
            TransportEvent::LocalCandidate(c) => Some(c.clone()),
            _ => None,
        })
        .collect()
}

fn stream(kind: CallKind) -> LocalStream {
    let mut tracks = vec![MediaTrack::new(TrackSource::Microphone, "mic")];
    if kind == CallKind::Video {
        tracks.push(MediaTrack::new(TrackSource::Camera, "cam"));
    }
    LocalStream::new(tracks)
}

fn extra_candidate() -> IceCandidate {
    IceCandidate {
        candidate: "candidate:99 1 udp 1686052607 203.0.113.7 61000 typ srflx".into(),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

// ---------------------------------------------------------------------------
// Transceivers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audio_call_declares_audio_transceiver_only() {
    let network = LoopbackNetwork::new();
    let pcm = manager(&network, CallKind::Audio).await;

    assert!(pcm.has_sender(MediaKind::Audio));
    assert!(!pcm.has_sender(MediaKind::Video));
    assert_eq!(
        network.stats(0).unwrap().transceivers,
        vec![(MediaKind::Audio, TransceiverDirection::SendRecv)]
    );
}

#[tokio::test]
async fn video_call_declares_both_transceivers_sendrecv() {
    let network = LoopbackNetwork::new();
    let pcm = manager(&network, CallKind::Video).await;

    assert!(pcm.has_sender(MediaKind::Video));
    assert_eq!(
        network.stats(0).unwrap().transceivers,
        vec![
            (MediaKind::Audio, TransceiverDirection::SendRecv),
            (MediaKind::Video, TransceiverDirection::SendRecv),
        ]
    );
}

#[tokio::test]
async fn offer_carries_a_line_per_transceiver() {
    let network = LoopbackNetwork::new();
    let mut pcm = manager(&network, CallKind::Video).await;
    let offer = pcm.create_offer().await.unwrap();

    assert_eq!(offer.sdp_type, SdpType::Offer);
    assert!(offer.sdp.starts_with("v=0"));
    assert_eq!(offer.sdp.matches("m=audio").count(), 1);
    assert_eq!(offer.sdp.matches("m=video").count(), 1);
}

// ---------------------------------------------------------------------------
// Negotiation & candidate queueing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn early_candidates_are_applied_once_in_order_after_offer() {
    let network = LoopbackNetwork::new();
    let mut a = manager(&network, CallKind::Audio).await;
    let mut b = manager(&network, CallKind::Audio).await;
    a.attach_local_stream(&stream(CallKind::Audio)).await.unwrap();
    b.attach_local_stream(&stream(CallKind::Audio)).await.unwrap();

    let offer = a.create_offer().await.unwrap();
    a.set_local_description(offer.clone()).await.unwrap();
    let a_events = drain(&mut a).await;
    assert_eq!(a_events[0], TransportEvent::StateChanged(ConnectionState::Connecting));
    assert!(a_events.contains(&TransportEvent::GatheringComplete));

    // Three candidates reach B before the offer does.
    let mut early = local_candidates(&a_events);
    early.push(extra_candidate());
    assert_eq!(early.len(), 3);
    for candidate in &early {
        assert_eq!(
            b.add_ice_candidate(candidate.clone()).await.unwrap(),
            CandidateOutcome::Queued
        );
    }
    assert_eq!(b.pending_candidates(), 3);
    assert!(network.stats(1).unwrap().applied_candidates.is_empty());

    assert_eq!(b.set_remote_description(offer).await.unwrap(), 3);
    assert_eq!(b.pending_candidates(), 0);
    assert_eq!(network.stats(1).unwrap().applied_candidates, early);

    let answer = b.create_answer().await.unwrap();
    b.set_local_description(answer.clone()).await.unwrap();
    let b_events = drain(&mut b).await;
    assert!(b_events.iter().any(|e| matches!(
        e,
        TransportEvent::RemoteTrack(RemoteTrack { kind: MediaKind::Audio, .. })
    )));

    assert_eq!(a.set_remote_description(answer).await.unwrap(), 0);
    for candidate in local_candidates(&b_events) {
        assert_eq!(
            a.add_ice_candidate(candidate).await.unwrap(),
            CandidateOutcome::Applied
        );
    }

    let a_events = drain(&mut a).await;
    assert!(a_events.contains(&TransportEvent::StateChanged(ConnectionState::Connected)));
    assert_eq!(a.connection_state(), ConnectionState::Connected);
    drain(&mut b).await;
    assert_eq!(b.connection_state(), ConnectionState::Connected);

    // Nothing was applied twice.
    assert_eq!(network.stats(1).unwrap().applied_candidates.len(), 3);
}

#[tokio::test]
async fn duplicate_candidates_are_ignored() {
    let network = LoopbackNetwork::new();
    let mut a = manager(&network, CallKind::Audio).await;
    let mut b = manager(&network, CallKind::Audio).await;

    let offer = a.create_offer().await.unwrap();
    a.set_local_description(offer.clone()).await.unwrap();

    let candidate = extra_candidate();
    assert_eq!(
        b.add_ice_candidate(candidate.clone()).await.unwrap(),
        CandidateOutcome::Queued
    );
    assert_eq!(
        b.add_ice_candidate(candidate.clone()).await.unwrap(),
        CandidateOutcome::Duplicate
    );
    assert_eq!(b.pending_candidates(), 1);

    b.set_remote_description(offer).await.unwrap();
    assert_eq!(
        b.add_ice_candidate(candidate).await.unwrap(),
        CandidateOutcome::Duplicate
    );
    assert_eq!(network.stats(1).unwrap().applied_candidates.len(), 1);
}

#[tokio::test]
async fn queue_overflow_is_reported() {
    let network = LoopbackNetwork::new();
    let config = CallConfig {
        max_pending_candidates: 2,
        ..Default::default()
    };
    let mut pcm = PeerConnectionManager::new(&network, &config, CallKind::Audio)
        .await
        .unwrap();

    for n in 0..2 {
        let mut c = extra_candidate();
        c.candidate = format!("candidate:{n} 1 udp 1 10.0.0.1 5000 typ host");
        pcm.add_ice_candidate(c).await.unwrap();
    }
    assert_eq!(
        pcm.add_ice_candidate(extra_candidate()).await,
        Err(SignalingError::CandidateQueueFull(2))
    );
}

#[tokio::test]
async fn invalid_remote_sdp_is_a_negotiation_error() {
    let network = LoopbackNetwork::new();
    let mut pcm = manager(&network, CallKind::Audio).await;

    let err = pcm
        .set_remote_description(SessionDescription::offer("not sdp"))
        .await
        .unwrap_err();
    assert!(matches!(err, NegotiationError::SetRemote(_)));
    assert!(pcm.remote_description().is_none());
}

// ---------------------------------------------------------------------------
// Track replacement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replace_track_swaps_without_renegotiation() {
    let network = LoopbackNetwork::new();
    let mut pcm = manager(&network, CallKind::Video).await;
    let local = stream(CallKind::Video);
    pcm.attach_local_stream(&local).await.unwrap();
    pcm.create_offer().await.unwrap();
    let offers_before = network.stats(0).unwrap().offers_created;

    let fresh = MediaTrack::new(TrackSource::Camera, "cam 2");
    let previous = pcm
        .replace_track(MediaKind::Video, Some(fresh.clone()))
        .await
        .unwrap()
        .unwrap();
    assert!(previous.same_track(local.video_track().unwrap()));
    assert!(previous.is_live(), "replaced track is left to the caller");
    assert!(pcm.sender_track(MediaKind::Video).unwrap().same_track(&fresh));

    let stats = network.stats(0).unwrap();
    assert_eq!(stats.offers_created, offers_before);
    assert_eq!(
        stats.replaced_tracks.last().unwrap(),
        &(MediaKind::Video, Some(fresh.id().to_owned()))
    );

    let unbound = pcm.replace_track(MediaKind::Video, None).await.unwrap();
    assert!(unbound.unwrap().same_track(&fresh));
    assert!(pcm.sender_track(MediaKind::Video).is_none());
}

#[tokio::test]
async fn audio_call_has_no_video_sender() {
    let network = LoopbackNetwork::new();
    let mut pcm = manager(&network, CallKind::Audio).await;
    pcm.attach_local_stream(&stream(CallKind::Audio)).await.unwrap();

    let camera = MediaTrack::new(TrackSource::Camera, "cam");
    assert!(matches!(
        pcm.replace_track(MediaKind::Video, Some(camera)).await,
        Err(TransportError::NoSender(MediaKind::Video))
    ));
    assert_eq!(
        pcm.set_track_enabled(MediaKind::Video, false),
        Err(TransportError::NoSender(MediaKind::Video))
    );
}

#[tokio::test]
async fn mismatched_track_kind_is_rejected() {
    let network = LoopbackNetwork::new();
    let mut pcm = manager(&network, CallKind::Video).await;
    let mic = MediaTrack::new(TrackSource::Microphone, "mic");
    let err = pcm.replace_track(MediaKind::Video, Some(mic)).await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidState(_)));
}

#[tokio::test]
async fn set_track_enabled_flips_bound_track() {
    let network = LoopbackNetwork::new();
    let mut pcm = manager(&network, CallKind::Audio).await;
    let local = stream(CallKind::Audio);
    pcm.attach_local_stream(&local).await.unwrap();

    assert_eq!(pcm.set_track_enabled(MediaKind::Audio, false), Ok(true));
    assert!(!local.audio_track().unwrap().is_enabled());
    assert_eq!(pcm.set_track_enabled(MediaKind::Audio, true), Ok(false));
    assert!(local.audio_track().unwrap().is_enabled());
}

// ---------------------------------------------------------------------------
// Close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_is_idempotent_and_hands_back_tracks() {
    let network = LoopbackNetwork::new();
    let mut pcm = manager(&network, CallKind::Video).await;
    pcm.attach_local_stream(&stream(CallKind::Video)).await.unwrap();

    let tracks = pcm.close().await;
    assert_eq!(tracks.len(), 2);
    assert!(pcm.close().await.is_empty());
    assert_eq!(pcm.connection_state(), ConnectionState::Closed);
    assert!(network.stats(0).unwrap().closed);

    assert!(pcm.create_offer().await.is_err());
    assert_eq!(
        pcm.add_ice_candidate(extra_candidate()).await,
        Ok(CandidateOutcome::Discarded)
    );
    assert!(matches!(
        pcm.replace_track(MediaKind::Audio, None).await,
        Err(TransportError::Closed)
    ));
}

#[tokio::test]
async fn remote_close_disconnects_peer() {
    let network = LoopbackNetwork::new();
    let mut a = manager(&network, CallKind::Audio).await;
    let mut b = manager(&network, CallKind::Audio).await;

    let offer = a.create_offer().await.unwrap();
    a.set_local_description(offer.clone()).await.unwrap();
    let a_candidates = local_candidates(&drain(&mut a).await);
    b.set_remote_description(offer).await.unwrap();
    let answer = b.create_answer().await.unwrap();
    b.set_local_description(answer.clone()).await.unwrap();
    let b_candidates = local_candidates(&drain(&mut b).await);
    a.set_remote_description(answer).await.unwrap();
    for c in a_candidates {
        b.add_ice_candidate(c).await.unwrap();
    }
    for c in b_candidates {
        a.add_ice_candidate(c).await.unwrap();
    }
    drain(&mut a).await;
    drain(&mut b).await;
    assert_eq!(b.connection_state(), ConnectionState::Connected);

    a.close().await;
    let events = drain(&mut b).await;
    assert_eq!(
        events,
        vec![TransportEvent::StateChanged(ConnectionState::Disconnected)]
    );
    assert_eq!(b.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn blackhole_network_never_connects() {
    let network = LoopbackNetwork::blackhole();
    let mut a = manager(&network, CallKind::Audio).await;
    let mut b = manager(&network, CallKind::Audio).await;

    let offer = a.create_offer().await.unwrap();
    a.set_local_description(offer.clone()).await.unwrap();
    b.set_remote_description(offer).await.unwrap();
    let answer = b.create_answer().await.unwrap();
    b.set_local_description(answer.clone()).await.unwrap();
    a.set_remote_description(answer).await.unwrap();
    for c in local_candidates(&drain(&mut b).await) {
        a.add_ice_candidate(c).await.unwrap();
    }
    for c in local_candidates(&drain(&mut a).await) {
        b.add_ice_candidate(c).await.unwrap();
    }

    drain(&mut a).await;
    assert_eq!(a.connection_state(), ConnectionState::Connecting);
}

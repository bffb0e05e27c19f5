use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley_common::{CallId, ParticipantId};
use parley_config::ParleyConfig;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::error::{AcquisitionError, CallError, ToggleError};
use crate::media::{
    LocalStream, MediaKind, MediaTrack, SyntheticDeviceOptions, SyntheticDevices, TrackSource,
};
use crate::peer::{ConnectionState, LoopbackNetwork, RemoteTrack, SessionDescription};
use crate::protocol::{events, SignalBody, SignalingMessage};
use crate::signaling::LocalSignalingBus;

/// Records what the session asked to render.
#[derive(Default)]
struct RecordingDisplay {
    local_streams: Mutex<usize>,
    local_video: Mutex<Vec<Option<String>>>,
    remote: Mutex<Vec<RemoteTrack>>,
    detached: Mutex<usize>,
}

impl DisplaySink for RecordingDisplay {
    fn attach_local(&self, _stream: &LocalStream) {
        *self.local_streams.lock().unwrap() += 1;
    }

    fn local_video_changed(&self, track: Option<&MediaTrack>) {
        self.local_video
            .lock()
            .unwrap()
            .push(track.map(|t| t.id().to_string()));
    }

    fn attach_remote(&self, track: &RemoteTrack) {
        self.remote.lock().unwrap().push(track.clone());
    }

    fn detach_all(&self) {
        *self.detached.lock().unwrap() += 1;
    }
}

struct Party {
    controller: CallSessionController,
    events: mpsc::UnboundedReceiver<CallEvent>,
    devices: Arc<SyntheticDevices>,
    display: Arc<RecordingDisplay>,
}

fn deps(
    network: &LoopbackNetwork,
    bus: &LocalSignalingBus,
    participant: &ParticipantId,
    devices: &Arc<SyntheticDevices>,
    display: &Arc<RecordingDisplay>,
) -> CallDependencies {
    CallDependencies {
        devices: devices.clone(),
        transports: Arc::new(network.clone()),
        signaling: Arc::new(bus.endpoint(participant.clone())),
        display: display.clone(),
    }
}

async fn start_with(
    network: &LoopbackNetwork,
    bus: &LocalSignalingBus,
    session: CallSession,
    options: SyntheticDeviceOptions,
    config: &ParleyConfig,
) -> Result<Party, CallError> {
    let devices = Arc::new(SyntheticDevices::new(options));
    let display = Arc::new(RecordingDisplay::default());
    let deps = deps(network, bus, &session.local, &devices, &display);
    let (controller, events) = CallSessionController::initialize(session, deps, config).await?;
    Ok(Party {
        controller,
        events,
        devices,
        display,
    })
}

async fn start(network: &LoopbackNetwork, bus: &LocalSignalingBus, session: CallSession) -> Party {
    start_with(
        network,
        bus,
        session,
        SyntheticDeviceOptions::default(),
        &ParleyConfig::default(),
    )
    .await
    .unwrap()
}

fn alice() -> ParticipantId {
    ParticipantId::from("alice")
}

fn bob() -> ParticipantId {
    ParticipantId::from("bob")
}

/// Collect events until one matches `done`. Panics after two seconds.
async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<CallEvent>,
    done: impl Fn(&CallEvent) -> bool,
) -> Vec<CallEvent> {
    let mut seen = Vec::new();
    let collect = async {
        while let Some(event) = events.recv().await {
            let finished = done(&event);
            seen.push(event);
            if finished {
                return true;
            }
        }
        false
    };
    let found = timeout(Duration::from_secs(2), collect).await;
    assert!(
        matches!(found, Ok(true)),
        "expected event never arrived, saw {seen:?}"
    );
    seen
}

/// Alice calls Bob over a fresh network and bus; both reach `Connected`.
async fn connected_pair(kind: CallKind) -> (LoopbackNetwork, LocalSignalingBus, Party, Party) {
    let network = LoopbackNetwork::new();
    let bus = LocalSignalingBus::new();
    let outgoing = CallSession::outgoing(kind, alice(), bob());
    let incoming = CallSession::incoming(outgoing.call_id.clone(), kind, bob(), alice());

    // The callee must be listening before the offer goes out.
    let mut callee = start(&network, &bus, incoming).await;
    let mut caller = start(&network, &bus, outgoing).await;

    wait_for(&mut caller.events, |e| *e == CallEvent::Connected).await;
    wait_for(&mut callee.events, |e| *e == CallEvent::Connected).await;
    (network, bus, caller, callee)
}

// ---------------------------------------------------------------------------
// Setup and negotiation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn caller_and_callee_connect() {
    let (_network, bus, caller, callee) = connected_pair(CallKind::Video).await;

    assert_eq!(bus.sent_by(&alice(), events::OFFER).len(), 1);
    assert_eq!(bus.sent_by(&bob(), events::ANSWER).len(), 1);
    assert!(bus.sent_by(&bob(), events::OFFER).is_empty());

    let snapshot = caller.controller.state().await.unwrap();
    assert_eq!(snapshot.connection, ConnectionState::Connected);
    assert!(snapshot.audio_enabled);
    assert_eq!(snapshot.video, VideoSource::Camera);

    assert_eq!(*callee.display.local_streams.lock().unwrap(), 1);
    let remote_kinds: Vec<MediaKind> = callee
        .display
        .remote
        .lock()
        .unwrap()
        .iter()
        .map(|t| t.kind)
        .collect();
    assert_eq!(remote_kinds, vec![MediaKind::Audio, MediaKind::Video]);
}

#[tokio::test]
async fn audio_call_offer_answer_with_fixed_call_id() {
    let network = LoopbackNetwork::new();
    let bus = LocalSignalingBus::new();
    let call_id = CallId::from("abc123");
    let outgoing = CallSession {
        call_id: call_id.clone(),
        kind: CallKind::Audio,
        direction: CallDirection::Outgoing,
        local: alice(),
        remote: bob(),
    };
    let incoming = CallSession::incoming(call_id.clone(), CallKind::Audio, bob(), alice());

    let mut callee = start(&network, &bus, incoming).await;
    let mut caller = start(&network, &bus, outgoing).await;
    wait_for(&mut caller.events, |e| *e == CallEvent::Connected).await;
    wait_for(&mut callee.events, |e| *e == CallEvent::Connected).await;

    let offers = bus.sent_by(&alice(), events::OFFER);
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].call_id, call_id);
    let wire = offers[0].to_wire();
    assert_eq!(wire["payload"]["sdpType"], "offer");

    // The callee had nothing queued when the offer arrived.
    let callee_stats = network.stats(0).unwrap();
    assert_eq!(callee_stats.remote_descriptions.len(), 1);
    assert_eq!(callee_stats.answers_created, 1);
    assert_eq!(network.stats(1).unwrap().remote_descriptions.len(), 1);
}

#[tokio::test]
async fn invalid_remote_offer_fails_and_tears_down() {
    let network = LoopbackNetwork::new();
    let bus = LocalSignalingBus::new();
    let session = CallSession::incoming(CallId::new(), CallKind::Video, bob(), alice());
    let call_id = session.call_id.clone();
    let mut callee = start(&network, &bus, session).await;

    let offer = SignalingMessage::new(
        call_id.clone(),
        alice(),
        SignalBody::Offer(SessionDescription::offer("not a session description")),
    );
    bus.publish_raw(&call_id, offer.to_wire());

    let seen = wait_for(&mut callee.events, |e| *e == CallEvent::Ended).await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, CallEvent::Failed(CallError::Negotiation(_)))));
    assert!(callee.devices.live_tracks().is_empty());
    assert!(network.stats(0).unwrap().closed);
    assert_eq!(bus.subscriber_count(&call_id), 0);
    assert!(bus.sent_by(&bob(), events::ANSWER).is_empty());
}

#[tokio::test]
async fn audio_call_acquires_microphone_only() {
    let (_network, _bus, caller, _callee) = connected_pair(CallKind::Audio).await;

    let live = caller.devices.live_tracks();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].source(), TrackSource::Microphone);
    assert_eq!(
        caller.controller.state().await.unwrap().video,
        VideoSource::Off
    );
}

#[tokio::test]
async fn denied_microphone_fails_before_any_resources() {
    let network = LoopbackNetwork::new();
    let bus = LocalSignalingBus::new();
    let session = CallSession::outgoing(CallKind::Video, alice(), bob());
    let call_id = session.call_id.clone();

    let options = SyntheticDeviceOptions {
        deny_microphone: true,
        ..Default::default()
    };
    let result = start_with(&network, &bus, session, options, &ParleyConfig::default()).await;

    assert!(matches!(
        result,
        Err(CallError::Acquisition(AcquisitionError::PermissionDenied(_)))
    ));
    assert_eq!(network.endpoint_count(), 0);
    assert_eq!(bus.subscriber_count(&call_id), 0);
    assert!(bus.sent().is_empty());
}

#[tokio::test]
async fn connect_timeout_fails_and_cleans_up() {
    let network = LoopbackNetwork::blackhole();
    let bus = LocalSignalingBus::new();
    let session = CallSession::outgoing(CallKind::Video, alice(), bob());
    let call_id = session.call_id.clone();

    let mut config = ParleyConfig::default();
    config.call.connect_timeout_ms = 200;
    let mut party = start_with(
        &network,
        &bus,
        session,
        SyntheticDeviceOptions::default(),
        &config,
    )
    .await
    .unwrap();

    let seen = wait_for(&mut party.events, |e| *e == CallEvent::Ended).await;
    assert!(seen.contains(&CallEvent::Connecting));
    assert!(seen
        .iter()
        .any(|e| matches!(e, CallEvent::Failed(CallError::ConnectionFailed(_)))));
    assert!(party.devices.live_tracks().is_empty());
    assert_eq!(bus.subscriber_count(&call_id), 0);
    assert!(network.stats(0).unwrap().closed);
}

#[tokio::test]
async fn remote_hangup_fails_the_call() {
    let (_network, _bus, mut caller, callee) = connected_pair(CallKind::Audio).await;

    callee.controller.cleanup().await;

    let seen = wait_for(&mut caller.events, |e| *e == CallEvent::Ended).await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, CallEvent::Failed(CallError::ConnectionFailed(_)))));
    assert!(caller.devices.live_tracks().is_empty());
}

// ---------------------------------------------------------------------------
// Toggles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audio_toggle_announces_each_change() {
    let (_network, bus, mut caller, mut callee) = connected_pair(CallKind::Audio).await;

    assert_eq!(caller.controller.toggle_audio().await, Ok(false));
    assert_eq!(caller.controller.toggle_audio().await, Ok(true));

    let statuses = bus.sent_by(&alice(), events::TRACK_STATUS);
    assert_eq!(statuses.len(), 2);

    let microphone = caller.devices.last_track(TrackSource::Microphone).unwrap();
    assert!(microphone.is_enabled());

    wait_for(&mut caller.events, |e| {
        *e == CallEvent::Toggled {
            kind: MediaKind::Audio,
            enabled: true,
        }
    })
    .await;
    let seen = wait_for(&mut callee.events, |e| {
        *e == CallEvent::RemoteTrackStatus {
            kind: MediaKind::Audio,
            enabled: true,
        }
    })
    .await;
    assert!(seen.contains(&CallEvent::RemoteTrackStatus {
        kind: MediaKind::Audio,
        enabled: false,
    }));
}

#[tokio::test]
async fn camera_reenable_swaps_track_without_renegotiation() {
    let (network, _bus, caller, _callee) = connected_pair(CallKind::Video).await;
    // The callee joined the network first.
    let caller_offers = network.stats(1).unwrap().offers_created;
    let first_camera = caller.devices.last_track(TrackSource::Camera).unwrap();

    assert_eq!(caller.controller.toggle_video().await, Ok(false));
    assert!(!first_camera.is_enabled());
    assert!(first_camera.is_live());

    assert_eq!(caller.controller.toggle_video().await, Ok(true));
    let second_camera = caller.devices.last_track(TrackSource::Camera).unwrap();
    assert!(!second_camera.same_track(&first_camera));
    assert!(!first_camera.is_live());

    let stats = network.stats(1).unwrap();
    assert_eq!(stats.offers_created, caller_offers);
    assert_eq!(
        stats.replaced_tracks.last(),
        Some(&(MediaKind::Video, Some(second_camera.id().to_string())))
    );
    assert_eq!(
        network.connection_state(1),
        Some(ConnectionState::Connected)
    );
}

#[tokio::test]
async fn camera_toggles_do_not_accumulate_tracks() {
    let (_network, _bus, caller, _callee) = connected_pair(CallKind::Video).await;
    caller
        .devices
        .update_options(|o| o.screen_system_audio = true);
    assert_eq!(caller.controller.state().await.unwrap().local_tracks, 2);

    for _ in 0..3 {
        assert_eq!(caller.controller.toggle_video().await, Ok(false));
        assert_eq!(caller.controller.toggle_video().await, Ok(true));
    }
    assert_eq!(caller.controller.state().await.unwrap().local_tracks, 2);

    assert_eq!(caller.controller.toggle_screen_share().await, Ok(true));
    assert_eq!(caller.controller.toggle_screen_share().await, Ok(false));
    assert_eq!(caller.controller.state().await.unwrap().local_tracks, 2);
    assert_eq!(caller.devices.live_tracks().len(), 2);
}

#[tokio::test]
async fn audio_call_rejects_video_toggles() {
    let (_network, _bus, mut caller, _callee) = connected_pair(CallKind::Audio).await;

    assert_eq!(
        caller.controller.toggle_video().await,
        Err(CallError::Toggle(ToggleError::NoVideoSender))
    );
    assert_eq!(
        caller.controller.toggle_screen_share().await,
        Err(CallError::Toggle(ToggleError::NoVideoSender))
    );
    wait_for(&mut caller.events, |e| {
        *e == CallEvent::ToggleFailed(ToggleError::NoVideoSender)
    })
    .await;
    assert!(caller.controller.is_active());
}

#[tokio::test]
async fn failed_camera_reacquire_keeps_previous_state() {
    let (_network, _bus, caller, _callee) = connected_pair(CallKind::Video).await;

    assert_eq!(caller.controller.toggle_video().await, Ok(false));
    caller.devices.update_options(|o| o.deny_camera = true);

    let result = caller.controller.toggle_video().await;
    assert!(matches!(
        result,
        Err(CallError::Toggle(ToggleError::Reacquire(_)))
    ));
    assert_eq!(
        caller.controller.state().await.unwrap().video,
        VideoSource::Off
    );
}

// ---------------------------------------------------------------------------
// Screen share
// ---------------------------------------------------------------------------

#[tokio::test]
async fn screen_share_round_trip_restores_camera() {
    let (network, bus, mut caller, mut callee) = connected_pair(CallKind::Video).await;
    let camera = caller.devices.last_track(TrackSource::Camera).unwrap();

    assert_eq!(caller.controller.toggle_screen_share().await, Ok(true));
    let screen = caller.devices.last_track(TrackSource::Screen).unwrap();
    assert_eq!(
        caller.controller.state().await.unwrap().video,
        VideoSource::Screen
    );
    assert_eq!(
        caller.controller.toggle_video().await,
        Err(CallError::Toggle(ToggleError::ScreenShareActive))
    );

    assert_eq!(caller.controller.toggle_screen_share().await, Ok(false));
    assert!(!screen.is_live());
    assert!(camera.is_live());
    assert_eq!(
        caller.controller.state().await.unwrap().video,
        VideoSource::Camera
    );

    let stats = network.stats(1).unwrap();
    assert_eq!(
        stats.replaced_tracks.last(),
        Some(&(MediaKind::Video, Some(camera.id().to_string())))
    );
    assert_eq!(bus.sent_by(&alice(), events::TRACK_REPLACED).len(), 2);

    wait_for(&mut caller.events, |e| *e == CallEvent::ScreenShareEnded).await;
    let seen = wait_for(&mut callee.events, |e| {
        *e == CallEvent::RemoteScreenShare { active: false }
    })
    .await;
    assert!(seen.contains(&CallEvent::RemoteScreenShare { active: true }));
}

#[tokio::test]
async fn screen_capture_ended_by_source_reverts_automatically() {
    let (_network, _bus, mut caller, _callee) = connected_pair(CallKind::Video).await;
    let camera = caller.devices.last_track(TrackSource::Camera).unwrap();

    assert_eq!(caller.controller.toggle_screen_share().await, Ok(true));
    let screen = caller.devices.last_track(TrackSource::Screen).unwrap();

    screen.end_from_source();

    wait_for(&mut caller.events, |e| *e == CallEvent::ScreenShareEnded).await;
    assert_eq!(
        caller.controller.state().await.unwrap().video,
        VideoSource::Camera
    );
    let local_video = caller.display.local_video.lock().unwrap().clone();
    assert_eq!(local_video.last(), Some(&Some(camera.id().to_string())));
}

#[tokio::test]
async fn sharing_from_camera_off_returns_to_off() {
    let (_network, _bus, caller, _callee) = connected_pair(CallKind::Video).await;

    assert_eq!(caller.controller.toggle_video().await, Ok(false));
    assert_eq!(caller.controller.toggle_screen_share().await, Ok(true));
    assert_eq!(caller.controller.toggle_screen_share().await, Ok(false));
    assert_eq!(
        caller.controller.state().await.unwrap().video,
        VideoSource::Off
    );
}

#[tokio::test]
async fn cancelled_picker_leaves_camera_untouched() {
    let (_network, _bus, caller, _callee) = connected_pair(CallKind::Video).await;
    caller.devices.update_options(|o| o.cancel_screen_picker = true);

    assert_eq!(
        caller.controller.toggle_screen_share().await,
        Err(CallError::Toggle(ToggleError::Reacquire(
            AcquisitionError::Cancelled
        )))
    );
    assert_eq!(
        caller.controller.state().await.unwrap().video,
        VideoSource::Camera
    );
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_mid_share_releases_everything_and_is_idempotent() {
    let (network, _bus, mut caller, _callee) = connected_pair(CallKind::Video).await;
    caller
        .devices
        .update_options(|o| o.screen_system_audio = true);
    assert_eq!(caller.controller.toggle_screen_share().await, Ok(true));

    caller.controller.cleanup().await;
    caller.controller.cleanup().await;

    assert!(caller.devices.live_tracks().is_empty());
    assert!(network.stats(1).unwrap().closed);
    assert_eq!(*caller.display.detached.lock().unwrap(), 1);

    wait_for(&mut caller.events, |e| *e == CallEvent::Ended).await;
    assert_eq!(
        caller.controller.toggle_audio().await,
        Err(CallError::SessionClosed)
    );
    assert!(!caller.controller.is_active());
}

#[tokio::test]
async fn undrained_events_do_not_block_cleanup() {
    let (network, _bus, caller, _callee) = connected_pair(CallKind::Audio).await;

    // Nobody reads caller.events from here on.
    for _ in 0..80 {
        let toggled = timeout(Duration::from_millis(500), caller.controller.toggle_audio()).await;
        assert!(matches!(toggled, Ok(Ok(_))));
    }

    let cleaned = timeout(Duration::from_secs(2), caller.controller.cleanup()).await;
    assert!(cleaned.is_ok());
    assert!(network.stats(1).unwrap().closed);
    assert!(caller.devices.live_tracks().is_empty());
    assert!(!caller.controller.is_active());
}

#[tokio::test]
async fn cleanup_mid_negotiation_releases_everything() {
    let network = LoopbackNetwork::new();
    let bus = LocalSignalingBus::new();
    let session = CallSession::outgoing(CallKind::Video, alice(), bob());
    let call_id = session.call_id.clone();
    let mut party = start(&network, &bus, session).await;
    assert_eq!(bus.sent_by(&alice(), events::OFFER).len(), 1);

    party.controller.cleanup().await;
    party.controller.cleanup().await;

    assert!(party.devices.live_tracks().is_empty());
    assert!(network.stats(0).unwrap().closed);
    assert_eq!(bus.subscriber_count(&call_id), 0);
    let seen = wait_for(&mut party.events, |e| *e == CallEvent::Ended).await;
    assert!(!seen.iter().any(|e| matches!(e, CallEvent::Failed(_))));
    assert_eq!(
        party.controller.state().await,
        Err(CallError::SessionClosed)
    );
}

#[tokio::test]
async fn dropping_the_controller_ends_the_call() {
    let (network, bus, caller, callee) = connected_pair(CallKind::Video).await;
    let call_id = caller.controller.session().call_id.clone();
    let Party {
        controller,
        mut events,
        devices,
        ..
    } = caller;

    drop(controller);
    wait_for(&mut events, |e| *e == CallEvent::Ended).await;

    assert!(devices.live_tracks().is_empty());
    assert!(network.stats(1).unwrap().closed);

    callee.controller.cleanup().await;
    assert_eq!(bus.subscriber_count(&call_id), 0);
}

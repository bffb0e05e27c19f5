//! Two in-process participants calling each other.
//!
//! Uses synthetic capture, the loopback network and the local signaling bus,
//! so the whole negotiation and every toggle can be watched in the logs
//! without hardware or a relay.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parley_call::media::{LocalStream, MediaTrack, SyntheticDeviceOptions, SyntheticDevices};
use parley_call::peer::{LoopbackNetwork, RemoteTrack};
use parley_call::signaling::LocalSignalingBus;
use parley_call::{
    CallDependencies, CallError, CallEvent, CallKind, CallSession, CallSessionController,
    DisplaySink,
};
use parley_common::ParticipantId;
use parley_config::ParleyConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Logs what a UI would render.
struct LogDisplay {
    participant: ParticipantId,
}

impl DisplaySink for LogDisplay {
    fn attach_local(&self, stream: &LocalStream) {
        info!(participant = %self.participant, tracks = stream.tracks().len(), "Local preview attached");
    }

    fn local_video_changed(&self, track: Option<&MediaTrack>) {
        info!(
            participant = %self.participant,
            track = track.map(MediaTrack::label),
            "Local preview switched"
        );
    }

    fn attach_remote(&self, track: &RemoteTrack) {
        info!(participant = %self.participant, kind = %track.kind, id = %track.id, "Remote track attached");
    }

    fn detach_all(&self) {
        info!(participant = %self.participant, "Display cleared");
    }
}

async fn start(
    session: CallSession,
    network: &LoopbackNetwork,
    bus: &LocalSignalingBus,
    config: &ParleyConfig,
) -> Result<(CallSessionController, mpsc::UnboundedReceiver<CallEvent>), CallError> {
    let devices = SyntheticDevices::new(SyntheticDeviceOptions {
        screen_system_audio: true,
        ..Default::default()
    });
    let deps = CallDependencies {
        devices: Arc::new(devices),
        transports: Arc::new(network.clone()),
        signaling: Arc::new(bus.endpoint(session.local.clone())),
        display: Arc::new(LogDisplay {
            participant: session.local.clone(),
        }),
    };
    CallSessionController::initialize(session, deps, config).await
}

/// Log events until the call connects. The session enforces its own
/// connect timeout, so this always finishes.
async fn wait_connected(
    participant: &ParticipantId,
    events: &mut mpsc::UnboundedReceiver<CallEvent>,
) -> Result<(), CallError> {
    while let Some(event) = events.recv().await {
        info!(participant = %participant, ?event, "Call event");
        match event {
            CallEvent::Connected => return Ok(()),
            CallEvent::Failed(e) => return Err(e),
            _ => {}
        }
    }
    Err(CallError::SessionClosed)
}

fn log_events(
    participant: ParticipantId,
    mut events: mpsc::UnboundedReceiver<CallEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(participant = %participant, ?event, "Call event");
            if event == CallEvent::Ended {
                break;
            }
        }
    })
}

pub async fn run(config: &ParleyConfig, kind: CallKind, hold: Duration) -> Result<(), CallError> {
    let network = LoopbackNetwork::new();
    let bus = LocalSignalingBus::new();

    let alice = ParticipantId::from("alice");
    let bob = ParticipantId::from("bob");
    let outgoing = CallSession::outgoing(kind, alice.clone(), bob.clone());
    let incoming = CallSession::incoming(outgoing.call_id.clone(), kind, bob.clone(), alice.clone());
    info!(call_id = %outgoing.call_id, ?kind, "Demo call");

    // Bob listens before Alice's offer goes out.
    let (callee, mut callee_events) = start(incoming, &network, &bus, config).await?;
    let (caller, mut caller_events) = match start(outgoing, &network, &bus, config).await {
        Ok(started) => started,
        Err(e) => {
            callee.cleanup().await;
            return Err(e);
        }
    };

    let connected = async {
        wait_connected(&alice, &mut caller_events).await?;
        wait_connected(&bob, &mut callee_events).await
    };
    if let Err(e) = connected.await {
        caller.cleanup().await;
        callee.cleanup().await;
        return Err(e);
    }

    let loggers = [
        log_events(alice.clone(), caller_events),
        log_events(bob.clone(), callee_events),
    ];

    exercise_toggles(&caller, kind).await;
    let snapshot = caller.state().await?;
    info!(?snapshot, "Caller state");

    tokio::time::sleep(hold).await;

    caller.cleanup().await;
    callee.cleanup().await;
    for logger in loggers {
        let _ = logger.await;
    }

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for message in bus.sent() {
        *counts.entry(message.kind()).or_default() += 1;
    }
    for (kind, count) in counts {
        info!(kind, count, "Signaling messages");
    }
    Ok(())
}

/// Toggle failures are reported as events; the call goes on.
async fn exercise_toggles(caller: &CallSessionController, kind: CallKind) {
    let _ = caller.toggle_audio().await;
    let _ = caller.toggle_audio().await;
    if !kind.has_video() {
        return;
    }
    let _ = caller.toggle_video().await;
    let _ = caller.toggle_video().await;
    let _ = caller.toggle_screen_share().await;
    let _ = caller.toggle_screen_share().await;
}

//! Call orchestration: one background task per call owns all session state.
//!
//! [`CallSessionController`] is a cheap handle that sends commands to the
//! task. The task multiplexes commands, inbound signaling, transport events,
//! the end of an active screen capture, and the connect deadline.

use std::ops::ControlFlow;
use std::sync::Arc;

use parley_config::ParleyConfig;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{AcquisitionError, CallError, ToggleError, TransportError};
use crate::media::{
    EndReason, LocalStream, MediaAcquisition, MediaConstraints, MediaDevices, MediaKind,
    MediaTrack,
};
use crate::peer::{
    ConnectionState, PeerConnectionManager, SessionDescription, TransportEvent, TransportFactory,
};
use crate::protocol::{SignalBody, SignalingMessage, TrackReplacedPayload, TrackStatusPayload};
use crate::signaling::{SignalingChannel, Subscription};

use super::toggle::{ToggleState, VideoSource, VideoToggle};
use super::types::{CallDirection, CallEvent, CallSession, DisplaySink, SessionSnapshot};

const COMMAND_CAPACITY: usize = 16;

/// External collaborators of a call.
#[derive(Clone)]
pub struct CallDependencies {
    pub devices: Arc<dyn MediaDevices>,
    pub transports: Arc<dyn TransportFactory>,
    pub signaling: Arc<dyn SignalingChannel>,
    pub display: Arc<dyn DisplaySink>,
}

enum SessionCommand {
    ToggleAudio(oneshot::Sender<Result<bool, CallError>>),
    ToggleVideo(oneshot::Sender<Result<bool, CallError>>),
    ToggleScreenShare(oneshot::Sender<Result<bool, CallError>>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Cleanup(oneshot::Sender<()>),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running call. Dropping it ends the call.
pub struct CallSessionController {
    session: CallSession,
    commands: mpsc::Sender<SessionCommand>,
}

impl CallSessionController {
    /// Acquire media, open the peer connection, subscribe to signaling and
    /// start the session task. Outgoing calls have sent their offer when
    /// this returns; incoming calls wait for one.
    ///
    /// Returns the handle and the receiver of [`CallEvent`]s.
    pub async fn initialize(
        session: CallSession,
        deps: CallDependencies,
        config: &ParleyConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CallEvent>), CallError> {
        info!(
            call_id = %session.call_id,
            kind = ?session.kind,
            direction = ?session.direction,
            "Starting call"
        );

        let acquisition =
            MediaAcquisition::new(deps.devices.clone(), MediaConstraints::from(&config.media));
        let local = acquisition
            .acquire_user_media(session.kind.has_video())
            .await?;

        let mut pcm =
            match PeerConnectionManager::new(&*deps.transports, &config.call, session.kind).await {
                Ok(pcm) => pcm,
                Err(e) => {
                    local.stop();
                    return Err(connection_failed(e));
                }
            };
        if let Err(e) = pcm.attach_local_stream(&local).await {
            pcm.close().await;
            local.stop();
            return Err(connection_failed(e));
        }

        let subscription = match deps.signaling.subscribe(&session.call_id).await {
            Ok(sub) => sub,
            Err(e) => {
                pcm.close().await;
                local.stop();
                return Err(e.into());
            }
        };
        deps.display.attach_local(&local);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        let mut task = SessionTask {
            toggles: ToggleState::new(session.kind),
            owned_tracks: local.tracks().to_vec(),
            session: session.clone(),
            pcm,
            acquisition,
            signaling: deps.signaling,
            subscription: Some(subscription),
            display: deps.display,
            events: event_tx,
            screen: None,
            saved_video: None,
            deadline: Some(Instant::now() + config.call.connect_timeout()),
            ended: false,
        };

        if session.direction == CallDirection::Outgoing {
            if let Err(e) = task.send_offer().await {
                error!(call_id = %session.call_id, error = %e, "Offer failed");
                task.cleanup().await;
                return Err(e);
            }
        }

        tokio::spawn(task.run(command_rx));
        Ok((
            Self {
                session,
                commands: command_tx,
            },
            event_rx,
        ))
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    /// Mute or unmute the microphone. Returns the new enabled state.
    pub async fn toggle_audio(&self) -> Result<bool, CallError> {
        self.request(SessionCommand::ToggleAudio).await?
    }

    /// Turn the camera off, or back on with a freshly acquired track.
    pub async fn toggle_video(&self) -> Result<bool, CallError> {
        self.request(SessionCommand::ToggleVideo).await?
    }

    /// Start or stop sharing the screen. Returns whether sharing is active.
    pub async fn toggle_screen_share(&self) -> Result<bool, CallError> {
        self.request(SessionCommand::ToggleScreenShare).await?
    }

    pub async fn state(&self) -> Result<SessionSnapshot, CallError> {
        self.request(SessionCommand::Snapshot).await
    }

    /// Release every resource of the call. Safe to call at any time and
    /// any number of times.
    pub async fn cleanup(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(SessionCommand::Cleanup(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_active(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, CallError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| CallError::SessionClosed)?;
        rx.await.map_err(|_| CallError::SessionClosed)
    }
}

fn connection_failed(e: TransportError) -> CallError {
    CallError::ConnectionFailed(e.to_string())
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

struct SessionTask {
    session: CallSession,
    pcm: PeerConnectionManager,
    acquisition: MediaAcquisition,
    signaling: Arc<dyn SignalingChannel>,
    subscription: Option<Subscription>,
    display: Arc<dyn DisplaySink>,
    /// Unbounded so a slow reader never stalls the task.
    events: mpsc::UnboundedSender<CallEvent>,
    toggles: ToggleState,
    /// Every local track this session acquired; all stopped at cleanup.
    owned_tracks: Vec<MediaTrack>,
    screen: Option<LocalStream>,
    /// Video track that was on the sender before the share started.
    saved_video: Option<MediaTrack>,
    deadline: Option<Instant>,
    ended: bool,
}

async fn next_signal(subscription: &mut Option<Subscription>) -> Option<SignalingMessage> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

async fn screen_ended(track: Option<MediaTrack>) -> EndReason {
    match track {
        Some(track) => track.ended().await,
        None => std::future::pending().await,
    }
}

impl SessionTask {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        loop {
            let screen_track = self.screen.as_ref().and_then(|s| s.video_track().cloned());
            let watching_screen = screen_track.is_some();
            let deadline = self.deadline.unwrap_or_else(Instant::now);
            let has_deadline = self.deadline.is_some();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let ControlFlow::Break(reply) = self.handle_command(command).await {
                            commands.close();
                            let _ = reply.send(());
                            break;
                        }
                    }
                    None => {
                        debug!(call_id = %self.session.call_id, "Controller dropped");
                        self.cleanup().await;
                        break;
                    }
                },
                message = next_signal(&mut self.subscription) => match message {
                    Some(message) => {
                        if let Err(e) = self.handle_signal(message).await {
                            self.fail(e).await;
                            break;
                        }
                    }
                    None => {
                        warn!(call_id = %self.session.call_id, "Signaling feed ended");
                        self.subscription = None;
                    }
                },
                event = self.pcm.next_event() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_transport(event).await {
                            self.fail(e).await;
                            break;
                        }
                    }
                    None => {
                        self.fail(CallError::ConnectionFailed("transport went away".into())).await;
                        break;
                    }
                },
                reason = screen_ended(screen_track), if watching_screen => {
                    info!(call_id = %self.session.call_id, ?reason, "Screen capture ended");
                    if let Err(e) = self.stop_screen_share().await {
                        self.toggle_failed(e);
                    }
                },
                _ = tokio::time::sleep_until(deadline), if has_deadline => {
                    warn!(call_id = %self.session.call_id, "Connect timeout");
                    self.fail(CallError::ConnectionFailed("timed out waiting for connection".into())).await;
                    break;
                },
            }
        }
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.events.send(event);
    }

    async fn send(&self, body: SignalBody) {
        let message =
            SignalingMessage::new(self.session.call_id.clone(), self.session.local.clone(), body);
        let kind = message.kind();
        if let Err(e) = self.signaling.send(message).await {
            warn!(call_id = %self.session.call_id, kind, error = %e, "Signaling send failed");
        }
    }

    // -----------------------------------------------------------------------
    // Negotiation
    // -----------------------------------------------------------------------

    async fn send_offer(&mut self) -> Result<(), CallError> {
        let offer = self.pcm.create_offer().await?;
        self.pcm.set_local_description(offer.clone()).await?;
        info!(call_id = %self.session.call_id, "Offer sent");
        self.send(SignalBody::Offer(offer)).await;
        Ok(())
    }

    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<(), CallError> {
        if self.session.direction == CallDirection::Outgoing {
            warn!(call_id = %self.session.call_id, "Ignoring offer on outgoing call");
            return Ok(());
        }
        if let Some(remote) = self.pcm.remote_description() {
            if *remote == offer {
                debug!(call_id = %self.session.call_id, "Duplicate offer");
            } else {
                warn!(call_id = %self.session.call_id, "Ignoring renegotiation offer");
            }
            return Ok(());
        }

        let drained = self.pcm.set_remote_description(offer).await?;
        let answer = self.pcm.create_answer().await?;
        self.pcm.set_local_description(answer.clone()).await?;
        info!(call_id = %self.session.call_id, drained, "Answer sent");
        self.send(SignalBody::Answer(answer)).await;
        Ok(())
    }

    async fn accept_answer(&mut self, answer: SessionDescription) -> Result<(), CallError> {
        if self.session.direction == CallDirection::Incoming || self.pcm.local_description().is_none()
        {
            warn!(call_id = %self.session.call_id, "Ignoring unexpected answer");
            return Ok(());
        }
        if let Some(remote) = self.pcm.remote_description() {
            if *remote != answer {
                warn!(call_id = %self.session.call_id, "Ignoring second answer");
            }
            return Ok(());
        }
        let drained = self.pcm.set_remote_description(answer).await?;
        info!(call_id = %self.session.call_id, drained, "Answer applied");
        Ok(())
    }

    /// Soft problems are logged here; only negotiation failures escape.
    async fn handle_signal(&mut self, message: SignalingMessage) -> Result<(), CallError> {
        debug!(call_id = %self.session.call_id, kind = message.kind(), "Signal received");
        match message.body {
            SignalBody::Offer(offer) => self.accept_offer(offer).await,
            SignalBody::Answer(answer) => self.accept_answer(answer).await,
            SignalBody::IceCandidate(candidate) => {
                if let Err(e) = self.pcm.add_ice_candidate(candidate).await {
                    warn!(call_id = %self.session.call_id, error = %e, "Remote candidate dropped");
                }
                Ok(())
            }
            SignalBody::TrackStatus(TrackStatusPayload {
                track_kind,
                enabled,
            }) => {
                self.emit(CallEvent::RemoteTrackStatus {
                    kind: track_kind,
                    enabled,
                });
                Ok(())
            }
            SignalBody::TrackReplaced(TrackReplacedPayload {
                is_screen_share, ..
            }) => {
                self.emit(CallEvent::RemoteScreenShare {
                    active: is_screen_share,
                });
                Ok(())
            }
        }
    }

    async fn handle_transport(&mut self, event: TransportEvent) -> Result<(), CallError> {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                self.send(SignalBody::IceCandidate(candidate)).await;
            }
            TransportEvent::GatheringComplete => {
                debug!(call_id = %self.session.call_id, "Candidate gathering complete");
            }
            TransportEvent::RemoteTrack(track) => {
                self.display.attach_remote(&track);
                self.emit(CallEvent::RemoteTrack(track));
            }
            TransportEvent::StateChanged(state) => match state {
                ConnectionState::Connecting => self.emit(CallEvent::Connecting),
                ConnectionState::Connected => {
                    self.deadline = None;
                    info!(call_id = %self.session.call_id, "Call connected");
                    self.emit(CallEvent::Connected);
                }
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    return Err(CallError::ConnectionFailed(format!("connection {state}")));
                }
                ConnectionState::New | ConnectionState::Closed => {}
            },
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Toggles
    // -----------------------------------------------------------------------

    /// Breaks with the reply once `Cleanup` has run; the caller closes the
    /// command queue before answering.
    async fn handle_command(
        &mut self,
        command: SessionCommand,
    ) -> ControlFlow<oneshot::Sender<()>> {
        match command {
            SessionCommand::ToggleAudio(reply) => {
                let result = self.toggle_audio().await;
                let _ = reply.send(self.toggle_result(result));
            }
            SessionCommand::ToggleVideo(reply) => {
                let result = self.toggle_video().await;
                let _ = reply.send(self.toggle_result(result));
            }
            SessionCommand::ToggleScreenShare(reply) => {
                let result = self.toggle_screen_share().await;
                let _ = reply.send(self.toggle_result(result));
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(SessionSnapshot {
                    connection: self.pcm.connection_state(),
                    audio_enabled: self.toggles.audio_enabled(),
                    video: self.toggles.video(),
                    local_tracks: self.owned_tracks.len(),
                });
            }
            SessionCommand::Cleanup(reply) => {
                self.cleanup().await;
                return ControlFlow::Break(reply);
            }
        }
        ControlFlow::Continue(())
    }

    fn toggle_result(&self, result: Result<bool, ToggleError>) -> Result<bool, CallError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.toggle_failed(e.clone());
                Err(e.into())
            }
        }
    }

    fn toggle_failed(&self, e: ToggleError) {
        warn!(call_id = %self.session.call_id, error = %e, "Toggle failed");
        self.emit(CallEvent::ToggleFailed(e));
    }

    async fn toggle_audio(&mut self) -> Result<bool, ToggleError> {
        let enabled = !self.toggles.audio_enabled();
        self.pcm.set_track_enabled(MediaKind::Audio, enabled)?;
        self.toggles.set_audio_enabled(enabled);
        self.announce_status(MediaKind::Audio, enabled).await;
        Ok(enabled)
    }

    async fn toggle_video(&mut self) -> Result<bool, ToggleError> {
        match self.toggles.plan(VideoToggle::Camera)? {
            VideoSource::Off => {
                self.pcm.set_track_enabled(MediaKind::Video, false)?;
                self.toggles.commit(VideoSource::Off);
                self.announce_status(MediaKind::Video, false).await;
                Ok(false)
            }
            _ => {
                let camera = self.acquisition.acquire_camera().await?;
                let previous = match self
                    .pcm
                    .replace_track(MediaKind::Video, Some(camera.clone()))
                    .await
                {
                    Ok(previous) => previous,
                    Err(e) => {
                        camera.stop();
                        return Err(e.into());
                    }
                };
                if let Some(previous) = previous {
                    previous.stop();
                    self.owned_tracks.retain(|t| !t.same_track(&previous));
                }
                self.owned_tracks.push(camera.clone());
                self.display.local_video_changed(Some(&camera));
                self.toggles.commit(VideoSource::Camera);
                self.announce_status(MediaKind::Video, true).await;
                Ok(true)
            }
        }
    }

    async fn announce_status(&self, kind: MediaKind, enabled: bool) {
        self.send(SignalBody::TrackStatus(TrackStatusPayload {
            track_kind: kind,
            enabled,
        }))
        .await;
        self.emit(CallEvent::Toggled { kind, enabled });
    }

    async fn toggle_screen_share(&mut self) -> Result<bool, ToggleError> {
        match self.toggles.plan(VideoToggle::ScreenShare)? {
            VideoSource::Screen => {
                self.start_screen_share().await?;
                Ok(true)
            }
            _ => {
                self.stop_screen_share().await?;
                Ok(false)
            }
        }
    }

    async fn start_screen_share(&mut self) -> Result<(), ToggleError> {
        let stream = self.acquisition.acquire_screen_share().await?;
        let Some(screen) = stream.video_track().cloned() else {
            stream.stop();
            return Err(AcquisitionError::DeviceUnavailable("no screen track".into()).into());
        };

        let previous = match self
            .pcm
            .replace_track(MediaKind::Video, Some(screen.clone()))
            .await
        {
            Ok(previous) => previous,
            Err(e) => {
                stream.stop();
                return Err(e.into());
            }
        };

        self.owned_tracks.extend(stream.tracks().iter().cloned());
        self.saved_video = previous;
        self.display.local_video_changed(Some(&screen));
        self.screen = Some(stream);
        self.toggles.commit(VideoSource::Screen);
        info!(call_id = %self.session.call_id, "Screen share started");

        self.announce_replaced(true).await;
        self.emit(CallEvent::ScreenShareStarted);
        Ok(())
    }

    async fn stop_screen_share(&mut self) -> Result<(), ToggleError> {
        let restore_to = self.toggles.plan(VideoToggle::ScreenShare)?;
        let restore = self.saved_video.clone();
        self.pcm.replace_track(MediaKind::Video, restore.clone()).await?;

        self.saved_video = None;
        if let Some(stream) = self.screen.take() {
            stream.stop();
            self.owned_tracks
                .retain(|t| !stream.tracks().iter().any(|s| s.same_track(t)));
        }
        self.display.local_video_changed(restore.as_ref());
        self.toggles.commit(restore_to);
        info!(call_id = %self.session.call_id, restored = ?restore_to, "Screen share ended");

        self.announce_replaced(false).await;
        self.emit(CallEvent::ScreenShareEnded);
        Ok(())
    }

    async fn announce_replaced(&self, is_screen_share: bool) {
        self.send(SignalBody::TrackReplaced(TrackReplacedPayload {
            track_kind: MediaKind::Video,
            is_screen_share,
        }))
        .await;
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    async fn fail(&mut self, error: CallError) {
        error!(call_id = %self.session.call_id, error = %error, "Call failed");
        self.emit(CallEvent::Failed(error));
        self.cleanup().await;
    }

    async fn cleanup(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.deadline = None;

        for track in self.pcm.close().await {
            track.stop();
        }
        if let Some(stream) = self.screen.take() {
            stream.stop();
        }
        if let Some(track) = self.saved_video.take() {
            track.stop();
        }
        for track in self.owned_tracks.drain(..) {
            track.stop();
        }
        if let Some(subscription) = self.subscription.take() {
            self.signaling.unsubscribe(&subscription).await;
        }
        self.toggles.reset();
        self.display.detach_all();

        info!(call_id = %self.session.call_id, "Call cleaned up");
        self.emit(CallEvent::Ended);
    }
}

//! Call descriptors, status events, and the display collaborator.

use parley_common::{CallId, ParticipantId};
use serde::{Deserialize, Serialize};

use crate::error::{CallError, ToggleError};
use crate::media::{LocalStream, MediaKind, MediaTrack};
use crate::peer::{ConnectionState, RemoteTrack};

use super::toggle::VideoSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

impl CallKind {
    pub fn has_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// Who is calling whom, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    pub call_id: CallId,
    pub kind: CallKind,
    pub direction: CallDirection,
    pub local: ParticipantId,
    pub remote: ParticipantId,
}

impl CallSession {
    /// A call we place: fresh call id, we send the offer.
    pub fn outgoing(kind: CallKind, local: ParticipantId, remote: ParticipantId) -> Self {
        Self {
            call_id: CallId::new(),
            kind,
            direction: CallDirection::Outgoing,
            local,
            remote,
        }
    }

    /// A call we accept: the caller's id, we wait for the offer.
    pub fn incoming(
        call_id: CallId,
        kind: CallKind,
        local: ParticipantId,
        remote: ParticipantId,
    ) -> Self {
        Self {
            call_id,
            kind,
            direction: CallDirection::Incoming,
            local,
            remote,
        }
    }
}

/// Status updates for the embedding application, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    Connecting,
    Connected,
    /// The call is over because of this error. Followed by `Ended`.
    Failed(CallError),
    Toggled {
        kind: MediaKind,
        enabled: bool,
    },
    ScreenShareStarted,
    ScreenShareEnded,
    /// A toggle did not take effect; the previous state is kept.
    ToggleFailed(ToggleError),
    RemoteTrack(RemoteTrack),
    RemoteTrackStatus {
        kind: MediaKind,
        enabled: bool,
    },
    RemoteScreenShare {
        active: bool,
    },
    /// Resources are released. Always the last event.
    Ended,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub audio_enabled: bool,
    pub video: VideoSource,
    /// Local capture tracks the session still holds, stopped or not.
    pub local_tracks: usize,
}

/// Renders local and remote media. Read-only: it never changes tracks.
pub trait DisplaySink: Send + Sync {
    fn attach_local(&self, stream: &LocalStream);

    /// The outgoing video track changed (camera swap, screen share).
    fn local_video_changed(&self, track: Option<&MediaTrack>);

    fn attach_remote(&self, track: &RemoteTrack);

    fn detach_all(&self);
}

/// Discards everything; for headless sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn attach_local(&self, _stream: &LocalStream) {}

    fn local_video_changed(&self, _track: Option<&MediaTrack>) {}

    fn attach_remote(&self, _track: &RemoteTrack) {}

    fn detach_all(&self) {}
}

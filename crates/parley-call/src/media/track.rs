//! Local media tracks and streams.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// Kinds & sources
// ---------------------------------------------------------------------------

/// Media kind carried by a track or transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Where a track's samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
    SystemAudio,
}

impl TrackSource {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Microphone | Self::SystemAudio => MediaKind::Audio,
            Self::Camera | Self::Screen => MediaKind::Video,
        }
    }
}

/// Why a track stopped producing media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Stopped locally by the call core.
    Stopped,
    /// The capture source went away (device unplugged, user ended sharing).
    SourceEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended(EndReason),
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

struct TrackInner {
    id: String,
    source: TrackSource,
    label: String,
    enabled: AtomicBool,
    state: watch::Sender<TrackState>,
}

/// Shared handle to one captured track.
///
/// Clones refer to the same underlying track. The enabled flag can only be
/// flipped from inside this crate; once a track is attached to a peer
/// connection the manager is its sole writer.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(source: TrackSource, label: impl Into<String>) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        Self {
            inner: Arc::new(TrackInner {
                id: parley_common::new_id(),
                source,
                label: label.into(),
                enabled: AtomicBool::new(true),
                state,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.source.kind()
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Stop the track locally. Idempotent.
    pub fn stop(&self) {
        self.finish(EndReason::Stopped);
    }

    /// Called by a capture backend when the source itself ends.
    pub fn end_from_source(&self) {
        self.finish(EndReason::SourceEnded);
    }

    fn finish(&self, reason: EndReason) {
        self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Ended(reason);
                true
            } else {
                false
            }
        });
    }

    /// Resolve once the track has ended, for whatever reason.
    pub async fn ended(&self) -> EndReason {
        let mut rx = self.inner.state.subscribe();
        loop {
            if let TrackState::Ended(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return EndReason::Stopped;
            }
        }
    }

    /// Whether both handles refer to the same underlying track.
    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("enabled", &self.is_enabled())
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// A set of tracks captured together (mic + camera, or a screen capture).
#[derive(Debug, Clone)]
pub struct LocalStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl LocalStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: parley_common::new_id(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// First track of the given kind.
    pub fn track(&self, kind: MediaKind) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    pub fn audio_track(&self) -> Option<&MediaTrack> {
        self.track(MediaKind::Audio)
    }

    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.track(MediaKind::Video)
    }

    /// Stop every track in the stream.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

//! In-memory capture backend.
//!
//! Produces tracks without touching hardware and records every request,
//! so sessions can be driven end to end in tests and in the loopback demo.
//! Permission denials and picker cancellation can be scripted at any time.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::AcquisitionError;

use super::acquisition::MediaDevices;
use super::constraints::{DisplayConstraints, UserMediaRequest};
use super::track::{LocalStream, MediaTrack, TrackSource};

/// Scripted device behaviour.
#[derive(Debug, Clone, Default)]
pub struct SyntheticDeviceOptions {
    pub deny_microphone: bool,
    pub deny_camera: bool,
    /// Pretend no camera is attached.
    pub no_camera: bool,
    pub cancel_screen_picker: bool,
    /// Whether display capture includes a system audio track.
    pub screen_system_audio: bool,
}

#[derive(Default)]
struct SyntheticState {
    options: SyntheticDeviceOptions,
    issued: Vec<MediaTrack>,
    user_requests: Vec<UserMediaRequest>,
    display_requests: Vec<DisplayConstraints>,
}

#[derive(Default)]
pub struct SyntheticDevices {
    state: Mutex<SyntheticState>,
}

impl SyntheticDevices {
    pub fn new(options: SyntheticDeviceOptions) -> Self {
        Self {
            state: Mutex::new(SyntheticState {
                options,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SyntheticState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the scripted behaviour for subsequent requests.
    pub fn update_options(&self, f: impl FnOnce(&mut SyntheticDeviceOptions)) {
        f(&mut self.state().options);
    }

    /// Every track ever handed out, in issue order.
    pub fn issued_tracks(&self) -> Vec<MediaTrack> {
        self.state().issued.clone()
    }

    /// Handed-out tracks that have not been stopped.
    pub fn live_tracks(&self) -> Vec<MediaTrack> {
        self.state()
            .issued
            .iter()
            .filter(|t| t.is_live())
            .cloned()
            .collect()
    }

    /// Most recently issued track from `source`.
    pub fn last_track(&self, source: TrackSource) -> Option<MediaTrack> {
        self.state()
            .issued
            .iter()
            .rev()
            .find(|t| t.source() == source)
            .cloned()
    }

    pub fn user_requests(&self) -> Vec<UserMediaRequest> {
        self.state().user_requests.clone()
    }

    pub fn display_requests(&self) -> Vec<DisplayConstraints> {
        self.state().display_requests.clone()
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn open_user_media(
        &self,
        request: &UserMediaRequest,
    ) -> Result<LocalStream, AcquisitionError> {
        let mut state = self.state();
        state.user_requests.push(request.clone());

        if request.audio.is_some() && state.options.deny_microphone {
            return Err(AcquisitionError::PermissionDenied("microphone".into()));
        }
        if request.video.is_some() {
            if state.options.no_camera {
                return Err(AcquisitionError::DeviceUnavailable("no camera found".into()));
            }
            if state.options.deny_camera {
                return Err(AcquisitionError::PermissionDenied("camera".into()));
            }
        }

        let mut tracks = Vec::new();
        if request.audio.is_some() {
            tracks.push(MediaTrack::new(TrackSource::Microphone, "Synthetic Microphone"));
        }
        if request.video.is_some() {
            tracks.push(MediaTrack::new(TrackSource::Camera, "Synthetic Camera"));
        }
        state.issued.extend(tracks.iter().cloned());
        debug!(tracks = tracks.len(), "Synthetic user media opened");
        Ok(LocalStream::new(tracks))
    }

    async fn open_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<LocalStream, AcquisitionError> {
        let mut state = self.state();
        state.display_requests.push(constraints.clone());

        if state.options.cancel_screen_picker {
            return Err(AcquisitionError::Cancelled);
        }

        let mut tracks = vec![MediaTrack::new(TrackSource::Screen, "Synthetic Screen")];
        if constraints.system_audio && state.options.screen_system_audio {
            tracks.push(MediaTrack::new(TrackSource::SystemAudio, "Synthetic System Audio"));
        }
        state.issued.extend(tracks.iter().cloned());
        debug!(tracks = tracks.len(), "Synthetic display media opened");
        Ok(LocalStream::new(tracks))
    }
}

//! Requesting local capture from a platform media backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::AcquisitionError;

use super::constraints::{DisplayConstraints, MediaConstraints, UserMediaRequest};
use super::track::{LocalStream, MediaKind, MediaTrack};

/// Platform capture backend (camera, microphone, screen).
///
/// Implementations suspend on permission prompts and device opening, and
/// must not keep references to returned tracks beyond what they need to
/// signal a source-side end.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open_user_media(
        &self,
        request: &UserMediaRequest,
    ) -> Result<LocalStream, AcquisitionError>;

    async fn open_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<LocalStream, AcquisitionError>;
}

/// Opens local streams under the configured quality constraints.
///
/// Returned streams belong to the caller; nothing is retained here.
#[derive(Clone)]
pub struct MediaAcquisition {
    devices: Arc<dyn MediaDevices>,
    constraints: MediaConstraints,
}

impl MediaAcquisition {
    pub fn new(devices: Arc<dyn MediaDevices>, constraints: MediaConstraints) -> Self {
        Self {
            devices,
            constraints,
        }
    }

    pub fn constraints(&self) -> &MediaConstraints {
        &self.constraints
    }

    /// Microphone, plus camera when `want_video`.
    pub async fn acquire_user_media(
        &self,
        want_video: bool,
    ) -> Result<LocalStream, AcquisitionError> {
        let request = UserMediaRequest {
            audio: Some(self.constraints.audio.clone()),
            video: want_video.then(|| self.constraints.video.clone()),
        };
        debug!(want_video, "Requesting user media");

        let stream = self.devices.open_user_media(&request).await?;
        if stream.audio_track().is_none() {
            stream.stop();
            return Err(AcquisitionError::DeviceUnavailable(
                "no microphone track returned".into(),
            ));
        }
        if want_video && stream.video_track().is_none() {
            stream.stop();
            return Err(AcquisitionError::DeviceUnavailable(
                "no camera track returned".into(),
            ));
        }

        info!(
            stream_id = %stream.id(),
            tracks = stream.tracks().len(),
            "User media acquired"
        );
        Ok(stream)
    }

    /// A fresh camera track only, used when re-enabling video mid-call.
    pub async fn acquire_camera(&self) -> Result<MediaTrack, AcquisitionError> {
        let request = UserMediaRequest {
            audio: None,
            video: Some(self.constraints.video.clone()),
        };
        let stream = self.devices.open_user_media(&request).await?;

        let Some(camera) = stream.video_track().cloned() else {
            stream.stop();
            return Err(AcquisitionError::DeviceUnavailable(
                "no camera track returned".into(),
            ));
        };
        for extra in stream.tracks().iter().filter(|t| !t.same_track(&camera)) {
            extra.stop();
        }

        info!(track_id = %camera.id(), "Camera re-acquired");
        Ok(camera)
    }

    /// Screen or window capture, with system audio where available.
    pub async fn acquire_screen_share(&self) -> Result<LocalStream, AcquisitionError> {
        let stream = self
            .devices
            .open_display_media(&self.constraints.display)
            .await?;

        if stream.video_track().is_none() {
            stream.stop();
            return Err(AcquisitionError::DeviceUnavailable(
                "display capture returned no video".into(),
            ));
        }
        if stream.track(MediaKind::Audio).is_none() && self.constraints.display.system_audio {
            warn!("System audio requested but not provided by the platform");
        }

        info!(stream_id = %stream.id(), "Screen capture acquired");
        Ok(stream)
    }
}

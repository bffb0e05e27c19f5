//! Mute/camera/screen-share state.
//!
//! Video transitions:
//!
//! | from     | camera toggle        | screen-share toggle        |
//! |----------|----------------------|----------------------------|
//! | `Off`    | `Camera`             | `Screen` (remembers `Off`) |
//! | `Camera` | `Off`                | `Screen` (remembers `Camera`) |
//! | `Screen` | `ScreenShareActive`  | remembered source          |
//!
//! Calls without a video sender reject every video toggle.

use crate::error::ToggleError;

use super::types::CallKind;

/// What the video sender is transmitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSource {
    /// Camera track disabled, or no video at all.
    Off,
    Camera,
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoToggle {
    Camera,
    ScreenShare,
}

#[derive(Debug, Clone)]
pub struct ToggleState {
    has_video: bool,
    audio_enabled: bool,
    video: VideoSource,
    before_share: Option<VideoSource>,
}

impl ToggleState {
    pub fn new(kind: CallKind) -> Self {
        let mut state = Self {
            has_video: kind.has_video(),
            audio_enabled: true,
            video: VideoSource::Off,
            before_share: None,
        };
        state.reset();
        state
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.audio_enabled = enabled;
    }

    pub fn video(&self) -> VideoSource {
        self.video
    }

    pub fn is_sharing(&self) -> bool {
        self.video == VideoSource::Screen
    }

    /// Where `toggle` would take the video sender. Does not change state.
    pub fn plan(&self, toggle: VideoToggle) -> Result<VideoSource, ToggleError> {
        if !self.has_video {
            return Err(ToggleError::NoVideoSender);
        }
        match (self.video, toggle) {
            (VideoSource::Camera, VideoToggle::Camera) => Ok(VideoSource::Off),
            (VideoSource::Off, VideoToggle::Camera) => Ok(VideoSource::Camera),
            (VideoSource::Screen, VideoToggle::Camera) => Err(ToggleError::ScreenShareActive),
            (VideoSource::Screen, VideoToggle::ScreenShare) => {
                Ok(self.before_share.unwrap_or(VideoSource::Off))
            }
            (_, VideoToggle::ScreenShare) => Ok(VideoSource::Screen),
        }
    }

    /// Record a transition that has taken effect.
    pub fn commit(&mut self, to: VideoSource) {
        match (self.video, to) {
            (from, VideoSource::Screen) if from != VideoSource::Screen => {
                self.before_share = Some(from);
            }
            (VideoSource::Screen, _) => self.before_share = None,
            _ => {}
        }
        self.video = to;
    }

    /// Back to the state a fresh call of the same kind starts in.
    pub fn reset(&mut self) {
        self.audio_enabled = true;
        self.video = if self.has_video {
            VideoSource::Camera
        } else {
            VideoSource::Off
        };
        self.before_share = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_call_starts_on_camera() {
        let state = ToggleState::new(CallKind::Video);
        assert!(state.audio_enabled());
        assert_eq!(state.video(), VideoSource::Camera);
    }

    #[test]
    fn audio_call_rejects_video_toggles() {
        let state = ToggleState::new(CallKind::Audio);
        assert_eq!(state.plan(VideoToggle::Camera), Err(ToggleError::NoVideoSender));
        assert_eq!(
            state.plan(VideoToggle::ScreenShare),
            Err(ToggleError::NoVideoSender)
        );
    }

    #[test]
    fn camera_toggles_between_on_and_off() {
        let mut state = ToggleState::new(CallKind::Video);
        let next = state.plan(VideoToggle::Camera).unwrap();
        assert_eq!(next, VideoSource::Off);
        state.commit(next);
        assert_eq!(state.plan(VideoToggle::Camera), Ok(VideoSource::Camera));
    }

    #[test]
    fn screen_share_restores_prior_source() {
        let mut state = ToggleState::new(CallKind::Video);
        state.commit(VideoSource::Off);
        state.commit(state.plan(VideoToggle::ScreenShare).unwrap());
        assert!(state.is_sharing());
        assert_eq!(state.plan(VideoToggle::Camera), Err(ToggleError::ScreenShareActive));
        assert_eq!(state.plan(VideoToggle::ScreenShare), Ok(VideoSource::Off));

        state.commit(VideoSource::Off);
        state.commit(VideoSource::Camera);
        state.commit(state.plan(VideoToggle::ScreenShare).unwrap());
        assert_eq!(state.plan(VideoToggle::ScreenShare), Ok(VideoSource::Camera));
    }

    #[test]
    fn reset_returns_to_call_defaults() {
        let mut state = ToggleState::new(CallKind::Video);
        state.set_audio_enabled(false);
        state.commit(VideoSource::Off);
        state.commit(VideoSource::Screen);

        state.reset();
        assert!(state.audio_enabled());
        assert_eq!(state.video(), VideoSource::Camera);
        assert_eq!(state.plan(VideoToggle::ScreenShare), Ok(VideoSource::Screen));

        let mut audio_only = ToggleState::new(CallKind::Audio);
        audio_only.set_audio_enabled(false);
        audio_only.reset();
        assert!(audio_only.audio_enabled());
        assert_eq!(audio_only.video(), VideoSource::Off);
    }

    #[test]
    fn plan_does_not_mutate() {
        let state = ToggleState::new(CallKind::Video);
        let _ = state.plan(VideoToggle::ScreenShare);
        assert_eq!(state.video(), VideoSource::Camera);
    }
}

//! Capture constraints handed to a media backend.

use parley_config::schema::{
    AudioCaptureConfig, CameraCaptureConfig, FacingMode, MediaConfig, ScreenCaptureConfig,
};

/// A numeric constraint with a preferred value and an optional hard cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constrain {
    pub ideal: u32,
    pub max: Option<u32>,
}

impl Constrain {
    pub fn ideal(ideal: u32) -> Self {
        Self { ideal, max: None }
    }

    pub fn capped(ideal: u32, max: u32) -> Self {
        Self {
            ideal,
            max: Some(max),
        }
    }

    /// Clamp a value a device offers to the cap.
    pub fn clamp(&self, offered: u32) -> u32 {
        self.max.map_or(offered, |max| offered.min(max))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub channel_count: u16,
    pub sample_rate: u32,
}

impl From<&AudioCaptureConfig> for AudioConstraints {
    fn from(config: &AudioCaptureConfig) -> Self {
        Self {
            echo_cancellation: config.echo_cancellation,
            noise_suppression: config.noise_suppression,
            auto_gain_control: config.auto_gain_control,
            channel_count: config.channel_count,
            sample_rate: config.sample_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConstraints {
    pub width: Constrain,
    pub height: Constrain,
    pub frame_rate: Constrain,
    pub facing_mode: FacingMode,
}

impl From<&CameraCaptureConfig> for VideoConstraints {
    fn from(config: &CameraCaptureConfig) -> Self {
        Self {
            width: Constrain::capped(config.ideal_width, config.max_width),
            height: Constrain::capped(config.ideal_height, config.max_height),
            frame_rate: Constrain::capped(config.ideal_frame_rate, config.max_frame_rate),
            facing_mode: config.facing_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayConstraints {
    pub show_cursor: bool,
    pub width: Constrain,
    pub height: Constrain,
    pub frame_rate: Constrain,
    pub system_audio: bool,
}

impl From<&ScreenCaptureConfig> for DisplayConstraints {
    fn from(config: &ScreenCaptureConfig) -> Self {
        Self {
            show_cursor: config.show_cursor,
            width: Constrain::ideal(config.ideal_width),
            height: Constrain::ideal(config.ideal_height),
            frame_rate: Constrain::capped(config.ideal_frame_rate, config.max_frame_rate),
            system_audio: config.system_audio,
        }
    }
}

/// Microphone/camera request. `None` means the kind is not requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMediaRequest {
    pub audio: Option<AudioConstraints>,
    pub video: Option<VideoConstraints>,
}

/// All constraints derived from the `[media]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: AudioConstraints,
    pub video: VideoConstraints,
    pub display: DisplayConstraints,
}

impl From<&MediaConfig> for MediaConstraints {
    fn from(config: &MediaConfig) -> Self {
        Self {
            audio: (&config.audio).into(),
            video: (&config.camera).into(),
            display: (&config.screen).into(),
        }
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self::from(&MediaConfig::default())
    }
}

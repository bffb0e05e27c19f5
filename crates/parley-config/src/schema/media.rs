//! Capture quality settings for microphone, camera, and screen share.

use serde::{Deserialize, Serialize};

/// Microphone processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioCaptureConfig {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub channel_count: u16,
    pub sample_rate: u32,
}

impl Default for AudioCaptureConfig {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            channel_count: 1,
            sample_rate: 48_000,
        }
    }
}

/// Which camera to open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Camera resolution and frame rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraCaptureConfig {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub ideal_frame_rate: u32,
    pub max_frame_rate: u32,
    pub facing_mode: FacingMode,
}

impl Default for CameraCaptureConfig {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            max_width: 1920,
            max_height: 1080,
            ideal_frame_rate: 30,
            max_frame_rate: 60,
            facing_mode: FacingMode::User,
        }
    }
}

/// Screen / window capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenCaptureConfig {
    pub show_cursor: bool,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_frame_rate: u32,
    pub max_frame_rate: u32,
    /// Ask for system audio; only honored where the platform offers it.
    pub system_audio: bool,
}

impl Default for ScreenCaptureConfig {
    fn default() -> Self {
        Self {
            show_cursor: true,
            ideal_width: 1920,
            ideal_height: 1080,
            ideal_frame_rate: 30,
            max_frame_rate: 60,
            system_audio: true,
        }
    }
}

/// Media capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MediaConfig {
    pub audio: AudioCaptureConfig,
    pub camera: CameraCaptureConfig,
    pub screen: ScreenCaptureConfig,
}

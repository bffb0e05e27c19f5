//! Validation for capture constraints.

use crate::schema::ParleyConfig;

use super::helpers::{validate_ideal_within_max, validate_range};

pub(crate) fn validate_audio(errors: &mut Vec<String>, config: &ParleyConfig) {
    let audio = &config.media.audio;
    validate_range(
        errors,
        "media.audio.channel_count",
        audio.channel_count as u64,
        1,
        2,
    );
    validate_range(
        errors,
        "media.audio.sample_rate",
        audio.sample_rate as u64,
        8_000,
        96_000,
    );
}

pub(crate) fn validate_camera(errors: &mut Vec<String>, config: &ParleyConfig) {
    let camera = &config.media.camera;
    validate_ideal_within_max(errors, "media.camera width", camera.ideal_width, camera.max_width);
    validate_ideal_within_max(
        errors,
        "media.camera height",
        camera.ideal_height,
        camera.max_height,
    );
    validate_ideal_within_max(
        errors,
        "media.camera frame rate",
        camera.ideal_frame_rate,
        camera.max_frame_rate,
    );
    validate_range(
        errors,
        "media.camera.max_frame_rate",
        camera.max_frame_rate as u64,
        1,
        120,
    );
}

pub(crate) fn validate_screen(errors: &mut Vec<String>, config: &ParleyConfig) {
    let screen = &config.media.screen;
    validate_ideal_within_max(
        errors,
        "media.screen frame rate",
        screen.ideal_frame_rate,
        screen.max_frame_rate,
    );
    validate_range(
        errors,
        "media.screen.max_frame_rate",
        screen.max_frame_rate as u64,
        1,
        120,
    );
}

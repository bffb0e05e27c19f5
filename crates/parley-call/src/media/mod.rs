//! Local media acquisition.
//!
//! Opens microphone, camera, and screen capture through a pluggable
//! [`MediaDevices`] backend under explicit quality constraints. Streams are
//! handed to the caller and never retained here.

mod acquisition;
mod constraints;
mod synthetic;
mod track;


pub use acquisition::{MediaAcquisition, MediaDevices};
pub use constraints::{
    AudioConstraints, Constrain, DisplayConstraints, MediaConstraints, UserMediaRequest,
    VideoConstraints,
};
pub use synthetic::{SyntheticDeviceOptions, SyntheticDevices};
pub use track::{EndReason, LocalStream, MediaKind, MediaTrack, TrackSource, TrackState};

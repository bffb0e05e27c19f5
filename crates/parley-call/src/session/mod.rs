//! Call session orchestration.
//!
//! A [`CallSessionController`] drives one call from media acquisition to
//! cleanup and reports progress as [`CallEvent`]s.

mod controller;
mod toggle;
mod types;

pub use controller::{CallDependencies, CallSessionController};
pub use toggle::{ToggleState, VideoSource, VideoToggle};
pub use types::{
    CallDirection, CallEvent, CallKind, CallSession, DisplaySink, NullDisplay, SessionSnapshot,
};

#[cfg(test)]
mod tests;

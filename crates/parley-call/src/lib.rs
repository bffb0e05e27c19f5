//! Peer-to-peer call session core.
//!
//! Negotiates a two-party audio or video call: local capture, offer/answer
//! with trickle ICE over a pluggable signaling relay, mid-call mute, camera
//! and screen-share toggles, and full teardown.
//!
//! The entry point is [`session::CallSessionController`]. Everything it talks
//! to sits behind a trait so sessions run unchanged against real backends or
//! the in-process ones ([`media::SyntheticDevices`], [`peer::LoopbackNetwork`],
//! [`signaling::LocalSignalingBus`]).

pub mod error;
pub mod media;
pub mod peer;
pub mod protocol;
pub mod realtime;
pub mod session;
pub mod signaling;

pub use error::{
    AcquisitionError, CallError, NegotiationError, SignalingError, ToggleError, TransportError,
};
pub use protocol::{SignalBody, SignalingMessage};
pub use session::{
    CallDependencies, CallDirection, CallEvent, CallKind, CallSession, CallSessionController,
    DisplaySink, NullDisplay, SessionSnapshot, VideoSource,
};

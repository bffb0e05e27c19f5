//! Signaling transport for call negotiation.

mod channel;
mod local;
mod realtime;

pub use channel::{SignalingChannel, Subscription};
pub use local::{LocalSignaling, LocalSignalingBus};
pub use realtime::RealtimeSignaling;

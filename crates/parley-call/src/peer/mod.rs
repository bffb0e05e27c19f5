//! Peer connection management: transceivers, offer/answer, trickle ICE.
//!
//! The manager talks to a [`PeerTransport`] backend. Two ship with the
//! crate: the in-process [`LoopbackNetwork`] and, with the `native-rtc`
//! feature, webrtc-rs via [`NativeTransportFactory`].

mod candidates;
mod loopback;
mod manager;
#[cfg(feature = "native-rtc")]
mod native;
mod transport;
mod types;

pub use candidates::IceCandidateQueue;
pub use loopback::{EndpointStats, LoopbackNetwork};
pub use manager::{CandidateOutcome, PeerConnectionManager};
#[cfg(feature = "native-rtc")]
pub use native::NativeTransportFactory;
pub use transport::{
    PeerTransport, TransceiverId, TransportConfig, TransportEvents, TransportFactory,
};
pub use types::{
    ConnectionState, IceCandidate, OfferOptions, RemoteTrack, SdpType, SessionDescription,
    TransceiverDirection, TransportEvent,
};

#[cfg(test)]
mod tests;

//! Error taxonomy for the call core.
//!
//! Components fail their own operation with one of the narrow error types;
//! only the session controller folds them into [`CallError`] and reports
//! them to the status sink.

use crate::media::MediaKind;

/// Local capture could not be opened. Fatal to call start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquisitionError {
    #[error("permission denied for {0}")]
    PermissionDenied(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture request cancelled by user")]
    Cancelled,
}

/// Soft signaling failure; only escalates through the connect timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("malformed signaling message: {0}")]
    Malformed(String),

    #[error("signaling transport closed")]
    TransportClosed,

    #[error("candidate queue full ({0} pending)")]
    CandidateQueueFull(usize),

    #[error("candidate queue already drained")]
    QueueDrained,

    #[error("remote candidate rejected: {0}")]
    CandidateRejected(String),

    #[error("signaling relay is not configured")]
    Unconfigured,
}

/// A session description could not be produced or applied. Fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error("create offer failed: {0}")]
    CreateOffer(String),

    #[error("create answer failed: {0}")]
    CreateAnswer(String),

    #[error("set local description failed: {0}")]
    SetLocal(String),

    #[error("set remote description failed: {0}")]
    SetRemote(String),
}

/// Failure reported by a peer transport backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer connection is closed")]
    Closed,

    #[error("no {0} sender on this connection")]
    NoSender(MediaKind),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Enable/screen-share toggle failed. The toggle is reverted; the call goes on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToggleError {
    #[error("re-acquiring media failed: {0}")]
    Reacquire(#[from] AcquisitionError),

    #[error("call has no video sender (audio-only calls cannot add video)")]
    NoVideoSender,

    #[error("camera toggle unavailable while screen sharing")]
    ScreenShareActive,

    #[error("track replacement failed: {0}")]
    Transport(#[from] TransportError),
}

/// Everything the controller can surface to the embedding application.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error(transparent)]
    Toggle(#[from] ToggleError),

    #[error("call session already ended")]
    SessionClosed,
}

impl CallError {
    /// Whether this error ends the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Signaling(_) | Self::Toggle(_))
    }
}

pub mod errors;
pub mod id;

pub use errors::{ConfigError, ParleyError};
pub use id::{new_correlation_id, new_id, CallId, ParticipantId};

pub type Result<T> = std::result::Result<T, ParleyError>;

//! Configuration schema types for Parley.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults the call core expects.

mod call;
mod logging;
mod media;
mod signaling;

pub use call::*;
pub use logging::*;
pub use media::*;
pub use signaling::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Parley.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ParleyConfig {
    pub call: CallConfig,
    pub media: MediaConfig,
    pub signaling: SignalingConfig,
    pub logging: LoggingConfig,
}

// Kernel Configuration
//
// Explicit settings handed to the snapshot pipeline. Nothing in the
// kernel reads process-wide state; tests build whatever config they need.

use serde::{Deserialize, Serialize};

use crate::protocol::SupportedVersions;
use crate::state::checkpoint::TombstoneRetention;

/// Configuration loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KernelConfig {
    /// Protocol versions this process may read and write.
    pub supported_versions: SupportedVersions,
    /// Window after which tombstones are left out of new checkpoints.
    pub tombstone_retention: TombstoneRetention,
    /// Evaluate the built-in invariants while replaying.
    pub strict_invariants: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl KernelConfig {
    /// Default built-in configuration (used if no config is provided).
    pub fn default_config() -> Self {
        Self {
            supported_versions: SupportedVersions::default(),
            tombstone_retention: TombstoneRetention::default(),
            strict_invariants: false,
        }
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

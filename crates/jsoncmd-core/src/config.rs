//! Dispatch tuning knobs.
//!
//! All fields have defaults, so a YAML file only needs the keys it overrides:
//!
//! ```yaml
//! compression_threshold: 1024
//! slow_call_threshold_ms: 500
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serialized envelopes at or below this size are never compressed.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 512;
pub const DEFAULT_SLOW_CALL_THRESHOLD_MS: u64 = 2_000;
pub const DEFAULT_LOG_PREVIEW_CHARS: usize = 256;
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Envelopes larger than this many bytes are gzip candidates.
    pub compression_threshold: usize,

    /// Calls slower than this are reported (advisory only).
    pub slow_call_threshold_ms: u64,

    /// Upper bound on how much of the inbound JSON a slow-call event prints.
    pub log_preview_chars: usize,

    /// Largest POST body the HTTP adapter will buffer.
    pub max_body_bytes: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            slow_call_threshold_ms: DEFAULT_SLOW_CALL_THRESHOLD_MS,
            log_preview_chars: DEFAULT_LOG_PREVIEW_CHARS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl DispatchConfig {
    /// Parse a dispatch configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse dispatch config: {}", e))
    }

    /// Load a dispatch configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path, e))?;
        Self::from_yaml(&content)
    }

    pub fn slow_call_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_call_threshold_ms)
    }
}

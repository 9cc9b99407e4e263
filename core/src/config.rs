//! Engine configuration.
//!
//! Every threshold and window the stages use lives here as a named,
//! documented value — nothing is hard-coded at the call site. A config
//! file is optional; `Default` is the documented production behavior.

use crate::error::{EngineError, EngineResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Risk score the normalizer assigns when a case has none.
    pub default_risk_score: u8,
    /// Score floor applied to every member of a duplicate-SIM group.
    pub duplicate_risk_floor: u8,
    /// Auto-block fires when `risk_score` exceeds this value.
    /// Strictly greater-than: a score of exactly 50 stays in review.
    pub block_threshold: u8,
    /// Length of the auto-block window, in minutes.
    pub block_window_minutes: i64,
    /// Page size for cursor reads against the store.
    pub page_size: usize,
    /// Attempts per case for transient store errors.
    pub retry_attempts: u32,
    /// Base delay of the exponential backoff, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Run-lease TTL in minutes. A crashed run frees the lease after this.
    pub lease_ttl_minutes: i64,
    /// Compute and log intended changes without writing anything.
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_risk_score: 10,
            duplicate_risk_floor: 50,
            block_threshold: 50,
            block_window_minutes: 120,
            page_size: 200,
            retry_attempts: 3,
            retry_base_delay_ms: 50,
            lease_ttl_minutes: 15,
            dry_run: false,
        }
    }
}

impl EngineConfig {
    /// Load overrides from a JSON file; absent keys keep their defaults.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("read {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn block_window(&self) -> Duration {
        Duration::minutes(self.block_window_minutes)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::minutes(self.lease_ttl_minutes)
    }
}

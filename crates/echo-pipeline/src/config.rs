use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{PipelineError, Result};
use crate::selector::SelectorKind;

/// Upper bound for the polling fallback.
pub const MAX_POLL_INTERVAL_MS: u64 = 100;

pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 1000;

/// Configuration for a [`crate::Pipeline`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Encoding of feed entries.
    pub codec: Codec,
    /// Cross-feed tie-break policy.
    pub selector: SelectorKind,
    /// Capacity of the feed set's event channel.
    pub event_capacity: usize,
    /// Optional re-check interval while suspended, in addition to events.
    pub poll_interval_ms: Option<u64>,
    /// Idle time with undeliverable messages before a stall is reported.
    /// Zero disables stall detection.
    pub stall_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            codec: Codec::Json,
            selector: SelectorKind::Timeframe,
            event_capacity: echo_feed::set::DEFAULT_EVENT_CAPACITY,
            poll_interval_ms: None,
            stall_timeout_ms: DEFAULT_STALL_TIMEOUT_MS,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(PipelineError::Config(
                "event_capacity must be positive".into(),
            ));
        }
        if let Some(ms) = self.poll_interval_ms {
            if ms == 0 || ms > MAX_POLL_INTERVAL_MS {
                return Err(PipelineError::Config(format!(
                    "poll_interval_ms must be within 1..={MAX_POLL_INTERVAL_MS}, got {ms}"
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout_ms > 0).then(|| Duration::from_millis(self.stall_timeout_ms))
    }
}

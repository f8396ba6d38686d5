//! Queue configuration.
//!
//! Byte watermarks plus SWIFT tuning, with serde defaults throughout so a
//! TOML file only needs to name what it overrides:
//!
//! ```toml
//! max_size = 262144
//! hi_watermark = 131072
//! lo_watermark = 65536
//!
//! [swift]
//! burst_margin_divisor = 3
//! flush_decay_divisor = 4
//! max_ttl = 4
//! hard_ttl_limit = 7
//! ```
//!
//! Every loaded or hand-built configuration goes through [`QueueConfig::validate`]
//! before a queue accepts it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Watermark and capacity settings for one queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Hard byte capacity. Enqueues that cannot fit even after eviction are
    /// dropped or escalate to a fatal overflow.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Entering this level engages flow control.
    #[serde(default = "default_hi_watermark")]
    pub hi_watermark: usize,
    /// Draining to this level releases flow control; crossing it upward
    /// raises the warn zone.
    #[serde(default = "default_lo_watermark")]
    pub lo_watermark: usize,
    #[serde(default)]
    pub swift: SwiftConfig,
}

/// SWIFT checkpoint tunables. The divisors are safety margins modeling
/// traffic burstiness and an assumed 75% future flush rate; change them only
/// with measurements in hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwiftConfig {
    #[serde(default = "default_burst_margin_divisor")]
    pub burst_margin_divisor: u32,
    #[serde(default = "default_flush_decay_divisor")]
    pub flush_decay_divisor: u32,
    /// TTL stamped on the forwarded-query purge template.
    #[serde(default = "default_max_ttl")]
    pub max_ttl: u8,
    /// Upper bound of the query-hit purge walk.
    #[serde(default = "default_hard_ttl_limit")]
    pub hard_ttl_limit: u8,
}

fn default_max_size() -> usize {
    262144
}
fn default_hi_watermark() -> usize {
    131072
}
fn default_lo_watermark() -> usize {
    65536
}
fn default_burst_margin_divisor() -> u32 {
    3
}
fn default_flush_decay_divisor() -> u32 {
    4
}
fn default_max_ttl() -> u8 {
    4
}
fn default_hard_ttl_limit() -> u8 {
    7
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            hi_watermark: default_hi_watermark(),
            lo_watermark: default_lo_watermark(),
            swift: SwiftConfig::default(),
        }
    }
}

impl Default for SwiftConfig {
    fn default() -> Self {
        Self {
            burst_margin_divisor: default_burst_margin_divisor(),
            flush_decay_divisor: default_flush_decay_divisor(),
            max_ttl: default_max_ttl(),
            hard_ttl_limit: default_hard_ttl_limit(),
        }
    }
}

/// Configuration rejections.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("watermarks must satisfy 0 < lo < hi <= max_size (lo={lo}, hi={hi}, max={max})")]
    BadWatermarks { lo: usize, hi: usize, max: usize },

    #[error("swift divisors must be non-zero")]
    ZeroDivisor,

    #[error("ttl bounds must satisfy 0 < max_ttl <= hard_ttl_limit (max_ttl={max_ttl}, hard={hard})")]
    BadTtlBounds { max_ttl: u8, hard: u8 },
}

impl QueueConfig {
    /// Derive watermarks from a capacity the way servents usually size their
    /// send queues: flow control at half, release at a quarter.
    pub fn for_capacity(max_size: usize) -> Self {
        Self {
            max_size,
            hi_watermark: max_size / 2,
            lo_watermark: max_size / 4,
            swift: SwiftConfig::default(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.lo_watermark == 0
            || self.lo_watermark >= self.hi_watermark
            || self.hi_watermark > self.max_size
        {
            return Err(ConfigError::BadWatermarks {
                lo: self.lo_watermark,
                hi: self.hi_watermark,
                max: self.max_size,
            });
        }
        if self.swift.burst_margin_divisor == 0 || self.swift.flush_decay_divisor == 0 {
            return Err(ConfigError::ZeroDivisor);
        }
        if self.swift.max_ttl == 0 || self.swift.max_ttl > self.swift.hard_ttl_limit {
            return Err(ConfigError::BadTtlBounds {
                max_ttl: self.swift.max_ttl,
                hard: self.swift.hard_ttl_limit,
            });
        }
        Ok(())
    }

    /// Load and validate a TOML configuration file.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading queue config {}", path.display()))?;
        let config: QueueConfig =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(config)
    }
}

//! Call-core configuration
//!
//! Loaded from TOML (and `VRS_*` environment variables) through
//! `vrs_infra_common::config`. Every field defaults to the value the
//! endpoint uses in production.

use crate::errors::CallResult;
use crate::types::{AutoSpeedMode, VideoCodecMask};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vrs_infra_common::ErrorExt;
use vrs_infra_common::logging::setup::LoggingSettings;

/// Default cap on receive and send speed, in bits per second
pub const DEFAULT_MAX_SPEED: i32 = 2_048_000;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallCoreConfig {
    pub logging: LoggingSettings,
    pub conference: ConferenceParams,
    pub timers: TimerSettings,
    pub stats: StatsSettings,
    pub trace: TraceSettings,
}

impl CallCoreConfig {
    /// Load from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> CallResult<Self> {
        let config = vrs_infra_common::config::load_config::<Self>(
            path,
            vrs_infra_common::config::DEFAULT_ENV_PREFIX,
        )
        .with_context("call-core", "load configuration")?;
        Ok(config)
    }

    pub fn from_toml_str(document: &str) -> CallResult<Self> {
        Ok(vrs_infra_common::config::from_toml_str(document)?)
    }
}

/// Negotiation limits applied to every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConferenceParams {
    /// Highest rate we accept from the remote side, bits per second
    pub max_recv_speed: i32,
    /// Highest rate we send, bits per second
    pub max_send_speed: i32,
    /// Base delay before probing a silent connection
    pub lost_connection_delay_secs: u64,
    pub allowed_video_codecs: VideoCodecMask,
    pub auto_speed_mode: AutoSpeedMode,
    /// Withhold the return dial string from outgoing metadata
    pub block_caller_id: bool,
}

impl Default for ConferenceParams {
    fn default() -> Self {
        Self {
            max_recv_speed: DEFAULT_MAX_SPEED,
            max_send_speed: DEFAULT_MAX_SPEED,
            lost_connection_delay_secs: 10,
            allowed_video_codecs: VideoCodecMask::ALL,
            auto_speed_mode: AutoSpeedMode::Auto,
            block_caller_id: false,
        }
    }
}

impl ConferenceParams {
    pub fn lost_connection_delay(&self) -> Duration {
        Duration::from_secs(self.lost_connection_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    pub please_wait_secs: u64,
    pub vrs_failover_secs: u64,
    pub dhv_connecting_secs: u64,
    /// How long a finished call lingers before the reaper evicts it
    pub stale_grace_secs: u64,
    /// Period of the stale-object reaper
    pub stale_check_secs: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            please_wait_secs: 5,
            vrs_failover_secs: 10,
            dhv_connecting_secs: 40,
            stale_grace_secs: 5,
            stale_check_secs: 6,
        }
    }
}

impl TimerSettings {
    pub fn please_wait(&self) -> Duration {
        Duration::from_secs(self.please_wait_secs)
    }

    pub fn vrs_failover(&self) -> Duration {
        Duration::from_secs(self.vrs_failover_secs)
    }

    pub fn dhv_connecting(&self) -> Duration {
        Duration::from_secs(self.dhv_connecting_secs)
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_secs(self.stale_grace_secs)
    }

    pub fn stale_check(&self) -> Duration {
        Duration::from_secs(self.stale_check_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    /// Number of interval samples kept in the ring
    pub ring_size: usize,
    /// Length of the automatic bandwidth detection window
    pub bandwidth_test_secs: u64,
    /// Minimum gap between two flow-control directives
    pub min_wait_between_messages_secs: u64,
    /// Period of statistics collection
    pub collect_interval_ms: u64,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            ring_size: 10,
            bandwidth_test_secs: 30,
            min_wait_between_messages_secs: 8,
            collect_interval_ms: 1000,
        }
    }
}

impl StatsSettings {
    pub fn collect_interval(&self) -> Duration {
        Duration::from_millis(self.collect_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Entries buffered before the trace is flushed
    pub capacity: usize,
    /// Record only the name of each mutation
    pub redact_personal_data: bool,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            capacity: 1000,
            redact_personal_data: cfg!(feature = "redact-call-trace"),
        }
    }
}

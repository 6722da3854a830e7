//! Configuration model for baton.
//!
//! This module defines the Config struct that represents `.baton/baton.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.
//!
//! The timing defaults (heartbeat interval, stale threshold, force-break
//! grace) are starting points, not normative values; deployments tune them
//! here.

use crate::error::{BatonError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the baton coordination protocol.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Heartbeat / staleness settings
    // =========================================================================
    /// Seconds between heartbeat writes by the holder's monitor.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Seconds of heartbeat age after which a lock is considered stale.
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,

    /// Seconds to wait for a holder to exit after SIGTERM before escalating
    /// to SIGKILL during a force-break.
    #[serde(default = "default_force_break_grace_secs")]
    pub force_break_grace_secs: u64,

    // =========================================================================
    // Termination settings
    // =========================================================================
    /// Whether the release sequence commits residual workspace changes
    /// as its first commit step.
    #[serde(default = "default_true")]
    pub persist_workspace: bool,

    /// External task-tracker command run as a commit step during release
    /// (empty disables the step's action; the step still runs and succeeds).
    #[serde(default)]
    pub tracker_command: String,
}

// Default value functions for serde
fn default_heartbeat_interval_secs() -> u64 {
    60
}
fn default_stale_threshold_secs() -> u64 {
    1800
}
fn default_force_break_grace_secs() -> u64 {
    2
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            stale_threshold_secs: default_stale_threshold_secs(),
            force_break_grace_secs: default_force_break_grace_secs(),
            persist_workspace: default_true(),
            tracker_command: String::new(),
        }
    }
}

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BatonError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            BatonError::UserError(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize the config to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| BatonError::UserError(format!("failed to serialize config: {}", e)))
    }

    /// Validate config values.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(BatonError::UserError(
                "heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.stale_threshold_secs <= self.heartbeat_interval_secs {
            return Err(BatonError::UserError(format!(
                "stale_threshold_secs ({}) must exceed heartbeat_interval_secs ({}); \
                 otherwise a healthy holder is reported stale between heartbeats",
                self.stale_threshold_secs, self.heartbeat_interval_secs
            )));
        }
        Ok(())
    }
}

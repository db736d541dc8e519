//! Node configuration management.
//!
//! Handles loading, saving, and validating the seamark node configuration
//! including:
//! - Network credentials for the uplink
//! - Broker host and port
//! - Device label and tracked beacon list
//! - Publish interval, smoothing factor, and reconnect backoff tuning
//!
//! The configuration is one versionless TOML blob at a fixed path. A
//! missing or unparseable blob silently becomes the built-in defaults:
//! defaults mean "unconfigured", which routes the node into provisioning
//! instead of halting it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::beacon::BeaconId;
use crate::error::{Error, Result};

/// Placeholder SSID shipped in the factory record.
const DEFAULT_SSID: &str = "ssid";

/// Default EMA smoothing factor.
const DEFAULT_ALPHA: f32 = 0.3;

/// Main node configuration.
///
/// Exclusively owned by the mode supervisor at startup and snapshotted
/// into dependent components; never hot-reloaded. A configuration change
/// always goes through persistence plus a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Uplink network SSID.
    pub wifi_ssid: String,

    /// Uplink network password.
    pub wifi_password: String,

    /// Broker hostname or address.
    pub broker_host: String,

    /// Broker port.
    pub broker_port: u16,

    /// Human-chosen label for this node, used in topics and payloads.
    pub device_label: String,

    /// Comma-separated canonical beacon addresses to track.
    pub tracked_beacons: String,

    /// Minimum interval between surfaced events per beacon, milliseconds.
    pub publish_interval_ms: u64,

    /// EMA smoothing factor in `(0, 1]`.
    pub ema_alpha: f32,

    /// Base reconnect backoff delay, milliseconds.
    pub backoff_base_ms: u64,

    /// Reconnect backoff ceiling, milliseconds.
    pub backoff_max_ms: u64,

    /// Ceiling for link and broker connect attempts, milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: DEFAULT_SSID.to_string(),
            wifi_password: "pass".to_string(),
            broker_host: "192.168.50.237".to_string(),
            broker_port: 1883,
            device_label: "SM1".to_string(),
            tracked_beacons: "dd:88:00:00:13:07".to_string(),
            publish_interval_ms: 100,
            ema_alpha: DEFAULT_ALPHA,
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
            connect_timeout_ms: 15_000,
        }
    }
}

impl NodeConfig {
    /// Load configuration from disk, degrading to defaults.
    ///
    /// Absence and parse failure are both non-fatal: the node must stay
    /// reachable via provisioning even with a corrupt store.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Config at {} rejected ({e}), using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        config.sanitize();
        config
    }

    /// Parse a configuration blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] if the blob is not valid TOML for
    /// this record.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Save configuration to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be
    /// written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Persistence {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The default configuration file path.
    ///
    /// On the node: `/etc/seamark/config.toml`. For development: the
    /// platform config directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/seamark/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "seamark")
                .map(|dirs| dirs.config_dir().join("config.toml"))
                .unwrap_or_else(|| PathBuf::from("./seamark-config.toml"))
        }
    }

    /// Whether usable network credentials are present.
    ///
    /// The factory placeholder and an empty SSID both mean "unconfigured"
    /// and route the node into provisioning at boot.
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        !self.wifi_ssid.is_empty() && self.wifi_ssid != DEFAULT_SSID
    }

    /// Parse the tracked beacon list.
    ///
    /// Malformed entries are dropped individually with a warning; a bad
    /// entry never takes the node down.
    #[must_use]
    pub fn tracked(&self) -> Vec<BeaconId> {
        self.tracked_beacons
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match BeaconId::parse(entry) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Dropping malformed tracked beacon entry '{entry}'");
                    None
                }
            })
            .collect()
    }

    /// Minimum spacing between surfaced events per beacon.
    #[must_use]
    pub const fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    /// Ceiling for link and broker connect attempts.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Clamp out-of-range tuning values back to defaults.
    fn sanitize(&mut self) {
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            warn!(
                "ema_alpha {} out of range, using default {DEFAULT_ALPHA}",
                self.ema_alpha
            );
            self.ema_alpha = DEFAULT_ALPHA;
        }
        if self.backoff_base_ms == 0 {
            self.backoff_base_ms = NodeConfig::default().backoff_base_ms;
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            self.backoff_max_ms = NodeConfig::default().backoff_max_ms;
        }
    }
}

/// Whether a string is a well-formed canonical beacon address.
#[must_use]
pub fn is_valid_beacon_address(raw: &str) -> bool {
    BeaconId::parse(raw).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_unprovisioned() {
        assert!(!NodeConfig::default().is_provisioned());
    }

    #[test]
    fn test_empty_ssid_is_unprovisioned() {
        let config = NodeConfig {
            wifi_ssid: String::new(),
            ..NodeConfig::default()
        };
        assert!(!config.is_provisioned());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig::load_or_default(&dir.path().join("nope.toml"));
        assert_eq!(config.device_label, "SM1");
        assert!(!config.is_provisioned());
    }

    #[test]
    fn test_parse_failure_is_a_config_error() {
        let err = NodeConfig::parse("not = [valid").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
        assert!(err.is_config_error());
        assert_eq!(err.error_code(), "config_parse_failed");
    }

    #[test]
    fn test_unparseable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        let config = NodeConfig::load_or_default(&path);
        assert_eq!(config.broker_port, 1883);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = NodeConfig {
            wifi_ssid: "warehouse".to_string(),
            wifi_password: "hunter2".to_string(),
            broker_host: "broker.local".to_string(),
            device_label: "dock-3".to_string(),
            ..NodeConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = NodeConfig::load_or_default(&path);
        assert!(loaded.is_provisioned());
        assert_eq!(loaded.wifi_ssid, "warehouse");
        assert_eq!(loaded.device_label, "dock-3");
    }

    #[test]
    fn test_partial_blob_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "wifi_ssid = \"pier\"\n").unwrap();
        let config = NodeConfig::load_or_default(&path);
        assert_eq!(config.wifi_ssid, "pier");
        assert_eq!(config.broker_port, 1883);
        assert!((config.ema_alpha - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_tracked_drops_malformed_entries_individually() {
        let config = NodeConfig {
            tracked_beacons: "AA:BB:CC:DD:EE:FF, bogus, dd:88:00:00:13:07,".to_string(),
            ..NodeConfig::default()
        };
        let tracked = config.tracked();
        assert_eq!(tracked.len(), 2);
        assert_eq!(tracked[0].as_str(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(tracked[1].as_str(), "dd:88:00:00:13:07");
    }

    #[test]
    fn test_out_of_range_alpha_resets_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ema_alpha = 7.5\n").unwrap();
        let config = NodeConfig::load_or_default(&path);
        assert!((config.ema_alpha - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_is_valid_beacon_address() {
        assert!(is_valid_beacon_address("dd:88:00:00:13:07"));
        assert!(is_valid_beacon_address("DD:88:00:00:13:07"));
        assert!(!is_valid_beacon_address("dd:88:00:00:13"));
        assert!(!is_valid_beacon_address("dd-88-00-00-13-07"));
    }
}

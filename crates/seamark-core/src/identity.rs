//! Immutable device identity.
//!
//! The identity is derived once from hardware-unique bytes at boot and is
//! read-only for the rest of the process lifetime. It tags every telemetry
//! payload so a fleet of nodes can share one broker topic.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Unique, immutable identity of this sensor node.
///
/// Twelve uppercase hex digits, derived from the primary network
/// interface's MAC address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Derive an identity from six hardware-unique bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
        Self(hex)
    }

    /// Derive an identity from the host hardware.
    ///
    /// Reads the MAC address of the first non-loopback interface under
    /// `/sys/class/net`, falling back to `/etc/machine-id` and finally to
    /// an all-zero identity. This never fails: a node must boot into
    /// provisioning even on a badly broken host.
    #[must_use]
    pub fn from_host() -> Self {
        Self::from_sysfs(Path::new("/sys/class/net"))
            .or_else(|| Self::from_machine_id(Path::new("/etc/machine-id")))
            .unwrap_or_else(|| Self::from_bytes([0; 6]))
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_sysfs(net_dir: &Path) -> Option<Self> {
        let entries = std::fs::read_dir(net_dir).ok()?;
        let mut names: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "lo")
            .collect();
        // Deterministic pick across reboots
        names.sort();

        for name in names {
            if let Ok(raw) = std::fs::read_to_string(net_dir.join(&name).join("address")) {
                if let Some(id) = Self::from_mac_string(raw.trim()) {
                    return Some(id);
                }
            }
        }
        None
    }

    fn from_machine_id(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        let hex: String = raw
            .trim()
            .chars()
            .filter(char::is_ascii_hexdigit)
            .take(12)
            .collect();
        (hex.len() == 12).then(|| Self(hex.to_uppercase()))
    }

    fn from_mac_string(mac: &str) -> Option<Self> {
        let hex: String = mac
            .chars()
            .filter(char::is_ascii_hexdigit)
            .collect::<String>()
            .to_uppercase();
        (hex.len() == 12 && hex != "000000000000").then_some(Self(hex))
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Uplink readiness.
//!
//! The OS owns the physical link (wpa_supplicant, NetworkManager, or plain
//! ethernet); this module only answers "is it up" and "what is our
//! address" so the connectivity supervisor can gate connect attempts and
//! the telemetry payload can carry the host address.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// The uplink as the supervisors see it.
#[allow(async_fn_in_trait)]
pub trait NetworkLink {
    /// Cheap readiness poll, called every control-loop iteration.
    fn is_ready(&self) -> bool;

    /// Block (cooperatively) until the link is ready, bounded.
    async fn wait_ready(&self, timeout: Duration) -> bool;

    /// Host address on the link, if any.
    fn address(&self) -> Option<IpAddr>;

    /// Release the link when entering provisioning. The process restarts
    /// before it is needed again.
    async fn tear_down(&mut self);
}

/// Link backed by the host network stack.
///
/// Readiness comes from the interface's sysfs `operstate`; the address
/// from a connected-UDP-socket probe (no packets are sent).
#[derive(Debug)]
pub struct HostLink {
    net_dir: PathBuf,
    interface: Option<String>,
}

impl HostLink {
    /// Create a link bound to a specific interface, or to whichever
    /// non-loopback interface is up when `interface` is `None`.
    #[must_use]
    pub fn new(interface: Option<String>) -> Self {
        Self {
            net_dir: PathBuf::from("/sys/class/net"),
            interface,
        }
    }

    /// Create a link from the `SEAMARK_INTERFACE` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(std::env::var("SEAMARK_INTERFACE").ok())
    }

    #[cfg(test)]
    fn with_net_dir(net_dir: PathBuf, interface: Option<String>) -> Self {
        Self { net_dir, interface }
    }

    fn operstate_up(&self, name: &str) -> bool {
        std::fs::read_to_string(self.net_dir.join(name).join("operstate"))
            .is_ok_and(|s| s.trim() == "up")
    }

    fn any_interface_up(&self) -> bool {
        std::fs::read_dir(&self.net_dir).is_ok_and(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name != "lo")
                .any(|name| self.operstate_up(&name))
        })
    }
}

impl NetworkLink for HostLink {
    fn is_ready(&self) -> bool {
        match &self.interface {
            Some(name) => self.operstate_up(name),
            None => self.any_interface_up(),
        }
    }

    async fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_ready() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    fn address(&self) -> Option<IpAddr> {
        // Routing probe: connect() picks the source address without
        // sending anything.
        let socket = std::net::UdpSocket::bind(("0.0.0.0", 0)).ok()?;
        socket.connect(("192.0.2.1", 9)).ok()?;
        let addr = socket.local_addr().ok()?.ip();
        debug!("Host address on uplink: {addr}");
        Some(addr)
    }

    async fn tear_down(&mut self) {
        // The OS keeps ownership of the interface; provisioning brings up
        // its own isolated network out-of-band.
        info!("Releasing uplink for provisioning");
    }
}

//! Application state shared between the control loop and the HTTP
//! handlers.
//!
//! Everything mutable in here is either a watch channel fed by the
//! control loop or a small lock around display-only data. Supervisor
//! internals are never shared; handlers read snapshots.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use seamark_core::{DeviceIdentity, NodeConfig, TelemetryPayload};
use tokio::sync::{watch, RwLock};

use crate::connectivity::ConnectivityStatus;
use crate::indicator::IndicatorPattern;
use crate::mode::Mode;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    identity: DeviceIdentity,
    config: NodeConfig,
    config_path: PathBuf,
    admin_token: String,
    started: Instant,
    mode: RwLock<Mode>,
    link_address: RwLock<Option<IpAddr>>,
    connectivity: Option<watch::Receiver<ConnectivityStatus>>,
    last_event: RwLock<Option<TelemetryPayload>>,
    indicator: watch::Sender<IndicatorPattern>,
}

impl AppState {
    /// Create the application state for this process lifetime.
    ///
    /// `connectivity` is `None` when booting straight into provisioning:
    /// there is no supervisor to observe.
    #[must_use]
    pub fn new(
        identity: DeviceIdentity,
        config: NodeConfig,
        config_path: PathBuf,
        mode: Mode,
        connectivity: Option<watch::Receiver<ConnectivityStatus>>,
        admin_token: String,
    ) -> Self {
        let (indicator, _) = watch::channel(IndicatorPattern::Off);
        Self {
            inner: Arc::new(Inner {
                identity,
                config,
                config_path,
                admin_token,
                started: Instant::now(),
                mode: RwLock::new(mode),
                link_address: RwLock::new(None),
                connectivity,
                last_event: RwLock::new(None),
                indicator,
            }),
        }
    }

    /// Device identity.
    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.inner.identity
    }

    /// Configuration snapshot taken at boot.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Where configuration writes persist.
    #[must_use]
    pub fn config_path(&self) -> &PathBuf {
        &self.inner.config_path
    }

    /// The shared secret gating configuration writes.
    #[must_use]
    pub fn admin_token(&self) -> &str {
        &self.inner.admin_token
    }

    /// Seconds since the process started.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started.elapsed().as_secs()
    }

    /// Current mode.
    pub async fn mode(&self) -> Mode {
        *self.inner.mode.read().await
    }

    /// Record a mode transition (operational → provisioning only).
    pub async fn set_mode(&self, mode: Mode) {
        *self.inner.mode.write().await = mode;
    }

    /// Host address on the uplink, if known.
    pub async fn link_address(&self) -> Option<IpAddr> {
        *self.inner.link_address.read().await
    }

    /// Record the uplink address.
    pub async fn set_link_address(&self, address: Option<IpAddr>) {
        *self.inner.link_address.write().await = address;
    }

    /// Latest connectivity snapshot, if a supervisor is running.
    #[must_use]
    pub fn connectivity_status(&self) -> Option<ConnectivityStatus> {
        self.inner
            .connectivity
            .as_ref()
            .map(|rx| rx.borrow().clone())
    }

    /// Most recently surfaced and published event.
    pub async fn last_event(&self) -> Option<TelemetryPayload> {
        self.inner.last_event.read().await.clone()
    }

    /// Record a successfully published event.
    pub async fn set_last_event(&self, payload: TelemetryPayload) {
        *self.inner.last_event.write().await = Some(payload);
    }

    /// Update the indicator pattern. The physical indicator consumes this
    /// through [`AppState::subscribe_indicator`].
    pub fn set_indicator(&self, pattern: IndicatorPattern) {
        self.inner.indicator.send_if_modified(|current| {
            if *current == pattern {
                false
            } else {
                *current = pattern;
                true
            }
        });
    }

    /// Subscribe to indicator pattern changes.
    #[must_use]
    pub fn subscribe_indicator(&self) -> watch::Receiver<IndicatorPattern> {
        self.inner.indicator.subscribe()
    }
}

//! Mode lifecycle: provisioning vs. operational.
//!
//! One mode is selected per process lifetime at boot. Switching out of a
//! mode always goes through a full process restart, which keeps resource
//! lifecycles simple and rules out partially-applied configuration. The
//! only in-process transition is operational → provisioning on a runtime
//! hold, and the only exit from provisioning is the restart scheduled by
//! a successful configuration write.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::info;

use seamark_core::NodeConfig;

use crate::connectivity::ConnectivitySupervisor;
use crate::indicator;
use crate::link::NetworkLink;
use crate::queue::EventQueue;
use crate::state::AppState;
use crate::transport::Transport;

/// How long the hold input must stay active to trigger provisioning.
pub const HOLD_DURATION: Duration = Duration::from_secs(1);

/// Sampling period for the boot-window hold check.
const HOLD_SAMPLE_PERIOD: Duration = Duration::from_millis(10);

/// Control loop period.
const TICK_PERIOD: Duration = Duration::from_millis(50);

/// Why the node entered provisioning. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningTrigger {
    /// Hold input active through the boot window.
    BootHold,
    /// Hold input active during operational runtime.
    RuntimeHold,
    /// No usable network credentials in the stored record.
    Unconfigured,
}

impl ProvisioningTrigger {
    /// Stable name for status output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BootHold => "boot_hold",
            Self::RuntimeHold => "runtime_hold",
            Self::Unconfigured => "unconfigured",
        }
    }
}

/// The node's lifecycle mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Serving the configuration endpoint on an isolated network.
    Provisioning(ProvisioningTrigger),
    /// Scanning, filtering, and publishing.
    Operational,
}

impl Mode {
    /// Stable name for status output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning(_) => "provisioning",
            Self::Operational => "operational",
        }
    }

    /// The provisioning trigger, if in provisioning.
    #[must_use]
    pub const fn trigger(&self) -> Option<ProvisioningTrigger> {
        match self {
            Self::Provisioning(trigger) => Some(*trigger),
            Self::Operational => None,
        }
    }
}

/// Select the boot mode from the stored record and the boot-window hold.
///
/// Default or empty credentials always win: a node that cannot join any
/// network must come up reachable for provisioning.
#[must_use]
pub fn decide_boot_mode(config: &NodeConfig, boot_hold: bool) -> Mode {
    if !config.is_provisioned() {
        Mode::Provisioning(ProvisioningTrigger::Unconfigured)
    } else if boot_hold {
        Mode::Provisioning(ProvisioningTrigger::BootHold)
    } else {
        Mode::Operational
    }
}

/// The physical hold input (a pulled-up pin on the reference hardware).
pub trait HoldInput {
    /// Sample the input once. `true` means actively held.
    fn is_held(&mut self) -> bool;
}

/// Hold input backed by a sysfs GPIO value file. Active low.
#[derive(Debug)]
pub struct GpioHoldInput {
    value_path: PathBuf,
}

impl GpioHoldInput {
    /// Create an input reading the given GPIO value file.
    #[must_use]
    pub const fn new(value_path: PathBuf) -> Self {
        Self { value_path }
    }
}

impl HoldInput for GpioHoldInput {
    fn is_held(&mut self) -> bool {
        std::fs::read_to_string(&self.value_path).is_ok_and(|v| v.trim() == "0")
    }
}

/// Input for nodes without a hold pin: never held.
#[derive(Debug)]
pub struct NoHoldInput;

impl HoldInput for NoHoldInput {
    fn is_held(&mut self) -> bool {
        false
    }
}

/// Build the hold input from `SEAMARK_HOLD_GPIO_VALUE`, if set.
#[must_use]
pub fn hold_input_from_env() -> Box<dyn HoldInput + Send> {
    match std::env::var("SEAMARK_HOLD_GPIO_VALUE") {
        Ok(path) => Box::new(GpioHoldInput::new(PathBuf::from(path))),
        Err(_) => Box::new(NoHoldInput),
    }
}

/// Whether the hold input stayed active through the whole boot window.
pub async fn held_through_boot_window(input: &mut dyn HoldInput) -> bool {
    let deadline = Instant::now() + HOLD_DURATION;
    while Instant::now() < deadline {
        if !input.is_held() {
            return false;
        }
        tokio::time::sleep(HOLD_SAMPLE_PERIOD).await;
    }
    true
}

/// Tracks a continuous hold across control-loop iterations.
#[derive(Debug, Default)]
pub struct RuntimeHoldTracker {
    held_since: Option<Instant>,
}

impl RuntimeHoldTracker {
    /// Feed one sample. Returns `true` once the hold has been continuous
    /// for [`HOLD_DURATION`].
    pub fn update(&mut self, held: bool, now: Instant) -> bool {
        if held {
            let since = *self.held_since.get_or_insert(now);
            now.duration_since(since) >= HOLD_DURATION
        } else {
            self.held_since = None;
            false
        }
    }
}

/// Run the operational control loop until a runtime hold fires.
///
/// One cooperative loop drives everything: drain the event queue, tick
/// the connectivity supervisor, refresh the indicator, sample the hold
/// input. No step blocks beyond the supervisor's bounded connect attempt.
pub async fn run_operational<T: Transport, L: NetworkLink>(
    mut supervisor: ConnectivitySupervisor<T>,
    link: &L,
    queue: Arc<EventQueue>,
    state: AppState,
    hold: &mut (dyn HoldInput + Send),
) -> ProvisioningTrigger {
    let mut ticker = tokio::time::interval(TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut hold_tracker = RuntimeHoldTracker::default();

    loop {
        ticker.tick().await;
        // Via the tokio clock so the loop follows virtual time in tests.
        let now = tokio::time::Instant::now().into_std();

        if hold_tracker.update(hold.is_held(), now) {
            info!("Hold input active for {HOLD_DURATION:?}, entering provisioning");
            supervisor.shutdown().await;
            return ProvisioningTrigger::RuntimeHold;
        }

        let was_connected = supervisor.is_connected();
        supervisor.tick(now, link.is_ready()).await;

        // A fresh session means the link may have a fresh address too.
        if supervisor.is_connected() && !was_connected {
            if let Some(address) = link.address() {
                supervisor.set_host_address(address.to_string());
                state.set_link_address(Some(address)).await;
            }
        }

        if supervisor.is_connected() {
            for event in queue.drain() {
                match supervisor.publish(&event, now).await {
                    Ok(payload) => state.set_last_event(payload).await,
                    // The supervisor already went into fast-retry; pending
                    // events are stale by the time it reconnects.
                    Err(_) => break,
                }
            }
        }

        state.set_indicator(indicator::pattern_for(&Mode::Operational, supervisor.state()));
    }
}

/// Exit the process after `delay` so the service supervisor restarts it
/// with the new configuration.
pub fn schedule_restart(delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        info!("Restarting to apply configuration");
        std::process::exit(0);
    });
}

//! Status indicator pattern selection.
//!
//! The physical indicator (an LED on the reference hardware) is an
//! external collaborator; it consumes [`IndicatorPattern`] values from a
//! watch channel and owns all timing side effects. What to display is a
//! pure function of the mode and connection state, so it lives here where
//! it can be tested without hardware.

use serde::Serialize;

use crate::connectivity::ConnectionState;
use crate::mode::Mode;

/// What the physical indicator should display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorPattern {
    /// Solid on: provisioning network active.
    Solid,
    /// Fast blink: trying to reach the broker.
    FastBlink,
    /// Periodic heartbeat: online and publishing.
    Heartbeat,
    /// Dark: no session, not currently trying.
    Off,
}

/// Select the indicator pattern for the current mode and connection state.
#[must_use]
pub const fn pattern_for(mode: &Mode, connection: ConnectionState) -> IndicatorPattern {
    match mode {
        Mode::Provisioning(_) => IndicatorPattern::Solid,
        Mode::Operational => match connection {
            ConnectionState::Connected => IndicatorPattern::Heartbeat,
            ConnectionState::Connecting => IndicatorPattern::FastBlink,
            ConnectionState::Disconnected => IndicatorPattern::Off,
        },
    }
}

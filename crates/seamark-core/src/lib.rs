//! # seamark-core
//!
//! Core telemetry-processing logic for the seamark fixed-location beacon
//! sensor node.
//!
//! This crate provides:
//! - Beacon observation filtering, smoothing, and publish-rate gating
//! - Node configuration loading, saving, and validation
//! - Hardware-derived device identity
//! - Unified error types for the crate
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`beacon`] - Observation processing: EMA smoothing and interval gating
//! - [`config`] - Node configuration persistence and tracked-beacon parsing
//! - [`identity`] - Immutable device identity derived once at boot
//! - [`error`] - Unified error types for the crate
//!
//! Everything in this crate is pure logic: no sockets, no radios, no
//! clocks of its own. Callers supply timestamps and perform I/O, which
//! keeps the filtering and gating independently testable.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod beacon;
pub mod config;
pub mod error;
pub mod identity;

// Re-export primary types for convenience
pub use beacon::{
    BeaconId, BeaconState, Observation, ObservationProcessor, PublishEvent, TelemetryPayload,
};
pub use config::{is_valid_beacon_address, NodeConfig};
pub use error::{Error, Result};
pub use identity::DeviceIdentity;

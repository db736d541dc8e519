//! # seamark-node
//!
//! Runtime for the seamark fixed-location beacon sensor node.
//!
//! This library wires the pure logic of `seamark-core` to the outside
//! world:
//! - [`mode`] - Provisioning/operational lifecycle and the control loop
//! - [`connectivity`] - Broker session supervision with backoff
//! - [`transport`] - MQTT transport behind a trait seam
//! - [`queue`] - Bounded latest-wins hand-off from the scan producer
//! - [`scan`] - Discovery producer glue (and the BlueZ driver)
//! - [`link`] - Uplink readiness checks
//! - [`indicator`] - Status indicator pattern selection
//! - [`api`] - HTTP status and configuration endpoints
//! - [`logging`] - Tracing bootstrap

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod connectivity;
pub mod indicator;
pub mod link;
pub mod logging;
pub mod mode;
pub mod queue;
pub mod scan;
pub mod state;
pub mod transport;

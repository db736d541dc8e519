//! # seamark-node
//!
//! Daemon for the seamark fixed-location beacon sensor node.
//!
//! This binary provides:
//! - BLE beacon observation filtering and MQTT telemetry publishing
//! - Provisioning via an HTTP configuration endpoint
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! SEAMARK_ENV=development cargo run --package seamark-node
//!
//! # Production (under systemd on the node)
//! ./seamark-node
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
#[cfg(feature = "bluetooth")]
use tracing::warn;

use seamark_core::{DeviceIdentity, NodeConfig, ObservationProcessor};
use seamark_node::connectivity::{
    liveness_topic, BackoffPolicy, ConnectionState, ConnectivitySupervisor,
};
use seamark_node::link::{HostLink, NetworkLink};
use seamark_node::mode::{self, Mode};
use seamark_node::queue::{EventQueue, DEFAULT_CAPACITY};
use seamark_node::state::AppState;
use seamark_node::transport::MqttTransport;
use seamark_node::{api, indicator, logging, scan};

/// Default shared secret, overridden by `SEAMARK_ADMIN_TOKEN`.
const DEFAULT_ADMIN_TOKEN: &str = "123456";

/// How long to wait for the uplink before giving up at boot.
const LINK_WAIT: Duration = Duration::from_secs(30);

/// Delay before the restart exit when the uplink never comes up.
const LINK_RESTART_DELAY: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("SEAMARK_ENV").as_deref() != Ok("development");
    logging::init(is_production)?;

    info!("Starting seamark-node v{}", env!("CARGO_PKG_VERSION"));

    let identity = DeviceIdentity::from_host();
    let config_path = NodeConfig::default_path();
    let config = NodeConfig::load_or_default(&config_path);
    let admin_token =
        std::env::var("SEAMARK_ADMIN_TOKEN").unwrap_or_else(|_| DEFAULT_ADMIN_TOKEN.to_string());

    info!(
        sensor_mac = %identity.as_str(),
        device_label = %config.device_label,
        config = %config_path.display(),
        "Node identity resolved"
    );

    let mut hold = mode::hold_input_from_env();
    let boot_hold = mode::held_through_boot_window(hold.as_mut()).await;
    let boot_mode = mode::decide_boot_mode(&config, boot_hold);
    info!(mode = boot_mode.as_str(), "Boot mode selected");

    match boot_mode {
        Mode::Provisioning(_) => {
            let state = AppState::new(
                identity,
                config,
                config_path,
                boot_mode,
                None,
                admin_token,
            );
            state.set_indicator(indicator::pattern_for(
                &boot_mode,
                ConnectionState::Disconnected,
            ));
            serve_http(state).await
        }
        Mode::Operational => {
            run_operational_mode(identity, config, config_path, admin_token, hold).await
        }
    }
}

/// Run the operational pipeline until a runtime hold sends the node back
/// to provisioning. The HTTP server stays up across the transition; only
/// a restart leaves provisioning.
async fn run_operational_mode(
    identity: DeviceIdentity,
    config: NodeConfig,
    config_path: std::path::PathBuf,
    admin_token: String,
    mut hold: Box<dyn mode::HoldInput + Send>,
) -> anyhow::Result<()> {
    let mut link = HostLink::from_env();
    if !link.wait_ready(LINK_WAIT).await {
        // Same restart path as a configuration write: exit cleanly and
        // let the service supervisor bring the node back up to retry.
        error!("Uplink not ready within {LINK_WAIT:?}, restarting");
        mode::schedule_restart(LINK_RESTART_DELAY);
        std::future::pending::<()>().await;
    }
    let host_address = link
        .address()
        .map_or_else(|| "0.0.0.0".to_string(), |a| a.to_string());

    let started = Instant::now();
    let queue = Arc::new(EventQueue::new(DEFAULT_CAPACITY));
    let processor = ObservationProcessor::new(
        identity.clone(),
        config.tracked(),
        config.publish_interval(),
        config.ema_alpha,
    );

    let (discovery_tx, discovery_rx) = scan::discovery_channel();
    let producer = scan::spawn_producer(discovery_rx, processor, Arc::clone(&queue), started);

    #[cfg(feature = "bluetooth")]
    let driver = tokio::spawn(async move {
        if let Err(e) = scan::run_driver(discovery_tx).await {
            warn!("BLE discovery driver stopped: {e}");
        }
    });
    #[cfg(not(feature = "bluetooth"))]
    drop(discovery_tx);

    let transport = MqttTransport::new(
        config.broker_host.clone(),
        config.broker_port,
        format!("seamark-{}", identity.as_str()),
        liveness_topic(&config.device_label),
    );
    let (supervisor, connectivity_rx) = ConnectivitySupervisor::new(
        transport,
        BackoffPolicy {
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        },
        config.connect_timeout(),
        config.device_label.clone(),
        host_address,
    );

    let state = AppState::new(
        identity,
        config,
        config_path,
        Mode::Operational,
        Some(connectivity_rx),
        admin_token,
    );
    state.set_link_address(link.address()).await;

    let server = tokio::spawn(serve_http(state.clone()));

    let trigger = mode::run_operational(
        supervisor,
        &link,
        Arc::clone(&queue),
        state.clone(),
        hold.as_mut(),
    )
    .await;

    // Runtime hold: stop the pipeline, keep only the HTTP server.
    info!(trigger = trigger.as_str(), "Entering provisioning");
    producer.abort();
    #[cfg(feature = "bluetooth")]
    driver.abort();
    link.tear_down().await;

    let provisioning = Mode::Provisioning(trigger);
    state.set_mode(provisioning).await;
    state.set_link_address(None).await;
    state.set_indicator(indicator::pattern_for(
        &provisioning,
        ConnectionState::Disconnected,
    ));

    server
        .await
        .context("HTTP server task failed")?
}

/// Serve the HTTP API until the process exits.
async fn serve_http(state: AppState) -> anyhow::Result<()> {
    let port = std::env::var("SEAMARK_HTTP_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(80);

    let app = api::create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

//! Configuration API endpoints.
//!
//! The write endpoint is the provisioning surface: one structured record
//! plus the shared secret. A mismatched secret is rejected at the boundary
//! with zero mutation; a successful write persists only the listed fields
//! and schedules an unconditional restart. The secret itself is never
//! persisted.

use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use seamark_core::NodeConfig;

use crate::api::error::{ApiError, ApiResult};
use crate::mode;
use crate::state::AppState;

/// Delay between answering a successful write and restarting.
const RESTART_DELAY: Duration = Duration::from_millis(500);

/// Creates the config router with all endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_config))
        .route("/", post(write_config))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current configuration, network password redacted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "wifi_ssid": "warehouse",
    "broker_host": "192.168.50.237",
    "broker_port": 1883,
    "device_label": "SM1",
    "tracked_beacons": "dd:88:00:00:13:07",
    "publish_interval_ms": 100
}))]
pub struct ConfigResponse {
    /// Uplink network SSID.
    pub wifi_ssid: String,

    /// Broker hostname or address.
    pub broker_host: String,

    /// Broker port.
    pub broker_port: u16,

    /// Device label used in topics and payloads.
    pub device_label: String,

    /// Comma-separated tracked beacon addresses.
    pub tracked_beacons: String,

    /// Minimum interval between surfaced events per beacon.
    pub publish_interval_ms: u64,
}

/// Configuration write request. Omitted fields keep their stored values.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "token": "123456",
    "wifi_ssid": "warehouse",
    "wifi_password": "hunter2",
    "broker_host": "broker.local",
    "broker_port": 1883,
    "device_label": "dock-3",
    "tracked_beacons": "dd:88:00:00:13:07, a1:b2:c3:d4:e5:f6",
    "publish_interval_ms": 100
}))]
pub struct ConfigWriteRequest {
    /// One-time shared secret. Checked, never stored.
    pub token: String,

    /// Uplink network SSID.
    pub wifi_ssid: Option<String>,

    /// Uplink network password.
    pub wifi_password: Option<String>,

    /// Broker hostname or address.
    pub broker_host: Option<String>,

    /// Broker port.
    pub broker_port: Option<u16>,

    /// Device label.
    pub device_label: Option<String>,

    /// Comma-separated tracked beacon addresses.
    pub tracked_beacons: Option<String>,

    /// Minimum interval between surfaced events per beacon.
    pub publish_interval_ms: Option<u64>,
}

/// Response after a successful configuration write.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigWriteResponse {
    /// Whether the record was persisted.
    pub saved: bool,

    /// Whether a restart has been scheduled.
    pub restarting: bool,

    /// Human-readable outcome.
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the current configuration, password redacted.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get current configuration",
    description = "Returns the stored configuration record. The network \
        password is never included.",
    responses(
        (status = 200, description = "Configuration retrieved", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let config = NodeConfig::load_or_default(state.config_path());
    Json(ConfigResponse {
        wifi_ssid: config.wifi_ssid,
        broker_host: config.broker_host,
        broker_port: config.broker_port,
        device_label: config.device_label,
        tracked_beacons: config.tracked_beacons,
        publish_interval_ms: config.publish_interval_ms,
    })
}

/// Write configuration and restart.
#[utoipa::path(
    post,
    path = "/api/config",
    tag = "config",
    operation_id = "writeConfig",
    summary = "Write configuration",
    description = "Persists the supplied fields of the configuration record \
        and schedules an unconditional restart. Requires the shared secret; \
        a mismatch rejects the write with nothing mutated.",
    request_body = ConfigWriteRequest,
    responses(
        (status = 200, description = "Configuration saved, restart scheduled", body = ConfigWriteResponse),
        (status = 403, description = "Shared secret mismatch")
    )
)]
pub async fn write_config(
    State(state): State<AppState>,
    Json(request): Json<ConfigWriteRequest>,
) -> ApiResult<Json<ConfigWriteResponse>> {
    if request.token != state.admin_token() {
        return Err(ApiError::Forbidden {
            error_code: "bad_token".to_string(),
            message: "Shared secret mismatch".to_string(),
        });
    }

    let path = state.config_path();
    let mut config = NodeConfig::load_or_default(path);
    apply_request(&mut config, request);

    config.save(path)?;

    info!("Configuration written, scheduling restart");
    mode::schedule_restart(RESTART_DELAY);

    Ok(Json(ConfigWriteResponse {
        saved: true,
        restarting: true,
        message: "Saved. Restarting to apply the new configuration.".to_string(),
    }))
}

/// Merge the supplied fields onto the stored record. The token is
/// deliberately not part of the record.
fn apply_request(config: &mut NodeConfig, request: ConfigWriteRequest) {
    let ConfigWriteRequest {
        token: _,
        wifi_ssid,
        wifi_password,
        broker_host,
        broker_port,
        device_label,
        tracked_beacons,
        publish_interval_ms,
    } = request;

    if let Some(v) = wifi_ssid {
        config.wifi_ssid = v;
    }
    if let Some(v) = wifi_password {
        config.wifi_password = v;
    }
    if let Some(v) = broker_host {
        config.broker_host = v;
    }
    if let Some(v) = broker_port {
        config.broker_port = v;
    }
    if let Some(v) = device_label {
        config.device_label = v;
    }
    if let Some(v) = tracked_beacons {
        config.tracked_beacons = v;
    }
    if let Some(v) = publish_interval_ms {
        config.publish_interval_ms = v;
    }
}

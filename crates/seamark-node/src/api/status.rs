//! Status API endpoint.
//!
//! Read-only view of the node: mode, identity, link address, and — when
//! operational — the connectivity snapshot and the most recently surfaced
//! event. Handlers only read watch snapshots and display locks; nothing
//! here can touch supervisor state.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use seamark_core::TelemetryPayload;

use crate::connectivity::ConnectivityStatus;
use crate::state::AppState;

/// Node status response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "mode": "operational",
    "trigger": null,
    "sensor_mac": "DCA632AABBCC",
    "device_label": "SM1",
    "ip": "192.168.50.21",
    "uptime_secs": 3600,
    "connectivity": {
        "state": "connected",
        "retries": 0,
        "next_retry_ms": null
    },
    "last_event": null
}))]
pub struct StatusResponse {
    /// Current lifecycle mode.
    #[schema(example = "operational")]
    pub mode: String,

    /// Why provisioning was entered, when in provisioning.
    #[schema(example = "boot_hold")]
    pub trigger: Option<String>,

    /// Hardware identity of this node.
    #[schema(example = "DCA632AABBCC")]
    pub sensor_mac: String,

    /// Configured device label.
    #[schema(example = "SM1")]
    pub device_label: String,

    /// Host address on the uplink, if known.
    #[schema(example = "192.168.50.21")]
    pub ip: Option<String>,

    /// Seconds since the process started.
    #[schema(example = 3600)]
    pub uptime_secs: u64,

    /// Broker connectivity snapshot. Absent in provisioning.
    pub connectivity: Option<ConnectivityStatus>,

    /// Most recently surfaced and published event.
    pub last_event: Option<TelemetryPayload>,
}

/// Creates the status router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_status))
}

/// Get node status.
#[utoipa::path(
    get,
    path = "/status",
    tag = "system",
    operation_id = "getStatus",
    summary = "Get node status",
    description = "Returns the current mode, device identity, link address, \
        broker connectivity, and the most recently published event.",
    responses(
        (status = 200, description = "Status retrieved", body = StatusResponse)
    )
)]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let mode = state.mode().await;

    Json(StatusResponse {
        mode: mode.as_str().to_string(),
        trigger: mode.trigger().map(|t| t.as_str().to_string()),
        sensor_mac: state.identity().as_str().to_string(),
        device_label: state.config().device_label.clone(),
        ip: state.link_address().await.map(|a| a.to_string()),
        uptime_secs: state.uptime_secs(),
        connectivity: state.connectivity_status(),
        last_event: state.last_event().await,
    })
}

//! OpenAPI specification generation for the seamark API.
//!
//! The spec is served at `/api/openapi.json` so installers and fleet
//! tooling can generate clients against whatever firmware a node runs.

use axum::Json;
use utoipa::OpenApi;

use super::config::{ConfigResponse, ConfigWriteRequest, ConfigWriteResponse};
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::status::StatusResponse;
use crate::connectivity::ConnectivityStatus;
use seamark_core::TelemetryPayload;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Main OpenAPI document structure for seamark.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "seamark API",
        version = "0.1.0",
        description = r#"
# seamark API

seamark is a fixed-location sensor node that watches for BLE beacons and
publishes smoothed signal-strength telemetry to an MQTT broker.

## Overview

This API provides:

1. **Status**: Current mode, connectivity, and the last published event
2. **Configuration**: Read and write the node's configuration record

## Provisioning

Configuration writes require the shared secret handed to the installer.
A successful write persists the record and restarts the node; the secret
itself is never stored on the device.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local seamark node")
    ),
    tags(
        (
            name = "system",
            description = "Health checks and node status"
        ),
        (
            name = "config",
            description = "Configuration record management"
        )
    ),
    paths(
        super::health::health_check,
        super::status::get_status,
        super::config::get_config,
        super::config::write_config,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            StatusResponse,
            ConnectivityStatus,
            TelemetryPayload,
            ConfigResponse,
            ConfigWriteRequest,
            ConfigWriteResponse,
        )
    )
)]
pub struct ApiDoc;

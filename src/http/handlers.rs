//! Route handlers.

use super::AppState;
use crate::error::AppResult;
use crate::protocol::{ResponseStatus, SensorSample};
use crate::storage::SampleSummary;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::task::JoinError;
use tracing::{error, info, warn};

/// Body of `PUT /configure`.
#[derive(Debug, Deserialize)]
pub struct ConfigureRequest {
    /// Sampling rate, 1..=255.
    pub frequency: Option<i64>,
    /// Debug flag.
    pub debug: Option<bool>,
}

/// One sample as returned by `GET /messages`.
#[derive(Debug, Serialize, PartialEq)]
pub struct SampleView {
    /// Pressure reading.
    pub pressure: f32,
    /// Temperature reading.
    pub temperature: f32,
    /// Flow velocity reading.
    pub velocity: f32,
    /// UNIX epoch seconds.
    pub timestamp: i64,
}

impl From<&SensorSample> for SampleView {
    fn from(sample: &SensorSample) -> Self {
        let [pressure, temperature, velocity] = sample.values();
        Self {
            pressure,
            temperature,
            velocity,
            timestamp: sample.timestamp,
        }
    }
}

/// Three readings, each `null` when there is no data.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct ReadingTriple {
    /// Pressure.
    pub pressure: Option<f64>,
    /// Temperature.
    pub temperature: Option<f64>,
    /// Flow velocity.
    pub velocity: Option<f64>,
}

impl From<[f64; 3]> for ReadingTriple {
    fn from([pressure, temperature, velocity]: [f64; 3]) -> Self {
        Self {
            pressure: Some(pressure),
            temperature: Some(temperature),
            velocity: Some(velocity),
        }
    }
}

/// Device configuration as reported by `GET /device`.
#[derive(Debug, Serialize, PartialEq)]
pub struct CurrentConfig {
    /// Sampling rate.
    pub frequency: u8,
    /// Debug flag.
    pub debug: bool,
}

/// Body of `GET /device`.
#[derive(Debug, Serialize, PartialEq)]
pub struct DeviceReport {
    /// Configuration the device last acknowledged.
    pub curr_config: CurrentConfig,
    /// Most recent sample.
    pub latest: ReadingTriple,
    /// Mean of up to the last ten samples.
    pub mean_last_10: ReadingTriple,
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, body.into()).into_response()
}

/// Map the outcome of a blocking command call onto an HTTP response.
fn command_response(
    route: &str,
    outcome: Result<AppResult<ResponseStatus>, JoinError>,
    success: &str,
) -> Response {
    let status = match outcome {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            error!(route, error = %e, "Error sending command");
            return text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{route}: Error sending command - {e}"),
            );
        }
        Err(e) => {
            error!(route, error = %e, "Command task failed");
            return text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{route}: Internal error - {e}"),
            );
        }
    };

    let (code, message) = match status {
        ResponseStatus::Ok => (StatusCode::OK, success.to_string()),
        ResponseStatus::InvalidCommand => (
            StatusCode::BAD_REQUEST,
            "Invalid command - device rejected the command".to_string(),
        ),
        ResponseStatus::UndefinedStatus => (
            StatusCode::BAD_GATEWAY,
            "Undefined status - unexpected response from device".to_string(),
        ),
        ResponseStatus::Mismatch => (
            StatusCode::BAD_GATEWAY,
            "Mismatch - device answered a different command".to_string(),
        ),
        ResponseStatus::Timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            "Timeout - No response from device".to_string(),
        ),
    };

    if status.is_ok() {
        info!(route, "Command succeeded");
    } else {
        warn!(route, %status, "Command did not succeed");
    }
    text(code, format!("{route}: {message}"))
}

/// `GET /start`
pub async fn start(State(state): State<AppState>) -> Response {
    if state.bridge.is_reading() {
        return text(StatusCode::BAD_REQUEST, "GET /start: Already reading");
    }
    let bridge = state.bridge.clone();
    let outcome = tokio::task::spawn_blocking(move || bridge.issue_start()).await;
    command_response("GET /start", outcome, "Reading started")
}

/// `GET /stop`
pub async fn stop(State(state): State<AppState>) -> Response {
    if !state.bridge.is_reading() {
        return text(StatusCode::BAD_REQUEST, "GET /stop: Not currently reading");
    }
    let bridge = state.bridge.clone();
    let outcome = tokio::task::spawn_blocking(move || bridge.issue_stop()).await;
    command_response("GET /stop", outcome, "Reading stopped")
}

/// `PUT /configure`
pub async fn configure(
    State(state): State<AppState>,
    payload: Result<Json<ConfigureRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected configure body");
            return text(
                StatusCode::BAD_REQUEST,
                format!("PUT /configure: Invalid JSON data - {rejection}"),
            );
        }
    };

    let (Some(frequency), Some(debug)) = (request.frequency, request.debug) else {
        return text(
            StatusCode::BAD_REQUEST,
            "PUT /configure: Missing 'frequency' or 'debug' field",
        );
    };

    let Ok(sampling_rate) = u8::try_from(frequency) else {
        return text(
            StatusCode::BAD_REQUEST,
            "PUT /configure: Frequency must be between 1 and 255",
        );
    };
    if sampling_rate == 0 {
        return text(
            StatusCode::BAD_REQUEST,
            "PUT /configure: Frequency must be between 1 and 255",
        );
    }

    let bridge = state.bridge.clone();
    let outcome =
        tokio::task::spawn_blocking(move || bridge.issue_configure(sampling_rate, debug)).await;
    command_response("PUT /configure", outcome, "Device configured")
}

/// `GET /messages?limit=N`
pub async fn messages(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let limit = match params.get("limit").map(|raw| raw.trim().parse::<usize>()) {
        Some(Ok(limit)) if limit > 0 => limit,
        Some(_) => {
            return text(
                StatusCode::BAD_REQUEST,
                "GET /messages: 'limit' must be a positive integer",
            )
        }
        None => {
            return text(
                StatusCode::BAD_REQUEST,
                "GET /messages: Missing 'limit' parameter",
            )
        }
    };

    let bridge = state.bridge.clone();
    match tokio::task::spawn_blocking(move || bridge.recent_samples(limit)).await {
        Ok(Ok(samples)) => {
            let body: Vec<SampleView> = samples.iter().map(SampleView::from).collect();
            Json(body).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "Failed to query samples");
            text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("GET /messages: Error querying database - {e}"),
            )
        }
        Err(e) => text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("GET /messages: Internal error - {e}"),
        ),
    }
}

/// `GET /device`
pub async fn device(State(state): State<AppState>) -> Response {
    let bridge = state.bridge.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        bridge.summary().map(|summary| (bridge.profile(), summary))
    })
    .await;

    match outcome {
        Ok(Ok((profile, summary))) => Json(device_report(
            profile.sampling_rate,
            profile.debug,
            &summary,
        ))
        .into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "Failed to summarise samples");
            text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("GET /device: Error querying database - {e}"),
            )
        }
        Err(e) => text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("GET /device: Internal error - {e}"),
        ),
    }
}

fn device_report(frequency: u8, debug: bool, summary: &SampleSummary) -> DeviceReport {
    let latest = summary
        .latest
        .map(|sample| ReadingTriple::from(sample.values().map(f64::from)))
        .unwrap_or_default();
    let mean_last_10 = summary.mean.map(ReadingTriple::from).unwrap_or_default();

    DeviceReport {
        curr_config: CurrentConfig { frequency, debug },
        latest,
        mean_last_10,
    }
}

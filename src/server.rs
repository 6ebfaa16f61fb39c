use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::alert::{Alert, AlertPayload};
use crate::config::Config;
use crate::dispatcher::{DispatchReport, Dispatcher};

/// Shared, read-only request state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: Config, dispatcher: Dispatcher) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
        }
    }
}

/// Why an inbound webhook was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Unauthorized,
    BadRequest,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Rejection::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Unauthorized" })),
            )
                .into_response(),
            Rejection::BadRequest => {
                (StatusCode::BAD_REQUEST, Json(json!({ "message": "Error" }))).into_response()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .with_state(state)
}

/// Serve the receiver until the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")
}

/// The whole `X-Forwarded-For` value if the header is present, else the
/// peer. A multi-hop header is not a single address and yields `None`.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> Option<IpAddr> {
    match headers.get("x-forwarded-for") {
        Some(value) => value
            .to_str()
            .ok()?
            .trim()
            .parse::<IpAddr>()
            .ok()
            .map(|ip| ip.to_canonical()),
        None => Some(peer.ip().to_canonical()),
    }
}

fn secret_matches(key: &str, secret: &str) -> bool {
    key.as_bytes().ct_eq(secret.as_bytes()).into()
}

async fn webhook(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle_alert(&state, client_ip(&headers, peer), &body).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "message": "Webhook received successfully" })),
        )
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_alert(
    state: &AppState,
    client_ip: Option<IpAddr>,
    body: &[u8],
) -> Result<DispatchReport, Rejection> {
    let ip = match client_ip {
        Some(ip) if state.config.server.allowed_ips.contains(&ip) => ip,
        Some(ip) => {
            warn!("Alert refused from {}: address not allow-listed", ip);
            return Err(Rejection::Unauthorized);
        }
        None => {
            warn!("Alert refused: unreadable client address");
            return Err(Rejection::Unauthorized);
        }
    };

    let value: Value = serde_json::from_slice(body).map_err(|e| {
        error!("Alert from {} rejected: invalid JSON: {}", ip, e);
        Rejection::BadRequest
    })?;

    let key = value.get("key").and_then(Value::as_str).ok_or_else(|| {
        error!("Alert from {} rejected: missing key", ip);
        Rejection::BadRequest
    })?;

    if !secret_matches(key, &state.config.server.secret_key) {
        warn!("Alert from {} refused: wrong key", ip);
        return Err(Rejection::Unauthorized);
    }

    let payload: AlertPayload = serde_json::from_value(value).map_err(|e| {
        error!("Alert from {} rejected: malformed payload: {}", ip, e);
        Rejection::BadRequest
    })?;

    let overrides = payload.override_fields();
    let alert = Alert::from_payload(payload).map_err(|e| {
        error!("Alert from {} rejected: {:#}", ip, e);
        Rejection::BadRequest
    })?;

    info!(
        "Alert received from {} (destinations: {})",
        ip,
        if overrides.is_empty() {
            "default".to_string()
        } else {
            overrides.join(",")
        }
    );

    let report = state.dispatcher.dispatch(&alert).await;
    info!(
        "Alert dispatched: {} delivered, {} failed, {} channel(s)",
        report.delivered(),
        report.failed(),
        report.outcomes.len()
    );

    Ok(report)
}

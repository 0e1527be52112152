//! HTTP surface of the daemon.
//!
//! * `POST /events/upgrade` receives update events from the host.
//! * `GET /admin/nonce` issues an anti-replay token for an admin action.
//! * `POST /admin/send-now` runs the outdated report immediately.
//! * `POST /admin/activate` and `POST /admin/deactivate` switch the
//!   periodic report on and off.
//! * `GET|POST /admin/settings` reads or updates the webhook URLs.
//!
//! Every route requires the administrator capability, checked before the
//! request body is looked at. Responses use the `{success, data}` envelope.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;

use crate::nonce::{NonceRegistry, ACTIVATE_ACTION, DEACTIVATE_ACTION, SEND_NOW_ACTION};
use crate::options::OptionsStore;
use crate::report::{OutdatedReportGenerator, ReportOutcome};
use crate::scheduler::ReportSchedule;
use crate::settings;
use crate::types::UpdateEvent;
use crate::update_event::UpdateEventHandler;

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub data: Value,
}

type Reply = (StatusCode, Json<Envelope>);

fn reply(status: StatusCode, success: bool, data: impl Into<Value>) -> Reply {
    (
        status,
        Json(Envelope {
            success,
            data: data.into(),
        }),
    )
}

fn forbidden(message: &str) -> Reply {
    reply(StatusCode::FORBIDDEN, false, message)
}

/// Decides whether a request carries the administrator capability.
///
/// With a configured token the request must present it as a bearer token.
/// Without one, access is open only when the daemon listens on loopback.
pub struct AdminGuard {
    token_digest: Option<[u8; 32]>,
    loopback: bool,
}

impl AdminGuard {
    pub fn new(admin_token: &str, listen: SocketAddr) -> Self {
        let token = admin_token.trim();
        Self {
            token_digest: (!token.is_empty()).then(|| digest(token)),
            loopback: listen.ip().is_loopback(),
        }
    }

    pub fn allows(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.token_digest else {
            return self.loopback;
        };
        let presented = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));
        match presented {
            Some(token) => {
                let actual = digest(token.trim());
                actual
                    .iter()
                    .zip(expected.iter())
                    .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                    == 0
            }
            None => false,
        }
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

#[derive(Clone)]
pub struct AppState {
    pub options: Arc<dyn OptionsStore>,
    pub updates: Arc<UpdateEventHandler>,
    pub reports: Arc<OutdatedReportGenerator>,
    pub schedule: Arc<ReportSchedule>,
    pub nonces: Arc<NonceRegistry>,
    pub admin: Arc<AdminGuard>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events/upgrade", post(upgrade_event))
        .route("/admin/nonce", get(issue_nonce))
        .route("/admin/send-now", post(send_now))
        .route("/admin/activate", post(activate))
        .route("/admin/deactivate", post(deactivate))
        .route("/admin/settings", get(get_settings).post(update_settings))
        .with_state(state)
}

/// Serve the HTTP surface until the listener fails.
pub async fn run_http_server(bind_addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Parses a JSON body that has already passed the admin check.
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, Reply> {
    serde_json::from_slice(body)
        .map_err(|e| reply(StatusCode::BAD_REQUEST, false, format!("Invalid request body: {}", e)))
}

async fn upgrade_event(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Reply {
    if !state.admin.allows(&headers) {
        return forbidden("You are not allowed to report updates.");
    }
    let event: UpdateEvent = match parse_json(&body) {
        Ok(event) => event,
        Err(rejection) => return rejection,
    };
    match state.updates.handle(&event).await {
        Ok(deltas) => reply(StatusCode::OK, true, json!({ "processed": deltas.len() })),
        Err(e) => {
            error!("Failed to process update event: {}", e);
            reply(StatusCode::INTERNAL_SERVER_ERROR, false, e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct NonceQuery {
    action: Option<String>,
}

async fn issue_nonce(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NonceQuery>,
) -> Reply {
    if !state.admin.allows(&headers) {
        return forbidden("You are not allowed to do this.");
    }
    let action = query.action.unwrap_or_else(|| SEND_NOW_ACTION.to_string());
    let nonce = state.nonces.issue(&action);
    reply(StatusCode::OK, true, json!({ "action": action, "nonce": nonce }))
}

#[derive(Deserialize)]
struct NonceParams {
    #[serde(rename = "_ajax_nonce")]
    nonce: Option<String>,
}

/// Pulls `_ajax_nonce` from the query string or a form encoded body.
fn presented_nonce(query: NonceParams, body: &[u8]) -> String {
    query
        .nonce
        .or_else(|| {
            url::form_urlencoded::parse(body)
                .find(|(k, _)| k == "_ajax_nonce")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_default()
}

/// Admin capability first, then a single-use nonce for `action`.
fn authorize_action(
    state: &AppState,
    headers: &HeaderMap,
    action: &str,
    params: NonceParams,
    body: &[u8],
) -> Result<(), Reply> {
    if !state.admin.allows(headers) {
        warn!("Rejected {} request without admin capability", action);
        return Err(forbidden("You are not allowed to do this."));
    }
    let nonce = presented_nonce(params, body);
    if !state.nonces.verify(action, &nonce) {
        warn!("Rejected {} request with invalid nonce", action);
        return Err(forbidden("Invalid or expired nonce."));
    }
    Ok(())
}

async fn send_now(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<NonceParams>,
    body: Bytes,
) -> Reply {
    if let Err(rejection) = authorize_action(&state, &headers, SEND_NOW_ACTION, params, &body) {
        return rejection;
    }

    match state.reports.send_now().await {
        ReportOutcome::Disabled => {
            reply(StatusCode::OK, false, "Daily webhook URL is not configured.")
        }
        ReportOutcome::Sent { .. } => {
            reply(StatusCode::OK, true, "Daily report sent successfully.")
        }
    }
}

async fn activate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<NonceParams>,
    body: Bytes,
) -> Reply {
    if let Err(rejection) = authorize_action(&state, &headers, ACTIVATE_ACTION, params, &body) {
        return rejection;
    }
    match state.schedule.activate().await {
        Ok(_) => reply(StatusCode::OK, true, "Daily report activated."),
        Err(e) => {
            error!("Failed to activate daily report: {}", e);
            reply(StatusCode::INTERNAL_SERVER_ERROR, false, e.to_string())
        }
    }
}

async fn deactivate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<NonceParams>,
    body: Bytes,
) -> Reply {
    if let Err(rejection) = authorize_action(&state, &headers, DEACTIVATE_ACTION, params, &body) {
        return rejection;
    }
    match state.schedule.deactivate().await {
        Ok(()) => reply(StatusCode::OK, true, "Daily report deactivated."),
        Err(e) => {
            error!("Failed to deactivate daily report: {}", e);
            reply(StatusCode::INTERNAL_SERVER_ERROR, false, e.to_string())
        }
    }
}

async fn get_settings(State(state): State<AppState>, headers: HeaderMap) -> Reply {
    if !state.admin.allows(&headers) {
        return forbidden("You are not allowed to do this.");
    }
    let current = settings::load(state.options.as_ref()).await;
    let data = json!({
        "webhook_url": current.webhook_url,
        "daily_webhook_url": current.daily_webhook_url,
        "daily_report_active": state.schedule.is_active().await,
    });
    reply(StatusCode::OK, true, data)
}

#[derive(Deserialize)]
struct SettingsUpdate {
    webhook_url: Option<String>,
    daily_webhook_url: Option<String>,
}

async fn update_settings(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Reply {
    if !state.admin.allows(&headers) {
        return forbidden("You are not allowed to do this.");
    }
    let update: SettingsUpdate = match parse_json(&body) {
        Ok(update) => update,
        Err(rejection) => return rejection,
    };
    match settings::save(
        state.options.as_ref(),
        update.webhook_url.as_deref(),
        update.daily_webhook_url.as_deref(),
    )
    .await
    {
        Ok(saved) => reply(StatusCode::OK, true, json!(saved)),
        Err(e) => {
            error!("Failed to save settings: {}", e);
            reply(StatusCode::INTERNAL_SERVER_ERROR, false, e.to_string())
        }
    }
}

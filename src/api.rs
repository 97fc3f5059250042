use axum::{
    body::Bytes,
    extract::State,
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use xfer_core::{
    classify_boundary_failure, BoundaryError, DiagnosticPipeline, DiagnosticReport, DiagnosticRequest,
    PipelineSettings, Protocol, SessionDriver,
};
use xfer_ftp::FtpDriver;
use xfer_sftp::SftpDriver;

use crate::metrics::{spawn_record, HealthCheckEvent, RowSink};
use crate::ratelimit::{caller_id, Admission, FixedWindowLimiter};
use crate::waitlist::{self, LeadStore, WaitlistError, WaitlistRequest};

/// Picks the session driver for a protocol.
#[derive(Clone)]
pub struct DriverFactory {
    ftp: Arc<dyn SessionDriver>,
    sftp: Arc<dyn SessionDriver>,
}

impl DriverFactory {
    pub fn new(ftp: Arc<dyn SessionDriver>, sftp: Arc<dyn SessionDriver>) -> Self {
        Self { ftp, sftp }
    }

    /// The real FTP/FTPS and SFTP drivers.
    pub fn network(accept_invalid_certs: bool) -> Self {
        Self::new(Arc::new(FtpDriver::new(accept_invalid_certs)), Arc::new(SftpDriver::new()))
    }

    pub fn for_protocol(&self, protocol: Protocol) -> Arc<dyn SessionDriver> {
        match protocol {
            Protocol::Plain | Protocol::SecurePlain => self.ftp.clone(),
            Protocol::SecureShell => self.sftp.clone(),
        }
    }
}

pub struct AppState {
    pub drivers: DriverFactory,
    pub settings: PipelineSettings,
    pub limiter: FixedWindowLimiter,
    pub metrics: Option<Arc<dyn RowSink>>,
    pub leads: Option<Arc<dyn LeadStore>>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health-check", post(health_check))
        .route("/waitlist", post(join_waitlist))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("xfercheck listening on http://{}", addr);
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "xfercheck",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ─── Health check ───────────────────────────────────────────────────────────

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn retry_after_header(secs: u64) -> [(axum::http::HeaderName, HeaderValue); 1] {
    [(RETRY_AFTER, HeaderValue::from(secs))]
}

fn fallback_response(err: BoundaryError) -> Response {
    let fallback = classify_boundary_failure(&err);
    let status = StatusCode::from_u16(fallback.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = Json(fallback.into_report());
    match err {
        BoundaryError::Throttled { retry_after_secs } => {
            (status, retry_after_header(retry_after_secs), body).into_response()
        }
        _ => (status, body).into_response(),
    }
}

/// Breadcrumb for requests that never produced a parsed protocol/host.
fn unparsed_metric(reason: &str) {
    info!(protocol = "unknown", host = "unknown", ok = false, note = reason, "HC_METRIC");
}

fn record(state: &AppState, protocol: Protocol, host: &str, ok: bool, caller: String) {
    info!(protocol = protocol.as_str(), host = %host, ok, "HC_METRIC");
    spawn_record(
        state.metrics.clone(),
        HealthCheckEvent {
            protocol,
            host: host.to_string(),
            ok,
            caller,
        },
    );
}

async fn health_check(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let caller = caller_id(&headers);

    // Throttle before the body is even looked at.
    if let Admission::Deny { retry_after_secs } = state.limiter.admit(&caller, Instant::now()) {
        unparsed_metric("rate limited");
        return fallback_response(BoundaryError::Throttled { retry_after_secs });
    }

    let request: DiagnosticRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            unparsed_metric("invalid body");
            return fallback_response(BoundaryError::Malformed(format!("Invalid request: {}", e)));
        }
    };
    if let Err(message) = request.validate() {
        unparsed_metric("invalid request");
        return fallback_response(BoundaryError::Malformed(format!("Invalid request: {}", message)));
    }

    let protocol = request.protocol;
    let host = request.host.clone();
    let pipeline = DiagnosticPipeline::new(state.drivers.for_protocol(protocol), state.settings.clone());

    let started = Instant::now();
    let outcome = tokio::spawn(async move { pipeline.run(&request).await }).await;
    let mut report: DiagnosticReport = match outcome {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "health-check task aborted");
            record(&state, protocol, &host, false, caller);
            return fallback_response(BoundaryError::Internal(e.to_string()));
        }
    };
    report.total_elapsed_ms = elapsed_ms(started);

    record(&state, protocol, &host, report.ok, caller);
    (StatusCode::OK, Json(report)).into_response()
}

// ─── Waitlist ───────────────────────────────────────────────────────────────

fn waitlist_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "ok": false, "error": message.into() }))).into_response()
}

async fn join_waitlist(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let caller = caller_id(&headers);
    if let Admission::Deny { retry_after_secs } = state.limiter.admit(&caller, Instant::now()) {
        let body = Json(json!({
            "ok": false,
            "error": BoundaryError::Throttled { retry_after_secs }.to_string(),
            "retryAfter": retry_after_secs,
        }));
        return (StatusCode::TOO_MANY_REQUESTS, retry_after_header(retry_after_secs), body).into_response();
    }

    let request: WaitlistRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return waitlist_error(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e)),
    };

    let Some(store) = state.leads.as_ref() else {
        warn!("WAITLIST_ERROR: no lead store configured");
        return waitlist_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save email");
    };

    match waitlist::submit(store.as_ref(), request).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e @ WaitlistError::InvalidEmail(_)) => waitlist_error(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            error!(error = %e, "WAITLIST_ERROR");
            waitlist_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

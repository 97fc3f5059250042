//! Health-check metrics rows.
//!
//! Rows only ever carry the sanitized host, never credentials or paths.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use xfer_core::Protocol;

lazy_static! {
    static ref SCHEME_RE: Regex = Regex::new(r"(?i)^[a-z]+://").unwrap();
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("sink rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("sink is not configured: {0}")]
    NotConfigured(&'static str),
}

/// Append-only row storage.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn append_row(&self, fields: Vec<String>) -> Result<(), SinkError>;
}

/// Keeps rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        match self.rows.lock() {
            Ok(rows) => rows.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl RowSink for MemorySink {
    async fn append_row(&self, fields: Vec<String>) -> Result<(), SinkError> {
        match self.rows.lock() {
            Ok(mut rows) => rows.push(fields),
            Err(poisoned) => poisoned.into_inner().push(fields),
        }
        Ok(())
    }
}

/// Reduce user input to a bare lowercase host.
///
/// `sftp://user@Host.com:22/incoming` becomes `host.com`.
pub fn sanitize_host(input: &str) -> String {
    let raw = input.trim();
    let no_scheme = SCHEME_RE.replace(raw, "");
    let first = no_scheme.split(['/', '?', '#']).next().unwrap_or_default();
    let no_creds = first.rsplit('@').next().unwrap_or(first);
    let no_port = no_creds.split(':').next().unwrap_or(no_creds);
    no_port.trim().to_lowercase()
}

/// One health-check outcome, ready to be written as a row.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckEvent {
    pub protocol: Protocol,
    pub host: String,
    pub ok: bool,
    pub caller: String,
}

impl HealthCheckEvent {
    /// `[timestamp, protocol, host, ok, "health_check", caller]`
    pub fn to_row(&self) -> Vec<String> {
        vec![
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            self.protocol.as_str().to_string(),
            sanitize_host(&self.host),
            if self.ok { "true" } else { "false" }.to_string(),
            "health_check".to_string(),
            self.caller.clone(),
        ]
    }
}

/// Fire-and-forget append. Failures are logged and dropped.
pub fn spawn_record(sink: Option<Arc<dyn RowSink>>, event: HealthCheckEvent) {
    let Some(sink) = sink else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = sink.append_row(event.to_row()).await {
            tracing::warn!(error = %e, "metrics row was not recorded");
        }
    });
}

//! Waitlist lead capture.

use crate::metrics::SinkError;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use xfer_core::Protocol;

const DEFAULT_SOURCE: &str = "homepage";

/// Where leads are kept. Rows are `[timestamp, email, source, protocol, host]`.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Every stored email, header excluded.
    async fn emails(&self) -> Result<Vec<String>, SinkError>;
    async fn append(&self, row: Vec<String>) -> Result<(), SinkError>;
    /// Name of the sheet or table written to.
    fn name(&self) -> &str;
}

#[derive(Debug, Default)]
pub struct MemoryLeadStore {
    rows: Mutex<Vec<Vec<String>>>,
}

impl MemoryLeadStore {
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
impl LeadStore for MemoryLeadStore {
    async fn emails(&self) -> Result<Vec<String>, SinkError> {
        Ok(self
            .rows()
            .into_iter()
            .filter_map(|row| row.get(1).cloned())
            .collect())
    }

    async fn append(&self, row: Vec<String>) -> Result<(), SinkError> {
        match self.rows.lock() {
            Ok(mut rows) => rows.push(row),
            Err(poisoned) => poisoned.into_inner().push(row),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[derive(Debug, Deserialize)]
pub struct WaitlistRequest {
    pub email: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistOutcome {
    pub ok: bool,
    pub added: bool,
    pub sheet_name_used: String,
}

#[derive(Debug, Error)]
pub enum WaitlistError {
    #[error("email: {0}")]
    InvalidEmail(&'static str),

    #[error(transparent)]
    Store(#[from] SinkError),
}

/// One `@`, a non-empty local part and a dotted domain.
pub fn validate_email(email: &str) -> Result<(), WaitlistError> {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return Err(WaitlistError::InvalidEmail("must not contain whitespace"));
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(WaitlistError::InvalidEmail("must contain exactly one '@'"));
    };
    if local.is_empty() {
        return Err(WaitlistError::InvalidEmail("missing local part"));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(WaitlistError::InvalidEmail("domain must contain a dot"));
    }
    Ok(())
}

/// Validate, dedupe case-insensitively, then append.
pub async fn submit(store: &dyn LeadStore, request: WaitlistRequest) -> Result<WaitlistOutcome, WaitlistError> {
    validate_email(&request.email)?;
    let email = request.email.trim().to_string();
    let needle = email.to_lowercase();

    let exists = store
        .emails()
        .await?
        .iter()
        .any(|cell| cell.trim().to_lowercase() == needle);
    if exists {
        tracing::debug!(sheet = store.name(), "waitlist email already present");
        return Ok(WaitlistOutcome {
            ok: true,
            added: false,
            sheet_name_used: store.name().to_string(),
        });
    }

    store
        .append(vec![
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            email,
            request.source.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| DEFAULT_SOURCE.into()),
            request.protocol.map(|p| p.as_str().to_string()).unwrap_or_default(),
            request.host.unwrap_or_default(),
        ])
        .await?;

    Ok(WaitlistOutcome {
        ok: true,
        added: true,
        sheet_name_used: store.name().to_string(),
    })
}

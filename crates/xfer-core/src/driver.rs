//! Session-driver seam.
//!
//! The pipeline only knows these traits. Each protocol crate provides a
//! `SessionDriver` that opens an authenticated session, and the session
//! lists one directory and then releases itself.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::{Credentials, DiagnosticRequest};

/// Where and how to open a session.
#[derive(Debug)]
pub struct SessionTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credentials: Credentials,
    /// Negotiate explicit TLS (FTP family only).
    pub secure: bool,
    /// Directory to list. `None` lets the driver pick its default.
    pub path: Option<String>,
    /// Bound for every individual network exchange.
    pub timeout: Duration,
}

impl SessionTarget {
    pub fn from_request(request: &DiagnosticRequest, timeout: Duration) -> Self {
        Self {
            host: request.host.clone(),
            port: request.effective_port(),
            username: request.username.clone().unwrap_or_default(),
            credentials: request.credentials(),
            secure: request.wants_tls(),
            path: request.protocol.tested_path(request.path.as_deref()),
            timeout,
        }
    }
}

/// Failure surfaced by a session driver.
///
/// Carries the library's text unchanged; the classifier pattern-matches on
/// it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SessionError {
    pub message: String,
}

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn timed_out(what: &str, after: Duration) -> Self {
        Self::new(format!("{what} timed out after {after:?}"))
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Opens authenticated sessions for one protocol family.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Connect and authenticate. A returned session is authenticated.
    async fn open(&self, target: &SessionTarget) -> Result<Box<dyn RemoteSession>, SessionError>;
}

/// An authenticated session.
#[async_trait]
pub trait RemoteSession: Send {
    /// List `path` (or the driver's default) and return the entry count.
    async fn list(&mut self, path: Option<&str>) -> Result<usize, SessionError>;

    /// Release the session. Called on every exit path after `open`.
    async fn close(&mut self) -> Result<(), SessionError>;
}

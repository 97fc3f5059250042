//! Shared types for the FTP crate.

use secrecy::SecretString;
use std::time::Duration;

// ─── Connection / Session ────────────────────────────────────────────

/// Security mode for the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtpSecurityMode {
    /// Plain-text FTP.
    #[default]
    None,
    /// Explicit FTPS: starts plain then upgrades via `AUTH TLS`.
    Explicit,
}

/// Configuration for a single FTP session.
#[derive(Debug)]
pub struct FtpConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub security: FtpSecurityMode,
    /// Bound for the TCP connect and for every control/data exchange.
    pub timeout: Duration,
    /// Accept self-signed / untrusted certificates.
    pub accept_invalid_certs: bool,
}

impl FtpConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: String::new(),
            password: SecretString::new(String::new()),
            security: FtpSecurityMode::None,
            timeout: Duration::from_secs(10),
            accept_invalid_certs: false,
        }
    }
}

/// Server capabilities advertised through `FEAT`.
#[derive(Debug, Clone, Default)]
pub struct ServerFeatures {
    pub mlsd: bool,
    pub epsv: bool,
    pub utf8: bool,
}

// ─── Protocol ────────────────────────────────────────────────────────

/// A complete (possibly multi-line) server reply.
#[derive(Debug, Clone)]
pub struct FtpResponse {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpResponse {
    /// Full response text (all lines joined).
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// 1xx.
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 2xx.
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx.
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }
}

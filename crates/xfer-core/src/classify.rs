//! Failure classification and remediation tips.
//!
//! Everything here is a pure function of the protocol and the failure text.
//! The same input always yields the same stage, category, tips and status.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::types::{DiagnosticReport, Protocol, StageDetails, StageKey, StageResult};

pub const DEFAULT_FTP_AUTH_PATTERN: &str = "auth|login|530|password|user";
pub const DEFAULT_SFTP_AUTH_PATTERN: &str = "auth|handshake|permission|denied";

lazy_static! {
    static ref DEFAULT_FTP_AUTH: Regex = case_insensitive(DEFAULT_FTP_AUTH_PATTERN).unwrap();
    static ref DEFAULT_SFTP_AUTH: Regex = case_insensitive(DEFAULT_SFTP_AUTH_PATTERN).unwrap();
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

// ─── Session classification ─────────────────────────────────────────────────

/// Heuristic category of a session-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailureClass {
    Credential,
    Enumeration,
}

impl SessionFailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::Enumeration => "enumeration",
        }
    }

    pub fn stage(self) -> StageKey {
        match self {
            Self::Credential => StageKey::Credential,
            Self::Enumeration => StageKey::Enumeration,
        }
    }
}

/// A classifier vocabulary that does not compile.
#[derive(Debug, Error)]
#[error("invalid {vocabulary} pattern: {source}")]
pub struct PatternError {
    /// `ftp_auth` or `sftp_auth`.
    pub vocabulary: &'static str,
    #[source]
    pub source: regex::Error,
}

/// Per-protocol vocabularies that mark a message as credential-related.
#[derive(Debug, Clone)]
pub struct PatternTable {
    ftp_auth: Regex,
    sftp_auth: Regex,
}

impl Default for PatternTable {
    fn default() -> Self {
        Self {
            ftp_auth: DEFAULT_FTP_AUTH.clone(),
            sftp_auth: DEFAULT_SFTP_AUTH.clone(),
        }
    }
}

impl PatternTable {
    /// Compile both vocabularies. Matching is always case-insensitive.
    pub fn new(ftp_auth: &str, sftp_auth: &str) -> Result<Self, PatternError> {
        let compile = |vocabulary: &'static str, pattern: &str| {
            case_insensitive(pattern).map_err(|source| PatternError { vocabulary, source })
        };
        Ok(Self {
            ftp_auth: compile("ftp_auth", ftp_auth)?,
            sftp_auth: compile("sftp_auth", sftp_auth)?,
        })
    }

    pub fn classify(&self, protocol: Protocol, message: &str) -> SessionFailureClass {
        let pattern = if protocol.is_ftp_family() {
            &self.ftp_auth
        } else {
            &self.sftp_auth
        };
        if pattern.is_match(message) {
            SessionFailureClass::Credential
        } else {
            SessionFailureClass::Enumeration
        }
    }
}

/// Classify with the built-in vocabularies.
pub fn classify_session_failure(protocol: Protocol, message: &str) -> SessionFailureClass {
    PatternTable::default().classify(protocol, message)
}

// ─── Message shapes ─────────────────────────────────────────────────────────

pub fn is_timeout_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("timeout") || lower.contains("timed out")
}

pub fn is_refused_message(message: &str) -> bool {
    message.to_ascii_lowercase().contains("refused")
}

// ─── Tips ───────────────────────────────────────────────────────────────────

pub fn resolution_tips() -> Vec<String> {
    vec![
        "Double-check the hostname.".into(),
        "Try resolving the host from your network (nslookup/dig).".into(),
    ]
}

pub fn transport_tips(protocol: Protocol, message: &str) -> Vec<String> {
    let mut tips: Vec<String> = Vec::new();
    if protocol.is_ftp_family() {
        if is_timeout_message(message) {
            tips.push("Check firewall rules and whether the port is reachable from the internet.".into());
        }
        tips.push("Verify host and port (FTP usually 21; SFTP is 22).".into());
        tips.push("If behind a VPN or allowlist, ensure this server can reach the FTP host.".into());
        tips.push(
            "For FTP data connections, passive mode may require additional ports opened on the server."
                .into(),
        );
    } else {
        if is_timeout_message(message) {
            tips.push("Check firewall / allowlist rules.".into());
            tips.push("Confirm the port (SFTP is usually 22).".into());
        } else {
            tips.push("Confirm the port (SFTP is usually 22).".into());
            tips.push("Check firewall / allowlist rules.".into());
        }
        tips.push("If the server is internal-only, run monitoring from inside the network/VPN.".into());
    }
    tips
}

pub fn session_tips(protocol: Protocol, class: SessionFailureClass) -> Vec<String> {
    let (credential, enumeration, extra): (&str, &str, &str) = if protocol.is_ftp_family() {
        (
            "Confirm username/password and account permissions.",
            "If listing fails, the path may not exist or the user may not have LIST permissions.",
            "If using FTPS, confirm the server supports explicit FTPS on this port.",
        )
    } else {
        (
            "Confirm username/password or private key + passphrase.",
            "If listing fails, the path may not exist or permissions may be restricted.",
            "If using key auth, ensure the server has your public key installed.",
        )
    };
    let ordered = match class {
        SessionFailureClass::Credential => [credential, extra, enumeration],
        SessionFailureClass::Enumeration => [enumeration, credential, extra],
    };
    ordered.iter().map(|t| t.to_string()).collect()
}

// ─── Boundary fallback ──────────────────────────────────────────────────────

/// Failure raised outside the pipeline, at the HTTP boundary.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// The caller exceeded its request quota.
    #[error("Too many requests. Please slow down.")]
    Throttled { retry_after_secs: u64 },

    /// The request body failed validation.
    #[error("{0}")]
    Malformed(String),

    /// Anything unexpected.
    #[error("{0}")]
    Internal(String),
}

/// Report-shaped answer for a boundary failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
    pub status: u16,
    pub stage: StageKey,
    pub message: String,
    pub details: Option<StageDetails>,
    pub tips: Vec<String>,
}

pub fn classify_boundary_failure(err: &BoundaryError) -> Fallback {
    match err {
        BoundaryError::Throttled { retry_after_secs } => Fallback {
            status: 429,
            stage: StageKey::Transport,
            message: err.to_string(),
            details: Some(StageDetails::retry_after(*retry_after_secs)),
            tips: vec!["Try again in a moment.".into()],
        },
        BoundaryError::Malformed(message) => Fallback {
            status: 400,
            stage: StageKey::Transport,
            message: message.clone(),
            details: None,
            tips: vec!["Double-check your inputs and try again.".into()],
        },
        BoundaryError::Internal(_) => Fallback {
            status: 500,
            stage: StageKey::Transport,
            message: "Unexpected error while running the health check.".into(),
            details: None,
            tips: vec!["Double-check your inputs and try again.".into()],
        },
    }
}

impl Fallback {
    pub fn into_report(self) -> DiagnosticReport {
        let mut stage = StageResult::failed(self.stage, None, self.message);
        stage.details = self.details;
        DiagnosticReport {
            ok: false,
            protocol: Protocol::Plain,
            host: String::new(),
            port: 0,
            tested_path: None,
            total_elapsed_ms: 0,
            stages: vec![stage],
            tips: self.tips,
            help_link: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── session classification ───────────────────────────────────────

    #[test]
    fn ftp_530_is_credential() {
        assert_eq!(
            classify_session_failure(Protocol::Plain, "530 Login incorrect."),
            SessionFailureClass::Credential
        );
        assert_eq!(
            classify_session_failure(Protocol::SecurePlain, "PASSWORD rejected"),
            SessionFailureClass::Credential
        );
    }

    #[test]
    fn ftp_missing_dir_is_enumeration() {
        assert_eq!(
            classify_session_failure(Protocol::Plain, "550 No such file or directory"),
            SessionFailureClass::Enumeration
        );
    }

    #[test]
    fn sftp_vocabulary_differs() {
        assert_eq!(
            classify_session_failure(Protocol::SecureShell, "Permission denied (publickey)"),
            SessionFailureClass::Credential
        );
        assert_eq!(
            classify_session_failure(Protocol::SecureShell, "No such file"),
            SessionFailureClass::Enumeration
        );
        // "530" is FTP-only vocabulary.
        assert_eq!(
            classify_session_failure(Protocol::SecureShell, "530"),
            SessionFailureClass::Enumeration
        );
    }

    #[test]
    fn classification_is_idempotent() {
        let table = PatternTable::default();
        let msg = "Handshake failed";
        let first = table.classify(Protocol::SecureShell, msg);
        for _ in 0..3 {
            assert_eq!(table.classify(Protocol::SecureShell, msg), first);
        }
    }

    #[test]
    fn custom_table_is_case_insensitive() {
        let table = PatternTable::new("nope", "BANNED").unwrap();
        assert_eq!(
            table.classify(Protocol::SecureShell, "user banned"),
            SessionFailureClass::Credential
        );
        assert_eq!(
            table.classify(Protocol::Plain, "530 Login incorrect"),
            SessionFailureClass::Enumeration
        );
        assert_eq!(PatternTable::new("(", "x").unwrap_err().vocabulary, "ftp_auth");
        assert_eq!(PatternTable::new("x", "[").unwrap_err().vocabulary, "sftp_auth");
    }

    // ── tips ─────────────────────────────────────────────────────────

    #[test]
    fn transport_timeout_puts_firewall_first() {
        let tips = transport_tips(Protocol::Plain, "TCP connect to h:21 timed out after 10s");
        assert!(tips[0].contains("firewall"));
        assert_eq!(tips.len(), 4);
        let tips = transport_tips(Protocol::Plain, "Connection refused (os error 111)");
        assert_eq!(tips.len(), 3);
        assert!(tips[0].contains("Verify host and port"));
    }

    #[test]
    fn sftp_transport_tips() {
        let tips = transport_tips(Protocol::SecureShell, "timed out");
        assert!(tips[0].contains("firewall"));
        let tips = transport_tips(Protocol::SecureShell, "refused");
        assert!(tips[0].contains("SFTP is usually 22"));
        assert_eq!(tips.len(), 3);
    }

    #[test]
    fn session_tips_follow_category() {
        let tips = session_tips(Protocol::Plain, SessionFailureClass::Credential);
        assert!(tips[0].contains("username/password"));
        let tips = session_tips(Protocol::Plain, SessionFailureClass::Enumeration);
        assert!(tips[0].contains("LIST permissions"));
        assert_eq!(tips.len(), 3);
    }

    // ── boundary fallback ────────────────────────────────────────────

    #[test]
    fn throttled_maps_to_429() {
        let fb = classify_boundary_failure(&BoundaryError::Throttled { retry_after_secs: 7 });
        assert_eq!(fb.status, 429);
        assert_eq!(fb.stage, StageKey::Transport);
        assert_eq!(fb.message, "Too many requests. Please slow down.");
        assert_eq!(fb.tips, vec!["Try again in a moment.".to_string()]);
        assert_eq!(
            fb.details.unwrap().get("retryAfter"),
            Some(&serde_json::Value::from(7))
        );
    }

    #[test]
    fn malformed_maps_to_400_with_message() {
        let fb = classify_boundary_failure(&BoundaryError::Malformed("host: must not be empty".into()));
        assert_eq!(fb.status, 400);
        assert_eq!(fb.message, "host: must not be empty");
        let report = fb.into_report();
        assert!(!report.ok);
        assert_eq!(report.port, 0);
        assert_eq!(report.host, "");
        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.stages[0].key, StageKey::Transport);
    }

    #[test]
    fn internal_maps_to_500_without_leaking_text() {
        let fb = classify_boundary_failure(&BoundaryError::Internal("db password=xyz".into()));
        assert_eq!(fb.status, 500);
        assert!(!fb.message.contains("xyz"));
    }
}

//! Shared types for the health-check engine.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::time::Duration;

// ─── Protocol ───────────────────────────────────────────────────────────────

/// Remote endpoint flavour. Selects the session driver and default port.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Plain-text FTP.
    #[default]
    #[serde(rename = "plain", alias = "ftp")]
    Plain,
    /// FTP with explicit TLS negotiated on the same port (`AUTH TLS`).
    #[serde(rename = "secure-plain", alias = "ftps")]
    SecurePlain,
    /// SFTP over SSH.
    #[serde(rename = "secure-shell", alias = "sftp")]
    SecureShell,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::SecurePlain => "secure-plain",
            Self::SecureShell => "secure-shell",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Plain | Self::SecurePlain => 21,
            Self::SecureShell => 22,
        }
    }

    /// `true` for the FTP family (plain and explicit TLS).
    pub fn is_ftp_family(self) -> bool {
        !matches!(self, Self::SecureShell)
    }

    /// Path reported as `testedPath`.
    ///
    /// FTP reports only what the caller asked for. SFTP always lists
    /// something and falls back to the login directory (`"."`).
    pub fn tested_path(self, path: Option<&str>) -> Option<String> {
        let trimmed = path.map(str::trim).filter(|p| !p.is_empty());
        match self {
            Self::Plain | Self::SecurePlain => trimmed.map(str::to_string),
            Self::SecureShell => Some(trimmed.unwrap_or(".").to_string()),
        }
    }
}

// ─── Stages ─────────────────────────────────────────────────────────────────

/// One step of the diagnostic, in execution order.
///
/// The derived `Ord` follows declaration order, which is the only order in
/// which stages may appear in a report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StageKey {
    #[serde(alias = "dns")]
    NameResolution,
    #[serde(alias = "tcp")]
    Transport,
    #[serde(alias = "auth")]
    Credential,
    #[serde(alias = "list")]
    Enumeration,
}

impl StageKey {
    pub const ORDER: [StageKey; 4] = [
        StageKey::NameResolution,
        StageKey::Transport,
        StageKey::Credential,
        StageKey::Enumeration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NameResolution => "name-resolution",
            Self::Transport => "transport",
            Self::Credential => "credential",
            Self::Enumeration => "enumeration",
        }
    }
}

/// Free-form stage details.
///
/// There is no public way to insert arbitrary values: every constructor
/// takes a non-secret input (address, count, category, retry delay), so a
/// credential can never end up in a serialized report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StageDetails(Map<String, Value>);

impl StageDetails {
    pub fn resolved(address: IpAddr) -> Self {
        let family = if address.is_ipv4() { 4 } else { 6 };
        let mut map = Map::new();
        map.insert("address".into(), Value::String(address.to_string()));
        map.insert("family".into(), Value::from(family));
        Self(map)
    }

    pub fn listed(count: usize) -> Self {
        let mut map = Map::new();
        map.insert("count".into(), Value::from(count));
        Self(map)
    }

    pub fn category(category: &str) -> Self {
        let mut map = Map::new();
        map.insert("category".into(), Value::String(category.to_string()));
        Self(map)
    }

    pub fn retry_after(secs: u64) -> Self {
        let mut map = Map::new();
        map.insert("retryAfter".into(), Value::from(secs));
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome of a single executed stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub key: StageKey,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<StageDetails>,
}

impl StageResult {
    pub fn passed(key: StageKey, elapsed: Duration, message: impl Into<String>) -> Self {
        Self {
            key,
            ok: true,
            elapsed_ms: Some(millis(elapsed)),
            message: message.into(),
            details: None,
        }
    }

    pub fn failed(key: StageKey, elapsed: Option<Duration>, message: impl Into<String>) -> Self {
        Self {
            key,
            ok: false,
            elapsed_ms: elapsed.map(millis),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: StageDetails) -> Self {
        self.details = Some(details);
        self
    }
}

pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ─── Request ────────────────────────────────────────────────────────────────

/// Inbound diagnostic request as posted by the form.
///
/// Secret fields stay wrapped in [`SecretString`]; `Debug` redacts them and
/// the type is deliberately not `Serialize`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticRequest {
    pub protocol: Protocol,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub path: Option<String>,
    /// Request explicit TLS on the `plain` protocol.
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default)]
    pub private_key: Option<SecretString>,
    #[serde(default)]
    pub passphrase: Option<SecretString>,
}

impl DiagnosticRequest {
    /// A minimal request; mostly useful in tests and tooling.
    pub fn new(protocol: Protocol, host: impl Into<String>) -> Self {
        Self {
            protocol,
            host: host.into(),
            port: None,
            username: None,
            password: None,
            path: None,
            secure: None,
            private_key: None,
            passphrase: None,
        }
    }

    /// Shape checks that serde cannot express.
    ///
    /// Line breaks are refused in every field that ends up on an FTP
    /// control channel.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("host: must not be empty".into());
        }
        if self.port == Some(0) {
            return Err("port: must be between 1 and 65535".into());
        }
        let single_line = [
            ("host", Some(self.host.as_str())),
            ("username", self.username.as_deref()),
            ("path", self.path.as_deref()),
        ];
        for (field, value) in single_line {
            if value.is_some_and(|v| v.contains(['\r', '\n'])) {
                return Err(format!("{field}: must not contain line breaks"));
            }
        }
        Ok(())
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// Whether the FTP family should negotiate TLS.
    pub fn wants_tls(&self) -> bool {
        match self.protocol {
            Protocol::SecurePlain => true,
            Protocol::Plain => self.secure.unwrap_or(false),
            Protocol::SecureShell => false,
        }
    }

    /// Credentials the session driver should present.
    ///
    /// For SFTP a non-empty private key wins over a password. The FTP family
    /// only ever uses the password.
    pub fn credentials(&self) -> Credentials {
        if self.protocol == Protocol::SecureShell {
            if let Some(key) = self
                .private_key
                .as_ref()
                .filter(|k| !k.expose_secret().trim().is_empty())
            {
                return Credentials::PrivateKey {
                    pem: copy_secret(key),
                    passphrase: self
                        .passphrase
                        .as_ref()
                        .filter(|p| !p.expose_secret().is_empty())
                        .map(copy_secret),
                };
            }
        }
        Credentials::Password(
            self.password
                .as_ref()
                .map(copy_secret)
                .unwrap_or_else(|| SecretString::new(String::new())),
        )
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().clone())
}

/// Credential material handed to a session driver.
#[derive(Debug)]
pub enum Credentials {
    Password(SecretString),
    PrivateKey {
        pem: SecretString,
        passphrase: Option<SecretString>,
    },
}

impl Credentials {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::PrivateKey { .. } => "publickey",
        }
    }
}

// ─── Report ─────────────────────────────────────────────────────────────────

/// Full diagnostic report returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub ok: bool,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tested_path: Option<String>,
    /// Wall-clock milliseconds for the entire invocation.
    pub total_elapsed_ms: u64,
    pub stages: Vec<StageResult>,
    pub tips: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_link: Option<String>,
}

impl DiagnosticReport {
    /// The stage that halted the pipeline, if any.
    pub fn failed_stage(&self) -> Option<&StageResult> {
        self.stages.iter().find(|s| !s.ok)
    }
}

//! Authentication against an SSH server.
//!
//! Exactly one method is tried: the in-memory private key when one was
//! supplied, the password otherwise. The key never touches the disk.

use secrecy::ExposeSecret;
use ssh2::Session;
use xfer_core::{Credentials, SessionError};

/// The single method a session will attempt.
#[derive(PartialEq, Eq)]
pub enum AuthPlan<'a> {
    PublicKey {
        pem: &'a str,
        passphrase: Option<&'a str>,
    },
    Password(&'a str),
}

impl<'a> AuthPlan<'a> {
    pub fn from_credentials(credentials: &'a Credentials) -> Self {
        match credentials {
            Credentials::PrivateKey { pem, passphrase } => AuthPlan::PublicKey {
                pem: pem.expose_secret(),
                passphrase: passphrase.as_ref().map(|p| p.expose_secret().as_str()),
            },
            Credentials::Password(pw) => AuthPlan::Password(pw.expose_secret()),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            AuthPlan::PublicKey { .. } => "publickey",
            AuthPlan::Password(_) => "password",
        }
    }
}

impl std::fmt::Debug for AuthPlan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthPlan::PublicKey { passphrase, .. } => f
                .debug_struct("PublicKey")
                .field("passphrase", &passphrase.map(|_| "[REDACTED]"))
                .finish_non_exhaustive(),
            AuthPlan::Password(_) => f.write_str("Password([REDACTED])"),
        }
    }
}

/// Authenticate `session` and return the method that succeeded.
pub fn authenticate(session: &Session, username: &str, credentials: &Credentials) -> Result<&'static str, SessionError> {
    let plan = AuthPlan::from_credentials(credentials);
    let attempt = match &plan {
        AuthPlan::PublicKey { pem, passphrase } => session.userauth_pubkey_memory(username, None, pem, *passphrase),
        AuthPlan::Password(password) => session.userauth_password(username, password),
    };
    attempt.map_err(|e| SessionError::new(format!("Authentication failed ({}): {}", plan.method(), e)))?;

    if !session.authenticated() {
        return Err(SessionError::new(format!(
            "Authentication failed ({}): server did not accept the credentials",
            plan.method()
        )));
    }
    Ok(plan.method())
}

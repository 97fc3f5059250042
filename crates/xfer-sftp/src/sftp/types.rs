use std::time::Duration;
use xfer_core::{Credentials, SessionTarget};

/// Everything the blocking worker needs to open a session.
#[derive(Debug)]
pub struct SftpConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credentials: Credentials,
    /// Applied to the TCP connect and to every libssh2 call.
    pub timeout: Duration,
}

impl SftpConnectionConfig {
    pub fn from_target(target: &SessionTarget) -> Self {
        Self {
            host: target.host.clone(),
            port: target.port,
            username: target.username.clone(),
            credentials: clone_credentials(&target.credentials),
            timeout: target.timeout,
        }
    }

    /// libssh2 takes its timeout in milliseconds as `u32`.
    pub fn timeout_ms(&self) -> u32 {
        u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX)
    }
}

fn clone_credentials(credentials: &Credentials) -> Credentials {
    use secrecy::{ExposeSecret, SecretString};
    let copy = |s: &SecretString| SecretString::new(s.expose_secret().clone());
    match credentials {
        Credentials::Password(pw) => Credentials::Password(copy(pw)),
        Credentials::PrivateKey { pem, passphrase } => Credentials::PrivateKey {
            pem: copy(pem),
            passphrase: passphrase.as_ref().map(copy),
        },
    }
}

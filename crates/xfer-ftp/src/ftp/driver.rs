//! FTP / explicit-FTPS implementation of the session-driver seam.

use crate::ftp::client::FtpClient;
use crate::ftp::types::{FtpConnectionConfig, FtpSecurityMode};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use xfer_core::{Credentials, RemoteSession, SessionDriver, SessionError, SessionTarget};

/// Opens FTP sessions for the `plain` and `secure-plain` protocols.
#[derive(Debug, Clone, Default)]
pub struct FtpDriver {
    pub accept_invalid_certs: bool,
}

impl FtpDriver {
    pub fn new(accept_invalid_certs: bool) -> Self {
        Self { accept_invalid_certs }
    }

    fn config_for(&self, target: &SessionTarget) -> FtpConnectionConfig {
        let password = match &target.credentials {
            Credentials::Password(pw) => SecretString::new(pw.expose_secret().clone()),
            Credentials::PrivateKey { .. } => SecretString::new(String::new()),
        };
        FtpConnectionConfig {
            host: target.host.clone(),
            port: target.port,
            username: target.username.clone(),
            password,
            security: if target.secure {
                FtpSecurityMode::Explicit
            } else {
                FtpSecurityMode::None
            },
            timeout: target.timeout,
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}

#[async_trait]
impl SessionDriver for FtpDriver {
    async fn open(&self, target: &SessionTarget) -> Result<Box<dyn RemoteSession>, SessionError> {
        let config = self.config_for(target);
        let client = FtpClient::connect(&config).await?;
        Ok(Box::new(FtpSession { client }))
    }
}

/// An authenticated FTP session.
pub struct FtpSession {
    client: FtpClient,
}

#[async_trait]
impl RemoteSession for FtpSession {
    async fn list(&mut self, path: Option<&str>) -> Result<usize, SessionError> {
        match path {
            Some(path) => self.client.cwd(path).await?,
            // Root listing; a server that refuses `CWD /` keeps the login
            // directory. A dropped or silent connection still fails.
            None => match self.client.cwd("/").await {
                Ok(()) => {}
                Err(e) if e.is_refusal() => {
                    log::debug!("CWD / refused, listing login directory: {}", e);
                }
                Err(e) => return Err(e.into()),
            },
        }
        let entries = self.client.list().await?;
        Ok(entries.len())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.client.quit().await?;
        Ok(())
    }
}

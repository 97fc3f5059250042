//! Async session driver over the blocking libssh2 calls.

use crate::sftp::session as ssh;
use crate::sftp::types::SftpConnectionConfig;
use async_trait::async_trait;
use ssh2::Session;
use tokio::task::spawn_blocking;
use xfer_core::{RemoteSession, SessionDriver, SessionError, SessionTarget};

const DEFAULT_PATH: &str = ".";

/// Opens SFTP sessions for the `secure-shell` protocol.
#[derive(Debug, Clone, Default)]
pub struct SftpDriver;

impl SftpDriver {
    pub fn new() -> Self {
        Self
    }
}

async fn blocking<T, F>(work: F) -> Result<T, SessionError>
where
    F: FnOnce() -> Result<T, SessionError> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(work)
        .await
        .map_err(|e| SessionError::new(format!("SFTP worker failed: {}", e)))?
}

#[async_trait]
impl SessionDriver for SftpDriver {
    async fn open(&self, target: &SessionTarget) -> Result<Box<dyn RemoteSession>, SessionError> {
        let config = SftpConnectionConfig::from_target(target);
        let session = blocking(move || ssh::connect(&config)).await?;
        Ok(Box::new(SftpSession { session }))
    }
}

/// An authenticated SFTP session.
pub struct SftpSession {
    session: Session,
}

#[async_trait]
impl RemoteSession for SftpSession {
    async fn list(&mut self, path: Option<&str>) -> Result<usize, SessionError> {
        let session = self.session.clone();
        let path = path.unwrap_or(DEFAULT_PATH).to_string();
        blocking(move || ssh::count_entries(&session, &path)).await
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let session = self.session.clone();
        blocking(move || ssh::disconnect(&session)).await
    }
}

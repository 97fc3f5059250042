//! Blocking libssh2 operations. Only ever called from the blocking pool.

use crate::sftp::auth::authenticate;
use crate::sftp::types::SftpConnectionConfig;
use log::{debug, info};
use ssh2::Session;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use xfer_core::SessionError;

/// TCP connect, SSH handshake and authentication.
pub fn connect(config: &SftpConnectionConfig) -> Result<Session, SessionError> {
    let addr = format!("{}:{}", config.host, config.port);
    let socket = addr
        .to_socket_addrs()
        .map_err(|e| SessionError::new(format!("Cannot resolve {}: {}", addr, e)))?
        .next()
        .ok_or_else(|| SessionError::new(format!("No address for {}", addr)))?;

    let tcp = TcpStream::connect_timeout(&socket, config.timeout)
        .map_err(|e| SessionError::new(format!("TCP connection to {} failed: {}", addr, e)))?;
    tcp.set_read_timeout(Some(config.timeout)).ok();
    tcp.set_write_timeout(Some(config.timeout)).ok();

    let mut session =
        Session::new().map_err(|e| SessionError::new(format!("Failed to create SSH session: {}", e)))?;
    session.set_timeout(config.timeout_ms());
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| SessionError::new(format!("SSH handshake failed: {}", e)))?;
    debug!("SSH banner from {}: {:?}", addr, session.banner());

    let method = authenticate(&session, &config.username, &config.credentials)?;
    info!("SFTP authenticated to {} via {}", addr, method);
    Ok(session)
}

/// Open the SFTP subsystem and count the entries of `path`.
///
/// `readdir` already leaves out `.` and `..`.
pub fn count_entries(session: &Session, path: &str) -> Result<usize, SessionError> {
    let sftp = session
        .sftp()
        .map_err(|e| SessionError::new(format!("SFTP subsystem unavailable: {}", e)))?;
    let entries = sftp
        .readdir(Path::new(path))
        .map_err(|e| SessionError::new(format!("Listing '{}' failed: {}", path, e)))?;
    Ok(entries.len())
}

pub fn disconnect(session: &Session) -> Result<(), SessionError> {
    session
        .disconnect(None, "health check complete", None)
        .map_err(|e| SessionError::new(format!("SSH disconnect failed: {}", e)))
}

//! TCP transport: establishes the FTP control connection and reads the
//! server greeting.
//!
//! Explicit FTPS upgrades later, once the greeting has been read (handled in
//! `client.rs`).

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::types::FtpConnectionConfig;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Establish the control connection and consume the server greeting.
pub async fn connect(config: &FtpConnectionConfig) -> FtpResult<FtpCodec> {
    let addr = format!("{}:{}", config.host, config.port);

    let tcp = timeout(config.timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| {
            FtpError::timeout(format!(
                "TCP connect to {} timed out after {:?}",
                addr, config.timeout
            ))
        })?
        .map_err(|e| FtpError::connection_failed(format!("TCP connect to {}: {}", addr, e)))?;

    tcp.set_nodelay(true).ok();
    let peer = tcp.peer_addr()?;

    let mut codec = FtpCodec::from_tcp(tcp, peer, config.timeout);
    let banner = codec.read_response().await?;
    if !banner.is_completion() {
        return Err(FtpError::from_reply(banner.code, &banner.text()));
    }
    log::debug!("FTP greeting from {}: {}", addr, banner.text());
    Ok(codec)
}

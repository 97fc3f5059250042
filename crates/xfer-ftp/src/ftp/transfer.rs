//! Passive data-channel management.
//!
//! - **EPSV** (RFC 2428): server announces a port on the control peer
//! - **PASV** (RFC 959): server announces `h1,h2,h3,h4,p1,p2`
//!
//! EPSV is tried first; a rejection falls back to PASV. The data socket is
//! TLS-wrapped by the caller once the server has accepted the transfer
//! command.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::tls::{self, FtpsTls};
use lazy_static::lazy_static;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;

lazy_static! {
    static ref PASV_RE: Regex = Regex::new(r"(\d+),(\d+),(\d+),(\d+),(\d+),(\d+)").unwrap();
    static ref EPSV_RE: Regex = Regex::new(r"\(([^\d\s])([^\d\s])([^\d\s])(\d+)([^\d\s])\)").unwrap();
}

/// Abstraction over a plain or TLS-wrapped data stream.
pub enum DataStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl DataStream {
    /// Wrap a freshly connected data socket when the session is protected.
    pub async fn establish(tcp: TcpStream, tls: Option<&FtpsTls>, limit: Duration) -> FtpResult<Self> {
        match tls {
            Some(tls) => Ok(Self::Tls(Box::new(tls::wrap_data_stream(tcp, tls, limit).await?))),
            None => Ok(Self::Plain(tcp)),
        }
    }

    /// Read the whole stream into a string.
    ///
    /// A peer that closes without TLS `close_notify` still yields the data
    /// received so far.
    pub async fn read_to_string(self, limit: Duration) -> FtpResult<String> {
        let mut buf = Vec::new();
        let read = async {
            match self {
                DataStream::Plain(mut tcp) => tcp.read_to_end(&mut buf).await,
                DataStream::Tls(mut tls) => tls.read_to_end(&mut buf).await,
            }
        };
        match timeout(limit, read).await {
            Err(_) => return Err(FtpError::timeout("Data transfer timed out")),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::debug!("data channel closed without close_notify");
            }
            Ok(Err(e)) => return Err(FtpError::data_channel(format!("Data channel read: {}", e))),
            Ok(Ok(_)) => {}
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Negotiate a passive data connection.
///
/// `epsv_rejected` remembers an EPSV refusal across calls so later
/// transfers go straight to PASV.
pub async fn open_passive(codec: &mut FtpCodec, epsv_rejected: &mut bool) -> FtpResult<TcpStream> {
    let target = if *epsv_rejected {
        pasv_target(codec).await?
    } else {
        let resp = codec.execute("EPSV").await?;
        if resp.is_completion() {
            SocketAddr::new(codec.peer.ip(), parse_epsv_response(&resp.text())?)
        } else {
            log::debug!("EPSV refused ({}), falling back to PASV", resp.code);
            *epsv_rejected = true;
            pasv_target(codec).await?
        }
    };

    log::trace!("opening data connection to {}", target);
    timeout(codec.timeout, TcpStream::connect(target))
        .await
        .map_err(|_| FtpError::data_channel(format!("Data connection to {} timed out", target)))?
        .map_err(|e| FtpError::data_channel(format!("Data connection to {}: {}", target, e)))
}

async fn pasv_target(codec: &mut FtpCodec) -> FtpResult<SocketAddr> {
    let resp = codec.expect_ok("PASV").await?;
    let announced = parse_pasv_response(&resp.text())?;
    Ok(passive_target(announced, codec.peer.ip()))
}

/// Parse `h1,h2,h3,h4,p1,p2` from a 227 response.
pub fn parse_pasv_response(text: &str) -> FtpResult<SocketAddr> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse PASV: {}", text)))?;

    let nums: Vec<u8> = (1..=6)
        .map(|i| {
            caps[i]
                .parse::<u8>()
                .map_err(|_| FtpError::protocol_error("PASV number out of range"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = (nums[4] as u16) * 256 + (nums[5] as u16);
    Ok(SocketAddr::new(ip, port))
}

/// Parse the port from `229 Entering Extended Passive Mode (|||port|)`.
///
/// The delimiter may be any printable non-digit, as long as it is the same
/// four times.
pub fn parse_epsv_response(text: &str) -> FtpResult<u16> {
    let caps = EPSV_RE
        .captures(text)
        .filter(|c| c[1] == c[2] && c[2] == c[3] && c[3] == c[5])
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse EPSV: {}", text)))?;
    caps[4]
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| FtpError::protocol_error("EPSV port out of range"))
}

/// Servers behind NAT often announce their private or wildcard address.
/// In that case connect to the control peer instead.
pub fn passive_target(announced: SocketAddr, control_peer: IpAddr) -> SocketAddr {
    let unusable = match announced.ip() {
        IpAddr::V4(v4) => {
            v4.is_unspecified() || ((v4.is_private() || v4.is_link_local()) && !is_private(control_peer))
        }
        IpAddr::V6(v6) => v6.is_unspecified(),
    };
    if unusable {
        SocketAddr::new(control_peer, announced.port())
    } else {
        announced
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

//! # FTP / explicit FTPS client
//!
//! The subset of the FTP protocol (RFC 959) a health check needs:
//! - **RFC 2228 / 4217**: AUTH TLS, PBSZ, PROT (explicit FTPS)
//! - **RFC 2389**: FEAT negotiation
//! - **RFC 2428**: EPSV, with PASV fallback
//! - **RFC 3659**: MLSD listings
//!
//! Architecture:
//! - `types`: config, FEAT flags, replies
//! - `error`: FTP-specific error type
//! - `protocol`: low-level command/response codec
//! - `connection`: TCP connect + greeting
//! - `tls`: rustls configuration and channel upgrades
//! - `transfer`: passive data channels
//! - `parser`: decides which Unix/DOS/MLSD listing lines are entries
//! - `client`: stateful FTP client (login, CWD, LIST, QUIT)
//! - `driver`: the session driver used by the diagnostic pipeline

pub mod client;
pub mod connection;
pub mod driver;
pub mod error;
pub mod parser;
pub mod protocol;
pub mod tls;
pub mod transfer;
pub mod types;

pub use client::FtpClient;
pub use driver::{FtpDriver, FtpSession};
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use types::*;

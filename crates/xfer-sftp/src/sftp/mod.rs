// ── xfer-sftp / sftp module ───────────────────────────────────────────────────
//
// SFTP session driver for the health-check pipeline:
//   • Blocking libssh2 session setup (TCP, handshake, auth)
//   • Password or in-memory private-key authentication
//   • Directory listing via `readdir`
//   • Async wrapper that runs every blocking call on tokio's blocking pool

pub mod auth;
pub mod driver;
pub mod session;
pub mod types;

pub use auth::{authenticate, AuthPlan};
pub use driver::{SftpDriver, SftpSession};
pub use types::SftpConnectionConfig;

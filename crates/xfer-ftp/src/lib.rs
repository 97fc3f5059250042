pub mod ftp;

pub use ftp::{FtpClient, FtpConnectionConfig, FtpDriver, FtpError, FtpErrorKind, FtpSecurityMode};

pub mod sftp;

pub use sftp::{SftpConnectionConfig, SftpDriver, SftpSession};

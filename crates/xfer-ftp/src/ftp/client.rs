//! Stateful FTP client: owns the control connection and issues commands.
//!
//! Lifecycle: `connect()` → greeting → optional `AUTH TLS` upgrade →
//! `USER`/`PASS` → FEAT probe → `TYPE I`. After that the session can
//! change directory, list, and `quit()`.

use crate::ftp::connection;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::parser;
use crate::ftp::protocol::FtpCodec;
use crate::ftp::tls::{self, FtpsTls};
use crate::ftp::transfer::{self, DataStream};
use crate::ftp::types::*;
use secrecy::ExposeSecret;

/// A connected, authenticated FTP session.
pub struct FtpClient {
    codec: FtpCodec,
    tls: Option<FtpsTls>,
    features: ServerFeatures,
    epsv_rejected: bool,
}

impl FtpClient {
    /// Connect, secure (when configured) and log in.
    pub async fn connect(config: &FtpConnectionConfig) -> FtpResult<Self> {
        if config.host.is_empty() {
            return Err(FtpError::connection_failed("Host must not be empty"));
        }

        let mut codec = connection::connect(config).await?;

        // ── Explicit FTPS: AUTH TLS ──────────────────────────────
        let tls = if config.security == FtpSecurityMode::Explicit {
            let resp = codec.execute("AUTH TLS").await?;
            if !resp.is_completion() {
                return Err(FtpError::tls_failed(format!("AUTH TLS rejected: {}", resp.text())).with_code(resp.code));
            }
            let tls = FtpsTls::new(&config.host, config.accept_invalid_certs)?;
            codec = tls::upgrade_to_tls(codec, &tls).await?;

            // Protection level for the data channel.
            codec.expect_ok("PBSZ 0").await?;
            codec.expect_ok("PROT P").await?;
            Some(tls)
        } else {
            None
        };

        // ── Authenticate ─────────────────────────────────────────
        let user_resp = codec.execute(&format!("USER {}", config.username)).await?;
        if user_resp.is_intermediate() {
            let pass_resp = codec
                .execute(&format!("PASS {}", config.password.expose_secret()))
                .await?;
            if !pass_resp.is_completion() {
                return Err(FtpError::auth_failed(pass_resp.code, pass_resp.text()));
            }
        } else if !user_resp.is_completion() {
            return Err(FtpError::auth_failed(user_resp.code, user_resp.text()));
        }

        // ── FEAT ─────────────────────────────────────────────────
        let features = Self::probe_features(&mut codec).await;
        if features.utf8 {
            let _ = codec.execute("OPTS UTF8 ON").await;
        }

        // ── TYPE ─────────────────────────────────────────────────
        codec.expect_ok("TYPE I").await?;

        log::debug!(
            "FTP session ready on {}:{} (tls={}, mlsd={}, epsv={})",
            config.host,
            config.port,
            tls.is_some(),
            features.mlsd,
            features.epsv
        );

        Ok(Self {
            codec,
            tls,
            features,
            epsv_rejected: false,
        })
    }

    // ─── FEAT probe ──────────────────────────────────────────────

    async fn probe_features(codec: &mut FtpCodec) -> ServerFeatures {
        let resp = match codec.execute("FEAT").await {
            Ok(r) if r.is_completion() => r,
            _ => return ServerFeatures::default(),
        };

        let raw: Vec<String> = resp
            .lines
            .iter()
            .skip(1) // "211-Features:"
            .filter(|l| !l.starts_with("211"))
            .map(|l| l.trim().to_uppercase())
            .collect();

        let has = |feat: &str| raw.iter().any(|l| l.starts_with(feat));

        ServerFeatures {
            mlsd: has("MLSD"),
            epsv: has("EPSV"),
            utf8: has("UTF8"),
        }
    }

    // ─── CWD ─────────────────────────────────────────────────────

    pub async fn cwd(&mut self, path: &str) -> FtpResult<()> {
        self.codec.expect_ok(&format!("CWD {}", path)).await?;
        Ok(())
    }

    // ─── Listing ─────────────────────────────────────────────────

    /// Entry names of the current directory. Prefers MLSD when advertised.
    pub async fn list(&mut self) -> FtpResult<Vec<String>> {
        let cmd = if self.features.mlsd { "MLSD" } else { "LIST" };
        let data = self.retrieve_data_as_string(cmd).await?;
        Ok(parser::parse_listing(&data))
    }

    /// Open a passive data channel, send `cmd`, collect the body.
    pub async fn retrieve_data_as_string(&mut self, cmd: &str) -> FtpResult<String> {
        let tcp = transfer::open_passive(&mut self.codec, &mut self.epsv_rejected).await?;
        let resp = self.codec.execute(cmd).await?;
        if !resp.is_preliminary() && !resp.is_completion() {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }

        // Some servers only start the TLS accept once the transfer command
        // has been accepted, so the handshake happens here.
        let limit = self.codec.timeout;
        let ds = DataStream::establish(tcp, self.tls.as_ref(), limit).await?;
        let data = ds.read_to_string(limit).await?;

        if resp.is_preliminary() {
            let done = self.codec.read_response().await?;
            if !done.is_completion() {
                return Err(FtpError::from_reply(done.code, &done.text()));
            }
        }
        Ok(data)
    }

    // ─── QUIT ────────────────────────────────────────────────────

    /// Close the session. The server's answer is irrelevant.
    pub async fn quit(&mut self) -> FtpResult<()> {
        let result = self.codec.execute("QUIT").await.map(|_| ());
        self.codec.shutdown().await;
        result
    }
}

//! TLS helpers for explicit FTPS (RFC 4217), built on rustls.
//!
//! One [`FtpsTls`] is created per session and reused for the control and
//! data channels, so data connections resume the control channel's TLS
//! session. Servers that enforce session reuse reject data channels
//! otherwise.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::{FtpCodec, ReadHalf, WriteHalf};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Connector plus the name presented in SNI / checked against the cert.
#[derive(Clone)]
pub struct FtpsTls {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl FtpsTls {
    pub fn new(host: &str, accept_invalid_certs: bool) -> FtpResult<Self> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| FtpError::tls_failed(format!("Invalid TLS server name '{}': {}", host, e)))?;
        let config = build_client_config(accept_invalid_certs)?;
        Ok(Self {
            connector: TlsConnector::from(config),
            server_name,
        })
    }

    async fn handshake(&self, tcp: TcpStream, what: &str, limit: std::time::Duration) -> FtpResult<TlsStream<TcpStream>> {
        timeout(limit, self.connector.connect(self.server_name.clone(), tcp))
            .await
            .map_err(|_| FtpError::timeout(format!("{} TLS handshake timed out", what)))?
            .map_err(|e| FtpError::tls_failed(format!("{} TLS handshake: {}", what, e)))
    }
}

/// Build a rustls client config on the ring provider.
///
/// Trust roots come from the platform store unless `accept_invalid_certs`
/// is set, in which case any certificate is accepted.
pub fn build_client_config(accept_invalid_certs: bool) -> FtpResult<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| FtpError::tls_failed(format!("TLS configuration: {}", e)))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for err in &native.errors {
            log::debug!("skipping native root certificate: {}", err);
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        log::debug!("loaded {} native root certificates ({} ignored)", added, ignored);
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(Arc::new(config))
}

/// Upgrade an existing **plain** control connection to TLS.
///
/// Called after a successful `AUTH TLS` (234) reply.
pub async fn upgrade_to_tls(codec: FtpCodec, tls: &FtpsTls) -> FtpResult<FtpCodec> {
    let (peer, limit) = (codec.peer, codec.timeout);
    let tcp = reunite_plain(codec)?;
    let stream = tls.handshake(tcp, "Control channel", limit).await?;
    Ok(FtpCodec::from_tls(stream, peer, limit))
}

/// Reunite the read + write halves back into a `TcpStream`.
/// Only works when both halves are `Plain`.
fn reunite_plain(codec: FtpCodec) -> FtpResult<TcpStream> {
    let rd = match codec.reader {
        ReadHalf::Plain(br) => br.into_inner(),
        ReadHalf::Tls(_) => return Err(FtpError::protocol_error("Cannot upgrade: connection is already TLS")),
    };
    let wr = match codec.writer {
        WriteHalf::Plain(w) => w,
        WriteHalf::Tls(_) => return Err(FtpError::protocol_error("Cannot upgrade: connection is already TLS")),
    };
    rd.reunite(wr)
        .map_err(|e| FtpError::protocol_error(format!("Reunite failed: {}", e)))
}

/// Wrap a passive data connection (PROT P).
pub async fn wrap_data_stream(
    tcp: TcpStream,
    tls: &FtpsTls,
    limit: std::time::Duration,
) -> FtpResult<TlsStream<TcpStream>> {
    tls.handshake(tcp, "Data channel", limit)
        .await
        .map_err(|e| FtpError::data_channel(e.message))
}

// ─── Certificate verifier ────────────────────────────────────────────

/// Accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

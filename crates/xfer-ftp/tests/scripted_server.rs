//! Drives the FTP client and driver against a scripted in-process server.

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use xfer_core::{DiagnosticPipeline, DiagnosticRequest, PipelineSettings, Protocol, StageKey};
use xfer_ftp::{FtpClient, FtpConnectionConfig, FtpDriver, FtpErrorKind};

const LIST_BODY: &str = "total 2\r\n\
    drwxr-xr-x 2 ftp ftp 4096 Jan  1 12:00 .\r\n\
    drwxr-xr-x 2 ftp ftp 4096 Jan  1 12:00 ..\r\n\
    -rw-r--r-- 1 ftp ftp   10 Jan  1 12:00 a.txt\r\n\
    drwxr-xr-x 2 ftp ftp 4096 Jan  1 12:00 inbox\r\n";

const MLSD_BODY: &str = "type=cdir;modify=20260101000000; .\r\n\
    type=file;size=3;modify=20260101000000; x.bin\r\n\
    type=file;size=4;modify=20260101000000; y.bin\r\n\
    type=dir;modify=20260101000000; z\r\n";

#[derive(Clone)]
struct Script {
    password: &'static str,
    epsv: bool,
    mlsd: bool,
    /// Reply to `CWD /`. A 421 also closes the control channel.
    root_reply: Option<&'static str>,
    /// Accept `AUTH TLS` with this acceptor; otherwise it is refused.
    tls: Option<TlsAcceptor>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            password: "secret",
            epsv: true,
            mlsd: false,
            root_reply: None,
            tls: None,
        }
    }
}

type Transcript = Arc<Mutex<Vec<String>>>;

async fn spawn_server(script: Script) -> (SocketAddr, Transcript) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let transcript: Transcript = Arc::new(Mutex::new(Vec::new()));
    let log = transcript.clone();
    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            tokio::spawn(serve(sock, script.clone(), log.clone()));
        }
    });
    (addr, transcript)
}

fn self_signed_acceptor() -> TlsAcceptor {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let chain = vec![CertificateDer::from(cert.serialize_der().unwrap())];
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));
    let config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

async fn bind_data() -> (TcpListener, u16) {
    let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = l.local_addr().unwrap().port();
    (l, port)
}

async fn read_command<S: AsyncRead + AsyncWrite + Unpin>(ctrl: &mut BufReader<S>, log: &Transcript) -> Option<String> {
    let mut buf = String::new();
    match ctrl.read_line(&mut buf).await {
        Ok(n) if n > 0 => {
            let line = buf.trim_end_matches(['\r', '\n']).to_string();
            log.lock().unwrap().push(line.clone());
            Some(line)
        }
        _ => None,
    }
}

async fn serve(sock: TcpStream, script: Script, log: Transcript) {
    let mut ctrl = BufReader::new(sock);
    if ctrl.write_all(b"220-scripted server\r\n220 ready\r\n").await.is_err() {
        return;
    }
    let Some(acceptor) = script.tls.clone() else {
        return serve_commands(ctrl, script, log, None).await;
    };

    // Explicit FTPS: the client's first command is AUTH TLS.
    match read_command(&mut ctrl, &log).await {
        Some(line) if line.eq_ignore_ascii_case("AUTH TLS") => {}
        _ => return,
    }
    if ctrl.write_all(b"234 Proceed with negotiation.\r\n").await.is_err() {
        return;
    }
    let Ok(tls) = acceptor.accept(ctrl.into_inner()).await else {
        return;
    };
    serve_commands(BufReader::new(tls), script, log, Some(acceptor)).await;
}

async fn send_body<S: AsyncWrite + Unpin>(mut conn: S, body: &str) {
    conn.write_all(body.as_bytes()).await.unwrap();
    conn.shutdown().await.ok();
}

async fn serve_commands<S: AsyncRead + AsyncWrite + Unpin>(
    mut ctrl: BufReader<S>,
    script: Script,
    log: Transcript,
    data_tls: Option<TlsAcceptor>,
) {
    let mut data: Option<TcpListener> = None;

    while let Some(line) = read_command(&mut ctrl, &log).await {
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        let reply = match verb.as_str() {
            "PBSZ" => "200 PBSZ=0".to_string(),
            "PROT" => "200 Protection level set to P".to_string(),
            "USER" => "331 Password required".to_string(),
            "PASS" if arg == script.password => "230 Logged in".to_string(),
            "PASS" => "530 Login incorrect.".to_string(),
            "FEAT" if script.mlsd => "211-Features:\r\n MLSD\r\n EPSV\r\n211 End".to_string(),
            "FEAT" => "211-Features:\r\n EPSV\r\n211 End".to_string(),
            "TYPE" => "200 Type set to I".to_string(),
            "CWD" if arg == "/" && script.root_reply.is_some() => {
                let reply = script.root_reply.unwrap_or_default();
                if reply.starts_with("421") {
                    let _ = ctrl.write_all(format!("{}\r\n", reply).as_bytes()).await;
                    let _ = ctrl.flush().await;
                    return;
                }
                reply.to_string()
            }
            "CWD" if arg == "/missing" => "550 /missing: No such file or directory".to_string(),
            "CWD" => "250 Directory successfully changed".to_string(),
            "EPSV" if !script.epsv => "500 EPSV not understood".to_string(),
            "EPSV" => {
                let (l, port) = bind_data().await;
                data = Some(l);
                format!("229 Entering Extended Passive Mode (|||{}|)", port)
            }
            "PASV" => {
                let (l, port) = bind_data().await;
                data = Some(l);
                format!("227 Entering Passive Mode (127,0,0,1,{},{})", port / 256, port % 256)
            }
            "LIST" | "MLSD" => match data.take() {
                None => "425 Use PASV or EPSV first".to_string(),
                Some(listener) => {
                    if ctrl.write_all(b"150 Here comes the listing\r\n").await.is_err() || ctrl.flush().await.is_err() {
                        return;
                    }
                    let (conn, _) = listener.accept().await.unwrap();
                    let body = if verb == "MLSD" { MLSD_BODY } else { LIST_BODY };
                    match &data_tls {
                        Some(acceptor) => send_body(acceptor.accept(conn).await.unwrap(), body).await,
                        None => send_body(conn, body).await,
                    }
                    "226 Transfer complete".to_string()
                }
            },
            "QUIT" => {
                let _ = ctrl.write_all(b"221 Goodbye\r\n").await;
                let _ = ctrl.flush().await;
                return;
            }
            _ => "502 Command not implemented".to_string(),
        };
        if ctrl.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() || ctrl.flush().await.is_err() {
            return;
        }
    }
}

fn config(addr: SocketAddr, password: &str) -> FtpConnectionConfig {
    let mut cfg = FtpConnectionConfig::new("127.0.0.1", addr.port());
    cfg.username = "alice".into();
    cfg.password = SecretString::new(password.into());
    cfg.timeout = Duration::from_secs(5);
    cfg
}

fn request(addr: SocketAddr, password: &str, path: Option<&str>) -> DiagnosticRequest {
    let mut req = DiagnosticRequest::new(Protocol::Plain, "127.0.0.1");
    req.port = Some(addr.port());
    req.username = Some("alice".into());
    req.password = Some(SecretString::new(password.into()));
    req.path = path.map(str::to_string);
    req
}

fn pipeline() -> DiagnosticPipeline {
    DiagnosticPipeline::new(Arc::new(FtpDriver::new(false)), PipelineSettings::default())
}

/// Explicit-FTPS request against a server with a self-signed certificate.
fn ftps(addr: SocketAddr) -> (DiagnosticPipeline, DiagnosticRequest) {
    let mut req = request(addr, "secret", None);
    req.protocol = Protocol::SecurePlain;
    let pipeline = DiagnosticPipeline::new(Arc::new(FtpDriver::new(true)), PipelineSettings::default());
    (pipeline, req)
}

fn position(seen: &[String], line: &str) -> usize {
    seen.iter()
        .position(|l| l == line)
        .unwrap_or_else(|| panic!("{line} not sent: {seen:?}"))
}

// ── client ───────────────────────────────────────────────────────────

#[tokio::test]
async fn client_logs_in_and_lists_over_epsv() {
    let (addr, transcript) = spawn_server(Script::default()).await;
    let mut client = FtpClient::connect(&config(addr, "secret")).await.unwrap();
    assert_eq!(client.list().await.unwrap(), ["a.txt", "inbox"]);
    client.quit().await.unwrap();

    let seen = transcript.lock().unwrap().clone();
    assert!(seen.iter().any(|l| l == "EPSV"));
    assert!(seen.iter().any(|l| l == "LIST"));
    assert!(seen.iter().any(|l| l == "TYPE I"));
    assert_eq!(seen.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn client_falls_back_to_pasv() {
    let (addr, transcript) = spawn_server(Script {
        epsv: false,
        ..Script::default()
    })
    .await;
    let mut client = FtpClient::connect(&config(addr, "secret")).await.unwrap();
    assert_eq!(client.list().await.unwrap().len(), 2);
    let seen = transcript.lock().unwrap().clone();
    let epsv = seen.iter().position(|l| l == "EPSV").unwrap();
    let pasv = seen.iter().position(|l| l == "PASV").unwrap();
    assert!(epsv < pasv);
}

#[tokio::test]
async fn client_prefers_mlsd_when_advertised() {
    let (addr, transcript) = spawn_server(Script {
        mlsd: true,
        ..Script::default()
    })
    .await;
    let mut client = FtpClient::connect(&config(addr, "secret")).await.unwrap();
    assert_eq!(client.list().await.unwrap(), ["x.bin", "y.bin", "z"]);
    assert!(transcript.lock().unwrap().iter().any(|l| l == "MLSD"));
}

#[tokio::test]
async fn client_reports_rejected_login() {
    let (addr, _) = spawn_server(Script::default()).await;
    let err = FtpClient::connect(&config(addr, "wrong")).await.err().unwrap();
    assert_eq!(err.kind, FtpErrorKind::AuthFailed);
    assert_eq!(err.code, Some(530));
    assert!(err.message.contains("530"));
}

// ── pipeline through the FTP driver ──────────────────────────────────

#[tokio::test]
async fn pipeline_succeeds_against_scripted_server() {
    let (addr, transcript) = spawn_server(Script::default()).await;
    let report = pipeline().run(&request(addr, "secret", None)).await;

    assert!(report.ok, "{report:?}");
    assert_eq!(report.stages.len(), 4);
    assert_eq!(
        report.stages[3].details.as_ref().unwrap().get("count"),
        Some(&serde_json_value(2))
    );
    assert_eq!(report.tested_path, None);
    let seen = transcript.lock().unwrap().clone();
    assert!(seen.iter().any(|l| l == "CWD /"));
    assert!(seen.iter().any(|l| l == "QUIT"));
}

#[tokio::test]
async fn pipeline_stops_at_credential_on_530() {
    let (addr, transcript) = spawn_server(Script::default()).await;
    let report = pipeline().run(&request(addr, "wrong", Some("/incoming"))).await;

    assert!(!report.ok);
    assert_eq!(report.stages.len(), 3);
    let failed = &report.stages[2];
    assert_eq!(failed.key, StageKey::Credential);
    assert!(!failed.ok);
    assert!(failed.message.contains("530"));
    assert_eq!(report.help_link.as_deref(), Some("/errors/530-login-incorrect"));
    assert!(!transcript.lock().unwrap().iter().any(|l| l.starts_with("CWD")));
}

#[tokio::test]
async fn pipeline_reports_missing_directory_on_enumeration() {
    let (addr, transcript) = spawn_server(Script::default()).await;
    let report = pipeline().run(&request(addr, "secret", Some("/missing"))).await;

    assert_eq!(report.stages.len(), 4);
    let failed = &report.stages[3];
    assert_eq!(failed.key, StageKey::Enumeration);
    assert!(failed.message.contains("No such file"));
    assert_eq!(report.tested_path.as_deref(), Some("/missing"));
    assert_eq!(report.help_link.as_deref(), Some("/guides/ftp-passive-mode-firewall-issues"));
    // The session is still released after the failure.
    assert!(transcript.lock().unwrap().iter().any(|l| l == "QUIT"));
}

#[tokio::test]
async fn pass_argument_reaches_server_only_once() {
    let (addr, transcript) = spawn_server(Script::default()).await;
    let _ = pipeline().run(&request(addr, "secret", None)).await;
    let passes = transcript
        .lock()
        .unwrap()
        .iter()
        .filter(|l| l.starts_with("PASS "))
        .count();
    assert_eq!(passes, 1);
}

#[tokio::test]
async fn refused_root_cwd_lists_login_directory() {
    let (addr, _) = spawn_server(Script {
        root_reply: Some("550 Permission denied"),
        ..Script::default()
    })
    .await;
    let report = pipeline().run(&request(addr, "secret", None)).await;

    assert!(report.ok, "{report:?}");
    assert_eq!(
        report.stages[3].details.as_ref().unwrap().get("count"),
        Some(&serde_json_value(2))
    );
}

#[tokio::test]
async fn dropped_connection_on_root_cwd_fails_enumeration() {
    let (addr, transcript) = spawn_server(Script {
        root_reply: Some("421 Service not available, closing control connection."),
        ..Script::default()
    })
    .await;
    let report = pipeline().run(&request(addr, "secret", None)).await;

    assert!(!report.ok);
    assert_eq!(report.stages.len(), 4);
    let failed = &report.stages[3];
    assert_eq!(failed.key, StageKey::Enumeration);
    assert!(failed.message.starts_with("421"));
    assert!(!transcript.lock().unwrap().iter().any(|l| l == "LIST"));
}

#[tokio::test]
async fn silent_greeting_reports_sub_second_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((sock, _)) = listener.accept().await {
            held.push(sock);
        }
    });
    let settings = PipelineSettings {
        session_timeout: Duration::from_millis(300),
        ..PipelineSettings::default()
    };
    let report = DiagnosticPipeline::new(Arc::new(FtpDriver::new(false)), settings)
        .run(&request(addr, "secret", None))
        .await;

    let failed = report.failed_stage().unwrap();
    assert_eq!(failed.key, StageKey::Credential);
    assert!(failed.message.ends_with("timed out after 300ms"), "{}", failed.message);
}

// ── explicit FTPS ────────────────────────────────────────────────────

#[tokio::test]
async fn rejected_auth_tls_stops_before_login() {
    let (addr, transcript) = spawn_server(Script::default()).await;
    let (pipeline, req) = ftps(addr);
    let report = pipeline.run(&req).await;

    assert!(!report.ok);
    assert_eq!(report.stages.len(), 3);
    let failed = &report.stages[2];
    assert_eq!(failed.key, StageKey::Credential);
    assert!(failed.message.contains("AUTH TLS rejected"), "{}", failed.message);
    let seen = transcript.lock().unwrap().clone();
    assert_eq!(seen.first().map(String::as_str), Some("AUTH TLS"));
    assert!(!seen.iter().any(|l| l.starts_with("USER")));
}

#[tokio::test]
async fn ftps_upgrade_lists_over_protected_data_channel() {
    let (addr, transcript) = spawn_server(Script {
        tls: Some(self_signed_acceptor()),
        ..Script::default()
    })
    .await;
    let (pipeline, req) = ftps(addr);
    let report = pipeline.run(&req).await;

    assert!(report.ok, "{report:?}");
    assert_eq!(report.protocol, Protocol::SecurePlain);
    assert_eq!(
        report.stages[3].details.as_ref().unwrap().get("count"),
        Some(&serde_json_value(2))
    );
    let seen = transcript.lock().unwrap().clone();
    assert_eq!(position(&seen, "AUTH TLS"), 0);
    assert!(position(&seen, "PBSZ 0") < position(&seen, "PROT P"));
    assert!(position(&seen, "PROT P") < position(&seen, "USER alice"));
    assert!(seen.iter().any(|l| l == "LIST"));
}

fn serde_json_value(n: u64) -> serde_json::Value {
    serde_json::Value::from(n)
}

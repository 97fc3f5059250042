//! Name-resolution and transport probes.
//!
//! Each probe appends exactly one [`StageResult`] to `stages` and reports
//! whether the pipeline may continue.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use crate::types::{StageDetails, StageKey, StageResult};

/// Resolve `host` and return the first address.
///
/// Literal IPs resolve immediately. The lookup is bounded by `timeout`.
pub async fn probe_dns(host: &str, timeout: Duration, stages: &mut Vec<StageResult>) -> Option<IpAddr> {
    let t = Instant::now();
    let outcome = tokio::time::timeout(timeout, lookup_host((host, 0))).await;
    let error = match outcome {
        Ok(Ok(mut addrs)) => match addrs.next() {
            Some(addr) => {
                let ip = addr.ip();
                debug!(host, %ip, "name resolved");
                stages.push(
                    StageResult::passed(StageKey::NameResolution, t.elapsed(), format!("DNS resolved to {ip}"))
                        .with_details(StageDetails::resolved(ip)),
                );
                return Some(ip);
            }
            None => format!("no addresses returned for {host}"),
        },
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("lookup timed out after {timeout:?}"),
    };
    stages.push(StageResult::failed(
        StageKey::NameResolution,
        Some(t.elapsed()),
        format!("DNS resolution failed: {error}"),
    ));
    None
}

/// Open a TCP connection to `addr` and close it straight away.
///
/// `host` is only used for the stage message.
pub async fn probe_tcp(host: &str, addr: SocketAddr, timeout: Duration, stages: &mut Vec<StageResult>) -> bool {
    let t = Instant::now();
    let port = addr.port();
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(mut stream)) => {
            let elapsed = t.elapsed();
            // Close before recording; a failed shutdown does not matter here.
            let _ = stream.shutdown().await;
            stages.push(StageResult::passed(
                StageKey::Transport,
                elapsed,
                format!("TCP connection succeeded on {host}:{port}"),
            ));
            true
        }
        Ok(Err(e)) => {
            debug!(host, port, kind = ?e.kind(), "transport probe failed");
            stages.push(StageResult::failed(StageKey::Transport, Some(t.elapsed()), e.to_string()));
            false
        }
        Err(_) => {
            stages.push(StageResult::failed(
                StageKey::Transport,
                Some(t.elapsed()),
                format!("TCP connect to {host}:{port} timed out after {timeout:?}"),
            ));
            false
        }
    }
}

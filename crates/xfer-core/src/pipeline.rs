//! The staged diagnostic pipeline.
//!
//! Stages run in [`StageKey::ORDER`] and the run stops at the first failure,
//! so a report's stages are always a prefix of that order ending in at most
//! one failing entry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::classify::{resolution_tips, session_tips, transport_tips, PatternTable, SessionFailureClass};
use crate::driver::{RemoteSession, SessionDriver, SessionError, SessionTarget};
use crate::help::resolve_help_link;
use crate::probes::{probe_dns, probe_tcp};
use crate::types::{millis, DiagnosticReport, DiagnosticRequest, Protocol, StageDetails, StageKey, StageResult};

/// Timeouts and classifier vocabularies.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Bound for name resolution and the transport probe.
    pub connect_timeout: Duration,
    /// Bound for each session step (open, list, close).
    pub session_timeout: Duration,
    pub patterns: Arc<PatternTable>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            session_timeout: Duration::from_secs(10),
            patterns: Arc::new(PatternTable::default()),
        }
    }
}

/// How the session half of a run ended.
enum SessionOutcome {
    Completed,
    Failed(SessionFailureClass),
}

pub struct DiagnosticPipeline {
    driver: Arc<dyn SessionDriver>,
    settings: PipelineSettings,
}

impl DiagnosticPipeline {
    pub fn new(driver: Arc<dyn SessionDriver>, settings: PipelineSettings) -> Self {
        Self { driver, settings }
    }

    /// Run every stage against the endpoint described by `request`.
    ///
    /// Never fails: every problem becomes a failing stage in the report.
    pub async fn run(&self, request: &DiagnosticRequest) -> DiagnosticReport {
        let start = Instant::now();
        let protocol = request.protocol;
        let port = request.effective_port();
        let mut stages: Vec<StageResult> = Vec::with_capacity(StageKey::ORDER.len());

        let Some(address) = probe_dns(&request.host, self.settings.connect_timeout, &mut stages).await else {
            return self.finish(request, stages, resolution_tips(), None, start);
        };

        let socket = SocketAddr::new(address, port);
        if !probe_tcp(&request.host, socket, self.settings.connect_timeout, &mut stages).await {
            let tips = stages
                .last()
                .map(|s| transport_tips(protocol, &s.message))
                .unwrap_or_default();
            return self.finish(request, stages, tips, None, start);
        }

        let target = SessionTarget::from_request(request, self.settings.session_timeout);
        match self.run_session(protocol, &target, &mut stages).await {
            SessionOutcome::Completed => self.finish(request, stages, Vec::new(), None, start),
            SessionOutcome::Failed(class) => {
                let tips = session_tips(protocol, class);
                self.finish(request, stages, tips, Some(class), start)
            }
        }
    }

    async fn run_session(
        &self,
        protocol: Protocol,
        target: &SessionTarget,
        stages: &mut Vec<StageResult>,
    ) -> SessionOutcome {
        let limit = self.settings.session_timeout;

        let t = Instant::now();
        let opened = timeout(limit, self.driver.open(target))
            .await
            .unwrap_or_else(|_| Err(SessionError::timed_out("authentication", limit)));
        let mut session = match opened {
            Ok(session) => session,
            Err(e) => {
                return self.record_session_failure(protocol, StageKey::Credential, t.elapsed(), e, stages);
            }
        };
        stages.push(StageResult::passed(StageKey::Credential, t.elapsed(), "Authenticated successfully"));

        let t = Instant::now();
        let listed = timeout(limit, session.list(target.path.as_deref()))
            .await
            .unwrap_or_else(|_| Err(SessionError::timed_out("directory listing", limit)));
        let elapsed = t.elapsed();
        release(session.as_mut(), limit).await;

        match listed {
            Ok(count) => {
                stages.push(
                    StageResult::passed(
                        StageKey::Enumeration,
                        elapsed,
                        format!("Directory listing succeeded ({count} items)"),
                    )
                    .with_details(StageDetails::listed(count)),
                );
                SessionOutcome::Completed
            }
            Err(e) => self.record_session_failure(protocol, StageKey::Enumeration, elapsed, e, stages),
        }
    }

    /// The stage is positional: a failure before authentication completed is
    /// a credential failure whatever the text says. The heuristic category
    /// only drives tips and the help link.
    fn record_session_failure(
        &self,
        protocol: Protocol,
        stage: StageKey,
        elapsed: Duration,
        error: SessionError,
        stages: &mut Vec<StageResult>,
    ) -> SessionOutcome {
        let class = self.settings.patterns.classify(protocol, &error.message);
        debug!(stage = stage.as_str(), category = class.as_str(), "session stage failed");
        stages.push(
            StageResult::failed(stage, Some(elapsed), error.message)
                .with_details(StageDetails::category(class.as_str())),
        );
        SessionOutcome::Failed(class)
    }

    fn finish(
        &self,
        request: &DiagnosticRequest,
        stages: Vec<StageResult>,
        tips: Vec<String>,
        class: Option<SessionFailureClass>,
        start: Instant,
    ) -> DiagnosticReport {
        let ok = stages.len() == StageKey::ORDER.len() && stages.iter().all(|s| s.ok);
        let help_link = stages.iter().find(|s| !s.ok).and_then(|failed| {
            let stage = class.map(SessionFailureClass::stage).unwrap_or(failed.key);
            resolve_help_link(request.protocol, stage, &failed.message).map(str::to_string)
        });
        let report = DiagnosticReport {
            ok,
            protocol: request.protocol,
            host: request.host.clone(),
            port: request.effective_port(),
            tested_path: request.protocol.tested_path(request.path.as_deref()),
            total_elapsed_ms: millis(start.elapsed()),
            stages,
            tips,
            help_link,
        };
        info!(
            protocol = report.protocol.as_str(),
            ok = report.ok,
            stages = report.stages.len(),
            total_ms = report.total_elapsed_ms,
            "diagnostic finished"
        );
        report
    }
}

/// Release a session, bounded by `limit`. Failures are logged and dropped.
async fn release(session: &mut dyn RemoteSession, limit: Duration) {
    match timeout(limit, session.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "session cleanup failed"),
        Err(_) => debug!("session cleanup timed out"),
    }
}

//! # xfer-core
//!
//! Staged health-check engine for remote file-transfer endpoints.
//!
//! - **types**: request, stage and report model
//! - **probes**: name-resolution and transport probes
//! - **driver**: the session-driver seam implemented by the protocol crates
//! - **classify**: failure classification, tips, boundary fallback
//! - **help**: documentation links for failing stages
//! - **pipeline**: the ordered, halt-on-failure runner

pub mod classify;
pub mod driver;
pub mod help;
pub mod pipeline;
pub mod probes;
pub mod types;

pub use classify::{
    classify_boundary_failure, classify_session_failure, BoundaryError, Fallback, PatternError, PatternTable,
    SessionFailureClass,
};
pub use driver::{RemoteSession, SessionDriver, SessionError, SessionTarget};
pub use help::resolve_help_link;
pub use pipeline::{DiagnosticPipeline, PipelineSettings};
pub use types::{
    Credentials, DiagnosticReport, DiagnosticRequest, Protocol, StageDetails, StageKey, StageResult,
};

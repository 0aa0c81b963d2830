//! spec-propagator core library
//!
//! Applies one specification document to many website repositories: each
//! selected site is cloned, shown to a code-editing model, validated and
//! committed back to its default branch.

pub mod context;
pub mod domain;
pub mod edit;
pub mod git;
pub mod orchestrator;
pub mod publisher;
pub mod registry;
pub mod report;
pub mod retry;
pub mod telemetry;
pub mod validator;
pub mod workspace;

pub use context::{ContextBudget, ContextBuilder, ContextFile, EditContext};

pub use domain::{
    Credentials, DiffSummary, EditAction, EditParseError, FileChangeKind, FileDiffStat,
    PropagatorError, ProposedEdit, PublishError, RepoId, Result, RunConfiguration, SiteOutcome,
    SiteRecord, SiteStatus, SiteTask, TaskState, DEFAULT_MAX_CONCURRENCY,
};

pub use edit::{parse_response, render_prompt, EditEngine, EditEngineConfig, EditError};

pub use orchestrator::{SiteOrchestrator, StopHandle};

pub use publisher::{spec_revision, PublishResult, Publisher};

pub use registry::{JsonFileRegistry, SiteRegistry};

pub use report::RunReport;

pub use retry::RetryPolicy;

pub use telemetry::{init_tracing, run_log_path};

pub use validator::{
    ChangeValidator, DenyRule, ProtectedKind, ValidationPolicy, ValidationVerdict, Violation,
};

pub use workspace::{RemoteLocator, Workspace, WorkspaceLeases, WorkspaceManager};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

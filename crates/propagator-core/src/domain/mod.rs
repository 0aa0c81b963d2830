//! Domain model for the propagation pipeline.

pub mod config;
pub mod edit;
pub mod error;
pub mod outcome;
pub mod site;
pub mod task;

pub use config::{Credentials, RunConfiguration, DEFAULT_MAX_CONCURRENCY};
pub use edit::{EditAction, ProposedEdit};
pub use error::{EditParseError, PropagatorError, PublishError, Result};
pub use outcome::{DiffSummary, FileChangeKind, FileDiffStat, SiteOutcome, SiteStatus};
pub use site::{RepoId, SiteRecord};
pub use task::{SiteTask, TaskState};

//! Site orchestrator: drives one pipeline task per selected site.
//!
//! Tasks run on a bounded worker pool (a semaphore of `max_concurrency`
//! permits). Each task owns its workspace outright; the only cross-task
//! write is the single append of its outcome to the shared result list.
//! Per-site errors become `Failed` outcomes and never abort siblings.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{error, info, instrument, warn};

use crate::context::ContextBuilder;
use crate::domain::config::RunConfiguration;
use crate::domain::error::{PropagatorError, Result};
use crate::domain::outcome::{SiteOutcome, SiteStatus};
use crate::domain::site::SiteRecord;
use crate::domain::task::{SiteTask, TaskState};
use crate::edit::{EditEngine, EditError};
use crate::publisher::{PublishResult, Publisher};
use crate::report::RunReport;
use crate::retry::{retry_transient, RetryPolicy};
use crate::validator::ChangeValidator;
use crate::workspace::{Workspace, WorkspaceLeases, WorkspaceManager};

/// Note recorded for sites that never started because the run was stopped.
pub const STOPPED_NOTE: &str = "run stopped before this site started";

/// Global stop signal. Tripping it keeps queued sites from starting;
/// sites already in flight run to a terminal state.
///
/// A stop is permanent: every later run of the same orchestrator skips all
/// of its sites. Build a new orchestrator to start over.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The per-site stages, shared read-only by every task of a run.
#[derive(Debug, Clone)]
struct SitePipeline {
    workspaces: WorkspaceManager,
    context: ContextBuilder,
    engine: EditEngine,
    validator: ChangeValidator,
    retry: RetryPolicy,
}

/// Runs the propagation pipeline across a set of sites.
#[derive(Debug)]
pub struct SiteOrchestrator {
    pipeline: SitePipeline,
    leases: WorkspaceLeases,
    stop: StopHandle,
}

impl SiteOrchestrator {
    pub fn new(workspaces: WorkspaceManager, engine: EditEngine, validator: ChangeValidator) -> Self {
        Self {
            pipeline: SitePipeline {
                workspaces,
                context: ContextBuilder::default(),
                engine,
                validator,
                retry: RetryPolicy::default(),
            },
            leases: WorkspaceLeases::new(),
            stop: StopHandle::new(),
        }
    }

    pub fn with_context_builder(mut self, context: ContextBuilder) -> Self {
        self.pipeline.context = context;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.pipeline.retry = retry;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Repositories currently checked out by this orchestrator.
    pub fn leases(&self) -> &WorkspaceLeases {
        &self.leases
    }

    /// Enabled sites, narrowed to the configured filter if any.
    ///
    /// A filter matching no enabled site and duplicate repositories are
    /// configuration errors.
    pub fn select_sites(sites: &[SiteRecord], config: &RunConfiguration) -> Result<Vec<SiteRecord>> {
        let mut seen = HashSet::new();
        for site in sites {
            if !seen.insert(&site.repo) {
                return Err(PropagatorError::Configuration(format!(
                    "site {} is listed more than once",
                    site.repo
                )));
            }
        }

        let selected: Vec<SiteRecord> = sites
            .iter()
            .filter(|s| s.enabled)
            .filter(|s| config.site_filter.as_ref().map_or(true, |f| &s.repo == f))
            .cloned()
            .collect();

        if let Some(filter) = &config.site_filter {
            if selected.is_empty() {
                return Err(PropagatorError::Configuration(format!(
                    "site {filter} is not an enabled site in the registry"
                )));
            }
        }
        Ok(selected)
    }

    /// Process every selected site and return one outcome per site.
    ///
    /// Fails only on configuration errors, before any task starts.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        sites: &[SiteRecord],
        config: Arc<RunConfiguration>,
        specification: Arc<str>,
    ) -> Result<RunReport> {
        config.validate()?;
        let selected = Self::select_sites(sites, &config)?;

        let run_id = uuid::Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        let publisher = Arc::new(Publisher::new(&specification));

        info!(
            sites = selected.len(),
            max_concurrency = config.max_concurrency,
            dry_run = config.dry_run,
            spec_revision = publisher.revision(),
            "Starting propagation run"
        );

        let pipeline = Arc::new(self.pipeline.clone());
        let results: Arc<Mutex<Vec<SiteOutcome>>> =
            Arc::new(Mutex::new(Vec::with_capacity(selected.len())));
        let sem = Arc::new(Semaphore::new(config.max_concurrency));

        let mut handles = Vec::with_capacity(selected.len());
        for site in selected.iter().cloned() {
            let pipeline = Arc::clone(&pipeline);
            let publisher = Arc::clone(&publisher);
            let results = Arc::clone(&results);
            let sem = Arc::clone(&sem);
            let config = Arc::clone(&config);
            let specification = Arc::clone(&specification);
            let leases = self.leases.clone();
            let stop = self.stop.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let mut task = SiteTask::new(site, specification);

                let outcome = if stop.is_stopped() {
                    task.advance(TaskState::Skipped);
                    SiteOutcome::skipped(&task.site, STOPPED_NOTE)
                } else {
                    process_site(&pipeline, &publisher, &leases, &mut task, &config).await
                };

                results.lock().await.push(outcome);
            });
            handles.push(handle);
        }

        let joined = futures::future::join_all(handles).await;
        for (site, joined) in selected.iter().zip(joined) {
            if let Err(e) = joined {
                error!(repo = %site.repo, error = %e, "Site task aborted");
                results
                    .lock()
                    .await
                    .push(SiteOutcome::failed(site, "task", format!("site task aborted: {e}")));
            }
        }

        let outcomes = std::mem::take(&mut *results.lock().await);
        debug_assert_eq!(outcomes.len(), selected.len());

        let report = RunReport::new(
            run_id,
            started_at,
            config.dry_run,
            publisher.revision(),
            outcomes,
        );
        info!(
            succeeded = report.count(SiteStatus::Succeeded),
            dry_run = report.count(SiteStatus::DryRunPreview),
            skipped = report.count(SiteStatus::Skipped),
            failed = report.count(SiteStatus::Failed),
            "Propagation run finished"
        );
        Ok(report)
    }
}

/// Run one site from `Pending` to a terminal state.
#[instrument(skip_all, fields(repo = %task.site.repo, task_id = %task.id))]
async fn process_site(
    pipeline: &SitePipeline,
    publisher: &Publisher,
    leases: &WorkspaceLeases,
    task: &mut SiteTask,
    config: &RunConfiguration,
) -> SiteOutcome {
    let started = Instant::now();

    let outcome = match leases.lease(&task.site.repo, task.id) {
        Ok(_lease) => {
            task.advance(TaskState::Cloning);
            match pipeline.workspaces.acquire(&task.site).await {
                Ok(workspace) => {
                    let outcome =
                        run_stages(pipeline, publisher, task, &workspace, config)
                            .await;
                    if let Err(e) = workspace.release() {
                        warn!(error = %e, "Workspace cleanup failed");
                    }
                    outcome
                }
                Err(e) => fail(task, e, 0),
            }
        }
        Err(e) => fail(task, e, 0),
    };

    info!(status = %outcome.status, attempts = outcome.edit_attempts, "Site finished");
    outcome.with_duration_ms(started.elapsed().as_millis() as u64)
}

async fn run_stages(
    pipeline: &SitePipeline,
    publisher: &Publisher,
    task: &mut SiteTask,
    workspace: &Workspace,
    config: &RunConfiguration,
) -> SiteOutcome {
    task.advance(TaskState::BuildingContext);
    let context = match pipeline
        .context
        .build(workspace, &task.site.display_name, &task.specification)
    {
        Ok(context) => context,
        Err(e) => return fail(task, e, 0),
    };

    task.advance(TaskState::Editing);
    let attempted = retry_transient(
        &pipeline.retry,
        EditError::is_transient,
        |e: &EditError| match e {
            EditError::Provider(p) => p.retry_after(),
            EditError::Parse(_) => None,
        },
        |_| task.advance(TaskState::Editing),
        |_| pipeline.engine.propose(&context, &pipeline.validator),
    )
    .await;
    let attempts = attempted.attempts;
    let edits = match attempted.result {
        Ok(edits) => edits,
        Err(e) => return fail(task, e.into(), attempts),
    };

    task.advance(TaskState::Validating);
    let verdict = pipeline.validator.validate(workspace, &edits);
    if !verdict.passed {
        let note = verdict.summary();
        info!(reason = %note, "Edit set rejected, skipping site");
        task.advance(TaskState::Skipped);
        return SiteOutcome::skipped(&task.site, note).with_attempts(attempts);
    }

    task.advance(TaskState::Publishing);
    match publisher.publish(workspace, &edits, config).await {
        Ok(PublishResult::Committed { commit_sha, diff }) => {
            task.advance(TaskState::Succeeded);
            SiteOutcome::succeeded(&task.site, commit_sha, diff).with_attempts(attempts)
        }
        Ok(PublishResult::DryRun { diff }) => {
            task.advance(TaskState::Succeeded);
            SiteOutcome::dry_run(&task.site, diff).with_attempts(attempts)
        }
        Ok(PublishResult::NoChanges) => {
            task.advance(TaskState::Skipped);
            SiteOutcome::skipped(&task.site, "no changes to commit").with_attempts(attempts)
        }
        Err(e) => fail(task, e.into(), attempts),
    }
}

fn fail(task: &mut SiteTask, err: PropagatorError, attempts: u32) -> SiteOutcome {
    let message = err.to_string();
    error!(kind = err.kind(), error = %message, state = ?task.state, "Site failed");
    task.fail(message.clone());
    SiteOutcome::failed(&task.site, err.kind(), message).with_attempts(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::Credentials;
    use crate::domain::site::RepoId;

    fn site(repo: &str, enabled: bool) -> SiteRecord {
        SiteRecord::new(RepoId::parse(repo).unwrap(), repo, enabled)
    }

    fn config() -> RunConfiguration {
        RunConfiguration::new(Credentials::new("t", "k"))
    }

    #[test]
    fn test_select_excludes_disabled_sites() {
        let sites = vec![site("a/one", true), site("a/two", false), site("a/three", true)];
        let selected = SiteOrchestrator::select_sites(&sites, &config()).unwrap();
        let repos: Vec<_> = selected.iter().map(|s| s.repo.as_str()).collect();
        assert_eq!(repos, vec!["a/one", "a/three"]);
    }

    #[test]
    fn test_select_honours_filter() {
        let sites = vec![site("a/one", true), site("a/two", true)];
        let cfg = config().with_site_filter(Some(RepoId::parse("a/two").unwrap()));
        let selected = SiteOrchestrator::select_sites(&sites, &cfg).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].repo.as_str(), "a/two");
    }

    #[test]
    fn test_filter_on_disabled_or_unknown_site_is_configuration_error() {
        let sites = vec![site("a/one", true), site("a/two", false)];
        for filter in ["a/two", "a/missing"] {
            let cfg = config().with_site_filter(Some(RepoId::parse(filter).unwrap()));
            let err = SiteOrchestrator::select_sites(&sites, &cfg).unwrap_err();
            assert_eq!(err.kind(), "configuration");
        }
    }

    #[test]
    fn test_duplicate_sites_rejected() {
        let sites = vec![site("a/one", true), site("a/one", false)];
        assert!(SiteOrchestrator::select_sites(&sites, &config()).is_err());
    }

    #[test]
    fn test_stop_handle_is_shared() {
        let handle = StopHandle::new();
        let other = handle.clone();
        assert!(!other.is_stopped());
        handle.stop();
        assert!(other.is_stopped());
    }
}

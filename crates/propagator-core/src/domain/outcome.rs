//! Per-site results.

use serde::{Deserialize, Serialize};

use crate::domain::site::{RepoId, SiteRecord};

/// Terminal status of one site in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    Succeeded,
    Skipped,
    Failed,
    DryRunPreview,
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SiteStatus::Succeeded => "succeeded",
            SiteStatus::Skipped => "skipped",
            SiteStatus::Failed => "failed",
            SiteStatus::DryRunPreview => "dry-run",
        };
        f.write_str(s)
    }
}

/// How one file changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Added,
    Modified,
    Deleted,
}

/// Line-level statistics for one changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiffStat {
    pub path: String,
    pub kind: FileChangeKind,
    pub insertions: usize,
    pub deletions: usize,
}

/// Summary of what a set of edits changes in a workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub files: Vec<FileDiffStat>,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn insertions(&self) -> usize {
        self.files.iter().map(|f| f.insertions).sum()
    }

    pub fn deletions(&self) -> usize {
        self.files.iter().map(|f| f.deletions).sum()
    }

    /// One-line `N files changed, +I -D` form.
    pub fn headline(&self) -> String {
        format!(
            "{} file(s) changed, +{} -{}",
            self.files.len(),
            self.insertions(),
            self.deletions()
        )
    }
}

/// Immutable result of one site task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteOutcome {
    pub repo: RepoId,
    pub display_name: String,
    pub status: SiteStatus,
    pub diff: Option<DiffSummary>,
    /// Human-readable error for `Failed`.
    pub error: Option<String>,
    /// Error kind tag for `Failed`, see [`crate::PropagatorError::kind`].
    pub error_kind: Option<String>,
    /// Why the site was skipped.
    pub note: Option<String>,
    pub commit_sha: Option<String>,
    /// Number of model invocations made for this site.
    pub edit_attempts: u32,
    pub duration_ms: u64,
}

impl SiteOutcome {
    fn base(site: &SiteRecord, status: SiteStatus) -> Self {
        Self {
            repo: site.repo.clone(),
            display_name: site.display_name.clone(),
            status,
            diff: None,
            error: None,
            error_kind: None,
            note: None,
            commit_sha: None,
            edit_attempts: 0,
            duration_ms: 0,
        }
    }

    pub fn succeeded(site: &SiteRecord, commit_sha: String, diff: DiffSummary) -> Self {
        Self {
            commit_sha: Some(commit_sha),
            diff: Some(diff),
            ..Self::base(site, SiteStatus::Succeeded)
        }
    }

    pub fn dry_run(site: &SiteRecord, diff: DiffSummary) -> Self {
        Self {
            diff: Some(diff),
            ..Self::base(site, SiteStatus::DryRunPreview)
        }
    }

    pub fn skipped(site: &SiteRecord, note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::base(site, SiteStatus::Skipped)
        }
    }

    pub fn failed(site: &SiteRecord, kind: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            error_kind: Some(kind.to_string()),
            ..Self::base(site, SiteStatus::Failed)
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.edit_attempts = attempts;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteRecord {
        SiteRecord::new(RepoId::parse("acme/site").unwrap(), "Acme", true)
    }

    #[test]
    fn test_failed_outcome_carries_error() {
        let outcome = SiteOutcome::failed(&site(), "workspace", "clone failed").with_attempts(0);
        assert_eq!(outcome.status, SiteStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("clone failed"));
        assert_eq!(outcome.error_kind.as_deref(), Some("workspace"));
        assert!(outcome.diff.is_none());
    }

    #[test]
    fn test_diff_summary_totals() {
        let diff = DiffSummary {
            files: vec![
                FileDiffStat {
                    path: "index.html".into(),
                    kind: FileChangeKind::Modified,
                    insertions: 3,
                    deletions: 1,
                },
                FileDiffStat {
                    path: "old.css".into(),
                    kind: FileChangeKind::Deleted,
                    insertions: 0,
                    deletions: 10,
                },
            ],
        };
        assert_eq!(diff.insertions(), 3);
        assert_eq!(diff.deletions(), 11);
        assert_eq!(diff.headline(), "2 file(s) changed, +3 -11");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SiteStatus::DryRunPreview).unwrap();
        assert_eq!(json, "\"dry_run_preview\"");
    }
}

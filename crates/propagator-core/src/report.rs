//! Aggregate run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::outcome::{SiteOutcome, SiteStatus};

/// Every site outcome of one run, ordered by repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub spec_revision: String,
    pub outcomes: Vec<SiteOutcome>,
}

impl RunReport {
    /// Build a report; `outcomes` may arrive in completion order.
    pub fn new(
        run_id: uuid::Uuid,
        started_at: DateTime<Utc>,
        dry_run: bool,
        spec_revision: impl Into<String>,
        mut outcomes: Vec<SiteOutcome>,
    ) -> Self {
        outcomes.sort_by(|a, b| a.repo.cmp(&b.repo));
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run,
            spec_revision: spec_revision.into(),
            outcomes,
        }
    }

    pub fn count(&self, status: SiteStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(SiteStatus::Failed) > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &SiteOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == SiteStatus::Failed)
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Plain-text summary for terminal output.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (dry run)" } else { "" };
        out.push_str(&format!(
            "Propagation summary{mode}: spec {} | {} site(s) in {:.1}s\n",
            self.spec_revision,
            self.outcomes.len(),
            self.duration_secs()
        ));

        for outcome in &self.outcomes {
            let detail = match outcome.status {
                SiteStatus::Succeeded => {
                    let sha = outcome.commit_sha.as_deref().unwrap_or("");
                    let short = &sha[..sha.len().min(10)];
                    let changes = outcome
                        .diff
                        .as_ref()
                        .map(|d| d.headline())
                        .unwrap_or_default();
                    format!("{short} {changes}")
                }
                SiteStatus::DryRunPreview => outcome
                    .diff
                    .as_ref()
                    .map(|d| d.headline())
                    .unwrap_or_default(),
                SiteStatus::Skipped => outcome.note.clone().unwrap_or_default(),
                SiteStatus::Failed => outcome.error.clone().unwrap_or_default(),
            };
            out.push_str(&format!(
                "  {:<9} {} ({}) {}\n",
                outcome.status.to_string(),
                outcome.repo,
                outcome.display_name,
                detail.trim()
            ));
        }

        out.push_str(&format!(
            "Succeeded: {}  Dry-run: {}  Skipped: {}  Failed: {}\n",
            self.count(SiteStatus::Succeeded),
            self.count(SiteStatus::DryRunPreview),
            self.count(SiteStatus::Skipped),
            self.count(SiteStatus::Failed),
        ));

        if self.has_failures() {
            out.push_str("Failures:\n");
            for failure in self.failures() {
                out.push_str(&format!(
                    "  - {} [{}]: {}\n",
                    failure.repo,
                    failure.error_kind.as_deref().unwrap_or("unknown"),
                    failure.error.as_deref().unwrap_or("no error recorded")
                ));
            }
        }
        out
    }
}

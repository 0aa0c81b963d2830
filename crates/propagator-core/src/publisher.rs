//! Publisher: applies an accepted edit set and pushes a single commit.
//!
//! In dry-run mode only the diff summary is computed; neither the working
//! tree nor the remote is touched. Push rejections surface as
//! [`PublishError::Conflict`] and are never retried or forced.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};
use tracing::{info, instrument, warn};

use crate::domain::config::RunConfiguration;
use crate::domain::edit::{EditAction, ProposedEdit};
use crate::domain::error::PublishError;
use crate::domain::outcome::{DiffSummary, FileChangeKind, FileDiffStat};
use crate::git;
use crate::workspace::Workspace;

pub const COMMIT_AUTHOR_NAME: &str = "Spec Propagator";
pub const COMMIT_AUTHOR_EMAIL: &str = "spec-propagator@automated.bot";
pub const COMMIT_SUBJECT: &str = "chore: sync with specification update";

/// Short content hash identifying a specification document.
pub fn spec_revision(specification: &str) -> String {
    let digest = Sha256::digest(specification.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// What [`Publisher::publish`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublishResult {
    Committed { commit_sha: String, diff: DiffSummary },
    /// Edits left the tree unchanged; no commit was made.
    NoChanges,
    DryRun { diff: DiffSummary },
}

/// Publishes edit sets for one specification revision.
#[derive(Debug, Clone)]
pub struct Publisher {
    revision: String,
}

impl Publisher {
    pub fn new(specification: &str) -> Self {
        Self {
            revision: spec_revision(specification),
        }
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Full commit message for `diff`.
    pub fn commit_body(&self, diff: &DiffSummary) -> String {
        let mut body = format!("Specification revision: {}\n", self.revision);
        if !diff.is_empty() {
            body.push('\n');
            for file in &diff.files {
                let kind = match file.kind {
                    FileChangeKind::Added => "added",
                    FileChangeKind::Modified => "modified",
                    FileChangeKind::Deleted => "deleted",
                };
                body.push_str(&format!("- {} ({kind})\n", file.path));
            }
        }
        body
    }

    #[instrument(skip_all, fields(repo = %workspace.repo(), dry_run = config.dry_run))]
    pub async fn publish(
        &self,
        workspace: &Workspace,
        edits: &[ProposedEdit],
        config: &RunConfiguration,
    ) -> Result<PublishResult, PublishError> {
        let diff = diff_summary(workspace, edits)?;

        if config.dry_run {
            info!(changes = %diff.headline(), "Dry run, not applying edits");
            return Ok(PublishResult::DryRun { diff });
        }

        apply_edits(workspace, edits).await?;

        let root = workspace.root();
        git::add_all(root)
            .await
            .map_err(|e| PublishError::Commit(workspace.redact(&e.to_string())))?;
        let clean = git::is_clean(root)
            .await
            .map_err(|e| PublishError::Commit(workspace.redact(&e.to_string())))?;
        if clean {
            info!("Edits produced no changes, nothing to commit");
            return Ok(PublishResult::NoChanges);
        }

        let commit_sha = git::commit(
            root,
            COMMIT_AUTHOR_NAME,
            COMMIT_AUTHOR_EMAIL,
            COMMIT_SUBJECT,
            &self.commit_body(&diff),
        )
        .await
        .map_err(|e| PublishError::Commit(workspace.redact(&e.stderr)))?;

        let branch = workspace.default_branch();
        if let Err(e) = git::push(root, branch).await {
            let detail = workspace.redact(&e.stderr);
            if git::is_push_rejection(&e.stderr) {
                warn!(branch, "Push rejected, remote has moved");
                return Err(PublishError::Conflict {
                    branch: branch.to_string(),
                    detail,
                });
            }
            return Err(PublishError::Push(detail));
        }

        info!(sha = %commit_sha, branch, changes = %diff.headline(), "Pushed commit");
        Ok(PublishResult::Committed { commit_sha, diff })
    }
}

/// Line statistics of `edits` against the current workspace contents.
///
/// Edits that would leave a file as it is are not listed.
pub fn diff_summary(
    workspace: &Workspace,
    edits: &[ProposedEdit],
) -> Result<DiffSummary, PublishError> {
    let mut files = Vec::new();
    for edit in edits {
        let current = workspace
            .read_file(&edit.path)
            .map_err(|e| PublishError::Apply {
                path: edit.path.clone(),
                reason: e.to_string(),
            })?;
        if let Some(stat) = file_stat(&edit.path, current.as_deref(), &edit.action) {
            files.push(stat);
        }
    }
    Ok(DiffSummary { files })
}

fn file_stat(path: &str, current: Option<&str>, action: &EditAction) -> Option<FileDiffStat> {
    let (kind, insertions, deletions) = match (action, current) {
        (EditAction::Replace { content }, Some(old)) if old == content => return None,
        (EditAction::Replace { content }, Some(old)) => {
            let (ins, del) = line_changes(old, content);
            (FileChangeKind::Modified, ins, del)
        }
        (EditAction::Replace { content }, None) => {
            (FileChangeKind::Added, content.lines().count(), 0)
        }
        (EditAction::Delete, Some(old)) => (FileChangeKind::Deleted, 0, old.lines().count()),
        (EditAction::Delete, None) => return None,
    };
    Some(FileDiffStat {
        path: path.to_string(),
        kind,
        insertions,
        deletions,
    })
}

fn line_changes(old: &str, new: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .fold((0, 0), |(ins, del), change| match change.tag() {
            ChangeTag::Insert => (ins + 1, del),
            ChangeTag::Delete => (ins, del + 1),
            ChangeTag::Equal => (ins, del),
        })
}

async fn apply_edits(workspace: &Workspace, edits: &[ProposedEdit]) -> Result<(), PublishError> {
    for edit in edits {
        let apply_err = |reason: String| PublishError::Apply {
            path: edit.path.clone(),
            reason,
        };
        let target = workspace
            .resolve(&edit.path)
            .map_err(|e| apply_err(e.to_string()))?;

        match &edit.action {
            EditAction::Replace { content } => {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| apply_err(e.to_string()))?;
                }
                tokio::fs::write(&target, content)
                    .await
                    .map_err(|e| apply_err(e.to_string()))?;
            }
            EditAction::Delete => match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(apply_err(e.to_string())),
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_revision_is_stable_short_hash() {
        let a = spec_revision("# Spec\nAdd analytics.\n");
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, spec_revision("# Spec\nAdd analytics.\n"));
        assert_ne!(a, spec_revision("# Spec\nRemove analytics.\n"));
    }

    #[test]
    fn test_file_stat_kinds() {
        let modified = file_stat(
            "index.html",
            Some("<html>\n<body></body>\n</html>\n"),
            &EditAction::Replace {
                content: "<html>\n<body></body>\n<script></script>\n</html>\n".into(),
            },
        )
        .unwrap();
        assert_eq!(modified.kind, FileChangeKind::Modified);
        assert_eq!((modified.insertions, modified.deletions), (1, 0));

        let added = file_stat(
            "a.css",
            None,
            &EditAction::Replace {
                content: "a{}\nb{}\n".into(),
            },
        )
        .unwrap();
        assert_eq!(added.kind, FileChangeKind::Added);
        assert_eq!(added.insertions, 2);

        let deleted = file_stat("old.js", Some("x\ny\nz\n"), &EditAction::Delete).unwrap();
        assert_eq!(deleted.kind, FileChangeKind::Deleted);
        assert_eq!(deleted.deletions, 3);
    }

    #[test]
    fn test_no_op_edits_have_no_stat() {
        let same = EditAction::Replace {
            content: "same\n".into(),
        };
        assert!(file_stat("a", Some("same\n"), &same).is_none());
        assert!(file_stat("a", None, &EditAction::Delete).is_none());
    }

    #[test]
    fn test_commit_body_names_revision_and_files() {
        let publisher = Publisher::new("spec text");
        let diff = DiffSummary {
            files: vec![FileDiffStat {
                path: "index.html".into(),
                kind: FileChangeKind::Modified,
                insertions: 1,
                deletions: 0,
            }],
        };
        let body = publisher.commit_body(&diff);
        assert!(body.contains(publisher.revision()));
        assert!(body.contains("- index.html (modified)"));
    }
}

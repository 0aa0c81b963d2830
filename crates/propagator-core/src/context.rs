//! Context builder: the bounded slice of a repository shown to the model.
//!
//! Selection is driven entirely by [`ContextBudget`]. Entry points are taken
//! first in the configured order (whatever their extension), then the remaining eligible files smallest
//! first (ties by path). A file that would exceed any cap is left out; the
//! caps are never exceeded.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::Result;
use crate::workspace::Workspace;

/// Hard limits and filters for context selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Maximum number of files included.
    pub max_files: usize,
    /// Maximum combined size of included file contents, in bytes.
    pub max_total_bytes: usize,
    /// Files larger than this are never included.
    pub max_file_bytes: u64,
    /// Extensions (with leading dot) eligible for inclusion.
    pub allowed_extensions: Vec<String>,
    /// Directory names never descended into.
    pub skip_dirs: Vec<String>,
    /// Relative paths included before anything else, in this order, even
    /// when their extension is not listed.
    pub entry_points: Vec<String>,
}

impl Default for ContextBudget {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            max_files: 40,
            max_total_bytes: 100_000,
            max_file_bytes: 50_000,
            allowed_extensions: owned(&[
                ".tsx", ".ts", ".jsx", ".js", ".css", ".html", ".json", ".md",
            ]),
            skip_dirs: owned(&["node_modules", ".git", "dist", "build", ".next", ".cache"]),
            entry_points: owned(&[
                "index.html",
                "src/main.tsx",
                "src/main.ts",
                "src/App.tsx",
                "src/App.jsx",
                "src/index.tsx",
                "src/index.js",
                "package.json",
            ]),
        }
    }
}

impl ContextBudget {
    fn extension_allowed(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match file_name.rfind('.') {
            Some(idx) if idx > 0 => {
                let ext = &file_name[idx..];
                self.allowed_extensions.iter().any(|a| a == ext)
            }
            _ => false,
        }
    }
}

/// One file shown to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

/// Everything the edit engine sends to the model for one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditContext {
    pub site_name: String,
    /// The specification document, verbatim.
    pub specification: String,
    pub files: Vec<ContextFile>,
    /// Eligible files left out because a cap was reached.
    pub omitted: Vec<String>,
}

impl EditContext {
    /// Whether `path` was part of the selected context.
    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.content.len()).sum()
    }
}

struct Candidate {
    path: String,
    size: u64,
    priority: usize,
}

/// Builds [`EditContext`]s under a fixed budget.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    budget: ContextBudget,
}

impl ContextBuilder {
    pub fn new(budget: ContextBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// Select files from `workspace` and pair them with `specification`.
    ///
    /// Fails only when the workspace itself cannot be read. Individual files
    /// that are unreadable or not UTF-8 are skipped.
    pub fn build(
        &self,
        workspace: &Workspace,
        site_name: &str,
        specification: &str,
    ) -> Result<EditContext> {
        let mut candidates = Vec::new();
        for path in workspace.list_files(&self.budget.skip_dirs)? {
            let entry_point = self.budget.entry_points.iter().position(|e| e == &path);
            if entry_point.is_none() && !self.budget.extension_allowed(&path) {
                continue;
            }
            let size = match std::fs::metadata(workspace.root().join(&path)) {
                Ok(meta) => meta.len(),
                Err(_) => continue,
            };
            if size > self.budget.max_file_bytes {
                continue;
            }
            let priority = entry_point.unwrap_or(usize::MAX);
            candidates.push(Candidate {
                path,
                size,
                priority,
            });
        }

        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.size.cmp(&b.size))
                .then_with(|| a.path.cmp(&b.path))
        });

        let mut files = Vec::new();
        let mut omitted = Vec::new();
        let mut total = 0usize;

        for candidate in candidates {
            if files.len() >= self.budget.max_files {
                omitted.push(candidate.path);
                continue;
            }
            let content = match std::fs::read_to_string(workspace.root().join(&candidate.path)) {
                Ok(content) => content,
                Err(_) => continue,
            };
            if total + content.len() > self.budget.max_total_bytes {
                omitted.push(candidate.path);
                continue;
            }
            total += content.len();
            files.push(ContextFile {
                path: candidate.path,
                content,
            });
        }

        debug!(
            repo = %workspace.repo(),
            selected = files.len(),
            omitted = omitted.len(),
            bytes = total,
            "Built edit context"
        );

        Ok(EditContext {
            site_name: site_name.to_string(),
            specification: specification.to_string(),
            files,
            omitted,
        })
    }
}

//! Repository workspaces: ephemeral, exclusively owned working copies.
//!
//! A [`Workspace`] owns a temporary directory; dropping it removes the
//! directory, so every exit path (success, error, panic, cancelled future)
//! reclaims the disk. [`WorkspaceLeases`] is the orchestrator-owned map of
//! in-flight repositories that keeps two tasks from holding the same one.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::domain::error::{PropagatorError, Result};
use crate::domain::site::{RepoId, SiteRecord};
use crate::git;

/// Where remotes live and how to authenticate against them.
#[derive(Clone)]
pub enum RemoteLocator {
    /// `https://x-access-token:<token>@<host>/<owner>/<name>.git`
    GitHub { host: String, token: String },
    /// `file://<root>/<owner>/<name>.git`, used for mirrors and tests.
    Directory(PathBuf),
}

impl RemoteLocator {
    pub fn github(token: impl Into<String>) -> Self {
        RemoteLocator::GitHub {
            host: "github.com".to_string(),
            token: token.into(),
        }
    }

    /// Clone URL for `repo`. May embed a secret; never log it.
    pub fn clone_url(&self, repo: &RepoId) -> String {
        match self {
            RemoteLocator::GitHub { host, token } => {
                format!("https://x-access-token:{token}@{host}/{repo}.git")
            }
            RemoteLocator::Directory(root) => {
                format!("file://{}", root.join(format!("{repo}.git")).display())
            }
        }
    }

    fn secret(&self) -> &str {
        match self {
            RemoteLocator::GitHub { token, .. } => token,
            RemoteLocator::Directory(_) => "",
        }
    }
}

impl fmt::Debug for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteLocator::GitHub { host, .. } => f
                .debug_struct("GitHub")
                .field("host", host)
                .field("token", &"<redacted>")
                .finish(),
            RemoteLocator::Directory(root) => f.debug_tuple("Directory").field(root).finish(),
        }
    }
}

/// A checked-out repository in a task-private temporary directory.
#[derive(Debug)]
pub struct Workspace {
    repo: RepoId,
    scratch: tempfile::TempDir,
    root: PathBuf,
    default_branch: String,
    base_sha: String,
    secret: String,
}

impl Workspace {
    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    /// Root of the working tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// Commit the workspace was cloned at.
    pub fn base_sha(&self) -> &str {
        &self.base_sha
    }

    /// Strip credentials from text produced by git in this workspace.
    pub fn redact(&self, text: &str) -> String {
        git::redact(text, &self.secret)
    }

    /// Absolute path of a workspace-relative path, rejecting escapes.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let clean = normalize_relative_path(relative).map_err(|reason| {
            PropagatorError::Workspace(format!("invalid path {relative}: {reason}"))
        })?;
        Ok(self.root.join(clean))
    }

    /// Read a tracked file as UTF-8, `None` when it does not exist.
    pub fn read_file(&self, relative: &str) -> Result<Option<String>> {
        let path = self.resolve(relative)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PropagatorError::Workspace(format!(
                "cannot read {relative}: {e}"
            ))),
        }
    }

    /// Every regular file under the root as `/`-separated relative paths,
    /// sorted, skipping any directory whose name is in `skip_dirs` and `.git`.
    pub fn list_files(&self, skip_dirs: &[String]) -> Result<Vec<String>> {
        let mut files = Vec::new();
        walk(&self.root, &self.root, skip_dirs, &mut files).map_err(|e| {
            PropagatorError::Workspace(format!(
                "cannot read workspace {}: {e}",
                self.root.display()
            ))
        })?;
        files.sort();
        Ok(files)
    }

    /// Remove the directory now instead of at drop.
    pub fn release(self) -> Result<()> {
        let path = self.scratch.path().to_path_buf();
        self.scratch.close().map_err(|e| {
            PropagatorError::Workspace(format!("cannot remove {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Workspace released");
        Ok(())
    }
}

fn walk(root: &Path, dir: &Path, skip_dirs: &[String], out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if file_type.is_dir() {
            if name == ".git" || skip_dirs.iter().any(|s| s == name.as_ref()) {
                continue;
            }
            walk(root, &entry.path(), skip_dirs, out)?;
        } else if file_type.is_file() {
            if let Ok(rel) = entry.path().strip_prefix(root) {
                let rel: Vec<_> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.push(rel.join("/"));
            }
        }
    }
    Ok(())
}

/// Normalise a model- or user-supplied relative path to `a/b/c` form.
///
/// Rejects empty, absolute and parent-escaping paths and anything inside `.git`.
pub fn normalize_relative_path(raw: &str) -> std::result::Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("path is empty".to_string());
    }
    if raw.contains('\\') {
        return Err("backslashes are not allowed".to_string());
    }

    let mut parts = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => return Err("path escapes the repository".to_string()),
            Component::RootDir | Component::Prefix(_) => {
                return Err("absolute paths are not allowed".to_string())
            }
        }
    }

    if parts.is_empty() {
        return Err("path is empty".to_string());
    }
    if parts[0] == ".git" {
        return Err("paths inside .git are not allowed".to_string());
    }
    Ok(parts.join("/"))
}

/// Acquires workspaces by shallow-cloning the default branch.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    locator: RemoteLocator,
    scratch_root: Option<PathBuf>,
}

impl WorkspaceManager {
    pub fn new(locator: RemoteLocator) -> Self {
        Self {
            locator,
            scratch_root: None,
        }
    }

    /// Create workspaces under `root` instead of the system temp directory.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Clone `site` into a fresh private directory.
    pub async fn acquire(&self, site: &SiteRecord) -> Result<Workspace> {
        let prefix = format!("propagator-{}-", site.repo.slug());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let scratch = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| PropagatorError::Workspace(format!("cannot create workspace: {e}")))?;

        let root = scratch.path().join("checkout");
        let secret = self.locator.secret().to_string();
        let url = self.locator.clone_url(&site.repo);

        info!(repo = %site.repo, "Cloning repository");
        git::clone_shallow(scratch.path(), &url, &root)
            .await
            .map_err(|e| {
                PropagatorError::Workspace(format!(
                    "clone of {} failed: {}",
                    site.repo,
                    git::redact(&e.stderr, &secret)
                ))
            })?;

        let default_branch = git::current_branch(&root).await.map_err(|e| {
            PropagatorError::Workspace(format!(
                "cannot resolve default branch of {}: {}",
                site.repo, e.stderr
            ))
        })?;
        let base_sha = git::head_sha(&root).await.map_err(|e| {
            PropagatorError::Workspace(format!(
                "{} has no commits on {default_branch}: {}",
                site.repo, e.stderr
            ))
        })?;

        debug!(repo = %site.repo, branch = %default_branch, sha = %base_sha, "Workspace ready");
        Ok(Workspace {
            repo: site.repo.clone(),
            scratch,
            root,
            default_branch,
            base_sha,
            secret,
        })
    }
}

/// In-flight repositories for one orchestrator instance.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceLeases {
    inner: Arc<Mutex<HashMap<RepoId, uuid::Uuid>>>,
}

impl WorkspaceLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `repo` for `task_id`. Fails if another task holds it.
    pub fn lease(&self, repo: &RepoId, task_id: uuid::Uuid) -> Result<WorkspaceLease> {
        let mut held = self
            .inner
            .lock()
            .map_err(|_| PropagatorError::Workspace("workspace lease map poisoned".to_string()))?;
        if let Some(owner) = held.get(repo) {
            return Err(PropagatorError::Workspace(format!(
                "{repo} is already being processed by task {owner}"
            )));
        }
        held.insert(repo.clone(), task_id);
        Ok(WorkspaceLease {
            repo: repo.clone(),
            leases: self.clone(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().map(|held| held.len()).unwrap_or(0)
    }

    pub fn is_held(&self, repo: &RepoId) -> bool {
        self.inner
            .lock()
            .map(|held| held.contains_key(repo))
            .unwrap_or(false)
    }
}

/// Releases its repository from [`WorkspaceLeases`] on drop.
#[derive(Debug)]
pub struct WorkspaceLease {
    repo: RepoId,
    leases: WorkspaceLeases,
}

impl Drop for WorkspaceLease {
    fn drop(&mut self) {
        match self.leases.inner.lock() {
            Ok(mut held) => {
                held.remove(&self.repo);
            }
            Err(_) => warn!(repo = %self.repo, "workspace lease map poisoned on release"),
        }
    }
}

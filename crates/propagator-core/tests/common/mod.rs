#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use propagator_core::{
    ChangeValidator, ContextBuilder, Credentials, EditEngine, EditEngineConfig, RemoteLocator,
    RepoId, RetryPolicy, RunConfiguration, SiteOrchestrator, SiteRecord, ValidationPolicy,
    WorkspaceManager,
};
use propagator_llm::ModelProvider;

pub const INDEX_HTML: &str = "<!doctype html>\n<html>\n<head>\n<title>Site</title>\n</head>\n<body>\n<div id=\"root\"></div>\n</body>\n</html>\n";

pub const INDEX_WITH_SCRIPT: &str = "<!doctype html>\n<html>\n<head>\n<title>Site</title>\n<script src=\"/analytics.js\"></script>\n</head>\n<body>\n<div id=\"root\"></div>\n</body>\n</html>\n";

/// Model answer replacing `index.html` with [`INDEX_WITH_SCRIPT`].
pub fn add_script_response() -> String {
    format!("Adding the analytics tag.\n--- FILE: index.html ---\n{INDEX_WITH_SCRIPT}--- END FILE ---\n")
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A directory of bare remotes laid out as `<root>/<owner>/<name>.git`.
pub struct Remotes {
    root: tempfile::TempDir,
}

impl Remotes {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn locator(&self) -> RemoteLocator {
        RemoteLocator::Directory(self.root.path().to_path_buf())
    }

    pub fn bare_path(&self, repo: &str) -> PathBuf {
        self.root.path().join(format!("{repo}.git"))
    }

    /// Create `repo` with one commit on `main` holding `files`.
    pub fn create(&self, repo: &str, files: &[(&str, &str)]) {
        let bare = self.bare_path(repo);
        std::fs::create_dir_all(&bare).unwrap();
        git(&bare, &["init", "--bare", "--quiet"]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let seed = tempfile::tempdir().unwrap();
        git(seed.path(), &["init", "--quiet"]);
        git(seed.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(seed.path(), &["config", "user.name", "Site Owner"]);
        git(seed.path(), &["config", "user.email", "owner@example.com"]);
        for (path, content) in files {
            let target = seed.path().join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(target, content).unwrap();
        }
        git(seed.path(), &["add", "--all"]);
        git(seed.path(), &["commit", "--quiet", "-m", "initial site"]);
        let bare_str = bare.to_string_lossy().to_string();
        git(seed.path(), &["push", "--quiet", &bare_str, "main"]);
    }

    /// Create a plain site with only `index.html`.
    pub fn create_site(&self, repo: &str) {
        self.create(repo, &[("index.html", INDEX_HTML)]);
    }

    /// Push a commit authored by someone else, as if made concurrently.
    pub fn push_foreign_commit(&self, repo: &str, path: &str, content: &str) {
        let work = tempfile::tempdir().unwrap();
        let url = format!("file://{}", self.bare_path(repo).display());
        git(work.path(), &["clone", "--quiet", &url, "checkout"]);
        let checkout = work.path().join("checkout");
        git(&checkout, &["config", "user.name", "Someone Else"]);
        git(&checkout, &["config", "user.email", "else@example.com"]);
        std::fs::write(checkout.join(path), content).unwrap();
        git(&checkout, &["add", "--all"]);
        git(&checkout, &["commit", "--quiet", "-m", "concurrent human edit"]);
        git(&checkout, &["push", "--quiet", "origin", "main"]);
    }

    pub fn commit_count(&self, repo: &str) -> usize {
        git(&self.bare_path(repo), &["rev-list", "--count", "main"])
            .parse()
            .unwrap()
    }

    pub fn head_subject(&self, repo: &str) -> String {
        git(&self.bare_path(repo), &["log", "-1", "--format=%s", "main"])
    }

    pub fn head_author(&self, repo: &str) -> String {
        git(&self.bare_path(repo), &["log", "-1", "--format=%an <%ae>", "main"])
    }

    /// Paths touched by the tip commit of `main`.
    pub fn head_changed_paths(&self, repo: &str) -> Vec<String> {
        git(
            &self.bare_path(repo),
            &["diff-tree", "--no-commit-id", "--name-only", "-r", "main"],
        )
        .lines()
        .map(str::to_string)
        .collect()
    }

    pub fn file_at_head(&self, repo: &str, path: &str) -> String {
        let spec = format!("main:{path}");
        let output = Command::new("git")
            .args(["show", &spec])
            .current_dir(self.bare_path(repo))
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}

pub fn site(repo: &str) -> SiteRecord {
    SiteRecord::new(RepoId::parse(repo).unwrap(), repo.replace('/', " "), true)
}

pub fn disabled_site(repo: &str) -> SiteRecord {
    SiteRecord::new(RepoId::parse(repo).unwrap(), repo.replace('/', " "), false)
}

pub fn config(dry_run: bool, max_concurrency: usize) -> Arc<RunConfiguration> {
    Arc::new(
        RunConfiguration::new(Credentials::new("test-token", "test-key"))
            .with_dry_run(dry_run)
            .with_max_concurrency(max_concurrency),
    )
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_base_ms: 5,
        backoff_max_ms: 20,
    }
}

/// Orchestrator against `remotes`, creating workspaces under `scratch`.
pub fn orchestrator(
    remotes: &Remotes,
    scratch: &Path,
    provider: Arc<dyn ModelProvider>,
) -> SiteOrchestrator {
    let workspaces = WorkspaceManager::new(remotes.locator()).with_scratch_root(scratch);
    let engine = EditEngine::new(provider, EditEngineConfig::default());
    let validator = ChangeValidator::new(ValidationPolicy::default()).unwrap();
    SiteOrchestrator::new(workspaces, engine, validator)
        .with_context_builder(ContextBuilder::default())
        .with_retry_policy(fast_retry())
}

pub const SPEC: &str = "# Analytics\n\nEvery site loads /analytics.js from the document head.\n";

pub fn spec() -> Arc<str> {
    Arc::from(SPEC)
}

/// Number of entries left in a scratch directory.
pub fn leftover_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

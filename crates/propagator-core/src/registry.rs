//! Site registry: the list of target repositories.
//!
//! The registry is a pure data source. Enabled and single-site filtering
//! happen in the orchestrator.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::domain::error::{PropagatorError, Result};
use crate::domain::site::{RepoId, SiteRecord};

/// Source of [`SiteRecord`]s.
pub trait SiteRegistry: Send + Sync {
    /// Load every site, in registry order.
    fn load(&self) -> Result<Vec<SiteRecord>>;
}

/// Registry backed by a `sites.json` document:
///
/// ```json
/// { "sites": [ { "repo": "owner/name", "name": "Display", "enabled": true } ] }
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SiteRegistry for JsonFileRegistry {
    fn load(&self) -> Result<Vec<SiteRecord>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            PropagatorError::Configuration(format!(
                "cannot read site registry {}: {e}",
                self.path.display()
            ))
        })?;
        let sites = parse_registry(&raw)?;
        debug!(path = %self.path.display(), count = sites.len(), "Loaded site registry");
        Ok(sites)
    }
}

#[derive(Deserialize)]
struct RegistryDocument {
    sites: Vec<RegistryEntry>,
}

#[derive(Deserialize)]
struct RegistryEntry {
    repo: String,
    name: Option<String>,
    enabled: Option<bool>,
}

/// Parse a registry document. Malformed JSON, bad identifiers and duplicate
/// repositories are configuration errors.
pub fn parse_registry(raw: &str) -> Result<Vec<SiteRecord>> {
    let doc: RegistryDocument = serde_json::from_str(raw)
        .map_err(|e| PropagatorError::Configuration(format!("malformed site registry: {e}")))?;

    let mut seen = HashSet::new();
    let mut sites = Vec::with_capacity(doc.sites.len());

    for entry in doc.sites {
        let repo = RepoId::parse(&entry.repo)?;
        if !seen.insert(repo.clone()) {
            return Err(PropagatorError::Configuration(format!(
                "repository {repo} is listed more than once"
            )));
        }
        let display_name = entry
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| repo.name().to_string());
        sites.push(SiteRecord::new(repo, display_name, entry.enabled.unwrap_or(true)));
    }

    Ok(sites)
}

//! Site identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::{PropagatorError, Result};

/// Identifies a hosted repository as `owner/name`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(String);

impl RepoId {
    /// Parse an `owner/name` identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let mut parts = trimmed.split('/');
        let valid = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if is_segment(owner) && is_segment(name)
        );
        if !valid {
            return Err(PropagatorError::Configuration(format!(
                "invalid repository identifier '{raw}', expected owner/name"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Filesystem-safe form, e.g. `owner__name`.
    pub fn slug(&self) -> String {
        self.0.replace('/', "__")
    }
}

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One target repository as listed in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub repo: RepoId,
    pub display_name: String,
    pub enabled: bool,
}

impl SiteRecord {
    pub fn new(repo: RepoId, display_name: impl Into<String>, enabled: bool) -> Self {
        Self {
            repo,
            display_name: display_name.into(),
            enabled,
        }
    }
}

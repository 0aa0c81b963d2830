//! Process-wide run configuration.

use std::fmt;

use crate::domain::error::{PropagatorError, Result};
use crate::domain::site::RepoId;

/// Default number of sites processed at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Opaque secrets consumed by the workspace manager and the edit engine.
#[derive(Clone)]
pub struct Credentials {
    /// VCS host token with repository read/write scope.
    pub vcs_token: String,
    /// Model provider API key.
    pub model_api_key: String,
}

impl Credentials {
    pub fn new(vcs_token: impl Into<String>, model_api_key: impl Into<String>) -> Self {
        Self {
            vcs_token: vcs_token.into(),
            model_api_key: model_api_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("vcs_token", &"<redacted>")
            .field("model_api_key", &"<redacted>")
            .finish()
    }
}

/// Built once at start-up and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub dry_run: bool,
    pub site_filter: Option<RepoId>,
    pub max_concurrency: usize,
    pub credentials: Credentials,
}

impl RunConfiguration {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            dry_run: false,
            site_filter: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            credentials,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_site_filter(mut self, site: Option<RepoId>) -> Self {
        self.site_filter = site;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Reject settings no run could make progress with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(PropagatorError::Configuration(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

//! Error taxonomy for the propagation pipeline.

use propagator_llm::ProviderError;

/// Errors produced while parsing a model response into edits.
///
/// Any of these rejects the whole response; no partial edit set survives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditParseError {
    #[error("file block for {path} is not terminated")]
    UnterminatedBlock { path: String },

    #[error("unexpected line {line} outside a file block: {text}")]
    StrayMarker { line: usize, text: String },

    #[error("edit block has an empty path")]
    EmptyPath,

    #[error("invalid edit path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("edit targets {path}, which was not part of the supplied context")]
    OutsideContext { path: String },

    #[error("more than one edit targets {path}")]
    DuplicatePath { path: String },

    #[error("replacement for {path} has no content")]
    EmptyReplacement { path: String },

    #[error("response mixes the no-changes sentinel with edit blocks")]
    AmbiguousNoChanges,

    #[error("response contains neither edit blocks nor the no-changes sentinel")]
    NoEditBlocks,
}

/// Errors produced when publishing a workspace back to its remote.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The remote branch moved ahead; nothing was overwritten.
    #[error("push to {branch} rejected, remote has diverged: {detail}")]
    Conflict { branch: String, detail: String },

    #[error("push failed: {0}")]
    Push(String),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("failed to apply edit to {path}: {reason}")]
    Apply { path: String, reason: String },
}

/// Propagator domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PropagatorError {
    /// Bad input data; fatal to the whole run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Clone, checkout or workspace I/O failure for one site.
    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("could not parse model response: {0}")]
    EditParse(#[from] EditParseError),

    #[error("model provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PropagatorError {
    /// Stable short name of the error kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PropagatorError::Configuration(_) => "configuration",
            PropagatorError::Workspace(_) => "workspace",
            PropagatorError::EditParse(_) => "edit_parse",
            PropagatorError::Provider(_) => "provider",
            PropagatorError::Publish(PublishError::Conflict { .. }) => "publish_conflict",
            PropagatorError::Publish(_) => "publish",
            PropagatorError::Serialization(_) => "serialization",
            PropagatorError::Io(_) => "io",
        }
    }
}

/// Result type for propagator operations.
pub type Result<T> = std::result::Result<T, PropagatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = PropagatorError::Configuration("sites.json not found".to_string());
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("sites.json"));
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_conflict_has_its_own_kind() {
        let err: PropagatorError = PublishError::Conflict {
            branch: "main".to_string(),
            detail: "non-fast-forward".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "publish_conflict");
        assert!(err.to_string().contains("main"));
        assert!(err.to_string().contains("diverged"));
    }

    #[test]
    fn test_parse_error_converts() {
        let err: PropagatorError = EditParseError::OutsideContext {
            path: "secret/keys.ts".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "edit_parse");
        assert!(err.to_string().contains("secret/keys.ts"));
    }

    #[test]
    fn test_provider_error_converts() {
        let err: PropagatorError = ProviderError::Timeout.into();
        assert_eq!(err.kind(), "provider");
        assert!(err.to_string().contains("timed out"));
    }
}

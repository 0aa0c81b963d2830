//! Model-proposed file mutations.

use serde::{Deserialize, Serialize};

/// What to do with one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditAction {
    /// Replace the whole file with `content`.
    Replace { content: String },
    Delete,
}

/// One model-suggested mutation, with a workspace-relative `/`-separated path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedEdit {
    pub path: String,
    pub action: EditAction,
}

impl ProposedEdit {
    pub fn replace(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: EditAction::Replace {
                content: content.into(),
            },
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: EditAction::Delete,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.action, EditAction::Delete)
    }

    /// New content, `None` for deletions.
    pub fn new_content(&self) -> Option<&str> {
        match &self.action {
            EditAction::Replace { content } => Some(content),
            EditAction::Delete => None,
        }
    }
}

//! Per-site task state machine.
//!
//! ```text
//! Pending -> Cloning -> BuildingContext -> Editing -> Validating -> Publishing -> Succeeded
//!                                           ^    |        |                     \-> Skipped
//!                                           \____/        \-> Skipped
//! any non-terminal state -> Failed
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::site::SiteRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Cloning,
    BuildingContext,
    Editing,
    Validating,
    Publishing,
    Succeeded,
    Skipped,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Skipped | TaskState::Failed
        )
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) => true,
            // A stop signal can end a task before it starts.
            (Pending, Cloning) | (Pending, Skipped) => true,
            (Cloning, BuildingContext) => true,
            (BuildingContext, Editing) => true,
            (Editing, Editing) | (Editing, Validating) => true,
            (Validating, Publishing) | (Validating, Skipped) => true,
            (Publishing, Succeeded) | (Publishing, Skipped) => true,
            _ => false,
        }
    }
}

/// The unit of work for one repository.
#[derive(Debug, Clone)]
pub struct SiteTask {
    pub id: Uuid,
    pub site: SiteRecord,
    /// Specification text shared by every task of the run.
    pub specification: Arc<str>,
    pub state: TaskState,
    pub error_detail: Option<String>,
    history: Vec<TaskState>,
}

impl SiteTask {
    pub fn new(site: SiteRecord, specification: Arc<str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            site,
            specification,
            state: TaskState::Pending,
            error_detail: None,
            history: vec![TaskState::Pending],
        }
    }

    /// Move to `next`. Illegal edges are a bug in the caller.
    pub fn advance(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal task transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(repo = %self.site.repo, from = ?self.state, to = ?next, "Task transition");
        self.state = next;
        self.history.push(next);
    }

    /// Move to `Failed`, recording `detail`.
    pub fn fail(&mut self, detail: impl Into<String>) {
        self.error_detail = Some(detail.into());
        self.advance(TaskState::Failed);
    }

    /// Every state visited so far, in order.
    pub fn history(&self) -> &[TaskState] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::site::RepoId;

    fn task() -> SiteTask {
        SiteTask::new(
            SiteRecord::new(RepoId::parse("acme/site").unwrap(), "Acme", true),
            Arc::from("# Spec"),
        )
    }

    #[test]
    fn test_happy_path_is_legal() {
        let mut t = task();
        for next in [
            TaskState::Cloning,
            TaskState::BuildingContext,
            TaskState::Editing,
            TaskState::Editing,
            TaskState::Validating,
            TaskState::Publishing,
            TaskState::Succeeded,
        ] {
            assert!(t.state.can_transition_to(next), "{:?} -> {:?}", t.state, next);
            t.advance(next);
        }
        assert!(t.state.is_terminal());
        assert_eq!(t.history().len(), 8);
    }

    #[test]
    fn test_only_editing_loops() {
        for state in [
            TaskState::Pending,
            TaskState::Cloning,
            TaskState::BuildingContext,
            TaskState::Validating,
            TaskState::Publishing,
        ] {
            assert!(!state.can_transition_to(state), "{state:?} must not loop");
        }
        assert!(TaskState::Editing.can_transition_to(TaskState::Editing));
    }

    #[test]
    fn test_validator_rejection_skips_not_fails() {
        assert!(TaskState::Validating.can_transition_to(TaskState::Skipped));
        assert!(!TaskState::Editing.can_transition_to(TaskState::Skipped));
        assert!(!TaskState::Cloning.can_transition_to(TaskState::Skipped));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [TaskState::Succeeded, TaskState::Skipped, TaskState::Failed] {
            assert!(!terminal.can_transition_to(TaskState::Failed));
            assert!(!terminal.can_transition_to(TaskState::Pending));
        }
    }

    #[test]
    fn test_fail_records_detail() {
        let mut t = task();
        t.advance(TaskState::Cloning);
        t.fail("authentication failed");
        assert_eq!(t.state, TaskState::Failed);
        assert_eq!(t.error_detail.as_deref(), Some("authentication failed"));
    }
}

use std::fmt;

use tracing::debug;

use crate::{
    error::SyncError,
    models::{Task, TaskFields},
    sync::mutator::OptimisticMutator,
};

/// What the editor was submitting when it settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Create,
    Edit(String),
}

/// Lifecycle of the task editor surface.
///
/// `Closed -> Creating -> Committed|RolledBack -> Closed` and
/// `Closed -> Editing -> Committed|RolledBack -> Viewing`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditorState {
    #[default]
    Closed,
    Creating,
    Editing(String),
    Committed(Submission),
    RolledBack(Submission),
    Viewing(String),
}

impl fmt::Display for EditorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorState::Closed => f.write_str("closed"),
            EditorState::Creating => f.write_str("creating"),
            EditorState::Editing(id) => write!(f, "editing {id}"),
            EditorState::Committed(_) => f.write_str("committed"),
            EditorState::RolledBack(_) => f.write_str("rolled back"),
            EditorState::Viewing(id) => write!(f, "viewing {id}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskEditor {
    state: EditorState,
}

impl TaskEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    fn busy(&self) -> SyncError {
        SyncError::ConflictInProgress {
            entity: format!("task editor ({})", self.state),
        }
    }

    fn transition(&mut self, next: EditorState) {
        debug!(from = %self.state, to = %next, "task editor");
        self.state = next;
    }

    pub fn begin_create(&mut self) -> Result<(), SyncError> {
        match self.state {
            EditorState::Closed | EditorState::Viewing(_) => {
                self.transition(EditorState::Creating);
                Ok(())
            }
            _ => Err(self.busy()),
        }
    }

    pub fn begin_edit(&mut self, task_id: &str) -> Result<(), SyncError> {
        match &self.state {
            EditorState::Closed => {}
            EditorState::Viewing(viewing) if viewing == task_id => {}
            _ => return Err(self.busy()),
        }
        self.transition(EditorState::Editing(task_id.to_string()));
        Ok(())
    }

    pub fn view(&mut self, task_id: &str) -> Result<(), SyncError> {
        match self.state {
            EditorState::Closed | EditorState::Viewing(_) => {
                self.transition(EditorState::Viewing(task_id.to_string()));
                Ok(())
            }
            _ => Err(self.busy()),
        }
    }

    /// Leaves creating or editing without submitting.
    pub fn cancel(&mut self) {
        let next = match &self.state {
            EditorState::Creating => EditorState::Closed,
            EditorState::Editing(id) => EditorState::Viewing(id.clone()),
            _ => return,
        };
        self.transition(next);
    }

    /// Submits the new task and waits for the server's verdict.
    pub async fn submit_create(
        &mut self,
        mutator: &OptimisticMutator,
        board_id: &str,
        name: &str,
        notes: Option<String>,
    ) -> Result<Task, SyncError> {
        if self.state != EditorState::Creating {
            return Err(self.busy());
        }
        let outcome = match mutator.add_task(board_id, name, notes) {
            Ok(provisional) => {
                let temp_id = provisional.task().id.clone();
                provisional
                    .confirmed()
                    .await
                    .and_then(|confirmed| confirmed.ok_or(SyncError::TaskNotFound(temp_id)))
            }
            Err(error) => Err(error),
        };
        self.settle(Submission::Create, outcome)
    }

    /// Submits changes to the task being edited.
    pub async fn submit_edit(
        &mut self,
        mutator: &OptimisticMutator,
        fields: TaskFields,
    ) -> Result<Task, SyncError> {
        let EditorState::Editing(task_id) = &self.state else {
            return Err(self.busy());
        };
        let task_id = task_id.clone();
        let outcome = mutator.edit_task(&task_id, fields).await;
        self.settle(Submission::Edit(task_id), outcome)
    }

    fn settle(
        &mut self,
        submission: Submission,
        outcome: Result<Task, SyncError>,
    ) -> Result<Task, SyncError> {
        let next = match outcome {
            Ok(_) => EditorState::Committed(submission),
            Err(_) => EditorState::RolledBack(submission),
        };
        self.transition(next);
        outcome
    }

    /// Dismisses a settled submission.
    pub fn acknowledge(&mut self) {
        let next = match &self.state {
            EditorState::Committed(Submission::Create)
            | EditorState::RolledBack(Submission::Create) => EditorState::Closed,
            EditorState::Committed(Submission::Edit(id))
            | EditorState::RolledBack(Submission::Edit(id)) => EditorState::Viewing(id.clone()),
            _ => return,
        };
        self.transition(next);
    }
}

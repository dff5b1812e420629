use serde::Serialize;

use crate::models::{board::Board, member::Member, project::Project, task::Task};

/// Full graph of one project as returned by `GET /projects/{url}`.
#[derive(Debug, Serialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    pub project: Project,
    pub boards: Vec<Board>,
    pub tasks: Vec<Task>,
    pub members: Vec<Member>,
}

impl ProjectDetail {
    pub fn url(&self) -> &str {
        &self.project.url
    }

    pub fn board(&self, board_id: &str) -> Option<&Board> {
        self.boards.iter().find(|b| b.id == board_id)
    }

    pub fn task_index(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    pub fn member(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn tasks_in<'a>(&'a self, board_id: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks.iter().filter(move |t| t.board_id == board_id)
    }

    /// Columns sorted by their `order`.
    pub fn ordered_boards(&self) -> Vec<&Board> {
        let mut boards: Vec<_> = self.boards.iter().collect();
        boards.sort_by_key(|b| b.order);
        boards
    }
}

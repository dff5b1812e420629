use jiff::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// `KEY-n` identifier; provisional until the server confirms it
    pub id: String,
    /// Column the task sits in
    pub board_id: String,
    /// Title of the task
    pub name: String,
    /// Notes of the task
    pub notes: Option<String>,
    /// Workflow status as reported by the server
    pub status: Option<String>,
    /// User that created the task
    pub created_by: String,
    /// When the task was created
    pub created_at: Timestamp,
}

impl Task {
    pub fn apply(&mut self, fields: &TaskFields) {
        if let Some(name) = &fields.name {
            self.name = name.clone();
        }
        if let Some(notes) = &fields.notes {
            self.notes = Some(notes.clone());
        }
        if let Some(status) = &fields.status {
            self.status = Some(status.clone());
        }
        if let Some(board_id) = &fields.board_id {
            self.board_id = board_id.clone();
        }
    }
}

/// Body of `POST /projects/{url}/tasks`.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub board_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Id the client rendered optimistically; the server may assign another
    pub suggested_id: String,
}

/// Body of `PUT /projects/{url}/tasks/{id}`. Only `Some` fields are sent.
#[derive(Debug, Serialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
}

pub fn format_task_id(key: &str, number: u64) -> String {
    format!("{key}-{number}")
}

/// Advisory next task id: one past the cached task count, bumped past any id
/// already taken. The server's id is authoritative.
pub fn next_task_id<'a>(key: &str, tasks: impl IntoIterator<Item = &'a Task>) -> String {
    let ids: Vec<&str> = tasks.into_iter().map(|t| t.id.as_str()).collect();
    let mut number = ids.len() as u64 + 1;
    loop {
        let candidate = format_task_id(key, number);
        if !ids.contains(&candidate.as_str()) {
            return candidate;
        }
        number += 1;
    }
}

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::models::{board::Board, member::Member};

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Server identifier of the project
    pub id: String,
    /// Stable slug, unique and immutable after creation
    pub url: String,
    /// Name of the project
    pub name: String,
    /// Short code used to derive task ids (`KEY-n`)
    pub key: String,
    /// Free-form description
    pub description: Option<String>,
    /// User that owns the project
    pub owner_id: String,
    /// Members as reported by the project list (may be empty)
    pub members: Vec<Member>,
    /// Board columns as reported by the project list (may be empty)
    pub boards: Vec<Board>,
    /// Whether the current user pinned this project
    pub is_pinned: bool,
    /// Position inside its group (pinned or unpinned)
    pub order: i64,
    /// When the project was created
    pub created_at: Timestamp,
    /// When the project was last changed on the server
    pub updated_at: Timestamp,
}

impl Project {
    pub fn pin_state(&self) -> PinState {
        PinState {
            is_pinned: self.is_pinned,
            order: self.order,
        }
    }
}

/// Body of `POST /projects`.
#[derive(Debug, Serialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invite_emails: Vec<String>,
}

/// Body of `PUT /projects/{url}`. Only `Some` fields are sent.
#[derive(Debug, Serialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProjectFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.key.is_none() && self.description.is_none()
    }
}

/// Body of `PUT /projects/{url}/pin`.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PinState {
    pub is_pinned: bool,
    pub order: i64,
}

/// One entry of the `PUT /projects/order` batch.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOrder {
    pub project_url: String,
    pub order: i64,
}

impl ProjectOrder {
    pub fn new(project_url: impl Into<String>, order: i64) -> Self {
        Self {
            project_url: project_url.into(),
            order,
        }
    }
}

/// Next free position at the end of the pinned or unpinned group.
pub fn next_order<'a>(projects: impl IntoIterator<Item = &'a Project>, pinned: bool) -> i64 {
    projects
        .into_iter()
        .filter(|p| p.is_pinned == pinned)
        .map(|p| p.order + 1)
        .max()
        .unwrap_or(0)
}

/// Display order: pinned projects first, each group by `order`, ties by name.
pub fn sort_for_display(projects: &mut [Project]) {
    projects.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then(a.order.cmp(&b.order))
            .then_with(|| a.name.cmp(&b.name))
    });
}

//! Boundary adapter between the REST payloads and the canonical models.
//!
//! The backend has shipped snake_case (`project_name`), camelCase
//! (`projectName`) and bare (`name`) spellings of the same fields over time.
//! Everything is folded into one spelling here so the rest of the crate never
//! branches on field names.

use jiff::Timestamp;
use serde::Deserialize;

use crate::models::{
    Board, Invitation, InvitationStatus, Member, Project, ProjectDetail, Role, Task,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProject {
    #[serde(alias = "_id", alias = "projectId", alias = "project_id")]
    id: String,
    #[serde(alias = "projectUrl", alias = "project_url", alias = "slug")]
    url: String,
    #[serde(alias = "projectName", alias = "project_name")]
    name: String,
    #[serde(default, alias = "projectKey", alias = "project_key")]
    key: String,
    #[serde(default, alias = "projectDescription", alias = "project_description")]
    description: Option<String>,
    #[serde(default, alias = "owner_id", alias = "owner")]
    owner_id: String,
    #[serde(default)]
    members: Vec<WireMember>,
    #[serde(default, alias = "columns")]
    boards: Vec<WireBoard>,
    #[serde(default, alias = "is_pinned", alias = "pinned")]
    is_pinned: bool,
    #[serde(default, alias = "position")]
    order: i64,
    #[serde(default, alias = "created_at")]
    created_at: Option<Timestamp>,
    #[serde(default, alias = "updated_at")]
    updated_at: Option<Timestamp>,
}

impl From<WireProject> for Project {
    fn from(wire: WireProject) -> Self {
        let created_at = wire.created_at.unwrap_or_default();
        Project {
            id: wire.id,
            url: wire.url,
            name: wire.name,
            key: wire.key,
            description: wire.description,
            owner_id: wire.owner_id,
            members: wire.members.into_iter().map(Member::from).collect(),
            boards: normalize_boards(wire.boards),
            is_pinned: wire.is_pinned,
            order: wire.order,
            created_at,
            updated_at: wire.updated_at.unwrap_or(created_at),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMember {
    #[serde(alias = "user_id", alias = "uid", alias = "id")]
    user_id: String,
    #[serde(default)]
    role: Role,
    #[serde(default, alias = "joined_at")]
    joined_at: Option<Timestamp>,
    #[serde(default, alias = "display_name", alias = "name")]
    display_name: Option<String>,
}

impl From<WireMember> for Member {
    fn from(wire: WireMember) -> Self {
        Member {
            user_id: wire.user_id,
            role: wire.role,
            joined_at: wire.joined_at.unwrap_or_default(),
            display_name: wire.display_name,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBoard {
    #[serde(alias = "boardId", alias = "board_id", alias = "columnId", alias = "column_id")]
    id: String,
    #[serde(alias = "name", alias = "columnTitle", alias = "column_title")]
    title: String,
    #[serde(default, alias = "position")]
    order: i64,
}

impl From<WireBoard> for Board {
    fn from(wire: WireBoard) -> Self {
        Board {
            id: wire.id,
            title: wire.title,
            order: wire.order,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTask {
    #[serde(alias = "taskId", alias = "task_id")]
    id: String,
    #[serde(alias = "board_id", alias = "columnId", alias = "column_id")]
    board_id: String,
    #[serde(alias = "title", alias = "taskName", alias = "task_name")]
    name: String,
    #[serde(default, alias = "description")]
    notes: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "created_by")]
    created_by: String,
    #[serde(default, alias = "created_at")]
    created_at: Option<Timestamp>,
}

impl From<WireTask> for Task {
    fn from(wire: WireTask) -> Self {
        Task {
            id: wire.id,
            board_id: wire.board_id,
            name: wire.name,
            notes: wire.notes,
            status: wire.status,
            created_by: wire.created_by,
            created_at: wire.created_at.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDetail {
    project: WireProject,
    #[serde(default, alias = "columns")]
    boards: Vec<WireBoard>,
    #[serde(default)]
    tasks: Vec<WireTask>,
    #[serde(default)]
    members: Vec<WireMember>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireProjectList {
    Bare(Vec<WireProject>),
    Wrapped { projects: Vec<WireProject> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireSingle<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> WireSingle<T> {
    fn into_inner(self) -> T {
        match self {
            WireSingle::Wrapped { data } => data,
            WireSingle::Bare(inner) => inner,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInvitation {
    token: String,
    #[serde(alias = "project_id")]
    project_id: String,
    #[serde(default, alias = "project_url")]
    project_url: Option<String>,
    #[serde(default, alias = "invitee_email", alias = "email")]
    invitee_email: String,
    #[serde(default, alias = "inviter_name", alias = "invitedBy")]
    inviter_name: String,
    #[serde(default)]
    status: Option<String>,
}

impl From<WireInvitation> for Invitation {
    fn from(wire: WireInvitation) -> Self {
        Invitation {
            token: wire.token,
            project_id: wire.project_id,
            project_url: wire.project_url,
            invitee_email: wire.invitee_email,
            inviter_name: wire.inviter_name,
            status: wire
                .status
                .as_deref()
                .map(InvitationStatus::parse_lenient)
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct WireErrorBody {
    #[serde(alias = "error", alias = "detail")]
    message: Option<String>,
}

fn normalize_boards(boards: Vec<WireBoard>) -> Vec<Board> {
    boards
        .into_iter()
        .map(Board::from)
        .filter(|b| !b.is_affordance())
        .collect()
}

pub fn decode_projects(body: &[u8]) -> Result<Vec<Project>, serde_json::Error> {
    let list: WireProjectList = serde_json::from_slice(body)?;
    let projects = match list {
        WireProjectList::Bare(projects) | WireProjectList::Wrapped { projects } => projects,
    };
    Ok(projects.into_iter().map(Project::from).collect())
}

pub fn decode_project(body: &[u8]) -> Result<Project, serde_json::Error> {
    let wire: WireSingle<WireProject> = serde_json::from_slice(body)?;
    Ok(wire.into_inner().into())
}

pub fn decode_detail(body: &[u8]) -> Result<ProjectDetail, serde_json::Error> {
    let wire: WireDetail = serde_json::from_slice(body)?;
    let mut project = Project::from(wire.project);

    // Some deployments nest the graph inside the project object
    let boards = if wire.boards.is_empty() {
        std::mem::take(&mut project.boards)
    } else {
        normalize_boards(wire.boards)
    };
    let members = if wire.members.is_empty() {
        std::mem::take(&mut project.members)
    } else {
        wire.members.into_iter().map(Member::from).collect()
    };

    Ok(ProjectDetail {
        project,
        boards,
        tasks: wire.tasks.into_iter().map(Task::from).collect(),
        members,
    })
}

pub fn decode_task(body: &[u8]) -> Result<Task, serde_json::Error> {
    let wire: WireSingle<WireTask> = serde_json::from_slice(body)?;
    Ok(wire.into_inner().into())
}

pub fn decode_board(body: &[u8]) -> Result<Board, serde_json::Error> {
    let wire: WireSingle<WireBoard> = serde_json::from_slice(body)?;
    Ok(wire.into_inner().into())
}

pub fn decode_invitation(body: &[u8]) -> Result<Invitation, serde_json::Error> {
    let wire: WireSingle<WireInvitation> = serde_json::from_slice(body)?;
    Ok(wire.into_inner().into())
}

/// Human readable reason from an error response body, if it carries one.
pub fn decode_error_reason(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<WireErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
}

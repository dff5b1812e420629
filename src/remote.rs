use async_trait::async_trait;
use thiserror::Error;

use crate::{
    auth::BearerToken,
    models::{
        Board, Invitation, NewProject, NewTask, PinState, Project, ProjectDetail, ProjectFields,
        ProjectOrder, Role, Task, TaskFields,
    },
};

pub mod http;
pub mod wire;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("No credential available")]
    AuthRequired,

    #[error("Remote store unreachable: {0}")]
    Unavailable(String),

    #[error("Request rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Malformed response from '{endpoint}': {message}")]
    Malformed { endpoint: String, message: String },
}

/// Authenticated request/response service holding the canonical data.
///
/// Every method takes the bearer token for that one call; implementations
/// must not keep it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `GET /projects`
    async fn list_projects(&self, token: &BearerToken) -> Result<Vec<Project>, RemoteError>;

    /// `POST /projects`
    async fn create_project(
        &self,
        token: &BearerToken,
        payload: &NewProject,
    ) -> Result<Project, RemoteError>;

    /// `PUT /projects/{url}`
    async fn update_project(
        &self,
        token: &BearerToken,
        url: &str,
        fields: &ProjectFields,
    ) -> Result<Project, RemoteError>;

    /// `DELETE /projects/{url}`
    async fn delete_project(&self, token: &BearerToken, url: &str) -> Result<(), RemoteError>;

    /// `GET /projects/{url}`
    async fn project_detail(
        &self,
        token: &BearerToken,
        url: &str,
    ) -> Result<ProjectDetail, RemoteError>;

    /// `POST /projects/{url}/tasks`
    async fn create_task(
        &self,
        token: &BearerToken,
        url: &str,
        task: &NewTask,
    ) -> Result<Task, RemoteError>;

    /// `PUT /projects/{url}/tasks/{id}`
    async fn update_task(
        &self,
        token: &BearerToken,
        url: &str,
        task_id: &str,
        fields: &TaskFields,
    ) -> Result<Task, RemoteError>;

    /// `DELETE /projects/{url}/tasks/{id}`
    async fn delete_task(
        &self,
        token: &BearerToken,
        url: &str,
        task_id: &str,
    ) -> Result<(), RemoteError>;

    /// `PUT /projects/{url}/boards/{id}`
    async fn update_board(
        &self,
        token: &BearerToken,
        url: &str,
        board: &Board,
    ) -> Result<Board, RemoteError>;

    /// `DELETE /projects/{url}/boards/{id}`
    async fn delete_board(
        &self,
        token: &BearerToken,
        url: &str,
        board_id: &str,
    ) -> Result<(), RemoteError>;

    /// `PUT /projects/{url}/members/{id}`
    async fn update_member_role(
        &self,
        token: &BearerToken,
        url: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), RemoteError>;

    /// `DELETE /projects/{url}/members/{id}`
    async fn remove_member(
        &self,
        token: &BearerToken,
        url: &str,
        user_id: &str,
    ) -> Result<(), RemoteError>;

    /// `PUT /projects/{url}/pin`
    async fn set_pin(
        &self,
        token: &BearerToken,
        url: &str,
        pin: &PinState,
    ) -> Result<(), RemoteError>;

    /// `PUT /projects/order`
    async fn set_order(
        &self,
        token: &BearerToken,
        orders: &[ProjectOrder],
    ) -> Result<(), RemoteError>;

    /// `GET /invitations/{token}`
    async fn invitation(
        &self,
        token: &BearerToken,
        invite_token: &str,
    ) -> Result<Invitation, RemoteError>;

    /// `POST /invitations/accept`
    async fn accept_invitation(
        &self,
        token: &BearerToken,
        invite_token: &str,
    ) -> Result<Invitation, RemoteError>;
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::BearerToken,
    models::{
        Board, Invitation, NewProject, NewTask, PinState, Project, ProjectDetail, ProjectFields,
        ProjectOrder, Role, Task, TaskFields,
    },
    remote::{RemoteError, RemoteStore, wire},
};

/// `RemoteStore` over REST/HTTPS with bearer authentication.
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url).map_err(|e| RemoteError::Unavailable(format!(
            "invalid API url '{base_url}': {e}"
        )))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Unavailable(format!(
                "API url '{base_url}' cannot carry a path"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str], token: &BearerToken) -> RequestBuilder {
        self.client
            .request(method, self.endpoint(segments))
            .bearer_auth(token.as_str())
            .header("x-request-id", Uuid::new_v4().to_string())
    }

    async fn send(&self, request: RequestBuilder, label: &str) -> Result<Vec<u8>, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?
            .to_vec();

        debug!(endpoint = label, status = status.as_u16(), bytes = body.len(), "remote call settled");

        if status.is_success() {
            return Ok(body);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(RemoteError::AuthRequired);
        }

        let reason = wire::decode_error_reason(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            reason,
        })
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        token: &BearerToken,
        body: &B,
        label: &str,
    ) -> Result<Vec<u8>, RemoteError> {
        let request = self.request(method, segments, token).json(body);
        self.send(request, label).await
    }
}

fn malformed(label: &str) -> impl FnOnce(serde_json::Error) -> RemoteError + '_ {
    move |e| RemoteError::Malformed {
        endpoint: label.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list_projects(&self, token: &BearerToken) -> Result<Vec<Project>, RemoteError> {
        let label = "GET /projects";
        let body = self
            .send(self.request(Method::GET, &["projects"], token), label)
            .await?;
        wire::decode_projects(&body).map_err(malformed(label))
    }

    async fn create_project(
        &self,
        token: &BearerToken,
        payload: &NewProject,
    ) -> Result<Project, RemoteError> {
        let label = "POST /projects";
        let body = self
            .send_json(Method::POST, &["projects"], token, payload, label)
            .await?;
        wire::decode_project(&body).map_err(malformed(label))
    }

    async fn update_project(
        &self,
        token: &BearerToken,
        url: &str,
        fields: &ProjectFields,
    ) -> Result<Project, RemoteError> {
        let label = "PUT /projects/{url}";
        let body = self
            .send_json(Method::PUT, &["projects", url], token, fields, label)
            .await?;
        wire::decode_project(&body).map_err(malformed(label))
    }

    async fn delete_project(&self, token: &BearerToken, url: &str) -> Result<(), RemoteError> {
        self.send(
            self.request(Method::DELETE, &["projects", url], token),
            "DELETE /projects/{url}",
        )
        .await
        .map(|_| ())
    }

    async fn project_detail(
        &self,
        token: &BearerToken,
        url: &str,
    ) -> Result<ProjectDetail, RemoteError> {
        let label = "GET /projects/{url}";
        let body = self
            .send(self.request(Method::GET, &["projects", url], token), label)
            .await?;
        wire::decode_detail(&body).map_err(malformed(label))
    }

    async fn create_task(
        &self,
        token: &BearerToken,
        url: &str,
        task: &NewTask,
    ) -> Result<Task, RemoteError> {
        let label = "POST /projects/{url}/tasks";
        let body = self
            .send_json(Method::POST, &["projects", url, "tasks"], token, task, label)
            .await?;
        wire::decode_task(&body).map_err(malformed(label))
    }

    async fn update_task(
        &self,
        token: &BearerToken,
        url: &str,
        task_id: &str,
        fields: &TaskFields,
    ) -> Result<Task, RemoteError> {
        let label = "PUT /projects/{url}/tasks/{id}";
        let body = self
            .send_json(
                Method::PUT,
                &["projects", url, "tasks", task_id],
                token,
                fields,
                label,
            )
            .await?;
        wire::decode_task(&body).map_err(malformed(label))
    }

    async fn delete_task(
        &self,
        token: &BearerToken,
        url: &str,
        task_id: &str,
    ) -> Result<(), RemoteError> {
        self.send(
            self.request(Method::DELETE, &["projects", url, "tasks", task_id], token),
            "DELETE /projects/{url}/tasks/{id}",
        )
        .await
        .map(|_| ())
    }

    async fn update_board(
        &self,
        token: &BearerToken,
        url: &str,
        board: &Board,
    ) -> Result<Board, RemoteError> {
        let label = "PUT /projects/{url}/boards/{id}";
        let body = self
            .send_json(
                Method::PUT,
                &["projects", url, "boards", &board.id],
                token,
                board,
                label,
            )
            .await?;
        // Some deployments answer with no content
        if body.is_empty() {
            return Ok(board.clone());
        }
        wire::decode_board(&body).map_err(malformed(label))
    }

    async fn delete_board(
        &self,
        token: &BearerToken,
        url: &str,
        board_id: &str,
    ) -> Result<(), RemoteError> {
        self.send(
            self.request(Method::DELETE, &["projects", url, "boards", board_id], token),
            "DELETE /projects/{url}/boards/{id}",
        )
        .await
        .map(|_| ())
    }

    async fn update_member_role(
        &self,
        token: &BearerToken,
        url: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), RemoteError> {
        self.send_json(
            Method::PUT,
            &["projects", url, "members", user_id],
            token,
            &json!({ "role": role }),
            "PUT /projects/{url}/members/{id}",
        )
        .await
        .map(|_| ())
    }

    async fn remove_member(
        &self,
        token: &BearerToken,
        url: &str,
        user_id: &str,
    ) -> Result<(), RemoteError> {
        self.send(
            self.request(Method::DELETE, &["projects", url, "members", user_id], token),
            "DELETE /projects/{url}/members/{id}",
        )
        .await
        .map(|_| ())
    }

    async fn set_pin(
        &self,
        token: &BearerToken,
        url: &str,
        pin: &PinState,
    ) -> Result<(), RemoteError> {
        self.send_json(
            Method::PUT,
            &["projects", url, "pin"],
            token,
            pin,
            "PUT /projects/{url}/pin",
        )
        .await
        .map(|_| ())
    }

    async fn set_order(
        &self,
        token: &BearerToken,
        orders: &[ProjectOrder],
    ) -> Result<(), RemoteError> {
        self.send_json(
            Method::PUT,
            &["projects", "order"],
            token,
            orders,
            "PUT /projects/order",
        )
        .await
        .map(|_| ())
    }

    async fn invitation(
        &self,
        token: &BearerToken,
        invite_token: &str,
    ) -> Result<Invitation, RemoteError> {
        let label = "GET /invitations/{token}";
        let body = self
            .send(
                self.request(Method::GET, &["invitations", invite_token], token),
                label,
            )
            .await?;
        wire::decode_invitation(&body).map_err(malformed(label))
    }

    async fn accept_invitation(
        &self,
        token: &BearerToken,
        invite_token: &str,
    ) -> Result<Invitation, RemoteError> {
        let label = "POST /invitations/accept";
        let body = self
            .send_json(
                Method::POST,
                &["invitations", "accept"],
                token,
                &json!({ "token": invite_token }),
                label,
            )
            .await?;
        wire::decode_invitation(&body).map_err(malformed(label))
    }
}

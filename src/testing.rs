//! Scripted in-memory `RemoteStore` used by the sync tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use jiff::Timestamp;
use parking_lot::Mutex;
use slug::slugify;

use crate::{
    auth::{AuthTokenSource, BearerToken},
    models::{
        Board, Invitation, InvitationStatus, Member, NewProject, NewTask, PinState, Project,
        ProjectDetail, ProjectFields, ProjectOrder, Role, Task, TaskFields,
    },
    remote::{RemoteError, RemoteStore},
    sync::SyncContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListProjects,
    CreateProject,
    UpdateProject,
    DeleteProject,
    ProjectDetail,
    CreateTask,
    UpdateTask,
    DeleteTask,
    UpdateBoard,
    DeleteBoard,
    UpdateMemberRole,
    RemoveMember,
    SetPin,
    SetOrder,
    Invitation,
    AcceptInvitation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListProjects,
    CreateProject(NewProject),
    UpdateProject(String, ProjectFields),
    DeleteProject(String),
    ProjectDetail(String),
    CreateTask(String, NewTask),
    UpdateTask(String, String, TaskFields),
    DeleteTask(String, String),
    UpdateBoard(String, Board),
    DeleteBoard(String, String),
    UpdateMemberRole(String, String, Role),
    RemoveMember(String, String),
    SetPin(String, PinState),
    SetOrder(Vec<ProjectOrder>),
    Invitation(String),
    AcceptInvitation(String),
}

impl Call {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Call::ListProjects => Endpoint::ListProjects,
            Call::CreateProject(_) => Endpoint::CreateProject,
            Call::UpdateProject(..) => Endpoint::UpdateProject,
            Call::DeleteProject(_) => Endpoint::DeleteProject,
            Call::ProjectDetail(_) => Endpoint::ProjectDetail,
            Call::CreateTask(..) => Endpoint::CreateTask,
            Call::UpdateTask(..) => Endpoint::UpdateTask,
            Call::DeleteTask(..) => Endpoint::DeleteTask,
            Call::UpdateBoard(..) => Endpoint::UpdateBoard,
            Call::DeleteBoard(..) => Endpoint::DeleteBoard,
            Call::UpdateMemberRole(..) => Endpoint::UpdateMemberRole,
            Call::RemoveMember(..) => Endpoint::RemoveMember,
            Call::SetPin(..) => Endpoint::SetPin,
            Call::SetOrder(_) => Endpoint::SetOrder,
            Call::Invitation(_) => Endpoint::Invitation,
            Call::AcceptInvitation(_) => Endpoint::AcceptInvitation,
        }
    }
}

#[derive(Default)]
struct MockState {
    projects: Vec<Project>,
    details: HashMap<String, ProjectDetail>,
    invitations: HashMap<String, Invitation>,
    list_script: VecDeque<Vec<Project>>,
    detail_script: VecDeque<ProjectDetail>,
    delays: HashMap<Endpoint, VecDeque<Duration>>,
    failures: HashMap<Endpoint, VecDeque<RemoteError>>,
    assigned_task_ids: HashMap<String, VecDeque<String>>,
    calls: Vec<Call>,
    created: u64,
}

#[derive(Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
}

fn not_found(what: &str) -> RemoteError {
    RemoteError::Rejected {
        status: 404,
        reason: format!("{what} not found"),
    }
}

pub fn server_time() -> Timestamp {
    Timestamp::from_second(1_780_000_000).unwrap_or_default()
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_projects(projects: Vec<Project>) -> Arc<Self> {
        let mock = Self::new();
        mock.state.lock().projects = projects;
        mock
    }

    pub fn set_projects(&self, projects: Vec<Project>) {
        self.state.lock().projects = projects;
    }

    pub fn insert_detail(&self, detail: ProjectDetail) {
        self.state
            .lock()
            .details
            .insert(detail.project.url.clone(), detail);
    }

    pub fn detail(&self, url: &str) -> Option<ProjectDetail> {
        self.state.lock().details.get(url).cloned()
    }

    pub fn insert_invitation(&self, invitation: Invitation) {
        self.state
            .lock()
            .invitations
            .insert(invitation.token.clone(), invitation);
    }

    /// The next `list_projects` call answers with `projects` instead of the stored list.
    pub fn script_list(&self, projects: Vec<Project>) {
        self.state.lock().list_script.push_back(projects);
    }

    /// The next `project_detail` call answers with `detail` instead of the stored graph.
    pub fn script_detail(&self, detail: ProjectDetail) {
        self.state.lock().detail_script.push_back(detail);
    }

    /// The next created task in `url` gets `id` instead of the next free number.
    pub fn assign_task_id(&self, url: &str, id: &str) {
        self.state
            .lock()
            .assigned_task_ids
            .entry(url.to_string())
            .or_default()
            .push_back(id.to_string());
    }

    pub fn delay_next(&self, endpoint: Endpoint, delay: Duration) {
        self.state
            .lock()
            .delays
            .entry(endpoint)
            .or_default()
            .push_back(delay);
    }

    pub fn fail_next(&self, endpoint: Endpoint, error: RemoteError) {
        self.state
            .lock()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> Vec<Call> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.endpoint() == endpoint)
            .cloned()
            .collect()
    }

    async fn enter(&self, call: Call) -> Result<(), RemoteError> {
        let endpoint = call.endpoint();
        let (delay, failure) = {
            let mut state = self.state.lock();
            state.calls.push(call);
            let delay = state.delays.get_mut(&endpoint).and_then(VecDeque::pop_front);
            let failure = state.failures.get_mut(&endpoint).and_then(VecDeque::pop_front);
            (delay, failure)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn with_detail<R>(
        &self,
        url: &str,
        f: impl FnOnce(&mut ProjectDetail) -> Result<R, RemoteError>,
    ) -> Result<R, RemoteError> {
        let mut state = self.state.lock();
        let detail = state.details.get_mut(url).ok_or_else(|| not_found(url))?;
        f(detail)
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn list_projects(&self, _token: &BearerToken) -> Result<Vec<Project>, RemoteError> {
        let scripted = self.state.lock().list_script.pop_front();
        self.enter(Call::ListProjects).await?;
        Ok(scripted.unwrap_or_else(|| self.state.lock().projects.clone()))
    }

    async fn create_project(
        &self,
        _token: &BearerToken,
        payload: &NewProject,
    ) -> Result<Project, RemoteError> {
        self.enter(Call::CreateProject(payload.clone())).await?;
        let mut state = self.state.lock();
        state.created += 1;
        let project = Project {
            id: format!("p-{}", state.created),
            url: slugify(&payload.name),
            name: payload.name.clone(),
            key: payload.key.clone(),
            description: payload.description.clone(),
            owner_id: String::from("u-owner"),
            created_at: server_time(),
            updated_at: server_time(),
            ..Project::default()
        };
        state.projects.push(project.clone());
        Ok(project)
    }

    async fn update_project(
        &self,
        _token: &BearerToken,
        url: &str,
        fields: &ProjectFields,
    ) -> Result<Project, RemoteError> {
        self.enter(Call::UpdateProject(url.to_string(), fields.clone()))
            .await?;
        let mut state = self.state.lock();
        let project = state
            .projects
            .iter_mut()
            .find(|p| p.url == url)
            .ok_or_else(|| not_found(url))?;
        if let Some(name) = &fields.name {
            project.name = name.clone();
        }
        if let Some(key) = &fields.key {
            project.key = key.clone();
        }
        if let Some(description) = &fields.description {
            project.description = Some(description.clone());
        }
        project.updated_at = server_time();
        Ok(project.clone())
    }

    async fn delete_project(&self, _token: &BearerToken, url: &str) -> Result<(), RemoteError> {
        self.enter(Call::DeleteProject(url.to_string())).await?;
        let mut state = self.state.lock();
        state.projects.retain(|p| p.url != url);
        state.details.remove(url);
        Ok(())
    }

    async fn project_detail(
        &self,
        _token: &BearerToken,
        url: &str,
    ) -> Result<ProjectDetail, RemoteError> {
        let scripted = self.state.lock().detail_script.pop_front();
        let snapshot = scripted.or_else(|| self.detail(url));
        self.enter(Call::ProjectDetail(url.to_string())).await?;
        snapshot.ok_or_else(|| not_found(url))
    }

    async fn create_task(
        &self,
        _token: &BearerToken,
        url: &str,
        task: &NewTask,
    ) -> Result<Task, RemoteError> {
        self.enter(Call::CreateTask(url.to_string(), task.clone()))
            .await?;
        let assigned = self
            .state
            .lock()
            .assigned_task_ids
            .get_mut(url)
            .and_then(VecDeque::pop_front);
        self.with_detail(url, |detail| {
            let id = assigned.unwrap_or_else(|| task.suggested_id.clone());
            let created = Task {
                id,
                board_id: task.board_id.clone(),
                name: task.name.clone(),
                notes: task.notes.clone(),
                status: Some(String::from("todo")),
                created_by: String::from("u-owner"),
                created_at: server_time(),
            };
            detail.tasks.push(created.clone());
            Ok(created)
        })
    }

    async fn update_task(
        &self,
        _token: &BearerToken,
        url: &str,
        task_id: &str,
        fields: &TaskFields,
    ) -> Result<Task, RemoteError> {
        self.enter(Call::UpdateTask(
            url.to_string(),
            task_id.to_string(),
            fields.clone(),
        ))
        .await?;
        self.with_detail(url, |detail| {
            let task = detail
                .tasks
                .iter_mut()
                .find(|t| t.id == task_id)
                .ok_or_else(|| not_found(task_id))?;
            task.apply(fields);
            Ok(task.clone())
        })
    }

    async fn delete_task(
        &self,
        _token: &BearerToken,
        url: &str,
        task_id: &str,
    ) -> Result<(), RemoteError> {
        self.enter(Call::DeleteTask(url.to_string(), task_id.to_string()))
            .await?;
        self.with_detail(url, |detail| {
            detail.tasks.retain(|t| t.id != task_id);
            Ok(())
        })
    }

    async fn update_board(
        &self,
        _token: &BearerToken,
        url: &str,
        board: &Board,
    ) -> Result<Board, RemoteError> {
        self.enter(Call::UpdateBoard(url.to_string(), board.clone()))
            .await?;
        self.with_detail(url, |detail| {
            let stored = detail
                .boards
                .iter_mut()
                .find(|b| b.id == board.id)
                .ok_or_else(|| not_found(&board.id))?;
            *stored = board.clone();
            Ok(board.clone())
        })
    }

    async fn delete_board(
        &self,
        _token: &BearerToken,
        url: &str,
        board_id: &str,
    ) -> Result<(), RemoteError> {
        self.enter(Call::DeleteBoard(url.to_string(), board_id.to_string()))
            .await?;
        self.with_detail(url, |detail| {
            detail.boards.retain(|b| b.id != board_id);
            detail.tasks.retain(|t| t.board_id != board_id);
            Ok(())
        })
    }

    async fn update_member_role(
        &self,
        _token: &BearerToken,
        url: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), RemoteError> {
        self.enter(Call::UpdateMemberRole(
            url.to_string(),
            user_id.to_string(),
            role,
        ))
        .await?;
        self.with_detail(url, |detail| {
            if role == Role::Owner {
                for member in detail.members.iter_mut().filter(|m| m.role == Role::Owner) {
                    member.role = Role::Editor;
                }
            }
            let member = detail
                .members
                .iter_mut()
                .find(|m| m.user_id == user_id)
                .ok_or_else(|| not_found(user_id))?;
            member.role = role;
            Ok(())
        })
    }

    async fn remove_member(
        &self,
        _token: &BearerToken,
        url: &str,
        user_id: &str,
    ) -> Result<(), RemoteError> {
        self.enter(Call::RemoveMember(url.to_string(), user_id.to_string()))
            .await?;
        self.with_detail(url, |detail| {
            detail.members.retain(|m| m.user_id != user_id);
            Ok(())
        })
    }

    async fn set_pin(
        &self,
        _token: &BearerToken,
        url: &str,
        pin: &PinState,
    ) -> Result<(), RemoteError> {
        self.enter(Call::SetPin(url.to_string(), *pin)).await?;
        let mut state = self.state.lock();
        if let Some(project) = state.projects.iter_mut().find(|p| p.url == url) {
            project.is_pinned = pin.is_pinned;
            project.order = pin.order;
        }
        Ok(())
    }

    async fn set_order(
        &self,
        _token: &BearerToken,
        orders: &[ProjectOrder],
    ) -> Result<(), RemoteError> {
        self.enter(Call::SetOrder(orders.to_vec())).await?;
        let mut state = self.state.lock();
        for entry in orders {
            if let Some(project) = state
                .projects
                .iter_mut()
                .find(|p| p.url == entry.project_url)
            {
                project.order = entry.order;
            }
        }
        Ok(())
    }

    async fn invitation(
        &self,
        _token: &BearerToken,
        invite_token: &str,
    ) -> Result<Invitation, RemoteError> {
        self.enter(Call::Invitation(invite_token.to_string()))
            .await?;
        self.state
            .lock()
            .invitations
            .get(invite_token)
            .cloned()
            .ok_or_else(|| not_found(invite_token))
    }

    async fn accept_invitation(
        &self,
        _token: &BearerToken,
        invite_token: &str,
    ) -> Result<Invitation, RemoteError> {
        self.enter(Call::AcceptInvitation(invite_token.to_string()))
            .await?;
        let mut state = self.state.lock();
        let invitation = state
            .invitations
            .get_mut(invite_token)
            .ok_or_else(|| not_found(invite_token))?;
        if invitation.status != InvitationStatus::Pending {
            return Err(RemoteError::Rejected {
                status: 410,
                reason: String::from("invitation already used"),
            });
        }
        invitation.status = InvitationStatus::Accepted;
        Ok(invitation.clone())
    }
}

/// Token source that counts how many credentials it handed out.
#[derive(Default)]
pub struct CountingTokens {
    issued: AtomicUsize,
    signed_out: AtomicBool,
}

impl CountingTokens {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn sign_out(&self) {
        self.signed_out.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuthTokenSource for CountingTokens {
    async fn fresh_token(&self) -> Option<BearerToken> {
        if self.signed_out.load(Ordering::SeqCst) {
            return None;
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Some(BearerToken::new(format!("token-{n}")))
    }
}

pub fn context(remote: &Arc<MockRemote>, tokens: &Arc<CountingTokens>) -> SyncContext {
    SyncContext::new(remote.clone(), tokens.clone())
}

pub fn project(url: &str, pinned: bool, order: i64) -> Project {
    Project {
        id: format!("id-{url}"),
        url: url.to_string(),
        name: url.to_string(),
        key: url.to_uppercase(),
        owner_id: String::from("u-owner"),
        is_pinned: pinned,
        order,
        created_at: server_time(),
        updated_at: server_time(),
        ..Project::default()
    }
}

fn member(user_id: &str, role: Role) -> Member {
    Member {
        user_id: user_id.to_string(),
        role,
        joined_at: server_time(),
        display_name: None,
    }
}

fn task(id: &str, board_id: &str, name: &str) -> Task {
    Task {
        id: id.to_string(),
        board_id: board_id.to_string(),
        name: name.to_string(),
        created_by: String::from("u-owner"),
        created_at: server_time(),
        ..Task::default()
    }
}

/// `launch-plan` (key `LAUN`): columns todo/doing, three tasks, one member per role.
pub fn launch_plan() -> ProjectDetail {
    let mut project = project("launch-plan", false, 0);
    project.name = String::from("Launch Plan");
    project.key = String::from("LAUN");

    ProjectDetail {
        project,
        boards: vec![
            Board {
                id: String::from("todo"),
                title: String::from("To Do"),
                order: 0,
            },
            Board {
                id: String::from("doing"),
                title: String::from("Doing"),
                order: 1,
            },
        ],
        tasks: vec![
            task("LAUN-1", "todo", "Write brief"),
            task("LAUN-2", "doing", "Book venue"),
            task("LAUN-3", "todo", "Draft invites"),
        ],
        members: vec![
            member("u-owner", Role::Owner),
            member("u-editor", Role::Editor),
            member("u-user", Role::User),
        ],
    }
}

use std::sync::Arc;

use jiff::Timestamp;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    auth::BearerToken,
    error::SyncError,
    models::{
        Board, NewTask, ProjectDetail, Role, Task, TaskFields, member::owner_count,
        task::next_task_id,
    },
    sync::{
        SyncContext,
        detail::{Confirmation, OpenOutcome, ProjectDetailCache},
        inflight::{EntityKey, InFlight},
    },
};

/// A task shown before the server confirmed it.
///
/// Dropping this value does not cancel the creation; the confirmation is
/// applied to the cache either way.
#[derive(Debug)]
pub struct ProvisionalTask {
    task: Task,
    handle: JoinHandle<Result<Option<Task>, SyncError>>,
}

impl ProvisionalTask {
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Waits for the server. `Ok(None)` means the task was deleted before
    /// the server confirmed it.
    pub async fn confirmed(self) -> Result<Option<Task>, SyncError> {
        match self.handle.await {
            Ok(result) => result,
            Err(join) => Err(SyncError::TaskCreateFailed {
                reason: join.to_string(),
            }),
        }
    }
}

/// Applies task, column and member changes to the open project before the
/// server confirms them, and rolls them back when it refuses.
#[derive(Clone)]
pub struct OptimisticMutator {
    detail: ProjectDetailCache,
    inflight: Arc<InFlight>,
    acting_user: String,
}

impl OptimisticMutator {
    pub fn new(detail: ProjectDetailCache, acting_user: impl Into<String>) -> Self {
        Self {
            detail,
            inflight: Arc::new(InFlight::default()),
            acting_user: acting_user.into(),
        }
    }

    pub fn detail(&self) -> &ProjectDetailCache {
        &self.detail
    }

    fn ctx(&self) -> &SyncContext {
        self.detail.ctx()
    }

    fn active_url(&self) -> Result<String, SyncError> {
        self.detail.active_url().ok_or(SyncError::NoActiveProject)
    }

    fn in_active<R>(
        &self,
        url: &str,
        f: impl FnOnce(&mut ProjectDetail) -> Result<R, SyncError>,
    ) -> Result<R, SyncError> {
        self.detail.with_state(|state| match state.active_for(url) {
            Some(detail) => f(detail),
            None => Err(SyncError::NoActiveProject),
        })
    }

    /// Applies `f` if `url` is still the open project.
    fn restore(&self, url: &str, f: impl FnOnce(&mut ProjectDetail)) {
        self.detail.with_state(|state| {
            if let Some(detail) = state.active_for(url) {
                f(detail);
            }
        });
    }

    /// Inserts a provisional `KEY-n` task into `board_id` and starts creating it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_task(
        &self,
        board_id: &str,
        name: &str,
        notes: Option<String>,
    ) -> Result<ProvisionalTask, SyncError> {
        let (url, task) = self.detail.with_state(|state| -> Result<_, SyncError> {
            let detail = state.active().ok_or(SyncError::NoActiveProject)?;
            if detail.board(board_id).is_none() {
                return Err(SyncError::BoardNotFound(board_id.to_string()));
            }
            let url = detail.project.url.clone();
            let task = Task {
                id: next_task_id(&detail.project.key, &detail.tasks),
                board_id: board_id.to_string(),
                name: name.to_string(),
                notes,
                status: None,
                created_by: self.acting_user.clone(),
                created_at: Timestamp::now(),
            };
            state.insert_provisional(&url, task.clone());
            Ok((url, task))
        })?;
        debug!(url, task = %task.id, board = board_id, "provisional task inserted");

        let payload = NewTask {
            board_id: task.board_id.clone(),
            name: task.name.clone(),
            notes: task.notes.clone(),
            suggested_id: task.id.clone(),
        };
        let handle = tokio::spawn(confirm_task(
            self.detail.clone(),
            url,
            task.id.clone(),
            payload,
        ));
        Ok(ProvisionalTask { task, handle })
    }

    /// Deletes a task. A task still awaiting creation is withdrawn locally.
    pub async fn delete_task(&self, task_id: &str) -> Result<(), SyncError> {
        let url = self.active_url()?;
        if self.detail.with_state(|state| state.withdraw(&url, task_id)) {
            info!(url, task = task_id, "provisional task withdrawn");
            return Ok(());
        }

        let _claim = self.inflight.claim(EntityKey::Task(task_id.to_string()))?;
        let token = self.ctx().token().await?;
        let (index, removed) = self.in_active(&url, |detail| {
            let index = detail
                .task_index(task_id)
                .ok_or_else(|| SyncError::TaskNotFound(task_id.to_string()))?;
            Ok((index, detail.tasks.remove(index)))
        })?;

        if let Err(error) = self.ctx().remote().delete_task(&token, &url, task_id).await {
            warn!(url, task = task_id, %error, "task delete rejected, restoring");
            self.restore(&url, |detail| {
                if detail.task_index(task_id).is_none() {
                    let at = index.min(detail.tasks.len());
                    detail.tasks.insert(at, removed);
                }
            });
            return Err(error.into());
        }
        info!(url, task = task_id, "task deleted");
        Ok(())
    }

    /// Overwrites a task locally, then replaces it with the server's copy.
    pub async fn edit_task(&self, task_id: &str, fields: TaskFields) -> Result<Task, SyncError> {
        let url = self.active_url()?;
        let key = EntityKey::Task(task_id.to_string());
        if self
            .detail
            .with_state(|state| state.is_provisional(&url, task_id))
        {
            return Err(SyncError::ConflictInProgress {
                entity: key.to_string(),
            });
        }

        let _claim = self.inflight.claim(key)?;
        let token = self.ctx().token().await?;
        let pre_image = self.in_active(&url, |detail| {
            if let Some(board_id) = &fields.board_id
                && detail.board(board_id).is_none()
            {
                return Err(SyncError::BoardNotFound(board_id.clone()));
            }
            let index = detail
                .task_index(task_id)
                .ok_or_else(|| SyncError::TaskNotFound(task_id.to_string()))?;
            let pre_image = detail.tasks[index].clone();
            detail.tasks[index].apply(&fields);
            Ok(pre_image)
        })?;

        match self
            .ctx()
            .remote()
            .update_task(&token, &url, task_id, &fields)
            .await
        {
            Ok(confirmed) => {
                let stored = confirmed.clone();
                self.restore(&url, |detail| replace_task(detail, task_id, stored));
                info!(url, task = task_id, "task updated");
                Ok(confirmed)
            }
            Err(error) => {
                warn!(url, task = task_id, %error, "task update rejected, restoring");
                self.restore(&url, |detail| replace_task(detail, task_id, pre_image));
                Err(error.into())
            }
        }
    }

    /// Renames and/or moves a column.
    pub async fn update_board(
        &self,
        board_id: &str,
        title: Option<String>,
        order: Option<i64>,
    ) -> Result<Board, SyncError> {
        let url = self.active_url()?;
        let _claim = self.inflight.claim(EntityKey::Board(board_id.to_string()))?;
        let token = self.ctx().token().await?;
        let (pre_image, updated) = self.in_active(&url, |detail| {
            let board = detail
                .boards
                .iter_mut()
                .find(|b| b.id == board_id)
                .ok_or_else(|| SyncError::BoardNotFound(board_id.to_string()))?;
            let pre_image = board.clone();
            if let Some(title) = title {
                board.title = title;
            }
            if let Some(order) = order {
                board.order = order;
            }
            Ok((pre_image, board.clone()))
        })?;

        match self
            .ctx()
            .remote()
            .update_board(&token, &url, &updated)
            .await
        {
            Ok(confirmed) => {
                let stored = confirmed.clone();
                self.restore(&url, |detail| replace_board(detail, stored));
                info!(url, board = board_id, "column updated");
                Ok(confirmed)
            }
            Err(error) => {
                warn!(url, board = board_id, %error, "column update rejected, restoring");
                self.restore(&url, |detail| replace_board(detail, pre_image));
                Err(error.into())
            }
        }
    }

    /// Removes a column and every task in it; all of it comes back on failure.
    pub async fn delete_board(&self, board_id: &str) -> Result<(), SyncError> {
        let url = self.active_url()?;
        let key = EntityKey::Board(board_id.to_string());
        let busy = self.detail.with_state(|state| {
            state.has_provisional_in_board(&url, board_id)
                || state.active().is_some_and(|detail| {
                    detail.tasks_in(board_id).any(|t| {
                        self.inflight
                            .is_claimed(&EntityKey::Task(t.id.clone()))
                    })
                })
        });
        if busy {
            return Err(SyncError::ConflictInProgress {
                entity: key.to_string(),
            });
        }

        let _claim = self.inflight.claim(key)?;
        let token = self.ctx().token().await?;
        let (board_index, board, tasks) = self.in_active(&url, |detail| {
            let board_index = detail
                .boards
                .iter()
                .position(|b| b.id == board_id)
                .ok_or_else(|| SyncError::BoardNotFound(board_id.to_string()))?;
            let board = detail.boards.remove(board_index);
            let positions: Vec<usize> = detail
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, t)| t.board_id == board_id)
                .map(|(i, _)| i)
                .collect();
            let mut tasks = Vec::with_capacity(positions.len());
            for index in positions.into_iter().rev() {
                tasks.push((index, detail.tasks.remove(index)));
            }
            tasks.reverse();
            Ok((board_index, board, tasks))
        })?;
        debug!(url, board = board_id, tasks = tasks.len(), "column removed locally");

        if let Err(error) = self.ctx().remote().delete_board(&token, &url, board_id).await {
            warn!(url, board = board_id, %error, "column delete rejected, restoring");
            self.restore(&url, |detail| {
                if detail.board(board_id).is_none() {
                    let at = board_index.min(detail.boards.len());
                    detail.boards.insert(at, board);
                }
                for (index, task) in tasks {
                    if detail.task_index(&task.id).is_none() {
                        let at = index.min(detail.tasks.len());
                        detail.tasks.insert(at, task);
                    }
                }
            });
            return Err(error.into());
        }
        info!(url, board = board_id, "column deleted");
        Ok(())
    }

    fn acting_role(&self, detail: &ProjectDetail) -> Result<Role, SyncError> {
        detail
            .member(&self.acting_user)
            .map(|m| m.role)
            .ok_or_else(|| SyncError::MemberNotFound(self.acting_user.clone()))
    }

    pub async fn remove_member(&self, user_id: &str) -> Result<(), SyncError> {
        let url = self.active_url()?;
        let _claim = self.inflight.claim(EntityKey::Member(user_id.to_string()))?;
        self.in_active(&url, |detail| {
            let acting = self.acting_role(detail)?;
            let target = detail
                .member(user_id)
                .ok_or_else(|| SyncError::MemberNotFound(user_id.to_string()))?;
            if target.role == Role::Owner && owner_count(&detail.members) <= 1 {
                return Err(SyncError::SoleOwner(user_id.to_string()));
            }
            if !acting.can_remove(target.role, user_id == self.acting_user) {
                return Err(SyncError::PermissionDenied {
                    role: acting,
                    action: "remove this member",
                });
            }
            Ok(())
        })?;

        let token = self.ctx().token().await?;
        let (index, removed) = self.in_active(&url, |detail| {
            let index = detail
                .members
                .iter()
                .position(|m| m.user_id == user_id)
                .ok_or_else(|| SyncError::MemberNotFound(user_id.to_string()))?;
            Ok((index, detail.members.remove(index)))
        })?;

        if let Err(error) = self.ctx().remote().remove_member(&token, &url, user_id).await {
            warn!(url, member = user_id, %error, "member removal rejected, restoring");
            self.restore(&url, |detail| {
                if detail.member(user_id).is_none() {
                    let at = index.min(detail.members.len());
                    detail.members.insert(at, removed);
                }
            });
            return Err(error.into());
        }
        info!(url, member = user_id, "member removed");
        Ok(())
    }

    /// Changes a member's role. Transferring ownership waits for the server
    /// and refetches the project before touching the cache.
    pub async fn update_member_role(&self, user_id: &str, role: Role) -> Result<(), SyncError> {
        let url = self.active_url()?;
        let _claim = self.inflight.claim(EntityKey::Member(user_id.to_string()))?;
        let current = self.in_active(&url, |detail| {
            let acting = self.acting_role(detail)?;
            if !acting.can_change_roles() {
                return Err(SyncError::PermissionDenied {
                    role: acting,
                    action: "change member roles",
                });
            }
            let target = detail
                .member(user_id)
                .ok_or_else(|| SyncError::MemberNotFound(user_id.to_string()))?;
            if target.role == Role::Owner
                && role != Role::Owner
                && owner_count(&detail.members) <= 1
            {
                return Err(SyncError::SoleOwner(user_id.to_string()));
            }
            Ok(target.role)
        })?;
        if current == role {
            return Ok(());
        }

        let token = self.ctx().token().await?;
        if role == Role::Owner {
            return self.transfer_ownership(&url, user_id, token).await;
        }

        self.in_active(&url, |detail| {
            set_role(detail, user_id, role);
            Ok(())
        })?;
        if let Err(error) = self
            .ctx()
            .remote()
            .update_member_role(&token, &url, user_id, role)
            .await
        {
            warn!(url, member = user_id, %error, "role change rejected, restoring");
            self.restore(&url, |detail| set_role(detail, user_id, current));
            return Err(error.into());
        }
        info!(url, member = user_id, %role, "member role changed");
        Ok(())
    }

    async fn transfer_ownership(
        &self,
        url: &str,
        user_id: &str,
        token: BearerToken,
    ) -> Result<(), SyncError> {
        self.ctx()
            .remote()
            .update_member_role(&token, url, user_id, Role::Owner)
            .await?;

        match self.detail.refresh().await? {
            OpenOutcome::Fetched => {
                let owners = self.in_active(url, |detail| {
                    let target_owns = detail
                        .member(user_id)
                        .is_some_and(|m| m.role == Role::Owner);
                    Ok((target_owns, owner_count(&detail.members)))
                });
                match owners {
                    Ok((true, 1)) => {}
                    Ok((_, count)) => {
                        warn!(
                            url,
                            member = user_id,
                            owners = count,
                            "server did not confirm ownership transfer"
                        );
                        return Err(SyncError::Rejected {
                            reason: format!(
                                "ownership transfer to {user_id} not confirmed ({count} owners reported)"
                            ),
                        });
                    }
                    // Another project was opened meanwhile
                    Err(_) => {}
                }
            }
            // A newer fetch owns the graph; keep it consistent until that lands
            OpenOutcome::Cached | OpenOutcome::StaleDiscarded => self.restore(url, |detail| {
                for member in detail.members.iter_mut() {
                    if member.user_id == user_id {
                        member.role = Role::Owner;
                    } else if member.role == Role::Owner {
                        member.role = Role::Editor;
                    }
                }
            }),
        }
        info!(url, member = user_id, "ownership transferred");
        Ok(())
    }
}

async fn confirm_task(
    detail: ProjectDetailCache,
    url: String,
    temp_id: String,
    payload: NewTask,
) -> Result<Option<Task>, SyncError> {
    let created = match create_remote(detail.ctx(), &url, &payload).await {
        Ok(created) => created,
        Err(error) => {
            warn!(url, task = %temp_id, %error, "task creation failed, removing provisional task");
            detail.with_state(|state| state.discard_provisional(&url, &temp_id));
            return Err(SyncError::TaskCreateFailed {
                reason: error.reason(),
            });
        }
    };

    match detail.with_state(|state| state.confirm(&url, &temp_id, created.clone())) {
        Confirmation::Withdrawn => {
            info!(url, task = %created.id, "task deleted before confirmation, removing it remotely");
            if let Err(error) = delete_remote(detail.ctx(), &url, &created.id).await {
                warn!(url, task = %created.id, %error, "follow-up delete failed");
            }
            Ok(None)
        }
        Confirmation::Elsewhere => {
            debug!(url, task = %created.id, "task confirmed after its project was closed");
            Ok(Some(created))
        }
        Confirmation::Replaced | Confirmation::Appended => {
            info!(url, provisional = %temp_id, task = %created.id, "task created");
            Ok(Some(created))
        }
    }
}

async fn create_remote(ctx: &SyncContext, url: &str, payload: &NewTask) -> Result<Task, SyncError> {
    let token = ctx.token().await?;
    Ok(ctx.remote().create_task(&token, url, payload).await?)
}

async fn delete_remote(ctx: &SyncContext, url: &str, task_id: &str) -> Result<(), SyncError> {
    let token = ctx.token().await?;
    Ok(ctx.remote().delete_task(&token, url, task_id).await?)
}

fn replace_task(detail: &mut ProjectDetail, task_id: &str, task: Task) {
    if let Some(index) = detail.task_index(task_id) {
        detail.tasks[index] = task;
    }
}

fn replace_board(detail: &mut ProjectDetail, board: Board) {
    if let Some(stored) = detail.boards.iter_mut().find(|b| b.id == board.id) {
        *stored = board;
    }
}

fn set_role(detail: &mut ProjectDetail, user_id: &str, role: Role) {
    if let Some(member) = detail.members.iter_mut().find(|m| m.user_id == user_id) {
        member.role = role;
    }
}

use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    error::SyncError,
    models::{Project, ProjectDetail, Task},
    sync::{
        SyncContext,
        guard::{Fetched, ResourceKey, Signature},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Fetched,
    /// The cached graph already matched the requested signature.
    Cached,
    /// Another open was issued while this one was in flight.
    StaleDiscarded,
}

/// Task created locally whose server confirmation has not arrived yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingTask {
    project_url: String,
    temp_id: String,
}

impl PendingTask {
    fn new(project_url: &str, temp_id: &str) -> Self {
        Self {
            project_url: project_url.to_string(),
            temp_id: temp_id.to_string(),
        }
    }
}

/// What a server confirmation did to the cache.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Confirmation {
    /// The provisional task was swapped for the confirmed one in place.
    Replaced,
    /// The provisional task was gone (refetch raced it), the confirmed one was appended.
    Appended,
    /// The provisional task was deleted before confirmation; nothing was inserted.
    Withdrawn,
    /// A different project is open now.
    Elsewhere,
}

#[derive(Default)]
pub(crate) struct DetailState {
    active: Option<ProjectDetail>,
    provisional: HashSet<PendingTask>,
    withdrawn: HashSet<PendingTask>,
}

impl DetailState {
    pub(crate) fn active(&self) -> Option<&ProjectDetail> {
        self.active.as_ref()
    }

    /// The open project's graph, only if `url` is the open project.
    pub(crate) fn active_for(&mut self, url: &str) -> Option<&mut ProjectDetail> {
        self.active.as_mut().filter(|d| d.project.url == url)
    }

    pub(crate) fn is_provisional(&self, url: &str, task_id: &str) -> bool {
        self.provisional.contains(&PendingTask::new(url, task_id))
    }

    pub(crate) fn has_provisional_in_board(&self, url: &str, board_id: &str) -> bool {
        let Some(detail) = self.active.as_ref().filter(|d| d.project.url == url) else {
            return false;
        };
        detail
            .tasks
            .iter()
            .any(|t| t.board_id == board_id && self.is_provisional(url, &t.id))
    }

    pub(crate) fn insert_provisional(&mut self, url: &str, task: Task) -> bool {
        let pending = PendingTask::new(url, &task.id);
        match self.active_for(url) {
            Some(detail) => {
                detail.tasks.push(task);
                self.provisional.insert(pending);
                true
            }
            None => false,
        }
    }

    /// Removes a still-provisional task; its later confirmation becomes a no-op.
    pub(crate) fn withdraw(&mut self, url: &str, temp_id: &str) -> bool {
        let pending = PendingTask::new(url, temp_id);
        if !self.provisional.remove(&pending) {
            return false;
        }
        if let Some(detail) = self.active_for(url) {
            detail.tasks.retain(|t| t.id != temp_id);
        }
        self.withdrawn.insert(pending);
        true
    }

    pub(crate) fn confirm(&mut self, url: &str, temp_id: &str, confirmed: Task) -> Confirmation {
        let pending = PendingTask::new(url, temp_id);
        if self.withdrawn.remove(&pending) {
            // A refresh may have brought in the task that is about to be deleted
            if let Some(detail) = self.active_for(url) {
                detail.tasks.retain(|t| t.id != confirmed.id);
            }
            return Confirmation::Withdrawn;
        }
        self.provisional.remove(&pending);

        let Some(detail) = self.active_for(url) else {
            return Confirmation::Elsewhere;
        };
        let slot = detail.task_index(temp_id);
        if let Some(index) = slot {
            detail.tasks.remove(index);
        }
        // A refresh may already have brought the confirmed task in
        if let Some(index) = detail.task_index(&confirmed.id) {
            detail.tasks[index] = confirmed;
            Confirmation::Replaced
        } else if let Some(index) = slot {
            detail.tasks.insert(index, confirmed);
            Confirmation::Replaced
        } else {
            detail.tasks.push(confirmed);
            Confirmation::Appended
        }
    }

    /// Drops a provisional task whose creation failed.
    pub(crate) fn discard_provisional(&mut self, url: &str, temp_id: &str) {
        let pending = PendingTask::new(url, temp_id);
        self.withdrawn.remove(&pending);
        if self.provisional.remove(&pending) {
            if let Some(detail) = self.active_for(url) {
                detail.tasks.retain(|t| t.id != temp_id);
            }
        }
    }

    fn install(&mut self, mut detail: ProjectDetail) {
        let url = detail.project.url.clone();
        if let Some(previous) = self.active.take() {
            if previous.project.url == url {
                // Provisional tasks are not on the server yet, keep showing them
                let carried: Vec<Task> = previous
                    .tasks
                    .into_iter()
                    .filter(|t| self.provisional.contains(&PendingTask::new(&url, &t.id)))
                    .filter(|t| detail.task_index(&t.id).is_none())
                    .collect();
                detail.tasks.extend(carried);
            } else {
                debug!(from = %previous.project.url, to = %url, "switching open project");
            }
        }
        self.active = Some(detail);
    }
}

/// Detail graph (boards, tasks, members) of the single open project.
#[derive(Clone)]
pub struct ProjectDetailCache {
    ctx: SyncContext,
    state: Arc<Mutex<DetailState>>,
}

impl ProjectDetailCache {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            state: Arc::new(Mutex::new(DetailState::default())),
        }
    }

    /// Opens `url`, replacing whichever project was open.
    ///
    /// With a `signature` (usually [`Signature::of_project`] of the list entry),
    /// an already open and unchanged project is served from cache.
    pub async fn open(
        &self,
        url: &str,
        signature: Option<Signature>,
    ) -> Result<OpenOutcome, SyncError> {
        let key = ResourceKey::project_detail(url);
        if let Some(signature) = signature
            && self.active_url().as_deref() == Some(url)
            && self.ctx.guard().should_skip(&key, &signature)
        {
            debug!(url, "project detail served from cache");
            return Ok(OpenOutcome::Cached);
        }
        self.fetch(url).await
    }

    /// Refetches the open project.
    pub async fn refresh(&self) -> Result<OpenOutcome, SyncError> {
        let url = self.active_url().ok_or(SyncError::NoActiveProject)?;
        self.fetch(&url).await
    }

    async fn fetch(&self, url: &str) -> Result<OpenOutcome, SyncError> {
        let token = self.ctx.token().await?;
        let key = ResourceKey::project_detail(url);
        let fetch = self.ctx.guard().begin_fetch(&key);

        let detail = self.ctx.remote().project_detail(&token, url).await?;

        let detail = match self.ctx.guard().settle(&key, fetch, detail) {
            Fetched::Current(detail) => detail,
            Fetched::Stale => return Ok(OpenOutcome::StaleDiscarded),
        };

        let signature = Signature::of_detail(&detail);
        info!(
            url,
            boards = detail.boards.len(),
            tasks = detail.tasks.len(),
            members = detail.members.len(),
            "project detail loaded"
        );
        self.state.lock().install(detail);
        self.ctx.guard().record(&key, signature);
        Ok(OpenOutcome::Fetched)
    }

    pub fn current(&self) -> Option<ProjectDetail> {
        self.state.lock().active().cloned()
    }

    pub fn active_url(&self) -> Option<String> {
        self.state.lock().active().map(|d| d.project.url.clone())
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        let state = self.state.lock();
        let detail = state.active()?;
        detail.tasks.iter().find(|t| t.id == task_id).cloned()
    }

    /// Copies confirmed project metadata into the open graph.
    pub fn update_project(&self, project: &Project) {
        if let Some(detail) = self.state.lock().active_for(&project.url) {
            detail.project = project.clone();
        }
    }

    pub fn close(&self) {
        let closed = self.state.lock().active.take();
        if let Some(detail) = closed {
            self.ctx
                .guard()
                .forget(&ResourceKey::project_detail(&detail.project.url));
        }
    }

    pub(crate) fn ctx(&self) -> &SyncContext {
        &self.ctx
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut DetailState) -> R) -> R {
        f(&mut self.state.lock())
    }
}

use std::sync::Arc;

use tracing::info;

use crate::{
    auth::AuthTokenSource,
    error::SyncError,
    models::{Invitation, NewProject, Project, ProjectFields},
    remote::RemoteStore,
    sync::{
        SyncContext,
        detail::{OpenOutcome, ProjectDetailCache},
        guard::Signature,
        mutator::OptimisticMutator,
        projects::{LoadOutcome, ProjectCache},
        reorder::ReorderReconciler,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub display_name: Option<String>,
}

impl SessionUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }
}

/// Caches and mutators of one signed-in user. Nothing here outlives it.
pub struct Session {
    user: SessionUser,
    ctx: SyncContext,
    projects: ProjectCache,
    detail: ProjectDetailCache,
    mutator: OptimisticMutator,
    reorder: ReorderReconciler,
}

impl Session {
    fn new(ctx: SyncContext, user: SessionUser) -> Self {
        let projects = ProjectCache::new(ctx.clone());
        let detail = ProjectDetailCache::new(ctx.clone());
        let mutator = OptimisticMutator::new(detail.clone(), user.id.clone());
        let reorder = ReorderReconciler::new(projects.clone());
        Self {
            user,
            ctx,
            projects,
            detail,
            mutator,
            reorder,
        }
    }

    pub fn user(&self) -> &SessionUser {
        &self.user
    }

    pub fn projects(&self) -> &ProjectCache {
        &self.projects
    }

    pub fn detail(&self) -> &ProjectDetailCache {
        &self.detail
    }

    pub fn mutator(&self) -> &OptimisticMutator {
        &self.mutator
    }

    pub fn reorder(&self) -> &ReorderReconciler {
        &self.reorder
    }

    pub async fn load_projects(&self) -> Result<LoadOutcome, SyncError> {
        self.projects.load(&self.user.id).await
    }

    pub async fn create_project(&self, payload: NewProject) -> Result<Project, SyncError> {
        self.projects.create(payload).await
    }

    /// Opens a project, served from cache when its list entry is unchanged.
    pub async fn open_project(&self, url: &str) -> Result<OpenOutcome, SyncError> {
        let signature = self.projects.get(url).map(|p| Signature::of_project(&p));
        self.detail.open(url, signature).await
    }

    pub async fn update_project(
        &self,
        url: &str,
        fields: ProjectFields,
    ) -> Result<Project, SyncError> {
        let project = self.projects.update(url, fields).await?;
        self.detail.update_project(&project);
        Ok(project)
    }

    pub async fn delete_project(&self, url: &str) -> Result<Project, SyncError> {
        let removed = self.projects.delete(url).await?;
        if self.detail.active_url().as_deref() == Some(url) {
            self.detail.close();
        }
        Ok(removed)
    }

    pub async fn view_invitation(&self, invite_token: &str) -> Result<Invitation, SyncError> {
        let token = self.ctx.token().await?;
        Ok(self.ctx.remote().invitation(&token, invite_token).await?)
    }

    /// Accepts an invitation, then reloads whatever membership it changed.
    pub async fn accept_invitation(&self, invite_token: &str) -> Result<Invitation, SyncError> {
        let token = self.ctx.token().await?;
        let invitation = self
            .ctx
            .remote()
            .accept_invitation(&token, invite_token)
            .await?;
        info!(project = %invitation.project_id, "invitation accepted");

        self.projects.load(&self.user.id).await?;
        let affects_open_project = self.detail.current().is_some_and(|detail| {
            detail.project.id == invitation.project_id
                || invitation.project_url.as_deref() == Some(detail.url())
        });
        if affects_open_project {
            self.detail.refresh().await?;
        }
        Ok(invitation)
    }
}

/// Entry point: owns the remote collaborators and at most one session.
pub struct SyncCore {
    remote: Arc<dyn RemoteStore>,
    tokens: Arc<dyn AuthTokenSource>,
    session: Option<Session>,
}

impl SyncCore {
    pub fn new(remote: Arc<dyn RemoteStore>, tokens: Arc<dyn AuthTokenSource>) -> Self {
        Self {
            remote,
            tokens,
            session: None,
        }
    }

    /// Starts a session for `user` with empty caches, ending any previous one.
    pub fn init(&mut self, user: SessionUser) -> &Session {
        self.teardown();
        info!(user = %user.id, "session started");
        let ctx = SyncContext::new(Arc::clone(&self.remote), Arc::clone(&self.tokens));
        self.session.insert(Session::new(ctx, user))
    }

    pub fn session(&self) -> Result<&Session, SyncError> {
        self.session.as_ref().ok_or(SyncError::NoSession)
    }

    /// Drops every cache of the current session.
    pub fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            info!(user = %session.user.id, "session ended");
        }
    }
}

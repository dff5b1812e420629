use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::SyncError,
    models::{
        NewProject, Project, ProjectFields,
        project::{next_order, sort_for_display},
    },
    sync::{
        SyncContext,
        guard::{Fetched, ResourceKey, Signature},
        inflight::KeyedLocks,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The cache now holds the fetched list.
    Replaced(usize),
    /// The fetched list matched what was already cached.
    Unchanged,
    /// A newer load was issued while this one was in flight; its result was dropped.
    StaleDiscarded,
}

/// Canonical list of the user's projects, including pin flag and order.
#[derive(Clone)]
pub struct ProjectCache {
    ctx: SyncContext,
    entries: Arc<Mutex<Vec<Project>>>,
    locks: Arc<KeyedLocks>,
}

impl ProjectCache {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            entries: Arc::new(Mutex::new(Vec::new())),
            locks: Arc::new(KeyedLocks::default()),
        }
    }

    /// Replaces the cache with every project visible to `user_id`.
    ///
    /// On failure the previous contents are kept untouched.
    pub async fn load(&self, user_id: &str) -> Result<LoadOutcome, SyncError> {
        let token = self.ctx.token().await?;
        let key = ResourceKey::project_list(user_id);
        let fetch = self.ctx.guard().begin_fetch(&key);

        let projects = self.ctx.remote().list_projects(&token).await?;

        let projects = match self.ctx.guard().settle(&key, fetch, projects) {
            Fetched::Current(projects) => dedup_by_url(projects),
            Fetched::Stale => return Ok(LoadOutcome::StaleDiscarded),
        };

        let signature = Signature::of_projects(&projects);
        if self.ctx.guard().should_skip(&key, &signature) {
            debug!(user_id, "project list unchanged");
            return Ok(LoadOutcome::Unchanged);
        }

        let count = projects.len();
        *self.entries.lock() = projects;
        self.ctx.guard().record(&key, signature);
        info!(user_id, count, "project list loaded");
        Ok(LoadOutcome::Replaced(count))
    }

    /// Creates a project and appends it once the server confirmed it.
    pub async fn create(&self, payload: NewProject) -> Result<Project, SyncError> {
        let token = self.ctx.token().await?;
        let mut project = self
            .ctx
            .remote()
            .create_project(&token, &payload)
            .await
            .map_err(|e| create_rejected(e.into()))?;

        let mut entries = self.entries.lock();
        if let Some(existing) = entries.iter_mut().find(|p| p.url == project.url) {
            // A reload raced ahead of the confirmation and already holds it
            warn!(url = %project.url, "created project already cached");
            *existing = project.clone();
        } else {
            project.is_pinned = false;
            project.order = next_order(entries.iter(), false);
            entries.push(project.clone());
        }
        info!(url = %project.url, "project created");
        Ok(project)
    }

    /// Updates name/key/description after server confirmation.
    pub async fn update(&self, url: &str, fields: ProjectFields) -> Result<Project, SyncError> {
        let _serialized = self.locks.acquire(url).await;
        if self.get(url).is_none() {
            return Err(SyncError::ProjectNotFound(url.to_string()));
        }

        let token = self.ctx.token().await?;
        let confirmed = self
            .ctx
            .remote()
            .update_project(&token, url, &fields)
            .await?;

        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|p| p.url == url)
            .ok_or_else(|| SyncError::ProjectNotFound(url.to_string()))?;

        if confirmed.url != url {
            warn!(url, returned = %confirmed.url, "server reported a different url, keeping the cached one");
        }
        entry.name = confirmed.name;
        entry.key = confirmed.key;
        entry.description = confirmed.description;
        entry.updated_at = confirmed.updated_at;
        info!(url, "project updated");
        Ok(entry.clone())
    }

    /// Deletes a project after server confirmation and returns the removed entry.
    pub async fn delete(&self, url: &str) -> Result<Project, SyncError> {
        let _serialized = self.locks.acquire(url).await;
        if self.get(url).is_none() {
            return Err(SyncError::ProjectNotFound(url.to_string()));
        }

        let token = self.ctx.token().await?;
        self.ctx.remote().delete_project(&token, url).await?;

        let mut entries = self.entries.lock();
        let index = entries
            .iter()
            .position(|p| p.url == url)
            .ok_or_else(|| SyncError::ProjectNotFound(url.to_string()))?;
        let removed = entries.remove(index);
        info!(url, "project deleted");
        Ok(removed)
    }

    pub fn get(&self, url: &str) -> Option<Project> {
        self.entries.lock().iter().find(|p| p.url == url).cloned()
    }

    /// Entries in cache order.
    pub fn snapshot(&self) -> Vec<Project> {
        self.entries.lock().clone()
    }

    /// Entries in display order: pinned first, then by `order`.
    pub fn ordered(&self) -> Vec<Project> {
        let mut projects = self.snapshot();
        sort_for_display(&mut projects);
        projects
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub(crate) fn ctx(&self) -> &SyncContext {
        &self.ctx
    }

    pub(crate) fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    pub(crate) fn with_entries<R>(&self, f: impl FnOnce(&mut Vec<Project>) -> R) -> R {
        f(&mut self.entries.lock())
    }
}

fn create_rejected(error: SyncError) -> SyncError {
    SyncError::CreateRejected {
        reason: error.reason(),
    }
}

fn dedup_by_url(projects: Vec<Project>) -> Vec<Project> {
    let mut seen = HashSet::new();
    projects
        .into_iter()
        .filter(|p| {
            let fresh = seen.insert(p.url.clone());
            if !fresh {
                warn!(url = %p.url, "duplicate project in list response dropped");
            }
            fresh
        })
        .collect()
}

use std::sync::Arc;

use crate::{
    auth::{AuthTokenSource, BearerToken},
    error::SyncError,
    remote::RemoteStore,
};

pub mod detail;
pub mod editor;
pub mod guard;
pub mod inflight;
pub mod mutator;
pub mod projects;
pub mod reorder;

use guard::RequestGuard;

/// Collaborators shared by every cache of one session.
#[derive(Clone)]
pub struct SyncContext {
    remote: Arc<dyn RemoteStore>,
    tokens: Arc<dyn AuthTokenSource>,
    guard: Arc<RequestGuard>,
}

impl SyncContext {
    pub fn new(remote: Arc<dyn RemoteStore>, tokens: Arc<dyn AuthTokenSource>) -> Self {
        Self {
            remote,
            tokens,
            guard: Arc::new(RequestGuard::default()),
        }
    }

    pub fn remote(&self) -> &dyn RemoteStore {
        self.remote.as_ref()
    }

    pub fn guard(&self) -> &RequestGuard {
        &self.guard
    }

    /// Asks the token source for a new credential. Called once per outbound request.
    pub async fn token(&self) -> Result<BearerToken, SyncError> {
        self.tokens
            .fresh_token()
            .await
            .ok_or(SyncError::AuthRequired)
    }
}

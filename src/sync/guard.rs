//! Discards fetch results that were superseded while in flight.
//!
//! Every cache-populating fetch calls [`RequestGuard::begin_fetch`] before
//! suspending and checks [`RequestGuard::is_current`] before writing. A fetch
//! that lost the race is dropped silently; that is a no-op, not an error.

use std::{collections::HashMap, fmt};

use parking_lot::Mutex;
use tracing::debug;

use crate::models::{Project, ProjectDetail};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    ProjectList,
    ProjectDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    class: ResourceClass,
    id: String,
}

impl ResourceKey {
    pub fn project_list(user_id: &str) -> Self {
        Self {
            class: ResourceClass::ProjectList,
            id: user_id.to_string(),
        }
    }

    pub fn project_detail(url: &str) -> Self {
        Self {
            class: ResourceClass::ProjectDetail,
            id: url.to_string(),
        }
    }

    pub fn class(&self) -> ResourceClass {
        self.class
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.class, self.id)
    }
}

/// Proof of a `begin_fetch` call; compared against the latest issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchToken {
    class: ResourceClass,
    seq: u64,
}

/// Digest of the server-reported ids and versions a cache entry was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 32]);

impl Signature {
    pub fn of_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Signature(*hasher.finalize().as_bytes())
    }

    /// Signature of a project as seen in the project list.
    pub fn of_project(project: &Project) -> Self {
        let updated_at = project.updated_at.to_string();
        Self::of_parts([project.id.as_str(), project.url.as_str(), updated_at.as_str()])
    }

    pub fn of_projects(projects: &[Project]) -> Self {
        let versions: Vec<String> = projects
            .iter()
            .map(|p| format!("{}@{}#{}:{}", p.id, p.updated_at, p.is_pinned, p.order))
            .collect();
        Self::of_parts(versions.iter().map(String::as_str))
    }

    pub fn of_detail(detail: &ProjectDetail) -> Self {
        Self::of_project(&detail.project)
    }
}

/// Outcome of settling a fetch through the guard.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Current(T),
    Stale,
}

#[derive(Default)]
struct GuardState {
    next_seq: u64,
    latest: HashMap<ResourceClass, (ResourceKey, u64)>,
    signatures: HashMap<ResourceKey, Signature>,
}

#[derive(Default)]
pub struct RequestGuard {
    state: Mutex<GuardState>,
}

impl RequestGuard {
    /// Records `key` as the latest request of its class.
    pub fn begin_fetch(&self, key: &ResourceKey) -> FetchToken {
        let mut state = self.state.lock();
        state.next_seq += 1;
        let seq = state.next_seq;
        state.latest.insert(key.class, (key.clone(), seq));
        debug!(%key, seq, "fetch issued");
        FetchToken {
            class: key.class,
            seq,
        }
    }

    /// True only if nothing newer was issued for the class since `token` was minted
    /// and `key` is the class's latest key.
    pub fn is_current(&self, key: &ResourceKey, token: FetchToken) -> bool {
        if key.class != token.class {
            return false;
        }
        let state = self.state.lock();
        matches!(
            state.latest.get(&key.class),
            Some((latest_key, seq)) if *seq == token.seq && latest_key == key
        )
    }

    /// True when the cache already holds data for `key` built from `signature`.
    pub fn should_skip(&self, key: &ResourceKey, signature: &Signature) -> bool {
        self.state.lock().signatures.get(key) == Some(signature)
    }

    pub fn record(&self, key: &ResourceKey, signature: Signature) {
        self.state.lock().signatures.insert(key.clone(), signature);
    }

    pub fn forget(&self, key: &ResourceKey) {
        self.state.lock().signatures.remove(key);
    }

    /// Wraps a completed fetch: `Stale` when it was superseded while in flight.
    pub fn settle<T>(&self, key: &ResourceKey, token: FetchToken, value: T) -> Fetched<T> {
        if self.is_current(key, token) {
            Fetched::Current(value)
        } else {
            debug!(%key, seq = token.seq, "stale fetch discarded");
            Fetched::Stale
        }
    }
}

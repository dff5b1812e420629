//! Per-entity serialization of mutations.
//!
//! Tasks, boards and members reject a second mutation while one is pending
//! ([`InFlight`]); projects queue behind the pending one ([`KeyedLocks`]).

use std::{collections::HashMap, collections::HashSet, fmt, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Task(String),
    Board(String),
    Member(String),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Task(id) => write!(f, "task {id}"),
            EntityKey::Board(id) => write!(f, "column {id}"),
            EntityKey::Member(id) => write!(f, "member {id}"),
        }
    }
}

#[derive(Default)]
pub struct InFlight {
    keys: Arc<Mutex<HashSet<EntityKey>>>,
}

impl InFlight {
    /// Claims `key` until the returned claim is dropped.
    pub fn claim(&self, key: EntityKey) -> Result<InFlightClaim, SyncError> {
        let mut keys = self.keys.lock();
        if keys.contains(&key) {
            return Err(SyncError::ConflictInProgress {
                entity: key.to_string(),
            });
        }
        keys.insert(key.clone());
        Ok(InFlightClaim {
            keys: Arc::clone(&self.keys),
            key,
        })
    }

    pub fn is_claimed(&self, key: &EntityKey) -> bool {
        self.keys.lock().contains(key)
    }
}

#[must_use = "the entity is released as soon as the claim is dropped"]
pub struct InFlightClaim {
    keys: Arc<Mutex<HashSet<EntityKey>>>,
    key: EntityKey,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.keys.lock().remove(&self.key);
    }
}

/// Async locks keyed by string; a second caller waits for the first.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Nobody holds or waits on a lock whose only reference is the map's
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

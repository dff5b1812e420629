//! Pin toggles and manual reordering of the project list.
//!
//! Both apply to [`ProjectCache`] immediately. Reorders are sent one batch at
//! a time; requests arriving while a batch is in flight are folded into a
//! single pending batch. A batch holds the per-project locks of every project
//! it names until it settles, so pin toggles of those projects wait for it.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::Mutex;
use tokio::sync::{OwnedMutexGuard, oneshot};
use tracing::{debug, info, warn};

use crate::{
    error::SyncError,
    models::{PinState, Project, ProjectOrder, project::next_order},
    sync::{SyncContext, projects::ProjectCache},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    /// The server accepted a batch containing this request.
    Applied,
    /// A later request replaced this one before it was sent.
    Superseded,
}

type Reply = oneshot::Sender<Result<ReorderOutcome, SyncError>>;

struct PendingBatch {
    orders: Vec<ProjectOrder>,
    /// Orders to restore if the batch fails, captured before any optimistic write.
    snapshot: HashMap<String, i64>,
    reply: Reply,
    hold: ReorderHold,
}

/// A project lock taken for reorders, shared by every batch naming the project.
struct Hold {
    _guard: OwnedMutexGuard<()>,
    batches: usize,
}

type Holds = Arc<Mutex<HashMap<String, Hold>>>;

/// Share of [`Hold`]s owned by one batch; released on drop.
struct ReorderHold {
    holds: Holds,
    urls: Vec<String>,
}

impl ReorderHold {
    fn absorb(&mut self, mut other: ReorderHold) {
        self.urls.append(&mut other.urls);
    }
}

impl Drop for ReorderHold {
    fn drop(&mut self) {
        let mut holds = self.holds.lock();
        for url in &self.urls {
            if let Some(hold) = holds.get_mut(url) {
                hold.batches -= 1;
                if hold.batches == 0 {
                    holds.remove(url);
                }
            }
        }
    }
}

#[derive(Default)]
struct BatchQueue {
    in_flight: bool,
    pending: Option<PendingBatch>,
}

#[derive(Clone)]
pub struct ReorderReconciler {
    projects: ProjectCache,
    /// Slot each project last left, reused when it toggles back.
    parked: Arc<Mutex<HashMap<String, PinState>>>,
    batches: Arc<Mutex<BatchQueue>>,
    holds: Holds,
}

impl ReorderReconciler {
    pub fn new(projects: ProjectCache) -> Self {
        Self {
            projects,
            parked: Arc::new(Mutex::new(HashMap::new())),
            batches: Arc::new(Mutex::new(BatchQueue::default())),
            holds: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn ctx(&self) -> &SyncContext {
        self.projects.ctx()
    }

    /// Pins an unpinned project or unpins a pinned one.
    ///
    /// The project lands at the end of its new group, or back in the slot it
    /// left there if nobody took it meanwhile.
    pub async fn toggle_pin(&self, url: &str) -> Result<Project, SyncError> {
        let _serialized = self.projects.locks().acquire(url).await;
        let token = self.ctx().token().await?;

        let (before, after) = self.projects.with_entries(|entries| {
            let index = entries
                .iter()
                .position(|p| p.url == url)
                .ok_or_else(|| SyncError::ProjectNotFound(url.to_string()))?;
            let before = entries[index].pin_state();
            let target = !before.is_pinned;
            let slot_free = |order: i64| {
                !entries
                    .iter()
                    .any(|p| p.url != url && p.is_pinned == target && p.order == order)
            };
            let order = match self.parked.lock().get(url) {
                Some(slot) if slot.is_pinned == target && slot_free(slot.order) => slot.order,
                _ => next_order(entries.iter().filter(|p| p.url != url), target),
            };
            let after = PinState {
                is_pinned: target,
                order,
            };
            entries[index].is_pinned = after.is_pinned;
            entries[index].order = after.order;
            Ok::<_, SyncError>((before, after))
        })?;
        let previous_slot = self.parked.lock().insert(url.to_string(), before);
        let operation = if after.is_pinned { "pin" } else { "unpin" };
        debug!(url, operation, order = after.order, "pin toggled locally");

        if let Err(error) = self.ctx().remote().set_pin(&token, url, &after).await {
            warn!(url, operation, %error, "pin toggle rejected, restoring");
            self.projects.with_entries(|entries| {
                if let Some(project) = entries.iter_mut().find(|p| p.url == url) {
                    project.is_pinned = before.is_pinned;
                    project.order = before.order;
                }
            });
            let mut parked = self.parked.lock();
            match previous_slot {
                Some(slot) => parked.insert(url.to_string(), slot),
                None => parked.remove(url),
            };
            return Err(SyncError::OrderingFailed {
                operation,
                projects: vec![url.to_string()],
                reason: SyncError::from(error).reason(),
            });
        }

        info!(url, operation, order = after.order, "pin state saved");
        self.projects
            .get(url)
            .ok_or_else(|| SyncError::ProjectNotFound(url.to_string()))
    }

    /// Applies new positions within the unpinned group.
    ///
    /// Waits for pin toggles of the named projects to settle first. Pinned
    /// and unknown projects are skipped. Resolves once the batch that carries
    /// this request settles, or with `Superseded` when a later request
    /// replaced it first.
    pub async fn reorder(&self, orders: Vec<ProjectOrder>) -> Result<ReorderOutcome, SyncError> {
        let hold = self.hold(&orders).await;
        let (orders, snapshot) = self.projects.with_entries(|entries| {
            let mut applied = Vec::with_capacity(orders.len());
            let mut snapshot = HashMap::new();
            for entry in orders {
                match entries.iter_mut().find(|p| p.url == entry.project_url) {
                    Some(project) if !project.is_pinned => {
                        snapshot.entry(project.url.clone()).or_insert(project.order);
                        project.order = entry.order;
                        applied.push(entry);
                    }
                    Some(_) => debug!(url = %entry.project_url, "pinned project skipped by reorder"),
                    None => debug!(url = %entry.project_url, "unknown project skipped by reorder"),
                }
            }
            (applied, snapshot)
        });
        if orders.is_empty() {
            return Ok(ReorderOutcome::Applied);
        }
        let urls: Vec<String> = orders.iter().map(|o| o.project_url.clone()).collect();

        let (reply, receiver) = oneshot::channel();
        let mut batch = PendingBatch {
            orders,
            snapshot,
            reply,
            hold,
        };
        {
            let mut queue = self.batches.lock();
            if queue.in_flight {
                if let Some(replaced) = queue.pending.take() {
                    coalesce(&mut batch, replaced);
                }
                debug!(projects = batch.orders.len(), "reorder queued behind batch in flight");
                queue.pending = Some(batch);
            } else {
                queue.in_flight = true;
                let this = self.clone();
                tokio::spawn(async move { this.drain(batch).await });
            }
        }

        receiver.await.unwrap_or_else(|_| {
            Err(SyncError::OrderingFailed {
                operation: "reorder",
                projects: urls,
                reason: String::from("reorder was abandoned"),
            })
        })
    }

    /// Takes the project locks for `orders` in url order. Locks another batch
    /// already holds are shared instead of awaited.
    async fn hold(&self, orders: &[ProjectOrder]) -> ReorderHold {
        let mut urls: Vec<&str> = orders.iter().map(|o| o.project_url.as_str()).collect();
        urls.sort_unstable();
        urls.dedup();

        let mut hold = ReorderHold {
            holds: Arc::clone(&self.holds),
            urls: Vec::with_capacity(urls.len()),
        };
        for url in urls {
            let shared = match self.holds.lock().get_mut(url) {
                Some(existing) => {
                    existing.batches += 1;
                    true
                }
                None => false,
            };
            if !shared {
                let guard = self.projects.locks().acquire(url).await;
                self.holds.lock().insert(
                    url.to_string(),
                    Hold {
                        _guard: guard,
                        batches: 1,
                    },
                );
            }
            hold.urls.push(url.to_string());
        }
        hold
    }

    /// Sends `batch`, then every batch queued behind it, one at a time.
    async fn drain(&self, mut batch: PendingBatch) {
        loop {
            let PendingBatch {
                orders,
                snapshot,
                reply,
                hold,
            } = batch;
            let result = submit(self.ctx(), &orders).await;
            let (outcome, next) = self.finish(&orders, snapshot, result);
            drop(hold);
            // The caller may have stopped waiting
            let _ = reply.send(outcome);
            match next {
                Some(next) => batch = next,
                None => break,
            }
        }
    }

    fn finish(
        &self,
        orders: &[ProjectOrder],
        snapshot: HashMap<String, i64>,
        result: Result<(), SyncError>,
    ) -> (Result<ReorderOutcome, SyncError>, Option<PendingBatch>) {
        let mut queue = self.batches.lock();
        let outcome = match result {
            Ok(()) => {
                info!(projects = orders.len(), "project order saved");
                Ok(ReorderOutcome::Applied)
            }
            Err(error) => {
                warn!(projects = orders.len(), %error, "reorder rejected, restoring");
                let restore = match queue.pending.as_mut() {
                    // The queued batch decides the projects it covers
                    Some(pending) => {
                        let covered: HashSet<&str> = pending
                            .orders
                            .iter()
                            .map(|o| o.project_url.as_str())
                            .collect();
                        let (carried, restore): (HashMap<_, _>, HashMap<_, _>) = snapshot
                            .into_iter()
                            .partition(|(url, _)| covered.contains(url.as_str()));
                        pending.snapshot.extend(carried);
                        restore
                    }
                    None => snapshot,
                };
                self.restore_orders(&restore);
                Err(SyncError::OrderingFailed {
                    operation: "reorder",
                    projects: orders.iter().map(|o| o.project_url.clone()).collect(),
                    reason: error.reason(),
                })
            }
        };
        let next = queue.pending.take();
        if next.is_none() {
            queue.in_flight = false;
        }
        (outcome, next)
    }

    /// Projects pinned meanwhile are left alone; their order belongs to the pinned group.
    fn restore_orders(&self, snapshot: &HashMap<String, i64>) {
        self.projects.with_entries(|entries| {
            for project in entries.iter_mut().filter(|p| !p.is_pinned) {
                if let Some(order) = snapshot.get(&project.url) {
                    project.order = *order;
                }
            }
        });
    }
}

/// Folds an older queued batch into `batch`; `batch`'s orders win.
fn coalesce(batch: &mut PendingBatch, replaced: PendingBatch) {
    let covered: HashSet<String> = batch.orders.iter().map(|o| o.project_url.clone()).collect();
    let mut orders: Vec<ProjectOrder> = replaced
        .orders
        .into_iter()
        .filter(|o| !covered.contains(&o.project_url))
        .collect();
    orders.append(&mut batch.orders);
    batch.orders = orders;

    // The older snapshot predates this batch's optimistic writes
    batch.snapshot.extend(replaced.snapshot);
    batch.hold.absorb(replaced.hold);
    let _ = replaced.reply.send(Ok(ReorderOutcome::Superseded));
}

async fn submit(ctx: &SyncContext, orders: &[ProjectOrder]) -> Result<(), SyncError> {
    let token = ctx.token().await?;
    Ok(ctx.remote().set_order(&token, orders).await?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        remote::RemoteError,
        testing::{self, Call, CountingTokens, Endpoint, MockRemote, project},
    };

    async fn reconciler(
        projects: Vec<Project>,
    ) -> (Arc<MockRemote>, Arc<CountingTokens>, ReorderReconciler) {
        let remote = MockRemote::with_projects(projects);
        let tokens = CountingTokens::new();
        let cache = ProjectCache::new(testing::context(&remote, &tokens));
        cache.load("u-owner").await.unwrap();
        (remote, tokens, ReorderReconciler::new(cache))
    }

    fn board_of_three() -> Vec<Project> {
        vec![
            project("alpha", false, 0),
            project("beta", false, 1),
            project("gamma", false, 2),
            project("delta", true, 0),
        ]
    }

    fn states(reconciler: &ReorderReconciler) -> Vec<(String, bool, i64)> {
        reconciler
            .projects
            .snapshot()
            .into_iter()
            .map(|p| (p.url, p.is_pinned, p.order))
            .collect()
    }

    fn order_of(reconciler: &ReorderReconciler, url: &str) -> i64 {
        reconciler.projects.get(url).map(|p| p.order).unwrap_or(-1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_moves_project_to_end_of_pinned_group() {
        let (remote, _tokens, reconciler) = reconciler(board_of_three()).await;

        let pinned = reconciler.toggle_pin("beta").await.unwrap();

        assert!(pinned.is_pinned);
        assert_eq!(pinned.order, 1);
        assert_eq!(
            remote.calls_to(Endpoint::SetPin),
            vec![Call::SetPin(
                String::from("beta"),
                PinState {
                    is_pinned: true,
                    order: 1
                }
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggling_twice_restores_original_state() {
        let (_remote, _tokens, reconciler) = reconciler(board_of_three()).await;
        let before = states(&reconciler);

        reconciler.toggle_pin("beta").await.unwrap();
        reconciler.toggle_pin("beta").await.unwrap();

        assert_eq!(states(&reconciler), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpin_goes_to_end_when_old_slot_was_taken() {
        let (_remote, _tokens, reconciler) = reconciler(board_of_three()).await;

        reconciler.toggle_pin("beta").await.unwrap();
        reconciler
            .reorder(vec![ProjectOrder::new("gamma", 1)])
            .await
            .unwrap();
        let unpinned = reconciler.toggle_pin("beta").await.unwrap();

        assert!(!unpinned.is_pinned);
        assert_eq!(unpinned.order, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_toggles_of_one_project_are_serialized() {
        let (remote, _tokens, reconciler) = reconciler(board_of_three()).await;
        let before = states(&reconciler);
        remote.delay_next(Endpoint::SetPin, Duration::from_millis(100));

        let (first, second) = tokio::join!(
            reconciler.toggle_pin("alpha"),
            reconciler.toggle_pin("alpha")
        );

        assert!(first.unwrap().is_pinned);
        assert!(!second.unwrap().is_pinned);
        assert_eq!(states(&reconciler), before);
        let pinned: Vec<bool> = remote
            .calls_to(Endpoint::SetPin)
            .into_iter()
            .filter_map(|c| match c {
                Call::SetPin(_, pin) => Some(pin.is_pinned),
                _ => None,
            })
            .collect();
        assert_eq!(pinned, vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_toggle_reverts() {
        let (remote, _tokens, reconciler) = reconciler(board_of_three()).await;
        let before = states(&reconciler);
        remote.fail_next(
            Endpoint::SetPin,
            RemoteError::Rejected {
                status: 409,
                reason: String::from("pin limit reached"),
            },
        );

        let result = reconciler.toggle_pin("gamma").await;

        assert_eq!(
            result,
            Err(SyncError::OrderingFailed {
                operation: "pin",
                projects: vec![String::from("gamma")],
                reason: String::from("pin limit reached"),
            })
        );
        assert_eq!(states(&reconciler), before);

        // The failed attempt must not leave a parked slot behind
        reconciler.toggle_pin("gamma").await.unwrap();
        reconciler.toggle_pin("gamma").await.unwrap();
        assert_eq!(states(&reconciler), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_without_credential_changes_nothing() {
        let (_remote, tokens, reconciler) = reconciler(board_of_three()).await;
        let before = states(&reconciler);
        tokens.sign_out();

        assert_eq!(
            reconciler.toggle_pin("alpha").await,
            Err(SyncError::AuthRequired)
        );
        assert_eq!(states(&reconciler), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reorder_applies_optimistically() {
        let (remote, _tokens, reconciler) = reconciler(board_of_three()).await;
        remote.delay_next(Endpoint::SetOrder, Duration::from_millis(100));

        let orders = vec![ProjectOrder::new("gamma", 0), ProjectOrder::new("alpha", 2)];
        let probe = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            (order_of(&reconciler, "gamma"), order_of(&reconciler, "alpha"))
        };
        let (outcome, during) = tokio::join!(reconciler.reorder(orders), probe);

        assert_eq!(during, (0, 2));
        assert_eq!(outcome, Ok(ReorderOutcome::Applied));
        let ordered: Vec<String> = reconciler
            .projects
            .ordered()
            .into_iter()
            .map(|p| p.url)
            .collect();
        assert_eq!(ordered, vec!["delta", "gamma", "beta", "alpha"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reorder_skips_pinned_projects() {
        let (remote, _tokens, reconciler) = reconciler(board_of_three()).await;

        let outcome = reconciler
            .reorder(vec![ProjectOrder::new("delta", 9), ProjectOrder::new("beta", 5)])
            .await;

        assert_eq!(outcome, Ok(ReorderOutcome::Applied));
        assert_eq!(order_of(&reconciler, "delta"), 0);
        assert_eq!(
            remote.calls_to(Endpoint::SetOrder),
            vec![Call::SetOrder(vec![ProjectOrder::new("beta", 5)])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reorders_coalesce_while_batch_in_flight() {
        let (remote, _tokens, reconciler) = reconciler(board_of_three()).await;
        remote.delay_next(Endpoint::SetOrder, Duration::from_millis(100));

        let first = reconciler.reorder(vec![ProjectOrder::new("alpha", 5)]);
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            reconciler
                .reorder(vec![ProjectOrder::new("beta", 6), ProjectOrder::new("gamma", 7)])
                .await
        };
        let third = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            reconciler.reorder(vec![ProjectOrder::new("beta", 8)]).await
        };
        let (first, second, third) = tokio::join!(first, second, third);

        assert_eq!(first, Ok(ReorderOutcome::Applied));
        assert_eq!(second, Ok(ReorderOutcome::Superseded));
        assert_eq!(third, Ok(ReorderOutcome::Applied));
        assert_eq!(
            remote.calls_to(Endpoint::SetOrder),
            vec![
                Call::SetOrder(vec![ProjectOrder::new("alpha", 5)]),
                Call::SetOrder(vec![ProjectOrder::new("gamma", 7), ProjectOrder::new("beta", 8)]),
            ]
        );
        assert_eq!(order_of(&reconciler, "beta"), 8);
        assert_eq!(order_of(&reconciler, "gamma"), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reorder_restores_snapshot() {
        let (remote, _tokens, reconciler) = reconciler(board_of_three()).await;
        let before = states(&reconciler);
        remote.fail_next(
            Endpoint::SetOrder,
            RemoteError::Unavailable(String::from("connection reset")),
        );

        let result = reconciler
            .reorder(vec![ProjectOrder::new("alpha", 2), ProjectOrder::new("gamma", 0)])
            .await;

        assert_eq!(
            result,
            Err(SyncError::OrderingFailed {
                operation: "reorder",
                projects: vec![String::from("alpha"), String::from("gamma")],
                reason: String::from("Remote store unavailable: connection reset"),
            })
        );
        assert_eq!(states(&reconciler), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_leaves_queued_projects_to_next_batch() {
        let (remote, _tokens, reconciler) = reconciler(board_of_three()).await;
        remote.delay_next(Endpoint::SetOrder, Duration::from_millis(100));
        remote.fail_next(
            Endpoint::SetOrder,
            RemoteError::Rejected {
                status: 500,
                reason: String::from("boom"),
            },
        );

        let first = reconciler.reorder(vec![
            ProjectOrder::new("alpha", 5),
            ProjectOrder::new("beta", 6),
        ]);
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            reconciler.reorder(vec![ProjectOrder::new("beta", 9)]).await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(matches!(first, Err(SyncError::OrderingFailed { .. })));
        assert_eq!(second, Ok(ReorderOutcome::Applied));
        assert_eq!(order_of(&reconciler, "alpha"), 0);
        assert_eq!(order_of(&reconciler, "beta"), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reorder_waits_for_failed_unpin_of_same_project() {
        let (remote, _tokens, reconciler) = reconciler(board_of_three()).await;
        remote.delay_next(Endpoint::SetPin, Duration::from_millis(100));
        remote.fail_next(
            Endpoint::SetPin,
            RemoteError::Rejected {
                status: 409,
                reason: String::from("project archived"),
            },
        );

        let reorder = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            reconciler.reorder(vec![ProjectOrder::new("delta", 7)]).await
        };
        let (toggle, reorder) = tokio::join!(reconciler.toggle_pin("delta"), reorder);

        assert!(matches!(
            toggle,
            Err(SyncError::OrderingFailed {
                operation: "unpin",
                ..
            })
        ));
        // Still pinned once the toggle reverted, so the reorder has nothing to send
        assert_eq!(reorder, Ok(ReorderOutcome::Applied));
        let delta = reconciler.projects.get("delta").unwrap();
        assert!(delta.is_pinned);
        assert_eq!(delta.order, 0);
        assert!(remote.calls_to(Endpoint::SetOrder).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_toggle_waits_for_reorder_in_flight() {
        let (remote, _tokens, reconciler) = reconciler(board_of_three()).await;
        remote.delay_next(Endpoint::SetOrder, Duration::from_millis(100));

        let toggle = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            reconciler.toggle_pin("alpha").await
        };
        let (reorder, toggle) = tokio::join!(
            reconciler.reorder(vec![ProjectOrder::new("alpha", 5)]),
            toggle
        );

        assert_eq!(reorder, Ok(ReorderOutcome::Applied));
        let pinned = toggle.unwrap();
        assert!(pinned.is_pinned);
        assert_eq!(pinned.order, 1);
        let sent: Vec<Endpoint> = remote
            .calls()
            .into_iter()
            .map(|c| c.endpoint())
            .filter(|e| matches!(e, Endpoint::SetOrder | Endpoint::SetPin))
            .collect();
        assert_eq!(sent, vec![Endpoint::SetOrder, Endpoint::SetPin]);

        // Unpinning goes back to the slot the reorder gave it
        let unpinned = reconciler.toggle_pin("alpha").await.unwrap();
        assert_eq!(unpinned.order, 5);
    }
}

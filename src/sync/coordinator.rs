use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use super::{
    auth::AuthGate,
    backoff::BackoffPolicy,
    entity::SyncEntity,
    repository::Repository,
    store::{LocalStore, MergeReport, WriteOp},
};

pub const SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Pulls re-read this far behind the cursor. A row stamped by a transaction
/// that commits after a pull can carry an `updated_at` older than the
/// cursor; merging is idempotent, so the re-read costs nothing else.
pub const PULL_OVERLAP: time::Duration = time::Duration::seconds(10);

enum Pushed<T> {
    Saved(T),
    Deleted,
    /// The server no longer has the entity.
    Gone,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub failed: usize,
    /// Local entities dropped because the server had deleted them.
    pub gone: usize,
    pub merged: MergeReport,
    /// False when signed out or the pull failed.
    pub pulled: bool,
}

/// Keeps a [`LocalStore`] and a [`Repository`] in step: pushes queued local
/// writes, then pulls remote changes since the last successful pull.
pub struct SyncCoordinator<T: SyncEntity> {
    repo: Arc<dyn Repository<T>>,
    store: Arc<LocalStore<T>>,
    auth: AuthGate,
    backoff: BackoffPolicy,
    interval: Duration,
}

impl<T: SyncEntity> SyncCoordinator<T> {
    pub fn new(repo: Arc<dyn Repository<T>>, store: Arc<LocalStore<T>>, auth: AuthGate) -> Self {
        Self {
            repo,
            store,
            auth,
            backoff: BackoffPolicy::default(),
            interval: SYNC_INTERVAL,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn store(&self) -> &Arc<LocalStore<T>> {
        &self.store
    }

    #[instrument(skip(self), fields(kind = T::KIND))]
    pub async fn sync_once(&self) -> SyncReport {
        let mut report = SyncReport::default();
        if !self.auth.is_signed_in() {
            debug!("signed out; skipping sync");
            return report;
        }

        for (write, entity) in self.store.due_writes(Instant::now()).await {
            let result = match write.op {
                WriteOp::Create => self.repo.create(&entity).await.map(Pushed::Saved),
                WriteOp::Update => self
                    .repo
                    .update(&entity)
                    .await
                    .map(|ack| ack.map_or(Pushed::Gone, Pushed::Saved)),
                WriteOp::Delete => self.repo.delete(write.id).await.map(|_| Pushed::Deleted),
            };
            match result {
                Ok(Pushed::Saved(ack)) => {
                    self.store.acknowledge(&write, Some(ack)).await;
                    report.pushed += 1;
                }
                Ok(Pushed::Deleted) => {
                    self.store.acknowledge(&write, None).await;
                    report.pushed += 1;
                }
                Ok(Pushed::Gone) => {
                    info!(id = %write.id, "deleted on the server; dropping local edit");
                    self.store.forget(write.id).await;
                    report.gone += 1;
                }
                Err(e) => {
                    let delay = self.backoff.delay(write.attempts);
                    warn!(
                        id = %write.id,
                        op = ?write.op,
                        attempts = write.attempts + 1,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "push failed"
                    );
                    self.store.reschedule(&write, delay).await;
                    report.failed += 1;
                }
            }
        }

        let since = self.store.last_pull().await.map(|at| at - PULL_OVERLAP);
        match self.repo.list(since).await {
            Ok(remote) => {
                let newest = remote.iter().map(|e| e.updated_at()).max();
                report.merged = self.store.merge_remote(remote).await;
                if let Some(at) = newest {
                    self.store.set_last_pull(at).await;
                }
                report.pulled = true;
            }
            Err(e) => warn!(error = %e, "pull failed"),
        }

        debug!(?report, "sync pass done");
        report
    }

    /// Syncs every interval until `shutdown` resolves. Signing in triggers
    /// an immediate pass; signing out clears nothing, the store is kept.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut auth_changes = self.auth.subscribe();
        info!(kind = T::KIND, every_s = self.interval.as_secs(), "sync started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
                changed = auth_changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            self.sync_once().await;
        }
        info!(kind = T::KIND, "sync stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::OffsetDateTime;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;
    use crate::items::PackItem;
    use crate::weights::WeightUnit;

    #[derive(Default)]
    struct FakeRepo {
        remote: Mutex<Vec<PackItem>>,
        offline: AtomicBool,
        calls: AtomicUsize,
        seen_since: Mutex<Vec<Option<OffsetDateTime>>>,
        /// Deletes the entity locally while its create is in flight.
        remove_during_create: Mutex<Option<Arc<LocalStore<PackItem>>>>,
    }

    impl FakeRepo {
        fn hit(&self) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                anyhow::bail!("network unreachable");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Repository<PackItem> for FakeRepo {
        async fn fetch(&self, id: Uuid) -> anyhow::Result<Option<PackItem>> {
            self.hit()?;
            Ok(self.remote.lock().await.iter().find(|i| i.id == id).cloned())
        }

        async fn list(&self, since: Option<OffsetDateTime>) -> anyhow::Result<Vec<PackItem>> {
            self.hit()?;
            self.seen_since.lock().await.push(since);
            Ok(self
                .remote
                .lock()
                .await
                .iter()
                .filter(|i| since.map_or(!i.deleted, |s| i.updated_at > s))
                .cloned()
                .collect())
        }

        async fn create(&self, entity: &PackItem) -> anyhow::Result<PackItem> {
            self.hit()?;
            if let Some(store) = self.remove_during_create.lock().await.take() {
                store.remove(entity.id).await;
            }
            self.remote.lock().await.push(entity.clone());
            Ok(entity.clone())
        }

        async fn update(&self, entity: &PackItem) -> anyhow::Result<Option<PackItem>> {
            self.hit()?;
            let mut remote = self.remote.lock().await;
            match remote.iter_mut().find(|i| i.id == entity.id && !i.deleted) {
                Some(slot) => {
                    *slot = entity.clone();
                    Ok(Some(entity.clone()))
                }
                None => Ok(None),
            }
        }

        async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
            self.hit()?;
            let mut remote = self.remote.lock().await;
            if let Some(slot) = remote.iter_mut().find(|i| i.id == id) {
                slot.mark_deleted(OffsetDateTime::now_utc());
            }
            Ok(())
        }
    }

    fn setup(signed_in: bool) -> (Arc<FakeRepo>, SyncCoordinator<PackItem>) {
        let repo = Arc::new(FakeRepo::default());
        let auth = AuthGate::new();
        if signed_in {
            auth.sign_in("token");
        }
        let coord = SyncCoordinator::new(repo.clone(), Arc::new(LocalStore::new()), auth);
        (repo, coord)
    }

    fn item(name: &str) -> PackItem {
        PackItem::sample(name, 250.0, WeightUnit::G)
    }

    #[tokio::test]
    async fn signed_out_coordinator_does_nothing() {
        let (repo, coord) = setup(false);
        coord.store().save(item("Headlamp")).await;

        let report = coord.sync_once().await;
        assert_eq!(report, SyncReport::default());
        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(coord.store().pending_count().await, 1);
    }

    #[tokio::test]
    async fn failed_push_stays_queued_with_backoff() {
        let (repo, coord) = setup(true);
        repo.offline.store(true, Ordering::SeqCst);
        let lamp = item("Headlamp");
        coord.store().save(lamp.clone()).await;

        let report = coord.sync_once().await;
        assert_eq!(report.failed, 1);
        assert!(!report.pulled);

        let pending = coord.store().pending(lamp.id).await.unwrap();
        assert_eq!(pending.attempts, 1);
        assert!(pending.next_attempt > Instant::now());

        // Not due yet, so the next pass does not retry it.
        repo.offline.store(false, Ordering::SeqCst);
        let report = coord.sync_once().await;
        assert_eq!(report.pushed, 0);
        assert_eq!(coord.store().pending_count().await, 1);
    }

    #[tokio::test]
    async fn push_then_pull_round() {
        let (repo, coord) = setup(true);
        let lamp = item("Headlamp");
        coord.store().save(lamp.clone()).await;

        let mut from_server = item("Filter");
        from_server.updated_at = lamp.updated_at + time::Duration::seconds(10);
        repo.remote.lock().await.push(from_server.clone());

        let report = coord.sync_once().await;
        assert_eq!(report.pushed, 1);
        assert!(report.pulled);
        assert_eq!(coord.store().pending_count().await, 0);
        assert!(coord.store().get(from_server.id).await.is_some());
        assert_eq!(coord.store().last_pull().await, Some(from_server.updated_at));
    }

    #[tokio::test]
    async fn later_pull_asks_for_changes_only_and_applies_tombstones() {
        let (repo, coord) = setup(true);
        let stove = item("Stove");
        repo.remote.lock().await.push(stove.clone());
        coord.sync_once().await;
        assert!(coord.store().get(stove.id).await.is_some());

        {
            let mut remote = repo.remote.lock().await;
            remote[0].mark_deleted(stove.updated_at + time::Duration::seconds(30));
        }
        let report = coord.sync_once().await;
        assert_eq!(report.merged.removed, 1);
        assert!(coord.store().get(stove.id).await.is_none());

        let seen = repo.seen_since.lock().await.clone();
        assert_eq!(seen, vec![None, Some(stove.updated_at - PULL_OVERLAP)]);
    }

    #[tokio::test]
    async fn late_commit_behind_the_cursor_is_still_pulled() {
        let (repo, coord) = setup(true);
        let stove = item("Stove");
        repo.remote.lock().await.push(stove.clone());
        coord.sync_once().await;
        assert_eq!(coord.store().last_pull().await, Some(stove.updated_at));

        // Stamped before the cursor, visible only after the first pull.
        let mut late = item("Fuel canister");
        late.updated_at = stove.updated_at - time::Duration::seconds(3);
        repo.remote.lock().await.push(late.clone());

        let report = coord.sync_once().await;
        assert_eq!(report.merged.upserted, 1);
        assert!(coord.store().get(late.id).await.is_some());
        assert_eq!(coord.store().last_pull().await, Some(stove.updated_at));
    }

    #[tokio::test]
    async fn delete_during_inflight_create_reaches_the_server() {
        let (repo, coord) = setup(true);
        *repo.remove_during_create.lock().await = Some(coord.store().clone());
        let tent = item("Tent");
        coord.store().save(tent.clone()).await;

        let first = coord.sync_once().await;
        assert_eq!(first.pushed, 1);
        assert_eq!(first.merged.skipped, 1);
        assert!(coord.store().get(tent.id).await.is_none());
        assert_eq!(coord.store().pending(tent.id).await.unwrap().op, WriteOp::Delete);

        let second = coord.sync_once().await;
        assert_eq!(second.pushed, 1);
        assert_eq!(coord.store().pending_count().await, 0);
        assert!(coord.store().get(tent.id).await.is_none());
        let remote = repo.remote.lock().await;
        assert_eq!(remote.len(), 1);
        assert!(remote[0].deleted);
    }

    #[tokio::test]
    async fn edit_of_server_deleted_entity_settles() {
        let (repo, coord) = setup(true);
        let mut stakes = item("Stakes");
        repo.remote.lock().await.push(stakes.clone());
        coord.sync_once().await;

        repo.remote.lock().await[0].mark_deleted(stakes.updated_at + time::Duration::seconds(5));
        stakes.quantity = 8;
        coord.store().save(stakes.clone()).await;

        let report = coord.sync_once().await;
        assert_eq!(report.gone, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(coord.store().pending_count().await, 0);
        assert!(coord.store().get(stakes.id).await.is_none());

        let again = coord.sync_once().await;
        assert_eq!(again.failed + again.gone, 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (_repo, coord) = setup(true);
        let coord = coord.with_interval(Duration::from_millis(10));
        let res = tokio::time::timeout(
            Duration::from_secs(2),
            coord.run(tokio::time::sleep(Duration::from_millis(50))),
        )
        .await;
        assert!(res.is_ok());
    }
}

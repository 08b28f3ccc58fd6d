use std::collections::HashMap;
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::entity::SyncEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

/// A local change the server has not acknowledged yet.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub id: Uuid,
    pub op: WriteOp,
    /// Bumped on every local edit so a stale acknowledgement is ignored.
    pub revision: u64,
    pub attempts: u32,
    pub next_attempt: Instant,
    /// Handed to the server at least once, so it may already hold a copy.
    pub sent: bool,
}

/// Outcome of folding a pull into the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub upserted: usize,
    pub removed: usize,
    /// Remote versions ignored because a local write is still pending.
    pub skipped: usize,
}

struct Inner<T> {
    entities: HashMap<Uuid, T>,
    pending: HashMap<Uuid, PendingWrite>,
    revision: u64,
    last_pull: Option<OffsetDateTime>,
}

/// On-device mirror of one entity type plus its queue of pending writes.
pub struct LocalStore<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: SyncEntity> Default for LocalStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SyncEntity> LocalStore<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entities: HashMap::new(),
                pending: HashMap::new(),
                revision: 0,
                last_pull: None,
            }),
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<T> {
        let inner = self.inner.lock().await;
        inner.entities.get(&id).filter(|e| !e.is_deleted()).cloned()
    }

    /// Live entities, oldest change first.
    pub async fn list(&self) -> Vec<T> {
        let inner = self.inner.lock().await;
        let mut out: Vec<T> = inner
            .entities
            .values()
            .filter(|e| !e.is_deleted())
            .cloned()
            .collect();
        out.sort_by_key(|e| e.updated_at());
        out
    }

    /// Records a local create or edit and queues it for push.
    pub async fn save(&self, entity: T) {
        let mut inner = self.inner.lock().await;
        let id = entity.id();
        let op = if inner.entities.contains_key(&id) {
            WriteOp::Update
        } else {
            WriteOp::Create
        };
        inner.entities.insert(id, entity);
        enqueue(&mut inner, id, op);
    }

    /// Tombstones the entity locally and queues the delete.
    pub async fn remove(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(entity) = inner.entities.get_mut(&id) else {
            return false;
        };
        entity.mark_deleted(OffsetDateTime::now_utc());
        // Never handed to the server: nothing to delete remotely.
        if matches!(inner.pending.get(&id), Some(p) if p.op == WriteOp::Create && !p.sent) {
            inner.pending.remove(&id);
            inner.entities.remove(&id);
            return true;
        }
        enqueue(&mut inner, id, WriteOp::Delete);
        true
    }

    /// Pending writes whose retry time has come, with the entity to send.
    /// Each returned write is marked as sent.
    pub async fn due_writes(&self, now: Instant) -> Vec<(PendingWrite, T)> {
        let mut inner = self.inner.lock().await;
        let Inner {
            entities, pending, ..
        } = &mut *inner;
        let mut due: Vec<(PendingWrite, T)> = pending
            .values_mut()
            .filter(|p| p.next_attempt <= now)
            .filter_map(|p| {
                let entity = entities.get(&p.id)?.clone();
                p.sent = true;
                Some((p.clone(), entity))
            })
            .collect();
        // Creates first so items never reach the server before their pack.
        due.sort_by_key(|(p, _)| (p.op != WriteOp::Create, p.revision));
        due
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn pending(&self, id: Uuid) -> Option<PendingWrite> {
        self.inner.lock().await.pending.get(&id).cloned()
    }

    /// Server accepted `write`. `ack` is the server's copy, if it returned one.
    pub async fn acknowledge(&self, write: &PendingWrite, ack: Option<T>) {
        let mut inner = self.inner.lock().await;
        let current = inner.pending.get(&write.id).map(|p| p.revision);
        if current != Some(write.revision) {
            // Edited again while the push was in flight; keep the newer write.
            return;
        }
        inner.pending.remove(&write.id);
        match (write.op, ack) {
            (WriteOp::Delete, _) => {
                inner.entities.remove(&write.id);
            }
            (_, Some(entity)) => {
                inner.entities.insert(write.id, entity);
            }
            (_, None) => {}
        }
    }

    /// The server no longer has the entity: drop it and anything queued
    /// for it.
    pub async fn forget(&self, id: Uuid) {
        let mut inner = self.inner.lock().await;
        inner.pending.remove(&id);
        inner.entities.remove(&id);
    }

    /// Push failed; try again after `delay`.
    pub async fn reschedule(&self, write: &PendingWrite, delay: Duration) {
        let mut inner = self.inner.lock().await;
        if let Some(p) = inner.pending.get_mut(&write.id) {
            p.attempts = p.attempts.saturating_add(1);
            p.next_attempt = Instant::now() + delay;
        }
    }

    /// Folds remote changes in. Local writes still pending win. Versions
    /// already held are ignored, so re-pulling an overlap is harmless.
    pub async fn merge_remote(&self, remote: Vec<T>) -> MergeReport {
        let mut inner = self.inner.lock().await;
        let mut report = MergeReport::default();
        for entity in remote {
            let id = entity.id();
            if inner.pending.contains_key(&id) {
                report.skipped += 1;
                continue;
            }
            if entity.is_deleted() {
                if inner.entities.remove(&id).is_some() {
                    report.removed += 1;
                }
                continue;
            }
            let newer = inner
                .entities
                .get(&id)
                .map_or(true, |local| entity.updated_at() > local.updated_at());
            if newer {
                inner.entities.insert(id, entity);
                report.upserted += 1;
            }
        }
        report
    }

    pub async fn last_pull(&self) -> Option<OffsetDateTime> {
        self.inner.lock().await.last_pull
    }

    pub async fn set_last_pull(&self, at: OffsetDateTime) {
        let mut inner = self.inner.lock().await;
        if inner.last_pull.map_or(true, |prev| at > prev) {
            inner.last_pull = Some(at);
        }
    }

    /// Drops everything, e.g. when the user signs out.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entities.clear();
        inner.pending.clear();
        inner.last_pull = None;
    }
}

fn enqueue<T>(inner: &mut Inner<T>, id: Uuid, op: WriteOp) {
    inner.revision += 1;
    let revision = inner.revision;
    let now = Instant::now();
    inner
        .pending
        .entry(id)
        .and_modify(|p| {
            // A create stays a create until the server has seen it, unless
            // it is being deleted.
            if p.op != WriteOp::Create || op == WriteOp::Delete {
                p.op = op;
            }
            p.revision = revision;
            p.attempts = 0;
            p.next_attempt = now;
        })
        .or_insert(PendingWrite {
            id,
            op,
            revision,
            attempts: 0,
            next_attempt: now,
            sent: false,
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::PackItem;
    use crate::weights::WeightUnit;

    fn item(name: &str) -> PackItem {
        PackItem::sample(name, 100.0, WeightUnit::G)
    }

    #[tokio::test]
    async fn save_queues_create_then_update_collapses() {
        let store = LocalStore::new();
        let mut tent = item("Tent");
        store.save(tent.clone()).await;
        tent.weight = 1200.0;
        store.save(tent.clone()).await;

        assert_eq!(store.pending_count().await, 1);
        let p = store.pending(tent.id).await.unwrap();
        assert_eq!(p.op, WriteOp::Create);
        assert_eq!(store.get(tent.id).await.unwrap().weight, 1200.0);
    }

    #[tokio::test]
    async fn stale_ack_keeps_newer_write() {
        let store = LocalStore::new();
        let mut bag = item("Bag");
        store.save(bag.clone()).await;
        let (first, _) = store.due_writes(Instant::now()).await.remove(0);

        bag.name = "Quilt".into();
        store.save(bag.clone()).await;
        store.acknowledge(&first, Some(item("Server copy"))).await;

        assert_eq!(store.pending_count().await, 1);
        assert_eq!(store.get(bag.id).await.unwrap().name, "Quilt");
    }

    #[tokio::test]
    async fn removing_unsynced_entity_drops_it_entirely() {
        let store = LocalStore::new();
        let cup = item("Cup");
        store.save(cup.clone()).await;
        assert!(store.remove(cup.id).await);
        assert_eq!(store.pending_count().await, 0);
        assert!(store.get(cup.id).await.is_none());
    }

    #[tokio::test]
    async fn removing_a_sent_create_queues_a_delete() {
        let store = LocalStore::new();
        let cup = item("Cup");
        store.save(cup.clone()).await;
        let (w, _) = store.due_writes(Instant::now()).await.remove(0);
        assert!(w.sent);

        assert!(store.remove(cup.id).await);
        let p = store.pending(cup.id).await.unwrap();
        assert_eq!(p.op, WriteOp::Delete);
        assert!(store.get(cup.id).await.is_none());

        // The in-flight create's ack is stale and must not undo the delete.
        store.acknowledge(&w, Some(cup.clone())).await;
        assert_eq!(store.pending(cup.id).await.unwrap().op, WriteOp::Delete);
        assert_eq!(store.due_writes(Instant::now()).await.len(), 1);
    }

    #[tokio::test]
    async fn forget_drops_entity_and_write() {
        let store = LocalStore::new();
        let mut mug = item("Mug");
        store.merge_remote(vec![mug.clone()]).await;
        mug.name = "Mug (edited)".into();
        store.save(mug.clone()).await;

        store.forget(mug.id).await;
        assert_eq!(store.pending_count().await, 0);
        assert!(store.get(mug.id).await.is_none());
    }

    #[tokio::test]
    async fn merging_the_same_version_twice_is_a_no_op() {
        let store: LocalStore<PackItem> = LocalStore::new();
        let pot = item("Pot");
        assert_eq!(store.merge_remote(vec![pot.clone()]).await.upserted, 1);
        assert_eq!(store.merge_remote(vec![pot.clone()]).await, MergeReport::default());
    }

    #[tokio::test]
    async fn merge_applies_tombstones_and_respects_pending() {
        let store: LocalStore<PackItem> = LocalStore::new();
        let kept = item("Stove");
        let gone = item("Old stove");
        store.merge_remote(vec![kept.clone(), gone.clone()]).await;

        let mut local = kept.clone();
        local.name = "Stove (edited offline)".into();
        store.save(local).await;

        let mut tomb = gone.clone();
        tomb.mark_deleted(gone.updated_at + time::Duration::seconds(1));
        let mut remote_kept = kept.clone();
        remote_kept.name = "Stove (server)".into();

        let report = store.merge_remote(vec![remote_kept, tomb]).await;
        assert_eq!(report, MergeReport { upserted: 0, removed: 1, skipped: 1 });
        assert!(store.get(gone.id).await.is_none());
        assert_eq!(store.get(kept.id).await.unwrap().name, "Stove (edited offline)");
    }

    #[tokio::test]
    async fn rescheduled_write_is_not_due_yet() {
        let store = LocalStore::new();
        let pole = item("Pole");
        store.save(pole.clone()).await;
        let (w, _) = store.due_writes(Instant::now()).await.remove(0);
        store.reschedule(&w, Duration::from_secs(60)).await;

        assert!(store.due_writes(Instant::now()).await.is_empty());
        assert_eq!(store.pending(pole.id).await.unwrap().attempts, 1);
    }
}

// ── Optimistic mutation controller ──
//
// Apply-now, rollback-on-failure writes. One mutation per (entity, id)
// runs at a time (per-key async lock). A mutation is a field patch: while
// it is in flight, records fetched by concurrent reads get the patch
// re-applied before they are stored, and a revert only undoes the
// patched fields.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::model::{EntityId, Record};
use crate::store::DataStore;

/// Top-level fields an optimistic write sets on a record.
pub type Patch = Map<String, Value>;

/// The record an optimistic mutation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub entity: String,
    pub id: EntityId,
}

impl MutationKey {
    pub fn new(entity: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

/// An in-flight optimistic write.
///
/// Consumed by [`OptimisticController::confirm`] or
/// [`OptimisticController::revert`].
#[derive(Debug, Clone)]
#[must_use = "an optimistic mutation must be confirmed or reverted"]
pub struct OptimisticMutation {
    pub key: MutationKey,
    /// Stored record before the speculative write (`None` if it was not cached).
    pub previous: Option<Arc<Record>>,
    /// What was written, or `None` when nothing was cached to update.
    pub speculative: Option<Arc<Record>>,
    /// Generation this write was issued under. Unique per controller.
    pub generation: u64,
}

/// Bookkeeping for the one mutation in flight on a key.
#[derive(Debug)]
struct Pending {
    generation: u64,
    patch: Patch,
    /// Values the patched fields had underneath the patch, as of the
    /// latest write of the record. Absent fields are absent here too.
    base: Patch,
}

type Locks = DashMap<MutationKey, Arc<Mutex<()>>>;
type PendingMap = DashMap<MutationKey, Pending>;

/// Exclusive use of one key, returned by [`OptimisticController::acquire`].
///
/// Dropping it releases the key. A mutation still pending at that point
/// was abandoned: its speculative write stays, but later reads no longer
/// have the patch re-applied.
#[derive(Debug)]
pub struct MutationPermit {
    key: MutationKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Locks>,
    pending: Arc<PendingMap>,
}

impl Drop for MutationPermit {
    fn drop(&mut self) {
        if let Some((_, abandoned)) = self.pending.remove(&self.key) {
            debug!(
                entity = %self.key.entity,
                id = %self.key.id,
                generation = abandoned.generation,
                "optimistic write abandoned in flight"
            );
        }
        drop(self.guard.take());
        // Queued callers hold a clone of the lock, so it survives for them.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Serializes and tracks optimistic writes per `(entity, id)`.
#[derive(Default)]
pub struct OptimisticController {
    locks: Arc<Locks>,
    pending: Arc<PendingMap>,
    generations: AtomicU64,
}

impl OptimisticController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of a key. Later callers queue behind earlier ones.
    pub fn acquire(
        &self,
        key: &MutationKey,
    ) -> impl Future<Output = MutationPermit> + Send + 'static {
        let lock = Arc::clone(&self.locks.entry(key.clone()).or_default());
        let key = key.clone();
        let locks = Arc::clone(&self.locks);
        let pending = Arc::clone(&self.pending);
        async move {
            let guard = lock.lock_owned().await;
            MutationPermit {
                key,
                guard: Some(guard),
                locks,
                pending,
            }
        }
    }

    /// Generation of the mutation in flight on a key (0 if none).
    pub fn generation(&self, key: &MutationKey) -> u64 {
        self.pending.get(key).map_or(0, |p| p.generation)
    }

    /// Whether no key is locked or has a mutation in flight.
    pub fn is_idle(&self) -> bool {
        self.locks.is_empty() && self.pending.is_empty()
    }

    /// Apply `patch` to the stored record before the remote call resolves.
    ///
    /// An uncached record is left alone, but the mutation is still
    /// tracked, so a read that lands while it is in flight gets the patch.
    pub fn begin_optimistic(
        &self,
        store: &DataStore,
        key: MutationKey,
        patch: Patch,
    ) -> OptimisticMutation {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let mut previous = None;
        let mut speculative = None;

        store.update_with(&key.entity, |current| {
            previous = current.get(&key.id).cloned();
            speculative = previous
                .as_deref()
                .map(|record| Arc::new(apply_patch(record, &patch)));
            self.pending.insert(
                key.clone(),
                Pending {
                    generation,
                    base: fields_of(previous.as_deref(), &patch),
                    patch,
                },
            );
            speculative
                .iter()
                .map(|record| (key.id.clone(), Arc::clone(record)))
                .collect()
        });

        if speculative.is_some() {
            debug!(entity = %key.entity, id = %key.id, generation, "optimistic write applied");
        } else {
            debug!(entity = %key.entity, id = %key.id, "record not cached, no optimistic write");
        }

        OptimisticMutation {
            key,
            previous,
            speculative,
            generation,
        }
    }

    /// Re-apply in-flight patches to records fetched by a read.
    ///
    /// Must run inside the store write that merges `records`, so no
    /// confirm or revert can land in between.
    pub fn overlay(&self, entity: &str, records: &mut [(EntityId, Arc<Record>)]) {
        if self.pending.is_empty() {
            return;
        }
        for (id, record) in records.iter_mut() {
            let key = MutationKey::new(entity, id.clone());
            let Some(mut pending) = self.pending.get_mut(&key) else {
                continue;
            };
            let base = fields_of(Some(&**record), &pending.patch);
            pending.base = base;
            *record = Arc::new(apply_patch(&**record, &pending.patch));
            debug!(entity, %id, generation = pending.generation, "kept in-flight optimistic fields over fetched record");
        }
    }

    /// The remote call succeeded: keep the speculative fields.
    #[allow(clippy::needless_pass_by_value)]
    pub fn confirm(&self, mutation: OptimisticMutation) {
        self.pending
            .remove_if(&mutation.key, |_, p| p.generation == mutation.generation);
        debug!(
            entity = %mutation.key.entity,
            id = %mutation.key.id,
            generation = mutation.generation,
            "optimistic write confirmed"
        );
    }

    /// The remote call failed: undo the speculative write.
    ///
    /// If the stored record is still the speculative one, the previous
    /// record is restored exactly. If a read has replaced it since, only
    /// the patched fields go back to what that read fetched. Returns
    /// `false` when a newer mutation has been issued for the key, in
    /// which case the revert is discarded.
    pub fn revert(&self, store: &DataStore, mutation: OptimisticMutation) -> bool {
        let OptimisticMutation {
            key,
            previous,
            speculative,
            generation,
        } = mutation;
        let mut superseded = true;

        store.update_with(&key.entity, |current| {
            let Some((_, pending)) = self
                .pending
                .remove_if(&key, |_, p| p.generation == generation)
            else {
                return Vec::new();
            };
            superseded = false;
            let Some(stored) = current.get(&key.id) else {
                return Vec::new();
            };
            let restored = match (&speculative, previous) {
                (Some(written), Some(previous)) if Arc::ptr_eq(stored, written) => previous,
                _ => Arc::new(restore_fields(stored, &pending.patch, &pending.base)),
            };
            vec![(key.id.clone(), restored)]
        });

        if superseded {
            warn!(entity = %key.entity, id = %key.id, generation, "discarding superseded revert");
            return false;
        }
        warn!(entity = %key.entity, id = %key.id, generation, "optimistic write reverted");
        true
    }
}

// ── Patch helpers ───────────────────────────────────────────────────

/// `record` with every patch field set. Non-object records are left as they are.
fn apply_patch(record: &Record, patch: &Patch) -> Record {
    let mut next = record.clone();
    if let Some(obj) = next.as_object_mut() {
        obj.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    next
}

/// The values `record` holds for the patched fields.
fn fields_of(record: Option<&Record>, patch: &Patch) -> Patch {
    let Some(obj) = record.and_then(Value::as_object) else {
        return Patch::new();
    };
    patch
        .keys()
        .filter_map(|k| obj.get(k).map(|v| (k.clone(), v.clone())))
        .collect()
}

/// `record` with the patched fields put back to `base`.
fn restore_fields(record: &Record, patch: &Patch, base: &Patch) -> Record {
    let mut next = record.clone();
    if let Some(obj) = next.as_object_mut() {
        for field in patch.keys() {
            match base.get(field) {
                Some(value) => {
                    obj.insert(field.clone(), value.clone());
                }
                None => {
                    obj.remove(field);
                }
            }
        }
    }
    next
}

//! Export-deduplicating object registry.
//!
//! An `ObjectRegistry` maps a stable identifier to an exported object and
//! guarantees that each identifier is exported at most once at a time:
//!
//! - Concurrent requests for the same identifier converge on one export
//!   attempt and all observe its outcome.
//! - Requests for different identifiers never wait on each other. The map
//!   lock is only held for lookups and inserts, never across an export.
//! - A failed export removes the identifier, so the next request starts a
//!   fresh attempt instead of seeing a stale failure.
//! - A request for an identifier that is already exported refreshes the
//!   object in place and does not export again.
//!
//! Every entry carries a watch channel that starts empty and is filled
//! exactly once with the export outcome. Waiters suspend on that channel
//! only.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ServiceError;

/// A value that can live in an `ObjectRegistry`.
pub trait Exported: Send + Sync + 'static {
    /// The data a request carries for the object.
    type Snapshot: Send;

    /// Replace the object's state with a newer snapshot. Called for requests
    /// that find the object already exported.
    fn refresh(&self, snapshot: Self::Snapshot);
}

type Outcome<V> = Option<Result<Arc<V>, ServiceError>>;

struct Slot<V> {
    outcome: watch::Sender<Outcome<V>>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self { outcome }
    }

    fn finish(&self, outcome: Result<Arc<V>, ServiceError>) {
        self.outcome.send_replace(Some(outcome));
    }

    fn ready(&self) -> Option<Arc<V>> {
        match &*self.outcome.borrow() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    async fn wait(&self) -> Result<Arc<V>, ServiceError> {
        let mut rx = self.outcome.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ServiceError::Export("export abandoned".into()))?;
        let result = outcome.clone();
        result.unwrap_or_else(|| Err(ServiceError::Export("export abandoned".into())))
    }
}

enum Claim<V> {
    /// Someone else registered the identifier first.
    Existing(Arc<Slot<V>>),
    /// This request inserted the placeholder and must export.
    Owner(Arc<Slot<V>>),
}

/// Identifier-keyed registry of exported objects of one kind.
pub struct ObjectRegistry<V> {
    kind: &'static str,
    entries: RwLock<HashMap<String, Arc<Slot<V>>>>,
}

impl<V: Exported> std::fmt::Debug for ObjectRegistry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("kind", &self.kind)
            .field("entries", &self.read().len())
            .finish()
    }
}

impl<V: Exported> ObjectRegistry<V> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the object for `id`, exporting it first if nobody has.
    ///
    /// `build` turns the snapshot into a fresh object; `export` makes it
    /// addressable. Neither is called when the object already exists, in
    /// which case the snapshot is applied with `Exported::refresh`.
    pub async fn get_or_export<B, E, Fut>(
        &self,
        id: &str,
        snapshot: V::Snapshot,
        build: B,
        export: E,
    ) -> Result<Arc<V>, ServiceError>
    where
        B: FnOnce(V::Snapshot) -> V,
        E: FnOnce(Arc<V>) -> Fut,
        Fut: Future<Output = Result<(), ServiceError>>,
    {
        let slot = match self.claim(id) {
            Claim::Existing(slot) => {
                let value = slot.wait().await?;
                value.refresh(snapshot);
                return Ok(value);
            }
            Claim::Owner(slot) => slot,
        };

        let value = Arc::new(build(snapshot));
        let mut pending = PendingExport {
            registry: self,
            id,
            slot: &slot,
            settled: false,
        };

        match export(value.clone()).await {
            Ok(()) => {
                slot.finish(Ok(value.clone()));
                pending.settled = true;
                debug!(kind = self.kind, id, "exported");
                Ok(value)
            }
            Err(err) => {
                pending.settled = true;
                self.abandon(id, &slot, err.clone());
                warn!(kind = self.kind, id, error = %err, "export failed");
                Err(err)
            }
        }
    }

    /// The exported object for `id`. Waits for an in-flight export and
    /// returns `None` if it fails.
    pub async fn get(&self, id: &str) -> Option<Arc<V>> {
        let slot = self.read().get(id).cloned()?;
        slot.wait().await.ok()
    }

    /// Remove `id` once any in-flight export of it has finished.
    ///
    /// Returns the removed object so the caller can reverse the export.
    pub async fn remove(&self, id: &str) -> Option<Arc<V>> {
        let slot = self.read().get(id).cloned()?;
        let value = slot.wait().await.ok()?;

        let mut entries = self.write();
        match entries.get(id) {
            Some(current) if Arc::ptr_eq(current, &slot) => {
                entries.remove(id);
                debug!(kind = self.kind, id, "removed");
                Some(value)
            }
            // Replaced by a newer export while we waited.
            _ => None,
        }
    }

    /// Every object whose export has completed.
    pub fn ready_values(&self) -> Vec<Arc<V>> {
        self.read().values().filter_map(|slot| slot.ready()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    fn claim(&self, id: &str) -> Claim<V> {
        if let Some(slot) = self.read().get(id).cloned() {
            return Claim::Existing(slot);
        }

        let mut entries = self.write();
        if let Some(slot) = entries.get(id) {
            return Claim::Existing(slot.clone());
        }
        let slot = Arc::new(Slot::new());
        entries.insert(id.to_string(), slot.clone());
        Claim::Owner(slot)
    }

    /// Drop the placeholder for `id` and wake its waiters with `err`.
    fn abandon(&self, id: &str, slot: &Arc<Slot<V>>, err: ServiceError) {
        {
            let mut entries = self.write();
            if entries.get(id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
                entries.remove(id);
            }
        }
        slot.finish(Err(err));
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Slot<V>>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Slot<V>>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles a placeholder whose owning request was dropped mid-export, so
/// waiters are released and the identifier is freed.
struct PendingExport<'a, V: Exported> {
    registry: &'a ObjectRegistry<V>,
    id: &'a str,
    slot: &'a Arc<Slot<V>>,
    settled: bool,
}

impl<V: Exported> Drop for PendingExport<'_, V> {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.abandon(
                self.id,
                self.slot,
                ServiceError::Export("export abandoned".into()),
            );
        }
    }
}

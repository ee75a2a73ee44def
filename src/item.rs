//! Items: vault entries exposed on the bus.
//!
//! An `Item` wraps the latest snapshot of one vault item. Items are never
//! expired; a later fetch of the same vault id refreshes the snapshot in
//! place through the registry.

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use zeroize::Zeroizing;

use crate::paths;
use crate::registry::Exported;
use crate::vault::VaultItem;

#[derive(Debug)]
pub struct Item {
    id: String,
    path: String,
    collection: String,
    snapshot: RwLock<VaultItem>,
}

impl Item {
    /// Wrap `snapshot` as a member of the collection `collection_name`.
    pub fn new(collection_name: &str, snapshot: VaultItem) -> Self {
        let id = paths::sanitize(&snapshot.id);
        Self {
            path: paths::item_path(collection_name, &id),
            collection: paths::collection_path(collection_name),
            id,
            snapshot: RwLock::new(snapshot),
        }
    }

    /// The sanitized identifier used in the object path.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the owning collection.
    pub fn collection_path(&self) -> &str {
        &self.collection
    }

    /// The vault's own identifier for this item.
    pub fn vault_id(&self) -> String {
        self.read().id.clone()
    }

    /// A copy of the current snapshot.
    pub fn snapshot(&self) -> VaultItem {
        self.read().clone()
    }

    pub fn label(&self) -> String {
        self.read().name.clone()
    }

    /// The login password, if the item has one.
    pub fn password(&self) -> Option<Zeroizing<Vec<u8>>> {
        self.read()
            .password()
            .map(|password| Zeroizing::new(password.as_bytes().to_vec()))
    }

    /// Creation time in seconds since the epoch.
    pub fn created(&self) -> u64 {
        self.read().creation_date.timestamp().max(0) as u64
    }

    /// Last revision time in seconds since the epoch.
    pub fn modified(&self) -> u64 {
        self.read().revision_date.timestamp().max(0) as u64
    }

    fn read(&self) -> RwLockReadGuard<'_, VaultItem> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Exported for Item {
    type Snapshot = VaultItem;

    fn refresh(&self, snapshot: VaultItem) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

//! The default collection.
//!
//! Only one collection exists. It is created the first time any operation
//! needs it and lives until the process exits. Its label is the only
//! mutable field.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::paths;
use crate::registry::Exported;

#[derive(Debug)]
pub struct Collection {
    name: String,
    path: String,
    alias_path: String,
    label: RwLock<String>,
    created: DateTime<Utc>,
}

impl Collection {
    pub fn new(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            path: paths::collection_path(name),
            alias_path: paths::alias_path(name),
            label: RwLock::new(label.to_string()),
            created: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path under which the collection is also reachable as an alias.
    pub fn alias_path(&self) -> &str {
        &self.alias_path
    }

    pub fn label(&self) -> String {
        self.label
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_label(&self, label: &str) {
        *self.label.write().unwrap_or_else(PoisonError::into_inner) = label.to_string();
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }
}

impl Exported for Collection {
    type Snapshot = ();

    fn refresh(&self, _snapshot: ()) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_and_label() {
        let collection = Collection::new("default", "Vault");
        assert_eq!(collection.path(), "/org/freedesktop/secrets/collections/default");
        assert_eq!(collection.alias_path(), "/org/freedesktop/secrets/aliases/default");

        collection.set_label("Work");
        assert_eq!(collection.label(), "Work");
    }
}

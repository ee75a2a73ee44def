//! Making objects remotely addressable.
//!
//! Registries never talk to the bus directly. They hand finished objects to
//! an `ObjectExporter`, which the bus layer implements over its object
//! server. Tests plug in counting or failing exporters.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::collection::Collection;
use crate::error::ServiceError;
use crate::item::Item;
use crate::prompt::Prompt;
use crate::session::Session;

/// The kinds of object the service removes from the bus again. The default
/// collection lives as long as the service and is never unexported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Session,
    Item,
    Prompt,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Session => "session",
            Self::Item => "item",
            Self::Prompt => "prompt",
        };
        f.write_str(name)
    }
}

/// Registers and unregisters objects with the transport.
///
/// Export calls may fail (path already taken, connection gone); the caller
/// discards the object when they do. `unexport` is best effort.
#[async_trait]
pub trait ObjectExporter: Send + Sync {
    async fn export_session(&self, session: &Arc<Session>) -> Result<(), ServiceError>;

    async fn export_collection(&self, collection: &Arc<Collection>) -> Result<(), ServiceError>;

    async fn export_item(&self, item: &Arc<Item>) -> Result<(), ServiceError>;

    async fn export_prompt(&self, prompt: &Arc<Prompt>) -> Result<(), ServiceError>;

    async fn unexport(&self, kind: ObjectKind, path: &str);
}

/// An exporter that accepts everything and does nothing. Used when the
/// service runs without a bus connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExporter;

#[async_trait]
impl ObjectExporter for NoopExporter {
    async fn export_session(&self, _session: &Arc<Session>) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn export_collection(&self, _collection: &Arc<Collection>) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn export_item(&self, _item: &Arc<Item>) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn export_prompt(&self, _prompt: &Arc<Prompt>) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn unexport(&self, _kind: ObjectKind, _path: &str) {}
}

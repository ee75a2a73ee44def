//! Bridges the registries and the signal emitter to a zbus connection.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::warn;
use zbus::object_server::{Interface, SignalEmitter};
use zbus::zvariant::{ObjectPath, Value};
use zbus::Connection;

use super::collection::CollectionObject;
use super::item::ItemObject;
use super::prompt::PromptObject;
use super::service::ServiceObject;
use super::session::SessionObject;
use crate::collection::Collection;
use crate::error::ServiceError;
use crate::export::{ObjectExporter, ObjectKind};
use crate::item::Item;
use crate::prompt::Prompt;
use crate::service::SecretService;
use crate::session::Session;
use crate::signals::{Signal, SignalSink};

fn bus_failure(err: zbus::Error) -> ServiceError {
    ServiceError::Export(err.to_string())
}

/// Exports objects on the connection's object server.
pub struct ZbusExporter {
    connection: Connection,
    service: Weak<SecretService>,
}

impl ZbusExporter {
    pub fn new(connection: Connection, service: Weak<SecretService>) -> Self {
        Self {
            connection,
            service,
        }
    }

    async fn at<I: Interface>(&self, path: &str, object: I) -> Result<(), ServiceError> {
        let added = self
            .connection
            .object_server()
            .at(path, object)
            .await
            .map_err(bus_failure)?;
        if !added {
            return Err(ServiceError::Export(format!("{} is already exported", path)));
        }
        Ok(())
    }

    async fn remove<I: Interface>(&self, path: &str) {
        if let Err(err) = self.connection.object_server().remove::<I, _>(path).await {
            warn!(path, error = %err, "unexport failed");
        }
    }
}

#[async_trait]
impl ObjectExporter for ZbusExporter {
    async fn export_session(&self, session: &Arc<Session>) -> Result<(), ServiceError> {
        let object = SessionObject::new(self.service.clone(), session.path());
        self.at(session.path(), object).await
    }

    async fn export_collection(&self, collection: &Arc<Collection>) -> Result<(), ServiceError> {
        let object = CollectionObject::new(self.service.clone(), collection.path());
        self.at(collection.path(), object).await?;

        let alias = CollectionObject::new(self.service.clone(), collection.alias_path());
        if let Err(err) = self.at(collection.alias_path(), alias).await {
            self.remove::<CollectionObject>(collection.path()).await;
            return Err(err);
        }
        Ok(())
    }

    async fn export_item(&self, item: &Arc<Item>) -> Result<(), ServiceError> {
        let object = ItemObject::new(self.service.clone(), item.path());
        self.at(item.path(), object).await
    }

    async fn export_prompt(&self, prompt: &Arc<Prompt>) -> Result<(), ServiceError> {
        self.at(prompt.path(), PromptObject::new(prompt.clone())).await
    }

    async fn unexport(&self, kind: ObjectKind, path: &str) {
        match kind {
            ObjectKind::Session => self.remove::<SessionObject>(path).await,
            ObjectKind::Item => self.remove::<ItemObject>(path).await,
            ObjectKind::Prompt => self.remove::<PromptObject>(path).await,
        }
    }
}

/// Emits lifecycle signals on the bus.
pub struct BusSignalSink {
    connection: Connection,
}

impl BusSignalSink {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

fn signal_path(path: &str) -> Result<ObjectPath<'_>, ServiceError> {
    ObjectPath::try_from(path).map_err(|err| ServiceError::Signal(err.to_string()))
}

#[async_trait]
impl SignalSink for BusSignalSink {
    async fn deliver(&self, signal: &Signal) -> Result<(), ServiceError> {
        let failed = |err: zbus::Error| ServiceError::Signal(err.to_string());
        let emitter = SignalEmitter::new(&self.connection, signal.emitter_path()).map_err(failed)?;

        let delivered = match signal {
            Signal::CollectionCreated { collection } => {
                ServiceObject::collection_created(&emitter, signal_path(collection)?).await
            }
            Signal::CollectionChanged { collection } => {
                ServiceObject::collection_changed(&emitter, signal_path(collection)?).await
            }
            Signal::ItemCreated { item, .. } => {
                CollectionObject::item_created(&emitter, signal_path(item)?).await
            }
            Signal::ItemDeleted { item, .. } => {
                CollectionObject::item_deleted(&emitter, signal_path(item)?).await
            }
            Signal::ItemChanged { item, .. } => {
                CollectionObject::item_changed(&emitter, signal_path(item)?).await
            }
            Signal::PromptCompleted {
                dismissed, result, ..
            } => {
                let objects = result
                    .iter()
                    .map(|path| signal_path(path))
                    .collect::<Result<Vec<_>, _>>()?;
                PromptObject::completed(&emitter, *dismissed, Value::from(objects)).await
            }
        };
        delivered.map_err(failed)
    }
}

//! `org.freedesktop.Secret.Service` at `/org/freedesktop/secrets`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use zbus::object_server::SignalEmitter;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};
use zbus::{fdo, interface};

use super::error::{property_error, BusError};
use super::wire::{
    input_bytes, object_path, object_paths, path_strings, string_property, WireSecret,
    COLLECTION_LABEL,
};
use crate::error::ServiceError;
use crate::service::SecretService;
use crate::session::SessionOutput;

pub struct ServiceObject {
    service: Weak<SecretService>,
}

impl ServiceObject {
    pub fn new(service: Weak<SecretService>) -> Self {
        Self { service }
    }
}

/// Upgrade the back-reference held by every interface object.
pub(crate) fn upgrade(service: &Weak<SecretService>) -> Result<Arc<SecretService>, ServiceError> {
    service
        .upgrade()
        .ok_or_else(|| ServiceError::NotSupported("service is shutting down".into()))
}

#[interface(name = "org.freedesktop.Secret.Service")]
impl ServiceObject {
    async fn open_session(
        &self,
        algorithm: &str,
        input: OwnedValue,
    ) -> Result<(OwnedValue, OwnedObjectPath), BusError> {
        let service = upgrade(&self.service)?;
        let input = input_bytes(input)?;
        let (output, path) = service.open_session(algorithm, &input).await?;

        let output = match output {
            SessionOutput::Plain => Value::from(""),
            SessionOutput::PublicKey(key) => Value::from(key),
        };
        let output = OwnedValue::try_from(output).map_err(|err| BusError::ZBus(err.into()))?;
        Ok((output, object_path(&path)?))
    }

    async fn create_collection(
        &self,
        properties: HashMap<String, OwnedValue>,
        alias: &str,
    ) -> Result<(OwnedObjectPath, OwnedObjectPath), BusError> {
        let service = upgrade(&self.service)?;
        let label = string_property(&properties, COLLECTION_LABEL).unwrap_or_default();
        let (collection, prompt) = service.create_collection(&label, alias).await?;
        Ok((object_path(&collection)?, object_path(&prompt)?))
    }

    async fn search_items(
        &self,
        attributes: HashMap<String, String>,
    ) -> Result<(Vec<OwnedObjectPath>, Vec<OwnedObjectPath>), BusError> {
        let service = upgrade(&self.service)?;
        let result = service.search_items(&attributes).await?;
        Ok((object_paths(&result.unlocked)?, object_paths(&result.locked)?))
    }

    async fn unlock(
        &self,
        objects: Vec<OwnedObjectPath>,
    ) -> Result<(Vec<OwnedObjectPath>, OwnedObjectPath), BusError> {
        let service = upgrade(&self.service)?;
        let (unlocked, prompt) = service.unlock(&path_strings(&objects)).await?;
        Ok((object_paths(&unlocked)?, object_path(&prompt)?))
    }

    async fn lock(
        &self,
        objects: Vec<OwnedObjectPath>,
    ) -> Result<(Vec<OwnedObjectPath>, OwnedObjectPath), BusError> {
        let service = upgrade(&self.service)?;
        let (locked, prompt) = service.lock(&path_strings(&objects)).await?;
        Ok((object_paths(&locked)?, object_path(&prompt)?))
    }

    async fn get_secrets(
        &self,
        items: Vec<OwnedObjectPath>,
        session: OwnedObjectPath,
    ) -> Result<HashMap<OwnedObjectPath, WireSecret>, BusError> {
        let service = upgrade(&self.service)?;
        let secrets = service
            .get_secrets(&path_strings(&items), session.as_str())
            .await?;

        let mut wire = HashMap::with_capacity(secrets.len());
        for (path, secret) in secrets {
            wire.insert(object_path(&path)?, WireSecret::try_from(secret)?);
        }
        Ok(wire)
    }

    async fn read_alias(&self, name: &str) -> Result<OwnedObjectPath, BusError> {
        let service = upgrade(&self.service)?;
        object_path(&service.read_alias(name).await?)
    }

    async fn set_alias(&self, name: &str, collection: OwnedObjectPath) -> Result<(), BusError> {
        let service = upgrade(&self.service)?;
        service.set_alias(name, collection.as_str()).await?;
        Ok(())
    }

    #[zbus(property)]
    async fn collections(&self) -> fdo::Result<Vec<OwnedObjectPath>> {
        let service = upgrade(&self.service).map_err(property_error)?;
        let paths = service.collection_paths().await.map_err(property_error)?;
        paths
            .iter()
            .map(|path| {
                OwnedObjectPath::try_from(path.as_str())
                    .map_err(|err| fdo::Error::Failed(err.to_string()))
            })
            .collect()
    }

    #[zbus(signal)]
    pub(crate) async fn collection_created(
        emitter: &SignalEmitter<'_>,
        collection: ObjectPath<'_>,
    ) -> zbus::Result<()>;

    /// Part of the interface for introspection; the default collection is
    /// never deleted, so nothing emits it.
    #[zbus(signal)]
    pub async fn collection_deleted(
        emitter: &SignalEmitter<'_>,
        collection: ObjectPath<'_>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub(crate) async fn collection_changed(
        emitter: &SignalEmitter<'_>,
        collection: ObjectPath<'_>,
    ) -> zbus::Result<()>;
}

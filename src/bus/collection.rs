//! `org.freedesktop.Secret.Collection`, exported at the collection path and
//! again at its alias path.

use std::collections::HashMap;
use std::sync::Weak;

use zbus::object_server::SignalEmitter;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue};
use zbus::{fdo, interface};

use super::error::{property_error, BusError};
use super::service::upgrade;
use super::wire::{
    attributes_property, object_path, object_paths, string_property, WireSecret, ITEM_ATTRIBUTES,
    ITEM_LABEL,
};
use crate::service::SecretService;

pub struct CollectionObject {
    service: Weak<SecretService>,
    /// The path this instance is served at.
    path: String,
}

impl CollectionObject {
    pub fn new(service: Weak<SecretService>, path: &str) -> Self {
        Self {
            service,
            path: path.to_string(),
        }
    }
}

#[interface(name = "org.freedesktop.Secret.Collection")]
impl CollectionObject {
    async fn delete(&self) -> Result<OwnedObjectPath, BusError> {
        let service = upgrade(&self.service)?;
        object_path(&service.delete_collection(&self.path).await?)
    }

    async fn search_items(
        &self,
        attributes: HashMap<String, String>,
    ) -> Result<Vec<OwnedObjectPath>, BusError> {
        let service = upgrade(&self.service)?;
        object_paths(&service.collection_search(&self.path, &attributes).await?)
    }

    async fn create_item(
        &self,
        properties: HashMap<String, OwnedValue>,
        secret: WireSecret,
        replace: bool,
    ) -> Result<(OwnedObjectPath, OwnedObjectPath), BusError> {
        let service = upgrade(&self.service)?;
        let label = string_property(&properties, ITEM_LABEL).unwrap_or_default();
        let attributes = attributes_property(&properties, ITEM_ATTRIBUTES)?;

        let (item, prompt) = service
            .create_item(&self.path, &label, &attributes, &secret.into(), replace)
            .await?;
        Ok((object_path(&item)?, object_path(&prompt)?))
    }

    #[zbus(property)]
    async fn items(&self) -> fdo::Result<Vec<OwnedObjectPath>> {
        let service = upgrade(&self.service).map_err(property_error)?;
        let items = service
            .collection_items(&self.path)
            .await
            .map_err(property_error)?;
        object_paths(&items).map_err(|err| fdo::Error::Failed(err.to_string()))
    }

    #[zbus(property)]
    async fn label(&self) -> fdo::Result<String> {
        let service = upgrade(&self.service).map_err(property_error)?;
        let collection = service.collection(&self.path).await.map_err(property_error)?;
        Ok(collection.label())
    }

    #[zbus(property)]
    async fn set_label(&mut self, label: String) -> fdo::Result<()> {
        let service = upgrade(&self.service).map_err(property_error)?;
        service
            .set_collection_label(&self.path, &label)
            .await
            .map_err(property_error)
    }

    #[zbus(property)]
    async fn locked(&self) -> fdo::Result<bool> {
        let service = upgrade(&self.service).map_err(property_error)?;
        service.is_locked().await.map_err(property_error)
    }

    #[zbus(property)]
    async fn created(&self) -> fdo::Result<u64> {
        let service = upgrade(&self.service).map_err(property_error)?;
        let collection = service.collection(&self.path).await.map_err(property_error)?;
        Ok(collection.created().timestamp().max(0) as u64)
    }

    #[zbus(property)]
    async fn modified(&self) -> fdo::Result<u64> {
        let service = upgrade(&self.service).map_err(property_error)?;
        let collection = service.collection(&self.path).await.map_err(property_error)?;
        Ok(service.collection_modified(&collection).await)
    }

    #[zbus(signal)]
    pub(crate) async fn item_created(
        emitter: &SignalEmitter<'_>,
        item: ObjectPath<'_>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub(crate) async fn item_deleted(
        emitter: &SignalEmitter<'_>,
        item: ObjectPath<'_>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub(crate) async fn item_changed(
        emitter: &SignalEmitter<'_>,
        item: ObjectPath<'_>,
    ) -> zbus::Result<()>;
}

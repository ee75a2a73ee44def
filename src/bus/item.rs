//! `org.freedesktop.Secret.Item`.

use std::collections::HashMap;
use std::sync::Weak;

use zbus::zvariant::OwnedObjectPath;
use zbus::{fdo, interface};

use super::error::{property_error, BusError};
use super::service::upgrade;
use super::wire::{object_path, WireSecret};
use crate::service::SecretService;

pub struct ItemObject {
    service: Weak<SecretService>,
    path: String,
}

impl ItemObject {
    pub fn new(service: Weak<SecretService>, path: &str) -> Self {
        Self {
            service,
            path: path.to_string(),
        }
    }
}

#[interface(name = "org.freedesktop.Secret.Item")]
impl ItemObject {
    async fn delete(&self) -> Result<OwnedObjectPath, BusError> {
        let service = upgrade(&self.service)?;
        object_path(&service.delete_item(&self.path).await?)
    }

    async fn get_secret(&self, session: OwnedObjectPath) -> Result<WireSecret, BusError> {
        let service = upgrade(&self.service)?;
        let secret = service.get_secret(&self.path, session.as_str()).await?;
        WireSecret::try_from(secret)
    }

    async fn set_secret(&self, secret: WireSecret) -> Result<(), BusError> {
        let service = upgrade(&self.service)?;
        service.set_secret(&self.path, &secret.into()).await?;
        Ok(())
    }

    #[zbus(property)]
    async fn locked(&self) -> fdo::Result<bool> {
        let service = upgrade(&self.service).map_err(property_error)?;
        service.is_locked().await.map_err(property_error)
    }

    #[zbus(property)]
    async fn attributes(&self) -> fdo::Result<HashMap<String, String>> {
        let service = upgrade(&self.service).map_err(property_error)?;
        let item = service.item(&self.path).await.map_err(property_error)?;
        Ok(service.item_attributes(&item))
    }

    #[zbus(property)]
    async fn set_attributes(&mut self, attributes: HashMap<String, String>) -> fdo::Result<()> {
        let service = upgrade(&self.service).map_err(property_error)?;
        service
            .set_item_attributes(&self.path, &attributes)
            .await
            .map_err(property_error)
    }

    #[zbus(property)]
    async fn label(&self) -> fdo::Result<String> {
        let service = upgrade(&self.service).map_err(property_error)?;
        let item = service.item(&self.path).await.map_err(property_error)?;
        Ok(item.label())
    }

    #[zbus(property)]
    async fn set_label(&mut self, label: String) -> fdo::Result<()> {
        let service = upgrade(&self.service).map_err(property_error)?;
        service
            .set_item_label(&self.path, &label)
            .await
            .map_err(property_error)
    }

    #[zbus(property)]
    async fn created(&self) -> fdo::Result<u64> {
        let service = upgrade(&self.service).map_err(property_error)?;
        let item = service.item(&self.path).await.map_err(property_error)?;
        Ok(item.created())
    }

    #[zbus(property)]
    async fn modified(&self) -> fdo::Result<u64> {
        let service = upgrade(&self.service).map_err(property_error)?;
        let item = service.item(&self.path).await.map_err(property_error)?;
        Ok(item.modified())
    }
}

//! `org.freedesktop.Secret.Session`.

use std::sync::Weak;

use zbus::interface;

use super::error::BusError;
use super::service::upgrade;
use crate::service::SecretService;

pub struct SessionObject {
    service: Weak<SecretService>,
    path: String,
}

impl SessionObject {
    pub fn new(service: Weak<SecretService>, path: &str) -> Self {
        Self {
            service,
            path: path.to_string(),
        }
    }
}

#[interface(name = "org.freedesktop.Secret.Session")]
impl SessionObject {
    async fn close(&self) -> Result<(), BusError> {
        let service = upgrade(&self.service)?;
        service.close_session(&self.path).await?;
        Ok(())
    }
}

//! D-Bus transport.
//!
//! Serves the dispatcher over a zbus connection:
//!
//! | Path | Interface |
//! |------|-----------|
//! | `/org/freedesktop/secrets` | `org.freedesktop.Secret.Service` |
//! | `.../collections/default`, `.../aliases/default` | `org.freedesktop.Secret.Collection` |
//! | `.../collections/default/<id>` | `org.freedesktop.Secret.Item` |
//! | `.../session/<n>` | `org.freedesktop.Secret.Session` |
//! | `.../prompt/<n>` | `org.freedesktop.Secret.Prompt` |

mod collection;
mod error;
mod exporter;
mod item;
mod prompt;
mod service;
mod session;
mod wire;

use std::sync::Arc;

use tracing::info;
use zbus::fdo::{RequestNameFlags, RequestNameReply};
use zbus::Connection;

pub use collection::CollectionObject;
pub use error::BusError;
pub use exporter::{BusSignalSink, ZbusExporter};
pub use item::ItemObject;
pub use prompt::PromptObject;
pub use service::ServiceObject;
pub use session::SessionObject;
pub use wire::WireSecret;

use crate::attributes::AttributeMapper;
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::paths;
use crate::service::SecretService;
use crate::signals::SignalEmitter;
use crate::vault::VaultClient;

/// A running service: the bus connection and the dispatcher behind it.
/// Dropping it closes the connection.
pub struct Server {
    connection: Connection,
    service: Arc<SecretService>,
}

impl Server {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn service(&self) -> &Arc<SecretService> {
        &self.service
    }
}

fn bus_failure(err: zbus::Error) -> ServiceError {
    ServiceError::Export(err.to_string())
}

/// Connect to the session bus and serve the Secret Service on it.
pub async fn serve(
    config: ServiceConfig,
    vault: Arc<dyn VaultClient>,
    mapper: Arc<dyn AttributeMapper>,
) -> Result<Server, ServiceError> {
    let connection = Connection::session().await.map_err(bus_failure)?;
    serve_on(connection, config, vault, mapper).await
}

/// Serve the Secret Service on an existing connection.
pub async fn serve_on(
    connection: Connection,
    config: ServiceConfig,
    vault: Arc<dyn VaultClient>,
    mapper: Arc<dyn AttributeMapper>,
) -> Result<Server, ServiceError> {
    let replace_existing = config.replace_existing;
    let server = attach(connection, config, vault, mapper).await?;
    request_name(&server.connection, replace_existing).await?;

    info!(name = paths::BUS_NAME, "secret service ready");
    Ok(server)
}

/// Export the service objects on `connection` without claiming the bus
/// name. Peer-to-peer connections have no bus to claim it from.
pub async fn attach(
    connection: Connection,
    config: ServiceConfig,
    vault: Arc<dyn VaultClient>,
    mapper: Arc<dyn AttributeMapper>,
) -> Result<Server, ServiceError> {
    let signals = Arc::new(
        SignalEmitter::new().with_sink(Arc::new(BusSignalSink::new(connection.clone()))),
    );
    let service = Arc::new_cyclic(|weak| {
        let exporter = Arc::new(ZbusExporter::new(connection.clone(), weak.clone()));
        SecretService::new(config, vault, mapper, exporter, signals)
    });

    let root = ServiceObject::new(Arc::downgrade(&service));
    connection
        .object_server()
        .at(paths::SERVICE_PATH, root)
        .await
        .map_err(bus_failure)?;
    service.default_collection().await?;

    Ok(Server {
        connection,
        service,
    })
}

async fn request_name(connection: &Connection, replace_existing: bool) -> Result<(), ServiceError> {
    let flags = if replace_existing {
        RequestNameFlags::DoNotQueue | RequestNameFlags::ReplaceExisting
    } else {
        RequestNameFlags::DoNotQueue.into()
    };
    let reply = connection
        .request_name_with_flags(paths::BUS_NAME, flags)
        .await
        .map_err(bus_failure)?;
    match reply {
        RequestNameReply::PrimaryOwner | RequestNameReply::AlreadyOwner => {}
        _ => {
            return Err(ServiceError::Export(format!(
                "{} is owned by another process",
                paths::BUS_NAME
            )))
        }
    }
    Ok(())
}

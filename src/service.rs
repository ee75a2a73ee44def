//! The Secret Service dispatcher.
//!
//! `SecretService` owns every registry and implements the operations of the
//! `Service`, `Collection` and `Item` interfaces on top of the vault client.
//! It speaks `ServiceError`; the bus layer translates to protocol errors.
//!
//! Object paths are the currency of the API: callers pass and receive
//! paths, and the dispatcher resolves them through its registries.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::attributes::{AttributeMapper, Attributes};
use crate::cancel::Cancellation;
use crate::collection::Collection;
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::export::{ObjectExporter, ObjectKind};
use crate::item::Item;
use crate::paths;
use crate::prompt::PromptRegistry;
use crate::registry::ObjectRegistry;
use crate::session::{Secret, Session, SessionOutput, SessionRegistry};
use crate::signals::{Signal, SignalEmitter};
use crate::vault::{ItemRequest, VaultClient, VaultError, VaultItem};

/// Outcome of `SearchItems`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub unlocked: Vec<String>,
    pub locked: Vec<String>,
}

pub struct SecretService {
    config: ServiceConfig,
    vault: Arc<dyn VaultClient>,
    mapper: Arc<dyn AttributeMapper>,
    exporter: Arc<dyn ObjectExporter>,
    signals: Arc<SignalEmitter>,
    sessions: SessionRegistry,
    collections: ObjectRegistry<Collection>,
    items: ObjectRegistry<Item>,
    prompts: Arc<PromptRegistry>,
}

impl fmt::Debug for SecretService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretService")
            .field("sessions", &self.sessions)
            .field("collections", &self.collections)
            .field("items", &self.items)
            .field("prompts", &self.prompts)
            .finish_non_exhaustive()
    }
}

impl SecretService {
    pub fn new(
        config: ServiceConfig,
        vault: Arc<dyn VaultClient>,
        mapper: Arc<dyn AttributeMapper>,
        exporter: Arc<dyn ObjectExporter>,
        signals: Arc<SignalEmitter>,
    ) -> Self {
        let prompts = PromptRegistry::new(
            vault.clone(),
            exporter.clone(),
            signals.clone(),
            config.prompt_timeout(),
        );
        Self {
            sessions: SessionRegistry::new(exporter.clone()),
            collections: ObjectRegistry::new("collection"),
            items: ObjectRegistry::new("item"),
            prompts,
            config,
            vault,
            mapper,
            exporter,
            signals,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn prompts(&self) -> &Arc<PromptRegistry> {
        &self.prompts
    }

    /// Number of items currently exported.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    // -----------------------------------------------------------------------
    // Service interface
    // -----------------------------------------------------------------------

    /// Returns the session output and the new session's path.
    pub async fn open_session(
        &self,
        algorithm: &str,
        input: &[u8],
    ) -> Result<(SessionOutput, String), ServiceError> {
        let (session, output) = self.sessions.create_session(algorithm, input).await?;
        Ok((output, session.path().to_string()))
    }

    pub async fn close_session(&self, path: &str) -> Result<(), ServiceError> {
        self.sessions.close(path).await
    }

    /// Only the default collection exists; every request returns it.
    /// Returns `(collection, prompt)`.
    pub async fn create_collection(
        &self,
        label: &str,
        alias: &str,
    ) -> Result<(String, String), ServiceError> {
        debug!(label, alias, "create collection requested, using default");
        let collection = self.default_collection().await?;
        Ok((collection.path().to_string(), paths::NO_PROMPT.to_string()))
    }

    /// The default collection, created and exported on first use.
    pub async fn default_collection(&self) -> Result<Arc<Collection>, ServiceError> {
        let label = self.config.collection_label.clone();
        self.collections
            .get_or_export(
                paths::DEFAULT_COLLECTION,
                (),
                |()| Collection::new(paths::DEFAULT_COLLECTION, &label),
                |collection| async move {
                    self.exporter.export_collection(&collection).await?;
                    self.signals
                        .emit(Signal::CollectionCreated {
                            collection: collection.path().to_string(),
                        })
                        .await;
                    Ok(())
                },
            )
            .await
    }

    /// Paths of all collections.
    pub async fn collection_paths(&self) -> Result<Vec<String>, ServiceError> {
        self.default_collection().await?;
        Ok(self
            .collections
            .ready_values()
            .iter()
            .map(|collection| collection.path().to_string())
            .collect())
    }

    pub async fn search_items(&self, attributes: &Attributes) -> Result<SearchResult, ServiceError> {
        let collection = self.default_collection().await?;
        if self.vault.is_locked().await? {
            return Ok(SearchResult {
                unlocked: Vec::new(),
                locked: vec![collection.path().to_string()],
            });
        }

        let items = self.find_items(attributes).await?;
        debug!(matches = items.len(), "search items");
        Ok(SearchResult {
            unlocked: items.iter().map(|item| item.path().to_string()).collect(),
            locked: Vec::new(),
        })
    }

    /// Returns `(unlocked, prompt)`. When the vault is locked nothing is
    /// unlocked yet and the caller must run the returned prompt.
    pub async fn unlock(&self, objects: &[String]) -> Result<(Vec<String>, String), ServiceError> {
        if !self.vault.is_locked().await? {
            return Ok((objects.to_vec(), paths::NO_PROMPT.to_string()));
        }

        let targets = if objects.is_empty() {
            vec![self.default_collection().await?.path().to_string()]
        } else {
            objects.to_vec()
        };
        let prompt = self.prompts.create(targets).await?;
        Ok((Vec::new(), prompt.path().to_string()))
    }

    /// Returns `(locked, prompt)`. Never prompts.
    pub async fn lock(&self, objects: &[String]) -> Result<(Vec<String>, String), ServiceError> {
        self.vault.lock().await?;
        info!("vault locked");

        let collection = self.default_collection().await?;
        self.signals
            .emit(Signal::CollectionChanged {
                collection: collection.path().to_string(),
            })
            .await;
        Ok((objects.to_vec(), paths::NO_PROMPT.to_string()))
    }

    /// Secrets of the given items, encrypted for `session`.
    ///
    /// Items that cannot be resolved or have no password are left out.
    pub async fn get_secrets(
        &self,
        items: &[String],
        session: &str,
    ) -> Result<HashMap<String, Secret>, ServiceError> {
        let session = self.session(session)?;
        self.vault.ensure_unlocked(&Cancellation::never()).await?;

        let mut secrets = HashMap::new();
        for path in items {
            let item = match self.current_item(path).await {
                Ok(item) => item,
                Err(err) => {
                    debug!(path = %path, error = %err, "skipping unresolvable item");
                    continue;
                }
            };
            let Some(password) = item.password() else {
                debug!(path = %path, "skipping item without password");
                continue;
            };
            let secret = session.encrypt_secret(&password, &self.config.content_type)?;
            secrets.insert(path.clone(), secret);
        }
        Ok(secrets)
    }

    /// The collection behind an alias, or `/` if there is none.
    pub async fn read_alias(&self, name: &str) -> Result<String, ServiceError> {
        if name != paths::DEFAULT_COLLECTION {
            return Ok(paths::NO_PROMPT.to_string());
        }
        Ok(self.default_collection().await?.path().to_string())
    }

    /// Accepted and ignored: the only alias is `default`.
    pub async fn set_alias(&self, name: &str, collection: &str) -> Result<(), ServiceError> {
        debug!(name, collection, "set alias ignored");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Collection interface
    // -----------------------------------------------------------------------

    /// Resolve a collection path, or its alias path.
    pub async fn collection(&self, path: &str) -> Result<Arc<Collection>, ServiceError> {
        let collection = self.default_collection().await?;
        if path == collection.path() || path == collection.alias_path() {
            return Ok(collection);
        }
        Err(ServiceError::NoSuchObject(path.to_string()))
    }

    /// Paths of every item in the collection. Empty while the vault is
    /// locked.
    pub async fn collection_items(&self, path: &str) -> Result<Vec<String>, ServiceError> {
        self.collection(path).await?;
        let vault_items = match self.vault.list_items().await {
            Ok(items) => items,
            Err(VaultError::Locked) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let items = try_join_all(vault_items.into_iter().map(|item| self.resolve_item(item))).await?;
        Ok(items.iter().map(|item| item.path().to_string()).collect())
    }

    /// `Collection.SearchItems`. Empty while the vault is locked.
    pub async fn collection_search(
        &self,
        path: &str,
        attributes: &Attributes,
    ) -> Result<Vec<String>, ServiceError> {
        self.collection(path).await?;
        if self.vault.is_locked().await? {
            return Ok(Vec::new());
        }
        let items = self.find_items(attributes).await?;
        Ok(items.iter().map(|item| item.path().to_string()).collect())
    }

    /// `Collection.CreateItem`. With `replace`, an existing item matching
    /// `attributes` is updated instead. Returns `(item, prompt)`.
    pub async fn create_item(
        &self,
        collection: &str,
        label: &str,
        attributes: &Attributes,
        secret: &Secret,
        replace: bool,
    ) -> Result<(String, String), ServiceError> {
        self.collection(collection).await?;
        let password = self.decrypt_password(secret)?;

        let existing = if replace && !attributes.is_empty() {
            self.find_vault_items(attributes).await?.into_iter().next()
        } else {
            None
        };

        let mut request = match &existing {
            Some(found) => ItemRequest::from(found),
            None => ItemRequest::new(label),
        };
        if !label.is_empty() {
            request.name = label.to_string();
        }
        self.mapper.apply(&mut request, attributes);
        request.login.password = Some(password.to_string());

        let item = match existing {
            Some(found) => {
                let updated = self.vault.update_item(&found.id, request).await?;
                let item = self.resolve_item(updated).await?;
                self.emit_item(&item, ItemEvent::Changed).await;
                info!(path = item.path(), "item replaced");
                item
            }
            None => {
                let created = self.vault.create_item(request).await?;
                let item = self.resolve_item(created).await?;
                info!(path = item.path(), "item created");
                item
            }
        };
        Ok((item.path().to_string(), paths::NO_PROMPT.to_string()))
    }

    /// The default collection cannot be deleted.
    pub async fn delete_collection(&self, path: &str) -> Result<String, ServiceError> {
        self.collection(path).await?;
        Err(ServiceError::NotSupported(
            "deleting the default collection".into(),
        ))
    }

    pub async fn set_collection_label(&self, path: &str, label: &str) -> Result<(), ServiceError> {
        let collection = self.collection(path).await?;
        collection.set_label(label);
        self.signals
            .emit(Signal::CollectionChanged {
                collection: collection.path().to_string(),
            })
            .await;
        Ok(())
    }

    /// `Modified` of a collection: the vault's last sync, else creation.
    pub async fn collection_modified(&self, collection: &Collection) -> u64 {
        let synced = match self.vault.status().await {
            Ok(status) => status.last_sync,
            Err(err) => {
                debug!(error = %err, "vault status unavailable");
                None
            }
        };
        synced
            .unwrap_or_else(|| collection.created())
            .timestamp()
            .max(0) as u64
    }

    pub async fn is_locked(&self) -> Result<bool, ServiceError> {
        Ok(self.vault.is_locked().await?)
    }

    // -----------------------------------------------------------------------
    // Item interface
    // -----------------------------------------------------------------------

    /// Resolve an item path. Items not seen yet are fetched from the vault
    /// and exported; exported items are served as last seen.
    pub async fn item(&self, path: &str) -> Result<Arc<Item>, ServiceError> {
        let id = item_id(path)?;
        if let Some(item) = self.items.get(id).await {
            return Ok(item);
        }
        self.current_item(path).await
    }

    /// Resolve an item path against the vault's current copy, refreshing the
    /// exported object. An item the vault no longer has is unexported and
    /// announced as deleted.
    pub async fn current_item(&self, path: &str) -> Result<Arc<Item>, ServiceError> {
        let id = item_id(path)?;
        match self.vault.get_item(&paths::unsanitize(id)).await {
            Ok(vault_item) => self.resolve_item(vault_item).await,
            Err(VaultError::NotFound(_)) => {
                self.forget_item(id).await;
                Err(ServiceError::NoSuchObject(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn item_attributes(&self, item: &Item) -> Attributes {
        self.mapper.attributes(&item.snapshot())
    }

    /// `Item.GetSecret`. An item without a password yields an empty secret.
    pub async fn get_secret(&self, item: &str, session: &str) -> Result<Secret, ServiceError> {
        let session = self.session(session)?;
        self.vault.ensure_unlocked(&Cancellation::never()).await?;
        let item = self.current_item(item).await?;

        let password = item.password().unwrap_or_default();
        session.encrypt_secret(&password, &self.config.content_type)
    }

    pub async fn set_secret(&self, item: &str, secret: &Secret) -> Result<(), ServiceError> {
        let item = self.current_item(item).await?;
        let password = self.decrypt_password(secret)?;
        self.update_item(&item, |request| {
            request.login.password = Some(password.to_string());
        })
        .await
    }

    pub async fn set_item_label(&self, item: &str, label: &str) -> Result<(), ServiceError> {
        let item = self.current_item(item).await?;
        self.update_item(&item, |request| request.name = label.to_string())
            .await
    }

    pub async fn set_item_attributes(
        &self,
        item: &str,
        attributes: &Attributes,
    ) -> Result<(), ServiceError> {
        let item = self.current_item(item).await?;
        self.update_item(&item, |request| self.mapper.apply(request, attributes))
            .await
    }

    /// `Item.Delete`. Returns the prompt path, always `/`.
    pub async fn delete_item(&self, path: &str) -> Result<String, ServiceError> {
        let item = self.current_item(path).await?;
        match self.vault.delete_item(&item.vault_id()).await {
            Ok(()) | Err(VaultError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        self.forget_item(item.id()).await;
        info!(path = item.path(), "item deleted");
        Ok(paths::NO_PROMPT.to_string())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn session(&self, path: &str) -> Result<Arc<Session>, ServiceError> {
        self.sessions
            .get(path)
            .ok_or_else(|| ServiceError::NoSession(path.to_string()))
    }

    fn decrypt_password(&self, secret: &Secret) -> Result<Zeroizing<String>, ServiceError> {
        let session = self.session(&secret.session)?;
        let plaintext = session.decrypt_secret(secret)?;
        let password = std::str::from_utf8(&plaintext)
            .map_err(|_| ServiceError::InvalidArgument("secret is not valid UTF-8".into()))?;
        Ok(Zeroizing::new(password.to_string()))
    }

    /// Vault items matching `attributes`, narrowed by the mapper's search
    /// term when there is one.
    async fn find_vault_items(&self, attributes: &Attributes) -> Result<Vec<VaultItem>, ServiceError> {
        let candidates = match self.mapper.search_term(attributes) {
            Some(term) => self.vault.search_items(&term).await?,
            None => self.vault.list_items().await?,
        };
        Ok(candidates
            .into_iter()
            .filter(|item| self.mapper.matches(item, attributes))
            .collect())
    }

    async fn find_items(&self, attributes: &Attributes) -> Result<Vec<Arc<Item>>, ServiceError> {
        let matches = self.find_vault_items(attributes).await?;
        try_join_all(matches.into_iter().map(|item| self.resolve_item(item))).await
    }

    /// Export `vault_item`, or refresh it if it already is.
    async fn resolve_item(&self, vault_item: VaultItem) -> Result<Arc<Item>, ServiceError> {
        let id = paths::sanitize(&vault_item.id);
        self.items
            .get_or_export(
                &id,
                vault_item,
                |snapshot| Item::new(paths::DEFAULT_COLLECTION, snapshot),
                |item| async move {
                    self.exporter.export_item(&item).await?;
                    self.emit_item(&item, ItemEvent::Created).await;
                    Ok(())
                },
            )
            .await
    }

    /// Write an edited copy of the item back to the vault and refresh it.
    async fn update_item<F>(&self, item: &Item, edit: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut ItemRequest),
    {
        let snapshot = item.snapshot();
        let mut request = ItemRequest::from(&snapshot);
        edit(&mut request);

        let updated = self.vault.update_item(&snapshot.id, request).await?;
        let item = self.resolve_item(updated).await?;
        self.emit_item(&item, ItemEvent::Changed).await;
        Ok(())
    }

    /// Drop an item from the registry and the bus. Only the caller that
    /// actually removes it announces `ItemDeleted`.
    async fn forget_item(&self, id: &str) {
        let Some(removed) = self.items.remove(id).await else {
            return;
        };
        self.exporter.unexport(ObjectKind::Item, removed.path()).await;
        self.emit_item(&removed, ItemEvent::Deleted).await;
    }

    async fn emit_item(&self, item: &Item, event: ItemEvent) {
        let collection = item.collection_path().to_string();
        let path = item.path().to_string();
        let signal = match event {
            ItemEvent::Created => Signal::ItemCreated { collection, item: path },
            ItemEvent::Changed => Signal::ItemChanged { collection, item: path },
            ItemEvent::Deleted => Signal::ItemDeleted { collection, item: path },
        };
        self.signals.emit(signal).await;
    }
}

/// The sanitised item id from a path inside the default collection.
fn item_id(path: &str) -> Result<&str, ServiceError> {
    match paths::parse_item_path(path) {
        Some((collection, id)) if collection == paths::DEFAULT_COLLECTION => Ok(id),
        _ => Err(ServiceError::NoSuchObject(path.to_string())),
    }
}

#[derive(Debug, Clone, Copy)]
enum ItemEvent {
    Created,
    Changed,
    Deleted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::LoginAttributeMapper;
    use crate::export::NoopExporter;
    use crate::memory::MemoryVault;

    fn service(vault: MemoryVault) -> SecretService {
        SecretService::new(
            ServiceConfig::default(),
            Arc::new(vault),
            Arc::new(LoginAttributeMapper),
            Arc::new(NoopExporter),
            Arc::new(SignalEmitter::new()),
        )
    }

    #[tokio::test]
    async fn test_unknown_paths_are_no_such_object() {
        let service = service(MemoryVault::new("pw"));

        for path in [
            "/org/freedesktop/secrets/collections/work/abc",
            "/org/freedesktop/secrets/collections/default",
            "/org/freedesktop/secrets/collections/default/5f1a6c0e3b7d4e9a8c210d4b6e8f9a12",
        ] {
            assert_eq!(
                service.item(path).await.unwrap_err(),
                ServiceError::NoSuchObject(path.to_string())
            );
        }
        assert_eq!(
            service.collection("/org/freedesktop/secrets/collections/work").await.unwrap_err(),
            ServiceError::NoSuchObject("/org/freedesktop/secrets/collections/work".into())
        );
    }

    #[tokio::test]
    async fn test_alias_resolves_only_default() {
        let service = service(MemoryVault::new("pw"));
        assert_eq!(
            service.read_alias("default").await.unwrap(),
            "/org/freedesktop/secrets/collections/default"
        );
        assert_eq!(service.read_alias("login").await.unwrap(), "/");

        service
            .set_alias("login", "/org/freedesktop/secrets/collections/default")
            .await
            .unwrap();
        assert_eq!(service.read_alias("login").await.unwrap(), "/");
    }

    #[tokio::test]
    async fn test_collection_reachable_through_alias_path() {
        let service = service(MemoryVault::new("pw"));
        let collection = service
            .collection("/org/freedesktop/secrets/aliases/default")
            .await
            .unwrap();
        assert_eq!(collection.label(), "Vault");
        assert_eq!(service.collection_paths().await.unwrap(), vec![collection.path().to_string()]);
    }
}

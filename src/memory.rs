//! In-memory vault.
//!
//! A `VaultClient` that keeps items in a map. It has a master password and a
//! lock state, and simulates the interactive unlock: `ensure_unlocked` waits
//! `unlock_delay`, then "types" the configured answer. Useful for tests and
//! for running the service without a real vault.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::debug;

use crate::cancel::Cancellation;
use crate::vault::{ItemRequest, VaultClient, VaultError, VaultItem, VaultStatus};

pub struct MemoryVault {
    items: Mutex<BTreeMap<String, VaultItem>>,
    locked: AtomicBool,
    master_password: String,
    /// What the simulated user enters when asked; `None` cancels.
    unlock_answer: Mutex<Option<String>>,
    unlock_delay: Duration,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    unlock_attempts: AtomicUsize,
    cancelled_attempts: AtomicUsize,
}

impl std::fmt::Debug for MemoryVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVault")
            .field("items", &self.count())
            .field("locked", &self.is_locked_now())
            .finish_non_exhaustive()
    }
}

impl MemoryVault {
    /// An empty, unlocked vault.
    pub fn new(master_password: &str) -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            locked: AtomicBool::new(false),
            master_password: master_password.to_string(),
            unlock_answer: Mutex::new(None),
            unlock_delay: Duration::ZERO,
            last_sync: Mutex::new(None),
            unlock_attempts: AtomicUsize::new(0),
            cancelled_attempts: AtomicUsize::new(0),
        }
    }

    pub fn locked(self) -> Self {
        self.locked.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_items(self, items: impl IntoIterator<Item = VaultItem>) -> Self {
        for item in items {
            self.insert(item);
        }
        self
    }

    pub fn with_unlock_answer(self, answer: Option<&str>) -> Self {
        self.set_unlock_answer(answer);
        self
    }

    pub fn with_unlock_delay(mut self, delay: Duration) -> Self {
        self.unlock_delay = delay;
        self
    }

    pub fn set_unlock_answer(&self, answer: Option<&str>) {
        *guard(&self.unlock_answer) = answer.map(str::to_string);
    }

    /// Store an item as is, keeping its id and timestamps.
    pub fn insert(&self, item: VaultItem) {
        guard(&self.items).insert(item.id.clone(), item);
    }

    pub fn count(&self) -> usize {
        guard(&self.items).len()
    }

    pub fn is_locked_now(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Number of interactive unlocks started.
    pub fn unlock_attempts(&self) -> usize {
        self.unlock_attempts.load(Ordering::SeqCst)
    }

    /// Number of interactive unlocks that observed cancellation.
    pub fn cancelled_attempts(&self) -> usize {
        self.cancelled_attempts.load(Ordering::SeqCst)
    }

    fn check_unlocked(&self) -> Result<(), VaultError> {
        if self.is_locked_now() {
            return Err(VaultError::Locked);
        }
        Ok(())
    }

    fn open(&self) {
        self.locked.store(false, Ordering::SeqCst);
        *guard(&self.last_sync) = Some(Utc::now());
    }

    async fn prompt_user(&self) -> Result<(), VaultError> {
        tokio::time::sleep(self.unlock_delay).await;
        let answer = guard(&self.unlock_answer).clone();
        match answer {
            Some(password) if password == self.master_password => {
                self.open();
                Ok(())
            }
            Some(_) => Err(VaultError::BadPassword),
            None => Err(VaultError::Cancelled),
        }
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new("")
    }
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A random version 4 UUID in canonical form.
fn new_item_id() -> Result<String, VaultError> {
    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| VaultError::Other("randomness source failed".into()))?;
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    ))
}

fn uri_matches(item: &VaultItem, query: &str) -> bool {
    let query = query.to_ascii_lowercase();
    item.login
        .as_ref()
        .map(|login| {
            login
                .uris
                .iter()
                .any(|uri| uri.uri.to_ascii_lowercase().contains(&query))
        })
        .unwrap_or(false)
}

#[async_trait]
impl VaultClient for MemoryVault {
    async fn list_items(&self) -> Result<Vec<VaultItem>, VaultError> {
        self.check_unlocked()?;
        Ok(guard(&self.items).values().cloned().collect())
    }

    async fn search_items(&self, uri: &str) -> Result<Vec<VaultItem>, VaultError> {
        self.check_unlocked()?;
        Ok(guard(&self.items)
            .values()
            .filter(|item| uri_matches(item, uri))
            .cloned()
            .collect())
    }

    async fn get_item(&self, id: &str) -> Result<VaultItem, VaultError> {
        self.check_unlocked()?;
        guard(&self.items)
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(id.to_string()))
    }

    async fn create_item(&self, request: ItemRequest) -> Result<VaultItem, VaultError> {
        self.check_unlocked()?;
        let now = Utc::now();
        let item = VaultItem {
            id: new_item_id()?,
            name: request.name,
            login: Some(request.login),
            notes: request.notes,
            creation_date: now,
            revision_date: now,
        };
        self.insert(item.clone());
        debug!(id = %item.id, "vault item created");
        Ok(item)
    }

    async fn update_item(&self, id: &str, request: ItemRequest) -> Result<VaultItem, VaultError> {
        self.check_unlocked()?;
        let mut items = guard(&self.items);
        let item = items
            .get_mut(id)
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        item.name = request.name;
        item.login = Some(request.login);
        item.notes = request.notes;
        item.revision_date = Utc::now();
        Ok(item.clone())
    }

    async fn delete_item(&self, id: &str) -> Result<(), VaultError> {
        self.check_unlocked()?;
        guard(&self.items)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| VaultError::NotFound(id.to_string()))
    }

    async fn is_locked(&self) -> Result<bool, VaultError> {
        Ok(self.is_locked_now())
    }

    async fn lock(&self) -> Result<(), VaultError> {
        self.locked.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unlock(&self, password: &str) -> Result<VaultStatus, VaultError> {
        if password != self.master_password {
            return Err(VaultError::BadPassword);
        }
        self.open();
        self.status().await
    }

    async fn status(&self) -> Result<VaultStatus, VaultError> {
        Ok(VaultStatus {
            last_sync: *guard(&self.last_sync),
        })
    }

    async fn ensure_unlocked(&self, cancel: &Cancellation) -> Result<(), VaultError> {
        if !self.is_locked_now() {
            return Ok(());
        }
        self.unlock_attempts.fetch_add(1, Ordering::SeqCst);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.cancelled_attempts.fetch_add(1, Ordering::SeqCst);
                Err(VaultError::Cancelled)
            }
            result = self.prompt_user() => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;
    use crate::vault::{Login, LoginUri};

    fn request(name: &str, uri: &str) -> ItemRequest {
        ItemRequest {
            name: name.into(),
            login: Login {
                username: Some("alice".into()),
                password: Some("s3cret".into()),
                uris: vec![LoginUri { uri: uri.into() }],
            },
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_item_crud() {
        let vault = MemoryVault::new("pw");
        let created = vault
            .create_item(request("mail", "https://mail.example.com"))
            .await
            .unwrap();
        assert_eq!(created.id.len(), 36);
        assert_eq!(created.password(), Some("s3cret"));

        let updated = vault
            .update_item(&created.id, request("mail (work)", "https://mail.example.com"))
            .await
            .unwrap();
        assert_eq!(updated.name, "mail (work)");
        assert_eq!(updated.creation_date, created.creation_date);

        assert_eq!(vault.search_items("example.com").await.unwrap().len(), 1);
        assert!(vault.search_items("other.org").await.unwrap().is_empty());

        vault.delete_item(&created.id).await.unwrap();
        assert_eq!(
            vault.get_item(&created.id).await,
            Err(VaultError::NotFound(created.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_locked_vault_refuses_reads() {
        let vault = MemoryVault::new("pw").locked();
        assert_eq!(vault.list_items().await, Err(VaultError::Locked));
        assert_eq!(vault.unlock("wrong").await, Err(VaultError::BadPassword));

        let status = vault.unlock("pw").await.unwrap();
        assert!(status.last_sync.is_some());
        assert!(vault.list_items().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_unlocked_honours_cancellation() {
        let vault = MemoryVault::new("pw")
            .locked()
            .with_unlock_answer(Some("pw"))
            .with_unlock_delay(Duration::from_secs(30));
        let (handle, token) = cancellation();

        let attempt = vault.ensure_unlocked(&token);
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(attempt, cancel);

        assert_eq!(result, Err(VaultError::Cancelled));
        assert!(vault.is_locked_now());
        assert_eq!(vault.cancelled_attempts(), 1);
    }

    #[tokio::test]
    async fn test_ensure_unlocked_without_answer_is_cancelled() {
        let vault = MemoryVault::new("pw").locked();
        assert_eq!(
            vault.ensure_unlocked(&Cancellation::never()).await,
            Err(VaultError::Cancelled)
        );
        assert_eq!(vault.unlock_attempts(), 1);
    }
}

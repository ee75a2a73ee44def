//! The vault client boundary.
//!
//! The password vault is an external collaborator. This module defines the
//! operations the service consumes from it, the item model those operations
//! exchange, and the vault's own error type. Backend detail (HTTP status,
//! endpoint, response body) is preserved in `VaultError` so it can be logged
//! server side; it is stripped before anything crosses the bus, see
//! `error::to_protocol_error`.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cancel::Cancellation;

// ---------------------------------------------------------------------------
// Item model
// ---------------------------------------------------------------------------

/// A URI attached to a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginUri {
    pub uri: String,
}

/// Credential fields of a vault item.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub uris: Vec<LoginUri>,
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("uris", &self.uris)
            .finish()
    }
}

/// A vault item as returned by the vault's item endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultItem {
    /// The vault's identifier, a hyphenated UUID.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub login: Option<Login>,
    #[serde(default)]
    pub notes: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub revision_date: DateTime<Utc>,
}

impl VaultItem {
    /// The login password, if the item carries a non-empty one.
    pub fn password(&self) -> Option<&str> {
        self.login
            .as_ref()
            .and_then(|login| login.password.as_deref())
            .filter(|password| !password.is_empty())
    }

    pub fn username(&self) -> Option<&str> {
        self.login.as_ref().and_then(|login| login.username.as_deref())
    }

    /// The first URI on the login, if any.
    pub fn uri(&self) -> Option<&str> {
        self.login
            .as_ref()
            .and_then(|login| login.uris.first())
            .map(|uri| uri.uri.as_str())
    }
}

/// Body of a create or update call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub name: String,
    pub login: Login,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ItemRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl From<&VaultItem> for ItemRequest {
    fn from(item: &VaultItem) -> Self {
        Self {
            name: item.name.clone(),
            login: item.login.clone().unwrap_or_default(),
            notes: item.notes.clone(),
        }
    }
}

/// Vault synchronisation status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatus {
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reported by the vault client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// The vault is locked and the operation needs it unlocked.
    Locked,

    /// An unlock was cancelled, either by the user or by a dismissed prompt.
    Cancelled,

    /// The requested item does not exist.
    NotFound(String),

    /// The master password was rejected.
    BadPassword,

    /// The vault API answered with a non-success status.
    Http { status: u16, url: String, body: String },

    /// The vault API could not be reached.
    Transport(String),

    /// Anything else.
    Other(String),
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "vault is locked"),
            Self::Cancelled => write!(f, "unlock cancelled"),
            Self::NotFound(id) => write!(f, "vault item not found: {}", id),
            Self::BadPassword => write!(f, "master password rejected"),
            Self::Http { status, url, body } => {
                write!(f, "vault request to {} failed with {}: {}", url, status, body)
            }
            Self::Transport(reason) => write!(f, "vault unreachable: {}", reason),
            Self::Other(reason) => write!(f, "vault error: {}", reason),
        }
    }
}

impl std::error::Error for VaultError {}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Operations the service needs from the vault.
///
/// Read operations on a locked vault fail with `VaultError::Locked`.
/// `ensure_unlocked` is the interactive path: it may ask the user for the
/// master password and must give up with `VaultError::Cancelled` as soon as
/// `cancel` fires.
#[async_trait]
pub trait VaultClient: Send + Sync {
    async fn list_items(&self) -> Result<Vec<VaultItem>, VaultError>;

    /// Items whose login URIs match `uri`.
    async fn search_items(&self, uri: &str) -> Result<Vec<VaultItem>, VaultError>;

    async fn get_item(&self, id: &str) -> Result<VaultItem, VaultError>;

    async fn create_item(&self, request: ItemRequest) -> Result<VaultItem, VaultError>;

    async fn update_item(&self, id: &str, request: ItemRequest) -> Result<VaultItem, VaultError>;

    async fn delete_item(&self, id: &str) -> Result<(), VaultError>;

    async fn is_locked(&self) -> Result<bool, VaultError>;

    async fn lock(&self) -> Result<(), VaultError>;

    async fn unlock(&self, password: &str) -> Result<VaultStatus, VaultError>;

    async fn status(&self) -> Result<VaultStatus, VaultError>;

    async fn ensure_unlocked(&self, cancel: &Cancellation) -> Result<(), VaultError>;
}

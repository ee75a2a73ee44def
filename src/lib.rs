//! # vault-secret-service
//!
//! A freedesktop.org Secret Service provider backed by a password vault.
//!
//! Desktop applications open a plain or Diffie-Hellman encrypted session,
//! search items by attribute and read or write their secrets. When the vault
//! is locked, `Unlock` hands back a prompt that runs the vault's interactive
//! unlock in the background.
//!
//! ## Layout
//!
//! - `crypto` and `keys`: DH over the second Oakley group, HKDF-SHA256 and
//!   AES-128-CBC/PKCS7 secret transport.
//! - `session`: the session registry.
//! - `registry`: the export-deduplicating object registry used for
//!   collections and items.
//! - `prompt`: the cancellable unlock prompt.
//! - `service`: the dispatcher and `error` the mapping onto protocol errors.
//! - `bus`: the zbus transport. Everything else runs without a bus, which
//!   is how the tests drive it.

pub mod attributes;
pub mod bus;
pub mod cancel;
pub mod collection;
pub mod config;
pub mod crypto;
pub mod error;
pub mod export;
pub mod item;
pub mod keys;
pub mod memory;
pub mod paths;
pub mod prompt;
pub mod registry;
pub mod service;
pub mod session;
pub mod signals;
pub mod vault;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub use attributes::{AttributeMapper, Attributes, LoginAttributeMapper};
pub use config::ServiceConfig;
pub use error::{to_protocol_error, ProtocolError, ServiceError};
pub use export::{NoopExporter, ObjectExporter, ObjectKind};
pub use memory::MemoryVault;
pub use service::{SearchResult, SecretService};
pub use session::{Algorithm, Secret, SessionOutput};
pub use signals::{Signal, SignalEmitter, SignalSink};
pub use vault::{ItemRequest, VaultClient, VaultError, VaultItem};

//! Error types for the secret service.
//!
//! `ServiceError` is the single error type for all operations inside the
//! crate. Crypto variants are intentionally minimal: they signal *what*
//! failed without revealing *why* in ways that could leak cryptographic
//! state (a padding failure and a wrong key look the same).
//!
//! Nothing crosses the bus as a `ServiceError`. `to_protocol_error` maps it
//! to the small `ProtocolError` vocabulary of the Secret Service API, and
//! every backend failure collapses into one generic message.

use std::fmt;

use tracing::{debug, warn};

use crate::vault::VaultError;

/// The single error type for all service operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A Diffie-Hellman public key was empty, too long, or out of range.
    InvalidPeerKey,

    /// An AES key was not 16 bytes.
    InvalidKey,

    /// An AES IV was not 16 bytes.
    InvalidIv,

    /// A ciphertext was empty or not a whole number of blocks.
    InvalidCiphertext,

    /// Decryption failed. Covers bad padding and wrong key alike.
    DecryptionFailure,

    /// Key derivation (HKDF) failed.
    KeyDerivationFailure,

    /// The system's random number generator failed to produce bytes.
    RandomnessFailure,

    /// The session was asked to encrypt without key material.
    SessionNotInitialized,

    /// `OpenSession` named an algorithm this service does not implement.
    UnsupportedAlgorithm(String),

    /// A caller supplied a malformed argument.
    InvalidArgument(String),

    /// No session is registered at the given path.
    NoSession(String),

    /// No object is registered at the given path.
    NoSuchObject(String),

    /// The operation exists in the protocol but is not offered here.
    NotSupported(String),

    /// Making an object addressable on the bus failed.
    Export(String),

    /// Delivering a signal failed.
    Signal(String),

    /// A configuration file could not be read or parsed.
    Config(String),

    /// The vault client reported an error.
    Vault(VaultError),
}

impl ServiceError {
    /// True for errors caused by malformed caller input. These are rejected
    /// locally and never retried.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidPeerKey
                | Self::InvalidKey
                | Self::InvalidIv
                | Self::InvalidCiphertext
                | Self::DecryptionFailure
                | Self::UnsupportedAlgorithm(_)
                | Self::InvalidArgument(_)
        )
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPeerKey => write!(f, "invalid peer public key"),
            Self::InvalidKey => write!(f, "invalid key"),
            Self::InvalidIv => write!(f, "invalid iv"),
            Self::InvalidCiphertext => write!(f, "invalid ciphertext"),
            Self::DecryptionFailure => write!(f, "decryption failed"),
            Self::KeyDerivationFailure => write!(f, "key derivation failed"),
            Self::RandomnessFailure => write!(f, "randomness source failed"),
            Self::SessionNotInitialized => write!(f, "session not initialized"),
            Self::UnsupportedAlgorithm(name) => write!(f, "unsupported algorithm: {}", name),
            Self::InvalidArgument(reason) => write!(f, "invalid argument: {}", reason),
            Self::NoSession(path) => write!(f, "no such session: {}", path),
            Self::NoSuchObject(path) => write!(f, "no such object: {}", path),
            Self::NotSupported(what) => write!(f, "not supported: {}", what),
            Self::Export(reason) => write!(f, "export failed: {}", reason),
            Self::Signal(reason) => write!(f, "signal delivery failed: {}", reason),
            Self::Config(reason) => write!(f, "configuration error: {}", reason),
            Self::Vault(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Vault(err) => Some(err),
            _ => None,
        }
    }
}

impl From<VaultError> for ServiceError {
    fn from(err: VaultError) -> Self {
        Self::Vault(err)
    }
}

// ---------------------------------------------------------------------------
// Protocol boundary
// ---------------------------------------------------------------------------

/// The errors a bus caller can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    IsLocked,
    PromptDismissed,
    NoSession(String),
    NoSuchObject(String),
    InvalidArgs(String),
    NotSupported(String),
    /// Every backend or internal failure.
    Failed,
}

impl ProtocolError {
    /// The D-Bus error name.
    pub fn dbus_name(&self) -> &'static str {
        match self {
            Self::IsLocked => "org.freedesktop.Secret.Error.IsLocked",
            Self::PromptDismissed => "org.freedesktop.Secret.Error.PromptDismissed",
            Self::NoSession(_) => "org.freedesktop.Secret.Error.NoSession",
            Self::NoSuchObject(_) => "org.freedesktop.Secret.Error.NoSuchObject",
            Self::InvalidArgs(_) => "org.freedesktop.DBus.Error.InvalidArgs",
            Self::NotSupported(_) => "org.freedesktop.DBus.Error.NotSupported",
            Self::Failed => "org.freedesktop.DBus.Error.Failed",
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsLocked => write!(f, "the vault is locked"),
            Self::PromptDismissed => write!(f, "the prompt was dismissed"),
            Self::NoSession(path) => write!(f, "no such session: {}", path),
            Self::NoSuchObject(path) => write!(f, "no such object: {}", path),
            Self::InvalidArgs(reason) => write!(f, "{}", reason),
            Self::NotSupported(what) => write!(f, "not supported: {}", what),
            Self::Failed => write!(f, "backend error"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Translate a service error into what a bus caller may see.
///
/// Backend and internal failures are logged here with full detail and
/// surface as `ProtocolError::Failed`. A vault id never reaches the caller.
pub fn to_protocol_error(err: &ServiceError) -> ProtocolError {
    match err {
        ServiceError::Vault(VaultError::Locked) => ProtocolError::IsLocked,
        ServiceError::Vault(VaultError::Cancelled) => ProtocolError::PromptDismissed,
        ServiceError::Vault(VaultError::NotFound(id)) => {
            debug!(id = %id, "vault item not found");
            ProtocolError::NoSuchObject("vault item".into())
        }
        ServiceError::NoSession(path) => ProtocolError::NoSession(path.clone()),
        ServiceError::NoSuchObject(path) => ProtocolError::NoSuchObject(path.clone()),
        ServiceError::NotSupported(what) => ProtocolError::NotSupported(what.clone()),
        err if err.is_invalid_input() => ProtocolError::InvalidArgs(err.to_string()),
        err => {
            warn!(error = %err, "backend error");
            ProtocolError::Failed
        }
    }
}

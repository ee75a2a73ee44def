//! Transport sessions.
//!
//! A client opens a session before it can move secrets. A `plain` session
//! passes secret bytes through untouched; a DH session negotiates an AES key
//! with the client and encrypts every secret under it with a fresh IV.
//!
//! The registry hands out monotonically increasing session numbers. A
//! session becomes visible to lookups only after its bus export succeeded;
//! if the export fails the session is dropped and nothing is left behind.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto;
use crate::error::ServiceError;
use crate::export::{ObjectExporter, ObjectKind};
use crate::keys::AesKey;
use crate::paths;

// ---------------------------------------------------------------------------
// Algorithm
// ---------------------------------------------------------------------------

/// Transport algorithms offered by `OpenSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Plain,
    DhAes,
}

impl Algorithm {
    pub fn parse(name: &str) -> Result<Self, ServiceError> {
        match name {
            crypto::PLAIN_ALGORITHM => Ok(Self::Plain),
            crypto::DH_ALGORITHM => Ok(Self::DhAes),
            other => Err(ServiceError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => crypto::PLAIN_ALGORITHM,
            Self::DhAes => crypto::DH_ALGORITHM,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// A secret as it travels over the bus: `(session, parameters, value,
/// content_type)`. For DH sessions `parameters` is the IV and `value` the
/// ciphertext; for plain sessions `parameters` is empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    pub session: String,
    pub parameters: Vec<u8>,
    pub value: Vec<u8>,
    pub content_type: String,
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("session", &self.session)
            .field("parameters_len", &self.parameters.len())
            .field("value", &"<redacted>")
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// What `OpenSession` hands back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    /// Plain sessions answer with an empty string.
    Plain,
    /// DH sessions answer with the service's 128-byte public key.
    PublicKey(Vec<u8>),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One client's transport session.
///
/// The AES key is set at construction for DH sessions and never changes.
pub struct Session {
    id: u64,
    path: String,
    algorithm: Algorithm,
    key: Option<AesKey>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.path)
            .field("algorithm", &self.algorithm)
            .field("has_key", &self.key.is_some())
            .finish()
    }
}

impl Session {
    /// Negotiate a session. Returns the session and the output for the
    /// client.
    pub fn negotiate(
        id: u64,
        algorithm: Algorithm,
        input: &[u8],
    ) -> Result<(Self, SessionOutput), ServiceError> {
        let path = paths::session_path(id);
        match algorithm {
            Algorithm::Plain => Ok((
                Self {
                    id,
                    path,
                    algorithm,
                    key: None,
                },
                SessionOutput::Plain,
            )),
            Algorithm::DhAes => {
                let pair = crypto::generate_key_pair(input)?;
                let public_key = pair.public_key().to_vec();
                let key = crypto::derive_aes_key(&pair.into_shared_key())?;
                Ok((
                    Self {
                        id,
                        path,
                        algorithm,
                        key: Some(key),
                    },
                    SessionOutput::PublicKey(public_key),
                ))
            }
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Wrap `plaintext` for delivery to the client.
    pub fn encrypt_secret(&self, plaintext: &[u8], content_type: &str) -> Result<Secret, ServiceError> {
        let (parameters, value) = match self.algorithm {
            Algorithm::Plain => (Vec::new(), plaintext.to_vec()),
            Algorithm::DhAes => {
                let key = self.key.as_ref().ok_or(ServiceError::SessionNotInitialized)?;
                let (ciphertext, iv) = crypto::encrypt(plaintext, key.as_bytes())?;
                (iv.to_vec(), ciphertext)
            }
        };
        Ok(Secret {
            session: self.path.clone(),
            parameters,
            value,
            content_type: content_type.to_string(),
        })
    }

    /// Unwrap a secret the client sent.
    pub fn decrypt_secret(&self, secret: &Secret) -> Result<Zeroizing<Vec<u8>>, ServiceError> {
        match self.algorithm {
            Algorithm::Plain => Ok(Zeroizing::new(secret.value.clone())),
            Algorithm::DhAes => {
                let key = self.key.as_ref().ok_or(ServiceError::SessionNotInitialized)?;
                let plaintext = crypto::decrypt(&secret.value, key.as_bytes(), &secret.parameters)?;
                Ok(Zeroizing::new(plaintext))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns every open session.
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    exporter: Arc<dyn ObjectExporter>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    pub fn new(exporter: Arc<dyn ObjectExporter>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
            exporter,
        }
    }

    /// Open a session with the named algorithm.
    ///
    /// `input` is the client's DH public key, ignored for `plain`.
    pub async fn create_session(
        &self,
        algorithm: &str,
        input: &[u8],
    ) -> Result<(Arc<Session>, SessionOutput), ServiceError> {
        let algorithm = Algorithm::parse(algorithm)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (session, output) = Session::negotiate(id, algorithm, input)?;
        let session = Arc::new(session);

        self.exporter.export_session(&session).await?;
        self.write()
            .insert(session.path().to_string(), session.clone());

        info!(path = session.path(), algorithm = %algorithm, "session opened");
        Ok((session, output))
    }

    pub fn get(&self, path: &str) -> Option<Arc<Session>> {
        self.read().get(path).cloned()
    }

    /// Close a session. Closing an unknown session is an error.
    pub async fn close(&self, path: &str) -> Result<(), ServiceError> {
        let removed = self.write().remove(path);
        let session = removed.ok_or_else(|| ServiceError::NoSession(path.to_string()))?;

        self.exporter.unexport(ObjectKind::Session, session.path()).await;
        debug!(path, "session closed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;

    use super::*;
    use crate::collection::Collection;
    use crate::export::NoopExporter;
    use crate::item::Item;
    use crate::prompt::Prompt;

    /// Rejects session exports while `fail` is set.
    #[derive(Default)]
    struct FlakyExporter {
        fail: AtomicBool,
    }

    #[async_trait]
    impl ObjectExporter for FlakyExporter {
        async fn export_session(&self, _session: &Arc<Session>) -> Result<(), ServiceError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ServiceError::Export("object path in use".into()));
            }
            Ok(())
        }

        async fn export_collection(&self, _collection: &Arc<Collection>) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn export_item(&self, _item: &Arc<Item>) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn export_prompt(&self, _prompt: &Arc<Prompt>) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn unexport(&self, _kind: ObjectKind, _path: &str) {}
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(NoopExporter))
    }

    #[tokio::test]
    async fn test_plain_session_passes_secrets_through() {
        let sessions = registry();
        let (session, output) = sessions.create_session("plain", b"").await.unwrap();

        assert_eq!(output, SessionOutput::Plain);
        assert_eq!(session.path(), "/org/freedesktop/secrets/session/1");

        let secret = session.encrypt_secret(b"hunter2", "text/plain").unwrap();
        assert!(secret.parameters.is_empty());
        assert_eq!(secret.value, b"hunter2");
        assert_eq!(secret.session, session.path());
        assert_eq!(&*session.decrypt_secret(&secret).unwrap(), b"hunter2");
    }

    #[tokio::test]
    async fn test_dh_session_agrees_with_client() {
        let sessions = registry();
        let client = crypto::generate_key_pair(&[0x42]).unwrap();

        let (session, output) = sessions
            .create_session(crypto::DH_ALGORITHM, client.public_key())
            .await
            .unwrap();
        let SessionOutput::PublicKey(service_public) = output else {
            panic!("expected a public key");
        };
        assert_eq!(service_public.len(), crypto::DH_KEY_LEN);

        let shared = crypto::compute_shared_secret(&client, &service_public).unwrap();
        let client_key = crypto::derive_aes_key(&shared).unwrap();

        let secret = session.encrypt_secret(b"correct horse", "text/plain").unwrap();
        assert_eq!(secret.parameters.len(), crypto::IV_LEN);
        let plaintext =
            crypto::decrypt(&secret.value, client_key.as_bytes(), &secret.parameters).unwrap();
        assert_eq!(plaintext, b"correct horse");
    }

    #[tokio::test]
    async fn test_unsupported_algorithm_is_rejected() {
        let sessions = registry();
        let err = sessions.create_session("rot13", b"").await.unwrap_err();
        assert_eq!(err, ServiceError::UnsupportedAlgorithm("rot13".into()));
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_failed_export_leaves_no_session() {
        let exporter = Arc::new(FlakyExporter::default());
        let sessions = SessionRegistry::new(exporter.clone());

        exporter.fail.store(true, Ordering::SeqCst);
        assert!(sessions.create_session("plain", b"").await.is_err());
        assert!(sessions.is_empty());
        assert!(sessions.get(&paths::session_path(1)).is_none());

        exporter.fail.store(false, Ordering::SeqCst);
        let (session, _) = sessions.create_session("plain", b"").await.unwrap();
        assert_eq!(session.id(), 2);
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_close_unknown_session_is_an_error() {
        let sessions = registry();
        let (session, _) = sessions.create_session("plain", b"").await.unwrap();

        sessions.close(session.path()).await.unwrap();
        assert_eq!(
            sessions.close(session.path()).await,
            Err(ServiceError::NoSession(session.path().to_string()))
        );
    }

    #[test]
    fn test_dh_session_without_key_is_not_initialized() {
        let session = Session {
            id: 9,
            path: paths::session_path(9),
            algorithm: Algorithm::DhAes,
            key: None,
        };
        assert_eq!(
            session.encrypt_secret(b"x", "text/plain").unwrap_err(),
            ServiceError::SessionNotInitialized
        );
    }

    #[test]
    fn test_secret_debug_hides_value() {
        let secret = Secret {
            session: paths::session_path(1),
            parameters: Vec::new(),
            value: b"hunter2".to_vec(),
            content_type: "text/plain".into(),
        };
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }
}

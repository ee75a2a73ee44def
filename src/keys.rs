//! Key material ownership.
//!
//! Two kinds of secret live in a session:
//! 1. The Diffie-Hellman key pair produced while a session is negotiated.
//!    Its private exponent is only needed until the shared secret exists.
//! 2. The 128-bit AES key derived from the shared secret, held for the
//!    lifetime of the session.
//!
//! Both are opaque, non-cloneable, and zeroised on drop. Public halves are
//! exposed as bytes; private halves stay `pub(crate)`.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{AES_KEY_LEN, DH_KEY_LEN};
use crate::error::ServiceError;

// ---------------------------------------------------------------------------
// Diffie-Hellman key pair
// ---------------------------------------------------------------------------

/// A key pair in the fixed 1024-bit MODP group.
///
/// - `public_key` and `shared_key` are 128-byte big-endian integers, leading
///   zero bytes preserved.
/// - The private exponent is kept as big-endian bytes and wiped on drop.
/// - Not `Clone`.
pub struct DhKeyPair {
    pub(crate) public_key: Vec<u8>,
    pub(crate) private_key: Zeroizing<Vec<u8>>,
    pub(crate) shared_key: Zeroizing<Vec<u8>>,
}

impl DhKeyPair {
    /// The local public key, always `DH_KEY_LEN` bytes.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The shared secret computed against the peer key this pair was
    /// generated for, always `DH_KEY_LEN` bytes.
    pub fn shared_key(&self) -> &[u8] {
        &self.shared_key
    }

    /// Borrow the private exponent for a follow-up shared-secret computation.
    pub(crate) fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// Drop the private exponent, keeping only the shared secret.
    pub fn into_shared_key(self) -> Zeroizing<Vec<u8>> {
        self.shared_key
    }
}

impl fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// AES session key
// ---------------------------------------------------------------------------

/// A 128-bit AES key derived for one session.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AesKey {
    bytes: [u8; AES_KEY_LEN],
}

impl AesKey {
    pub fn from_bytes(bytes: [u8; AES_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Build a key from a slice, rejecting any length other than 16.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ServiceError> {
        let bytes: [u8; AES_KEY_LEN] = bytes.try_into().map_err(|_| ServiceError::InvalidKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; AES_KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

/// Left-pad a big-endian integer to the fixed wire width.
pub(crate) fn to_fixed_width(bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; DH_KEY_LEN];
    let start = DH_KEY_LEN.saturating_sub(bytes.len());
    let skip = bytes.len().saturating_sub(DH_KEY_LEN);
    out[start..].copy_from_slice(&bytes[skip..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_preserves_leading_zeros() {
        let padded = to_fixed_width(&[0x01, 0x02]);
        assert_eq!(padded.len(), DH_KEY_LEN);
        assert!(padded[..DH_KEY_LEN - 2].iter().all(|b| *b == 0));
        assert_eq!(&padded[DH_KEY_LEN - 2..], &[0x01, 0x02]);
    }

    #[test]
    fn test_aes_key_rejects_wrong_length() {
        assert!(matches!(AesKey::from_slice(&[0u8; 15]), Err(ServiceError::InvalidKey)));
        assert!(matches!(AesKey::from_slice(&[0u8; 32]), Err(ServiceError::InvalidKey)));
        assert!(AesKey::from_slice(&[7u8; 16]).is_ok());
    }

    #[test]
    fn test_aes_key_debug_is_redacted() {
        let key = AesKey::from_bytes([0xAB; AES_KEY_LEN]);
        assert_eq!(format!("{:?}", key), "AesKey(<redacted>)");
    }
}

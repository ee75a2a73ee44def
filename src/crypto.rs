//! Session cryptography.
//!
//! Implements the `dh-ietf1024-sha256-aes128-cbc-pkcs7` transport mandated
//! by the Secret Service API:
//! - **Key agreement**: Diffie-Hellman over the RFC 2409 second Oakley
//!   group (1024-bit safe prime, generator 2)
//! - **Key derivation**: HKDF-SHA256, empty salt, empty info, 16 bytes out
//! - **Cipher**: AES-128-CBC with PKCS7 padding, fresh random IV per call
//!
//! Integers travel as unsigned big-endian values fixed at 128 bytes. Leading
//! zero bytes are always written and may be omitted by the peer.
//!
//! `ring` supplies randomness and HKDF. Modular exponentiation and the CBC
//! mode come from `num-bigint` and `cbc`, since `ring` offers neither.

use std::sync::OnceLock;

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use num_bigint::BigUint;
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, Zeroizing};

use crate::error::ServiceError;
use crate::keys::{to_fixed_width, AesKey, DhKeyPair};

/// Algorithm name for unencrypted sessions.
pub const PLAIN_ALGORITHM: &str = "plain";

/// Algorithm name for DH-negotiated AES sessions.
pub const DH_ALGORITHM: &str = "dh-ietf1024-sha256-aes128-cbc-pkcs7";

/// Width of public keys and shared secrets on the wire.
pub const DH_KEY_LEN: usize = 128;

/// Size of the AES key in bytes (128 bits).
pub const AES_KEY_LEN: usize = 16;

/// Size of the CBC IV in bytes.
pub const IV_LEN: usize = 16;

const BLOCK_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

// ---------------------------------------------------------------------------
// Group parameters
// ---------------------------------------------------------------------------

/// RFC 2409 section 6.2, second Oakley group.
const PRIME: [u8; DH_KEY_LEN] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xC9, 0x0F, 0xDA, 0xA2, 0x21, 0x68, 0xC2, 0x34,
    0xC4, 0xC6, 0x62, 0x8B, 0x80, 0xDC, 0x1C, 0xD1, 0x29, 0x02, 0x4E, 0x08, 0x8A, 0x67, 0xCC, 0x74,
    0x02, 0x0B, 0xBE, 0xA6, 0x3B, 0x13, 0x9B, 0x22, 0x51, 0x4A, 0x08, 0x79, 0x8E, 0x34, 0x04, 0xDD,
    0xEF, 0x95, 0x19, 0xB3, 0xCD, 0x3A, 0x43, 0x1B, 0x30, 0x2B, 0x0A, 0x6D, 0xF2, 0x5F, 0x14, 0x37,
    0x4F, 0xE1, 0x35, 0x6D, 0x6D, 0x51, 0xC2, 0x45, 0xE4, 0x85, 0xB5, 0x76, 0x62, 0x5E, 0x7E, 0xC6,
    0xF4, 0x4C, 0x42, 0xE9, 0xA6, 0x37, 0xED, 0x6B, 0x0B, 0xFF, 0x5C, 0xB6, 0xF4, 0x06, 0xB7, 0xED,
    0xEE, 0x38, 0x6B, 0xFB, 0x5A, 0x89, 0x9F, 0xA5, 0xAE, 0x9F, 0x24, 0x11, 0x7C, 0x4B, 0x1F, 0xE6,
    0x49, 0x28, 0x66, 0x51, 0xEC, 0xE6, 0x53, 0x81, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

const GENERATOR: u32 = 2;

/// The group parameters, decoded once per process.
struct DhParameters {
    p: BigUint,
    g: BigUint,
    /// `p - 1`, the exclusive upper bound for peer keys.
    p_minus_1: BigUint,
}

fn parameters() -> &'static DhParameters {
    static PARAMS: OnceLock<DhParameters> = OnceLock::new();
    PARAMS.get_or_init(|| {
        let p = BigUint::from_bytes_be(&PRIME);
        let p_minus_1 = &p - 1u32;
        DhParameters {
            p,
            g: BigUint::from(GENERATOR),
            p_minus_1,
        }
    })
}

// ---------------------------------------------------------------------------
// Key agreement
// ---------------------------------------------------------------------------

/// Decode and range-check a peer public key.
///
/// Accepts 1..=128 bytes (shorter inputs are big-endian with leading zeros
/// omitted) and requires `1 < y < p - 1`.
fn decode_peer_key(peer_public_key: &[u8]) -> Result<BigUint, ServiceError> {
    if peer_public_key.is_empty() || peer_public_key.len() > DH_KEY_LEN {
        return Err(ServiceError::InvalidPeerKey);
    }
    let y = BigUint::from_bytes_be(peer_public_key);
    if y <= BigUint::from(1u32) || y >= parameters().p_minus_1 {
        return Err(ServiceError::InvalidPeerKey);
    }
    Ok(y)
}

/// Draw a private exponent uniformly from `[1, p - 2]`.
///
/// Rejection-samples 128 random bytes below `p - 1`; a draw of exactly zero
/// is remapped to one.
fn generate_private_exponent() -> Result<Zeroizing<Vec<u8>>, ServiceError> {
    let rng = SystemRandom::new();
    let bound = &parameters().p_minus_1;
    let mut buf = Zeroizing::new([0u8; DH_KEY_LEN]);
    loop {
        rng.fill(&mut buf[..])
            .map_err(|_| ServiceError::RandomnessFailure)?;
        let candidate = BigUint::from_bytes_be(&buf[..]);
        if &candidate >= bound {
            continue;
        }
        if candidate == BigUint::from(0u32) {
            return Ok(Zeroizing::new(to_fixed_width(&[1])));
        }
        return Ok(Zeroizing::new(to_fixed_width(&candidate.to_bytes_be())));
    }
}

fn mod_pow(base: &BigUint, exponent: &[u8]) -> Vec<u8> {
    let exponent = BigUint::from_bytes_be(exponent);
    to_fixed_width(&base.modpow(&exponent, &parameters().p).to_bytes_be())
}

/// Generate a fresh key pair and the shared secret against `peer_public_key`.
///
/// The public key is `g^x mod p` and the shared key is `peer^x mod p`, both
/// returned as 128-byte big-endian values.
pub fn generate_key_pair(peer_public_key: &[u8]) -> Result<DhKeyPair, ServiceError> {
    let peer = decode_peer_key(peer_public_key)?;
    let private_key = generate_private_exponent()?;

    let public_key = mod_pow(&parameters().g, &private_key);
    let shared_key = Zeroizing::new(mod_pow(&peer, &private_key));

    Ok(DhKeyPair {
        public_key,
        private_key,
        shared_key,
    })
}

/// Recompute the shared secret of an existing pair against a new peer key.
///
/// Used by the side that generated its pair before the remote public key
/// was known. Applies the same peer-key validation as `generate_key_pair`.
pub fn compute_shared_secret(
    pair: &DhKeyPair,
    peer_public_key: &[u8],
) -> Result<Zeroizing<Vec<u8>>, ServiceError> {
    let peer = decode_peer_key(peer_public_key)?;
    Ok(Zeroizing::new(mod_pow(&peer, pair.private_key())))
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Output length marker for `ring`'s HKDF expand step.
struct AesKeyLen;

impl hkdf::KeyType for AesKeyLen {
    fn len(&self) -> usize {
        AES_KEY_LEN
    }
}

/// Derive the session AES key from a DH shared secret.
///
/// ```text
/// HKDF-SHA256(ikm = shared_secret, salt = "", info = "") -> 16 bytes
/// ```
pub fn derive_aes_key(shared_secret: &[u8]) -> Result<AesKey, ServiceError> {
    // An empty salt is equivalent to a zero-filled salt of the hash length.
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]);
    let prk = salt.extract(shared_secret);

    let info: [&[u8]; 0] = [];
    let okm = prk
        .expand(&info, AesKeyLen)
        .map_err(|_| ServiceError::KeyDerivationFailure)?;

    let mut derived = [0u8; AES_KEY_LEN];
    okm.fill(&mut derived)
        .map_err(|_| ServiceError::KeyDerivationFailure)?;

    let key = AesKey::from_bytes(derived);
    derived.zeroize();
    Ok(key)
}

// ---------------------------------------------------------------------------
// Secret transport
// ---------------------------------------------------------------------------

/// Generate a fresh random IV.
fn generate_iv() -> Result<[u8; IV_LEN], ServiceError> {
    let rng = SystemRandom::new();
    let mut iv = [0u8; IV_LEN];
    rng.fill(&mut iv).map_err(|_| ServiceError::RandomnessFailure)?;
    Ok(iv)
}

/// Encrypt `plaintext` under a 16-byte key with AES-128-CBC.
///
/// PKCS7 padding is always applied, so block-aligned input gains a full
/// block of `0x10`. Returns `(ciphertext, iv)`.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<(Vec<u8>, [u8; IV_LEN]), ServiceError> {
    if key.len() != AES_KEY_LEN {
        return Err(ServiceError::InvalidKey);
    }
    let iv = generate_iv()?;
    let cipher = Aes128CbcEnc::new_from_slices(key, &iv).map_err(|_| ServiceError::InvalidKey)?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    Ok((ciphertext, iv))
}

/// Decrypt an AES-128-CBC ciphertext and strip its PKCS7 padding.
///
/// Shape errors (key, IV, block alignment) are reported individually. Any
/// failure after decryption is reported as `DecryptionFailure` no matter
/// which padding check tripped.
pub fn decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, ServiceError> {
    if key.len() != AES_KEY_LEN {
        return Err(ServiceError::InvalidKey);
    }
    if iv.len() != IV_LEN {
        return Err(ServiceError::InvalidIv);
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(ServiceError::InvalidCiphertext);
    }

    let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|_| ServiceError::InvalidKey)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| ServiceError::DecryptionFailure)
}

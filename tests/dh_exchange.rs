//! Two-phase Diffie-Hellman exchange between two parties.
//!
//! Party A does not know B's public key when it generates its pair, so it
//! seeds the generation with a placeholder peer key and computes the real
//! shared secret once B answers.

use vault_secret_service::crypto::{
    compute_shared_secret, decrypt, derive_aes_key, encrypt, generate_key_pair, DH_KEY_LEN,
};
use vault_secret_service::ServiceError;

#[test]
fn test_two_phase_exchange_agrees_on_key() {
    // 1. A generates its pair against a placeholder peer key.
    let party_a = generate_key_pair(&[0x42]).unwrap();
    assert_eq!(party_a.public_key().len(), DH_KEY_LEN);

    // 2. B generates its pair from A's public key.
    let party_b = generate_key_pair(party_a.public_key()).unwrap();

    // 3. A recomputes the shared secret from B's public key.
    let shared_a = compute_shared_secret(&party_a, party_b.public_key()).unwrap();
    assert_eq!(shared_a.len(), DH_KEY_LEN);
    assert_eq!(&shared_a[..], party_b.shared_key());

    // 4. Both sides derive the same AES key.
    let key_a = derive_aes_key(&shared_a).unwrap();
    let key_b = derive_aes_key(party_b.shared_key()).unwrap();
    assert_eq!(key_a.as_bytes(), key_b.as_bytes());

    // 5. A message sealed by A opens for B.
    let message = b"secret message from Party A";
    let (ciphertext, iv) = encrypt(message, key_a.as_bytes()).unwrap();
    let opened = decrypt(&ciphertext, key_b.as_bytes(), &iv).unwrap();
    assert_eq!(opened, message);
}

#[test]
fn test_placeholder_shared_key_differs_from_final() {
    let party_a = generate_key_pair(&[0x42]).unwrap();
    let party_b = generate_key_pair(party_a.public_key()).unwrap();
    let shared_a = compute_shared_secret(&party_a, party_b.public_key()).unwrap();

    // The secret computed against the placeholder is useless to B.
    assert_ne!(party_a.shared_key(), &shared_a[..]);
}

#[test]
fn test_degenerate_peer_keys_are_rejected() {
    let party_a = generate_key_pair(&[0x42]).unwrap();

    for peer in [vec![], vec![0x00], vec![0x01], vec![0x00; DH_KEY_LEN], vec![0xFF; DH_KEY_LEN]] {
        assert_eq!(
            compute_shared_secret(&party_a, &peer).unwrap_err(),
            ServiceError::InvalidPeerKey
        );
    }
    assert_eq!(
        generate_key_pair(&[0x02; DH_KEY_LEN + 1]).unwrap_err(),
        ServiceError::InvalidPeerKey
    );
}

#[test]
fn test_wrong_key_cannot_open_message() {
    let party_a = generate_key_pair(&[0x42]).unwrap();
    let party_b = generate_key_pair(party_a.public_key()).unwrap();
    let outsider = generate_key_pair(party_a.public_key()).unwrap();

    let key_b = derive_aes_key(party_b.shared_key()).unwrap();
    let key_outsider = derive_aes_key(outsider.shared_key()).unwrap();
    assert_ne!(key_b.as_bytes(), key_outsider.as_bytes());

    let (ciphertext, iv) = encrypt(b"for B only", key_b.as_bytes()).unwrap();
    match decrypt(&ciphertext, key_outsider.as_bytes(), &iv) {
        // Garbage that happens to carry valid padding is still not the message.
        Ok(plaintext) => assert_ne!(plaintext, b"for B only"),
        Err(err) => assert_eq!(err, ServiceError::DecryptionFailure),
    }
}

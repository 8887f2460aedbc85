//! Symmetric encryption and answer hashing using AES-256-GCM and SHA-256.
//!
//! All secrets at rest are encrypted under the installation's [`MasterKey`].
//! Ciphertexts are self-describing: a random 96-bit nonce is prepended and
//! the whole blob is base64-armored so it can travel through a string-valued
//! secret store.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use data_encoding::BASE64;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

/// Nonce size for AES-GCM (96 bits = 12 bytes)
const NONCE_SIZE: usize = 12;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Master key length in alphanumeric characters.
pub const MASTER_KEY_LEN: usize = 32;

/// Salt length in alphanumeric characters.
pub const SALT_LEN: usize = 16;

/// The per-installation symmetric key protecting everything at rest.
///
/// Generated once from a CSPRNG, never derived from user input, and never
/// sent off-device. The wrapper zeroizes on drop so locking the vault (or
/// process exit) securely erases the material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: String,
}

impl MasterKey {
    /// Generate a fresh random key (32 alphanumeric characters).
    ///
    /// `rand::rng()` is OS-seeded; if no OS entropy source is available it
    /// panics rather than degrading to a weak generator.
    pub fn generate() -> Self {
        Self {
            key: random_alphanumeric(MASTER_KEY_LEN),
        }
    }

    /// Wrap key material loaded back from the secret store.
    pub fn from_string(key: String) -> Self {
        Self { key }
    }

    /// The key as a string for the secret-store handoff.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The 256-bit AES key: SHA-256 of the key string, so the cipher
    /// always receives exactly 32 bytes.
    fn cipher_key(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the actual key material
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Generate a fresh salt for answer hashing (16 alphanumeric characters).
pub fn generate_salt() -> String {
    random_alphanumeric(SALT_LEN)
}

/// Generate a unique id for a stored entry.
pub fn generate_entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Encrypt plaintext under the master key.
///
/// Format: `base64([12-byte nonce][ciphertext with 16-byte auth tag])`
pub fn encrypt(plaintext: &str, key: &MasterKey) -> Result<String> {
    let cipher =
        Aes256Gcm::new_from_slice(&key.cipher_key()).map_err(|_| VaultError::Decryption)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| VaultError::Decryption)?;

    // Prepend nonce to ciphertext
    let mut output = nonce_bytes.to_vec();
    output.extend(ciphertext);
    Ok(BASE64.encode(&output))
}

/// Decrypt a ciphertext produced by [`encrypt`].
///
/// Any failure (bad armor, truncated blob, auth-tag mismatch, non-UTF-8
/// plaintext) surfaces as [`VaultError::Decryption`]; garbage bytes are
/// never returned as if valid.
pub fn decrypt(armored: &str, key: &MasterKey) -> Result<String> {
    let encrypted = BASE64
        .decode(armored.as_bytes())
        .map_err(|_| VaultError::Decryption)?;

    if encrypted.len() < NONCE_SIZE {
        return Err(VaultError::Decryption);
    }

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher =
        Aes256Gcm::new_from_slice(&key.cipher_key()).map_err(|_| VaultError::Decryption)?;

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| VaultError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| VaultError::Decryption)
}

/// Normalize a security answer: lowercase, trim, collapse internal
/// whitespace runs to a single space.
///
/// Applied identically at hash-time and verify-time. Unicode forms are
/// deliberately left alone: "café" and "café" in different normal forms
/// hash differently.
pub fn normalize_answer(answer: &str) -> String {
    answer
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hash a security answer with its salt: `hex(SHA-256(salt || normalized))`.
pub fn hash_answer(answer: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(normalize_answer(answer).as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an answer against a stored digest in constant time.
pub fn verify_answer(answer: &str, stored_hash: &str, salt: &str) -> bool {
    let computed = hash_answer(answer, salt);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_shape() {
        let key = MasterKey::generate();
        assert_eq!(key.as_str().len(), MASTER_KEY_LEN);
        assert!(key.as_str().bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_master_key_debug_redacted() {
        let key = MasterKey::generate();
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains(key.as_str()));
    }

    #[test]
    fn test_salt_shape_and_independence() {
        let a = generate_salt();
        let b = generate_salt();
        assert_eq!(a.len(), SALT_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_entry_ids_unique() {
        let mut ids = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(ids.insert(generate_entry_id()));
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = MasterKey::generate();
        let plaintext = "sk_live_abc123";
        let ciphertext = encrypt(plaintext, &key).unwrap();
        assert_ne!(ciphertext, plaintext);
        assert_eq!(decrypt(&ciphertext, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_encrypt_is_randomized() {
        let key = MasterKey::generate();
        let a = encrypt("same input", &key).unwrap();
        let b = encrypt("same input", &key).unwrap();
        assert_ne!(a, b, "fresh nonce per call");
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let key1 = MasterKey::generate();
        let key2 = MasterKey::generate();
        let ciphertext = encrypt("secret", &key1).unwrap();
        assert!(matches!(
            decrypt(&ciphertext, &key2),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn test_decrypt_garbage_fails() {
        let key = MasterKey::generate();
        assert!(decrypt("not base64 at all!!!", &key).is_err());
        assert!(decrypt("AAAA", &key).is_err());
        assert!(decrypt("", &key).is_err());
    }

    #[test]
    fn test_decrypt_tampered_fails() {
        let key = MasterKey::generate();
        let ciphertext = encrypt("secret", &key).unwrap();
        let mut bytes = BASE64.decode(ciphertext.as_bytes()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(&bytes);
        assert!(matches!(
            decrypt(&tampered, &key),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("  Rex  "), "rex");
        assert_eq!(normalize_answer("Fluffy   The \t Cat"), "fluffy the cat");
        assert_eq!(normalize_answer(""), "");
    }

    #[test]
    fn test_verify_answer_accepts_equivalent_forms() {
        let salt = generate_salt();
        let digest = hash_answer("Rex ", &salt);
        assert!(verify_answer("rex", &digest, &salt));
        assert!(verify_answer("  rex  ", &digest, &salt));
        assert!(verify_answer("REX", &digest, &salt));
    }

    #[test]
    fn test_verify_answer_rejects_wrong_answer() {
        let salt = generate_salt();
        let digest = hash_answer("rex", &salt);
        assert!(!verify_answer("buddy", &digest, &salt));
        assert!(!verify_answer("", &digest, &salt));
    }

    #[test]
    fn test_hash_answer_depends_on_salt() {
        let a = hash_answer("rex", "saltsaltsaltsalt");
        let b = hash_answer("rex", "pepperpepperpepp");
        assert_ne!(a, b);
    }
}

//! Symmetric encryption for data at rest using ChaCha20-Poly1305 AEAD
//!
//! Used to seal the identity blob and by the sealed data protector. Peer
//! wire encryption is handled by the session layer, not here.

use crate::error::ClipSyncError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305 (32 bytes)
pub const KEY_SIZE: usize = 32;

/// Cipher keyed by a secret held in secure storage.
///
/// # Wire Format
///
/// Encrypted data format: `[nonce (12 bytes)] + [ciphertext + auth_tag (16 bytes)]`
///
/// # Example
///
/// ```
/// use clipsync_core::crypto::SecretCipher;
///
/// let key = SecretCipher::generate_key();
/// let cipher = SecretCipher::new(&key);
///
/// let sealed = cipher.encrypt(b"identity").unwrap();
/// assert_eq!(cipher.decrypt(&sealed).unwrap(), b"identity");
/// ```
pub struct SecretCipher {
    cipher: ChaCha20Poly1305,
}

impl SecretCipher {
    /// Create a cipher from a 32-byte key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.into()),
        }
    }

    /// Generate a new random 32-byte key.
    pub fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut key);
        key
    }

    /// Encode a key for storage in a string-valued secret store.
    pub fn key_to_string(key: &[u8; KEY_SIZE]) -> String {
        STANDARD.encode(key)
    }

    /// Decode a key produced by [`SecretCipher::key_to_string`].
    pub fn key_from_string(encoded: &str) -> Result<[u8; KEY_SIZE], ClipSyncError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| ClipSyncError::Crypto(format!("Invalid key encoding: {}", e)))?;
        bytes.try_into().map_err(|b: Vec<u8>| {
            ClipSyncError::Crypto(format!("Invalid key length: {} bytes", b.len()))
        })
    }

    /// Encrypt with a fresh random nonce, prepended to the output.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, ClipSyncError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| ClipSyncError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut result = nonce_bytes.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt data produced by [`SecretCipher::encrypt`].
    ///
    /// Fails on a wrong key, tampered data, or input too short to hold a nonce.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, ClipSyncError> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(ClipSyncError::Crypto(
                "Data too short to contain nonce".to_string(),
            ));
        }

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        let encrypted = &ciphertext[NONCE_SIZE..];

        self.cipher
            .decrypt(nonce, encrypted)
            .map_err(|e| ClipSyncError::Crypto(format!("Decryption failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = SecretCipher::generate_key();
        let cipher = SecretCipher::new(&key);

        let sealed = cipher.encrypt(b"secret material").unwrap();
        assert_ne!(&sealed[NONCE_SIZE..], b"secret material");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"secret material");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SecretCipher::new(&SecretCipher::generate_key())
            .encrypt(b"data")
            .unwrap();
        let other = SecretCipher::new(&SecretCipher::generate_key());
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_tampered_data_fails() {
        let cipher = SecretCipher::new(&SecretCipher::generate_key());
        let mut sealed = cipher.encrypt(b"data").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(cipher.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_short_input_fails() {
        let cipher = SecretCipher::new(&SecretCipher::generate_key());
        assert!(cipher.decrypt(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_key_string_roundtrip() {
        let key = SecretCipher::generate_key();
        let encoded = SecretCipher::key_to_string(&key);
        assert_eq!(SecretCipher::key_from_string(&encoded).unwrap(), key);
        assert!(SecretCipher::key_from_string("AAAA").is_err());
        assert!(SecretCipher::key_from_string("not base64!").is_err());
    }
}

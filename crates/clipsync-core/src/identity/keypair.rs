//! Identity key pair and its persisted binary layout
//!
//! The key pair is Ed25519. Serialized material is length-prefixed:
//!
//! ```text
//! [key_pair_len: u32 BE][key_pair: key_pair_len bytes][registration_id: u32 BE]
//! ```
//!
//! where `key_pair` is `[public_key: 32][secret_seed: 32]`.

use crate::error::ClipSyncError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::Rng;

/// Serialized key pair size: public key followed by secret seed.
pub const KEY_PAIR_BYTES: usize = 64;

/// Upper bound for registration ids, matching the session protocol's range.
pub const MAX_REGISTRATION_ID: u32 = 16380;

/// Durable asymmetric key establishing this device's identity to peers.
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing: SigningKey,
}

impl IdentityKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Result<Self, ClipSyncError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)
            .map_err(|e| ClipSyncError::Crypto(format!("Failed to get random bytes: {}", e)))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// The public half, safe to hand to peers.
    pub fn public_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Hex fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        hex::encode(self.public_key().as_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.public_key().verify(message, signature).is_ok()
    }

    /// Serialize as `[public_key: 32][secret_seed: 32]`.
    pub fn to_bytes(&self) -> [u8; KEY_PAIR_BYTES] {
        let mut bytes = [0u8; KEY_PAIR_BYTES];
        bytes[..32].copy_from_slice(self.public_key().as_bytes());
        bytes[32..].copy_from_slice(self.signing.as_bytes());
        bytes
    }

    /// Deserialize, rejecting a public half that does not match the secret.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ClipSyncError> {
        if bytes.len() != KEY_PAIR_BYTES {
            return Err(ClipSyncError::Identity(format!(
                "Key pair must be {} bytes, got {}",
                KEY_PAIR_BYTES,
                bytes.len()
            )));
        }
        let seed: [u8; 32] = bytes[32..]
            .try_into()
            .map_err(|_| ClipSyncError::Identity("Invalid secret seed".to_string()))?;
        let signing = SigningKey::from_bytes(&seed);
        if signing.verifying_key().as_bytes() != &bytes[..32] {
            return Err(ClipSyncError::Identity(
                "Public key does not match secret key".to_string(),
            ));
        }
        Ok(Self { signing })
    }
}

impl PartialEq for IdentityKeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for IdentityKeyPair {}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Generate a registration id in `1..=MAX_REGISTRATION_ID`.
pub fn generate_registration_id() -> u32 {
    rand::rng().random_range(1..=MAX_REGISTRATION_ID)
}

/// The identity key pair together with this installation's registration id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMaterial {
    pub identity_key_pair: IdentityKeyPair,
    pub registration_id: u32,
}

impl IdentityMaterial {
    /// Fresh key pair and registration id.
    pub fn generate() -> Result<Self, ClipSyncError> {
        Ok(Self {
            identity_key_pair: IdentityKeyPair::generate()?,
            registration_id: generate_registration_id(),
        })
    }

    /// Encode with the length-prefixed big-endian layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let key_pair = self.identity_key_pair.to_bytes();
        let mut bytes = Vec::with_capacity(4 + key_pair.len() + 4);
        bytes.extend_from_slice(&(key_pair.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&key_pair);
        bytes.extend_from_slice(&self.registration_id.to_be_bytes());
        bytes
    }

    /// Decode bytes produced by [`IdentityMaterial::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ClipSyncError> {
        let (len, rest) = read_u32(bytes)?;
        let len = len as usize;
        if rest.len() < len {
            return Err(ClipSyncError::Identity(format!(
                "Key pair truncated: expected {} bytes, {} available",
                len,
                rest.len()
            )));
        }
        let (key_pair, rest) = rest.split_at(len);
        let identity_key_pair = IdentityKeyPair::from_bytes(key_pair)?;
        let (registration_id, rest) = read_u32(rest)?;
        if !rest.is_empty() {
            return Err(ClipSyncError::Identity(format!(
                "{} trailing bytes after registration id",
                rest.len()
            )));
        }
        Ok(Self {
            identity_key_pair,
            registration_id,
        })
    }
}

fn read_u32(bytes: &[u8]) -> Result<(u32, &[u8]), ClipSyncError> {
    if bytes.len() < 4 {
        return Err(ClipSyncError::Identity("Unexpected end of identity data".to_string()));
    }
    let (head, rest) = bytes.split_at(4);
    let mut buf = [0u8; 4];
    buf.copy_from_slice(head);
    Ok((u32::from_be_bytes(buf), rest))
}

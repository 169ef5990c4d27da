//! Identity module for ClipSync
//!
//! Loads or creates the device's durable identity key pair and registration
//! id, the cryptographic root of trust between paired devices.
//!
//! ## Overview
//!
//! Material is persisted once per installation in a single blob file and
//! reused across restarts. How the blob is protected depends on the
//! platform backend, chosen once at startup:
//!
//! - **Keychain** (macOS): blob encrypted with a key kept in the keychain
//! - **Data protection** (Windows): blob sealed by the data-protection API
//! - **File permission** (Linux and others): plaintext blob, mode `0600`
//!
//! ## Trust reset
//!
//! A blob that exists but cannot be opened (missing key, corrupted bytes,
//! unknown layout) is deleted and replaced with fresh material. That is a
//! permanent identity change: every paired device has to pair again. It is
//! logged at warning level and is not reported as an error.
//!
//! ## Example
//!
//! ```rust
//! use clipsync_core::identity::FilePermissionIdentityStore;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = FilePermissionIdentityStore::new(dir.path().join("signal.data"));
//!
//! let first = store.load_or_create().unwrap();
//! let again = store.load_or_create().unwrap();
//! assert_eq!(first, again);
//! ```

mod backends;
mod keypair;
#[cfg(any(target_os = "macos", target_os = "windows"))]
mod os_secrets;
mod secret;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ClipSyncResult;

pub use backends::{DataProtectionIdentityStore, FilePermissionIdentityStore, KeychainIdentityStore};
pub use keypair::{
    generate_registration_id, IdentityKeyPair, IdentityMaterial, KEY_PAIR_BYTES,
    MAX_REGISTRATION_ID,
};
#[cfg(any(target_os = "macos", target_os = "windows"))]
pub use os_secrets::OsSecretStore;
pub use secret::{
    DataProtector, MemorySecretStore, SealedDataProtector, SecretStore, DATA_PROTECTION_SERVICE,
};

/// Blob location relative to the data directory.
pub const IDENTITY_BLOB_PATH: &str = "encrypt/signal.data";

/// Which identity backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityBackendKind {
    /// Pick by target platform
    #[default]
    Auto,
    Keychain,
    DataProtection,
    FilePermission,
}

impl IdentityBackendKind {
    /// Resolve `Auto` for the platform this binary was built for.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(target_os = "macos") => Self::Keychain,
            Self::Auto if cfg!(target_os = "windows") => Self::DataProtection,
            Self::Auto => Self::FilePermission,
            other => other,
        }
    }
}

/// Per-installation keychain service name.
pub fn keychain_service(instance_id: &str) -> String {
    format!("clipsync-{instance_id}")
}

/// Loads the persisted identity or creates and persists a new one.
pub trait IdentityKeyStore {
    fn load_or_create(&self) -> ClipSyncResult<IdentityMaterial>;
}

/// The identity backend selected for this process.
pub enum IdentityBackend {
    Keychain(KeychainIdentityStore),
    DataProtection(DataProtectionIdentityStore),
    FilePermission(FilePermissionIdentityStore),
}

impl IdentityBackend {
    /// Select a backend once at startup.
    ///
    /// `secrets` is the keychain-style facility; the data-protection backend
    /// keeps its device key there as well.
    pub fn select(
        kind: IdentityBackendKind,
        data_dir: &Path,
        secrets: Arc<dyn SecretStore>,
        instance_id: &str,
        account: &str,
    ) -> Self {
        let blob_path: PathBuf = data_dir.join(IDENTITY_BLOB_PATH);
        match kind.resolve() {
            IdentityBackendKind::Keychain | IdentityBackendKind::Auto => {
                Self::Keychain(KeychainIdentityStore::new(
                    blob_path,
                    secrets,
                    keychain_service(instance_id),
                    account,
                ))
            }
            IdentityBackendKind::DataProtection => {
                let protector = Arc::new(SealedDataProtector::new(secrets, account));
                Self::DataProtection(DataProtectionIdentityStore::new(blob_path, protector))
            }
            IdentityBackendKind::FilePermission => {
                Self::FilePermission(FilePermissionIdentityStore::new(blob_path))
            }
        }
    }

    pub fn kind(&self) -> IdentityBackendKind {
        match self {
            Self::Keychain(_) => IdentityBackendKind::Keychain,
            Self::DataProtection(_) => IdentityBackendKind::DataProtection,
            Self::FilePermission(_) => IdentityBackendKind::FilePermission,
        }
    }

    pub fn blob_path(&self) -> &Path {
        match self {
            Self::Keychain(store) => store.blob_path(),
            Self::DataProtection(store) => store.blob_path(),
            Self::FilePermission(store) => store.blob_path(),
        }
    }
}

impl IdentityKeyStore for IdentityBackend {
    fn load_or_create(&self) -> ClipSyncResult<IdentityMaterial> {
        match self {
            Self::Keychain(store) => store.load_or_create(),
            Self::DataProtection(store) => store.load_or_create(),
            Self::FilePermission(store) => store.load_or_create(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_auto_resolves_to_concrete_backend() {
        assert_ne!(IdentityBackendKind::Auto.resolve(), IdentityBackendKind::Auto);
        assert_eq!(
            IdentityBackendKind::FilePermission.resolve(),
            IdentityBackendKind::FilePermission
        );
    }

    #[test]
    fn test_select_places_blob_under_data_dir() {
        let dir = TempDir::new().unwrap();
        for kind in [
            IdentityBackendKind::Keychain,
            IdentityBackendKind::DataProtection,
            IdentityBackendKind::FilePermission,
        ] {
            let backend = IdentityBackend::select(
                kind,
                dir.path(),
                Arc::new(MemorySecretStore::new()),
                "instance",
                "tester",
            );
            assert_eq!(backend.kind(), kind);
            assert_eq!(backend.blob_path(), dir.path().join(IDENTITY_BLOB_PATH));
        }
    }

    #[test]
    fn test_every_backend_returns_same_material_type() {
        for kind in [
            IdentityBackendKind::Keychain,
            IdentityBackendKind::DataProtection,
            IdentityBackendKind::FilePermission,
        ] {
            let dir = TempDir::new().unwrap();
            let backend = IdentityBackend::select(
                kind,
                dir.path(),
                Arc::new(MemorySecretStore::new()),
                "instance",
                "tester",
            );
            let material: IdentityMaterial = backend.load_or_create().unwrap();
            assert!((1..=MAX_REGISTRATION_ID).contains(&material.registration_id));
            assert_eq!(backend.load_or_create().unwrap(), material);
        }
    }
}

//! Identity key persistence backends
//!
//! All backends share one load-or-create skeleton and differ only in how the
//! blob is opened and sealed:
//!
//! | Backend           | Blob protection                               |
//! |-------------------|-----------------------------------------------|
//! | Keychain          | ChaCha20-Poly1305, key held in a [`SecretStore`] |
//! | Data protection   | Platform [`DataProtector`]                    |
//! | File permission   | None; file restricted to owner read/write     |

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::keypair::IdentityMaterial;
use super::secret::{store_secret, DataProtector, SecretStore};
use crate::crypto::SecretCipher;
use crate::error::{ClipSyncError, ClipSyncResult};

/// How a backend turns the stored blob into plaintext material and back.
pub(crate) trait BlobProtection {
    fn name(&self) -> &'static str;

    fn open(&self, blob: &[u8]) -> ClipSyncResult<Vec<u8>>;

    fn seal(&self, material: &[u8]) -> ClipSyncResult<Vec<u8>>;

    /// Whether the written file must be restricted to its owner.
    fn owner_only(&self) -> bool {
        false
    }
}

/// Reuse the persisted identity if it opens, otherwise mint and persist a
/// new one.
///
/// A blob that exists but cannot be opened is deleted. The previous identity
/// is gone for good and every paired peer has to pair again.
pub(crate) fn load_or_create_blob(
    path: &Path,
    protection: &impl BlobProtection,
) -> ClipSyncResult<IdentityMaterial> {
    let backend = protection.name();
    if path.exists() {
        info!(backend, path = %path.display(), "Found identity key file");
        let opened = fs::read(path)
            .map_err(ClipSyncError::from)
            .and_then(|blob| protection.open(&blob))
            .and_then(|plain| IdentityMaterial::from_bytes(&plain));
        match opened {
            Ok(material) => return Ok(material),
            Err(e) => {
                warn!(
                    backend,
                    error = %e,
                    "Identity key file could not be opened, resetting device identity; paired devices must re-pair"
                );
                match fs::remove_file(path) {
                    Ok(()) => info!(backend, "Deleted stale identity key file"),
                    Err(e) => warn!(backend, error = %e, "Failed to delete stale identity key file"),
                }
            }
        }
    } else {
        info!(backend, path = %path.display(), "No identity key file found");
    }

    info!(backend, "Creating new identity key");
    let material = IdentityMaterial::generate()?;
    let blob = protection.seal(&material.to_bytes())?;
    write_blob(path, &blob, protection.owner_only())?;
    Ok(material)
}

/// Write via a temporary sibling and rename, so a crash never leaves a
/// half-written blob behind.
fn write_blob(path: &Path, bytes: &[u8], owner_only: bool) -> ClipSyncResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");

    {
        let mut file = blob_open_options(owner_only).open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if owner_only {
        restrict_to_owner(&tmp_path)?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn blob_open_options(owner_only: bool) -> OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if owner_only {
        options.mode(0o600);
    }
    options
}

#[cfg(not(unix))]
fn blob_open_options(_owner_only: bool) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    options
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> ClipSyncResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(path: &Path) -> ClipSyncResult<()> {
    debug!(path = %path.display(), "Owner-only permissions are not supported on this platform");
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Keychain
// ═══════════════════════════════════════════════════════════════════════

/// Blob sealed with a symmetric key stored in a keychain-style store under a
/// per-installation service name.
pub struct KeychainIdentityStore {
    blob_path: PathBuf,
    secrets: Arc<dyn SecretStore>,
    service: String,
    account: String,
}

impl KeychainIdentityStore {
    pub fn new(
        blob_path: impl Into<PathBuf>,
        secrets: Arc<dyn SecretStore>,
        service: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            blob_path: blob_path.into(),
            secrets,
            service: service.into(),
            account: account.into(),
        }
    }

    pub fn blob_path(&self) -> &Path {
        &self.blob_path
    }

    pub fn load_or_create(&self) -> ClipSyncResult<IdentityMaterial> {
        load_or_create_blob(&self.blob_path, self)
    }

    fn create_key(&self) -> ClipSyncResult<[u8; 32]> {
        info!(service = %self.service, account = %self.account, "Generating new keychain secret");
        let key = SecretCipher::generate_key();
        store_secret(
            self.secrets.as_ref(),
            &self.service,
            &self.account,
            &SecretCipher::key_to_string(&key),
        )?;
        Ok(key)
    }
}

impl BlobProtection for KeychainIdentityStore {
    fn name(&self) -> &'static str {
        "keychain"
    }

    fn open(&self, blob: &[u8]) -> ClipSyncResult<Vec<u8>> {
        let encoded = self
            .secrets
            .get_secret(&self.service, &self.account)?
            .ok_or_else(|| {
                ClipSyncError::SecretStore(format!(
                    "No keychain entry for {}/{}",
                    self.service, self.account
                ))
            })?;
        debug!(service = %self.service, "Found keychain secret");
        let key = SecretCipher::key_from_string(&encoded)?;
        SecretCipher::new(&key).decrypt(blob)
    }

    fn seal(&self, material: &[u8]) -> ClipSyncResult<Vec<u8>> {
        let key = match self.secrets.get_secret(&self.service, &self.account) {
            Ok(Some(encoded)) => match SecretCipher::key_from_string(&encoded) {
                Ok(key) => {
                    debug!(service = %self.service, "Reusing keychain secret");
                    key
                }
                Err(e) => {
                    warn!(error = %e, "Keychain secret malformed, replacing it");
                    self.create_key()?
                }
            },
            Ok(None) => self.create_key()?,
            Err(e) => {
                warn!(error = %e, "Keychain unavailable, generating new secret");
                self.create_key()?
            }
        };
        SecretCipher::new(&key).encrypt(material)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Data protection
// ═══════════════════════════════════════════════════════════════════════

/// Blob sealed by a platform data-protection call; no key is managed here.
pub struct DataProtectionIdentityStore {
    blob_path: PathBuf,
    protector: Arc<dyn DataProtector>,
}

impl DataProtectionIdentityStore {
    pub fn new(blob_path: impl Into<PathBuf>, protector: Arc<dyn DataProtector>) -> Self {
        Self {
            blob_path: blob_path.into(),
            protector,
        }
    }

    pub fn blob_path(&self) -> &Path {
        &self.blob_path
    }

    pub fn load_or_create(&self) -> ClipSyncResult<IdentityMaterial> {
        load_or_create_blob(&self.blob_path, self)
    }
}

impl BlobProtection for DataProtectionIdentityStore {
    fn name(&self) -> &'static str {
        "data_protection"
    }

    fn open(&self, blob: &[u8]) -> ClipSyncResult<Vec<u8>> {
        self.protector.unprotect(blob)
    }

    fn seal(&self, material: &[u8]) -> ClipSyncResult<Vec<u8>> {
        self.protector.protect(material)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// File permission
// ═══════════════════════════════════════════════════════════════════════

/// Plaintext blob protected only by owner read/write permissions.
pub struct FilePermissionIdentityStore {
    blob_path: PathBuf,
}

impl FilePermissionIdentityStore {
    pub fn new(blob_path: impl Into<PathBuf>) -> Self {
        Self {
            blob_path: blob_path.into(),
        }
    }

    pub fn blob_path(&self) -> &Path {
        &self.blob_path
    }

    pub fn load_or_create(&self) -> ClipSyncResult<IdentityMaterial> {
        load_or_create_blob(&self.blob_path, self)
    }
}

impl BlobProtection for FilePermissionIdentityStore {
    fn name(&self) -> &'static str {
        "file_permission"
    }

    fn open(&self, blob: &[u8]) -> ClipSyncResult<Vec<u8>> {
        Ok(blob.to_vec())
    }

    fn seal(&self, material: &[u8]) -> ClipSyncResult<Vec<u8>> {
        Ok(material.to_vec())
    }

    fn owner_only(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{MemorySecretStore, SealedDataProtector};
    use tempfile::TempDir;

    fn keychain_store(dir: &TempDir, secrets: Arc<dyn SecretStore>) -> KeychainIdentityStore {
        KeychainIdentityStore::new(
            dir.path().join("encrypt").join("signal.data"),
            secrets,
            "clipsync-test-instance",
            "tester",
        )
    }

    #[test]
    fn test_keychain_reuses_material() {
        let dir = TempDir::new().unwrap();
        let secrets: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let store = keychain_store(&dir, secrets.clone());

        let first = store.load_or_create().unwrap();
        let second = store.load_or_create().unwrap();
        assert_eq!(first, second);
        assert!(secrets
            .get_secret("clipsync-test-instance", "tester")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_keychain_blob_is_not_plaintext() {
        let dir = TempDir::new().unwrap();
        let store = keychain_store(&dir, Arc::new(MemorySecretStore::new()));
        let material = store.load_or_create().unwrap();

        let blob = fs::read(store.blob_path()).unwrap();
        assert!(IdentityMaterial::from_bytes(&blob).is_err());
        assert_ne!(blob, material.to_bytes());
    }

    #[test]
    fn test_keychain_missing_secret_resets_identity() {
        let dir = TempDir::new().unwrap();
        let secrets: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let store = keychain_store(&dir, secrets.clone());
        let original = store.load_or_create().unwrap();

        secrets
            .delete_secret("clipsync-test-instance", "tester")
            .unwrap();
        let regenerated = store.load_or_create().unwrap();
        assert_ne!(original, regenerated);
        assert_eq!(store.load_or_create().unwrap(), regenerated);
    }

    #[test]
    fn test_keychain_keeps_existing_secret_on_regeneration() {
        let dir = TempDir::new().unwrap();
        let secrets: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let store = keychain_store(&dir, secrets.clone());
        store.load_or_create().unwrap();
        let secret = secrets
            .get_secret("clipsync-test-instance", "tester")
            .unwrap();

        fs::write(store.blob_path(), b"corrupted").unwrap();
        store.load_or_create().unwrap();

        assert_eq!(
            secrets
                .get_secret("clipsync-test-instance", "tester")
                .unwrap(),
            secret
        );
    }

    #[test]
    fn test_data_protection_roundtrip_and_corruption() {
        let dir = TempDir::new().unwrap();
        let protector = Arc::new(SealedDataProtector::new(
            Arc::new(MemorySecretStore::new()),
            "tester",
        ));
        let store = DataProtectionIdentityStore::new(dir.path().join("signal.data"), protector);

        let first = store.load_or_create().unwrap();
        assert_eq!(store.load_or_create().unwrap(), first);

        fs::write(store.blob_path(), b"\x00\x01garbage").unwrap();
        let regenerated = store.load_or_create().unwrap();
        assert_ne!(regenerated, first);
        assert_eq!(store.load_or_create().unwrap(), regenerated);
    }

    #[test]
    fn test_file_permission_backend_writes_plain_layout() {
        let dir = TempDir::new().unwrap();
        let store = FilePermissionIdentityStore::new(dir.path().join("signal.data"));

        let material = store.load_or_create().unwrap();
        let blob = fs::read(store.blob_path()).unwrap();
        assert_eq!(blob, material.to_bytes());
        assert_eq!(store.load_or_create().unwrap(), material);
        assert!(!store.blob_path().with_extension("tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permission_backend_restricts_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FilePermissionIdentityStore::new(dir.path().join("signal.data"));
        store.load_or_create().unwrap();

        let mode = fs::metadata(store.blob_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

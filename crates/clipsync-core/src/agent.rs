//! ClipSyncAgent - main entry point for the sync core
//!
//! Wires storage, identity, host probing and the task pipeline together.
//! Every collaborator is passed in or built here; nothing is global.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use tracing::info;

use crate::config::AgentConfig;
use crate::error::ClipSyncResult;
#[cfg(any(target_os = "macos", target_os = "windows"))]
use crate::identity::OsSecretStore;
use crate::identity::{
    IdentityBackend, IdentityBackendKind, IdentityKeyStore, IdentityMaterial, SecretStore,
};
use crate::net::{HostProber, HttpPeerTransport, HttpProbeClient, PeerTransport, ProbeClient};
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
use crate::storage::StorageSecretStore;
use crate::storage::Storage;
use crate::task::handlers::{standard_registry, PeerLink};
use crate::task::{ExecutionPools, RetryPolicy, TaskExecutor};
use crate::types::{ClipRecord, HostCandidate, PeerRecord, Task, TaskExtraInfo, TaskId, TaskType};

/// Database file name inside the data directory.
pub const DATABASE_FILE: &str = "clipsync.redb";

/// Directory for pulled files, relative to the data directory.
pub const FILES_DIR: &str = "files";

/// Secure-storage account the identity secrets are filed under.
pub const IDENTITY_ACCOUNT: &str = "identity";

const PEER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Keychain-style storage for identity secrets.
///
/// The OS credential manager where there is one. Elsewhere secrets go to the
/// database, which only the owner can read; that is no stronger than the
/// file-permission backend, which `Auto` picks on those platforms anyway.
#[cfg(any(target_os = "macos", target_os = "windows"))]
fn platform_secret_store(_storage: &Storage) -> Arc<dyn SecretStore> {
    Arc::new(OsSecretStore::new())
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_secret_store(storage: &Storage) -> Arc<dyn SecretStore> {
    Arc::new(StorageSecretStore::new(storage.clone()))
}

pub struct ClipSyncAgent {
    data_dir: PathBuf,
    config: AgentConfig,
    storage: Storage,
    identity: IdentityMaterial,
    identity_backend: IdentityBackendKind,
    prober: HostProber,
    executor: Arc<TaskExecutor>,
    retry: RetryPolicy,
}

impl ClipSyncAgent {
    /// Open the agent over `data_dir` with HTTP probing.
    ///
    /// With no `transport`, peers are reached over HTTP and requests carry
    /// this device's identity fingerprint.
    pub async fn open(
        data_dir: impl AsRef<Path>,
        config: AgentConfig,
        transport: Option<Arc<dyn PeerTransport>>,
    ) -> ClipSyncResult<Self> {
        let probe = Arc::new(HttpProbeClient::new()?);
        Self::open_with_probe(data_dir, config, probe, transport).await
    }

    /// Open the agent with an explicit probe client.
    pub async fn open_with_probe(
        data_dir: impl AsRef<Path>,
        config: AgentConfig,
        probe: Arc<dyn ProbeClient>,
        transport: Option<Arc<dyn PeerTransport>>,
    ) -> ClipSyncResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        config.validate()?;
        info!(?data_dir, "Opening ClipSync agent");

        std::fs::create_dir_all(&data_dir)?;
        let storage = Storage::new(data_dir.join(DATABASE_FILE))?;

        let secrets = platform_secret_store(&storage);
        let backend = IdentityBackend::select(
            config.identity_backend,
            &data_dir,
            secrets,
            &config.instance_id,
            IDENTITY_ACCOUNT,
        );
        let identity = backend.load_or_create()?;
        info!(
            backend = ?backend.kind(),
            fingerprint = %identity.identity_key_pair.fingerprint(),
            "Identity ready"
        );

        let transport: Arc<dyn PeerTransport> = match transport {
            Some(transport) => transport,
            None => Arc::new(HttpPeerTransport::new(
                identity.identity_key_pair.fingerprint(),
                PEER_REQUEST_TIMEOUT,
            )?),
        };

        let prober = HostProber::new(probe);
        let link = PeerLink::new(
            storage.clone(),
            prober.clone(),
            transport,
            config.probe_timeout(),
        );
        let registry = standard_registry(storage.clone(), link, data_dir.join(FILES_DIR));
        let executor = Arc::new(
            TaskExecutor::new(
                storage.clone(),
                registry,
                &ExecutionPools::current(),
                config.io_task_limit,
            )?
            .with_cpu_limit(config.cpu_task_limit),
        );

        Ok(Self {
            retry: RetryPolicy::new(storage.clone()),
            identity_backend: backend.kind(),
            data_dir,
            config,
            storage,
            identity,
            prober,
            executor,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn identity(&self) -> &IdentityMaterial {
        &self.identity
    }

    pub fn identity_backend(&self) -> IdentityBackendKind {
        self.identity_backend
    }

    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.executor
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Producers
    // ═══════════════════════════════════════════════════════════════════════

    pub fn enqueue(&self, task_type: TaskType, extra_info: Option<TaskExtraInfo>) -> ClipSyncResult<Task> {
        self.storage.create_task(task_type, extra_info)
    }

    /// Store a new local clip and queue its propagation to every known peer.
    pub fn share_clip(&self, clip: &ClipRecord) -> ClipSyncResult<Vec<TaskId>> {
        self.storage.save_clip(clip)?;
        let mut queued = Vec::new();
        for peer in self.storage.list_peers()? {
            let task = self.enqueue(
                TaskType::PropagateClip,
                Some(TaskExtraInfo::propagate_clip(peer.device_id, clip.clip_id)),
            )?;
            queued.push(task.task_id);
        }
        Ok(queued)
    }

    /// Queue a purge using the configured retention policy.
    pub fn enqueue_purge(&self) -> ClipSyncResult<Task> {
        self.enqueue(
            TaskType::PurgeStaleClips,
            Some(TaskExtraInfo::purge_stale_clips(
                self.config.clip_retention_days,
                self.config.max_stored_clips,
            )),
        )
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Pipeline
    // ═══════════════════════════════════════════════════════════════════════

    /// Dispatch every pending task; returns how many ran.
    pub async fn drive_pending(&self) -> ClipSyncResult<usize> {
        self.executor.drive_pending().await
    }

    /// Put up to `max` failed tasks back in the queue.
    pub fn redrive_failed(&self, max: usize) -> ClipSyncResult<Vec<TaskId>> {
        self.retry.redrive_failed(max)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Peers
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_peer(&self, peer: &PeerRecord) -> ClipSyncResult<()> {
        self.storage.save_peer(peer)
    }

    pub fn list_peers(&self) -> ClipSyncResult<Vec<PeerRecord>> {
        self.storage.list_peers()
    }

    /// Record the identity key a device presented at pairing.
    ///
    /// Returns `true` if it replaced a different key.
    pub fn save_peer_identity(&self, device_id: &str, key: &VerifyingKey) -> ClipSyncResult<bool> {
        self.storage.save_peer_identity(device_id, key)
    }

    /// Whether `key` matches the identity recorded for `device_id`.
    pub fn is_trusted_peer(&self, device_id: &str, key: &VerifyingKey) -> ClipSyncResult<bool> {
        self.storage.is_trusted_peer_identity(device_id, key)
    }

    /// First of `hosts` to answer on `port`, using the configured timeout.
    pub async fn probe(&self, hosts: &[HostCandidate], port: u16) -> Option<HostCandidate> {
        self.prober
            .select_reachable(hosts, port, self.config.probe_timeout())
            .await
    }
}

//! Handlers for the clip-sync task types
//!
//! Handlers that talk to a peer share a [`PeerLink`]: it resolves the peer
//! from the directory, probes its known hosts and hands back the address
//! that answered.

mod delete_remote;
mod delete_task;
mod propagate;
mod pull_file;
mod purge;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ClipSyncError;
use crate::net::{HostProber, PeerTransport};
use crate::storage::Storage;
use crate::types::HostCandidate;

use super::{HandlerError, HandlerRegistry};

pub use delete_remote::DeleteRemoteClipHandler;
pub use delete_task::DeleteTaskHandler;
pub use propagate::PropagateClipHandler;
pub use pull_file::{PullFileHandler, MAX_PULL_RETRIES};
pub use purge::PurgeStaleClipsHandler;

/// Everything a handler needs to reach a paired device.
#[derive(Clone)]
pub struct PeerLink {
    storage: Storage,
    prober: HostProber,
    transport: Arc<dyn PeerTransport>,
    probe_timeout: Duration,
}

impl PeerLink {
    pub fn new(
        storage: Storage,
        prober: HostProber,
        transport: Arc<dyn PeerTransport>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            prober,
            transport,
            probe_timeout,
        }
    }

    pub fn transport(&self) -> &dyn PeerTransport {
        self.transport.as_ref()
    }

    /// Find an address at which `device_id` answers right now.
    ///
    /// The winning host is moved to the front of the peer's host list.
    pub async fn reach(&self, device_id: &str) -> Result<(HostCandidate, u16), HandlerError> {
        let peer = self
            .storage
            .load_peer(device_id)?
            .ok_or_else(|| ClipSyncError::PeerNotFound(device_id.to_string()))?;

        let host = self
            .prober
            .select_reachable(&peer.candidates(), peer.port, self.probe_timeout)
            .await
            .ok_or_else(|| HandlerError::Unreachable(device_id.to_string()))?;

        self.storage.promote_peer_host(device_id, &host.host_address)?;
        Ok((host, peer.port))
    }
}

/// Registry holding a handler for every task type.
pub fn standard_registry(
    storage: Storage,
    link: PeerLink,
    files_dir: impl Into<PathBuf>,
) -> HandlerRegistry {
    HandlerRegistry::builder()
        .register(Arc::new(PropagateClipHandler::new(storage.clone(), link.clone())))
        .register(Arc::new(PullFileHandler::new(
            storage.clone(),
            link.clone(),
            files_dir,
        )))
        .register(Arc::new(DeleteRemoteClipHandler::new(link)))
        .register(Arc::new(PurgeStaleClipsHandler::new(storage.clone())))
        .register(Arc::new(DeleteTaskHandler::new(storage)))
        .build()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted peer used by the handler tests.

    use super::*;
    use crate::net::ProbeClient;
    use crate::types::{ClipRecord, PeerRecord};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use tempfile::TempDir;

    /// Answers probes only for the listed hosts.
    pub struct StaticProbe {
        pub up: HashSet<String>,
    }

    #[async_trait]
    impl ProbeClient for StaticProbe {
        async fn probe(&self, host: &str, _port: u16, _timeout: Duration) -> Result<(), ClipSyncError> {
            if self.up.contains(host) {
                Ok(())
            } else {
                Err(ClipSyncError::Network("connection refused".to_string()))
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Send { host: String, clip_id: u64 },
        Delete { host: String, clip_id: u64 },
        Pull { host: String, clip_id: u64, file_name: String },
    }

    /// Records every call; fails all of them while `fail` is set.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub calls: Mutex<Vec<Call>>,
        pub fail: Mutex<bool>,
    }

    impl RecordingTransport {
        fn outcome(&self) -> Result<(), ClipSyncError> {
            if *self.fail.lock() {
                Err(ClipSyncError::Network("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PeerTransport for RecordingTransport {
        async fn send_clip(
            &self,
            host: &HostCandidate,
            _port: u16,
            clip: &ClipRecord,
        ) -> Result<(), ClipSyncError> {
            self.calls.lock().push(Call::Send {
                host: host.host_address.clone(),
                clip_id: clip.clip_id,
            });
            self.outcome()
        }

        async fn delete_clip(
            &self,
            host: &HostCandidate,
            _port: u16,
            clip_id: u64,
        ) -> Result<(), ClipSyncError> {
            self.calls.lock().push(Call::Delete {
                host: host.host_address.clone(),
                clip_id,
            });
            self.outcome()
        }

        async fn pull_file(
            &self,
            host: &HostCandidate,
            _port: u16,
            clip_id: u64,
            file_name: &str,
        ) -> Result<Bytes, ClipSyncError> {
            self.calls.lock().push(Call::Pull {
                host: host.host_address.clone(),
                clip_id,
                file_name: file_name.to_string(),
            });
            self.outcome()?;
            Ok(Bytes::from(format!("{clip_id}:{file_name}")))
        }
    }

    pub struct Fixture {
        pub storage: Storage,
        pub transport: Arc<RecordingTransport>,
        pub link: PeerLink,
        pub dir: TempDir,
    }

    /// Storage with `device-B` known at `10.0.0.9` (down) and `192.168.1.20` (up).
    pub fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("test.redb")).unwrap();
        storage
            .save_peer(&PeerRecord {
                device_id: "device-B".to_string(),
                hosts: vec!["10.0.0.9".to_string(), "192.168.1.20".to_string()],
                port: 13129,
            })
            .unwrap();

        let probe = StaticProbe {
            up: ["192.168.1.20".to_string()].into_iter().collect(),
        };
        let transport = Arc::new(RecordingTransport::default());
        let link = PeerLink::new(
            storage.clone(),
            HostProber::new(Arc::new(probe)),
            transport.clone(),
            Duration::from_millis(500),
        );
        Fixture {
            storage,
            transport,
            link,
            dir,
        }
    }
}

//! Host selection by racing reachability probes
//!
//! A peer may be known under several addresses (Wi-Fi, Ethernet, VPN). Every
//! candidate is probed at once; the first one to answer wins and the rest
//! are cancelled without waiting for them to time out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ClipSyncError;
use crate::net::base_url;
use crate::types::HostCandidate;

/// Per-probe timeout used when the caller has no preference.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Endpoint every peer serves for reachability checks.
pub const PROBE_PATH: &str = "/sync/telnet";

/// One reachability round-trip to `host:port`.
#[async_trait]
pub trait ProbeClient: Send + Sync {
    /// `Ok(())` iff the peer answered with a success status.
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<(), ClipSyncError>;
}

/// HTTP probe: `GET /sync/telnet`, success iff status is 200.
#[derive(Clone)]
pub struct HttpProbeClient {
    client: reqwest::Client,
}

impl HttpProbeClient {
    pub fn new() -> Result<Self, ClipSyncError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| ClipSyncError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProbeClient for HttpProbeClient {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<(), ClipSyncError> {
        let url = format!("{}{}", base_url(host, port), PROBE_PATH);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ClipSyncError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(ClipSyncError::Network(format!(
                "{url} answered {}",
                response.status()
            )))
        }
    }
}

/// Picks the first reachable address among a peer's host candidates.
#[derive(Clone)]
pub struct HostProber {
    client: Arc<dyn ProbeClient>,
}

impl HostProber {
    pub fn new(client: Arc<dyn ProbeClient>) -> Self {
        Self { client }
    }

    /// Race a probe against every candidate and return the first to succeed.
    ///
    /// Returns `None` without probing when `candidates` is empty, and `None`
    /// after every probe settled when none succeeded. Per-candidate failures
    /// are logged, never returned. Losing probes are cancelled and fully
    /// torn down before this returns.
    pub async fn select_reachable(
        &self,
        candidates: &[HostCandidate],
        port: u16,
        timeout: Duration,
    ) -> Option<HostCandidate> {
        if candidates.is_empty() {
            return None;
        }

        let cancel = CancellationToken::new();
        let mut probes = JoinSet::new();
        for candidate in candidates.iter().cloned() {
            let client = self.client.clone();
            let cancel = cancel.clone();
            probes.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    outcome = tokio::time::timeout(
                        timeout,
                        client.probe(&candidate.host_address, port, timeout),
                    ) => outcome,
                };
                match outcome {
                    Ok(Ok(())) => Some(candidate),
                    Ok(Err(e)) => {
                        debug!(host = %candidate, port, error = %e, "Probe failed");
                        None
                    }
                    Err(_) => {
                        debug!(host = %candidate, port, ?timeout, "Probe timed out");
                        None
                    }
                }
            });
        }

        let mut winner = None;
        while let Some(joined) = probes.join_next().await {
            if let Ok(Some(candidate)) = joined {
                winner = Some(candidate);
                break;
            }
        }

        cancel.cancel();
        probes.shutdown().await;

        match &winner {
            Some(candidate) => info!(host = %candidate, port, "Selected reachable host"),
            None => debug!(port, candidates = candidates.len(), "No reachable host"),
        }
        winner
    }
}

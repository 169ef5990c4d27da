//! Agent configuration
//!
//! Read from `clipsync.json` in the data directory. Every field has a
//! default, so a partial (or missing) file is fine. The instance id names
//! this installation's secure-storage entries and must never change: when
//! the file lacks one, a fresh id is minted once and written back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{ClipSyncError, ClipSyncResult};
use crate::identity::IdentityBackendKind;

/// Configuration file name inside the data directory.
pub const CONFIG_FILE: &str = "clipsync.json";

/// Default sync service port.
pub const DEFAULT_SYNC_PORT: u16 = 13129;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Per-probe timeout when selecting a peer host
    pub probe_timeout_ms: u64,
    /// Port peers serve the sync endpoints on
    pub sync_port: u16,
    /// Concurrent I/O-bound tasks per batch
    pub io_task_limit: usize,
    /// Concurrent CPU-bound tasks per batch
    pub cpu_task_limit: usize,
    pub clip_retention_days: u32,
    pub max_stored_clips: usize,
    /// Names this installation's secure-storage entries
    pub instance_id: String,
    pub identity_backend: IdentityBackendKind,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 500,
            sync_port: DEFAULT_SYNC_PORT,
            io_task_limit: 8,
            cpu_task_limit: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            clip_retention_days: 30,
            max_stored_clips: 1000,
            instance_id: Ulid::new().to_string(),
            identity_backend: IdentityBackendKind::Auto,
        }
    }
}

impl AgentConfig {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    /// Load `clipsync.json` from `dir`, creating it from defaults if absent.
    pub fn load_or_default(dir: impl AsRef<Path>) -> ClipSyncResult<Self> {
        let dir = dir.as_ref();
        let path = Self::path(dir);
        if !path.exists() {
            let config = Self::default();
            config.save(dir)?;
            tracing::info!(path = %path.display(), "Wrote default configuration");
            return Ok(config);
        }

        let raw = std::fs::read_to_string(&path)?;
        let parse_error =
            |e: serde_json::Error| ClipSyncError::Config(format!("{}: {}", path.display(), e));
        let value: serde_json::Value = serde_json::from_str(&raw).map_err(parse_error)?;
        let has_instance_id = value
            .get("instance_id")
            .and_then(|id| id.as_str())
            .is_some_and(|id| !id.trim().is_empty());
        let mut config: Self = serde_json::from_value(value).map_err(parse_error)?;

        if !has_instance_id {
            config.instance_id = Ulid::new().to_string();
            config.validate()?;
            config.save(dir)?;
            tracing::info!(
                path = %path.display(),
                instance_id = %config.instance_id,
                "Assigned instance id"
            );
            return Ok(config);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, dir: impl AsRef<Path>) -> ClipSyncResult<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ClipSyncError::Serialization(e.to_string()))?;
        std::fs::write(Self::path(dir), json)?;
        Ok(())
    }

    pub fn validate(&self) -> ClipSyncResult<()> {
        if self.probe_timeout_ms == 0 {
            return Err(ClipSyncError::Config(
                "probe_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.io_task_limit == 0 || self.cpu_task_limit == 0 {
            return Err(ClipSyncError::Config(
                "task limits must be at least 1".to_string(),
            ));
        }
        if self.instance_id.trim().is_empty() {
            return Err(ClipSyncError::Config("instance_id is empty".to_string()));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_load_persists_defaults() {
        let dir = TempDir::new().unwrap();
        let first = AgentConfig::load_or_default(dir.path()).unwrap();
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(first.sync_port, 13129);
        assert_eq!(first.probe_timeout(), Duration::from_millis(500));

        // Same instance id on every later load
        let second = AgentConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "instance_id": "laptop", "io_task_limit": 2, "identity_backend": "file_permission" }"#,
        )
        .unwrap();

        let config = AgentConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.instance_id, "laptop");
        assert_eq!(config.io_task_limit, 2);
        assert_eq!(config.identity_backend, IdentityBackendKind::FilePermission);
        assert_eq!(config.clip_retention_days, 30);
    }

    #[test]
    fn test_missing_instance_id_is_assigned_once() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{ "io_task_limit": 2 }"#).unwrap();

        let first = AgentConfig::load_or_default(dir.path()).unwrap();
        let second = AgentConfig::load_or_default(dir.path()).unwrap();
        assert!(!first.instance_id.is_empty());
        assert_eq!(first.instance_id, second.instance_id);
        assert_eq!(second.io_task_limit, 2);

        let raw = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(raw.contains(&first.instance_id));
    }

    #[test]
    fn test_blank_instance_id_is_replaced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{ "instance_id": "  " }"#).unwrap();

        let first = AgentConfig::load_or_default(dir.path()).unwrap();
        assert!(!first.instance_id.trim().is_empty());
        assert_eq!(
            AgentConfig::load_or_default(dir.path()).unwrap().instance_id,
            first.instance_id
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "instance_id": "laptop", "io_task_limit": 0 }"#,
        )
        .unwrap();

        let err = AgentConfig::load_or_default(dir.path()).unwrap_err();
        assert!(matches!(err, ClipSyncError::Config(_)));
    }

    #[test]
    fn test_malformed_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        assert!(matches!(
            AgentConfig::load_or_default(dir.path()),
            Err(ClipSyncError::Config(_))
        ));
    }
}

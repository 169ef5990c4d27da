//! ClipSync Core Library
//!
//! Encrypted peer-to-peer clipboard sync: the asynchronous task pipeline that
//! makes propagation reliable, host selection for paired devices, and the
//! device identity keys everything is signed with.
//!
//! ## Overview
//!
//! Clipboard changes, sync triggers and scheduled cleanup create task
//! records. The executor dispatches each record to the handler for its type
//! and records `SUCCESS` or `FAILURE`; failed tasks stay put until a retry
//! pass re-queues them.
//!
//! ## Core Principles
//!
//! - **Durable work**: every unit of work is a persisted task record
//! - **Bounded concurrency**: batches never run more than the configured limit at once
//! - **Stable identity**: key material is created once and reused across restarts
//!
//! ## Quick Start
//!
//! ```ignore
//! use clipsync_core::{AgentConfig, ClipSyncAgent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let data_dir = std::path::Path::new("/tmp/clipsync");
//!     let config = AgentConfig::load_or_default(data_dir)?;
//!     let agent = ClipSyncAgent::open(data_dir, config, None).await?;
//!
//!     agent.enqueue_purge()?;
//!     agent.drive_pending().await?;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod net;
pub mod storage;
pub mod task;
pub mod types;

// Re-exports
pub use agent::ClipSyncAgent;
pub use config::AgentConfig;
pub use crypto::SecretCipher;
pub use error::{ClipSyncError, ClipSyncResult};
pub use identity::{IdentityBackend, IdentityBackendKind, IdentityKeyStore, IdentityMaterial};
pub use net::{HostProber, HttpPeerTransport, HttpProbeClient, PeerTransport, ProbeClient};
pub use storage::Storage;
pub use task::{
    ExecutionPools, HandlerError, HandlerRegistry, RetryPolicy, TaskExecutor, TaskHandler,
    TaskSemaphore,
};
pub use types::*;

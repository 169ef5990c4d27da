//! Core types for ClipSync

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a task
///
/// Uses ULID for time-ordered unique identifiers that sort lexicographically.
/// A fresh ULID is minted per task and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Create a new TaskId with current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// TaskId stamped with `millis`, so ids minted from a monotonic clock
    /// sort in creation order even within one millisecond.
    pub fn at(millis: i64) -> Self {
        Self(Ulid::from_parts(millis.max(0) as u64, rand::random()))
    }

    /// Get the underlying ULID
    pub fn as_ulid(&self) -> &Ulid {
        &self.0
    }

    /// Storage key (canonical 26-char ULID string)
    pub fn to_key(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

/// Tag selecting the handler that executes a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskType {
    /// Send a local clip to a peer
    PropagateClip,
    /// Fetch file content referenced by a remote clip
    PullFile,
    /// Remove a previously propagated clip from a peer
    DeleteRemoteClip,
    /// Drop local clips past the retention policy
    PurgeStaleClips,
    /// Remove a task record
    DeleteTask,
}

impl TaskType {
    /// Every task type the executor must have a handler for.
    pub const ALL: [TaskType; 5] = [
        TaskType::PropagateClip,
        TaskType::PullFile,
        TaskType::DeleteRemoteClip,
        TaskType::PurgeStaleClips,
        TaskType::DeleteTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PropagateClip => "propagate-clip",
            Self::PullFile => "pull-file",
            Self::DeleteRemoteClip => "delete-remote-clip",
            Self::PurgeStaleClips => "purge-stale-clips",
            Self::DeleteTask => "delete-task",
        }
    }

    /// Whether the task talks to a peer. Everything else is local work.
    pub fn is_io_bound(&self) -> bool {
        matches!(
            self,
            Self::PropagateClip | Self::PullFile | Self::DeleteRemoteClip
        )
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Lifecycle state of a task.
///
/// ```text
/// PREPARING → EXECUTING → SUCCESS
///                       → FAILURE ─(reset)→ PREPARING
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Preparing,
    Executing,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "PREPARING",
            Self::Executing => "EXECUTING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// Whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when a string names no task status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status {0:?}")]
pub struct ParseTaskStatusError(pub String);

impl std::str::FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PREPARING" => Ok(Self::Preparing),
            "EXECUTING" => Ok(Self::Executing),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            _ => Err(ParseTaskStatusError(s.to_string())),
        }
    }
}

/// Handler-specific task parameters.
///
/// Every variant carries a `fail_message` slot that the task store fills
/// when the task fails; the other fields belong to the handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskExtraInfo {
    /// Minimal payload carrying only a failure message
    Base {
        fail_message: Option<String>,
    },
    PropagateClip {
        peer: String,
        clip_id: u64,
        fail_message: Option<String>,
    },
    PullFile {
        peer: String,
        clip_id: u64,
        file_name: String,
        attempts: u32,
        /// Follow-on attempt this task already enqueued
        retry_task: Option<TaskId>,
        fail_message: Option<String>,
    },
    DeleteRemoteClip {
        peer: String,
        clip_id: u64,
        fail_message: Option<String>,
    },
    PurgeStaleClips {
        retention_days: u32,
        max_clips: usize,
        fail_message: Option<String>,
    },
    DeleteTask {
        target: TaskId,
        fail_message: Option<String>,
    },
}

impl TaskExtraInfo {
    pub fn propagate_clip(peer: impl Into<String>, clip_id: u64) -> Self {
        Self::PropagateClip {
            peer: peer.into(),
            clip_id,
            fail_message: None,
        }
    }

    pub fn pull_file(peer: impl Into<String>, clip_id: u64, file_name: impl Into<String>) -> Self {
        Self::PullFile {
            peer: peer.into(),
            clip_id,
            file_name: file_name.into(),
            attempts: 0,
            retry_task: None,
            fail_message: None,
        }
    }

    pub fn delete_remote_clip(peer: impl Into<String>, clip_id: u64) -> Self {
        Self::DeleteRemoteClip {
            peer: peer.into(),
            clip_id,
            fail_message: None,
        }
    }

    pub fn purge_stale_clips(retention_days: u32, max_clips: usize) -> Self {
        Self::PurgeStaleClips {
            retention_days,
            max_clips,
            fail_message: None,
        }
    }

    pub fn delete_task(target: TaskId) -> Self {
        Self::DeleteTask {
            target,
            fail_message: None,
        }
    }

    /// The recorded failure message, if any.
    pub fn fail_message(&self) -> Option<&str> {
        match self {
            Self::Base { fail_message }
            | Self::PropagateClip { fail_message, .. }
            | Self::PullFile { fail_message, .. }
            | Self::DeleteRemoteClip { fail_message, .. }
            | Self::PurgeStaleClips { fail_message, .. }
            | Self::DeleteTask { fail_message, .. } => fail_message.as_deref(),
        }
    }

    fn fail_message_mut(&mut self) -> &mut Option<String> {
        match self {
            Self::Base { fail_message }
            | Self::PropagateClip { fail_message, .. }
            | Self::PullFile { fail_message, .. }
            | Self::DeleteRemoteClip { fail_message, .. }
            | Self::PurgeStaleClips { fail_message, .. }
            | Self::DeleteTask { fail_message, .. } => fail_message,
        }
    }
}

/// Message recorded when an error carries no text of its own.
pub const UNKNOWN_FAILURE: &str = "Unknown error";

/// Merge a failure message into an existing payload.
///
/// Handler fields are kept as-is; only the failure slot changes. A task with
/// no payload gets a minimal [`TaskExtraInfo::Base`] carrying the message.
pub fn merge_failure(existing: Option<TaskExtraInfo>, message: &str) -> TaskExtraInfo {
    let message = if message.is_empty() {
        UNKNOWN_FAILURE
    } else {
        message
    };
    match existing {
        Some(mut info) => {
            *info.fail_message_mut() = Some(message.to_string());
            info
        }
        None => TaskExtraInfo::Base {
            fail_message: Some(message.to_string()),
        },
    }
}

/// A unit of asynchronous, retryable work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub extra_info: Option<TaskExtraInfo>,
    /// Creation time (unix millis)
    pub create_time: i64,
    /// Time of the most recent committed transition (unix millis)
    pub modify_time: i64,
}

impl Task {
    /// The failure message recorded on this task, if any.
    pub fn fail_message(&self) -> Option<&str> {
        self.extra_info.as_ref().and_then(|info| info.fail_message())
    }
}

/// A locally stored clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub clip_id: u64,
    /// Creation time (unix millis)
    pub created_at: i64,
    /// Opaque, already-formatted clip body
    pub content: Vec<u8>,
    /// Files referenced by this clip
    pub file_names: Vec<String>,
    /// Devices this clip has been propagated to
    pub remote_peers: Vec<String>,
}

/// Directory entry for a paired device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub device_id: String,
    /// Addresses the device has been seen at, most recent first
    pub hosts: Vec<String>,
    /// Sync service port
    pub port: u16,
}

impl PeerRecord {
    pub fn candidates(&self) -> Vec<HostCandidate> {
        self.hosts.iter().map(HostCandidate::new).collect()
    }
}

/// An address at which a peer might currently be reachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostCandidate {
    pub host_address: String,
}

impl HostCandidate {
    pub fn new(host_address: impl Into<String>) -> Self {
        Self {
            host_address: host_address.into(),
        }
    }
}

impl std::fmt::Display for HostCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.host_address)
    }
}

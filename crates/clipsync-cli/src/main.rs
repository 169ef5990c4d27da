//! ClipSync CLI
//!
//! Thin wrapper around clipsync-core for inspecting and driving the task
//! pipeline from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Show this device's identity
//! clipsync identity show
//!
//! # List tasks, optionally by status
//! clipsync task list --status failure
//!
//! # Dispatch every pending task
//! clipsync task drive
//!
//! # Re-queue failed tasks
//! clipsync task redrive
//!
//! # Purge stale clips now
//! clipsync purge
//!
//! # Find which address of a peer answers (port defaults to sync_port)
//! clipsync probe 192.168.1.20 10.0.0.9
//! clipsync probe --port 13130 192.168.1.20
//!
//! # Register a paired device
//! clipsync peer add laptop 192.168.1.20 laptop.local
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipsync_core::{
    AgentConfig, ClipSyncAgent, HostCandidate, PeerRecord, Task, TaskId, TaskStatus,
};

/// ClipSync - encrypted peer-to-peer clipboard sync
#[derive(Parser)]
#[command(name = "clipsync")]
#[command(version = "0.1.0")]
#[command(about = "ClipSync - encrypted peer-to-peer clipboard sync")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.clipsync/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identity management
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Task pipeline
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Purge stale clips according to the retention policy
    Purge,

    /// Probe hosts and print the first that answers
    Probe {
        /// Candidate host addresses
        #[arg(required = true)]
        hosts: Vec<String>,
        /// Sync service port (default: sync_port from the configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Paired device directory
    Peer {
        #[command(subcommand)]
        action: PeerAction,
    },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Show the device identity
    Show,
}

#[derive(Subcommand)]
enum TaskAction {
    /// List tasks
    List {
        /// Only tasks in this status (preparing, executing, success, failure)
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Show one task
    Show {
        /// Task ID
        task_id: String,
    },
    /// Dispatch every pending task
    Drive,
    /// Move failed tasks back to pending
    Redrive {
        /// Maximum number of tasks to re-queue
        #[arg(short, long, default_value_t = 100)]
        max: usize,
    },
}

#[derive(Subcommand)]
enum PeerAction {
    /// Add or replace a paired device
    Add {
        device_id: String,
        #[arg(required = true)]
        hosts: Vec<String>,
        /// Sync service port (default: sync_port from the configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List paired devices
    List,
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory (~/.clipsync/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".clipsync")
        .join("data")
}

/// Parse a task ID from ULID string
fn parse_task_id(s: &str) -> Result<TaskId> {
    s.parse()
        .map_err(|e| anyhow::anyhow!("Invalid task ID '{}': {}", s, e))
}

fn parse_status(s: &str) -> Result<TaskStatus> {
    s.parse().map_err(|_| {
        anyhow::anyhow!(
            "Invalid status '{}' (expected preparing, executing, success or failure)",
            s
        )
    })
}

fn format_time(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn print_task_line(task: &Task) {
    println!(
        "  {} {:<10} {:<20} {}",
        task.task_id,
        task.status.as_str(),
        task.task_type,
        task.fail_message().unwrap_or("")
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config = AgentConfig::load_or_default(&data_dir)
        .with_context(|| format!("Failed to load configuration from {}", data_dir.display()))?;
    let agent = ClipSyncAgent::open(&data_dir, config, None).await?;

    match cli.command {
        Commands::Identity { action } => match action {
            IdentityAction::Show => {
                let identity = agent.identity();
                println!("Identity:");
                println!(
                    "  Public key: {}",
                    hex::encode(identity.identity_key_pair.public_key().as_bytes())
                );
                println!("  Fingerprint: {}", identity.identity_key_pair.fingerprint());
                println!("  Registration ID: {}", identity.registration_id);
                println!("  Backend: {:?}", agent.identity_backend());
                println!("  Data directory: {}", agent.data_dir().display());
            }
        },

        Commands::Task { action } => match action {
            TaskAction::List { status } => {
                let tasks = match status {
                    Some(s) => agent.storage().list_tasks_by_status(parse_status(&s)?)?,
                    None => agent.storage().list_tasks()?,
                };
                if tasks.is_empty() {
                    println!("No tasks.");
                } else {
                    println!("Tasks ({}):", tasks.len());
                    for task in &tasks {
                        print_task_line(task);
                    }
                }
            }
            TaskAction::Show { task_id } => {
                let id = parse_task_id(&task_id)?;
                let task = agent
                    .storage()
                    .load_task(&id)?
                    .ok_or_else(|| anyhow::anyhow!("Task not found: {}", id))?;
                println!("Task:");
                println!("  ID: {}", task.task_id);
                println!("  Type: {}", task.task_type);
                println!("  Status: {}", task.status.as_str());
                println!("  Created: {}", format_time(task.create_time));
                println!("  Modified: {}", format_time(task.modify_time));
                if let Some(info) = &task.extra_info {
                    println!("  Payload: {:?}", info);
                }
                if let Some(message) = task.fail_message() {
                    println!("  Failure: {}", message);
                }
            }
            TaskAction::Drive => {
                let count = agent.drive_pending().await?;
                println!("Dispatched {} task(s).", count);
            }
            TaskAction::Redrive { max } => {
                let reset = agent.redrive_failed(max)?;
                println!("Re-queued {} task(s).", reset.len());
                for id in reset {
                    println!("  {}", id);
                }
            }
        },

        Commands::Purge => {
            let task = agent.enqueue_purge()?;
            agent.drive_pending().await?;
            let task = agent.storage().load_task(&task.task_id)?.unwrap_or(task);
            println!("Purge task {}: {}", task.task_id, task.status.as_str());
            if let Some(message) = task.fail_message() {
                println!("  Failure: {}", message);
            }
        }

        Commands::Probe { hosts, port } => {
            let port = port.unwrap_or(agent.config().sync_port);
            let candidates: Vec<HostCandidate> = hosts.into_iter().map(HostCandidate::new).collect();
            match agent.probe(&candidates, port).await {
                Some(host) => println!("Reachable: {}", host),
                None => {
                    println!("No reachable host.");
                    std::process::exit(1);
                }
            }
        }

        Commands::Peer { action } => match action {
            PeerAction::Add {
                device_id,
                hosts,
                port,
            } => {
                let port = port.unwrap_or(agent.config().sync_port);
                agent.add_peer(&PeerRecord {
                    device_id: device_id.clone(),
                    hosts,
                    port,
                })?;
                println!("Added peer {}", device_id);
            }
            PeerAction::List => {
                let peers = agent.list_peers()?;
                if peers.is_empty() {
                    println!("No peers.");
                } else {
                    println!("Peers ({}):", peers.len());
                    for peer in peers {
                        println!("  {} port {} [{}]", peer.device_id, peer.port, peer.hosts.join(", "));
                    }
                }
            }
        },
    }

    Ok(())
}

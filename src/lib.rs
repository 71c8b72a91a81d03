//! fsload: Deploy a generated HDFS fsimage onto a NameNode and DataNodes.

// Serde helper module.
mod serde;
// Command line arguments and configuration.
pub mod config;
// DataNode inventory.
pub mod inventory;
// Locating external tools.
pub mod tools;
// Child process invocations.
pub mod process;
// Remote and local command execution.
pub mod executor;
// Per-node jobs.
pub mod job;
// Sequential and bounded-parallel dispatch.
pub mod dispatch;
// NameNode image loading.
pub mod namenode;
// Command line actions.
pub mod actions;
// Error handling.
pub mod error;

pub use config::{Action, Config, FileSettings, Overrides, Settings};
pub use dispatch::{dispatch_all, DispatchMode, DispatchReport, NodeOutcome, NodeStatus};
pub use error::FsloadError;
pub use executor::{Credential, HostRunner, LocalRunner, RemoteExecutor, SshExecutor, SshOptions};
pub use inventory::{Inventory, Node};
pub use job::{build_jobs, NodePlan, Step, SyncJob};
pub use process::{Invocation, ProcessOutput};
pub use tools::Toolchain;

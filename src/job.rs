use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{FsloadError, Result};
use crate::inventory::Node;

/// One unit of work the executor runs against a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Run an argument vector on the node.
    Run(Vec<String>),
    /// Mirror a local tree to a path on the node.
    Mirror { source: PathBuf, dest: String },
}

impl Step {
    pub fn run<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Run(argv.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Step::Run(argv) => write!(f, "run '{}'", argv.join(" ")),
            Step::Mirror { source, dest } => write!(f, "mirror {} -> {}", source.display(), dest),
        }
    }
}

/// What happens on the node once a tree has been copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostAction {
    /// `chown -R <owner> <target>`.
    Chown { owner: String },
}

impl PostAction {
    pub fn argv(&self, target: &str) -> Vec<String> {
        match self {
            PostAction::Chown { owner } => vec![
                "chown".to_string(),
                "-R".to_string(),
                owner.clone(),
                target.to_string(),
            ],
        }
    }
}

/// Copy of one storage slot of the fsgen output onto one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub source: PathBuf,
    pub node: Node,
    pub target: String,
    pub post_action: PostAction,
}

impl SyncJob {
    /// The mirror copy followed by the post-copy action.
    pub fn steps(&self) -> [Step; 2] {
        [
            Step::Mirror {
                source: self.source.clone(),
                dest: self.target.clone(),
            },
            Step::Run(self.post_action.argv(&self.target)),
        ]
    }

    /// The source must be an existing, non-empty directory. Copying an empty
    /// or missing tree with `--delete` would wipe the node's storage.
    pub fn validate_source(&self) -> Result<()> {
        let mut entries = std::fs::read_dir(&self.source).map_err(|e| {
            FsloadError::config(format!(
                "source directory {} for {} is not readable: {}",
                self.source.display(),
                self.node,
                e
            ))
        })?;
        if entries.next().is_none() {
            return Err(FsloadError::config(format!(
                "source directory {} for {} is empty",
                self.source.display(),
                self.node
            )));
        }
        Ok(())
    }
}

/// A node and the steps to run on it, in order.
#[derive(Debug, Clone)]
pub struct NodePlan {
    pub node: Node,
    pub steps: Vec<Step>,
}

impl NodePlan {
    pub fn new(node: Node, steps: Vec<Step>) -> Self {
        Self { node, steps }
    }

    pub fn from_jobs(node: Node, jobs: &[SyncJob]) -> Self {
        Self::new(node, jobs.iter().flat_map(SyncJob::steps).collect())
    }
}

/// Local staging directory of `slot` (1-based) for `node` in the fsgen output.
pub fn source_dir(fsgen_root: &Path, node: &Node, slot: usize) -> PathBuf {
    // The trailing slash makes the mirror copy take the directory contents.
    fsgen_root.join(format!("datanode{:02}/storage{:02}/", node.index, slot))
}

/// Builds one job per storage slot of `node`, in slot order.
pub fn build_jobs(node: &Node, fsgen_root: &Path, storage_dirs: &[String], owner: &str) -> Vec<SyncJob> {
    storage_dirs
        .iter()
        .enumerate()
        .map(|(i, target)| SyncJob {
            source: source_dir(fsgen_root, node, i + 1),
            node: node.clone(),
            target: target.clone(),
            post_action: PostAction::Chown {
                owner: owner.to_string(),
            },
        })
        .collect()
}

/// Wipes and recreates every storage directory.
pub fn format_steps(storage_dirs: &[String]) -> Vec<Step> {
    storage_dirs
        .iter()
        .flat_map(|dir| {
            [
                Step::run(["rm", "-rf", dir.as_str()]),
                Step::run(["mkdir", "-p", dir.as_str()]),
            ]
        })
        .collect()
}

/// Proves the node is reachable and accepts commands.
pub fn check_steps() -> Vec<Step> {
    vec![Step::run(["true"])]
}

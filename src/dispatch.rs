//! Running node plans across the fleet.
//!
//! Steps of one node always run one after the other. Nodes themselves run
//! either one at a time in configured order, stopping at the first failure,
//! or concurrently with a bounded number in flight, where a failing node has
//! no effect on its siblings.

use std::sync::Arc;

use futures::future::join_all;
use log::{error, info, warn};
use tokio::sync::Semaphore;

use crate::error::{FsloadError, Result};
use crate::executor::RemoteExecutor;
use crate::inventory::Node;
use crate::job::{NodePlan, Step};
use crate::process::ProcessOutput;

/// Number of nodes loaded at once in parallel mode unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One node after another; the first failure stops the run.
    Sequential,
    /// Up to `max_concurrency` nodes at once; failures are isolated.
    Parallel { max_concurrency: usize },
}

#[derive(Debug)]
pub enum NodeStatus {
    Succeeded(Vec<ProcessOutput>),
    Failed(FsloadError),
    /// An earlier node failed in sequential mode.
    NotAttempted,
}

#[derive(Debug)]
pub struct NodeOutcome {
    pub node: Node,
    pub status: NodeStatus,
}

impl NodeOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, NodeStatus::Succeeded(_))
    }

    pub fn failed(&self) -> bool {
        matches!(self.status, NodeStatus::Failed(_))
    }

    pub fn attempted(&self) -> bool {
        !matches!(self.status, NodeStatus::NotAttempted)
    }
}

/// Per-node outcomes of one dispatch, in configured node order.
#[derive(Debug)]
pub struct DispatchReport {
    pub outcomes: Vec<NodeOutcome>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(NodeOutcome::succeeded)
    }

    pub fn failed_nodes(&self) -> Vec<&Node> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.failed())
            .map(|outcome| &outcome.node)
            .collect()
    }

    pub fn outcome(&self, hostname: &str) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| o.node.hostname == hostname)
    }

    /// Fails with the names of the failed nodes if any node did not succeed.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FsloadError::Dispatch {
                failed: self
                    .failed_nodes()
                    .into_iter()
                    .map(|node| node.hostname.clone())
                    .collect(),
            })
        }
    }
}

/// Message sent from a node task to the dispatcher when the node is done.
#[derive(Debug)]
struct NodeCompletion {
    position: usize,
    status: NodeStatus,
}

/// Runs the steps of one node in order, stopping at the first failure.
pub async fn run_plan(executor: &dyn RemoteExecutor, plan: &NodePlan) -> Result<Vec<ProcessOutput>> {
    let mut outputs = Vec::with_capacity(plan.steps.len());
    for step in &plan.steps {
        info!("{} {}", plan.node, step);
        let output = match step {
            Step::Run(argv) => executor.run_command(&plan.node, argv).await?,
            Step::Mirror { source, dest } => executor.copy_tree(source, &plan.node, dest).await?,
        };
        outputs.push(output);
    }
    Ok(outputs)
}

pub async fn dispatch_all(
    executor: Arc<dyn RemoteExecutor>,
    plans: Vec<NodePlan>,
    mode: DispatchMode,
) -> Result<DispatchReport> {
    match mode {
        DispatchMode::Sequential => Ok(dispatch_sequential(executor.as_ref(), plans).await),
        DispatchMode::Parallel { max_concurrency } => {
            if max_concurrency == 0 {
                return Err(FsloadError::config("max concurrency must be at least 1"));
            }
            dispatch_parallel(executor, plans, max_concurrency).await
        }
    }
}

async fn dispatch_sequential(executor: &dyn RemoteExecutor, plans: Vec<NodePlan>) -> DispatchReport {
    let mut outcomes = Vec::with_capacity(plans.len());
    let mut aborted = false;
    for plan in plans {
        if aborted {
            warn!("{} skipped after an earlier failure", plan.node);
            outcomes.push(NodeOutcome {
                node: plan.node,
                status: NodeStatus::NotAttempted,
            });
            continue;
        }
        let status = match run_plan(executor, &plan).await {
            Ok(outputs) => {
                info!("{} done", plan.node);
                NodeStatus::Succeeded(outputs)
            }
            Err(e) => {
                error!("{} failed: {}", plan.node, e);
                aborted = true;
                NodeStatus::Failed(e)
            }
        };
        outcomes.push(NodeOutcome {
            node: plan.node,
            status,
        });
    }
    DispatchReport { outcomes }
}

async fn dispatch_parallel(
    executor: Arc<dyn RemoteExecutor>,
    plans: Vec<NodePlan>,
    max_concurrency: usize,
) -> Result<DispatchReport> {
    let num_nodes = plans.len();
    let nodes: Vec<Node> = plans.iter().map(|plan| plan.node.clone()).collect();
    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    // MPSC channel for node tasks to report back to the dispatcher.
    let (completion_tx, completion_rx) = flume::bounded::<NodeCompletion>(num_nodes);

    let mut tasks = Vec::with_capacity(num_nodes);
    for (position, plan) in plans.into_iter().enumerate() {
        // Waiting here keeps at most `max_concurrency` node tasks alive.
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|_| FsloadError::config("node concurrency limiter was closed"))?;
        let executor = Arc::clone(&executor);
        let completion_tx = completion_tx.clone();
        tasks.push(tokio::spawn(async move {
            let status = match run_plan(executor.as_ref(), &plan).await {
                Ok(outputs) => {
                    info!("{} done", plan.node);
                    NodeStatus::Succeeded(outputs)
                }
                Err(e) => {
                    error!("{} failed: {}", plan.node, e);
                    NodeStatus::Failed(e)
                }
            };
            drop(permit);
            let _ = completion_tx.send(NodeCompletion { position, status });
        }));
    }
    drop(completion_tx);

    let mut statuses: Vec<Option<NodeStatus>> = (0..num_nodes).map(|_| None).collect();
    let mut finished = 0;
    while let Ok(completion) = completion_rx.recv_async().await {
        finished += 1;
        info!("{}/{} nodes finished", finished, num_nodes);
        statuses[completion.position] = Some(completion.status);
    }

    // The channel only closes once every task has ended; this surfaces panics.
    for (position, joined) in join_all(tasks).await.into_iter().enumerate() {
        if let Err(e) = joined {
            statuses[position].get_or_insert_with(|| {
                NodeStatus::Failed(FsloadError::LocalCommand(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("node task ended abnormally: {}", e),
                )))
            });
        }
    }

    let outcomes = nodes
        .into_iter()
        .zip(statuses)
        .map(|(node, status)| NodeOutcome {
            node,
            status: status.unwrap_or(NodeStatus::NotAttempted),
        })
        .collect();
    Ok(DispatchReport { outcomes })
}

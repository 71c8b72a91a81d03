//! One function per command line action.

use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::config::{Action, Settings};
use crate::dispatch::{dispatch_all, DispatchMode, DispatchReport};
use crate::error::Result;
use crate::executor::{LocalRunner, RemoteExecutor};
use crate::inventory::Node;
use crate::job::{build_jobs, check_steps, format_steps, NodePlan, SyncJob};

pub async fn run(
    action: &Action,
    settings: &Settings,
    executor: Arc<dyn RemoteExecutor>,
    runner: &dyn LocalRunner,
) -> Result<()> {
    match action {
        Action::Check => {
            check(settings, executor).await?;
        }
        Action::FormatDn => {
            format_datanodes(settings, executor).await?;
        }
        Action::LoadFsgenNn { fsgen_dir } => {
            load_namenode(settings, runner, fsgen_dir).await?;
        }
        Action::LoadFsgenDn { fsgen_dir, node } => {
            let node = settings.inventory.find(node)?.clone();
            load_datanodes(settings, executor, fsgen_dir, vec![node], DispatchMode::Sequential).await?;
        }
        Action::LoadFsgenDns { fsgen_dir } => {
            let nodes = settings.inventory.nodes().to_vec();
            load_datanodes(settings, executor, fsgen_dir, nodes, DispatchMode::Sequential).await?;
        }
        Action::LoadFsgenDnsPar { fsgen_dir } => {
            let nodes = settings.inventory.nodes().to_vec();
            let mode = DispatchMode::Parallel {
                max_concurrency: settings.max_concurrency,
            };
            load_datanodes(settings, executor, fsgen_dir, nodes, mode).await?;
        }
    }
    Ok(())
}

/// Runs a trivial command on every node, stopping at the first unreachable one.
pub async fn check(settings: &Settings, executor: Arc<dyn RemoteExecutor>) -> Result<DispatchReport> {
    let plans = settings
        .inventory
        .nodes()
        .iter()
        .map(|node| NodePlan::new(node.clone(), check_steps()))
        .collect();
    let report = dispatch_all(executor, plans, DispatchMode::Sequential).await?;
    finish("check", report)
}

/// Wipes and recreates every storage directory on every node, one node at a time.
pub async fn format_datanodes(settings: &Settings, executor: Arc<dyn RemoteExecutor>) -> Result<DispatchReport> {
    let steps = format_steps(settings.inventory.storage_dirs());
    let plans = settings
        .inventory
        .nodes()
        .iter()
        .map(|node| NodePlan::new(node.clone(), steps.clone()))
        .collect();
    let report = dispatch_all(executor, plans, DispatchMode::Sequential).await?;
    finish("format_dn", report)
}

/// Mirrors each node's slice of the fsgen output onto it.
///
/// Every source directory of every node is checked before the first node is
/// touched.
pub async fn load_datanodes(
    settings: &Settings,
    executor: Arc<dyn RemoteExecutor>,
    fsgen_dir: &Path,
    nodes: Vec<Node>,
    mode: DispatchMode,
) -> Result<DispatchReport> {
    let mut plans = Vec::with_capacity(nodes.len());
    for node in nodes {
        let jobs = build_jobs(
            &node,
            fsgen_dir,
            settings.inventory.storage_dirs(),
            &settings.service_user,
        );
        jobs.iter().try_for_each(SyncJob::validate_source)?;
        plans.push(NodePlan::from_jobs(node, &jobs));
    }
    info!(
        "Loading {} DataNode(s) from {} ({:?})",
        plans.len(),
        fsgen_dir.display(),
        mode
    );
    let report = dispatch_all(executor, plans, mode).await?;
    finish("load", report)
}

pub async fn load_namenode(settings: &Settings, runner: &dyn LocalRunner, fsgen_dir: &Path) -> Result<()> {
    settings.namenode_load().run(runner, fsgen_dir).await
}

fn finish(what: &str, report: DispatchReport) -> Result<DispatchReport> {
    let succeeded = report.outcomes.iter().filter(|o| o.succeeded()).count();
    let skipped = report.outcomes.iter().filter(|o| !o.attempted()).count();
    if skipped > 0 {
        warn!("{}: {} node(s) were not attempted", what, skipped);
    }
    info!(
        "{}: {}/{} node(s) succeeded",
        what,
        succeeded,
        report.outcomes.len()
    );
    report.into_result()
}

//! Running commands and copying trees on nodes.
//!
//! [`RemoteExecutor`] is the seam between the dispatcher and the outside
//! world: the dispatcher only ever asks "run this argv on that node" or
//! "mirror this local tree to that path on that node". [`SshExecutor`]
//! answers by composing `ssh`, `rsync` and optionally `sshpass` invocations.
//! Tests substitute their own executors.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use colored::*;
use itertools::Itertools;

use crate::error::{FsloadError, Result};
use crate::inventory::Node;
use crate::process::{shell_quote, Invocation, ProcessOutput};
use crate::tools::Toolchain;

/// Environment variable `sshpass -e` reads the password from.
const SSHPASS_ENV: &str = "SSHPASS";

/// A password that never shows up in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(Arc<str>);

impl Password {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::from(secret.into()))
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Password(****)")
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("****")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Authentication is left to the local SSH agent and key material.
    Key,
    /// Every remote call is wrapped in `sshpass`.
    Password(Password),
}

impl Credential {
    pub fn from_password(password: Option<String>) -> Self {
        match password {
            Some(secret) if !secret.is_empty() => Self::Password(Password::new(secret)),
            _ => Self::Key,
        }
    }

    pub fn is_password(&self) -> bool {
        matches!(self, Self::Password(_))
    }
}

#[derive(Debug, Clone)]
pub struct SshOptions {
    pub user: Option<String>,
    pub credential: Credential,
    /// Skips host key checks. Meant for short-lived test clusters whose host
    /// keys change on every rebuild.
    pub insecure_skip_host_verification: bool,
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Runs `argv` on `node`. A non-zero exit is a `RemoteExecution` error.
    async fn run_command(&self, node: &Node, argv: &[String]) -> Result<ProcessOutput>;

    /// Makes `dest` on `node` an exact mirror of the local `source` tree,
    /// deleting anything under `dest` that `source` does not have.
    async fn copy_tree(&self, source: &Path, node: &Node, dest: &str) -> Result<ProcessOutput>;
}

pub struct SshExecutor {
    tools: Toolchain,
    options: SshOptions,
    quiet: bool,
}

impl SshExecutor {
    pub fn new(tools: Toolchain, options: SshOptions, quiet: bool) -> Self {
        Self {
            tools,
            options,
            quiet,
        }
    }

    /// `user@host` if a user is configured, otherwise just `host`.
    pub fn target(&self, node: &Node) -> String {
        match &self.options.user {
            Some(user) => format!("{}@{}", user, node.hostname),
            None => node.hostname.clone(),
        }
    }

    fn ssh_options(&self) -> Vec<String> {
        if self.options.insecure_skip_host_verification {
            vec![
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ]
        } else {
            vec![]
        }
    }

    /// Wraps `invocation` in `sshpass -e` when a password is configured.
    fn authenticate(&self, invocation: Invocation) -> Result<Invocation> {
        match &self.options.credential {
            Credential::Key => Ok(invocation),
            Credential::Password(password) => {
                let sshpass = self.tools.sshpass.as_ref().ok_or_else(|| {
                    FsloadError::config("a password is configured but sshpass was not located")
                })?;
                Ok(Invocation::new(sshpass)
                    .arg("-e")
                    .arg(invocation.program.to_string_lossy())
                    .args(invocation.args)
                    .env(SSHPASS_ENV, password.expose()))
            }
        }
    }

    /// `ssh [opts] <target> -- <quoted argv>`.
    ///
    /// ssh joins its trailing arguments with spaces and hands the result to
    /// the remote shell, so each argument is quoted on its own to keep the
    /// argument vector intact on the far side.
    pub fn ssh_invocation(&self, node: &Node, argv: &[String]) -> Result<Invocation> {
        let invocation = Invocation::new(&self.tools.ssh)
            .args(self.ssh_options())
            .arg(self.target(node))
            .arg("--")
            .args(argv.iter().map(|arg| shell_quote(arg)));
        self.authenticate(invocation)
    }

    /// `rsync -a --delete -e '<ssh …>' <source>/ <target>:<dest>/`.
    pub fn rsync_invocation(&self, source: &Path, node: &Node, dest: &str) -> Result<Invocation> {
        let remote_shell = std::iter::once(shell_quote(&self.tools.ssh.to_string_lossy()))
            .chain(self.ssh_options())
            .join(" ");
        let invocation = Invocation::new(&self.tools.rsync)
            .args(["-a", "--delete", "-e"])
            .arg(remote_shell)
            .arg(with_trailing_slash(&source.to_string_lossy()))
            .arg(format!("{}:{}", self.target(node), with_trailing_slash(dest)));
        self.authenticate(invocation)
    }

    async fn execute(&self, node: &Node, invocation: Invocation) -> Result<ProcessOutput> {
        let output = invocation.run(&node.prettify(), self.quiet).await?;
        check_status(&node.hostname, &invocation, output)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run_command(&self, node: &Node, argv: &[String]) -> Result<ProcessOutput> {
        let invocation = self.ssh_invocation(node, argv)?;
        self.execute(node, invocation).await
    }

    async fn copy_tree(&self, source: &Path, node: &Node, dest: &str) -> Result<ProcessOutput> {
        let invocation = self.rsync_invocation(source, node, dest)?;
        self.execute(node, invocation).await
    }
}

/// Runs commands on the machine fsload itself runs on.
#[async_trait]
pub trait LocalRunner: Send + Sync {
    async fn run(&self, invocation: Invocation) -> Result<ProcessOutput>;
}

pub struct HostRunner {
    label: ColoredString,
    quiet: bool,
}

impl HostRunner {
    pub const NAME: &'static str = "localhost";

    pub fn new(quiet: bool) -> Self {
        Self {
            label: format!("[{}]", Self::NAME).bold(),
            quiet,
        }
    }
}

#[async_trait]
impl LocalRunner for HostRunner {
    async fn run(&self, invocation: Invocation) -> Result<ProcessOutput> {
        let output = invocation.run(&self.label, self.quiet).await?;
        check_status(Self::NAME, &invocation, output)
    }
}

fn check_status(node: &str, invocation: &Invocation, output: ProcessOutput) -> Result<ProcessOutput> {
    if output.success() {
        Ok(output)
    } else {
        Err(FsloadError::RemoteExecution {
            node: node.to_string(),
            command: invocation.to_string(),
            status: output.status.to_string(),
            output: output.combined(),
        })
    }
}

/// rsync copies the contents of `dir/` but the directory itself for `dir`.
fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

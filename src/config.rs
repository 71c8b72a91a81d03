//! Configuration for fsload.
//!
//! Settings come from three places, highest precedence first: command line
//! flags, environment variables (`DATANODES`, `STORAGE_DIRS`, `SSH_USER`,
//! `SSH_PASS`, ...), and an optional YAML settings file. They are folded into a
//! single validated [`Settings`] value before any node is contacted.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::dispatch::DEFAULT_MAX_CONCURRENCY;
use crate::error::{FsloadError, Result};
use crate::executor::{Credential, SshOptions};
use crate::inventory::Inventory;
use crate::namenode::NameNodeLoad;
use crate::serde::string_or_list;
use crate::tools::Toolchain;

pub const DEFAULT_NAMENODE_DIR: &str = "/dfs/nn";
pub const DEFAULT_SERVICE_USER: &str = "hdfs";

#[derive(Parser, Debug)]
#[command(version, about = "Deploy a generated HDFS fsimage onto a NameNode and DataNodes")]
pub struct Config {
    #[command(subcommand)]
    pub action: Action,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Don't echo the output of remote commands
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Verify that every DataNode is reachable
    #[command(name = "check")]
    Check,
    /// Wipe and recreate the storage directories on every DataNode
    #[command(name = "format_dn")]
    FormatDn,
    /// Convert the XML fsimage and install it as the NameNode image on this host
    #[command(name = "load_fsgen_nn")]
    LoadFsgenNn { fsgen_dir: PathBuf },
    /// Load one DataNode's block directories
    #[command(name = "load_fsgen_dn")]
    LoadFsgenDn { fsgen_dir: PathBuf, node: String },
    /// Load every DataNode, one after another
    #[command(name = "load_fsgen_dns")]
    LoadFsgenDns { fsgen_dir: PathBuf },
    /// Load every DataNode, several at a time
    #[command(name = "load_fsgen_dns_par")]
    LoadFsgenDnsPar { fsgen_dir: PathBuf },
}

/// Settings that may be given on the command line or through the environment.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// YAML settings file
    #[arg(long, global = true, env = "FSLOAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Whitespace-separated list of DataNode hosts
    #[arg(long, global = true, env = "DATANODES")]
    pub datanodes: Option<String>,

    /// Whitespace-separated list of storage directories present on every DataNode
    #[arg(long, global = true, env = "STORAGE_DIRS")]
    pub storage_dirs: Option<String>,

    /// User to log in as on the DataNodes
    #[arg(long, global = true, env = "SSH_USER")]
    pub ssh_user: Option<String>,

    /// Password for SSH logins (read from the environment only)
    #[arg(skip)]
    pub ssh_pass: Option<String>,

    /// Skip SSH host key verification [default: true]
    #[arg(long, global = true, env = "INSECURE_SKIP_HOST_VERIFICATION")]
    pub insecure_skip_host_verification: Option<bool>,

    /// (load_fsgen_dns_par) Maximum number of DataNodes loaded at once [default: 5]
    #[arg(long, global = true, env = "MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    /// (load_fsgen_nn) NameNode storage directory [default: /dfs/nn]
    #[arg(long, global = true, env = "NAMENODE_DIR")]
    pub namenode_dir: Option<PathBuf>,

    /// Account that owns the loaded directories [default: hdfs]
    #[arg(long, global = true, env = "HDFS_USER")]
    pub service_user: Option<String>,
}

/// Contents of the YAML settings file.
///
/// Unknown keys are rejected, which also keeps passwords out of the file.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    #[serde(default, deserialize_with = "string_or_list")]
    pub datanodes: Option<Vec<String>>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub storage_dirs: Option<Vec<String>>,
    pub ssh_user: Option<String>,
    pub insecure_skip_host_verification: Option<bool>,
    pub max_concurrency: Option<usize>,
    pub namenode_dir: Option<PathBuf>,
    pub service_user: Option<String>,
}

impl FileSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FsloadError::config(format!("failed to open {}: {}", path.display(), e))
        })?;
        Self::parse(&contents).map_err(|e| {
            FsloadError::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document is a file with no settings in it.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }
}

/// Fully resolved and validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub inventory: Inventory,
    pub ssh: SshOptions,
    pub tools: Toolchain,
    pub max_concurrency: usize,
    pub namenode_dir: PathBuf,
    pub service_user: String,
}

impl Settings {
    /// Resolves settings from the process environment: the given overrides,
    /// `SSH_PASS`, the settings file if one is named, and `PATH`.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let mut overrides = overrides.clone();
        if overrides.ssh_pass.is_none() {
            overrides.ssh_pass = std::env::var("SSH_PASS").ok();
        }
        let file = match &overrides.config {
            Some(path) => FileSettings::load(path)?,
            None => FileSettings::default(),
        };
        let search_path = std::env::var_os("PATH");
        Self::resolve(&overrides, file, search_path.as_deref())
    }

    /// Folds overrides over file settings over defaults, then validates.
    ///
    /// Tools are located first so that a missing tool is reported before
    /// anything else.
    pub fn resolve(overrides: &Overrides, file: FileSettings, search_path: Option<&OsStr>) -> Result<Self> {
        let credential = Credential::from_password(overrides.ssh_pass.clone());
        let tools = Toolchain::locate(search_path, credential.is_password())?;

        let datanodes = overrides
            .datanodes
            .clone()
            .or_else(|| file.datanodes.map(|nodes| nodes.join(" ")));
        let storage_dirs = overrides
            .storage_dirs
            .clone()
            .or_else(|| file.storage_dirs.map(|dirs| dirs.join(" ")));
        let inventory = Inventory::resolve(datanodes.as_deref(), storage_dirs.as_deref())?;

        let max_concurrency = overrides
            .max_concurrency
            .or(file.max_concurrency)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY);
        if max_concurrency == 0 {
            return Err(FsloadError::config("max concurrency must be at least 1"));
        }

        let ssh_user = overrides
            .ssh_user
            .clone()
            .or(file.ssh_user)
            .filter(|user| !user.is_empty());
        let service_user = overrides
            .service_user
            .clone()
            .or(file.service_user)
            .unwrap_or_else(|| DEFAULT_SERVICE_USER.to_string());
        if service_user.is_empty() {
            return Err(FsloadError::config("the service user must not be empty"));
        }

        Ok(Self {
            inventory,
            ssh: SshOptions {
                user: ssh_user,
                credential,
                insecure_skip_host_verification: overrides
                    .insecure_skip_host_verification
                    .or(file.insecure_skip_host_verification)
                    .unwrap_or(true),
            },
            tools,
            max_concurrency,
            namenode_dir: overrides
                .namenode_dir
                .clone()
                .or(file.namenode_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_NAMENODE_DIR)),
            service_user,
        })
    }

    pub fn namenode_load(&self) -> NameNodeLoad {
        NameNodeLoad {
            hdfs: self.tools.hdfs.clone(),
            rsync: self.tools.rsync.clone(),
            namenode_dir: self.namenode_dir.clone(),
            service_user: self.service_user.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;

    fn tool_dir(with_sshpass: bool) -> (tempfile::TempDir, OsString) {
        let dir = tempfile::tempdir().unwrap();
        let mut names = vec!["ssh", "rsync", "hdfs"];
        if with_sshpass {
            names.push("sshpass");
        }
        for name in names {
            let path = dir.path().join(name);
            fs::write(&path, "#!/bin/sh\n").unwrap();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }
        }
        let path = std::env::join_paths([dir.path()]).unwrap();
        (dir, path)
    }

    fn overrides(datanodes: &str, storage_dirs: &str) -> Overrides {
        Overrides {
            datanodes: Some(datanodes.to_string()),
            storage_dirs: Some(storage_dirs.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_actions() {
        let config = Config::try_parse_from(["fsload", "check"]).unwrap();
        assert_eq!(config.action, Action::Check);

        let config = Config::try_parse_from(["fsload", "format_dn"]).unwrap();
        assert_eq!(config.action, Action::FormatDn);

        let config = Config::try_parse_from(["fsload", "load_fsgen_dn", "/tmp/fsgen", "h2"]).unwrap();
        assert_eq!(
            config.action,
            Action::LoadFsgenDn {
                fsgen_dir: PathBuf::from("/tmp/fsgen"),
                node: "h2".to_string(),
            }
        );

        let config = Config::try_parse_from(["fsload", "-q", "load_fsgen_dns_par", "/tmp/fsgen"]).unwrap();
        assert!(config.quiet);
        assert_eq!(
            config.action,
            Action::LoadFsgenDnsPar {
                fsgen_dir: PathBuf::from("/tmp/fsgen"),
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_action_and_missing_args() {
        assert!(Config::try_parse_from(["fsload", "load_everything"]).is_err());
        assert!(Config::try_parse_from(["fsload", "load_fsgen_dn", "/tmp/fsgen"]).is_err());
        assert!(Config::try_parse_from(["fsload"]).is_err());
    }

    #[test]
    fn test_parse_flags_after_action() {
        let config = Config::try_parse_from([
            "fsload",
            "check",
            "--datanodes",
            "h1 h2",
            "--max-concurrency",
            "2",
            "--insecure-skip-host-verification",
            "false",
        ])
        .unwrap();
        assert_eq!(config.overrides.datanodes.as_deref(), Some("h1 h2"));
        assert_eq!(config.overrides.max_concurrency, Some(2));
        assert_eq!(config.overrides.insecure_skip_host_verification, Some(false));
    }

    #[test]
    fn test_resolve_defaults() {
        let (_dir, path) = tool_dir(false);
        let settings = Settings::resolve(
            &overrides("h1 h2", "/dfs/dn1 /dfs/dn2"),
            FileSettings::default(),
            Some(path.as_os_str()),
        )
        .unwrap();
        assert_eq!(settings.inventory.nodes().len(), 2);
        assert_eq!(settings.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(settings.namenode_dir, PathBuf::from("/dfs/nn"));
        assert_eq!(settings.service_user, "hdfs");
        assert_eq!(settings.ssh.credential, Credential::Key);
        assert!(settings.ssh.insecure_skip_host_verification);
        assert!(settings.ssh.user.is_none());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let (_dir, path) = tool_dir(false);
        let file = FileSettings::parse(
            "datanodes: [f1, f2, f3]\nstorage_dirs: /data/1 /data/2\nssh_user: admin\nmax_concurrency: 8\n"
        )
        .unwrap();
        let mut overrides = Overrides {
            datanodes: Some("h1".to_string()),
            max_concurrency: Some(3),
            ..Default::default()
        };
        overrides.service_user = Some("dfs".to_string());
        let settings = Settings::resolve(&overrides, file, Some(path.as_os_str())).unwrap();
        let names: Vec<_> = settings
            .inventory
            .nodes()
            .iter()
            .map(|n| n.hostname.as_str())
            .collect();
        assert_eq!(names, vec!["h1"]);
        assert_eq!(settings.inventory.storage_dirs(), &["/data/1", "/data/2"]);
        assert_eq!(settings.ssh.user.as_deref(), Some("admin"));
        assert_eq!(settings.max_concurrency, 3);
        assert_eq!(settings.service_user, "dfs");
    }

    #[test]
    fn test_file_rejects_password() {
        let err = FileSettings::parse("datanodes: h1\nssh_pass: secret\n").unwrap_err();
        assert!(err.to_string().contains("ssh_pass"));
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(FileSettings::parse("").unwrap(), FileSettings::default());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = FileSettings::load(Path::new("/nonexistent/fsload.yaml")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let (_dir, path) = tool_dir(false);
        let mut overrides = overrides("h1", "/d");
        overrides.max_concurrency = Some(0);
        let err = Settings::resolve(&overrides, FileSettings::default(), Some(path.as_os_str())).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_password_switches_credential_and_needs_sshpass() {
        let (_dir, path) = tool_dir(false);
        let mut overrides = overrides("h1", "/d");
        overrides.ssh_pass = Some("hunter2".to_string());
        let err = Settings::resolve(&overrides, FileSettings::default(), Some(path.as_os_str())).unwrap_err();
        assert!(err.to_string().contains("sshpass"));

        let (_dir, path) = tool_dir(true);
        let settings = Settings::resolve(&overrides, FileSettings::default(), Some(path.as_os_str())).unwrap();
        assert!(settings.ssh.credential.is_password());
        assert!(settings.tools.sshpass.is_some());
    }

    #[test]
    fn test_missing_tool_reported_before_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let path = std::env::join_paths([dir.path()]).unwrap();
        let err = Settings::resolve(&Overrides::default(), FileSettings::default(), Some(path.as_os_str()))
            .unwrap_err();
        assert!(err.to_string().contains("'ssh'"), "{}", err);
    }
}

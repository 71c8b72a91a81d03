//! External tools fsload shells out to.
//!
//! All of them are located once, while settings are resolved, so a missing
//! tool stops the run before any node is contacted.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::{FsloadError, Result};

pub const SSH: &str = "ssh";
pub const RSYNC: &str = "rsync";
pub const HDFS: &str = "hdfs";
pub const SSHPASS: &str = "sshpass";

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub ssh: PathBuf,
    pub rsync: PathBuf,
    pub hdfs: PathBuf,
    /// Only located when a password is configured.
    pub sshpass: Option<PathBuf>,
}

impl Toolchain {
    /// Finds every required tool on `search_path` (a `PATH`-style list).
    pub fn locate(search_path: Option<&OsStr>, needs_sshpass: bool) -> Result<Self> {
        let ssh = find_tool(search_path, SSH)?;
        let rsync = find_tool(search_path, RSYNC)?;
        let hdfs = find_tool(search_path, HDFS)?;
        let sshpass = if needs_sshpass {
            Some(find_tool(search_path, SSHPASS).map_err(|_| {
                FsloadError::config(format!(
                    "SSH_PASS is set but '{}' was not found on PATH",
                    SSHPASS
                ))
            })?)
        } else {
            None
        };
        Ok(Self {
            ssh,
            rsync,
            hdfs,
            sshpass,
        })
    }
}

fn find_tool(search_path: Option<&OsStr>, name: &str) -> Result<PathBuf> {
    search_path
        .into_iter()
        .flat_map(|paths| std::env::split_paths(paths))
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| FsloadError::config(format!("required tool '{}' was not found on PATH", name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

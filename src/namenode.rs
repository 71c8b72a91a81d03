//! Loading the NameNode image.
//!
//! fsgen emits the namespace as XML next to a `name/current` skeleton. The XML
//! is converted in place with the offline image viewer, then the whole `name`
//! tree is mirrored into the NameNode storage directory on this host.

use std::path::{Path, PathBuf};

use log::info;

use crate::error::{FsloadError, Result};
use crate::executor::LocalRunner;
use crate::process::Invocation;

/// Name of the single image fsgen produces.
pub const FSIMAGE_NAME: &str = "fsimage_0000000000000000001";

#[derive(Debug, Clone)]
pub struct NameNodeLoad {
    /// The `hdfs` launcher.
    pub hdfs: PathBuf,
    /// The `rsync` binary, used for the local mirror copy.
    pub rsync: PathBuf,
    /// NameNode storage directory, e.g. `/dfs/nn`.
    pub namenode_dir: PathBuf,
    /// Account that must own the NameNode storage directory.
    pub service_user: String,
}

impl NameNodeLoad {
    pub fn xml_image(fsgen_root: &Path) -> PathBuf {
        fsgen_root.join(format!("{}.xml", FSIMAGE_NAME))
    }

    pub fn binary_image(fsgen_root: &Path) -> PathBuf {
        fsgen_root.join("name").join("current").join(FSIMAGE_NAME)
    }

    /// The commands that load `fsgen_root`, in the order they run.
    pub fn invocations(&self, fsgen_root: &Path) -> Vec<Invocation> {
        let namenode_dir = self.namenode_dir.to_string_lossy();
        vec![
            Invocation::new(&self.hdfs)
                .args(["oiv", "-p", "ReverseXML", "-i"])
                .arg(Self::xml_image(fsgen_root).to_string_lossy())
                .arg("-o")
                .arg(Self::binary_image(fsgen_root).to_string_lossy()),
            Invocation::new(&self.rsync)
                .args(["-a", "--delete"])
                .arg(format!("{}/", fsgen_root.join("name").to_string_lossy()))
                .arg(format!("{}/", namenode_dir.trim_end_matches('/'))),
            Invocation::new("chown")
                .args(["-R", self.service_user.as_str()])
                .arg(namenode_dir),
        ]
    }

    /// Checks the fsgen artifacts before anything is converted or copied.
    pub fn validate(fsgen_root: &Path) -> Result<()> {
        let xml = Self::xml_image(fsgen_root);
        if !xml.is_file() {
            return Err(FsloadError::config(format!(
                "failed to find the XML fsimage {}",
                xml.display()
            )));
        }
        let current = fsgen_root.join("name").join("current");
        if !current.is_dir() {
            return Err(FsloadError::config(format!(
                "failed to find the NameNode directory {}",
                current.display()
            )));
        }
        Ok(())
    }

    pub async fn run(&self, runner: &dyn LocalRunner, fsgen_root: &Path) -> Result<()> {
        Self::validate(fsgen_root)?;
        for invocation in self.invocations(fsgen_root) {
            info!("[localhost] {}", invocation);
            runner.run(invocation).await?;
        }
        info!(
            "[localhost] NameNode image loaded into {}",
            self.namenode_dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessOutput;
    use async_trait::async_trait;
    use std::os::unix::process::ExitStatusExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        ran: Mutex<Vec<String>>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl LocalRunner for RecordingRunner {
        async fn run(&self, invocation: Invocation) -> Result<ProcessOutput> {
            let mut ran = self.ran.lock().unwrap();
            ran.push(invocation.to_string());
            let code = if self.fail_on == Some(ran.len() - 1) { 1 } else { 0 };
            let status = std::process::ExitStatus::from_raw(code << 8);
            if code != 0 {
                return Err(FsloadError::RemoteExecution {
                    node: "localhost".into(),
                    command: invocation.to_string(),
                    status: status.to_string(),
                    output: String::new(),
                });
            }
            Ok(ProcessOutput {
                status,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn load() -> NameNodeLoad {
        NameNodeLoad {
            hdfs: PathBuf::from("/opt/hadoop/bin/hdfs"),
            rsync: PathBuf::from("/usr/bin/rsync"),
            namenode_dir: PathBuf::from("/dfs/nn"),
            service_user: "hdfs".to_string(),
        }
    }

    fn fsgen_output() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("name/current")).unwrap();
        std::fs::write(NameNodeLoad::xml_image(root.path()), "<fsimage></fsimage>").unwrap();
        root
    }

    #[test]
    fn test_invocations() {
        let root = Path::new("/tmp/fsgen");
        let rendered: Vec<String> = load()
            .invocations(root)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            rendered,
            vec![
                "/opt/hadoop/bin/hdfs oiv -p ReverseXML -i /tmp/fsgen/fsimage_0000000000000000001.xml -o /tmp/fsgen/name/current/fsimage_0000000000000000001",
                "/usr/bin/rsync -a --delete /tmp/fsgen/name/ /dfs/nn/",
                "chown -R hdfs /dfs/nn",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_xml_runs_nothing() {
        let root = fsgen_output();
        std::fs::remove_file(NameNodeLoad::xml_image(root.path())).unwrap();
        let runner = RecordingRunner::default();
        let err = load().run(&runner, root.path()).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(runner.ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_name_dir_runs_nothing() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(NameNodeLoad::xml_image(root.path()), "<fsimage/>").unwrap();
        let runner = RecordingRunner::default();
        assert!(load().run(&runner, root.path()).await.is_err());
        assert!(runner.ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_runs_all_steps_in_order() {
        let root = fsgen_output();
        let runner = RecordingRunner::default();
        load().run(&runner, root.path()).await.unwrap();
        let ran = runner.ran.lock().unwrap();
        assert_eq!(ran.len(), 3);
        assert!(ran[0].contains("oiv -p ReverseXML"));
        assert!(ran[1].contains("--delete"));
        assert!(ran[2].starts_with("chown -R hdfs"));
    }

    #[tokio::test]
    async fn test_failed_conversion_stops_the_load() {
        let root = fsgen_output();
        let runner = RecordingRunner {
            fail_on: Some(0),
            ..Default::default()
        };
        let err = load().run(&runner, root.path()).await.unwrap_err();
        assert!(matches!(err, FsloadError::RemoteExecution { .. }));
        assert_eq!(runner.ran.lock().unwrap().len(), 1);
    }
}

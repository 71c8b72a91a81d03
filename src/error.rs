use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsloadError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("{node}: '{command}' exited with {status}:\n{output}")]
    RemoteExecution {
        node: String,
        command: String,
        status: String,
        output: String,
    },
    #[error("Failed to execute local command: {0}")]
    LocalCommand(#[from] std::io::Error),
    #[error("Dispatch failed on node(s): {}", .failed.join(", "))]
    Dispatch { failed: Vec<String> },
}

impl FsloadError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T, E = FsloadError> = std::result::Result<T, E>;

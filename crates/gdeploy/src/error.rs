use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Every way a deploy run can fail, one variant per stage.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{0} must be set")]
    Usage(&'static str),

    #[error("failed to read input projects yaml file at path {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to unmarshal config: {0}")]
    Decode(#[source] serde_yaml::Error),

    #[error("failed to initialize config: {0}")]
    Init(#[source] ConfigError),

    #[error("failed to find project {0:?}")]
    ProjectNotFound(String),

    #[error("failed to deploy {project:?} resources: {cause:#}")]
    Deploy {
        project: String,
        cause: anyhow::Error,
    },
}

impl ApplyError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ApplyError::Usage(_) => crate::exitcode::USAGE,
            ApplyError::Read { .. } => crate::exitcode::NOINPUT,
            ApplyError::Decode(_) => crate::exitcode::DATAERR,
            ApplyError::Init(_) | ApplyError::ProjectNotFound(_) => crate::exitcode::CONFIG,
            ApplyError::Deploy { .. } => crate::exitcode::UNAVAILABLE,
        }
    }
}

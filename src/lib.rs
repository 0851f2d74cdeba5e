/// Expose all controller components used by main
pub mod controller;
pub use crate::controller::*;
pub mod apis;
pub mod backup;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::Metrics;
pub mod config;

#[cfg(test)]
pub mod fixtures;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    YamlSerializationError(#[source] serde_yaml::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Backup Error: {0}")]
    BackupError(#[from] backup::errors::BackupError),

    #[error("Metrics Error: {0}")]
    MetricsError(#[from] prometheus::Error),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::BackupError(e) if e.is_temporary() => "temporary".to_owned(),
            Error::BackupError(_) => "fatal".to_owned(),
            _ => format!("{self:?}").to_lowercase(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlSerializationError(err)
    }
}

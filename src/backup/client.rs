use super::errors::BackupError;
use crate::apis::{
    backup_types::{BackupOptions, BackupTransfer, MAX_CREATE_TIMEOUT_SECONDS},
    deployment_types::DatabaseDeployment,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};

/// Metadata of a backup stored on the deployment
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupMeta {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "datetime", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size_in_bytes: u64,
    #[serde(rename = "nrFiles", default)]
    pub number_of_files: u32,
    #[serde(rename = "nrDBServers", default)]
    pub number_of_db_servers: u32,
    #[serde(rename = "nrPiecesPresent", default)]
    pub number_of_pieces_present: u32,
    #[serde(default)]
    pub potentially_inconsistent: bool,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub keys: Vec<BackupKey>,
}

impl BackupMeta {
    /// Usable for restore: marked available and a piece present on every server
    pub fn is_consistent(&self) -> bool {
        self.available && self.number_of_pieces_present == self.number_of_db_servers
    }
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct BackupKey {
    pub sha256: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateOptions {
    pub timeout: Option<Duration>,
    pub allow_inconsistent: bool,
}

impl From<Option<&BackupOptions>> for CreateOptions {
    fn from(options: Option<&BackupOptions>) -> Self {
        let Some(options) = options else {
            return Self::default();
        };
        Self {
            timeout: options
                .timeout
                .filter(|t| t.is_finite() && *t > 0.0)
                .and_then(|t| Duration::try_from_secs_f32(t.min(MAX_CREATE_TIMEOUT_SECONDS)).ok()),
            allow_inconsistent: options.allow_inconsistent.unwrap_or(false),
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub id: String,
    #[serde(default)]
    pub potentially_inconsistent: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AsyncCreate {
    /// The create job is still running on the deployment
    InProgress { job_id: String },
    Done(CreateResponse),
}

/// State of an upload or download job
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransferProgress {
    /// Percentage of transferred files
    pub progress: u32,
    pub completed: bool,
    pub failed: bool,
    pub fail_message: String,
}

/// Backup operations against one deployment.
///
/// Not-found conditions are reported as 404 driver errors so callers can use
/// [`super::errors::is_not_found`].
#[async_trait]
pub trait BackupClient: Send + Sync {
    async fn create(&self, options: &CreateOptions) -> Result<CreateResponse, BackupError>;
    /// Starts an asynchronous create, or polls the job when `job_id` is given.
    async fn create_async(&self, options: &CreateOptions, job_id: Option<&str>) -> Result<AsyncCreate, BackupError>;
    async fn get(&self, id: &str) -> Result<BackupMeta, BackupError>;
    async fn list(&self) -> Result<BTreeMap<String, BackupMeta>, BackupError>;
    async fn upload(&self, id: &str, target: &BackupTransfer) -> Result<String, BackupError>;
    async fn download(&self, id: &str, source: &BackupTransfer) -> Result<String, BackupError>;
    async fn progress(&self, job_id: &str) -> Result<TransferProgress, BackupError>;
    async fn abort(&self, job_id: &str) -> Result<(), BackupError>;
    async fn exists(&self, id: &str) -> Result<bool, BackupError>;
    async fn delete(&self, id: &str) -> Result<(), BackupError>;
}

#[async_trait]
pub trait BackupClientFactory: Send + Sync {
    async fn client(&self, deployment: &DatabaseDeployment) -> Result<Box<dyn BackupClient>, BackupError>;
}

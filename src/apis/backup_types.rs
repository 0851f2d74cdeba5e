use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Longest create timeout passed on to the deployment
pub const MAX_CREATE_TIMEOUT_SECONDS: f32 = 86_400.0;

/// Longest delay between two retries of a failed operation
pub const MAX_BACKOFF_DELAY_SECONDS: i64 = 30 * 86_400;

/// Generate the Kubernetes wrapper struct `DatabaseBackup` from our Spec and Status struct
///
/// This provides a hook for generating the CRD yaml (in crdgen.rs)
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(kind = "DatabaseBackup", group = "coredb.io", version = "v1alpha1", namespaced)]
#[kube(status = "DatabaseBackupStatus", shortname = "dbbackup")]
#[kube(printcolumn = r#"{"name":"Deployment", "type":"string", "jsonPath":".spec.deployment.name"}"#)]
#[kube(printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#)]
#[kube(printcolumn = r#"{"name":"Available", "type":"boolean", "jsonPath":".status.available"}"#)]
#[kube(printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseBackupSpec {
    pub deployment: DeploymentRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BackupOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<BackupTransfer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<BackupDownload>,
    /// Name of the policy which generated this backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffSpec>,
    /// Time to live of the backup, e.g. `24h`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct DeploymentRef {
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupOptions {
    /// Timeout of the create call in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_inconsistent: Option<bool>,
}

/// Remote repository a backup is uploaded to
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupTransfer {
    #[serde(rename = "repositoryURL")]
    pub repository_url: String,
    #[serde(default)]
    pub credentials_secret_name: String,
}

/// Remote backup to restore into the deployment's backup store
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupDownload {
    #[serde(flatten)]
    pub transfer: BackupTransfer,
    pub id: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackoffSpec {
    /// Seconds before the first retry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay: Option<i64>,
    /// Upper bound of the retry delay in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<i64>,
    /// Number of retries over which the delay ramps from min to max
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<i64>,
    /// No retries are scheduled after this point in time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
pub enum BackupState {
    #[default]
    #[serde(rename = "")]
    None,
    Pending,
    Scheduled,
    Download,
    DownloadError,
    Downloading,
    Create,
    CreateError,
    Creating,
    Upload,
    Uploading,
    UploadError,
    Ready,
    Deleted,
    Failed,
    Unavailable,
}

impl BackupState {
    pub const ALL: [BackupState; 16] = [
        BackupState::None,
        BackupState::Pending,
        BackupState::Scheduled,
        BackupState::Download,
        BackupState::DownloadError,
        BackupState::Downloading,
        BackupState::Create,
        BackupState::CreateError,
        BackupState::Creating,
        BackupState::Upload,
        BackupState::Uploading,
        BackupState::UploadError,
        BackupState::Ready,
        BackupState::Deleted,
        BackupState::Failed,
        BackupState::Unavailable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupState::None => "None",
            BackupState::Pending => "Pending",
            BackupState::Scheduled => "Scheduled",
            BackupState::Download => "Download",
            BackupState::DownloadError => "DownloadError",
            BackupState::Downloading => "Downloading",
            BackupState::Create => "Create",
            BackupState::CreateError => "CreateError",
            BackupState::Creating => "Creating",
            BackupState::Upload => "Upload",
            BackupState::Uploading => "Uploading",
            BackupState::UploadError => "UploadError",
            BackupState::Ready => "Ready",
            BackupState::Deleted => "Deleted",
            BackupState::Failed => "Failed",
            BackupState::Unavailable => "Unavailable",
        }
    }
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status object of `DatabaseBackup`
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseBackupStatus {
    #[serde(default)]
    pub state: BackupState,
    /// Time of the last state change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<BackupProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupDetails>,
    #[serde(default)]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffStatus>,
}

/// Outstanding asynchronous job on the deployment
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupProgress {
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub progress: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupDetails {
    pub id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size_in_bytes: u64,
    #[serde(default)]
    pub number_of_db_servers: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potentially_inconsistent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported: Option<bool>,
    /// Content hashes of the backup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackoffStatus {
    #[serde(default)]
    pub iterations: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<DateTime<Utc>>,
}

#[derive(Error, Debug, PartialEq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl DatabaseBackupSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.deployment.name.is_empty() {
            return Err(ValidationError("deployment name can not be empty".into()));
        }
        if let Some(timeout) = self.options.as_ref().and_then(|o| o.timeout) {
            if !timeout.is_finite() || timeout > MAX_CREATE_TIMEOUT_SECONDS {
                return Err(ValidationError(format!(
                    "options timeout must be a number of seconds up to {MAX_CREATE_TIMEOUT_SECONDS}"
                )));
            }
        }
        if let Some(backoff) = &self.backoff {
            let too_long = |d: Option<i64>| d.is_some_and(|d| d > MAX_BACKOFF_DELAY_SECONDS);
            if too_long(backoff.min_delay) || too_long(backoff.max_delay) {
                return Err(ValidationError(format!(
                    "backoff delays can not exceed {MAX_BACKOFF_DELAY_SECONDS} seconds"
                )));
            }
        }
        if let Some(upload) = &self.upload {
            if upload.repository_url.is_empty() {
                return Err(ValidationError("upload repositoryURL can not be empty".into()));
            }
        }
        if let Some(download) = &self.download {
            if download.transfer.repository_url.is_empty() {
                return Err(ValidationError("download repositoryURL can not be empty".into()));
            }
            if download.id.is_empty() {
                return Err(ValidationError("download id can not be empty".into()));
            }
        }
        Ok(())
    }
}

impl DatabaseBackup {
    pub fn state(&self) -> BackupState {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }

    /// Remote backup id recorded in the status
    pub fn backup_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.backup.as_ref())
            .map(|b| b.id.as_str())
    }
}

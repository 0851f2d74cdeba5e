//! Per-state handlers. Each one reads the backup, talks to the deployment when it
//! has to, and proposes the next status without writing it.
mod create;
mod deleted;
mod download;
mod failed;
mod pending;
mod ready;
mod upload;

use super::{
    client::BackupClient,
    errors::BackupError,
    handler::Handler,
    status::StatusBuilder,
};
use crate::apis::{
    backup_types::{BackupState, DatabaseBackup, DatabaseBackupStatus},
    deployment_types::DatabaseDeployment,
};
use kube::ResourceExt;

impl Handler {
    pub(crate) async fn dispatch(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        match backup.state() {
            BackupState::None => self.state_none(backup).await,
            BackupState::Pending => self.state_pending(backup).await,
            BackupState::Scheduled => self.state_scheduled(backup).await,
            BackupState::Create => self.state_create(backup).await,
            BackupState::Creating => self.state_creating(backup).await,
            BackupState::CreateError => self.state_create_error(backup).await,
            BackupState::Download => self.state_download(backup).await,
            BackupState::Downloading => self.state_downloading(backup).await,
            BackupState::DownloadError => self.state_download_error(backup).await,
            BackupState::Upload => self.state_upload(backup).await,
            BackupState::Uploading => self.state_uploading(backup).await,
            BackupState::UploadError => self.state_upload_error(backup).await,
            BackupState::Ready => self.state_ready(backup).await,
            BackupState::Unavailable => self.state_unavailable(backup).await,
            BackupState::Deleted => self.state_deleted(backup).await,
            BackupState::Failed => self.state_failed(backup).await,
        }
    }

    pub(crate) async fn deployment_for(&self, backup: &DatabaseBackup) -> Result<DatabaseDeployment, BackupError> {
        let ns = backup.namespace().unwrap_or_default();
        let name = &backup.spec.deployment.name;
        if name.is_empty() {
            return Err(BackupError::fatal(format!(
                "deployment ref is not specified for backup {}/{}",
                ns,
                backup.name_any()
            )));
        }
        match self.deployments.get(&ns, name).await {
            Ok(Some(deployment)) => Ok(deployment),
            Ok(None) => Err(BackupError::fatal(format!("DatabaseDeployment \"{name}\" not found"))),
            Err(e) => Err(BackupError::temporary(e)),
        }
    }

    pub(crate) async fn client_for(&self, backup: &DatabaseBackup) -> Result<Box<dyn BackupClient>, BackupError> {
        let deployment = self.deployment_for(backup).await?;
        self.clients
            .client(&deployment)
            .await
            .map_err(BackupError::temporary)
    }

    /// Backups visible to this handler; `None` lists the configured scope
    pub(crate) async fn list_backups(&self, namespace: Option<&str>) -> Result<Vec<DatabaseBackup>, BackupError> {
        let namespace = namespace.or(self.config.namespace.as_deref());
        self.backups.list(namespace).await.map_err(BackupError::temporary)
    }
}

/// Same namespace and name
pub(crate) fn same_object(a: &DatabaseBackup, b: &DatabaseBackup) -> bool {
    a.namespace() == b.namespace() && a.name_any() == b.name_any()
}

/// Another backup of the same deployment
pub(crate) fn is_sibling(backup: &DatabaseBackup, other: &DatabaseBackup) -> bool {
    !same_object(backup, other)
        && backup.namespace() == other.namespace()
        && backup.spec.deployment.name == other.spec.deployment.name
}

/// Shared logic of the `*Error` states: wait for the backoff, then go back to `retry`
pub(crate) fn retry_after_backoff(
    backup: &DatabaseBackup,
    retry: BackupState,
    operation: &str,
) -> DatabaseBackupStatus {
    let current = backup.status.clone().unwrap_or_default();
    let backoff = current.backoff.clone().unwrap_or_default();
    if !backoff.should_backoff(backup.spec.backoff.as_ref()) {
        return StatusBuilder::new(Some(&current))
            .state(BackupState::Failed, format!("out of {operation} retries"))
            .clear_progress()
            .build();
    }
    if !backoff.should_retry() {
        return current;
    }
    StatusBuilder::new(Some(&current))
        .state(retry, "")
        .clear_progress()
        .build()
}

pub(crate) fn missing_field(field: &str) -> BackupError {
    BackupError::fatal(format!("missing field {field}"))
}

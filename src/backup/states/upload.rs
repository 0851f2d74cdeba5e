use super::{missing_field, retry_after_backoff};
use crate::{
    apis::backup_types::{BackupState, DatabaseBackup, DatabaseBackupStatus},
    backup::{errors::BackupError, handler::Handler, status::StatusBuilder},
};
use tracing::*;

impl Handler {
    pub(crate) async fn state_upload(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        let client = self.client_for(backup).await?;
        let details = backup
            .status
            .as_ref()
            .and_then(|s| s.backup.as_ref())
            .ok_or_else(|| missing_field(".status.backup"))?;

        let meta = match client.get(&details.id).await {
            Ok(meta) => meta,
            Err(err) if err.is_not_found() => {
                return Ok(StatusBuilder::from_backup(backup)
                    .state(BackupState::Deleted, "")
                    .available(false)
                    .build())
            }
            Err(err) => return Err(BackupError::temporary(err)),
        };

        let result = match backup.spec.upload.as_ref() {
            Some(target) => client.upload(&meta.id, target).await,
            None => Err(BackupError::fatal("upload was called but no upload spec was given")),
        };
        match result {
            Ok(job_id) => Ok(StatusBuilder::from_backup(backup)
                .state(BackupState::Uploading, "")
                .progress(job_id, "0%")
                .available(true)
                .build()),
            Err(err) => Ok(upload_failed(backup, format!("Upload failed with error: {err}"))),
        }
    }

    pub(crate) async fn state_uploading(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        let job_id = backup
            .status
            .as_ref()
            .and_then(|s| s.progress.as_ref())
            .map(|p| p.job_id.clone())
            .ok_or_else(|| missing_field(".status.progress"))?;
        let client = self.client_for(backup).await?;

        if backup.spec.upload.is_none() {
            if let Err(err) = client.abort(&job_id).await {
                warn!("Unable to abort upload job {}: {}", job_id, err);
                return Ok(StatusBuilder::from_backup(backup).available(true).build());
            }
            return Ok(StatusBuilder::from_backup(backup)
                .state(BackupState::Ready, "")
                .clear_progress()
                .uploaded(None)
                .available(true)
                .build());
        }

        let details = match client.progress(&job_id).await {
            Ok(details) => details,
            Err(err) if err.is_not_found() => {
                return Ok(upload_failed(
                    backup,
                    format!("job with id {job_id} does not exist anymore"),
                ))
            }
            Err(err) => return Err(BackupError::temporary(err)),
        };

        if details.failed {
            return Ok(upload_failed(
                backup,
                format!("Upload failed with error: {}", details.fail_message),
            ));
        }

        if details.completed {
            return Ok(StatusBuilder::from_backup(backup)
                .state(BackupState::Ready, "")
                .clear_progress()
                .uploaded(Some(true))
                .available(true)
                .clear_backoff()
                .build());
        }

        Ok(StatusBuilder::from_backup(backup)
            .available(true)
            .progress(job_id, format!("{}%", details.progress))
            .build())
    }

    pub(crate) async fn state_upload_error(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        Ok(retry_after_backoff(backup, BackupState::Ready, "Upload"))
    }
}

fn upload_failed(backup: &DatabaseBackup, message: String) -> DatabaseBackupStatus {
    StatusBuilder::from_backup(backup)
        .state(BackupState::UploadError, message)
        .clear_progress()
        .available(true)
        .add_backoff(backup.spec.backoff.as_ref())
        .build()
}

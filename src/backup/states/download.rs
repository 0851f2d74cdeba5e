use super::{missing_field, retry_after_backoff};
use crate::{
    apis::backup_types::{BackupDownload, BackupState, DatabaseBackup, DatabaseBackupStatus},
    backup::{errors::BackupError, handler::Handler, status::StatusBuilder},
};

impl Handler {
    pub(crate) async fn state_download(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        let download = download_spec(backup)?;
        let client = self.client_for(backup).await?;
        match client.download(&download.id, &download.transfer).await {
            Ok(job_id) => Ok(StatusBuilder::from_backup(backup)
                .state(BackupState::Downloading, "")
                .progress(job_id, "0%")
                .build()),
            Err(err) => Ok(download_failed(backup, format!("Download failed with error: {err}"))),
        }
    }

    pub(crate) async fn state_downloading(
        &self,
        backup: &DatabaseBackup,
    ) -> Result<DatabaseBackupStatus, BackupError> {
        let download = download_spec(backup)?;
        let job_id = backup
            .status
            .as_ref()
            .and_then(|s| s.progress.as_ref())
            .map(|p| p.job_id.clone())
            .ok_or_else(|| missing_field(".status.progress"))?;
        let client = self.client_for(backup).await?;

        let details = match client.progress(&job_id).await {
            Ok(details) => details,
            Err(err) if err.is_not_found() => {
                return Ok(download_failed(
                    backup,
                    format!("job with id {job_id} does not exist anymore"),
                ))
            }
            Err(err) => return Err(BackupError::temporary(err)),
        };

        if details.failed {
            return Ok(download_failed(
                backup,
                format!("Download failed with error: {}", details.fail_message),
            ));
        }

        if details.completed {
            let meta = client.get(&download.id).await.map_err(BackupError::fatal)?;
            return Ok(StatusBuilder::from_backup(backup)
                .state(BackupState::Ready, "")
                .clear_progress()
                .meta(&meta)
                .downloaded(Some(true))
                .available(true)
                .clear_backoff()
                .build());
        }

        Ok(StatusBuilder::from_backup(backup)
            .state(BackupState::Downloading, "")
            .progress(job_id, format!("{}%", details.progress))
            .build())
    }

    pub(crate) async fn state_download_error(
        &self,
        backup: &DatabaseBackup,
    ) -> Result<DatabaseBackupStatus, BackupError> {
        Ok(retry_after_backoff(backup, BackupState::Pending, "Download"))
    }
}

fn download_spec(backup: &DatabaseBackup) -> Result<&BackupDownload, BackupError> {
    backup
        .spec
        .download
        .as_ref()
        .ok_or_else(|| missing_field(".spec.download"))
}

fn download_failed(backup: &DatabaseBackup, message: String) -> DatabaseBackupStatus {
    StatusBuilder::from_backup(backup)
        .state(BackupState::DownloadError, message)
        .clear_progress()
        .add_backoff(backup.spec.backoff.as_ref())
        .build()
}

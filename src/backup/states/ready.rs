use super::{missing_field, same_object};
use crate::{
    apis::backup_types::{BackupState, DatabaseBackup, DatabaseBackupStatus},
    backup::{errors::BackupError, handler::Handler, status::StatusBuilder},
};
use kube::ResourceExt;
use tracing::*;

pub(crate) const UPLOAD_QUEUED_SAME_BACKUP: &str = "Upload queued, backup is already being uploaded";
pub(crate) const UPLOAD_QUEUED_CAPACITY: &str = "Upload queued, waiting for a free upload slot";

impl Handler {
    pub(crate) async fn state_ready(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        self.refresh(backup, BackupState::Ready).await
    }

    pub(crate) async fn state_unavailable(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        self.refresh(backup, BackupState::Unavailable).await
    }

    /// Re-reads the remote metadata of a created backup
    async fn refresh(&self, backup: &DatabaseBackup, current: BackupState) -> Result<DatabaseBackupStatus, BackupError> {
        let client = self.client_for(backup).await?;
        let details = backup
            .status
            .as_ref()
            .and_then(|s| s.backup.as_ref())
            .ok_or_else(|| missing_field(".status.backup"))?;
        let builder = StatusBuilder::from_backup(backup);

        let meta = match client.get(&details.id).await {
            Ok(meta) => meta,
            Err(err) if err.is_not_found() => {
                return Ok(builder.state(BackupState::Deleted, "").available(false).build());
            }
            Err(err) => {
                warn!("Unable to refresh backup {} of {}: {}", details.id, backup.name_any(), err);
                return Ok(builder.available(current == BackupState::Ready).build());
            }
        };

        if !meta.is_consistent() {
            return Ok(builder
                .state(BackupState::Unavailable, "")
                .meta(&meta)
                .available(false)
                .build());
        }

        // Unavailable backups recover to Ready before an upload is considered
        if current == BackupState::Ready && backup.spec.upload.is_some() && details.uploaded != Some(true) {
            let builder = builder.meta(&meta).available(true);
            return Ok(match self.upload_queued(backup, &details.id).await? {
                Some(reason) => builder.state(BackupState::Ready, reason).build(),
                None => builder.state(BackupState::Upload, "").build(),
            });
        }

        if backup.spec.upload.is_none() && details.uploaded.is_some() {
            return Ok(builder
                .state(BackupState::Ready, "")
                .meta(&meta)
                .uploaded(None)
                .available(true)
                .build());
        }

        Ok(builder
            .state(BackupState::Ready, "")
            .meta(&meta)
            .available(true)
            .build())
    }

    /// Reason to hold back an upload, if any
    async fn upload_queued(&self, backup: &DatabaseBackup, id: &str) -> Result<Option<&'static str>, BackupError> {
        let backups = self.list_backups(None).await?;
        let uploading: Vec<&DatabaseBackup> = backups
            .iter()
            .filter(|other| !same_object(backup, other))
            .filter(|other| matches!(other.state(), BackupState::Upload | BackupState::Uploading))
            .collect();

        if uploading.iter().any(|other| other.backup_id() == Some(id)) {
            return Ok(Some(UPLOAD_QUEUED_SAME_BACKUP));
        }
        if uploading.len() >= self.config.concurrent_uploads {
            return Ok(Some(UPLOAD_QUEUED_CAPACITY));
        }
        Ok(None)
    }
}

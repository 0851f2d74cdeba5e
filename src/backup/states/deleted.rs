use crate::{
    apis::backup_types::{BackupState, DatabaseBackup, DatabaseBackupStatus},
    backup::{errors::BackupError, handler::Handler, status::StatusBuilder},
};
use tracing::*;

impl Handler {
    /// Watches for the remote backup to come back
    pub(crate) async fn state_deleted(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        let builder = StatusBuilder::from_backup(backup);
        let Some(id) = backup.backup_id() else {
            return Ok(builder.state(BackupState::Deleted, "").available(false).build());
        };
        let client = self.client_for(backup).await?;
        match client.get(id).await {
            Ok(meta) => Ok(builder
                .state(BackupState::Ready, "")
                .meta(&meta)
                .available(true)
                .build()),
            Err(err) if err.is_not_found() => {
                Ok(builder.state(BackupState::Deleted, "").available(false).build())
            }
            Err(err) => {
                debug!("Unable to look up deleted backup {}: {}", id, err);
                Ok(builder.available(false).build())
            }
        }
    }
}

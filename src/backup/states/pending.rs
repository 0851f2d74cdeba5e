use super::is_sibling;
use crate::{
    apis::backup_types::{BackupState, DatabaseBackup, DatabaseBackupStatus},
    backup::{errors::BackupError, handler::Handler, status::StatusBuilder},
};
use kube::ResourceExt;

/// States in which a backup occupies its deployment
const IN_PROGRESS: [BackupState; 5] = [
    BackupState::Scheduled,
    BackupState::Create,
    BackupState::Creating,
    BackupState::Download,
    BackupState::Downloading,
];

impl Handler {
    pub(crate) async fn state_none(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        self.deployment_for(backup).await?;
        Ok(StatusBuilder::from_backup(backup)
            .state(BackupState::Pending, "")
            .build())
    }

    pub(crate) async fn state_pending(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        self.deployment_for(backup).await?;

        let ns = backup.namespace().unwrap_or_default();
        let running = self
            .list_backups(Some(&ns))
            .await?
            .iter()
            .filter(|other| is_sibling(backup, other) && IN_PROGRESS.contains(&other.state()))
            .count();

        if running > 0 {
            return Ok(StatusBuilder::from_backup(backup)
                .state(BackupState::Pending, "backup already in process")
                .build());
        }
        Ok(StatusBuilder::from_backup(backup)
            .state(BackupState::Scheduled, "")
            .build())
    }

    pub(crate) async fn state_scheduled(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        let next = if backup.spec.download.is_some() {
            BackupState::Download
        } else {
            BackupState::Create
        };
        Ok(StatusBuilder::from_backup(backup).state(next, "").build())
    }
}

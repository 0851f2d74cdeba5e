use crate::{
    apis::backup_types::{DatabaseBackup, DatabaseBackupStatus},
    backup::{errors::BackupError, handler::Handler},
};

impl Handler {
    /// Failed backups wait for an operator to move them back to Pending
    pub(crate) async fn state_failed(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        Ok(backup.status.clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        apis::backup_types::{BackupState, DatabaseBackup},
        fixtures::TestEnv,
    };

    #[tokio::test]
    async fn failed_is_left_alone() {
        let env = TestEnv::new();
        let backup = DatabaseBackup::test().with_state(BackupState::Failed);
        let status = env.handler.dispatch(&backup).await.unwrap();
        assert_eq!(Some(status), backup.status);
        assert!(env.clients.calls().is_empty());
    }
}

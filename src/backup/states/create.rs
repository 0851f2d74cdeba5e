use super::{missing_field, retry_after_backoff};
use crate::{
    apis::backup_types::{BackupState, DatabaseBackup, DatabaseBackupStatus},
    backup::{
        client::{AsyncCreate, BackupClient, CreateOptions, CreateResponse},
        errors::BackupError,
        handler::Handler,
        status::StatusBuilder,
    },
};

/// Progress reported while the deployment runs an asynchronous create
const CREATING_PROGRESS: &str = "50%";

impl Handler {
    pub(crate) async fn state_create(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        if self.config.async_create {
            return self.create_async(backup, None).await;
        }
        let client = self.client_for(backup).await?;
        let options = CreateOptions::from(backup.spec.options.as_ref());
        match client.create(&options).await {
            Ok(response) => created(backup, client.as_ref(), response).await,
            Err(err) => Ok(create_failed(backup, format!("Create failed with error: {err}"))),
        }
    }

    pub(crate) async fn state_creating(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        let job_id = backup
            .status
            .as_ref()
            .and_then(|s| s.progress.as_ref())
            .map(|p| p.job_id.clone())
            .ok_or_else(|| missing_field(".status.progress"))?;
        self.create_async(backup, Some(&job_id)).await
    }

    pub(crate) async fn state_create_error(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        Ok(retry_after_backoff(backup, BackupState::Create, "Create"))
    }

    async fn create_async(
        &self,
        backup: &DatabaseBackup,
        job_id: Option<&str>,
    ) -> Result<DatabaseBackupStatus, BackupError> {
        let client = self.client_for(backup).await?;
        let options = CreateOptions::from(backup.spec.options.as_ref());
        match client.create_async(&options, job_id).await {
            Ok(AsyncCreate::InProgress { job_id }) => Ok(StatusBuilder::from_backup(backup)
                .state(BackupState::Creating, "")
                .progress(job_id, CREATING_PROGRESS)
                .available(false)
                .build()),
            Ok(AsyncCreate::Done(response)) => created(backup, client.as_ref(), response).await,
            Err(err) if job_id.is_some() && err.is_not_found() => Ok(create_failed(
                backup,
                format!("job with id {} does not exist anymore", job_id.unwrap_or_default()),
            )),
            Err(err) => Ok(create_failed(backup, format!("Create failed with error: {err}"))),
        }
    }
}

async fn created(
    backup: &DatabaseBackup,
    client: &dyn BackupClient,
    response: CreateResponse,
) -> Result<DatabaseBackupStatus, BackupError> {
    let meta = match client.get(&response.id).await {
        Ok(meta) => meta,
        Err(err) if err.is_not_found() => {
            return Ok(StatusBuilder::from_backup(backup)
                .state(BackupState::Failed, "backup is not present after creation")
                .clear_progress()
                .build())
        }
        Err(err) => return Err(BackupError::fatal(err)),
    };
    Ok(StatusBuilder::from_backup(backup)
        .state(BackupState::Ready, "")
        .clear_progress()
        .meta(&meta)
        .potentially_inconsistent(response.potentially_inconsistent)
        .available(true)
        .clear_backoff()
        .build())
}

fn create_failed(backup: &DatabaseBackup, message: String) -> DatabaseBackupStatus {
    StatusBuilder::from_backup(backup)
        .state(BackupState::CreateError, message)
        .clear_progress()
        .available(false)
        .add_backoff(backup.spec.backoff.as_ref())
        .build()
}

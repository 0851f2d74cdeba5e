use super::{
    errors::BackupError,
    events::REASON_FINALIZER_CHANGE,
    handler::{Handler, BACKUP_FINALIZER},
};
use crate::apis::backup_types::DatabaseBackup;
use kube::{Resource, ResourceExt};
use tracing::*;

impl Handler {
    /// Cleans up the remote artifact and releases our finalizer
    pub(crate) async fn finalize(&self, backup: &DatabaseBackup) -> Result<(), BackupError> {
        if !backup.finalizers().iter().any(|f| f == BACKUP_FINALIZER) {
            return Ok(());
        }

        self.finalize_backup(backup).await?;

        let mut updated = backup.clone();
        updated.finalizers_mut().retain(|f| f != BACKUP_FINALIZER);
        self.events.normal(
            backup,
            REASON_FINALIZER_CHANGE,
            format!("Removed Finalizer: {BACKUP_FINALIZER}"),
        );
        self.backups.update(&updated).await?;
        Ok(())
    }

    async fn finalize_backup(&self, backup: &DatabaseBackup) -> Result<(), BackupError> {
        let Some(id) = backup.backup_id() else {
            return Ok(());
        };
        let deployment_name = &backup.spec.deployment.name;
        if deployment_name.is_empty() {
            return Ok(());
        }
        let ns = backup.namespace().unwrap_or_default();
        let _guard = self.locks.lock(&ns, deployment_name).await;

        let Some(deployment) = self.deployments.get(&ns, deployment_name).await? else {
            debug!("DatabaseDeployment {}/{} is gone, nothing to clean up", ns, deployment_name);
            return Ok(());
        };

        let siblings = self.backups.list(Some(&ns)).await?;
        let shared = siblings.iter().any(|other| {
            other.name_any() != backup.name_any()
                && other.meta().deletion_timestamp.is_none()
                && other.backup_id() == Some(id)
        });
        if shared {
            info!("Backup {} is still referenced by another DatabaseBackup, keeping it", id);
            return Ok(());
        }

        let client = self.clients.client(&deployment).await?;

        if let Some(progress) = backup.status.as_ref().and_then(|s| s.progress.as_ref()) {
            match client.progress(&progress.job_id).await {
                Ok(p) if !p.completed && !p.failed => {
                    if let Err(e) = client.abort(&progress.job_id).await {
                        warn!("Unable to abort job {} of backup {}: {}", progress.job_id, id, e);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Unable to fetch progress of job {}: {}", progress.job_id, e),
            }
        }

        if client.exists(id).await? {
            info!("Deleting backup {} from DatabaseDeployment {}/{}", id, ns, deployment_name);
            client.delete(id).await?;
        }
        Ok(())
    }
}

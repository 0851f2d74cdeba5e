use super::{
    client::BackupClientFactory,
    errors::{switch_error, BackupError},
    events::{EventRecorder, REASON_STATE_CHANGE},
    item::Item,
    locks::DeploymentLocks,
    state::STATE_MAP,
    status::StatusBuilder,
    store::{BackupStore, DeploymentStore},
};
use crate::apis::backup_types::{BackupState, DatabaseBackup, DatabaseBackupStatus};
use kube::{Resource, ResourceExt};
use std::{sync::Arc, time::Duration};
use tracing::*;

pub static BACKUP_FINALIZER: &str = "databasebackups.coredb.io";

/// Finalizers every backup carries before it is processed
pub static DEFAULT_FINALIZERS: [&str; 1] = [BACKUP_FINALIZER];

#[derive(Clone, Debug)]
pub struct HandlerConfig {
    /// Uploads allowed to run at the same time across all deployments
    pub concurrent_uploads: usize,
    /// Create backups through the deployment's async job API
    pub async_create: bool,
    /// Restricts sibling lookups to one namespace
    pub namespace: Option<String>,
    pub status_update_attempts: u32,
    pub status_update_delay: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            concurrent_uploads: 4,
            async_create: false,
            namespace: None,
            status_update_attempts: 25,
            status_update_delay: Duration::from_secs(1),
        }
    }
}

/// Result of one reconciliation pass
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The object is gone or was finalized
    Done,
    /// Metadata was written, the object needs another pass
    Requeue,
    /// Status after the pass, `changed` when it was written
    Status {
        status: DatabaseBackupStatus,
        changed: bool,
    },
}

pub struct Handler {
    pub(crate) backups: Arc<dyn BackupStore>,
    pub(crate) deployments: Arc<dyn DeploymentStore>,
    pub(crate) clients: Arc<dyn BackupClientFactory>,
    pub(crate) events: Arc<dyn EventRecorder>,
    pub(crate) locks: Arc<DeploymentLocks>,
    pub(crate) config: HandlerConfig,
}

impl Handler {
    pub fn new(
        backups: Arc<dyn BackupStore>,
        deployments: Arc<dyn DeploymentStore>,
        clients: Arc<dyn BackupClientFactory>,
        events: Arc<dyn EventRecorder>,
        config: HandlerConfig,
    ) -> Self {
        Self {
            backups,
            deployments,
            clients,
            events,
            locks: Arc::new(DeploymentLocks::new()),
            config,
        }
    }

    pub fn can_be_handled(&self, item: &Item) -> bool {
        item.group == DatabaseBackup::group(&())
            && item.version == DatabaseBackup::version(&())
            && item.kind == DatabaseBackup::kind(&())
    }

    #[instrument(skip(self), fields(item = %item))]
    pub async fn handle(&self, item: &Item) -> Result<Outcome, BackupError> {
        let Some(backup) = self.backups.get(&item.namespace, &item.name).await? else {
            debug!("DatabaseBackup {}/{} no longer exists", item.namespace, item.name);
            return Ok(Outcome::Done);
        };

        if backup.meta().deletion_timestamp.is_some() {
            self.finalize(&backup).await?;
            return Ok(Outcome::Done);
        }

        if !has_finalizers(&backup) {
            let mut backup = backup;
            append_finalizers(&mut backup);
            self.backups.update(&backup).await?;
            return Ok(Outcome::Requeue);
        }

        let ns = backup.namespace().unwrap_or_default();
        let _guard = self.locks.lock(&ns, &backup.spec.deployment.name).await;

        // Another writer may have changed the object while we waited for the lock
        let Some(backup) = self.backups.get(&item.namespace, &item.name).await? else {
            return Ok(Outcome::Done);
        };
        if backup.meta().deletion_timestamp.is_some() {
            return Ok(Outcome::Requeue);
        }

        let backup = self.ensure_owner(backup).await?;
        let old = backup.status.clone().unwrap_or_default();
        let status = self.process(&backup).await?;

        if status == old {
            return Ok(Outcome::Status { status, changed: false });
        }

        STATE_MAP
            .transit(old.state, status.state)
            .map_err(BackupError::fatal)?;

        if old.state != status.state {
            self.emit_state_change(&backup, old.state, &status);
        }

        self.update_backup_status(&backup, &status).await?;
        Ok(Outcome::Status { status, changed: true })
    }

    async fn ensure_owner(&self, backup: DatabaseBackup) -> Result<DatabaseBackup, BackupError> {
        if !backup.owner_references().is_empty() {
            return Ok(backup);
        }
        let ns = backup.namespace().unwrap_or_default();
        let deployment = match self.deployments.get(&ns, &backup.spec.deployment.name).await {
            Ok(Some(deployment)) => deployment,
            _ => return Ok(backup),
        };
        let Some(owner) = deployment.controller_owner_ref(&()) else {
            return Ok(backup);
        };
        let mut backup = backup;
        backup.owner_references_mut().push(owner);
        let mut updated = self.backups.update(&backup).await?;
        // replace does not return the status subresource
        if updated.status.is_none() {
            updated.status = backup.status;
        }
        Ok(updated)
    }

    /// Runs the handler for the current state and folds fatal errors into `Failed`
    async fn process(&self, backup: &DatabaseBackup) -> Result<DatabaseBackupStatus, BackupError> {
        let state = backup.state();
        if let Err(err) = backup.spec.validate() {
            return Ok(failed(backup, state, &err.to_string()));
        }
        match self.dispatch(backup).await {
            Ok(status) => Ok(status),
            Err(err) => match switch_error(err) {
                err @ BackupError::Temporary(_) => {
                    warn!("Temporary error for DatabaseBackup {}: {}", backup.name_any(), err);
                    Err(err)
                }
                err => Ok(failed(backup, state, &err.to_string())),
            },
        }
    }

    fn emit_state_change(&self, backup: &DatabaseBackup, from: BackupState, status: &DatabaseBackupStatus) {
        let to = status.state;
        if to == BackupState::Failed {
            self.events.warning(
                backup,
                REASON_STATE_CHANGE,
                format!("Transiting from {from} to {to} with error: {}", status.message),
            );
        } else if status.message.is_empty() {
            self.events
                .normal(backup, REASON_STATE_CHANGE, format!("Transiting from {from} to {to}"));
        } else {
            self.events.normal(
                backup,
                REASON_STATE_CHANGE,
                format!("Transiting from {from} to {to} with message: {}", status.message),
            );
        }
        info!("DatabaseBackup {} transiting from {} to {}", backup.name_any(), from, to);
    }

    /// Writes the status on a fresh copy of the object, retrying on conflicts
    pub(crate) async fn update_backup_status(
        &self,
        backup: &DatabaseBackup,
        status: &DatabaseBackupStatus,
    ) -> Result<(), BackupError> {
        let ns = backup.namespace().unwrap_or_default();
        let name = backup.name_any();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.backups.get(&ns, &name).await {
                Ok(Some(mut current)) => {
                    current.status = Some(status.clone());
                    self.backups.update_status(&current).await.map(|_| ())
                }
                Ok(None) => return Ok(()),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.status_update_attempts => {
                    warn!("Updating status of DatabaseBackup {}/{} failed (attempt {}): {}", ns, name, attempt, e);
                    tokio::time::sleep(self.config.status_update_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn failed(backup: &DatabaseBackup, from: BackupState, cause: &str) -> DatabaseBackupStatus {
    StatusBuilder::from_backup(backup)
        .state(
            BackupState::Failed,
            format!("Transiting from {from} to {}: {cause}", BackupState::Failed),
        )
        .build()
}

pub fn has_finalizers(backup: &DatabaseBackup) -> bool {
    let current = backup.finalizers();
    DEFAULT_FINALIZERS
        .iter()
        .all(|f| current.iter().any(|c| c == f))
}

pub fn append_finalizers(backup: &mut DatabaseBackup) {
    for f in DEFAULT_FINALIZERS {
        if !backup.finalizers().iter().any(|c| c == f) {
            backup.finalizers_mut().push(f.to_string());
        }
    }
}

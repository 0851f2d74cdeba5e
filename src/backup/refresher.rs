use super::{
    client::BackupMeta,
    errors::BackupError,
    handler::Handler,
    status::StatusBuilder,
};
use crate::apis::{
    backup_types::{BackupState, DatabaseBackup, DatabaseBackupSpec, DeploymentRef},
    deployment_types::DatabaseDeployment,
};
use kube::{Resource, ResourceExt};
use std::{sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::*;

/// Name prefix of objects created for backups found on a deployment
pub const IMPORTED_NAME_PREFIX: &str = "backup-";

#[derive(Clone, Debug)]
pub struct RefreshConfig {
    pub interval: Duration,
    /// Restricts the sweep to deployments of one namespace
    pub namespace: Option<String>,
    /// Create objects for remote backups nobody tracks yet
    pub import: bool,
    /// Delete imported objects whose remote backup is gone
    pub cleanup_imported: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            namespace: None,
            import: true,
            cleanup_imported: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub imported: usize,
    pub removed: usize,
}

impl std::ops::AddAssign for RefreshSummary {
    fn add_assign(&mut self, other: Self) {
        self.imported += other.imported;
        self.removed += other.removed;
    }
}

/// Periodic sweep keeping `DatabaseBackup` objects in line with the backups that
/// exist on each deployment
pub struct Refresher {
    handler: Arc<Handler>,
    config: RefreshConfig,
}

impl Refresher {
    pub fn new(handler: Arc<Handler>, config: RefreshConfig) -> Self {
        Self { handler, config }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.refresh().await {
                Ok(summary) if summary != RefreshSummary::default() => info!(
                    "Backup refresh imported {} and removed {} DatabaseBackups",
                    summary.imported, summary.removed
                ),
                Ok(_) => debug!("Backup refresh found nothing to do"),
                Err(e) => error!("Backup refresh failed: {}", e),
            }
        }
    }

    /// One sweep over all deployments in scope. A failing deployment does not stop
    /// the others.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<RefreshSummary, BackupError> {
        let deployments = self
            .handler
            .deployments
            .list(self.config.namespace.as_deref())
            .await?;
        let mut summary = RefreshSummary::default();
        for deployment in &deployments {
            match self.refresh_deployment(deployment).await {
                Ok(s) => summary += s,
                Err(e) => warn!(
                    "Unable to refresh backups of DatabaseDeployment {}/{}: {}",
                    deployment.namespace().unwrap_or_default(),
                    deployment.name_any(),
                    e
                ),
            }
        }
        Ok(summary)
    }

    async fn refresh_deployment(&self, deployment: &DatabaseDeployment) -> Result<RefreshSummary, BackupError> {
        let ns = deployment.namespace().unwrap_or_default();
        let name = deployment.name_any();
        let _guard = self.handler.locks.lock(&ns, &name).await;

        let client = self.handler.clients.client(deployment).await?;
        let backups: Vec<DatabaseBackup> = self
            .handler
            .backups
            .list(Some(&ns))
            .await?
            .into_iter()
            .filter(|b| b.spec.deployment.name == name)
            .collect();
        let remote = client.list().await?;

        let mut summary = RefreshSummary::default();
        if self.config.import {
            for meta in remote.values() {
                if is_tracked(&backups, &meta.id) {
                    continue;
                }
                self.import(deployment, meta).await?;
                summary.imported += 1;
            }
        }

        if self.config.cleanup_imported {
            for backup in &backups {
                let imported = backup
                    .status
                    .as_ref()
                    .and_then(|s| s.backup.as_ref())
                    .is_some_and(|b| b.imported == Some(true));
                let gone = backup.backup_id().is_some_and(|id| !remote.contains_key(id));
                if imported && gone && backup.meta().deletion_timestamp.is_none() {
                    info!("Removing imported DatabaseBackup {}/{}, its backup is gone", ns, backup.name_any());
                    self.handler.backups.delete(&ns, &backup.name_any()).await?;
                    summary.removed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn import(&self, deployment: &DatabaseDeployment, meta: &BackupMeta) -> Result<(), BackupError> {
        let ns = deployment.namespace().unwrap_or_default();
        let mut backup = DatabaseBackup::new(
            "",
            DatabaseBackupSpec {
                deployment: DeploymentRef {
                    name: deployment.name_any(),
                },
                ..Default::default()
            },
        );
        backup.metadata.name = None;
        backup.metadata.generate_name = Some(IMPORTED_NAME_PREFIX.to_owned());
        backup.metadata.namespace = Some(ns.clone());
        if let Some(owner) = deployment.controller_owner_ref(&()) {
            backup.metadata.owner_references = Some(vec![owner]);
        }

        let created = self.handler.backups.create(&backup).await?;
        let status = StatusBuilder::new(None)
            .state(BackupState::Ready, "")
            .meta(meta)
            .imported(Some(true))
            .available(meta.is_consistent())
            .build();
        self.handler.update_backup_status(&created, &status).await?;
        info!("Imported backup {} as DatabaseBackup {}/{}", meta.id, ns, created.name_any());
        Ok(())
    }
}

/// Whether an object already refers to the remote backup
fn is_tracked(backups: &[DatabaseBackup], id: &str) -> bool {
    backups.iter().any(|b| {
        b.backup_id() == Some(id) || b.spec.download.as_ref().is_some_and(|d| d.id == id)
    })
}

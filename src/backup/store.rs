use super::errors::BackupError;
use crate::apis::{backup_types::DatabaseBackup, deployment_types::DatabaseDeployment};
use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    Client, ResourceExt,
};

/// Persistence of `DatabaseBackup` objects
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DatabaseBackup>, BackupError>;
    /// Lists backups in `namespace`, or in every namespace when `None`
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<DatabaseBackup>, BackupError>;
    async fn create(&self, backup: &DatabaseBackup) -> Result<DatabaseBackup, BackupError>;
    /// Replaces metadata and spec, the status is ignored
    async fn update(&self, backup: &DatabaseBackup) -> Result<DatabaseBackup, BackupError>;
    async fn update_status(&self, backup: &DatabaseBackup) -> Result<DatabaseBackup, BackupError>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), BackupError>;
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DatabaseDeployment>, BackupError>;
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<DatabaseDeployment>, BackupError>;
}

#[derive(Clone)]
pub struct KubeBackupStore {
    client: Client,
}

impl KubeBackupStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<DatabaseBackup> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespace_of(backup: &DatabaseBackup) -> String {
        backup.namespace().unwrap_or_else(|| DEFAULT_NAMESPACE.to_owned())
    }
}

const DEFAULT_NAMESPACE: &str = "default";

#[async_trait]
impl BackupStore for KubeBackupStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DatabaseBackup>, BackupError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<DatabaseBackup>, BackupError> {
        let api: Api<DatabaseBackup> = match namespace {
            Some(ns) => self.api(ns),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn create(&self, backup: &DatabaseBackup) -> Result<DatabaseBackup, BackupError> {
        let ns = Self::namespace_of(backup);
        Ok(self.api(&ns).create(&PostParams::default(), backup).await?)
    }

    async fn update(&self, backup: &DatabaseBackup) -> Result<DatabaseBackup, BackupError> {
        let ns = Self::namespace_of(backup);
        Ok(self
            .api(&ns)
            .replace(&backup.name_any(), &PostParams::default(), backup)
            .await?)
    }

    async fn update_status(&self, backup: &DatabaseBackup) -> Result<DatabaseBackup, BackupError> {
        let ns = Self::namespace_of(backup);
        let data = serde_json::to_vec(backup).map_err(BackupError::fatal)?;
        Ok(self
            .api(&ns)
            .replace_status(&backup.name_any(), &PostParams::default(), data)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), BackupError> {
        self.api(namespace).delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct KubeDeploymentStore {
    client: Client,
}

impl KubeDeploymentStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeploymentStore for KubeDeploymentStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DatabaseDeployment>, BackupError> {
        let api: Api<DatabaseDeployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<DatabaseDeployment>, BackupError> {
        let api: Api<DatabaseDeployment> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

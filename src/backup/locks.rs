use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One mutex per (namespace, deployment), created on first use and kept for the
/// lifetime of the process
#[derive(Default)]
pub struct DeploymentLocks {
    locks: Mutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>,
}

impl DeploymentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, namespace: &str, deployment: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry((namespace.to_owned(), deployment.to_owned()))
            .or_default()
            .clone()
    }

    pub async fn lock(&self, namespace: &str, deployment: &str) -> OwnedMutexGuard<()> {
        self.entry(namespace, deployment).lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

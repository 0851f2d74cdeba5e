use super::client::BackupMeta;
use crate::apis::backup_types::{
    BackoffSpec, BackupDetails, BackupProgress, BackupState, DatabaseBackup,
    DatabaseBackupStatus,
};
use chrono::Utc;

/// Builds the next status of a backup from its current one.
///
/// Every call works on a copy; the object's status is only replaced when the
/// handler persists the result.
#[derive(Clone, Debug)]
pub struct StatusBuilder {
    status: DatabaseBackupStatus,
}

impl StatusBuilder {
    pub fn new(current: Option<&DatabaseBackupStatus>) -> Self {
        Self {
            status: current.cloned().unwrap_or_default(),
        }
    }

    pub fn from_backup(backup: &DatabaseBackup) -> Self {
        Self::new(backup.status.as_ref())
    }

    /// Sets state and message, the timestamp only moves when the state changes
    pub fn state(mut self, state: BackupState, message: impl Into<String>) -> Self {
        if self.status.state != state {
            self.status.time = Some(Utc::now());
        }
        self.status.state = state;
        self.status.message = message.into();
        self
    }

    pub fn available(mut self, available: bool) -> Self {
        self.status.available = available;
        self
    }

    pub fn progress(mut self, job_id: impl Into<String>, progress: impl Into<String>) -> Self {
        self.status.progress = Some(BackupProgress {
            job_id: job_id.into(),
            progress: progress.into(),
        });
        self
    }

    pub fn clear_progress(mut self) -> Self {
        self.status.progress = None;
        self
    }

    /// Merges freshly fetched metadata, keeping the transfer and import flags
    pub fn meta(mut self, meta: &BackupMeta) -> Self {
        self.status.backup = Some(details_from_meta(meta, self.status.backup.as_ref()));
        self
    }

    pub fn details(mut self, details: BackupDetails) -> Self {
        self.status.backup = Some(details);
        self
    }

    pub fn uploaded(mut self, uploaded: Option<bool>) -> Self {
        if let Some(details) = self.status.backup.as_mut() {
            details.uploaded = uploaded;
        }
        self
    }

    pub fn downloaded(mut self, downloaded: Option<bool>) -> Self {
        if let Some(details) = self.status.backup.as_mut() {
            details.downloaded = downloaded;
        }
        self
    }

    pub fn imported(mut self, imported: Option<bool>) -> Self {
        if let Some(details) = self.status.backup.as_mut() {
            details.imported = imported;
        }
        self
    }

    pub fn potentially_inconsistent(mut self, inconsistent: bool) -> Self {
        if inconsistent {
            if let Some(details) = self.status.backup.as_mut() {
                details.potentially_inconsistent = Some(true);
            }
        }
        self
    }

    /// Records a failed attempt against the backoff policy
    pub fn add_backoff(mut self, spec: Option<&BackoffSpec>) -> Self {
        let current = self.status.backoff.clone().unwrap_or_default();
        self.status.backoff = Some(current.backoff(spec));
        self
    }

    pub fn clear_backoff(mut self) -> Self {
        self.status.backoff = None;
        self
    }

    pub fn build(self) -> DatabaseBackupStatus {
        self.status
    }
}

pub fn details_from_meta(meta: &BackupMeta, previous: Option<&BackupDetails>) -> BackupDetails {
    let mut details = previous.cloned().unwrap_or_default();
    details.id = meta.id.clone();
    details.version = meta.version.clone();
    details.created_at = meta.created_at;
    details.size_in_bytes = meta.size_in_bytes;
    details.number_of_db_servers = meta.number_of_db_servers;
    details.potentially_inconsistent = Some(meta.potentially_inconsistent);
    details.keys = meta.keys.iter().map(|k| k.sha256.clone()).collect();
    details
}

/// Failed attempts recorded in a status
pub fn backoff_iterations(status: Option<&DatabaseBackupStatus>) -> i64 {
    status
        .and_then(|s| s.backoff.as_ref())
        .map(|b| b.iterations)
        .unwrap_or_default()
}

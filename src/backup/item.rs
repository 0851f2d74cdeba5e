use crate::apis::backup_types::DatabaseBackup;
use kube::{Resource, ResourceExt};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Add,
    Update,
    Delete,
}

/// A unit of work queued for a handler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub operation: Operation,
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl Item {
    pub fn backup(operation: Operation, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            operation,
            group: DatabaseBackup::group(&()).into_owned(),
            version: DatabaseBackup::version(&()).into_owned(),
            kind: DatabaseBackup::kind(&()).into_owned(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Work item for an object seen by the watcher
    pub fn from_backup(backup: &DatabaseBackup) -> Self {
        let operation = if backup.meta().deletion_timestamp.is_some() {
            Operation::Delete
        } else if backup.status.is_none() {
            Operation::Add
        } else {
            Operation::Update
        };
        Self::backup(operation, backup.namespace().unwrap_or_default(), backup.name_any())
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {}/{}/{} {}/{}",
            self.operation, self.group, self.version, self.kind, self.namespace, self.name
        )
    }
}

//! Legal transitions between backup states.
use crate::apis::backup_types::BackupState;
use lazy_static::lazy_static;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransitionError {
    #[error("state {0} is not known")]
    UnknownState(BackupState),
    #[error("change from {from} to {to} is not possible")]
    NotPossible { from: BackupState, to: BackupState },
}

pub struct StateMap(HashMap<BackupState, Vec<BackupState>>);

lazy_static! {
    pub static ref STATE_MAP: StateMap = {
        use BackupState::*;
        StateMap(HashMap::from([
            // Fatal errors on a fresh object are recorded as Failed
            (None, vec![Pending, Failed]),
            (Pending, vec![Scheduled, Failed]),
            (Scheduled, vec![Download, Create, Failed]),
            (Download, vec![Downloading, Failed, DownloadError]),
            (Downloading, vec![Ready, Failed, DownloadError]),
            (DownloadError, vec![Pending, Failed]),
            (Create, vec![Ready, Failed, CreateError, Creating]),
            (Creating, vec![Ready, Failed, CreateError]),
            (CreateError, vec![Failed, Create]),
            (Upload, vec![Uploading, Failed, Deleted, UploadError]),
            (Uploading, vec![Ready, Failed, UploadError]),
            (UploadError, vec![Failed, Ready]),
            (Ready, vec![Deleted, Failed, Upload, Unavailable]),
            (Deleted, vec![Failed, Ready]),
            (Failed, vec![Pending]),
            (Unavailable, vec![Ready, Deleted, Failed]),
        ]))
    };
}

impl StateMap {
    pub fn exists(&self, state: BackupState) -> Result<(), TransitionError> {
        if self.0.contains_key(&state) {
            Ok(())
        } else {
            Err(TransitionError::UnknownState(state))
        }
    }

    pub fn transit(&self, from: BackupState, to: BackupState) -> Result<(), TransitionError> {
        self.exists(from)?;
        self.exists(to)?;
        if from == to {
            return Ok(());
        }
        match self.0.get(&from) {
            Some(targets) if targets.contains(&to) => Ok(()),
            _ => Err(TransitionError::NotPossible { from, to }),
        }
    }
}

use crate::apis::backup_types::DatabaseBackup;
use kube::{
    runtime::events::{Event, EventType, Recorder, Reporter},
    Client, Resource, ResourceExt,
};
use tracing::*;

pub const REASON_STATE_CHANGE: &str = "StateChange";
pub const REASON_FINALIZER_CHANGE: &str = "FinalizerChange";

/// Fire-and-forget lifecycle events on backup objects
pub trait EventRecorder: Send + Sync {
    fn normal(&self, backup: &DatabaseBackup, reason: &str, message: String);
    fn warning(&self, backup: &DatabaseBackup, reason: &str, message: String);
}

/// Publishes events through the cluster API on a background task
#[derive(Clone)]
pub struct KubeEventRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeEventRecorder {
    pub fn new(client: Client, reporter: Reporter) -> Self {
        Self { client, reporter }
    }

    fn publish(&self, backup: &DatabaseBackup, type_: EventType, reason: &str, message: String) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), backup.object_ref(&()));
        let name = backup.name_any();
        let event = Event {
            type_,
            reason: reason.to_owned(),
            note: Some(message),
            action: reason.to_owned(),
            secondary: None,
        };
        tokio::spawn(async move {
            if let Err(e) = recorder.publish(event).await {
                warn!("Failed to publish event for DatabaseBackup {}: {:?}", name, e);
            }
        });
    }
}

impl EventRecorder for KubeEventRecorder {
    fn normal(&self, backup: &DatabaseBackup, reason: &str, message: String) {
        self.publish(backup, EventType::Normal, reason, message)
    }

    fn warning(&self, backup: &DatabaseBackup, reason: &str, message: String) {
        self.publish(backup, EventType::Warning, reason, message)
    }
}

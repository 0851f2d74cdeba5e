use crate::{
    apis::backup_types::{BackupState, DatabaseBackup},
    Error,
};
use kube::ResourceExt;
use prometheus::{histogram_opts, opts, Histogram, IntCounter, IntCounterVec, Registry};
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: IntCounter,
    pub failures: IntCounterVec,
    pub reconcile_duration: Histogram,
    pub transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let reconcile_duration = Histogram::with_opts(
            histogram_opts!(
                "backup_controller_reconcile_duration_seconds",
                "The duration of reconcile to complete in seconds"
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]),
        )?;
        let failures = IntCounterVec::new(
            opts!(
                "backup_controller_reconciliation_errors_total",
                "reconciliation errors"
            ),
            &["instance", "error"],
        )?;
        let reconciliations = IntCounter::new("backup_controller_reconciliations_total", "reconciliations")?;
        let transitions = IntCounterVec::new(
            opts!(
                "backup_controller_state_transitions_total",
                "backup state transitions"
            ),
            &["from", "to"],
        )?;
        Ok(Metrics {
            reconciliations,
            failures,
            reconcile_duration,
            transitions,
        })
    }

    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.reconciliations.clone()))?;
        registry.register(Box::new(self.transitions.clone()))?;
        Ok(self)
    }

    pub fn reconcile_failure(&self, backup: &DatabaseBackup, e: &Error) {
        self.failures
            .with_label_values(&[backup.name_any().as_ref(), e.metric_label().as_ref()])
            .inc()
    }

    pub fn state_transition(&self, from: BackupState, to: BackupState) {
        self.transitions.with_label_values(&[from.as_str(), to.as_str()]).inc()
    }

    pub fn count_and_measure(&self) -> ReconcileMeasurer {
        self.reconciliations.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.reconcile_duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    metric: Histogram,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(duration);
    }
}

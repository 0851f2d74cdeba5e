use chrono::{DateTime, Utc};
use futures::stream::StreamExt;

use crate::{
    apis::backup_types::{BackupState, DatabaseBackup},
    backup::{
        events::KubeEventRecorder,
        http_client::HttpBackupClientFactory,
        item::Item,
        refresher::{RefreshConfig, Refresher},
        store::{KubeBackupStore, KubeDeploymentStore},
        Handler, HandlerConfig, Outcome,
    },
    config::Config,
    telemetry, Error, Metrics, Result,
};
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        events::Reporter,
        watcher::Config as watcherConfig,
    },
};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::RwLock, time::Duration};
use tracing::*;

/// Resync period of backups that have settled
const RESYNC_INTERVAL: Duration = Duration::from_secs(120);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    pub handler: Arc<Handler>,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Metrics,
}

#[instrument(skip(ctx, backup), fields(trace_id))]
async fn reconcile(backup: Arc<DatabaseBackup>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", &field::display(&trace_id));
    let _timer = ctx.metrics.count_and_measure();
    ctx.diagnostics.write().await.last_event = Utc::now();

    let item = Item::from_backup(&backup);
    if !ctx.handler.can_be_handled(&item) {
        return Ok(Action::await_change());
    }

    debug!("Reconciling DatabaseBackup \"{}\" in {}", item.name, item.namespace);
    let outcome = ctx.handler.handle(&item).await?;
    if let Outcome::Status { status, changed: true } = &outcome {
        let from = backup.state();
        if from != status.state {
            ctx.metrics.state_transition(from, status.state);
        }
    }
    Ok(next_action(&outcome, Utc::now(), jitter()))
}

fn error_policy(backup: Arc<DatabaseBackup>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed: {:?}", error);
    ctx.metrics.reconcile_failure(&backup, error);
    match error {
        Error::BackupError(e) if e.is_temporary() => Action::requeue(Duration::from_secs(15)),
        _ => Action::requeue(Duration::from_secs(5 * 60)),
    }
}

fn jitter() -> Duration {
    Duration::from_secs(rand::thread_rng().gen_range(0..60))
}

/// When to look at a backup again after a successful pass
fn next_action(outcome: &Outcome, now: DateTime<Utc>, jitter: Duration) -> Action {
    let (status, changed) = match outcome {
        Outcome::Done => return Action::await_change(),
        Outcome::Requeue => return Action::requeue(Duration::from_secs(1)),
        Outcome::Status { status, changed } => (status, *changed),
    };
    match status.state {
        BackupState::Failed => Action::await_change(),
        BackupState::CreateError | BackupState::UploadError | BackupState::DownloadError => {
            let delay = status
                .backoff
                .as_ref()
                .and_then(|b| b.next)
                .map(|next| {
                    (next - now)
                        .to_std()
                        .unwrap_or_default()
                        .max(Duration::from_secs(1))
                })
                .unwrap_or(DEFAULT_BACKOFF);
            Action::requeue(delay)
        }
        _ if changed => Action::requeue(Duration::from_secs(1)),
        BackupState::Pending
        | BackupState::Scheduled
        | BackupState::Creating
        | BackupState::Uploading
        | BackupState::Downloading => Action::requeue(PROGRESS_INTERVAL),
        BackupState::Ready | BackupState::Unavailable | BackupState::Deleted => {
            Action::requeue(RESYNC_INTERVAL + jitter)
        }
        _ => Action::requeue(Duration::from_secs(1)),
    }
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "backup-controller".into(),
        }
    }
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub async fn create_context(&self, client: Client, config: &Config) -> Result<Arc<Context>> {
        let reporter = self.diagnostics.read().await.reporter.clone();
        let handler = Handler::new(
            Arc::new(KubeBackupStore::new(client.clone())),
            Arc::new(KubeDeploymentStore::new(client.clone())),
            Arc::new(HttpBackupClientFactory::new(client.clone(), config.client_timeout)?),
            Arc::new(KubeEventRecorder::new(client, reporter)),
            HandlerConfig::from(config),
        );
        Ok(Arc::new(Context {
            handler: Arc::new(handler),
            metrics: Metrics::new()?.register(&self.registry)?,
            diagnostics: self.diagnostics.clone(),
        }))
    }
}

/// Initialize the controller and shared state (given the crd is installed)
pub async fn run(state: State) -> Result<()> {
    let config = Config::default();
    let client = Client::try_default().await?;

    let backups: Api<DatabaseBackup> = match config.namespace.as_deref() {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    if let Err(e) = backups.list(&ListParams::default().limit(1)).await {
        error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        return Err(e.into());
    }

    let ctx = state.create_context(client, &config).await?;
    let refresher = tokio::spawn(Refresher::new(ctx.handler.clone(), RefreshConfig::from(&config)).run());

    Controller::new(backups, watcherConfig::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;

    refresher.abort();
    info!("Backup controller stopped");
    Ok(())
}

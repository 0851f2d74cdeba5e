//! Helper methods only available for tests
use crate::{
    apis::{
        backup_types::{
            BackupDownload, BackupProgress, BackupState, BackupTransfer, DatabaseBackup,
            DatabaseBackupSpec, DatabaseBackupStatus, DeploymentRef,
        },
        deployment_types::{DatabaseDeployment, DatabaseDeploymentSpec},
    },
    backup::{
        client::{
            AsyncCreate, BackupClient, BackupClientFactory, BackupMeta, CreateOptions, CreateResponse,
            TransferProgress,
        },
        errors::{BackupError, DriverError},
        events::EventRecorder,
        handler::{Handler, HandlerConfig, Outcome, BACKUP_FINALIZER},
        item::{Item, Operation},
        status::{details_from_meta, StatusBuilder},
        store::{BackupStore, DeploymentStore},
    },
};
use async_trait::async_trait;
use chrono::Utc;
use http::{Request, Response};
use hyper::Body;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Client, Resource, ResourceExt};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

pub const TEST_NAMESPACE: &str = "testns";
pub const TEST_DEPLOYMENT: &str = "deployment";

impl DatabaseBackup {
    /// A normal test DatabaseBackup
    pub fn test() -> Self {
        Self::test_named("backup")
    }

    pub fn test_named(name: &str) -> Self {
        let mut b = DatabaseBackup::new(
            name,
            DatabaseBackupSpec {
                deployment: DeploymentRef {
                    name: TEST_DEPLOYMENT.into(),
                },
                ..Default::default()
            },
        );
        b.meta_mut().namespace = Some(TEST_NAMESPACE.into());
        b.meta_mut().uid = Some(format!("752d59ef-2671-4890-9feb-{name}"));
        b
    }

    /// Modify a backup to have the expected finalizer
    pub fn finalized(mut self) -> Self {
        self.finalizers_mut().push(BACKUP_FINALIZER.to_string());
        self
    }

    pub fn with_status(mut self, status: DatabaseBackupStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_state(mut self, state: BackupState) -> Self {
        self.status.get_or_insert_with(Default::default).state = state;
        self
    }

    /// A created backup pointing at `meta`
    pub fn ready(mut self, meta: &BackupMeta) -> Self {
        let status = StatusBuilder::new(self.status.as_ref())
            .state(BackupState::Ready, "")
            .details(details_from_meta(meta, None))
            .available(true)
            .build();
        self.status = Some(status);
        self
    }

    pub fn with_upload(mut self) -> Self {
        self.spec.upload = Some(transfer());
        self
    }

    pub fn with_download(mut self, id: &str) -> Self {
        self.spec.download = Some(BackupDownload {
            transfer: transfer(),
            id: id.into(),
        });
        self
    }

    pub fn with_progress(mut self, job_id: &str) -> Self {
        self.status.get_or_insert_with(Default::default).progress = Some(BackupProgress {
            job_id: job_id.into(),
            progress: "0%".into(),
        });
        self
    }

    /// Marks the recorded backup as uploaded
    pub fn uploaded(mut self) -> Self {
        if let Some(details) = self.status.as_mut().and_then(|s| s.backup.as_mut()) {
            details.uploaded = Some(true);
        }
        self
    }
}

fn transfer() -> BackupTransfer {
    BackupTransfer {
        repository_url: "s3://bucket/backups".into(),
        credentials_secret_name: "backup-credentials".into(),
    }
}

impl DatabaseDeployment {
    pub fn test() -> Self {
        let mut d = DatabaseDeployment::new(TEST_DEPLOYMENT, DatabaseDeploymentSpec::default());
        d.meta_mut().namespace = Some(TEST_NAMESPACE.into());
        d.meta_mut().uid = Some("0c4a3f1e-57a4-4c1f-9d0e-3b0b9a9c6f11".into());
        d
    }
}

fn not_found(kind: &str, name: &str) -> BackupError {
    DriverError::not_found(format!("{kind} {name} not found")).into()
}

/// In-memory `DatabaseBackup` storage behaving like the API server for the calls we make
#[derive(Default)]
pub struct MemoryBackupStore {
    objects: Mutex<BTreeMap<(String, String), DatabaseBackup>>,
    status_writes: AtomicUsize,
    failing_status_writes: AtomicUsize,
    generated: AtomicUsize,
}

impl MemoryBackupStore {
    pub fn insert(&self, backup: DatabaseBackup) {
        let key = (backup.namespace().unwrap_or_default(), backup.name_any());
        self.objects.lock().unwrap().insert(key, backup);
    }

    pub fn find(&self, namespace: &str, name: &str) -> Option<DatabaseBackup> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
    }

    pub fn all(&self) -> Vec<DatabaseBackup> {
        self.objects.lock().unwrap().values().cloned().collect()
    }

    /// Successful status writes so far
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Makes the next `n` status writes fail with a conflict
    pub fn fail_status_writes(&self, n: usize) {
        self.failing_status_writes.store(n, Ordering::SeqCst);
    }

    pub fn modify(&self, namespace: &str, name: &str, f: impl FnOnce(&mut DatabaseBackup)) {
        let mut objects = self.objects.lock().unwrap();
        let backup = objects
            .get_mut(&(namespace.to_owned(), name.to_owned()))
            .expect("backup exists");
        f(backup);
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DatabaseBackup>, BackupError> {
        Ok(self.find(namespace, name))
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<DatabaseBackup>, BackupError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|b| namespace.is_none() || b.namespace().as_deref() == namespace)
            .collect())
    }

    async fn create(&self, backup: &DatabaseBackup) -> Result<DatabaseBackup, BackupError> {
        let mut created = backup.clone();
        if created.metadata.name.is_none() {
            let n = self.generated.fetch_add(1, Ordering::SeqCst);
            let prefix = created.metadata.generate_name.clone().unwrap_or_default();
            created.metadata.name = Some(format!("{prefix}{n:05}"));
        }
        created.status = None;
        let key = (created.namespace().unwrap_or_default(), created.name_any());
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(BackupError::fatal(format!("{} already exists", key.1)));
        }
        objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, backup: &DatabaseBackup) -> Result<DatabaseBackup, BackupError> {
        let key = (backup.namespace().unwrap_or_default(), backup.name_any());
        let mut objects = self.objects.lock().unwrap();
        let Some(existing) = objects.get(&key) else {
            return Err(not_found("DatabaseBackup", &key.1));
        };
        let mut updated = backup.clone();
        updated.status = existing.status.clone();
        if updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            objects.remove(&key);
        } else {
            objects.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn update_status(&self, backup: &DatabaseBackup) -> Result<DatabaseBackup, BackupError> {
        let failing = self.failing_status_writes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_status_writes.store(failing - 1, Ordering::SeqCst);
            return Err(BackupError::temporary("the object has been modified"));
        }
        let key = (backup.namespace().unwrap_or_default(), backup.name_any());
        let mut objects = self.objects.lock().unwrap();
        let Some(existing) = objects.get_mut(&key) else {
            return Err(not_found("DatabaseBackup", &key.1));
        };
        existing.status = backup.status.clone();
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(existing.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), BackupError> {
        let key = (namespace.to_owned(), name.to_owned());
        let mut objects = self.objects.lock().unwrap();
        let Some(existing) = objects.get_mut(&key) else {
            return Err(not_found("DatabaseBackup", name));
        };
        if existing.finalizers().is_empty() {
            objects.remove(&key);
        } else {
            existing.meta_mut().deletion_timestamp = Some(Time(Utc::now()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDeploymentStore {
    deployments: Mutex<Vec<DatabaseDeployment>>,
}

impl MemoryDeploymentStore {
    pub fn insert(&self, deployment: DatabaseDeployment) {
        self.deployments.lock().unwrap().push(deployment);
    }

    pub fn clear(&self) {
        self.deployments.lock().unwrap().clear();
    }
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DatabaseDeployment>, BackupError> {
        Ok(self
            .deployments
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.namespace().as_deref() == Some(namespace) && d.name_any() == name)
            .cloned())
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<DatabaseDeployment>, BackupError> {
        Ok(self
            .deployments
            .lock()
            .unwrap()
            .iter()
            .filter(|d| namespace.is_none() || d.namespace().as_deref() == namespace)
            .cloned()
            .collect())
    }
}

/// Recorded events, `(warning, reason, message)`
#[derive(Default)]
pub struct MemoryEvents {
    events: Mutex<Vec<(bool, String, String)>>,
}

impl MemoryEvents {
    pub fn reasons(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.1.clone()).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.2.clone()).collect()
    }

    pub fn warnings(&self) -> usize {
        self.events.lock().unwrap().iter().filter(|e| e.0).count()
    }
}

impl EventRecorder for MemoryEvents {
    fn normal(&self, _backup: &DatabaseBackup, reason: &str, message: String) {
        self.events.lock().unwrap().push((false, reason.into(), message));
    }

    fn warning(&self, _backup: &DatabaseBackup, reason: &str, message: String) {
        self.events.lock().unwrap().push((true, reason.into(), message));
    }
}

/// Error injected into the mock backup client
#[derive(Clone, Debug)]
pub enum MockError {
    Temporary(String),
    Fatal(String),
    NotFound,
}

impl MockError {
    fn to_error(&self) -> BackupError {
        match self {
            MockError::Temporary(msg) => BackupError::temporary(msg.clone()),
            MockError::Fatal(msg) => BackupError::fatal(msg.clone()),
            MockError::NotFound => not_found("backup", "requested"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum MockOp {
    Factory,
    Create,
    Get,
    Upload,
    Download,
    Progress,
    Abort,
    Delete,
}

#[derive(Default)]
struct MockState {
    backups: BTreeMap<String, BackupMeta>,
    jobs: BTreeMap<String, TransferProgress>,
    create_jobs: BTreeMap<String, usize>,
    errors: HashMap<MockOp, MockError>,
    calls: Vec<String>,
    async_polls: usize,
    counter: usize,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}-{}", self.counter)
    }

    fn check(&self, op: MockOp) -> Result<(), BackupError> {
        match self.errors.get(&op) {
            Some(err) => Err(err.to_error()),
            None => Ok(()),
        }
    }

    fn create_backup(&mut self, options: &CreateOptions) -> CreateResponse {
        let id = self.next_id("created");
        self.backups.insert(id.clone(), remote_meta(&id));
        CreateResponse {
            id,
            potentially_inconsistent: options.allow_inconsistent,
        }
    }
}

fn remote_meta(id: &str) -> BackupMeta {
    BackupMeta {
        id: id.into(),
        version: "3.10.0".into(),
        created_at: Some(Utc::now()),
        size_in_bytes: 1024,
        number_of_files: 12,
        number_of_db_servers: 3,
        number_of_pieces_present: 3,
        potentially_inconsistent: false,
        available: true,
        keys: vec![],
    }
}

/// Fake deployment backup API shared by every client the factory hands out
#[derive(Clone, Default)]
pub struct MockClients {
    state: Arc<Mutex<MockState>>,
}

impl MockClients {
    fn fail(&self, op: MockOp, err: MockError) {
        self.state.lock().unwrap().errors.insert(op, err);
    }

    pub fn fail_factory(&self, err: MockError) {
        self.fail(MockOp::Factory, err)
    }

    pub fn fail_create(&self, err: MockError) {
        self.fail(MockOp::Create, err)
    }

    pub fn fail_get(&self, err: MockError) {
        self.fail(MockOp::Get, err)
    }

    pub fn fail_upload(&self, err: MockError) {
        self.fail(MockOp::Upload, err)
    }

    pub fn fail_download(&self, err: MockError) {
        self.fail(MockOp::Download, err)
    }

    pub fn fail_progress(&self, err: MockError) {
        self.fail(MockOp::Progress, err)
    }

    pub fn fail_abort(&self, err: MockError) {
        self.fail(MockOp::Abort, err)
    }

    pub fn fail_delete(&self, err: MockError) {
        self.fail(MockOp::Delete, err)
    }

    pub fn has_backup(&self, id: &str) -> bool {
        self.state.lock().unwrap().backups.contains_key(id)
    }

    /// Adds a consistent backup spread over three servers
    pub fn add_backup(&self, id: &str) -> BackupMeta {
        let meta = remote_meta(id);
        self.state.lock().unwrap().backups.insert(id.into(), meta.clone());
        meta
    }

    pub fn new_backup(&self) -> BackupMeta {
        let id = self.state.lock().unwrap().next_id("remote");
        self.add_backup(&id)
    }

    pub fn remove_backup(&self, id: &str) {
        self.state.lock().unwrap().backups.remove(id);
    }

    pub fn set_pieces_present(&self, id: &str, pieces: u32) {
        if let Some(meta) = self.state.lock().unwrap().backups.get_mut(id) {
            meta.number_of_pieces_present = pieces;
        }
    }

    pub fn set_available(&self, id: &str, available: bool) {
        if let Some(meta) = self.state.lock().unwrap().backups.get_mut(id) {
            meta.available = available;
        }
    }

    /// Registers a running transfer job and returns its id
    pub fn start_job(&self, progress: u32) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("job");
        state.jobs.insert(
            id.clone(),
            TransferProgress {
                progress,
                ..Default::default()
            },
        );
        id
    }

    pub fn complete_job(&self, job_id: &str) {
        if let Some(job) = self.state.lock().unwrap().jobs.get_mut(job_id) {
            job.progress = 100;
            job.completed = true;
        }
    }

    pub fn fail_job(&self, job_id: &str, message: &str) {
        if let Some(job) = self.state.lock().unwrap().jobs.get_mut(job_id) {
            job.failed = true;
            job.fail_message = message.into();
        }
    }

    /// Polls an asynchronous create reports as running before it is done
    pub fn set_async_polls(&self, polls: usize) {
        self.state.lock().unwrap().async_polls = polls;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, MockState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl BackupClientFactory for MockClients {
    async fn client(&self, _deployment: &DatabaseDeployment) -> Result<Box<dyn BackupClient>, BackupError> {
        self.state.lock().unwrap().check(MockOp::Factory)?;
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl BackupClient for MockClients {
    async fn create(&self, options: &CreateOptions) -> Result<CreateResponse, BackupError> {
        let mut state = self.record("create".into());
        state.check(MockOp::Create)?;
        Ok(state.create_backup(options))
    }

    async fn create_async(&self, options: &CreateOptions, job_id: Option<&str>) -> Result<AsyncCreate, BackupError> {
        let mut state = self.record(format!("create_async {}", job_id.unwrap_or_default()));
        state.check(MockOp::Create)?;
        let Some(job_id) = job_id else {
            if state.async_polls == 0 {
                return Ok(AsyncCreate::Done(state.create_backup(options)));
            }
            let job_id = state.next_id("create");
            let polls = state.async_polls;
            state.create_jobs.insert(job_id.clone(), polls);
            return Ok(AsyncCreate::InProgress { job_id });
        };
        match state.create_jobs.get(job_id).copied() {
            None => Err(not_found("job", job_id)),
            Some(0) => {
                state.create_jobs.remove(job_id);
                Ok(AsyncCreate::Done(state.create_backup(options)))
            }
            Some(remaining) => {
                state.create_jobs.insert(job_id.to_owned(), remaining - 1);
                Ok(AsyncCreate::InProgress {
                    job_id: job_id.to_owned(),
                })
            }
        }
    }

    async fn get(&self, id: &str) -> Result<BackupMeta, BackupError> {
        let state = self.record(format!("get {id}"));
        state.check(MockOp::Get)?;
        state.backups.get(id).cloned().ok_or_else(|| not_found("backup", id))
    }

    async fn list(&self) -> Result<BTreeMap<String, BackupMeta>, BackupError> {
        let state = self.record("list".into());
        Ok(state.backups.clone())
    }

    async fn upload(&self, id: &str, _target: &BackupTransfer) -> Result<String, BackupError> {
        let mut state = self.record(format!("upload {id}"));
        state.check(MockOp::Upload)?;
        let job = state.next_id("job");
        state.jobs.insert(job.clone(), TransferProgress::default());
        Ok(job)
    }

    async fn download(&self, id: &str, _source: &BackupTransfer) -> Result<String, BackupError> {
        let mut state = self.record(format!("download {id}"));
        state.check(MockOp::Download)?;
        let job = state.next_id("job");
        state.jobs.insert(job.clone(), TransferProgress::default());
        Ok(job)
    }

    async fn progress(&self, job_id: &str) -> Result<TransferProgress, BackupError> {
        let state = self.record(format!("progress {job_id}"));
        state.check(MockOp::Progress)?;
        state.jobs.get(job_id).cloned().ok_or_else(|| not_found("job", job_id))
    }

    async fn abort(&self, job_id: &str) -> Result<(), BackupError> {
        let mut state = self.record(format!("abort {job_id}"));
        state.check(MockOp::Abort)?;
        state.jobs.remove(job_id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool, BackupError> {
        let state = self.record(format!("exists {id}"));
        Ok(state.backups.contains_key(id))
    }

    async fn delete(&self, id: &str) -> Result<(), BackupError> {
        let mut state = self.record(format!("delete {id}"));
        state.check(MockOp::Delete)?;
        state.backups.remove(id);
        Ok(())
    }
}

/// A handler wired to in-memory collaborators
pub struct TestEnv {
    pub handler: Arc<Handler>,
    pub backups: Arc<MemoryBackupStore>,
    pub deployments: Arc<MemoryDeploymentStore>,
    pub clients: MockClients,
    pub events: Arc<MemoryEvents>,
}

impl TestEnv {
    pub fn new() -> Self {
        let backups = Arc::new(MemoryBackupStore::default());
        let deployments = Arc::new(MemoryDeploymentStore::default());
        deployments.insert(DatabaseDeployment::test());
        let clients = MockClients::default();
        let events = Arc::new(MemoryEvents::default());
        let handler = Arc::new(Handler::new(
            backups.clone(),
            deployments.clone(),
            Arc::new(clients.clone()),
            events.clone(),
            Self::config(),
        ));
        Self {
            handler,
            backups,
            deployments,
            clients,
            events,
        }
    }

    /// Handler configuration without retry delays
    pub fn config() -> HandlerConfig {
        HandlerConfig {
            status_update_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    pub fn set_config(&mut self, config: HandlerConfig) {
        self.handler = Arc::new(Handler::new(
            self.backups.clone(),
            self.deployments.clone(),
            Arc::new(self.clients.clone()),
            self.events.clone(),
            config,
        ));
    }

    pub fn insert(&self, backup: DatabaseBackup) {
        self.backups.insert(backup);
    }

    pub async fn handle(&self, name: &str) -> Result<Outcome, BackupError> {
        self.handler
            .handle(&Item::backup(Operation::Update, TEST_NAMESPACE, name))
            .await
    }

    pub fn backup(&self, name: &str) -> DatabaseBackup {
        self.try_backup(name).expect("backup exists")
    }

    pub fn try_backup(&self, name: &str) -> Option<DatabaseBackup> {
        self.backups.find(TEST_NAMESPACE, name)
    }

    pub fn update_status(&self, name: &str, f: impl FnOnce(&mut DatabaseBackupStatus)) {
        self.backups.modify(TEST_NAMESPACE, name, |b| {
            f(b.status.get_or_insert_with(Default::default))
        });
    }

    /// A consistent backup present on the test deployment
    pub fn create_remote(&self) -> BackupMeta {
        self.clients.new_backup()
    }
}

type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;
pub struct ApiServerVerifier(ApiServerHandle);

/// Scenarios we test for in ApiServerVerifier
pub enum Scenario {
    /// a GET on the named backup answered with 404
    NotFound(String),
    /// a full replace of the object, echoed back
    Replace(DatabaseBackup),
    /// a replace of the status subresource, echoed back
    StatusReplace(DatabaseBackup),
    /// an event with the given reason
    EventCreate(String),
}

pub async fn timeout_after_1s(handle: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("timeout on mock apiserver")
        .expect("scenario succeeded")
}

impl ApiServerVerifier {
    /// A kube client talking to a verifier instead of an API server
    pub fn client() -> (Client, ApiServerVerifier) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let mock_client = Client::new(mock_service, TEST_NAMESPACE);
        (mock_client, ApiServerVerifier(handle))
    }

    /// Runs one scenario; await the handle with [`timeout_after_1s`] to catch
    /// missing API calls.
    pub fn run(self, scenario: Scenario) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            match scenario {
                Scenario::NotFound(name) => self.handle_not_found(name).await,
                Scenario::Replace(backup) => self.handle_replace(backup, false).await,
                Scenario::StatusReplace(backup) => self.handle_replace(backup, true).await,
                Scenario::EventCreate(reason) => self.handle_event_create(reason).await,
            }
            .expect("scenario completed without errors");
        })
    }

    fn backup_path(name: &str) -> String {
        format!("/apis/coredb.io/v1alpha1/namespaces/{TEST_NAMESPACE}/databasebackups/{name}")
    }

    async fn handle_not_found(mut self, name: String) -> Result<Self, kube::Error> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.method(), http::Method::GET);
        assert_eq!(request.uri().path(), Self::backup_path(&name));
        let body = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": format!("databasebackups.coredb.io \"{name}\" not found"),
            "reason": "NotFound",
            "code": 404
        });
        let response = serde_json::to_vec(&body).unwrap();
        send.send_response(
            Response::builder()
                .status(404)
                .body(Body::from(response))
                .unwrap(),
        );
        Ok(self)
    }

    async fn handle_replace(mut self, backup: DatabaseBackup, status: bool) -> Result<Self, kube::Error> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.method(), http::Method::PUT);
        let mut path = Self::backup_path(&backup.name_any());
        if status {
            path.push_str("/status");
        }
        assert_eq!(request.uri().path(), path);
        let req_body = hyper::body::to_bytes(request.into_body()).await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&req_body).expect("valid backup from client");
        assert_json_diff::assert_json_include!(
            actual: sent,
            expected: serde_json::to_value(&backup).unwrap()
        );
        send.send_response(Response::builder().body(Body::from(req_body)).unwrap());
        Ok(self)
    }

    async fn handle_event_create(mut self, reason: String) -> Result<Self, kube::Error> {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.method(), http::Method::POST);
        assert!(request.uri().path().ends_with(&format!("/namespaces/{TEST_NAMESPACE}/events")));
        let req_body = hyper::body::to_bytes(request.into_body()).await.unwrap();
        let postdata: serde_json::Value = serde_json::from_slice(&req_body).expect("valid event from runtime");
        assert_eq!(
            postdata.get("reason").and_then(|r| r.as_str()).map(String::from),
            Some(reason)
        );
        send.send_response(Response::builder().body(Body::from(req_body)).unwrap());
        Ok(self)
    }
}

use super::{
    client::{
        AsyncCreate, BackupClient, BackupClientFactory, BackupMeta, CreateOptions, CreateResponse,
        TransferProgress,
    },
    errors::{BackupError, DriverError},
};
use crate::apis::{backup_types::BackupTransfer, deployment_types::DatabaseDeployment};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use reqwest::{header::HeaderValue, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::{collections::BTreeMap, time::Duration};
use tracing::*;

const ASYNC_HEADER: &str = "x-arango-async";
const ASYNC_ID_HEADER: &str = "x-arango-async-id";
const TOKEN_KEY: &str = "token";

/// Builds HTTP clients for the hot backup API of a deployment
#[derive(Clone)]
pub struct HttpBackupClientFactory {
    client: Client,
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpBackupClientFactory {
    pub fn new(client: Client, timeout: Duration) -> Result<Self, BackupError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { client, http, timeout })
    }
}

#[async_trait]
impl BackupClientFactory for HttpBackupClientFactory {
    async fn client(&self, deployment: &DatabaseDeployment) -> Result<Box<dyn BackupClient>, BackupError> {
        let ns = deployment.namespace().unwrap_or_default();
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &ns);
        let token = match deployment.spec.auth_secret_name.as_deref() {
            Some(name) if !name.is_empty() => Some(secret_token(&secrets, name).await?),
            _ => None,
        };
        Ok(Box::new(HttpBackupClient {
            http: self.http.clone(),
            endpoint: deployment.endpoint(&ns),
            token,
            timeout: self.timeout,
            secrets,
        }))
    }
}

/// Client bound to one deployment
pub struct HttpBackupClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
    secrets: Api<Secret>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct ListResult {
    #[serde(default)]
    list: BTreeMap<String, BackupMeta>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResult {
    upload_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadResult {
    download_id: String,
}

/// Progress report of a transfer job, one entry per database server
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TransferReport {
    #[serde(default)]
    pub cancelled: bool,
    #[serde(rename = "DBServers", default)]
    pub db_servers: BTreeMap<String, ServerTransfer>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ServerTransfer {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: FileProgress,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
pub struct FileProgress {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub done: u64,
}

/// Folds per-server transfer states into one progress value.
///
/// A job is completed once every server is completed and at least one file was
/// part of the transfer.
pub fn aggregate_progress(report: &TransferReport) -> Result<TransferProgress, BackupError> {
    if report.cancelled {
        return Ok(TransferProgress {
            failed: true,
            fail_message: "Transfer cancelled".to_owned(),
            ..Default::default()
        });
    }

    let mut progress = TransferProgress::default();
    let mut completed = 0;
    let mut total: u64 = 0;
    let mut done: u64 = 0;
    for server in report.db_servers.values() {
        total = total.saturating_add(server.progress.total);
        done = done.saturating_add(server.progress.done);
        match server.status.as_str() {
            "FAILED" => {
                progress.failed = true;
                progress.fail_message = server.error_message.clone();
            }
            "COMPLETED" | "" => completed += 1,
            "ACK" | "STARTED" => {}
            other => return Err(BackupError::fatal(format!("Unknown transfer status: {other}"))),
        }
    }

    progress.completed = completed == report.db_servers.len() && total > 0;
    if total > 0 {
        progress.progress = (done.saturating_mul(100) / total).min(100) as u32;
    }
    Ok(progress)
}

impl HttpBackupClient {
    fn request(&self, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        let request = self
            .http
            .request(method, format!("{}{}", self.endpoint, path))
            .timeout(timeout);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, BackupError> {
        let response = self
            .request(Method::POST, path, self.timeout)
            .json(&body)
            .send()
            .await?;
        Ok(decode::<Envelope<T>>(response).await?.result)
    }

    /// Transfer credentials, stored as a JSON document under the `token` key
    async fn credentials(&self, secret_name: &str) -> Result<Value, BackupError> {
        let token = secret_token(&self.secrets, secret_name).await?;
        serde_json::from_str(&token)
            .map_err(|e| BackupError::fatal(format!("failed to unmarshal credentials: {e}")))
    }

    fn create_body(options: &CreateOptions) -> Value {
        let mut body = json!({ "allowInconsistent": options.allow_inconsistent });
        if let Some(timeout) = options.timeout {
            body["timeout"] = json!(timeout.as_secs_f64());
        }
        body
    }

    /// Client timeout extended by the timeout the deployment gets for the create
    fn create_timeout(base: Duration, options: &CreateOptions) -> Duration {
        base.saturating_add(options.timeout.unwrap_or_default())
    }

    async fn poll_job(&self, job_id: &str) -> Result<AsyncCreate, BackupError> {
        let response = self
            .request(Method::PUT, &format!("/_api/job/{job_id}"), self.timeout)
            .send()
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(AsyncCreate::InProgress {
                job_id: job_id.to_owned(),
            });
        }
        let envelope: Envelope<CreateResponse> = decode(response).await?;
        Ok(AsyncCreate::Done(envelope.result))
    }
}

#[async_trait]
impl BackupClient for HttpBackupClient {
    async fn create(&self, options: &CreateOptions) -> Result<CreateResponse, BackupError> {
        let timeout = Self::create_timeout(self.timeout, options);
        let response = self
            .request(Method::POST, "/_admin/backup/create", timeout)
            .json(&Self::create_body(options))
            .send()
            .await?;
        Ok(decode::<Envelope<CreateResponse>>(response).await?.result)
    }

    async fn create_async(&self, options: &CreateOptions, job_id: Option<&str>) -> Result<AsyncCreate, BackupError> {
        if let Some(job_id) = job_id {
            return self.poll_job(job_id).await;
        }
        let response = self
            .request(Method::POST, "/_admin/backup/create", self.timeout)
            .header(ASYNC_HEADER, HeaderValue::from_static("store"))
            .json(&Self::create_body(options))
            .send()
            .await?;
        if response.status() != StatusCode::ACCEPTED {
            let envelope: Envelope<CreateResponse> = decode(response).await?;
            return Ok(AsyncCreate::Done(envelope.result));
        }
        let job_id = response
            .headers()
            .get(ASYNC_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| BackupError::fatal("async create did not return a job id"))?;
        debug!("Started async backup create job {}", job_id);
        Ok(AsyncCreate::InProgress { job_id })
    }

    async fn get(&self, id: &str) -> Result<BackupMeta, BackupError> {
        let mut list = self.list().await?;
        list.remove(id)
            .ok_or_else(|| DriverError::not_found(format!("backup {id} was not found")).into())
    }

    async fn list(&self) -> Result<BTreeMap<String, BackupMeta>, BackupError> {
        let result: ListResult = self.post("/_admin/backup/list", json!({})).await?;
        Ok(result.list)
    }

    async fn upload(&self, id: &str, target: &BackupTransfer) -> Result<String, BackupError> {
        let config = self.credentials(&target.credentials_secret_name).await?;
        let result: UploadResult = self
            .post(
                "/_admin/backup/upload",
                json!({ "id": id, "remoteRepository": target.repository_url, "config": config }),
            )
            .await?;
        Ok(result.upload_id)
    }

    async fn download(&self, id: &str, source: &BackupTransfer) -> Result<String, BackupError> {
        let config = self.credentials(&source.credentials_secret_name).await?;
        let result: DownloadResult = self
            .post(
                "/_admin/backup/download",
                json!({ "id": id, "remoteRepository": source.repository_url, "config": config }),
            )
            .await?;
        Ok(result.download_id)
    }

    async fn progress(&self, job_id: &str) -> Result<TransferProgress, BackupError> {
        let report: TransferReport = match self
            .post("/_admin/backup/upload", json!({ "uploadId": job_id }))
            .await
        {
            Err(err) if err.is_not_found() => {
                self.post("/_admin/backup/download", json!({ "downloadId": job_id }))
                    .await?
            }
            result => result?,
        };
        aggregate_progress(&report)
    }

    async fn abort(&self, job_id: &str) -> Result<(), BackupError> {
        let result: Result<Value, BackupError> = self
            .post("/_admin/backup/upload", json!({ "uploadId": job_id, "abort": true }))
            .await;
        match result {
            Err(err) if err.is_not_found() => {
                self.post::<Value>("/_admin/backup/download", json!({ "downloadId": job_id, "abort": true }))
                    .await?;
                Ok(())
            }
            result => result.map(|_| ()),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool, BackupError> {
        match self.get(id).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), BackupError> {
        self.post::<Value>("/_admin/backup/delete", json!({ "id": id }))
            .await?;
        Ok(())
    }
}

/// Maps non-success responses to the error body the server sent
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackupError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let body = response.bytes().await?;
    Err(error_from_body(status, &body).into())
}

fn error_from_body(status: StatusCode, body: &[u8]) -> DriverError {
    match serde_json::from_slice::<DriverError>(body) {
        Ok(err) => err,
        Err(_) => DriverError {
            code: status.as_u16(),
            error_num: 0,
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

async fn secret_token(secrets: &Api<Secret>, name: &str) -> Result<String, BackupError> {
    let secret = secrets.get(name).await?;
    let bytes = secret
        .data
        .and_then(|mut data| data.remove(TOKEN_KEY))
        .ok_or_else(|| BackupError::fatal(format!("secret {name} has no {TOKEN_KEY} key")))?;
    String::from_utf8(bytes.0).map_err(|_| BackupError::fatal(format!("failed to decode {TOKEN_KEY} of secret {name}")))
}

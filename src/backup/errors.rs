use serde::Deserialize;
use std::error::Error as StdError;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// HTTP codes worth retrying against the deployment or the cluster API
const RETRYABLE_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Error numbers the database reports for cluster internal communication problems
const RETRYABLE_ERROR_NUMS: [i64; 4] = [
    1447, // cluster timeout
    1457, // cluster backend unavailable
    1464, // cluster connection lost
    1496, // cluster leadership challenge ongoing
];

const TRANSIENT_FRAGMENTS: [&str; 5] = [
    "context deadline exceeded",
    "connection refused",
    "connection reset",
    "communication error",
    "operation timed out",
];

/// Error body returned by the deployment's HTTP API
#[derive(Error, Debug, Clone, PartialEq, Deserialize)]
#[error("{message} (code {code}, errorNum {error_num})")]
pub struct DriverError {
    pub code: u16,
    #[serde(rename = "errorNum", default)]
    pub error_num: i64,
    #[serde(rename = "errorMessage", default)]
    pub message: String,
}

impl DriverError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: 404,
            error_num: 0,
            message: message.into(),
        }
    }

    fn is_retryable(&self) -> bool {
        RETRYABLE_CODES.contains(&self.code) || RETRYABLE_ERROR_NUMS.contains(&self.error_num)
    }
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("{0}")]
    Temporary(#[source] BoxError),

    #[error("{0}")]
    Fatal(#[source] BoxError),

    #[error("Driver Error: {0}")]
    Driver(#[from] DriverError),

    #[error("Kube Error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Http Error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BackupError {
    pub fn temporary(err: impl Into<BoxError>) -> Self {
        BackupError::Temporary(err.into())
    }

    pub fn fatal(err: impl Into<BoxError>) -> Self {
        BackupError::Fatal(err.into())
    }

    pub fn is_temporary(&self) -> bool {
        classify(self) == ErrorKind::Temporary
    }

    pub fn is_not_found(&self) -> bool {
        is_not_found(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Temporary,
    Fatal,
}

/// Decides whether an error is retried later or fails the backup.
///
/// Checks run in order: explicit `Temporary`/`Fatal` wrappers, transport errors that
/// report themselves as transient, retryable status codes, well known transient message
/// fragments, and finally the same checks on the error's source. Anything unmatched is fatal.
pub fn classify(err: &(dyn StdError + 'static)) -> ErrorKind {
    if let Some(e) = err.downcast_ref::<BackupError>() {
        match e {
            BackupError::Temporary(_) => return ErrorKind::Temporary,
            BackupError::Fatal(_) => return ErrorKind::Fatal,
            _ => {}
        }
    }
    if reports_transient(err) || has_retryable_code(err) {
        return ErrorKind::Temporary;
    }
    let message = err.to_string();
    if TRANSIENT_FRAGMENTS.iter().any(|f| message.contains(f)) {
        return ErrorKind::Temporary;
    }
    match err.source() {
        Some(cause) => classify(cause),
        None => ErrorKind::Fatal,
    }
}

/// Folds an error into `Temporary` or `Fatal`
pub fn switch_error(err: BackupError) -> BackupError {
    match (classify(&err), err) {
        (_, err @ (BackupError::Temporary(_) | BackupError::Fatal(_))) => err,
        (ErrorKind::Temporary, err) => BackupError::Temporary(Box::new(err)),
        (ErrorKind::Fatal, err) => BackupError::Fatal(Box::new(err)),
    }
}

fn reports_transient(err: &(dyn StdError + 'static)) -> bool {
    if let Some(e) = err.downcast_ref::<BackupError>() {
        return match e {
            BackupError::Http(e) => reqwest_transient(e),
            BackupError::Kube(e) => kube_transient(e),
            _ => false,
        };
    }
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        return reqwest_transient(e);
    }
    if let Some(e) = err.downcast_ref::<kube::Error>() {
        return kube_transient(e);
    }
    if let Some(e) = err.downcast_ref::<std::io::Error>() {
        use std::io::ErrorKind::*;
        return matches!(
            e.kind(),
            ConnectionRefused | ConnectionReset | ConnectionAborted | TimedOut | BrokenPipe | UnexpectedEof
        );
    }
    false
}

fn reqwest_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

fn kube_transient(e: &kube::Error) -> bool {
    matches!(e, kube::Error::HyperError(_) | kube::Error::Service(_))
}

fn status_code(err: &(dyn StdError + 'static)) -> Option<u16> {
    if let Some(e) = err.downcast_ref::<BackupError>() {
        return match e {
            BackupError::Driver(e) => Some(e.code),
            BackupError::Kube(kube::Error::Api(resp)) => Some(resp.code),
            BackupError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        };
    }
    if let Some(e) = err.downcast_ref::<DriverError>() {
        return Some(e.code);
    }
    if let Some(kube::Error::Api(resp)) = err.downcast_ref::<kube::Error>() {
        return Some(resp.code);
    }
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        return e.status().map(|s| s.as_u16());
    }
    None
}

fn has_retryable_code(err: &(dyn StdError + 'static)) -> bool {
    let driver = match err.downcast_ref::<BackupError>() {
        Some(BackupError::Driver(e)) => Some(e),
        _ => err.downcast_ref::<DriverError>(),
    };
    if driver.is_some_and(DriverError::is_retryable) {
        return true;
    }
    status_code(err).is_some_and(|code| RETRYABLE_CODES.contains(&code))
}

/// Whether the error, or any error in its source chain, is a 404
pub fn is_not_found(err: &(dyn StdError + 'static)) -> bool {
    if status_code(err) == Some(404) {
        return true;
    }
    err.source().is_some_and(is_not_found)
}

use crate::backup::{handler::HandlerConfig, refresher::RefreshConfig};
use std::{env, fmt::Display, str::FromStr, time::Duration};
use tracing::*;

#[derive(Clone, Debug)]
pub struct Config {
    pub concurrent_uploads: usize,
    pub async_create: bool,
    pub refresh_interval: Duration,
    pub client_timeout: Duration,
    pub cleanup_imported: bool,
    pub import_enabled: bool,
    /// Only watch this namespace when set
    pub namespace: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrent_uploads: parse_env("BACKUP_CONCURRENT_UPLOADS", 4),
            async_create: parse_env("BACKUP_ASYNC_CREATE", false),
            refresh_interval: Duration::from_secs(parse_env("BACKUP_REFRESH_INTERVAL_SECONDS", 120)),
            client_timeout: Duration::from_secs(parse_env("BACKUP_CLIENT_TIMEOUT_SECONDS", 30)),
            cleanup_imported: parse_env("BACKUP_CLEANUP_IMPORTED", false),
            import_enabled: parse_env("BACKUP_IMPORT_ENABLED", true),
            namespace: Some(from_env_default("WATCH_NAMESPACE", "")).filter(|ns| !ns.is_empty()),
        }
    }
}

impl From<&Config> for HandlerConfig {
    fn from(config: &Config) -> Self {
        Self {
            concurrent_uploads: config.concurrent_uploads,
            async_create: config.async_create,
            namespace: config.namespace.clone(),
            ..Default::default()
        }
    }
}

impl From<&Config> for RefreshConfig {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.refresh_interval,
            namespace: config.namespace.clone(),
            import: config.import_enabled,
            cleanup_imported: config.cleanup_imported,
        }
    }
}

// Source the variable from the env - use default if not set
fn from_env_default(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_owned())
}

// Parse the variable from the env - use default if not set or invalid
fn parse_env<T>(var: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let value = from_env_default(var, &default.to_string());
    match value.trim().parse() {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Invalid value {:?} for {}: {}, using {}", value, var, e, default);
            default
        }
    }
}

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The database deployment a `DatabaseBackup` targets.
///
/// Only the fields needed to reach the deployment's backup API are modeled here,
/// the rest of the resource is owned by the deployment operator.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(kind = "DatabaseDeployment", group = "coredb.io", version = "v1alpha1", namespaced)]
#[kube(shortname = "dbdeployment")]
#[serde(rename_all = "camelCase")]
pub struct DatabaseDeploymentSpec {
    /// Override for the URL of the deployment's coordinator service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Secret with a `token` key used as bearer token against the deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret_name: Option<String>,
}

impl DatabaseDeployment {
    pub const DEFAULT_PORT: u16 = 8529;

    /// Base URL of the deployment's HTTP API.
    pub fn endpoint(&self, namespace: &str) -> String {
        match &self.spec.endpoint {
            Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_owned(),
            _ => format!(
                "http://{}.{}.svc:{}",
                self.metadata.name.as_deref().unwrap_or_default(),
                namespace,
                Self::DEFAULT_PORT
            ),
        }
    }
}

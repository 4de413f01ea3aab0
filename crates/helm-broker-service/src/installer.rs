//! Package installer collaborator
//!
//! The broker installs and deletes chart releases through [`HelmClient`].
//! [`HttpHelmClient`] talks JSON over HTTP to an installer service exposing
//! a `releases` resource.

use async_trait::async_trait;
use helm_broker_core::{Chart, ChartValues, Namespace, ReleaseName};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// Installer failures
#[derive(Error, Debug)]
pub enum InstallerError {
    /// The installer could not be reached
    #[error("installer request failed: {0}")]
    Transport(String),

    /// The installer answered with an error status
    #[error("installer rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The installer answered with an unreadable body
    #[error("invalid installer response: {0}")]
    InvalidResponse(String),

    /// Client misconfiguration
    #[error("invalid installer configuration: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for InstallerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            InstallerError::InvalidResponse(err.to_string())
        } else {
            InstallerError::Transport(err.to_string())
        }
    }
}

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResponse {
    pub release_name: ReleaseName,
    pub namespace: Namespace,
    #[serde(default)]
    pub status: Option<String>,
}

/// Installs and deletes chart releases
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HelmClient: Send + Sync {
    /// Install `chart` as `release_name` into `namespace`
    async fn install(
        &self,
        chart: &Chart,
        values: &ChartValues,
        release_name: &ReleaseName,
        namespace: &Namespace,
    ) -> Result<InstallResponse, InstallerError>;

    /// Delete a release; deleting a missing release succeeds
    async fn delete(&self, release_name: &ReleaseName) -> Result<(), InstallerError>;
}

/// Configuration of [`HttpHelmClient`]
#[derive(Debug, Clone)]
pub struct HelmClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for HelmClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Serialize)]
struct InstallBody<'a> {
    release_name: &'a ReleaseName,
    namespace: &'a Namespace,
    chart: &'a Chart,
    values: &'a ChartValues,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

/// HTTP installer client
#[derive(Clone)]
pub struct HttpHelmClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpHelmClient {
    /// Create a client for the installer at `config.base_url`
    pub fn new(config: HelmClientConfig) -> Result<Self, InstallerError> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| InstallerError::Configuration(format!("{}: {}", config.base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InstallerError::Configuration(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn releases_url(&self, release: Option<&ReleaseName>) -> Result<Url, InstallerError> {
        let path = match release {
            Some(name) => format!("releases/{}", name),
            None => "releases".to_string(),
        };
        self.base_url
            .join(&path)
            .map_err(|e| InstallerError::Configuration(e.to_string()))
    }

    async fn rejection(response: reqwest::Response) -> InstallerError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        InstallerError::Rejected { status, message }
    }
}

#[async_trait]
impl HelmClient for HttpHelmClient {
    #[instrument(skip(self, chart, values), fields(release = %release_name, namespace = %namespace))]
    async fn install(
        &self,
        chart: &Chart,
        values: &ChartValues,
        release_name: &ReleaseName,
        namespace: &Namespace,
    ) -> Result<InstallResponse, InstallerError> {
        let url = self.releases_url(None)?;
        let response = self
            .client
            .post(url)
            .json(&InstallBody {
                release_name,
                namespace,
                chart,
                values,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let installed = response.json::<InstallResponse>().await?;
        debug!(status = ?installed.status, "Release installed");
        Ok(installed)
    }

    #[instrument(skip(self), fields(release = %release_name))]
    async fn delete(&self, release_name: &ReleaseName) -> Result<(), InstallerError> {
        let url = self.releases_url(Some(release_name))?;
        let response = self.client.delete(url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("Release already deleted");
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }
}

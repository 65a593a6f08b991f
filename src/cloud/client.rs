//! Control-plane API client implementation.
//!
//! This module provides the HTTP client for the control-plane REST API. It
//! authenticates with a bearer token and unwraps the shared response
//! envelope; it does not retry.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::Credentials;
use crate::error::{ControlPlaneError, Result};

use super::ControlPlane;
use super::types::{
    ConfigKind, ControlPlaneList, ControlPlaneRef, Envelope, StartupConfig, TlsBundle, User,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Path of the cloud lua module archive relative to the API address.
const MODULE_ARCHIVE_PATH: &str = "/api/v1/assets/cloud_lua_module.tar.gz";

type ApiResult<T> = std::result::Result<T, ControlPlaneError>;

/// Control-plane API client.
#[derive(Debug, Clone)]
pub struct CloudClient {
    /// HTTP client.
    client: Client,
    /// API base address without trailing slash.
    base_url: String,
    /// Access token.
    token: String,
    /// Override for the module archive URL.
    module_url: Option<String>,
}

impl CloudClient {
    /// Creates a new client for the given credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(credentials: &Credentials) -> Result<Self> {
        Self::with_timeout(credentials, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(credentials: &Credentials, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ControlPlaneError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: credentials.address.trim_end_matches('/').to_string(),
            token: credentials.token.clone(),
            module_url: None,
        })
    }

    /// Downloads the module archive from `url` instead of the API address.
    #[must_use]
    pub fn with_module_url(mut self, url: Option<String>) -> Self {
        self.module_url = url.filter(|u| !u.is_empty());
        self
    }

    /// Fetches the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn me(&self) -> ApiResult<User> {
        self.get_json("/api/v1/user/me", &[]).await
    }

    /// Lists the control planes of an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_control_planes(&self, org_id: &str) -> ApiResult<Vec<ControlPlaneRef>> {
        let path = format!("/api/v1/orgs/{org_id}/controlplanes");
        let page: ControlPlaneList = self.get_json(&path, &[]).await?;
        Ok(page.list)
    }

    /// Sends an authenticated GET request.
    async fn send(&self, url: &str, query: &[(&str, &str)]) -> ApiResult<reqwest::Response> {
        trace!("GET {url}");

        let response = self
            .client
            .get(url)
            .query(query)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| ControlPlaneError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ControlPlaneError::AuthenticationFailed {
                message: String::from("Invalid access token"),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::api_error(status.as_u16(), body));
        }

        Ok(response)
    }

    /// Fetches an API path and unwraps the response envelope.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.send(&url, query).await?;

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            ControlPlaneError::invalid_response(format!("Failed to parse response: {e}"))
        })?;

        if envelope.status.code != 0 {
            return Err(ControlPlaneError::api_error(200, envelope.status.message));
        }

        envelope
            .payload
            .ok_or_else(|| ControlPlaneError::invalid_response("No payload in response"))
    }
}

#[async_trait]
impl ControlPlane for CloudClient {
    async fn default_cluster(&self) -> ApiResult<ControlPlaneRef> {
        let user = self.me().await?;
        let org_id = user.org_ids.first().ok_or(ControlPlaneError::NoControlPlane)?;

        let cluster = self
            .list_control_planes(org_id)
            .await?
            .into_iter()
            .next()
            .ok_or(ControlPlaneError::NoControlPlane)?;

        debug!(id = %cluster.id, name = %cluster.name, "Resolved default control plane");
        Ok(cluster)
    }

    async fn tls_bundle(&self, cluster_id: &str) -> ApiResult<TlsBundle> {
        let path = format!("/api/v1/controlplanes/{cluster_id}/dp_certificate");
        self.get_json(&path, &[]).await
    }

    async fn script_archive(&self) -> ApiResult<Vec<u8>> {
        let url = self
            .module_url
            .clone()
            .unwrap_or_else(|| format!("{}{MODULE_ARCHIVE_PATH}", self.base_url));

        debug!("Downloading cloud lua module from {url}");
        let response = self.send(&url, &[]).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ControlPlaneError::network(format!("Failed to read archive body: {e}")))?;

        Ok(bytes.to_vec())
    }

    async fn startup_config_template(
        &self,
        cluster_id: &str,
        kind: ConfigKind,
    ) -> ApiResult<String> {
        let path = format!("/api/v1/controlplanes/{cluster_id}/startup_config_tem");
        let config: StartupConfig = self.get_json(&path, &[("task_type", kind.as_query())]).await?;
        Ok(config.configuration)
    }
}

//! HTTP client for the sandbox fleet API

use crate::config::SandboxApiConfig;
use crate::error::{transport_error, Error, Result};
use crate::sandbox::{CommandOutput, SandboxHandle, SandboxInfo, SandboxProvider};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Client for the sandbox fleet control plane
#[derive(Clone)]
pub struct RemoteSandboxProvider {
    /// HTTP client with auth headers installed
    client: Client,
    /// Fleet API settings
    config: SandboxApiConfig,
}

/// One provisioned remote sandbox
pub struct RemoteSandbox {
    /// HTTP client shared with the provider
    client: Client,
    /// Fleet API settings
    config: SandboxApiConfig,
    /// Fleet-assigned id
    sandbox_id: String,
    /// Cleared by the first terminate call
    live: AtomicBool,
}

/// Body for the exec endpoint
#[derive(Serialize)]
struct ExecRequest<'a> {
    command: &'a str,
}

/// Response from sandbox creation
#[derive(Deserialize)]
struct CreateSandboxResponse {
    sandbox_id: String,
}

/// Response from the sandbox listing endpoint
#[derive(Deserialize)]
struct ListSandboxesResponse {
    sandboxes: Vec<SandboxInfo>,
}

/// Delete one sandbox. A sandbox the fleet no longer knows about counts
/// as deleted.
async fn delete_sandbox(client: &Client, config: &SandboxApiConfig, sandbox_id: &str) -> Result<()> {
    let url = format!("{}/v1/sandboxes/{}", config.base_url, sandbox_id);

    let response = client
        .delete(&url)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .send()
        .await
        .map_err(|e| {
            Error::Provisioning(transport_error(
                "Kill sandbox",
                config.request_timeout_secs,
                e,
            ))
        })?;

    let status = response.status();

    if status.is_success() {
        debug!(sandbox_id, "sandbox killed");
        Ok(())
    } else if status == StatusCode::NOT_FOUND {
        debug!(sandbox_id, "sandbox already gone");
        Ok(())
    } else {
        let error_text = response.text().await.unwrap_or_default();
        Err(Error::Provisioning(format!(
            "Kill sandbox failed ({}): {}",
            status, error_text
        )))
    }
}

impl RemoteSandboxProvider {
    /// Create a new fleet client
    pub fn new(config: SandboxApiConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        headers.insert(
            "X-API-Key",
            header::HeaderValue::from_str(config.api_key.expose_secret())
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(RemoteSandboxProvider { client, config })
    }
}

#[async_trait]
impl SandboxProvider for RemoteSandboxProvider {
    async fn provision(&self) -> Result<Box<dyn SandboxHandle>> {
        let url = format!("{}/v1/sandboxes", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .send()
            .await
            .map_err(|e| {
                Error::Provisioning(transport_error(
                    "Create sandbox",
                    self.config.request_timeout_secs,
                    e,
                ))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provisioning(format!(
                "Create sandbox failed ({}): {}",
                status, error_text
            )));
        }

        let body = response
            .json::<CreateSandboxResponse>()
            .await
            .map_err(|e| Error::Provisioning(format!("Invalid create response: {}", e)))?;

        debug!(sandbox_id = %body.sandbox_id, "provisioned sandbox");

        Ok(Box::new(RemoteSandbox {
            client: self.client.clone(),
            config: self.config.clone(),
            sandbox_id: body.sandbox_id,
            live: AtomicBool::new(true),
        }))
    }

    async fn list_sandboxes(&self) -> Result<Vec<SandboxInfo>> {
        let url = format!("{}/v1/sandboxes", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .send()
            .await
            .map_err(|e| {
                Error::Provisioning(transport_error(
                    "List sandboxes",
                    self.config.request_timeout_secs,
                    e,
                ))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provisioning(format!(
                "List sandboxes failed ({}): {}",
                status, error_text
            )));
        }

        let body = response
            .json::<ListSandboxesResponse>()
            .await
            .map_err(|e| Error::Provisioning(format!("Invalid list response: {}", e)))?;

        Ok(body.sandboxes)
    }

    async fn kill_sandbox(&self, sandbox_id: &str) -> Result<()> {
        delete_sandbox(&self.client, &self.config, sandbox_id).await
    }
}

#[async_trait]
impl SandboxHandle for RemoteSandbox {
    fn id(&self) -> &str {
        &self.sandbox_id
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let url = format!(
            "{}/v1/sandboxes/{}/exec",
            self.config.base_url, self.sandbox_id
        );

        debug!(sandbox_id = %self.sandbox_id, command, "running sandbox command");

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.command_timeout_secs))
            .json(&ExecRequest { command })
            .send()
            .await
            .map_err(|e| {
                Error::Transfer(transport_error(
                    "Command execution",
                    self.config.command_timeout_secs,
                    e,
                ))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Transfer(format!(
                "Command execution failed ({}): {}",
                status, error_text
            )));
        }

        response
            .json::<CommandOutput>()
            .await
            .map_err(|e| Error::Transfer(format!("Invalid command response: {}", e)))
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let url = format!(
            "{}/v1/sandboxes/{}/files",
            self.config.base_url, self.sandbox_id
        );

        let response = self
            .client
            .put(&url)
            .query(&[("path", path)])
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| {
                Error::Transfer(transport_error(
                    "File upload",
                    self.config.request_timeout_secs,
                    e,
                ))
            })?;

        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(Error::Transfer(format!(
                "File upload failed ({}): {}",
                status, error_text
            )))
        }
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/v1/sandboxes/{}/files",
            self.config.base_url, self.sandbox_id
        );

        let response = self
            .client
            .get(&url)
            .query(&[("path", path)])
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .send()
            .await
            .map_err(|e| {
                Error::Transfer(transport_error(
                    "File download",
                    self.config.request_timeout_secs,
                    e,
                ))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Transfer(format!(
                "File download failed ({}): {}",
                status, error_text
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transfer(format!("File download: {}", e)))?;

        Ok(bytes.to_vec())
    }

    async fn terminate(&self) -> Result<()> {
        if !self.live.swap(false, Ordering::SeqCst) {
            debug!(sandbox_id = %self.sandbox_id, "terminate on dead handle is a no-op");
            return Ok(());
        }

        delete_sandbox(&self.client, &self.config, &self.sandbox_id).await
    }
}

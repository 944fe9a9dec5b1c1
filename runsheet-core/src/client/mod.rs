//! Typed REST client for the `/api` surface, plus the per-view
//! [`StepUpdateCoordinator`] built on top of it.

mod coordinator;

pub use coordinator::{CoordinatorEvent, StepUpdateCoordinator};

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{RunsheetError, RunsheetResult};
use crate::models::{
    BatchStepUpdate, Execution, ExecutionUpdate, NewExecution, NewRunbook, Runbook,
    RunbookUpdate, StepPatch, StepUpdate,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub storage: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// The execution calls the step update coordinator depends on.
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    async fn get_execution(&self, id: Uuid) -> RunsheetResult<Execution>;

    async fn patch_step(
        &self,
        id: Uuid,
        step_idx: usize,
        patch: &StepPatch,
    ) -> RunsheetResult<Execution>;

    async fn patch_steps_batch(
        &self,
        id: Uuid,
        updates: &[StepUpdate],
    ) -> RunsheetResult<Execution>;

    async fn update_execution(
        &self,
        id: Uuid,
        update: &ExecutionUpdate,
    ) -> RunsheetResult<Execution>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RunsheetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> RunsheetResult<Self> {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends `request` and decodes a 2xx body. A 404 becomes the lookup
    /// error built by `not_found`; other failures keep the server's
    /// `{error}` message.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        not_found: fn(String) -> RunsheetError,
    ) -> RunsheetResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| RunsheetError::ApiParseError(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or(text);
        debug!(status = status.as_u16(), message = %message, "API request rejected");

        if status == StatusCode::NOT_FOUND {
            return Err(not_found(message));
        }
        Err(RunsheetError::ApiRequestFailed {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_runbook<T: DeserializeOwned>(&self, request: RequestBuilder) -> RunsheetResult<T> {
        self.send(request, RunsheetError::RunbookNotFound).await
    }

    async fn send_execution<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> RunsheetResult<T> {
        self.send(request, RunsheetError::ExecutionNotFound).await
    }

    pub async fn health(&self) -> RunsheetResult<HealthStatus> {
        let response = self.client.get(self.url("/api/health")).send().await?;
        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| RunsheetError::ApiParseError(e.to_string()))
    }

    pub async fn list_runbooks(&self) -> RunsheetResult<Vec<Runbook>> {
        self.send_runbook(self.client.get(self.url("/api/runbooks")))
            .await
    }

    pub async fn get_runbook(&self, id: Uuid) -> RunsheetResult<Runbook> {
        self.send_runbook(self.client.get(self.url(&format!("/api/runbooks/{}", id))))
            .await
    }

    /// Rejects a missing title or step text before anything is sent.
    pub async fn create_runbook(&self, runbook: &NewRunbook) -> RunsheetResult<Runbook> {
        runbook.validate()?;
        self.send_runbook(self.client.post(self.url("/api/runbooks")).json(runbook))
            .await
    }

    pub async fn update_runbook(
        &self,
        id: Uuid,
        update: &RunbookUpdate,
    ) -> RunsheetResult<Runbook> {
        update.validate()?;
        self.send_runbook(
            self.client
                .put(self.url(&format!("/api/runbooks/{}", id)))
                .json(update),
        )
        .await
    }

    pub async fn delete_runbook(&self, id: Uuid) -> RunsheetResult<()> {
        let _: serde_json::Value = self
            .send_runbook(
                self.client
                    .delete(self.url(&format!("/api/runbooks/{}", id))),
            )
            .await?;
        Ok(())
    }

    pub async fn start_execution(&self, request: &NewExecution) -> RunsheetResult<Execution> {
        self.send(
            self.client.post(self.url("/api/executions")).json(request),
            RunsheetError::RunbookNotFound,
        )
        .await
    }

    pub async fn list_executions(&self) -> RunsheetResult<Vec<Execution>> {
        self.send_execution(self.client.get(self.url("/api/executions")))
            .await
    }

    pub async fn delete_execution(&self, id: Uuid) -> RunsheetResult<()> {
        let _: serde_json::Value = self
            .send_execution(
                self.client
                    .delete(self.url(&format!("/api/executions/{}", id))),
            )
            .await?;
        Ok(())
    }

    pub async fn upload_bytes(&self, file_name: &str, bytes: Vec<u8>) -> RunsheetResult<String> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part("file", part);

        let response: UploadResponse = self
            .send(
                self.client.post(self.url("/api/upload")).multipart(form),
                RunsheetError::UploadFailed,
            )
            .await?;
        Ok(response.url)
    }

    pub async fn upload_file(&self, path: &Path) -> RunsheetResult<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        self.upload_bytes(file_name, bytes).await
    }
}

#[async_trait]
impl ExecutionApi for ApiClient {
    async fn get_execution(&self, id: Uuid) -> RunsheetResult<Execution> {
        self.send_execution(self.client.get(self.url(&format!("/api/executions/{}", id))))
            .await
    }

    async fn patch_step(
        &self,
        id: Uuid,
        step_idx: usize,
        patch: &StepPatch,
    ) -> RunsheetResult<Execution> {
        self.send_execution(
            self.client
                .patch(self.url(&format!("/api/executions/{}/step/{}", id, step_idx)))
                .json(patch),
        )
        .await
    }

    async fn patch_steps_batch(
        &self,
        id: Uuid,
        updates: &[StepUpdate],
    ) -> RunsheetResult<Execution> {
        let body = BatchStepUpdate::new(updates.to_vec());
        self.send_execution(
            self.client
                .patch(self.url(&format!("/api/executions/{}/steps/batch", id)))
                .json(&body),
        )
        .await
    }

    async fn update_execution(
        &self,
        id: Uuid,
        update: &ExecutionUpdate,
    ) -> RunsheetResult<Execution> {
        self.send_execution(
            self.client
                .put(self.url(&format!("/api/executions/{}", id)))
                .json(update),
        )
        .await
    }
}

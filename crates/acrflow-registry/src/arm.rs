//! Azure Resource Manager implementation of [`RegistryClient`]
//!
//! Talks to the `Microsoft.ContainerRegistry` REST API with a caller-supplied
//! bearer token.

use crate::client::RegistryClient;
use crate::error::{RegistryError, Result};
use crate::model::{BuildRequest, BuildStatus, RegistryRef};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MANAGEMENT_URL: &str = "https://management.azure.com";
pub const API_VERSION: &str = "2019-06-01-preview";

const LRO_POLL_INTERVAL: Duration = Duration::from_secs(2);
const LRO_MAX_POLLS: u32 = 150;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceUploadDefinition {
    upload_url: String,
    relative_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogLink {
    log_link: Option<String>,
}

pub struct ArmRegistryClient {
    http: reqwest::Client,
    base_url: String,
    subscription_id: String,
    token: String,
}

impl ArmRegistryClient {
    pub fn new(subscription_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_MANAGEMENT_URL.to_string(),
            subscription_id: subscription_id.into(),
            token: token.into(),
        }
    }

    /// Use a different management endpoint (sovereign clouds, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn registry_url(&self, registry: &RegistryRef) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerRegistry/registries/{}",
            self.base_url, self.subscription_id, registry.resource_group, registry.registry_name
        )
    }

    fn url(&self, registry: &RegistryRef, suffix: &str) -> String {
        format!(
            "{}/{}?api-version={}",
            self.registry_url(registry),
            suffix,
            API_VERSION
        )
    }

    async fn post(&self, url: &str, body: Option<&Value>) -> Result<reqwest::Response> {
        tracing::debug!("POST {}", url);
        let mut request = self.http.post(url).bearer_auth(&self.token);
        request = match body {
            Some(body) => request.json(body),
            None => request.header(reqwest::header::CONTENT_LENGTH, 0),
        };
        check(request.send().await?).await
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        tracing::debug!("GET {}", url);
        check(self.http.get(url).bearer_auth(&self.token).send().await?).await
    }

    /// 202 Accepted を返した scheduleRun の完了を Location ヘッダで待つ
    async fn wait_for_run(&self, location: &str) -> Result<String> {
        for _ in 0..LRO_MAX_POLLS {
            tokio::time::sleep(LRO_POLL_INTERVAL).await;
            let response = self.get(location).await?;
            if response.status() == StatusCode::ACCEPTED {
                continue;
            }
            let body: Value = response.json().await?;
            return parse_run_id(&body);
        }
        Err(RegistryError::UnexpectedResponse(
            "timed out waiting for the build to be queued".to_string(),
        ))
    }
}

#[async_trait]
impl RegistryClient for ArmRegistryClient {
    async fn upload_source(&self, registry: &RegistryRef, archive: &Path) -> Result<String> {
        let url = self.url(registry, "listBuildSourceUploadUrl");
        let upload: SourceUploadDefinition = self.post(&url, None).await?.json().await?;

        let content = tokio::fs::read(archive).await?;
        tracing::info!(
            "Uploading build context ({} bytes) to {}",
            content.len(),
            registry
        );
        let response = self
            .http
            .put(&upload.upload_url)
            .header("x-ms-blob-type", "BlockBlob")
            .body(content)
            .send()
            .await?;
        check(response).await?;

        Ok(upload.relative_path)
    }

    async fn start_build(&self, registry: &RegistryRef, request: &BuildRequest) -> Result<String> {
        let url = self.url(registry, "scheduleRun");
        let body = docker_build_body(request);
        let response = self.post(&url, Some(&body)).await?;

        if response.status() == StatusCode::ACCEPTED {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    RegistryError::UnexpectedResponse(
                        "202 Accepted without a Location header".to_string(),
                    )
                })?;
            return self.wait_for_run(&location).await;
        }

        let run: Value = response.json().await?;
        let build_id = parse_run_id(&run)?;
        tracing::info!("Queued build {} on {}", build_id, registry);
        Ok(build_id)
    }

    async fn build_status(&self, registry: &RegistryRef, build_id: &str) -> Result<BuildStatus> {
        let url = self.url(registry, &format!("runs/{}", build_id));
        let response = self.get(&url).await.map_err(|e| not_found(e, build_id))?;
        let run: Value = response.json().await?;
        let status = run["properties"]["status"].as_str().ok_or_else(|| {
            RegistryError::UnexpectedResponse("run has no properties.status".to_string())
        })?;
        Ok(BuildStatus::parse(status))
    }

    async fn log_location(&self, registry: &RegistryRef, build_id: &str) -> Result<String> {
        let url = self.url(registry, &format!("runs/{}/listLogSasUrl", build_id));
        let response = self.post(&url, None).await.map_err(|e| not_found(e, build_id))?;
        let link: LogLink = response.json().await?;
        link.log_link.ok_or_else(|| {
            RegistryError::UnexpectedResponse(format!("no log link for build {}", build_id))
        })
    }

    async fn cancel_build(&self, registry: &RegistryRef, build_id: &str) -> Result<()> {
        let url = self.url(registry, &format!("runs/{}/cancel", build_id));
        self.post(&url, None)
            .await
            .map_err(|e| not_found(e, build_id))?;
        tracing::info!("Cancel requested for build {}", build_id);
        Ok(())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = api_error_message(&body).unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(RegistryError::AuthenticationFailed(message))
        }
        _ => Err(RegistryError::Api {
            status: status.as_u16(),
            message,
        }),
    }
}

fn not_found(error: RegistryError, build_id: &str) -> RegistryError {
    match error {
        RegistryError::Api { status: 404, .. } => RegistryError::BuildNotFound(build_id.to_string()),
        other => other,
    }
}

/// `{"error": {"code": ..., "message": ...}}` からメッセージを取り出す
fn api_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = &value["error"];
    let message = error["message"].as_str()?;
    match error["code"].as_str() {
        Some(code) => Some(format!("{}: {}", code, message)),
        None => Some(message.to_string()),
    }
}

fn parse_run_id(run: &Value) -> Result<String> {
    run["properties"]["runId"]
        .as_str()
        .or_else(|| run["name"].as_str())
        .map(str::to_string)
        .ok_or_else(|| RegistryError::UnexpectedResponse("run has no runId".to_string()))
}

fn docker_build_body(request: &BuildRequest) -> Value {
    let arguments: Vec<Value> = request
        .build_args
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value, "isSecret": false }))
        .collect();

    let mut platform = json!({
        "os": request.platform.os,
        "architecture": request.platform.architecture,
    });
    if let Some(variant) = &request.platform.variant {
        platform["variant"] = json!(variant);
    }

    json!({
        "type": "DockerBuildRequest",
        "imageNames": request.image_names,
        "isPushEnabled": request.push && !request.image_names.is_empty(),
        "noCache": request.no_cache,
        "dockerFilePath": request.dockerfile,
        "arguments": arguments,
        "platform": platform,
        "sourceLocation": request.source_location,
        "timeout": request.timeout_secs,
    })
}

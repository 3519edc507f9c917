//! HTTP client for the simulation host API.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::pipeline::{JobStatusEntry, Stage, StatusSnapshot};
use crate::retry::{retry_transient, RetryConfig};

use super::blob::BlobClient;
use super::{AccessToken, ArtifactTransfer, HostConfig, HostError, JobSubmitter, StatusSource};

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitJobRequest {
    project_id: Uuid,
}

fn login_endpoint() -> &'static str {
    "api/Authentication/Login"
}

fn status_endpoint(project_id: Uuid) -> String {
    format!("api/project/GetJobsStatus/{}", project_id)
}

fn submit_endpoint(stage: Stage) -> &'static str {
    match stage {
        Stage::CfdRans => "api/CFDrans/SubmitJob",
        Stage::Synthesis => "api/Synthesis/SubmitJob",
        Stage::Aep => "api/AEP/SubmitJob",
    }
}

fn upload_uri_endpoint(stage: Stage, project_id: Uuid) -> String {
    match stage {
        Stage::CfdRans => format!("api/CFDRans/GetProjectInputUploadUri/{}", project_id),
        Stage::Synthesis => format!("api/Synthesis/GetSynthesisInputUploadUri/{}", project_id),
        Stage::Aep => format!("api/AEP/GetAEPInputUploadUri/{}", project_id),
    }
}

fn output_uri_endpoint(project_id: Uuid) -> String {
    format!("api/Project/GetProjectOutputUri/{}", project_id)
}

/// Host API client.
///
/// Logs in lazily on first use and once more if the host answers 401.
/// Anonymous access is used when no username is configured.
pub struct HostClient {
    client: Client,
    config: HostConfig,
    retry: RetryConfig,
    blobs: BlobClient,
    /// Bearer token (cleared on auth failure).
    token: Arc<RwLock<Option<AccessToken>>>,
}

impl HostClient {
    pub fn new(config: HostConfig, retry: RetryConfig) -> Result<Self, HostError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HostError::from_reqwest)?;
        let blobs = BlobClient::new(timeout)?;

        Ok(Self {
            client,
            config,
            retry,
            blobs,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url(), endpoint.trim_start_matches('/'))
    }

    fn has_credentials(&self) -> bool {
        !self.config.username.is_empty()
    }

    async fn login(&self) -> Result<AccessToken, HostError> {
        let request = LoginRequest {
            email: &self.config.username,
            password: &self.config.password,
        };

        let response = self
            .client
            .post(self.url(login_endpoint()))
            .json(&request)
            .send()
            .await
            .map_err(HostError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::BAD_REQUEST
        {
            return Err(HostError::AuthenticationFailed(format!(
                "host rejected credentials (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(HostError::Status {
                status: status.as_u16(),
                endpoint: login_endpoint().to_string(),
            });
        }

        let body = response.text().await.map_err(HostError::from_reqwest)?;
        let token = parse_text_payload(&body).ok_or_else(|| {
            HostError::AuthenticationFailed("empty token in login response".into())
        })?;

        info!("Authenticated with host as {}", self.config.username);
        let token = AccessToken::new(token);
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Current bearer token, logging in if needed.
    pub async fn access_token(&self) -> Result<AccessToken, HostError> {
        if !self.has_credentials() {
            return Ok(AccessToken::new(""));
        }
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.login().await
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        token: &AccessToken,
        body: Option<&serde_json::Value>,
    ) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if !token.as_str().is_empty() {
            builder = builder.bearer_auth(token.as_str());
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
    }

    /// Send an authenticated request, re-authenticating once on 401.
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, HostError> {
        let url = self.url(endpoint);
        let token = self.access_token().await?;

        let response = self
            .request(method.clone(), &url, &token, body)
            .send()
            .await
            .map_err(HostError::from_reqwest)?;

        if response.status() == StatusCode::UNAUTHORIZED && self.has_credentials() {
            warn!("Host session expired, re-authenticating");
            {
                let mut session = self.token.write().await;
                *session = None;
            }
            let token = self.login().await?;

            let response = self
                .request(method, &url, &token, body)
                .send()
                .await
                .map_err(HostError::from_reqwest)?;
            return check_status(response, endpoint);
        }

        check_status(response, endpoint)
    }

    async fn get_text(&self, endpoint: &str) -> Result<String, HostError> {
        let response = self.send(Method::GET, endpoint, None).await?;
        response.text().await.map_err(HostError::from_reqwest)
    }

    /// GET an endpoint whose body is a single (possibly JSON-quoted) URI.
    async fn get_uri(&self, endpoint: &str, operation: &str) -> Result<String, HostError> {
        let body = retry_transient(&self.retry, operation, || self.get_text(endpoint)).await?;
        parse_text_payload(&body)
            .ok_or_else(|| HostError::InvalidResponse(format!("empty URI from {}", endpoint)))
    }
}

fn check_status(response: Response, endpoint: &str) -> Result<Response, HostError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(HostError::Status {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
        })
    }
}

/// Unwrap a plain-text or JSON-string body. Empty payloads are rejected.
pub(crate) fn parse_text_payload(body: &str) -> Option<String> {
    let trimmed = body.trim();
    let value = if trimmed.starts_with('"') {
        serde_json::from_str::<String>(trimmed).ok()?
    } else {
        trimmed.to_string()
    };
    (!value.is_empty()).then_some(value)
}

#[async_trait]
impl StatusSource for HostClient {
    async fn fetch_statuses(&self, project_id: Uuid) -> Result<StatusSnapshot, HostError> {
        let endpoint = status_endpoint(project_id);
        let body = self.get_text(&endpoint).await?;
        let entries: Vec<JobStatusEntry> = serde_json::from_str(&body)
            .map_err(|e| HostError::InvalidResponse(format!("job statuses: {}", e)))?;
        debug!("Fetched {} job statuses for project {}", entries.len(), project_id);
        Ok(StatusSnapshot::new(entries))
    }
}

#[async_trait]
impl JobSubmitter for HostClient {
    async fn submit_job(&self, stage: Stage, project_id: Uuid) -> Result<AccessToken, HostError> {
        let body = serde_json::to_value(SubmitJobRequest { project_id })
            .map_err(|e| HostError::ApiError(e.to_string()))?;
        self.send(Method::POST, submit_endpoint(stage), Some(&body))
            .await?;
        debug!("Submitted {} job for project {}", stage, project_id);
        self.access_token().await
    }
}

#[async_trait]
impl ArtifactTransfer for HostClient {
    async fn input_upload_uri(&self, stage: Stage, project_id: Uuid) -> Result<String, HostError> {
        let endpoint = upload_uri_endpoint(stage, project_id);
        self.get_uri(&endpoint, &format!("upload_uri_{}", stage)).await
    }

    async fn output_download_uri(&self, project_id: Uuid) -> Result<String, HostError> {
        let endpoint = output_uri_endpoint(project_id);
        self.get_uri(&endpoint, "output_uri").await
    }

    async fn upload(&self, destination_uri: &str, local_path: &Path) -> Result<(), HostError> {
        let start = Instant::now();
        let result = self.blobs.put_file(destination_uri, local_path).await;
        observe_transfer("upload", start, result.is_ok());
        let bytes = result?;
        info!("Uploaded {:?} ({} bytes)", local_path, bytes);
        Ok(())
    }

    async fn download(&self, source_uri: &str, destination: &Path) -> Result<PathBuf, HostError> {
        let start = Instant::now();
        let result = self.blobs.get_to_dir(source_uri, destination).await;
        observe_transfer("download", start, result.is_ok());
        result
    }
}

fn observe_transfer(direction: &str, start: Instant, ok: bool) {
    let result = if ok { "success" } else { "failure" };
    metrics::TRANSFER_DURATION
        .with_label_values(&[direction, result])
        .observe(start.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_payload() {
        assert_eq!(parse_text_payload("abc.def").unwrap(), "abc.def");
        assert_eq!(parse_text_payload("  \"abc.def\"\n").unwrap(), "abc.def");
        assert_eq!(
            parse_text_payload("\"https://blob/x.zip?sig=a\\u0026b\"").unwrap(),
            "https://blob/x.zip?sig=a&b"
        );
        assert!(parse_text_payload("").is_none());
        assert!(parse_text_payload("\"\"").is_none());
    }

    #[test]
    fn test_endpoints() {
        let id = Uuid::nil();
        assert_eq!(
            status_endpoint(id),
            "api/project/GetJobsStatus/00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(submit_endpoint(Stage::CfdRans), "api/CFDrans/SubmitJob");
        assert_eq!(submit_endpoint(Stage::Aep), "api/AEP/SubmitJob");
        assert!(upload_uri_endpoint(Stage::Synthesis, id)
            .starts_with("api/Synthesis/GetSynthesisInputUploadUri/"));
        assert!(output_uri_endpoint(id).starts_with("api/Project/GetProjectOutputUri/"));
    }

    #[test]
    fn test_url_joining() {
        let client = HostClient::new(
            HostConfig::new("https://sim.example.net/"),
            RetryConfig::none(),
        )
        .unwrap();
        assert_eq!(
            client.url("api/AEP/SubmitJob"),
            "https://sim.example.net/api/AEP/SubmitJob"
        );
        assert_eq!(client.url("/api/x"), "https://sim.example.net/api/x");
    }

    #[test]
    fn test_submit_body_shape() {
        let body = serde_json::to_value(SubmitJobRequest {
            project_id: Uuid::nil(),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "projectId": "00000000-0000-0000-0000-000000000000" })
        );
    }

    #[tokio::test]
    async fn test_anonymous_token_without_credentials() {
        let client =
            HostClient::new(HostConfig::new("http://127.0.0.1:9"), RetryConfig::none()).unwrap();
        let token = client.access_token().await.unwrap();
        assert_eq!(token.as_str(), "");
    }
}

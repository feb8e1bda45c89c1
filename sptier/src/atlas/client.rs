//! Atlas Stream Processing REST client.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::digest::DigestAuth;
use super::retry::{with_retry, RetryConfig};
use crate::catalog::ProcessorCatalog;
use crate::config::{AtlasSettings, RuntimeSettings};
use crate::deploy::{ProcessorStarter, ProviderRejection, StartOutcome};
use crate::errors::AdvisorError;
use crate::pipeline::ProcessorDefinition;

/// Media type for general Stream Processing calls.
pub const ACCEPT_DEFAULT: &str = "application/vnd.atlas.2024-05-30+json";
/// Media type required by `:startWith` for tier selection.
pub const ACCEPT_TIER: &str = "application/vnd.atlas.2025-03-12+json";

const USER_AGENT: &str = concat!("sptier/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle state reported by Atlas.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessorStatus {
    /// Processor name.
    #[serde(default)]
    pub name: String,
    /// `CREATED`, `STARTED`, `STOPPED`, `FAILED`, ...
    #[serde(default)]
    pub state: String,
    /// Tier the processor runs on, when started.
    #[serde(default)]
    pub tier: Option<String>,
    /// Failure detail for `FAILED` processors.
    #[serde(default, rename = "errorMsg")]
    pub error_msg: Option<String>,
}

/// Client for one stream processing workspace.
#[derive(Debug)]
pub struct AtlasClient {
    http: reqwest::Client,
    base: String,
    auth: DigestAuth,
    retry: RetryConfig,
    poll_interval: Duration,
}

impl AtlasClient {
    /// Builds a client from settings.
    ///
    /// # Errors
    ///
    /// `Config` when no workspace is configured, `Provider` when the HTTP
    /// client cannot be built.
    pub fn new(settings: &AtlasSettings, runtime: &RuntimeSettings) -> Result<Self, AdvisorError> {
        let base = settings.workspace_url()?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdvisorError::provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            auth: DigestAuth::new(&settings.public_key, &settings.private_key),
            retry: RetryConfig::default(),
            poll_interval: runtime.poll_interval,
        })
    }

    /// Sets the retry policy for reads.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Workspace base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, AdvisorError> {
        let raw = format!("{}/{path}", self.base);
        Url::parse(&raw).map_err(|e| AdvisorError::config(format!("invalid Atlas URL '{raw}': {e}")))
    }

    /// Sends one request, answering a digest challenge once if needed.
    async fn execute(&self, method: Method, url: &Url, accept: &str, body: Option<&Value>) -> Result<Response, AdvisorError> {
        let uri = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };

        let mut challenged = false;
        loop {
            let mut request = self.http.request(method.clone(), url.clone()).header(ACCEPT, accept);
            if let Some(body) = body {
                request = request.json(body);
            }
            if let Some(authorization) = self.auth.authorization(method.as_str(), &uri) {
                request = request.header(AUTHORIZATION, authorization);
            }

            let response = request
                .send()
                .await
                .map_err(|e| AdvisorError::provider(format!("{method} {url} failed: {e}")))?;

            if response.status() == StatusCode::UNAUTHORIZED && !challenged {
                let challenge = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if let Some(challenge) = challenge {
                    self.auth.update_challenge(&challenge)?;
                    challenged = true;
                    continue;
                }
            }

            tracing::debug!(%method, %url, status = response.status().as_u16(), "Atlas response");
            return Ok(response);
        }
    }

    /// GET returning JSON; non-2xx statuses become errors.
    async fn get_json(&self, path: &str) -> Result<Value, AdvisorError> {
        let url = self.url(path)?;
        let url = &url;
        with_retry(&self.retry, path, move || async move {
            let response = self.execute(Method::GET, url, ACCEPT_DEFAULT, None).await?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| AdvisorError::provider(format!("failed to read response: {e}")))?;
            if status == StatusCode::NOT_FOUND {
                return Err(AdvisorError::ProcessorNotFound(path.to_string()));
            }
            if !status.is_success() {
                return Err(ProviderRejection::from_body(status.as_u16(), &text).into());
            }
            Ok(serde_json::from_str(&text)?)
        })
        .await
    }

    /// Fetches a processor document.
    pub async fn get_processor(&self, name: &str) -> Result<Value, AdvisorError> {
        self.get_json(&format!("processor/{name}"))
            .await
            .map_err(|err| match err {
                AdvisorError::ProcessorNotFound(_) => AdvisorError::ProcessorNotFound(name.to_string()),
                other => other,
            })
    }

    /// Fetches a processor's lifecycle state.
    pub async fn processor_status(&self, name: &str) -> Result<ProcessorStatus, AdvisorError> {
        Ok(serde_json::from_value(self.get_processor(name).await?)?)
    }

    /// Lists processor documents in the workspace.
    pub async fn list_processors(&self) -> Result<Vec<Value>, AdvisorError> {
        let value = self.get_json("processors").await?;
        Ok(match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("results") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        })
    }

    /// Requests a start on `tier` and waits for the processor to run.
    ///
    /// A refused request or a processor that ends up `FAILED` is a rejection.
    pub async fn start_with(&self, name: &str, tier: &str) -> Result<StartOutcome, AdvisorError> {
        let url = self.url(&format!("processor/{name}:startWith"))?;
        let body = json!({ "tier": tier });
        let response = self.execute(Method::POST, &url, ACCEPT_TIER, Some(&body)).await?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| AdvisorError::provider(format!("failed to read response: {e}")))?;
            let rejection = ProviderRejection::from_body(status.as_u16(), &text);
            tracing::debug!(processor = name, tier, status = status.as_u16(), detail = %rejection.detail, "startWith refused");
            return Ok(StartOutcome::Rejected(rejection));
        }

        self.wait_until_started(name).await
    }

    /// Polls until the processor reports `STARTED` or `FAILED`. Unbounded;
    /// callers wrap it in their attempt timeout.
    async fn wait_until_started(&self, name: &str) -> Result<StartOutcome, AdvisorError> {
        loop {
            let status = self.processor_status(name).await?;
            match status.state.as_str() {
                "STARTED" => {
                    tracing::info!(processor = name, tier = status.tier.as_deref().unwrap_or("-"), "Processor running");
                    return Ok(StartOutcome::Accepted);
                }
                "FAILED" => {
                    let detail = status
                        .error_msg
                        .unwrap_or_else(|| format!("processor '{name}' entered FAILED state"));
                    return Ok(StartOutcome::Rejected(ProviderRejection::new(0, detail)));
                }
                state => {
                    tracing::debug!(processor = name, state, "Waiting for processor to start");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl ProcessorStarter for AtlasClient {
    async fn start_with_tier(&self, processor: &str, tier: &str) -> Result<StartOutcome, AdvisorError> {
        self.start_with(processor, tier).await
    }
}

#[async_trait]
impl ProcessorCatalog for AtlasClient {
    async fn fetch_definition(&self, name: &str) -> Result<ProcessorDefinition, AdvisorError> {
        let document = self.get_processor(name).await?;
        Ok(serde_json::from_value(document)?)
    }

    async fn list_names(&self) -> Result<Vec<String>, AdvisorError> {
        let mut names: Vec<String> = self
            .list_processors()
            .await?
            .iter()
            .filter_map(|p| p.get("name").and_then(Value::as_str).map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

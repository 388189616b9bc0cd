use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tfplug::Context;
use url::Url;

use super::error::ApiError;

pub const DEFAULT_USER_AGENT: &str = "terraform-provider-forward/dev";

/// Error bodies are embedded in messages up to this many bytes
const ERROR_BODY_LIMIT: usize = 1 << 14;

/// Inputs for building a Forward Networks API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub insecure: bool,
    pub user_agent: String,
    /// Zero or negative means the default of 3
    pub max_retries: i32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            insecure: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}

/// Forward Networks API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: Url,
    auth_header: String,
    user_agent: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl Client {
    /// Validate the configuration and build the underlying HTTP client
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let raw_url = config.base_url.trim();
        if raw_url.is_empty() {
            return Err(ApiError::InvalidConfig("base URL must be provided".to_string()));
        }

        let mut base_url = match Url::parse(raw_url) {
            Ok(url) if !url.cannot_be_a_base() => url,
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
                return Err(ApiError::InvalidConfig(
                    "base URL must include an HTTP or HTTPS scheme".to_string(),
                ))
            }
            Err(e) => {
                return Err(ApiError::InvalidConfig(format!(
                    "unable to parse base URL: {}",
                    e
                )))
            }
        };
        let trimmed_path = base_url.path().trim_end_matches('/').to_string();
        base_url.set_path(&trimmed_path);

        if config.api_key.is_empty() {
            return Err(ApiError::InvalidConfig("API key must be provided".to_string()));
        }

        let user_agent = match config.user_agent.trim() {
            "" => DEFAULT_USER_AGENT.to_string(),
            ua => ua.to_string(),
        };

        let max_retries = u32::try_from(config.max_retries)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(3);

        let retry_delay = if config.retry_delay.is_zero() {
            Duration::from_millis(500)
        } else {
            config.retry_delay
        };

        let timeout = if config.timeout.is_zero() {
            Duration::from_secs(60)
        } else {
            config.timeout
        };

        if config.insecure {
            tracing::warn!("TLS certificate verification disabled for {}", base_url);
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("unable to build HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url,
                auth_header: format!("Bearer {}", config.api_key),
                user_agent,
                max_retries,
                retry_delay,
            }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Snapshot operations
    pub fn snapshots(&self) -> super::snapshots::SnapshotsApi<'_> {
        super::snapshots::SnapshotsApi::new(self)
    }

    /// Intent check operations
    pub fn intent_checks(&self) -> super::intent_checks::IntentChecksApi<'_> {
        super::intent_checks::IntentChecksApi::new(self)
    }

    /// Network Query Engine operations
    pub fn nqe(&self) -> super::nqe::NqeApi<'_> {
        super::nqe::NqeApi::new(self)
    }

    /// Path analysis operations
    pub fn path_analysis(&self) -> super::path_analysis::PathAnalysisApi<'_> {
        super::path_analysis::PathAnalysisApi::new(self)
    }

    /// Platform version
    pub fn version(&self) -> super::version::VersionApi<'_> {
        super::version::VersionApi::new(self)
    }

    /// Absolute URL for an API path. Segments are percent-encoded; the path
    /// of the base URL is replaced, matching how absolute references resolve.
    pub(crate) fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
        let mut url = self.inner.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        url
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.inner.retry_delay.saturating_mul(factor)
    }

    /// Send a request, retrying transport errors, 429 and 5xx (except 501)
    /// with exponential backoff. Other responses are returned as-is.
    pub(crate) async fn send(
        &self,
        ctx: &Context,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<Response, ApiError> {
        let mut attempt = 0;

        loop {
            if ctx.is_cancelled() {
                return Err(ApiError::Cancelled);
            }

            let mut request = self
                .inner
                .http_client
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, &self.inner.auth_header)
                .header(USER_AGENT, &self.inner.user_agent)
                .header(ACCEPT, "application/json");
            if let Some(body) = &body {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }

            tracing::debug!("{} request to: {}", method, url);

            let outcome = tokio::select! {
                _ = ctx.done() => return Err(ApiError::Cancelled),
                outcome = request.send() => outcome,
            };

            let last_error = match outcome {
                Ok(response) if !should_retry(response.status()) => return Ok(response),
                Ok(response) => ApiError::RetriesExhausted(response.status().as_u16()),
                Err(e) => ApiError::RequestError(e),
            };

            if attempt >= self.inner.max_retries {
                tracing::debug!("Giving up on {} after {} retries: {}", url.path(), attempt, last_error);
                return Err(last_error);
            }

            attempt += 1;
            let backoff = self.backoff(attempt);
            tracing::debug!(
                "Retrying request to {} after {}ms (attempt {})",
                url.path(),
                backoff.as_millis(),
                attempt
            );

            tokio::select! {
                _ = ctx.done() => return Err(ApiError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
}

/// Trimmed, non-empty path argument or an error naming it
pub(crate) fn require<'a>(value: &'a str, what: &str) -> Result<&'a str, ApiError> {
    match value.trim() {
        "" => Err(ApiError::missing(what)),
        trimmed => Ok(trimmed),
    }
}

/// Pass through responses with an accepted status; otherwise build an
/// `UnexpectedStatus` error carrying an excerpt of the body
pub(crate) async fn expect_status(
    response: Response,
    accepted: &[StatusCode],
    action: &str,
) -> Result<Response, ApiError> {
    let status = response.status();
    if accepted.contains(&status) {
        return Ok(response);
    }

    let body = match response.bytes().await {
        Ok(bytes) => {
            let end = bytes.len().min(ERROR_BODY_LIMIT);
            String::from_utf8_lossy(&bytes[..end]).trim().to_string()
        }
        Err(_) => String::new(),
    };
    tracing::warn!("API returned {} {}: {}", status.as_u16(), action, body);

    Err(ApiError::UnexpectedStatus {
        status: status.as_u16(),
        action: action.to_string(),
        body,
    })
}

pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: Response,
    what: &str,
) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::error!("Failed to deserialize {}: {}", what, e);
        ApiError::ParseError {
            what: what.to_string(),
            message: e.to_string(),
        }
    })
}

pub(crate) fn encode_json<B: Serialize>(body: &B, what: &str) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(body)
        .map_err(|e| ApiError::InvalidArgument(format!("marshal {}: {}", what, e)))
}

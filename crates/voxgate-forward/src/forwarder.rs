use crate::chat::{extract_reply, ChatRequest};
use crate::endpoint::EndpointTarget;
use reqwest::header;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Maximum upstream response body accepted (1 MiB).
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// How much of a failed upstream body is kept for the debug log.
const ERROR_SNIPPET_CHARS: usize = 256;

/// Prompt sent by [`Forwarder::probe`].
const PROBE_PROMPT: &str = "Hi";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Bound on a forwarded voice query, connect to last body byte.
    pub timeout: Duration,
    /// Bound on a connection probe.
    pub probe_timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Upstream failures. The message of each variant is for operator logs only;
/// callers must not show it to end users.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("upstream request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("unexpected upstream body: {0}")]
    UnexpectedBody(String),
}

impl ForwardError {
    /// True for failures where the upstream answered but the answer was
    /// unusable, as opposed to not answering properly at all.
    pub fn is_body_error(&self) -> bool {
        matches!(self, Self::UnexpectedBody(_))
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Network(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Forwarder
// ---------------------------------------------------------------------------

/// Sends voice queries to a user's chat-completion endpoint.
///
/// Holds one pooled [`reqwest::Client`]; clone it freely. Each call is one
/// attempt. Dropping the returned future aborts the in-flight request.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    config: ForwarderConfig,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("voxgate/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn config(&self) -> ForwarderConfig {
        self.config
    }

    /// Forwards `query_text` as a single user message and returns the
    /// model's trimmed reply.
    pub async fn send(
        &self,
        endpoint: &str,
        api_key: &str,
        query_text: &str,
    ) -> Result<String, ForwardError> {
        let target = EndpointTarget::parse(endpoint)?;
        let request = ChatRequest::user(query_text, target.model.clone());
        self.complete(&target, api_key, &request, self.config.timeout)
            .await
    }

    /// Checks that an endpoint/key pair answers a trivial prompt.
    pub async fn probe(&self, endpoint: &str, api_key: &str) -> Result<String, ForwardError> {
        let target = EndpointTarget::parse(endpoint)?;
        let request = ChatRequest {
            max_tokens: Some(100),
            temperature: Some(0.1),
            top_p: Some(1.0),
            ..ChatRequest::user(PROBE_PROMPT, target.model.clone())
        };
        self.complete(&target, api_key, &request, self.config.probe_timeout)
            .await
    }

    async fn complete(
        &self,
        target: &EndpointTarget,
        api_key: &str,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<String, ForwardError> {
        let host = target.url.host_str().unwrap_or_default().to_string();
        tracing::debug!(
            host = %host,
            model = target.model.as_deref().unwrap_or("-"),
            "forwarding to upstream"
        );

        let mut builder = self
            .client
            .post(target.url.clone())
            .timeout(timeout)
            .header(header::ACCEPT, "application/json")
            .json(request);
        if !api_key.is_empty() {
            builder = builder.bearer_auth(api_key);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ForwardError::from_reqwest(e, timeout))?;

        let status = resp.status();
        let oversized = resp
            .content_length()
            .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64);

        if !status.is_success() {
            if !oversized {
                if let Ok(bytes) = resp.bytes().await {
                    let snippet: String = String::from_utf8_lossy(&bytes)
                        .chars()
                        .take(ERROR_SNIPPET_CHARS)
                        .collect();
                    tracing::debug!(host = %host, status = %status, body = %snippet, "upstream error body");
                }
            }
            return Err(ForwardError::Status(status));
        }

        if oversized {
            return Err(ForwardError::UnexpectedBody(
                "declared length exceeds limit".to_string(),
            ));
        }

        let bytes = read_capped(resp, timeout).await?;

        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| ForwardError::UnexpectedBody(format!("not json: {e}")))?;

        extract_reply(&body).ok_or_else(|| {
            ForwardError::UnexpectedBody("no text at choices[0].message.content".to_string())
        })
    }
}

/// Reads the body chunk by chunk, giving up as soon as it grows past
/// [`MAX_RESPONSE_BYTES`]. Chunked replies carry no length up front.
async fn read_capped(
    mut resp: reqwest::Response,
    timeout: Duration,
) -> Result<Vec<u8>, ForwardError> {
    let mut body = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| ForwardError::from_reqwest(e, timeout))?
    {
        if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(ForwardError::UnexpectedBody(format!(
                "body exceeds {MAX_RESPONSE_BYTES} bytes"
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new(ForwarderConfig::default())
    }
}

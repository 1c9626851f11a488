//! HTTP submission transport.

use crate::error::QueueResult;
use crate::transport::{SendOutcome, SendRequest, SubmissionTransport};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Header carrying the submission id so the service can drop duplicates.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Longest response body excerpt kept in an error reason.
const MAX_ERROR_BODY: usize = 200;

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL of the collection service.
    pub endpoint: Url,
    /// Bearer token, if the service requires one.
    pub auth_token: Option<String>,
    /// Content type sent with every payload.
    pub content_type: String,
}

impl HttpTransportConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            auth_token: None,
            content_type: "application/json".to_string(),
        }
    }
}

/// Posts each payload to `{endpoint}/submissions/{kind}`.
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: Client,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(config: HttpTransportConfig) -> QueueResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self { config, client })
    }

    /// URL for submissions of `kind`, with the kind percent-encoded as one segment.
    pub fn submission_url(&self, kind: &str) -> Option<Url> {
        let mut url = self.config.endpoint.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["submissions", kind]);
        Some(url)
    }
}

#[async_trait]
impl SubmissionTransport for HttpTransport {
    async fn send(&self, request: SendRequest<'_>, timeout: Duration) -> SendOutcome {
        let Some(url) = self.submission_url(request.kind) else {
            return SendOutcome::PermanentError(format!(
                "endpoint {} cannot take a path",
                self.config.endpoint
            ));
        };

        debug!(
            url = %url,
            item_id = %request.id,
            bytes = request.payload.len(),
            "Sending submission"
        );

        let mut builder = self
            .client
            .post(url)
            .timeout(timeout)
            .header(IDEMPOTENCY_HEADER, request.id.as_str())
            .header(reqwest::header::CONTENT_TYPE, self.config.content_type.as_str())
            .body(request.payload.to_vec());
        if let Some(token) = &self.config.auth_token {
            builder = builder.bearer_auth(token);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return SendOutcome::Success;
                }
                let body = response.text().await.unwrap_or_default();
                classify_status(status, &body)
            }
            Err(e) => classify_error(&e),
        }
    }
}

/// Map a non-success HTTP status to a send outcome.
pub fn classify_status(status: StatusCode, body: &str) -> SendOutcome {
    if status.is_success() {
        return SendOutcome::Success;
    }

    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    let reason = if excerpt.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {excerpt}")
    };

    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        SendOutcome::TransientError(reason)
    } else {
        SendOutcome::PermanentError(reason)
    }
}

fn classify_error(error: &reqwest::Error) -> SendOutcome {
    if error.is_builder() {
        SendOutcome::PermanentError(format!("invalid request: {error}"))
    } else if error.is_timeout() {
        SendOutcome::TransientError(format!("timed out: {error}"))
    } else {
        SendOutcome::TransientError(format!("network error: {error}"))
    }
}

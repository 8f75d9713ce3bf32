//! Default HTTP transport for the streaming messages endpoint.
//!
//! [`AnthropicStreamer`] POSTs [`RequestParams`] to `{base}/v1/messages` and
//! decodes the SSE body into [`StreamEvent`]s. The endpoint emits named
//! events (`message_start`, `content_block_delta`, ...) whose JSON payloads
//! carry the same tag in a `"type"` field, so decoding keys off the payload
//! alone.
//!
//! Terminal `error` events and transport failures surface as `Err` items on
//! the stream; the run loop decides whether they are retryable (§ fallback
//! model) or fatal.

use crate::config;
use crate::stream::{RequestParams, StreamEvent, StreamEventStream, Streamer};
use crate::{Error, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use std::time::Duration;

/// Joined `anthropic-beta` header value, or `None` when no flags are set.
fn beta_header(betas: &[String]) -> Option<String> {
    if betas.is_empty() {
        None
    } else {
        Some(betas.join(","))
    }
}

/// HTTP/SSE client for the messages API.
///
/// One instance is shared by all runs of an [`Agent`](crate::Agent); the
/// underlying `reqwest::Client` pools connections internally.
pub struct AnthropicStreamer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicStreamer {
    /// Creates a streamer, resolving the base URL and credential through
    /// [`config`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no API key is available, and an
    /// HTTP error when the client cannot be constructed.
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let api_key = config::resolve_api_key(api_key).ok_or_else(|| {
            Error::config(format!(
                "no API key configured; set {} or AgentOptions::api_key",
                config::API_KEY_ENV
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            base_url: config::resolve_base_url(base_url),
            api_key,
        })
    }
}

#[async_trait]
impl Streamer for AnthropicStreamer {
    async fn stream(&self, params: &RequestParams) -> Result<StreamEventStream> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", config::API_VERSION)
            .header("accept", "text/event-stream")
            .json(params);

        if let Some(betas) = beta_header(&params.betas) {
            request = request.header("anthropic-beta", betas);
        }

        let response = request.send().await.map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::api(format!("API error {status}: {body}")));
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|item| async move {
                match item {
                    Ok(event) => {
                        if event.data.is_empty() {
                            return None;
                        }
                        match serde_json::from_str::<StreamEvent>(&event.data) {
                            // Keep-alives carry no information.
                            Ok(StreamEvent::Ping) => None,
                            // Terminal error events become the stream's
                            // terminal Err item.
                            Ok(StreamEvent::Error { error }) => Some(Err(Error::api(format!(
                                "{}: {}",
                                error.kind, error.message
                            )))),
                            Ok(event) => Some(Ok(event)),
                            Err(e) => Some(Err(Error::stream(format!(
                                "failed to parse stream event: {e}"
                            )))),
                        }
                    }
                    Err(e) => Some(Err(Error::stream(format!("SSE transport error: {e}")))),
                }
            });

        Ok(Box::pin(stream))
    }
}

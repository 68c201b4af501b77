//! HTTP backend clients for the two wire shapes.
//!
//! Grounded on the teacher's `query()` function in `client.rs` (building a
//! `reqwest::Client`, attaching bearer auth, checking `status().is_success()`
//! before parsing) and its `parse_sse_stream` in `utils.rs`, generalized two
//! ways: SSE framing now goes through the `eventsource-stream` crate instead
//! of hand-rolled `data: ` line splitting (already a teacher dependency,
//! previously unused), and the per-provider endpoint/auth shape is factored
//! out behind [`HttpApi`] so one `HttpBackend<A>` serves both APIs.

use crate::api::Api;
use crate::error::{Error, Result};
use crate::retry::{retry_with_backoff_conditional, RetryConfig};
use crate::wire::anthropic::AnthropicApi;
use crate::wire::openai::OpenAiApi;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;

pub type ChunkStream<A> = Pin<Box<dyn Stream<Item = Result<<A as Api>::Chunk>> + Send>>;

/// The pipeline's view of an upstream LLM call: complete or stream.
///
/// Implementors are injected into the orchestrator rather than constructed
/// by it, so tests substitute a fake backend without touching the network.
#[async_trait]
pub trait Backend<A: Api>: Send + Sync {
    async fn complete(&self, request: A::Request) -> Result<A::Response>;
    async fn stream(&self, request: A::Request) -> Result<ChunkStream<A>>;
}

/// The per-provider HTTP shape an [`HttpBackend`] needs: where to post, and
/// what headers carry credentials.
pub trait HttpApi: Api {
    fn endpoint(base_url: &str) -> String;
    fn headers(api_key: &str) -> Vec<(&'static str, String)>;
}

impl HttpApi for OpenAiApi {
    fn endpoint(base_url: &str) -> String {
        format!("{}/chat/completions", base_url.trim_end_matches('/'))
    }

    fn headers(api_key: &str) -> Vec<(&'static str, String)> {
        vec![("Authorization", format!("Bearer {api_key}"))]
    }
}

impl HttpApi for AnthropicApi {
    fn endpoint(base_url: &str) -> String {
        format!("{}/v1/messages", base_url.trim_end_matches('/'))
    }

    fn headers(api_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", "2023-06-01".to_string()),
        ]
    }
}

/// HTTP-transport backend for any [`HttpApi`]. `A::Request` must set its own
/// `stream` field before calling `complete`/`stream` — this type only knows
/// how to post the request and decode the response, not how to shape it.
pub struct HttpBackend<A: HttpApi> {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    retry_config: RetryConfig,
    _marker: std::marker::PhantomData<A>,
}

impl<A: HttpApi> HttpBackend<A> {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(60),
            retry_config: RetryConfig::default(),
            _marker: std::marker::PhantomData,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    fn build_request(&self, body: &impl Serialize) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(A::endpoint(&self.base_url))
            .header("Content-Type", "application/json")
            .json(body);
        for (name, value) in A::headers(&self.api_key) {
            builder = builder.header(name, value);
        }
        builder
    }

    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(Error::backend(Some(status), body))
    }
}

#[async_trait]
impl<A> Backend<A> for HttpBackend<A>
where
    A: HttpApi,
    A::Request: Serialize + Clone + Send + Sync,
    A::Response: DeserializeOwned,
    A::Chunk: DeserializeOwned,
{
    async fn complete(&self, request: A::Request) -> Result<A::Response> {
        retry_with_backoff_conditional(self.retry_config.clone(), || {
            let request = request.clone();
            async {
                let response = tokio::time::timeout(self.timeout, self.build_request(&request).send())
                    .await
                    .map_err(|_| Error::BackendTimeout)?
                    .map_err(Error::Http)?;
                let response = Self::error_for_status(response).await?;
                response.json::<A::Response>().await.map_err(Error::Http)
            }
        })
        .await
    }

    async fn stream(&self, request: A::Request) -> Result<ChunkStream<A>> {
        let response = tokio::time::timeout(self.timeout, self.build_request(&request).send())
            .await
            .map_err(|_| Error::BackendTimeout)?
            .map_err(Error::Http)?;
        let response = Self::error_for_status(response).await?;

        let events = response.bytes_stream().eventsource();
        let chunks = events.filter_map(|event| async move {
            let event = match event {
                Ok(e) => e,
                Err(err) => return Some(Err(Error::backend(None, err.to_string()))),
            };
            if event.data == "[DONE]" {
                return None;
            }
            match serde_json::from_str::<A::Chunk>(&event.data) {
                Ok(chunk) => Some(Ok(chunk)),
                Err(err) => Some(Err(Error::Json(err))),
            }
        });

        Ok(Box::pin(chunks))
    }
}

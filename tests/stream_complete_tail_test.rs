//! Backend emits `["A","B"]` and ends without a `finish_reason`. A policy's
//! `on_stream_complete` hook sends a tail chunk; the client must still see
//! it before the outgoing channel closes, proving the drainer flushes
//! whatever was queued after `feed_complete` is set.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use luthien_core::api::OpenAiApi;
use luthien_core::backend::{Backend, ChunkStream};
use luthien_core::config::OrchestratorConfig;
use luthien_core::error::Result;
use luthien_core::orchestrator::PolicyOrchestrator;
use luthien_core::policy::{Policy, StreamingContext};
use luthien_core::sinks::SinkRouter;
use luthien_core::transaction::TransactionContext;
use luthien_core::wire::openai::{
    text_chunk, tool_call_chunk, OpenAiChoice, OpenAiChunk, OpenAiDelta, OpenAiDeltaInterpreter,
    OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiResponseChoice,
};
use std::sync::Arc;

fn content_chunk(text: &str) -> OpenAiChunk {
    OpenAiChunk {
        id: "c".into(),
        choices: vec![OpenAiChoice {
            index: 0,
            delta: OpenAiDelta {
                role: None,
                content: Some(text.to_string()),
                tool_calls: None,
            },
            finish_reason: None,
        }],
    }
}

fn request() -> OpenAiRequest {
    OpenAiRequest {
        model: "gpt-4".into(),
        messages: vec![],
        stream: true,
        max_tokens: None,
        temperature: None,
        stop: None,
        tools: None,
    }
}

struct FakeBackend {
    chunks: Vec<OpenAiChunk>,
}

#[async_trait]
impl Backend<OpenAiApi> for FakeBackend {
    async fn complete(&self, _request: OpenAiRequest) -> Result<OpenAiResponse> {
        Ok(OpenAiResponse {
            id: "resp".into(),
            model: "gpt-4".into(),
            choices: vec![OpenAiResponseChoice {
                index: 0,
                message: OpenAiMessage {
                    role: "assistant".into(),
                    content: Some(String::new()),
                    tool_calls: None,
                    tool_call_id: None,
                },
                finish_reason: Some("stop".into()),
            }],
            usage: None,
        })
    }

    async fn stream(&self, _request: OpenAiRequest) -> Result<ChunkStream<OpenAiApi>> {
        let items: Vec<Result<OpenAiChunk>> = self.chunks.clone().into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

struct TailEmittingPolicy;

#[async_trait]
impl Policy<OpenAiApi> for TailEmittingPolicy {
    async fn on_stream_complete(
        &self,
        _ctx: &TransactionContext,
        sctx: &StreamingContext<OpenAiApi>,
    ) -> Result<()> {
        sctx.send_text("[end]", true).await
    }
}

#[tokio::test]
async fn test_policy_tail_chunk_survives_the_flush_after_feed_complete() {
    let router = Arc::new(SinkRouter::builder().build());

    let backend = FakeBackend {
        chunks: vec![content_chunk("A"), content_chunk("B")],
    };

    let orchestrator = PolicyOrchestrator::new(
        Arc::new(TailEmittingPolicy),
        Arc::new(backend),
        router,
        OrchestratorConfig::default(),
        OpenAiDeltaInterpreter,
        Arc::new(text_chunk),
        Arc::new(tool_call_chunk),
    );

    let stream = orchestrator.process_streaming_response(request()).await.unwrap();
    tokio::pin!(stream);

    let mut texts = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        if let Some(text) = chunk.choices[0].delta.content.clone() {
            texts.push(text);
        }
    }

    assert_eq!(texts, vec!["A", "B", "[end]"]);
}

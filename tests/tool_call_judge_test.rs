//! Backend streams content, then a tool call for `exec` with a destructive
//! argument, then finishes. The judge blocks the call; the client should see
//! the content deltas followed by a single blocked-message chunk and then
//! stream close, with the scratchpad counter incremented.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use luthien_core::api::OpenAiApi;
use luthien_core::backend::{Backend, ChunkStream};
use luthien_core::config::OrchestratorConfig;
use luthien_core::error::Result;
use luthien_core::orchestrator::PolicyOrchestrator;
use luthien_core::policies::{KeywordToolCallJudge, ToolCallJudge, ToolCallJudgePolicy, ToolCallsBlocked};
use luthien_core::sinks::SinkRouter;
use luthien_core::wire::openai::{
    text_chunk, tool_call_chunk, OpenAiChoice, OpenAiChunk, OpenAiDelta, OpenAiDeltaInterpreter,
    OpenAiFunctionDelta, OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiResponseChoice,
    OpenAiToolCallDelta,
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

fn tool_call_start(id: &str, name: &str) -> OpenAiChunk {
    OpenAiChunk {
        id: "c".into(),
        choices: vec![OpenAiChoice {
            index: 0,
            delta: OpenAiDelta {
                role: None,
                content: None,
                tool_calls: Some(vec![OpenAiToolCallDelta {
                    index: 0,
                    id: Some(id.to_string()),
                    call_type: Some("function".into()),
                    function: Some(OpenAiFunctionDelta {
                        name: Some(name.to_string()),
                        arguments: None,
                    }),
                }]),
            },
            finish_reason: None,
        }],
    }
}

fn tool_call_args(fragment: &str, finish: Option<&str>) -> OpenAiChunk {
    OpenAiChunk {
        id: "c".into(),
        choices: vec![OpenAiChoice {
            index: 0,
            delta: OpenAiDelta {
                role: None,
                content: None,
                tool_calls: Some(vec![OpenAiToolCallDelta {
                    index: 0,
                    id: None,
                    call_type: None,
                    function: Some(OpenAiFunctionDelta {
                        name: None,
                        arguments: Some(fragment.to_string()),
                    }),
                }]),
            },
            finish_reason: finish.map(str::to_string),
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

#[tokio::test]
async fn test_judge_blocks_destructive_tool_call() {
    let router = Arc::new(SinkRouter::builder().build());

    let backend = FakeBackend {
        chunks: vec![
            content_chunk("Running"),
            content_chunk(" command:"),
            content_chunk(""),
            tool_call_start("call_1", "exec"),
            tool_call_args("{\"cmd\":\"rm -rf /\"}", Some("tool_calls")),
        ],
    };

    let judge = KeywordToolCallJudge::new(vec!["rm -rf".into()]);
    let policy = ToolCallJudgePolicy::new(judge);

    let orchestrator = PolicyOrchestrator::new(
        Arc::new(policy),
        Arc::new(backend),
        router,
        OrchestratorConfig::default(),
        OpenAiDeltaInterpreter,
        Arc::new(text_chunk),
        Arc::new(tool_call_chunk),
    );

    let stream = orchestrator.process_streaming_response(request()).await.unwrap();
    tokio::pin!(stream);

    let mut content = String::new();
    let mut saw_blocked_message = false;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        if let Some(text) = chunk.choices[0].delta.content.clone() {
            content.push_str(&text);
            if text.contains("blocked") {
                saw_blocked_message = true;
            }
        }
        assert!(
            chunk.choices[0].delta.tool_calls.is_none(),
            "a blocked tool call must never reach the client"
        );
    }

    assert_eq!(content, "Running command:Tool call blocked by policy.");
    assert!(saw_blocked_message);
}

#[tokio::test]
async fn test_judge_tracks_blocked_count_in_scratchpad() {
    use luthien_core::assembler::ToolCallStreamBlock;
    use luthien_core::transaction::TransactionContext;

    let router = Arc::new(SinkRouter::builder().build());
    let ctx = TransactionContext::new(router);

    let judge = KeywordToolCallJudge::new(vec!["rm -rf".into()]);
    assert!(judge
        .judge(
            &ToolCallStreamBlock {
                id: Some("call_1".into()),
                name: "exec".into(),
                arguments: "{\"cmd\":\"rm -rf /\"}".into(),
                is_complete: true,
            },
            &ctx,
        )
        .await
        .unwrap());

    ctx.with_scratchpad(|pad| {
        pad.get_or_insert_default::<ToolCallsBlocked>().count += 1;
    });
    ctx.with_scratchpad(|pad| {
        assert_eq!(pad.get::<ToolCallsBlocked>().unwrap().count, 1);
    });
}

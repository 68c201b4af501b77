//! Blocks a tool call once its arguments are fully assembled, based on an
//! async judge the integrator supplies — the "LLM-as-judge" scenario named
//! alongside the sample policies: a second model call inspects the
//! completed call before it reaches the client.

use crate::api::Api;
use crate::assembler::ToolCallStreamBlock;
use crate::error::Result;
use crate::event::PolicyEvent;
use crate::policy::{Policy, StreamingContext};
use crate::transaction::TransactionContext;
use async_trait::async_trait;
use serde_json::json;

/// Per-transaction scratchpad counter, visible to anything downstream that
/// inspects `ctx` after the stream completes (e.g. a sink or a test).
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolCallsBlocked {
    pub count: u32,
}

/// Decides whether a completed tool call should reach the client.
/// Implementors may call out to another model, a rule engine, or anything
/// else — the hook awaits this before forwarding or blocking, and calls
/// [`StreamingContext::keepalive`] first so a slow judge doesn't trip the
/// idle watchdog.
#[async_trait]
pub trait ToolCallJudge: Send + Sync {
    /// Returns `true` if `call` should be blocked.
    async fn judge(&self, call: &ToolCallStreamBlock, ctx: &TransactionContext) -> Result<bool>;
}

/// Blocks any tool call whose name or arguments contain one of a configured
/// set of banned substrings. The default judge most integrators reach for
/// first; anything needing an actual model call implements [`ToolCallJudge`]
/// directly instead.
#[derive(Debug, Clone)]
pub struct KeywordToolCallJudge {
    banned_substrings: Vec<String>,
}

impl KeywordToolCallJudge {
    pub fn new(banned_substrings: Vec<String>) -> Self {
        Self { banned_substrings }
    }
}

#[async_trait]
impl ToolCallJudge for KeywordToolCallJudge {
    async fn judge(&self, call: &ToolCallStreamBlock, _ctx: &TransactionContext) -> Result<bool> {
        Ok(self
            .banned_substrings
            .iter()
            .any(|needle| call.name.contains(needle.as_str()) || call.arguments.contains(needle.as_str())))
    }
}

/// Wraps a [`ToolCallJudge`] as a full [`Policy`]: content deltas keep the
/// default real-time passthrough, tool-call deltas are suppressed (the
/// judge needs the whole call before it can decide), and
/// `on_tool_call_complete` runs the judge.
pub struct ToolCallJudgePolicy<J: ToolCallJudge> {
    judge: J,
}

impl<J: ToolCallJudge> ToolCallJudgePolicy<J> {
    pub fn new(judge: J) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl<A: Api, J: ToolCallJudge> Policy<A> for ToolCallJudgePolicy<J> {
    /// Overridden to a no-op: forwarding raw tool-call chunks as they
    /// arrive would let a call the judge later blocks already reach the
    /// client. The whole call is replayed or replaced in
    /// `on_tool_call_complete` instead.
    async fn on_tool_call_delta(
        &self,
        _chunk: A::Chunk,
        _block: &crate::assembler::ToolCallStreamBlock,
        _ctx: &TransactionContext,
        _sctx: &StreamingContext<A>,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_tool_call_complete(
        &self,
        block: &ToolCallStreamBlock,
        ctx: &TransactionContext,
        sctx: &StreamingContext<A>,
    ) -> Result<()> {
        sctx.keepalive();
        let blocked = self.judge.judge(block, ctx).await?;

        let unemitted = sctx.take_unemitted_raw_chunks().await;
        if sctx.is_output_finished() {
            return Ok(());
        }

        if blocked {
            ctx.with_scratchpad(|pad| {
                pad.get_or_insert_default::<ToolCallsBlocked>().count += 1;
            });
            ctx.record(PolicyEvent::new(
                "policy.tool_call_blocked",
                json!({ "name": block.name, "id": block.id }),
            ))
            .await;
            sctx.send_text("Tool call blocked by policy.", true).await?;
        } else {
            for chunk in unemitted {
                sctx.send(chunk).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OpenAiApi;
    use crate::assembler::StreamState;
    use crate::recorder::TransactionRecorder;
    use crate::sinks::SinkRouter;
    use crate::wire::openai::{text_chunk, tool_call_chunk};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex as AsyncMutex};

    fn block(name: &str, arguments: &str) -> ToolCallStreamBlock {
        ToolCallStreamBlock {
            id: Some("call_1".into()),
            name: name.into(),
            arguments: arguments.into(),
            is_complete: true,
        }
    }

    fn sctx() -> (StreamingContext<OpenAiApi>, mpsc::Receiver<crate::wire::openai::OpenAiChunk>) {
        let (tx, rx) = mpsc::channel(8);
        let sctx = StreamingContext::new(
            tx,
            Arc::new(|| {}),
            Arc::new(text_chunk),
            Arc::new(tool_call_chunk),
            Arc::new(AsyncMutex::new(StreamState::new())),
            Arc::new(AsyncMutex::new(TransactionRecorder::new())),
        );
        (sctx, rx)
    }

    #[tokio::test]
    async fn test_blocks_tool_call_matching_banned_substring() {
        let policy = ToolCallJudgePolicy::new(KeywordToolCallJudge::new(vec!["rm -rf".into()]));
        let (sctx, mut rx) = sctx();
        let router = Arc::new(SinkRouter::builder().build());
        let ctx = TransactionContext::new(router);

        policy
            .on_tool_call_complete(&block("exec", "{\"cmd\":\"rm -rf /\"}"), &ctx, &sctx)
            .await
            .unwrap();

        assert!(sctx.is_output_finished());
        let chunk = rx.recv().await.unwrap();
        assert!(chunk.choices[0]
            .delta
            .content
            .as_deref()
            .unwrap()
            .contains("blocked"));
        ctx.with_scratchpad(|pad| {
            assert_eq!(pad.get::<ToolCallsBlocked>().unwrap().count, 1);
        });
    }

    #[tokio::test]
    async fn test_passes_through_unblocked_tool_call() {
        let policy = ToolCallJudgePolicy::new(KeywordToolCallJudge::new(vec!["rm -rf".into()]));
        let (sctx, mut rx) = sctx();
        let router = Arc::new(SinkRouter::builder().build());
        let ctx = TransactionContext::new(router);

        {
            let state = sctx_state_for_test(&sctx);
            let mut state = state.lock().await;
            state.raw_chunks.push(tool_call_chunk(&block("exec", "{}"), false));
        }

        policy
            .on_tool_call_complete(&block("exec", "{}"), &ctx, &sctx)
            .await
            .unwrap();

        assert!(!sctx.is_output_finished());
        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.id, "luthien-synthetic");
    }

    fn sctx_state_for_test(
        sctx: &StreamingContext<OpenAiApi>,
    ) -> Arc<AsyncMutex<StreamState<OpenAiApi>>> {
        sctx.state_for_test()
    }
}

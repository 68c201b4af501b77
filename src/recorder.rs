//! Buffers ingress/egress chunks for a streaming transaction and folds them
//! into recorded events at finalization.
//!
//! Folding replays each buffered chunk list through a fresh
//! [`Assembler`](crate::assembler::Assembler) rather than tracking running
//! text alongside the live pipeline — the same deterministic fold the
//! teacher's `ToolCallAggregator` performs at `finish_reason`, applied once
//! per side at teardown instead of continuously, since the recorder only
//! needs the final shape, not every intermediate one.

use crate::api::Api;
use crate::assembler::{Assembler, DeltaInterpreter, StreamBlock, StreamState};
use crate::event::{event_types, PolicyEvent};
use crate::transaction::TransactionContext;
use serde::Serialize;
use serde_json::{json, Value};

/// Per-streaming-transaction chunk buffers. Owned by the orchestrator for
/// the lifetime of one call; never shared across transactions.
pub struct TransactionRecorder<A: Api> {
    ingress_chunks: Vec<A::Chunk>,
    egress_chunks: Vec<A::Chunk>,
}

impl<A: Api> Default for TransactionRecorder<A> {
    fn default() -> Self {
        Self {
            ingress_chunks: Vec::new(),
            egress_chunks: Vec::new(),
        }
    }
}

impl<A: Api> TransactionRecorder<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ingress(&mut self, chunk: A::Chunk) {
        self.ingress_chunks.push(chunk);
    }

    pub fn push_egress(&mut self, chunk: A::Chunk) {
        self.egress_chunks.push(chunk);
    }

    pub fn ingress_count(&self) -> usize {
        self.ingress_chunks.len()
    }

    pub fn egress_count(&self) -> usize {
        self.egress_chunks.len()
    }

    /// Emits `transaction.request_recorded` with both request shapes.
    pub async fn record_request(
        &self,
        ctx: &TransactionContext,
        original: &A::Request,
        final_request: &A::Request,
    ) where
        A::Request: Serialize,
    {
        ctx.record(PolicyEvent::new(
            event_types::REQUEST_RECORDED,
            json!({
                "original_request": serde_json::to_value(original).unwrap_or(Value::Null),
                "final_request": serde_json::to_value(final_request).unwrap_or(Value::Null),
            }),
        ))
        .await;
    }

    /// Emits `transaction.non_streaming_response_recorded` directly, with
    /// no reconstruction — the response is already whole.
    pub async fn finalize_non_streaming(
        &self,
        ctx: &TransactionContext,
        original: &A::Response,
        final_response: &A::Response,
    ) where
        A::Response: Serialize,
    {
        ctx.record(PolicyEvent::new(
            event_types::NON_STREAMING_RESPONSE_RECORDED,
            json!({
                "original_response": serde_json::to_value(original).unwrap_or(Value::Null),
                "final_response": serde_json::to_value(final_response).unwrap_or(Value::Null),
            }),
        ))
        .await;
    }

    /// Folds both buffered chunk sequences into block summaries and emits
    /// one `transaction.streaming_response_recorded` event. Reconstruction
    /// is independent of whether the policy modified the stream: ingress
    /// folds what actually came from the backend, egress folds what
    /// actually went to the client.
    pub async fn finalize_streaming<I>(&self, ctx: &TransactionContext, interpreter: I, cancelled: bool)
    where
        I: DeltaInterpreter<A> + Clone,
    {
        let ingress_state = Self::fold(interpreter.clone(), &self.ingress_chunks);
        let egress_state = Self::fold(interpreter, &self.egress_chunks);

        ctx.record(PolicyEvent::new(
            event_types::STREAMING_RESPONSE_RECORDED,
            json!({
                "ingress_chunks": {
                    "count": self.ingress_chunks.len(),
                    "blocks": blocks_to_json(&ingress_state.blocks),
                },
                "egress_chunks": {
                    "count": self.egress_chunks.len(),
                    "blocks": blocks_to_json(&egress_state.blocks),
                },
                "finish_reason": ingress_state.finish_reason,
                "cancelled": cancelled,
            }),
        ))
        .await;
    }

    fn fold<I: DeltaInterpreter<A>>(interpreter: I, chunks: &[A::Chunk]) -> StreamState<A> {
        let assembler = Assembler::new(interpreter);
        let mut state = StreamState::new();
        for chunk in chunks {
            assembler.process_chunk(chunk.clone(), &mut state);
        }
        state
    }
}

fn blocks_to_json(blocks: &[StreamBlock]) -> Value {
    Value::Array(
        blocks
            .iter()
            .map(|block| match block {
                StreamBlock::Content(b) => json!({
                    "type": "content",
                    "text": b.text,
                    "complete": b.is_complete,
                }),
                StreamBlock::ToolCall(b) => json!({
                    "type": "tool_call",
                    "id": b.id,
                    "name": b.name,
                    "arguments": b.arguments,
                    "complete": b.is_complete,
                }),
            })
            .collect(),
    )
}

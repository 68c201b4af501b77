//! The hook surface a policy implements, and the `StreamingContext` bridge
//! handed to the streaming hooks.
//!
//! Restructured from the teacher's `Hooks` registry (closures keyed by
//! event name, any number of handlers per event) into a trait a single
//! implementor satisfies once: the component here names a *fixed* hook
//! surface, not an open registry, so a trait with default method bodies —
//! one default per row of the hook contract table — is the idiomatic fit.
//! `HookDecision`'s continue/modify/block vocabulary survives as the shape
//! of [`PolicyViolation`](crate::error::Error::PolicyViolation) handling
//! inside `on_tool_call_complete`/`on_response`, rather than as a struct of
//! its own.

use crate::api::Api;
use crate::assembler::{ContentStreamBlock, StreamBlock, StreamState, ToolCallStreamBlock};
use crate::error::{Error, Result};
use crate::recorder::TransactionRecorder;
use crate::transaction::TransactionContext;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// The bridge handed to streaming hooks: the egress queue, a keepalive
/// callback, the output-finished flag, and a watermarked view onto the
/// live `StreamState` for the `SimplePolicy` passthrough optimization.
///
/// `output_finished` is sticky: once set (by `mark_output_finished()` or a
/// `send_text(.., finish=true)`), every subsequent `send*` call fails fast
/// rather than silently queuing more output after the policy declared
/// itself done.
pub struct StreamingContext<A: Api> {
    egress: mpsc::Sender<A::Chunk>,
    keepalive: Arc<dyn Fn() + Send + Sync>,
    output_finished: AtomicBool,
    make_text_chunk: Arc<dyn Fn(&str, bool) -> A::Chunk + Send + Sync>,
    make_tool_call_chunk: Arc<dyn Fn(&ToolCallStreamBlock, bool) -> A::Chunk + Send + Sync>,
    state: Arc<AsyncMutex<StreamState<A>>>,
    recorder: Arc<AsyncMutex<TransactionRecorder<A>>>,
}

impl<A: Api> StreamingContext<A> {
    pub fn new(
        egress: mpsc::Sender<A::Chunk>,
        keepalive: Arc<dyn Fn() + Send + Sync>,
        make_text_chunk: Arc<dyn Fn(&str, bool) -> A::Chunk + Send + Sync>,
        make_tool_call_chunk: Arc<dyn Fn(&ToolCallStreamBlock, bool) -> A::Chunk + Send + Sync>,
        state: Arc<AsyncMutex<StreamState<A>>>,
        recorder: Arc<AsyncMutex<TransactionRecorder<A>>>,
    ) -> Self {
        Self {
            egress,
            keepalive,
            output_finished: AtomicBool::new(false),
            make_text_chunk,
            make_tool_call_chunk,
            state,
            recorder,
        }
    }

    /// Reset the idle watchdog. Must be called during long policy work
    /// (e.g. an LLM judge call inside `on_tool_call_complete`) so the
    /// streaming orchestrator doesn't mistake deliberate latency for a
    /// hung stream.
    pub fn keepalive(&self) {
        (self.keepalive)();
    }

    pub fn is_output_finished(&self) -> bool {
        self.output_finished.load(Ordering::SeqCst)
    }

    /// Mark the stream finished with no further chunks. Idempotent.
    pub fn mark_output_finished(&self) {
        self.output_finished.store(true, Ordering::SeqCst);
    }

    /// Push a raw chunk to egress. Fails if output is already finished.
    pub async fn send(&self, chunk: A::Chunk) -> Result<()> {
        if self.is_output_finished() {
            return Err(Error::policy_error(
                "send() called after output_finished".to_string().into(),
            ));
        }
        self.recorder.lock().await.push_egress(chunk.clone());
        self.egress
            .send(chunk)
            .await
            .map_err(|_| Error::ClientCancelled)
    }

    /// Push a text chunk built from `text`. When `finish` is true, marks
    /// the stream finished after the send succeeds.
    pub async fn send_text(&self, text: &str, finish: bool) -> Result<()> {
        if self.is_output_finished() {
            return Err(Error::policy_error(
                "send_text() called after output_finished".to_string().into(),
            ));
        }
        let chunk = (self.make_text_chunk)(text, finish);
        self.recorder.lock().await.push_egress(chunk.clone());
        self.egress
            .send(chunk)
            .await
            .map_err(|_| Error::ClientCancelled)?;
        if finish {
            self.mark_output_finished();
        }
        Ok(())
    }

    /// Push a tool-call replacement chunk built from `call`. Mirrors
    /// `send_text` for the tool-call half of the `SimplePolicy` passthrough
    /// optimization.
    pub async fn send_tool_call(&self, call: &ToolCallStreamBlock, finish: bool) -> Result<()> {
        if self.is_output_finished() {
            return Err(Error::policy_error(
                "send_tool_call() called after output_finished".to_string().into(),
            ));
        }
        let chunk = (self.make_tool_call_chunk)(call, finish);
        self.recorder.lock().await.push_egress(chunk.clone());
        self.egress
            .send(chunk)
            .await
            .map_err(|_| Error::ClientCancelled)?;
        if finish {
            self.mark_output_finished();
        }
        Ok(())
    }

    /// Chunks not yet forwarded to egress, per the live `StreamState`'s
    /// `last_emission_index` watermark. Advances the watermark as a side
    /// effect, the same way `StreamState::take_unemitted` does.
    pub async fn take_unemitted_raw_chunks(&self) -> Vec<A::Chunk> {
        let mut state = self.state.lock().await;
        state.take_unemitted().to_vec()
    }

    /// Test-only escape hatch onto the shared state handle, for seeding
    /// `raw_chunks` the way the feeder loop would before exercising a hook
    /// in isolation.
    #[cfg(test)]
    pub(crate) fn state_for_test(&self) -> Arc<AsyncMutex<StreamState<A>>> {
        self.state.clone()
    }
}

/// The hook surface a policy implements. A policy is stateless; per-request
/// state lives in `ctx.scratchpad`. Every hook has a default matching the
/// "Default behavior" column of the hook contract table — a policy
/// overrides only the hooks it cares about.
#[async_trait]
pub trait Policy<A: Api>: Send + Sync {
    /// Once, before the backend call. Default: return the request unchanged.
    async fn on_request(&self, request: A::Request, _ctx: &TransactionContext) -> Result<A::Request> {
        Ok(request)
    }

    /// Once, non-streaming only, after the backend returns. Default:
    /// return the response unchanged.
    async fn on_response(
        &self,
        response: A::Response,
        _ctx: &TransactionContext,
    ) -> Result<A::Response> {
        Ok(response)
    }

    /// Once, before the first chunk dispatch. Default: no-op.
    async fn on_stream_start(&self, _ctx: &TransactionContext, _sctx: &StreamingContext<A>) -> Result<()> {
        Ok(())
    }

    /// Every content chunk. Default: forward the delta as a text chunk to
    /// egress.
    async fn on_content_delta(
        &self,
        delta: &str,
        _block: &ContentStreamBlock,
        _ctx: &TransactionContext,
        sctx: &StreamingContext<A>,
    ) -> Result<()> {
        sctx.send_text(delta, false).await
    }

    /// When a content block closes. Default: no-op (deltas already
    /// forwarded).
    async fn on_content_complete(
        &self,
        _block: &ContentStreamBlock,
        _ctx: &TransactionContext,
        _sctx: &StreamingContext<A>,
    ) -> Result<()> {
        Ok(())
    }

    /// Every tool-call delta. Default: forward the raw chunk to egress.
    /// Takes the provider-native chunk rather than the interpreted block,
    /// matching the hook contract's "forward raw chunk" default.
    async fn on_tool_call_delta(
        &self,
        chunk: A::Chunk,
        _block: &ToolCallStreamBlock,
        _ctx: &TransactionContext,
        sctx: &StreamingContext<A>,
    ) -> Result<()> {
        sctx.send(chunk).await
    }

    /// When a tool-call block closes. Default: no-op.
    async fn on_tool_call_complete(
        &self,
        _block: &ToolCallStreamBlock,
        _ctx: &TransactionContext,
        _sctx: &StreamingContext<A>,
    ) -> Result<()> {
        Ok(())
    }

    /// When `finish_reason` is first seen. Default: send an empty chunk
    /// with finish and mark output finished.
    async fn on_finish_reason(
        &self,
        _reason: &str,
        _ctx: &TransactionContext,
        sctx: &StreamingContext<A>,
    ) -> Result<()> {
        sctx.send_text("", true).await
    }

    /// Always, after the source closes, before the recorder finalizes.
    /// Default: no-op. This is where a policy emits a tail chunk — the
    /// two-phase feeder/drainer termination guarantees anything sent here
    /// still reaches the client before egress closes.
    async fn on_stream_complete(&self, _ctx: &TransactionContext, _sctx: &StreamingContext<A>) -> Result<()> {
        Ok(())
    }
}

/// Layering over [`Policy`] that buffers content and tool-call blocks until
/// complete, then exposes just `on_response_content`/`on_response_tool_call`
/// — the common authoring surface, trading real-time granularity for
/// simplicity.
///
/// If the returned value equals the input, the default `Policy` blanket
/// impl passes through the original chunks from
/// `state.take_unemitted()` (the `last_emission_index` watermark) to
/// preserve upstream chunking and timing; if it differs, it emits a single
/// replacement chunk built from the transformed value.
#[async_trait]
pub trait SimplePolicy<A: Api>: Send + Sync {
    /// Called once a content block closes, with its full accumulated text.
    /// Default: return unchanged.
    async fn on_response_content(&self, text: String, _ctx: &TransactionContext) -> Result<String> {
        Ok(text)
    }

    /// Called once a tool-call block closes. Default: return unchanged.
    async fn on_response_tool_call(
        &self,
        call: ToolCallStreamBlock,
        _ctx: &TransactionContext,
    ) -> Result<ToolCallStreamBlock> {
        Ok(call)
    }
}

/// Blanket bridge: any `SimplePolicy` is a `Policy` whose delta hooks are
/// no-ops (buffering happens implicitly via the assembler's `StreamState`)
/// and whose complete hooks apply the transform, emitting either the
/// passthrough chunks or one replacement chunk.
///
/// `raw_chunks_since_last_emission` and `make_replacement_chunk` are
/// supplied by the orchestrator at dispatch time since only it has access
/// to the live `StreamState` and a way to build a provider-native chunk
/// from transformed text — a `SimplePolicy` implementor never sees either.
pub struct SimplePolicyAdapter<A: Api, P: SimplePolicy<A>> {
    pub inner: P,
    _marker: std::marker::PhantomData<A>,
}

impl<A: Api, P: SimplePolicy<A>> SimplePolicyAdapter<A, P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<A: Api, P: SimplePolicy<A>> Policy<A> for SimplePolicyAdapter<A, P> {
    /// Deltas are buffered by the assembler regardless of hooks; a
    /// `SimplePolicy` only acts once a block is whole, so the per-delta
    /// hook stays silent.
    async fn on_content_delta(
        &self,
        _delta: &str,
        _block: &ContentStreamBlock,
        _ctx: &TransactionContext,
        _sctx: &StreamingContext<A>,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_content_complete(
        &self,
        block: &ContentStreamBlock,
        ctx: &TransactionContext,
        sctx: &StreamingContext<A>,
    ) -> Result<()> {
        let transformed = self.inner.on_response_content(block.text.clone(), ctx).await?;
        let unemitted = sctx.take_unemitted_raw_chunks().await;
        if sctx.is_output_finished() {
            return Ok(());
        }
        if transformed == block.text {
            for chunk in unemitted {
                sctx.send(chunk).await?;
            }
        } else {
            sctx.send_text(&transformed, false).await?;
        }
        Ok(())
    }

    /// Suppressed for the same reason as `on_content_delta`.
    async fn on_tool_call_delta(
        &self,
        _chunk: A::Chunk,
        _block: &ToolCallStreamBlock,
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
        let transformed = self.inner.on_response_tool_call(block.clone(), ctx).await?;
        let unemitted = sctx.take_unemitted_raw_chunks().await;
        if sctx.is_output_finished() {
            return Ok(());
        }
        if transformed == *block {
            for chunk in unemitted {
                sctx.send(chunk).await?;
            }
        } else {
            sctx.send_tool_call(&transformed, false).await?;
        }
        Ok(())
    }
}

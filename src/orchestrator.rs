//! Drives one transaction end to end: builds the `TransactionContext`, runs
//! the policy hooks around a backend call, and hands the result back to the
//! caller.
//!
//! The non-streaming path is a straight-line sequence. The streaming path
//! is grounded on the teacher's `Client::send`/`receive` pair in
//! `client.rs` — a producer task turning backend chunks into client-visible
//! output, paired with a channel the caller drains — generalized into two
//! independent tasks (feeder, drainer) joined with `tokio::join!` rather
//! than `try_join!`: a feeder error must not cut the drainer off before it
//! has forwarded whatever was already queued, since a policy's
//! `on_stream_complete` hook can still enqueue a tail chunk after the
//! feeder itself hits trouble upstream.

use crate::api::Api;
use crate::assembler::{Assembler, DeltaInterpreter, DispatchEvent, StreamBlock, StreamState, ToolCallStreamBlock};
use crate::backend::{Backend, ChunkStream};
use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::event::{event_types, PolicyEvent};
use crate::policy::{Policy, StreamingContext};
use crate::recorder::TransactionRecorder;
use crate::sinks::SinkRouter;
use crate::streaming::{run_drainer, StreamingChannels, Watchdog};
use crate::transaction::TransactionContext;
use futures::stream::StreamExt;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_stream::wrappers::ReceiverStream;

/// Ties a policy, a backend, and the two wire-shape factory functions
/// together into one reusable driver. One instance serves any number of
/// transactions; nothing here is transaction-scoped.
pub struct PolicyOrchestrator<A, P, B, I>
where
    A: Api,
    P: Policy<A>,
    B: Backend<A>,
    I: DeltaInterpreter<A> + Clone + Send + Sync + 'static,
{
    policy: Arc<P>,
    backend: Arc<B>,
    router: Arc<SinkRouter>,
    config: OrchestratorConfig,
    interpreter: I,
    make_text_chunk: Arc<dyn Fn(&str, bool) -> A::Chunk + Send + Sync>,
    make_tool_call_chunk: Arc<dyn Fn(&ToolCallStreamBlock, bool) -> A::Chunk + Send + Sync>,
}

impl<A, P, B, I> PolicyOrchestrator<A, P, B, I>
where
    A: Api,
    P: Policy<A>,
    B: Backend<A>,
    I: DeltaInterpreter<A> + Clone + Send + Sync + 'static,
{
    pub fn new(
        policy: Arc<P>,
        backend: Arc<B>,
        router: Arc<SinkRouter>,
        config: OrchestratorConfig,
        interpreter: I,
        make_text_chunk: Arc<dyn Fn(&str, bool) -> A::Chunk + Send + Sync>,
        make_tool_call_chunk: Arc<dyn Fn(&ToolCallStreamBlock, bool) -> A::Chunk + Send + Sync>,
    ) -> Self {
        Self {
            policy,
            backend,
            router,
            config,
            interpreter,
            make_text_chunk,
            make_tool_call_chunk,
        }
    }

    fn new_context(&self) -> TransactionContext {
        TransactionContext::new(self.router.clone())
    }

    /// The non-streaming sequence: record the inbound call, run
    /// `on_request`, call the backend, run `on_response`, record the
    /// outcome. A hook's `Err` aborts the transaction after being recorded
    /// as a policy-error event — the caller sees the error, nothing is
    /// returned to whatever surface sits above this crate.
    pub async fn process_full_response(&self, request: A::Request) -> Result<A::Response>
    where
        A::Request: Serialize + Clone,
        A::Response: Serialize + Clone,
    {
        let ctx = self.new_context();
        ctx.record(PolicyEvent::new(event_types::CLIENT_REQUEST, json!({})))
            .await;

        let original_request = request.clone();
        let final_request = match self.policy.on_request(request, &ctx).await {
            Ok(req) => req,
            Err(err) => return self.abort(&ctx, err).await,
        };

        let recorder = TransactionRecorder::<A>::new();
        recorder
            .record_request(&ctx, &original_request, &final_request)
            .await;

        let original_response = match self.backend.complete(final_request).await {
            Ok(resp) => resp,
            Err(err) => return self.abort(&ctx, err).await,
        };

        let final_response = match self
            .policy
            .on_response(original_response.clone(), &ctx)
            .await
        {
            Ok(resp) => resp,
            Err(err) => return self.abort(&ctx, err).await,
        };

        recorder
            .finalize_non_streaming(&ctx, &original_response, &final_response)
            .await;

        Ok(final_response)
    }

    /// Records the failure and returns it to the caller. A voluntary
    /// [`Error::PolicyViolation`] is recorded under its own event type —
    /// distinct from an unexpected hook failure — since the boundary
    /// adapter is expected to turn it into an ordinary response carrying
    /// the policy's message rather than a 5xx-equivalent; the core's job
    /// ends at making that distinction legible to whatever records or
    /// handles the error next.
    async fn abort<T>(&self, ctx: &TransactionContext, err: Error) -> Result<T> {
        let event_type = match &err {
            Error::PolicyViolation { .. } => event_types::POLICY_VIOLATION,
            _ => event_types::POLICY_ERROR,
        };
        ctx.record(PolicyEvent::new(event_type, json!({ "error": err.to_string() })))
            .await;
        Err(err)
    }

    /// The streaming sequence. Returns a stream of `Result<A::Chunk>` the
    /// caller forwards to the client as-is; cancellation (dropping the
    /// returned stream) tears down both tasks via channel closure, no
    /// separate cancellation token needed.
    pub async fn process_streaming_response(&self, request: A::Request) -> Result<ChunkStream<A>>
    where
        A::Request: Serialize + Clone,
    {
        let ctx = Arc::new(self.new_context());
        ctx.record(PolicyEvent::new(event_types::CLIENT_REQUEST, json!({})))
            .await;

        let original_request = request.clone();
        let final_request = match self.policy.on_request(request, &ctx).await {
            Ok(req) => req,
            Err(err) => return self.abort(&ctx, err).await,
        };

        let recorder = Arc::new(AsyncMutex::new(TransactionRecorder::<A>::new()));
        recorder
            .lock()
            .await
            .record_request(&ctx, &original_request, &final_request)
            .await;

        let mut ingress = match self.backend.stream(final_request).await {
            Ok(stream) => stream,
            Err(err) => return self.abort(&ctx, err).await,
        };

        let channels = StreamingChannels::<A>::new(self.config.queue_capacity());
        let state = Arc::new(AsyncMutex::new(StreamState::<A>::new()));
        let watchdog = Arc::new(Watchdog::new(self.config.idle_window()));
        let feed_complete = Arc::new(AtomicBool::new(false));

        let keepalive_watchdog = watchdog.clone();
        let keepalive: Arc<dyn Fn() + Send + Sync> = {
            let rt = tokio::runtime::Handle::current();
            Arc::new(move || {
                let watchdog = keepalive_watchdog.clone();
                rt.spawn(async move { watchdog.touch().await });
            })
        };

        let sctx = Arc::new(StreamingContext::<A>::new(
            channels.egress_tx,
            keepalive,
            self.make_text_chunk.clone(),
            self.make_tool_call_chunk.clone(),
            state.clone(),
            recorder.clone(),
        ));

        let policy = self.policy.clone();
        let interpreter = self.interpreter.clone();
        let feeder_ctx = ctx.clone();
        let feeder_sctx = sctx.clone();
        let feeder_state = state.clone();
        let feeder_recorder = recorder.clone();
        let feeder_watchdog = watchdog.clone();
        let feeder_feed_complete = feed_complete.clone();

        let feeder = tokio::spawn(async move {
            policy.on_stream_start(&feeder_ctx, &feeder_sctx).await?;

            let assembler = Assembler::new(interpreter);
            let mut cancelled = false;

            while let Some(next) = ingress.next().await {
                feeder_watchdog.touch().await;
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        cancelled = matches!(err, Error::ClientCancelled);
                        break;
                    }
                };
                feeder_recorder.lock().await.push_ingress(chunk.clone());

                let events = {
                    let mut state = feeder_state.lock().await;
                    assembler.process_chunk(chunk.clone(), &mut state)
                };

                for event in events {
                    dispatch_event(
                        &*policy,
                        &feeder_ctx,
                        &feeder_sctx,
                        &feeder_state,
                        &chunk,
                        event,
                    )
                    .await?;
                }

                let finish_reason = {
                    let state = feeder_state.lock().await;
                    state.finish_reason.clone()
                };
                if let Some(reason) = finish_reason {
                    if !feeder_sctx.is_output_finished() {
                        policy
                            .on_finish_reason(&reason, &feeder_ctx, &feeder_sctx)
                            .await?;
                    }
                }
            }

            policy.on_stream_complete(&feeder_ctx, &feeder_sctx).await?;
            feeder_feed_complete.store(true, Ordering::SeqCst);
            Ok::<bool, Error>(cancelled)
        });

        let feeder_abort = feeder.abort_handle();
        let drainer = tokio::spawn(run_drainer::<A>(
            channels.egress_rx,
            channels.outgoing_tx,
            feed_complete.clone(),
            watchdog,
            feeder_abort,
        ));

        let finalize_ctx = ctx.clone();
        let finalize_recorder = recorder.clone();
        let finalize_interpreter = self.interpreter.clone();
        tokio::spawn(async move {
            let feeder_result = feeder.await;
            let _ = drainer.await;
            let cancelled = match feeder_result {
                Ok(Ok(cancelled)) => cancelled,
                Ok(Err(err)) => {
                    finalize_ctx
                        .record(PolicyEvent::new(
                            event_types::POLICY_ERROR,
                            json!({ "error": err.to_string() }),
                        ))
                        .await;
                    false
                }
                // A cancelled join means the drainer aborted the feeder
                // (watchdog expiry) or the task panicked; either way the
                // recorder should mark this a partial, cancelled stream.
                Err(join_err) => join_err.is_cancelled(),
            };
            finalize_recorder
                .lock()
                .await
                .finalize_streaming(&finalize_ctx, finalize_interpreter, cancelled)
                .await;
        });

        Ok(Box::pin(ReceiverStream::new(channels.outgoing_rx)))
    }
}

/// Fires the hook matching one [`DispatchEvent`], following the order the
/// component names: delta hook, then complete hook if the delta also
/// closed a block. Always clones the specific block out of `state` and
/// drops the guard before awaiting a hook — `state` is a
/// `tokio::sync::Mutex`, and a hook may itself reenter it via
/// `StreamingContext::take_unemitted_raw_chunks`, which would deadlock if
/// the lock were still held here.
async fn dispatch_event<A, P>(
    policy: &P,
    ctx: &TransactionContext,
    sctx: &StreamingContext<A>,
    state: &Arc<AsyncMutex<StreamState<A>>>,
    raw_chunk: &A::Chunk,
    event: DispatchEvent,
) -> Result<()>
where
    A: Api,
    P: Policy<A> + ?Sized,
{
    match event {
        DispatchEvent::ContentDelta { block_index, text } => {
            let block = {
                let state = state.lock().await;
                content_block_at(&state, block_index)
            };
            if let Some(block) = block {
                policy.on_content_delta(&text, &block, ctx, sctx).await?;
            }
        }
        DispatchEvent::ToolCallDelta { block_index } => {
            let block = {
                let state = state.lock().await;
                tool_call_block_at(&state, block_index)
            };
            if let Some(block) = block {
                policy
                    .on_tool_call_delta(raw_chunk.clone(), &block, ctx, sctx)
                    .await?;
            }
        }
        DispatchEvent::BlockClosed { block_index } => {
            let block = {
                let state = state.lock().await;
                state.blocks.get(block_index).cloned()
            };
            match block {
                Some(StreamBlock::Content(block)) => {
                    policy.on_content_complete(&block, ctx, sctx).await?;
                }
                Some(StreamBlock::ToolCall(block)) => {
                    policy.on_tool_call_complete(&block, ctx, sctx).await?;
                }
                None => {}
            }
        }
    }
    Ok(())
}

fn content_block_at<A: Api>(
    state: &StreamState<A>,
    index: usize,
) -> Option<crate::assembler::ContentStreamBlock> {
    match state.blocks.get(index) {
        Some(StreamBlock::Content(b)) => Some(b.clone()),
        _ => None,
    }
}

fn tool_call_block_at<A: Api>(state: &StreamState<A>, index: usize) -> Option<ToolCallStreamBlock> {
    match state.blocks.get(index) {
        Some(StreamBlock::ToolCall(b)) => Some(b.clone()),
        _ => None,
    }
}

//! The `Api` trait parameterizes the generic core (assembler, orchestrator,
//! streaming orchestrator, recorder) over a provider's wire shape.
//!
//! The historical design routed every backend through one internal format
//! and converted at the edges. That conversion step is retired: each
//! client-facing API gets its own end-to-end path, with the concurrency
//! core written once and instantiated twice. A policy author picks one
//! `Api` and writes hooks against its native request/chunk/response types;
//! nothing inside the core ever converts between the two.

use crate::wire::anthropic::{AnthropicChunk, AnthropicRequest, AnthropicResponse};
use crate::wire::openai::{OpenAiChunk, OpenAiRequest, OpenAiResponse};
use std::fmt::Debug;

/// A provider wire shape: its request, response, and streaming-chunk types.
///
/// Implementors are zero-sized marker types (`OpenAiApi`, `AnthropicApi`);
/// the trait exists purely to carry the three associated types through the
/// generic core.
pub trait Api: Send + Sync + Debug + 'static {
    type Request: Send + Sync + Debug + 'static;
    type Response: Send + Sync + Debug + 'static;
    type Chunk: Send + Sync + Debug + Clone + 'static;
}

/// The OpenAI-compatible chat-completions wire shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiApi;

impl Api for OpenAiApi {
    type Request = OpenAiRequest;
    type Response = OpenAiResponse;
    type Chunk = OpenAiChunk;
}

/// The Anthropic-compatible Messages API wire shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicApi;

impl Api for AnthropicApi {
    type Request = AnthropicRequest;
    type Response = AnthropicResponse;
    type Chunk = AnthropicChunk;
}

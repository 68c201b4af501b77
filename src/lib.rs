//! # Luthien Core
//!
//! The policy execution pipeline that sits between an AI coding agent and
//! its LLM backend: every request and response passes through a
//! user-supplied [`policy::Policy`] before it reaches the wire, streaming
//! or not, OpenAI-compatible or Anthropic-compatible.
//!
//! ## Architecture
//!
//! - **api**: the `Api` trait parameterizing the whole pipeline over a
//!   provider's request/response/chunk shapes, plus the `OpenAiApi` and
//!   `AnthropicApi` marker types.
//! - **wire**: the concrete OpenAI and Anthropic wire formats, each with a
//!   `DeltaInterpreter` feeding the assembler.
//! - **assembler**: turns a sequence of provider chunks into whole content
//!   and tool-call blocks as they open and close.
//! - **policy**: the hook surface a policy implements, and the
//!   `StreamingContext` bridge handed to streaming hooks.
//! - **orchestrator**: drives one transaction through the backend and the
//!   policy, non-streaming and streaming.
//! - **streaming**: the egress queue plumbing and idle watchdog the
//!   streaming orchestrator runs on.
//! - **backend**: the `Backend` trait and an `HttpBackend` implementation.
//! - **recorder**: buffers chunks and emits the observability events a
//!   completed transaction produces.
//! - **sinks**: where recorded events go.
//! - **transaction**: per-call identity and scratchpad.
//! - **config**: orchestrator configuration (idle window, queue capacity).
//! - **policies**: sample policies (`NoopPolicy`, `UppercasePolicy`,
//!   `ToolCallJudgePolicy`) built on the above.
//!
//! ## Example
//!
//! ```rust,no_run
//! use luthien_core::api::OpenAiApi;
//! use luthien_core::backend::HttpBackend;
//! use luthien_core::config::OrchestratorConfig;
//! use luthien_core::orchestrator::PolicyOrchestrator;
//! use luthien_core::policies::NoopPolicy;
//! use luthien_core::sinks::SinkRouter;
//! use luthien_core::wire::openai::{text_chunk, tool_call_chunk, OpenAiDeltaInterpreter, OpenAiRequest};
//! use std::sync::Arc;
//!
//! # async fn run(request: OpenAiRequest) -> luthien_core::error::Result<()> {
//! let backend = HttpBackend::<OpenAiApi>::new("https://api.openai.com/v1", "sk-...")?;
//! let orchestrator = PolicyOrchestrator::new(
//!     Arc::new(NoopPolicy),
//!     Arc::new(backend),
//!     Arc::new(SinkRouter::builder().build()),
//!     OrchestratorConfig::default(),
//!     OpenAiDeltaInterpreter,
//!     Arc::new(text_chunk),
//!     Arc::new(tool_call_chunk),
//! );
//! let response = orchestrator.process_full_response(request).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod assembler;
pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod policies;
pub mod policy;
pub mod recorder;
pub mod retry;
pub mod sinks;
pub mod streaming;
pub mod tools;
pub mod transaction;
pub mod wire;

pub use api::{Api, AnthropicApi, OpenAiApi};
pub use config::{IdleWindow, OrchestratorConfig, QueueCapacity};
pub use error::{Error, Result};
pub use event::{event_types, PolicyEvent};
pub use orchestrator::PolicyOrchestrator;
pub use policy::{Policy, SimplePolicy, SimplePolicyAdapter, StreamingContext};
pub use recorder::TransactionRecorder;
pub use sinks::{Sink, SinkName, SinkRouter};
pub use tools::{tool, Tool, ToolBuilder};
pub use transaction::{Scratchpad, TransactionContext};

/// Convenience module for the types most policy authors touch directly.
/// Import with `use luthien_core::prelude::*;`.
pub mod prelude {
    pub use crate::api::{Api, AnthropicApi, OpenAiApi};
    pub use crate::assembler::{ContentStreamBlock, StreamBlock, ToolCallStreamBlock};
    pub use crate::config::OrchestratorConfig;
    pub use crate::error::{Error, Result};
    pub use crate::orchestrator::PolicyOrchestrator;
    pub use crate::policies::{NoopPolicy, ToolCallJudgePolicy, UppercasePolicy};
    pub use crate::policy::{Policy, SimplePolicy, StreamingContext};
    pub use crate::sinks::SinkRouter;
    pub use crate::transaction::TransactionContext;
}

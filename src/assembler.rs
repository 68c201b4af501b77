//! Consumes an async sequence of provider chunks and derives a running
//! [`StreamState`]: open blocks, the block just completed, the finish
//! reason, and the raw chunk buffer.
//!
//! The accumulate-deltas-by-index style is grounded on the teacher's
//! `ToolCallAggregator` in `utils.rs` (`text_buffer` / `tool_calls:
//! HashMap<u32, PartialToolCall>`), generalized from a flush-only-at-finish
//! design to one that opens and closes blocks as they occur (so hooks can
//! be dispatched per delta, not just at stream end), and parameterized
//! over [`Api`](crate::api::Api) via [`DeltaInterpreter`] so the same loop
//! drives both the OpenAI-indexed and the Anthropic-content-block-indexed
//! wire shapes.

use std::collections::HashMap;

/// A block just closed, or still accumulating.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamBlock {
    Content(ContentStreamBlock),
    ToolCall(ToolCallStreamBlock),
}

impl StreamBlock {
    pub fn is_complete(&self) -> bool {
        match self {
            StreamBlock::Content(b) => b.is_complete,
            StreamBlock::ToolCall(b) => b.is_complete,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentStreamBlock {
    pub text: String,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallStreamBlock {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
    pub is_complete: bool,
}

/// One interpreted delta: which block index it belongs to, and what kind
/// of content it carries. Produced by a [`DeltaInterpreter`] from a
/// provider-native chunk so the assembler loop never branches on `Api`.
pub enum InterpretedDelta {
    /// No block-shaped content in this chunk (e.g. a bare role marker).
    Empty,
    ContentDelta { block_index: u32, text: String },
    ToolCallDelta {
        block_index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments_fragment: Option<String>,
    },
    /// The current block at `block_index` is now closed, with no further
    /// content attached to this chunk.
    BlockBoundary { block_index: u32 },
}

/// Interprets one `Api`'s native chunk shape into [`InterpretedDelta`]s and
/// extracts its finish reason, if any.
pub trait DeltaInterpreter<A: crate::api::Api> {
    fn interpret(&self, chunk: &A::Chunk) -> Vec<InterpretedDelta>;
    fn finish_reason(&self, chunk: &A::Chunk) -> Option<String>;
}

/// Mutable per-stream structure the assembler owns exclusively.
pub struct StreamState<A: crate::api::Api> {
    pub blocks: Vec<StreamBlock>,
    pub current_block: Option<usize>,
    pub just_completed: Option<usize>,
    pub finish_reason: Option<String>,
    pub raw_chunks: Vec<A::Chunk>,
    pub last_emission_index: usize,
    open_indices: HashMap<u32, usize>,
}

impl<A: crate::api::Api> Default for StreamState<A> {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            current_block: None,
            just_completed: None,
            finish_reason: None,
            raw_chunks: Vec::new(),
            last_emission_index: 0,
            open_indices: HashMap::new(),
        }
    }
}

impl<A: crate::api::Api> StreamState<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks not yet forwarded to egress, per the `last_emission_index`
    /// watermark. Advances the watermark to the end of `raw_chunks`.
    pub fn take_unemitted(&mut self) -> &[A::Chunk] {
        let start = self.last_emission_index;
        self.last_emission_index = self.raw_chunks.len();
        &self.raw_chunks[start..]
    }

    fn close_block(&mut self, idx: usize) {
        match &mut self.blocks[idx] {
            StreamBlock::Content(b) => b.is_complete = true,
            StreamBlock::ToolCall(b) => b.is_complete = true,
        }
        self.just_completed = Some(idx);
        if self.current_block == Some(idx) {
            self.current_block = None;
        }
    }

    /// Closes every still-open block (e.g. on `finish_reason`) and returns
    /// the indices closed, in the order the blocks were opened — `blocks` is
    /// itself in open order, so walking it directly (rather than
    /// `open_indices.values()`, a `HashMap` with no defined iteration order)
    /// is what keeps "blocks close in the order they open" true even when
    /// several blocks are still open at once.
    fn close_all_open(&mut self) -> Vec<usize> {
        let open: Vec<usize> = self
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_complete())
            .map(|(idx, _)| idx)
            .collect();
        for &idx in &open {
            self.close_block(idx);
        }
        self.open_indices.clear();
        open
    }
}

/// One thing the orchestrator's dispatcher should react to, in the order
/// produced by a single [`Assembler::process_chunk`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    ContentDelta { block_index: usize, text: String },
    ToolCallDelta { block_index: usize },
    BlockClosed { block_index: usize },
}

/// Consumes chunks one at a time, updating `state`, and invokes
/// `on_chunk(chunk_index, just_opened_or_extended, &mut state)` after each
/// chunk so the orchestrator can dispatch policy hooks in the order
/// specified for the component: delta hook, then complete hook (if this
/// chunk closed a block), then finish hook (if this chunk carried
/// `finish_reason`).
pub struct Assembler<A: crate::api::Api, I: DeltaInterpreter<A>> {
    interpreter: I,
    _marker: std::marker::PhantomData<A>,
}

impl<A: crate::api::Api, I: DeltaInterpreter<A>> Assembler<A, I> {
    pub fn new(interpreter: I) -> Self {
        Self {
            interpreter,
            _marker: std::marker::PhantomData,
        }
    }

    /// Processes one chunk against `state`. Returns, in order, the dispatch
    /// events the orchestrator should fire hooks for.
    pub fn process_chunk(&self, chunk: A::Chunk, state: &mut StreamState<A>) -> Vec<DispatchEvent> {
        state.just_completed = None;
        let mut events = Vec::new();

        let deltas = self.interpreter.interpret(&chunk);
        for delta in deltas {
            match delta {
                InterpretedDelta::Empty => {}
                InterpretedDelta::ContentDelta { block_index, text } => {
                    let idx = self.open_or_extend_content(state, block_index, &text);
                    events.push(DispatchEvent::ContentDelta {
                        block_index: idx,
                        text,
                    });
                }
                InterpretedDelta::ToolCallDelta {
                    block_index,
                    id,
                    name,
                    arguments_fragment,
                } => {
                    let idx = self.open_or_extend_tool_call(
                        state,
                        block_index,
                        id,
                        name,
                        arguments_fragment,
                    );
                    events.push(DispatchEvent::ToolCallDelta { block_index: idx });
                }
                InterpretedDelta::BlockBoundary { block_index } => {
                    if let Some(&idx) = state.open_indices.get(&block_index) {
                        state.close_block(idx);
                        state.open_indices.remove(&block_index);
                        events.push(DispatchEvent::BlockClosed { block_index: idx });
                    }
                }
            }
        }

        if let Some(reason) = self.interpreter.finish_reason(&chunk) {
            state.finish_reason = Some(reason);
            for idx in state.close_all_open() {
                events.push(DispatchEvent::BlockClosed { block_index: idx });
            }
        }

        state.raw_chunks.push(chunk);
        events
    }

    /// Called once the source is exhausted, with no further chunks
    /// coming. Any block still open stays open — the assembler never
    /// invents a synthetic close for a truncated stream.
    pub fn finalize(&self, _state: &mut StreamState<A>) {}

    fn open_or_extend_content(
        &self,
        state: &mut StreamState<A>,
        block_index: u32,
        text: &str,
    ) -> usize {
        if let Some(&idx) = state.open_indices.get(&block_index) {
            if let StreamBlock::Content(b) = &mut state.blocks[idx] {
                b.text.push_str(text);
                return idx;
            }
        }
        let idx = state.blocks.len();
        state.blocks.push(StreamBlock::Content(ContentStreamBlock {
            text: text.to_string(),
            is_complete: false,
        }));
        state.open_indices.insert(block_index, idx);
        state.current_block = Some(idx);
        idx
    }

    fn open_or_extend_tool_call(
        &self,
        state: &mut StreamState<A>,
        block_index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments_fragment: Option<String>,
    ) -> usize {
        if let Some(&idx) = state.open_indices.get(&block_index) {
            if let StreamBlock::ToolCall(b) = &mut state.blocks[idx] {
                if let Some(id) = id {
                    b.id = Some(id);
                }
                if let Some(name) = name {
                    b.name = name;
                }
                if let Some(frag) = arguments_fragment {
                    b.arguments.push_str(&frag);
                }
                return idx;
            }
        }
        let idx = state.blocks.len();
        state.blocks.push(StreamBlock::ToolCall(ToolCallStreamBlock {
            id,
            name: name.unwrap_or_default(),
            arguments: arguments_fragment.unwrap_or_default(),
            is_complete: false,
        }));
        state.open_indices.insert(block_index, idx);
        state.current_block = Some(idx);
        idx
    }
}

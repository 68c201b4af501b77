//! Anthropic-compatible Messages API wire types.
//!
//! New relative to the teacher (which only ever spoke OpenAI-shaped chat
//! completions); modeled after the same serde field-naming conventions the
//! teacher uses for its own wire types (`#[serde(rename = "type")]`,
//! `skip_serializing_if = "Option::is_none"`), applied to Anthropic's
//! `content_block_start` / `content_block_delta` / `content_block_stop` /
//! `message_delta` / `message_stop` streaming event shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<AnthropicMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicResponse {
    pub id: String,
    pub model: String,
    pub role: String,
    pub content: Vec<AnthropicContentBlock>,
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnthropicUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One SSE event from an Anthropic Messages streaming response.
///
/// Anthropic frames a stream as a sequence of named event types rather than
/// OpenAI's single chunk shape; this enum carries exactly the fields the
/// Assembler's Anthropic `DeltaInterpreter` needs from each event kind.
/// Carries `Serialize` too: the orchestrator re-emits these toward the
/// client, including synthetic replacement events a policy builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicChunk {
    MessageStart {
        message: AnthropicMessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: AnthropicContentBlockStart,
    },
    ContentBlockDelta {
        index: u32,
        delta: AnthropicDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: AnthropicMessageDelta,
    },
    MessageStop,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessageStart {
    pub id: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlockStart {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessageDelta {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Interprets Anthropic's named streaming events into the generic
/// assembler vocabulary. `ContentBlockStart` opens a block (so a tool
/// use's `id`/`name` are known before any `input_json_delta` arrives,
/// unlike OpenAI where they can trail the first delta), `ContentBlockStop`
/// closes it directly rather than waiting for `finish_reason`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicDeltaInterpreter;

impl crate::assembler::DeltaInterpreter<crate::api::AnthropicApi> for AnthropicDeltaInterpreter {
    fn interpret(&self, chunk: &AnthropicChunk) -> Vec<crate::assembler::InterpretedDelta> {
        match chunk {
            AnthropicChunk::ContentBlockStart {
                index,
                content_block: AnthropicContentBlockStart::Text { text },
            } => vec![crate::assembler::InterpretedDelta::ContentDelta {
                block_index: *index,
                text: text.clone(),
            }],
            AnthropicChunk::ContentBlockStart {
                index,
                content_block: AnthropicContentBlockStart::ToolUse { id, name },
            } => vec![crate::assembler::InterpretedDelta::ToolCallDelta {
                block_index: *index,
                id: Some(id.clone()),
                name: Some(name.clone()),
                arguments_fragment: None,
            }],
            AnthropicChunk::ContentBlockDelta {
                index,
                delta: AnthropicDelta::TextDelta { text },
            } => vec![crate::assembler::InterpretedDelta::ContentDelta {
                block_index: *index,
                text: text.clone(),
            }],
            AnthropicChunk::ContentBlockDelta {
                index,
                delta: AnthropicDelta::InputJsonDelta { partial_json },
            } => vec![crate::assembler::InterpretedDelta::ToolCallDelta {
                block_index: *index,
                id: None,
                name: None,
                arguments_fragment: Some(partial_json.clone()),
            }],
            AnthropicChunk::ContentBlockStop { index } => {
                vec![crate::assembler::InterpretedDelta::BlockBoundary { block_index: *index }]
            }
            AnthropicChunk::MessageStart { .. }
            | AnthropicChunk::MessageDelta { .. }
            | AnthropicChunk::MessageStop
            | AnthropicChunk::Ping => vec![crate::assembler::InterpretedDelta::Empty],
        }
    }

    fn finish_reason(&self, chunk: &AnthropicChunk) -> Option<String> {
        match chunk {
            AnthropicChunk::MessageDelta { delta } => delta.stop_reason.clone(),
            _ => None,
        }
    }
}

/// Builds a synthetic content-delta event for a policy replacing a
/// buffered text block. A real finish arrives over separate
/// `message_delta`/`message_stop` events, so `finish` is folded into one
/// `message_delta` event carrying `stop_reason`, dropping `text` (the
/// default finish hook always calls this with an empty string).
pub fn text_chunk(text: &str, finish: bool) -> AnthropicChunk {
    if finish {
        AnthropicChunk::MessageDelta {
            delta: AnthropicMessageDelta {
                stop_reason: Some("end_turn".into()),
            },
        }
    } else {
        AnthropicChunk::ContentBlockDelta {
            index: 0,
            delta: AnthropicDelta::TextDelta {
                text: text.to_string(),
            },
        }
    }
}

/// Builds a synthetic tool-call event for a policy replacing a buffered
/// tool call, carrying the whole accumulated arguments string in one
/// `input_json_delta`.
pub fn tool_call_chunk(
    call: &crate::assembler::ToolCallStreamBlock,
    finish: bool,
) -> AnthropicChunk {
    if finish {
        AnthropicChunk::MessageDelta {
            delta: AnthropicMessageDelta {
                stop_reason: Some("tool_use".into()),
            },
        }
    } else {
        AnthropicChunk::ContentBlockDelta {
            index: 0,
            delta: AnthropicDelta::InputJsonDelta {
                partial_json: call.arguments.clone(),
            },
        }
    }
}

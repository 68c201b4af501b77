//! OpenAI-compatible chat-completions wire types.
//!
//! Shapes mirror the teacher SDK's own `OpenAIRequest`/`OpenAIChunk` family,
//! extended with a non-streaming `OpenAiResponse` (the teacher never needed
//! one — it always requests `stream: true`).

use serde::{Deserialize, Serialize};

/// One role-tagged message in an OpenAI-shaped conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAiFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunction {
    pub name: String,
    pub arguments: String,
}

/// A non-streaming or streaming chat-completions request.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
}

/// A full (non-streaming) chat-completions response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<OpenAiResponseChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiResponseChoice {
    pub index: u32,
    pub message: OpenAiMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One streaming delta chunk, matching the `chat.completion.chunk` SSE
/// payload shape. Carries both `Deserialize` (parsing backend SSE) and
/// `Serialize` (the orchestrator re-emits these, including synthetic
/// replacements a policy builds, toward the client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChunk {
    pub id: String,
    pub choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoice {
    pub index: u32,
    pub delta: OpenAiDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCallDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    pub call_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<OpenAiFunctionDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunctionDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Interprets `OpenAiChunk` deltas into the generic assembler vocabulary.
/// Tool-call arguments arrive as an incrementally-concatenated JSON string
/// fragment keyed by `index`, matching the OpenAI wire format directly —
/// no additional bookkeeping needed beyond what `StreamState` already does.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiDeltaInterpreter;

impl crate::assembler::DeltaInterpreter<crate::api::OpenAiApi> for OpenAiDeltaInterpreter {
    fn interpret(&self, chunk: &OpenAiChunk) -> Vec<crate::assembler::InterpretedDelta> {
        let Some(choice) = chunk.choices.first() else {
            return Vec::new();
        };
        let mut deltas = Vec::new();
        if let Some(text) = &choice.delta.content {
            deltas.push(crate::assembler::InterpretedDelta::ContentDelta {
                block_index: 0,
                text: text.clone(),
            });
        }
        if let Some(tool_calls) = &choice.delta.tool_calls {
            for call in tool_calls {
                // Offset by one so a tool-call index never collides with
                // the single implicit content block at index 0.
                deltas.push(crate::assembler::InterpretedDelta::ToolCallDelta {
                    block_index: call.index + 1,
                    id: call.id.clone(),
                    name: call.function.as_ref().and_then(|f| f.name.clone()),
                    arguments_fragment: call.function.as_ref().and_then(|f| f.arguments.clone()),
                });
            }
        }
        deltas
    }

    fn finish_reason(&self, chunk: &OpenAiChunk) -> Option<String> {
        chunk.choices.first().and_then(|c| c.finish_reason.clone())
    }
}

/// Builds a synthetic content chunk matching the shape a real backend
/// would emit for a text delta, for policies that replace rather than
/// pass through a buffered block.
pub fn text_chunk(text: &str, finish: bool) -> OpenAiChunk {
    OpenAiChunk {
        id: "luthien-synthetic".into(),
        choices: vec![OpenAiChoice {
            index: 0,
            delta: OpenAiDelta {
                role: None,
                content: Some(text.to_string()),
                tool_calls: None,
            },
            finish_reason: if finish { Some("stop".into()) } else { None },
        }],
    }
}

/// Builds a synthetic tool-call chunk carrying the whole call in one
/// delta, for policies that replace a buffered tool call.
pub fn tool_call_chunk(
    call: &crate::assembler::ToolCallStreamBlock,
    finish: bool,
) -> OpenAiChunk {
    OpenAiChunk {
        id: "luthien-synthetic".into(),
        choices: vec![OpenAiChoice {
            index: 0,
            delta: OpenAiDelta {
                role: None,
                content: None,
                tool_calls: Some(vec![OpenAiToolCallDelta {
                    index: 0,
                    id: call.id.clone(),
                    call_type: Some("function".into()),
                    function: Some(OpenAiFunctionDelta {
                        name: Some(call.name.clone()),
                        arguments: Some(call.arguments.clone()),
                    }),
                }]),
            },
            finish_reason: if finish { Some("stop".into()) } else { None },
        }],
    }
}

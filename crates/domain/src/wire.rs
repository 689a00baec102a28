//! The wire contract consumed from a container's session stream.
//!
//! These types mirror the StreamMessage frames documented by the
//! container's internal LLM SDK. The core treats the container as an
//! opaque subprocess speaking this documented protocol — it never
//! interprets the LLM's own reasoning, only the envelope.
//!
//! `StreamMessage::kind` (wire field `type`) takes one of: `"system"`
//! (subtype `"init"`), `"assistant"`, `"user"`, `"result"`,
//! `"stream_event"` (nested `content.event`), `"compact_start"`,
//! `"compact_complete"`, `"context_usage"`, `"browser_active"`,
//! `"os_notification"`, `"session_updated"`, `"scheduled_task_created"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One frame from a container's session stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: StreamContent,
    pub timestamp: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// The `content` field of a `StreamMessage`. Untagged because the
/// container's own `type`/`subtype` discriminate it, not serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamContent {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default, rename = "parent_tool_use_id")]
    pub parent_tool_use_id: Option<String>,
    #[serde(default)]
    pub event: Option<SdkStreamEvent>,
    #[serde(default)]
    pub slash_commands: Option<Vec<SlashCommand>>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub usage: Option<ContextUsage>,
    /// Catch-all for ancillary signal payloads we pass through verbatim
    /// (`session_updated`, `scheduled_task_created`, `os_notification`).
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashCommand {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "argumentHint")]
    pub argument_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ContextUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_create: u64,
    #[serde(default)]
    pub cache_read: u64,
    #[serde(default)]
    pub context_window: u64,
}

/// A complete (possibly chunked) assistant or user message as carried
/// inside a `StreamMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub content: WireContent,
    #[serde(default, rename = "agentId")]
    pub agent_id: Option<String>,
}

/// `message.content` is either a bare string or an ordered block list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl WireContent {
    pub fn as_blocks(&self) -> Vec<ContentBlock> {
        match self {
            WireContent::Text(t) => vec![ContentBlock::Text { text: t.clone() }],
            WireContent::Blocks(b) => b.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<Value>,
        #[serde(default)]
        is_error: bool,
        #[serde(default, rename = "toolUseResult")]
        tool_use_result: Option<Value>,
    },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
}

/// One of the SDK's `stream_event` frames (nested inside a `StreamMessage`
/// whose `content.type == "stream_event"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SdkStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart,
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: u32, content_block: BlockStart },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: u32, delta: BlockDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: u32 },
    #[serde(rename = "message_stop")]
    MessageStop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlockStart {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlockDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
}

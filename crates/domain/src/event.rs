//! Normalized events published by the Session Stream Processor to the
//! Realtime Event Bus. One tagged enum, one variant per row of the
//! event table — this is the wire format clients see over SSE.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename = "connected")]
    Connected { is_active: bool },

    #[serde(rename = "session_active")]
    SessionActive,
    #[serde(rename = "session_idle")]
    SessionIdle,
    #[serde(rename = "session_error")]
    SessionError { error: String },

    #[serde(rename = "stream_start")]
    StreamStart {
        #[serde(skip_serializing_if = "Option::is_none")]
        slash_commands: Option<Vec<Value>>,
    },
    #[serde(rename = "stream_delta")]
    StreamDelta { text: String },
    #[serde(rename = "stream_end")]
    StreamEnd,

    #[serde(rename = "tool_use_start")]
    ToolUseStart { tool_id: String, tool_name: String },
    #[serde(rename = "tool_use_streaming")]
    ToolUseStreaming { tool_id: String, tool_name: String },
    #[serde(rename = "tool_use_ready")]
    ToolUseReady { tool_id: String, tool_name: String },

    #[serde(rename = "tool_call")]
    ToolCall { tool_call: Value },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        result: String,
        is_error: bool,
    },

    #[serde(rename = "messages_updated")]
    MessagesUpdated,

    #[serde(rename = "secret_request")]
    SecretRequest { payload: Value },
    #[serde(rename = "connected_account_request")]
    ConnectedAccountRequest { payload: Value },
    #[serde(rename = "user_question_request")]
    UserQuestionRequest { payload: Value },
    #[serde(rename = "file_request")]
    FileRequest { payload: Value },
    #[serde(rename = "remote_mcp_request")]
    RemoteMcpRequest { payload: Value },

    #[serde(rename = "compact_start")]
    CompactStart,
    #[serde(rename = "compact_complete")]
    CompactComplete,

    #[serde(rename = "context_usage")]
    ContextUsage {
        input_tokens: u64,
        output_tokens: u64,
        cache_create: u64,
        cache_read: u64,
        context_window: u64,
    },

    #[serde(rename = "browser_active")]
    BrowserActive { active: bool },

    #[serde(rename = "subagent_stream_start")]
    SubagentStreamStart { parent_tool_id: String },
    #[serde(rename = "subagent_stream_delta")]
    SubagentStreamDelta { parent_tool_id: String, text: String },
    #[serde(rename = "subagent_stream_end")]
    SubagentStreamEnd { parent_tool_id: String },
    #[serde(rename = "subagent_tool_use_start")]
    SubagentToolUseStart {
        parent_tool_id: String,
        tool_id: String,
        tool_name: String,
    },
    #[serde(rename = "subagent_tool_use_streaming")]
    SubagentToolUseStreaming {
        parent_tool_id: String,
        tool_id: String,
        tool_name: String,
    },
    #[serde(rename = "subagent_tool_use_ready")]
    SubagentToolUseReady {
        parent_tool_id: String,
        tool_id: String,
        tool_name: String,
    },
    #[serde(rename = "subagent_updated")]
    SubagentUpdated {
        parent_tool_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    #[serde(rename = "subagent_completed")]
    SubagentCompleted { parent_tool_id: String },

    #[serde(rename = "session_updated")]
    SessionUpdated { payload: Value },
    #[serde(rename = "scheduled_task_created")]
    ScheduledTaskCreated { payload: Value },
    #[serde(rename = "os_notification")]
    OsNotification { payload: Value },
    #[serde(rename = "ping")]
    Ping { is_active: bool },
}

impl Event {
    /// SSE wire framing: `data: {json}\n\n`.
    pub fn to_sse(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".into());
        format!("data: {json}\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_serializes_with_tag() {
        let ev = Event::Ping { is_active: true };
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"type":"ping","isActive":true}"#);
    }

    #[test]
    fn sse_framing_has_double_newline() {
        let ev = Event::SessionIdle;
        let framed = ev.to_sse();
        assert!(framed.starts_with("data: "));
        assert!(framed.ends_with("\n\n"));
    }
}

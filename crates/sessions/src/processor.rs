//! The Session Stream Processor: folds container stream frames into
//! normalized events (for the event bus) and durable JSONL entries (for
//! the transcript), one session at a time.

use chrono::Utc;

use sa_domain::error::Result;
use sa_domain::event::Event;
use sa_domain::wire::{ContentBlock, StreamMessage, WireMessage};

use crate::jsonl::{EntryBlock, JsonlEntry, MessageBody, MessageEntry, TranscriptStore};
use crate::streaming_state::StreamingState;

pub struct SessionProcessor {
    pub streaming: StreamingState,
    transcript: TranscriptStore,
}

impl SessionProcessor {
    pub fn new(transcript: TranscriptStore) -> Self {
        SessionProcessor {
            streaming: StreamingState::new(),
            transcript,
        }
    }

    /// Fold one frame: update streaming state, persist any complete
    /// message it carries, and return the events to publish.
    pub fn process_frame(&mut self, session_id: &str, frame: &StreamMessage) -> Result<Vec<Event>> {
        let events = self.streaming.apply(frame);
        if let Some(message) = &frame.content.message {
            self.persist_message(session_id, frame, message)?;
        }
        Ok(events)
    }

    fn persist_message(&self, session_id: &str, frame: &StreamMessage, message: &WireMessage) -> Result<()> {
        let blocks = message.content.as_blocks();
        let tool_use_result = blocks.iter().find_map(|block| match block {
            ContentBlock::ToolResult { tool_use_result, .. } => tool_use_result.clone(),
            _ => None,
        });
        let content = blocks.into_iter().map(convert_block).collect();

        let entry = MessageEntry {
            uuid: uuid::Uuid::new_v4().to_string(),
            timestamp: frame.timestamp.parse().unwrap_or_else(|_| Utc::now()),
            parent_uuid: None,
            parent_tool_use_id: frame.content.parent_tool_use_id.clone(),
            message: MessageBody {
                id: message.id.clone(),
                content,
            },
            tool_use_result,
            is_compact_summary: false,
        };
        let entry = if frame.kind == "user" {
            JsonlEntry::User(entry)
        } else {
            JsonlEntry::Assistant(entry)
        };
        self.transcript.append(session_id, &entry)
    }
}

fn convert_block(block: ContentBlock) -> EntryBlock {
    match block {
        ContentBlock::Text { text } => EntryBlock::Text { text },
        ContentBlock::Thinking { thinking } => EntryBlock::Thinking { thinking },
        ContentBlock::ToolUse { id, name, input } => EntryBlock::ToolUse { id, name, input },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
            ..
        } => EntryBlock::ToolResult {
            tool_use_id,
            content: content.and_then(|v| v.as_str().map(String::from)).unwrap_or_default(),
            is_error,
        },
    }
}

//! Per-session streaming state: the Session Stream Processor's working
//! memory while a turn is in flight.
//!
//! One `StreamingState` lives per active session. Each container stream
//! frame folds into it via `apply`, which both updates the state and
//! returns the normalized `Event`s that frame produces for the event
//! bus. The fold never blocks — callers own the single `StreamingState`
//! exclusively for the duration of one session's turn (see
//! `crate::lock::SessionLockMap`).

use std::collections::HashMap;

use serde_json::Value;

use sa_domain::event::Event;
use sa_domain::wire::{BlockDelta, BlockStart, ContentBlock, SdkStreamEvent, StreamContent, StreamMessage};

use crate::sidechain::SidechainRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Active,
}

#[derive(Debug, Default)]
struct ToolUseAccumulator {
    name: String,
}

/// Accumulated state for one session's in-flight turn.
pub struct StreamingState {
    pub phase: TurnPhase,
    tool_uses: HashMap<u32, ToolUseAccumulator>,
    tool_id_by_index: HashMap<u32, String>,
    /// Slash-command list captured from a `system`/`init` frame, carried
    /// forward and attached to the next `stream_start` event.
    captured_slash_commands: Option<Vec<Value>>,
    /// Set when a top-level `tool_use` named `Task` completes. A
    /// sub-agent is only considered finished once a `tool_result` on the
    /// *parent's own* stream carries this id — never from the
    /// sidechain's own stream ending.
    pending_task_tool_id: Option<String>,
    sidechains: SidechainRouter,
}

impl Default for StreamingState {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingState {
    pub fn new() -> Self {
        StreamingState {
            phase: TurnPhase::Idle,
            tool_uses: HashMap::new(),
            tool_id_by_index: HashMap::new(),
            captured_slash_commands: None,
            pending_task_tool_id: None,
            sidechains: SidechainRouter::new(),
        }
    }

    /// Fold one container stream frame into the state, returning the
    /// normalized events it produces (zero or more — a frame may be
    /// purely internal bookkeeping).
    pub fn apply(&mut self, frame: &StreamMessage) -> Vec<Event> {
        let sidechain = frame.content.parent_tool_use_id.as_deref();
        match frame.kind.as_str() {
            "system" => self.on_system(&frame.content),
            "assistant" => self.on_assistant(&frame.content, sidechain),
            "user" => self.on_user(&frame.content, sidechain),
            "result" => self.on_result(),
            "stream_event" => self.on_stream_event(&frame.content, sidechain),
            "compact_start" => vec![Event::CompactStart],
            "compact_complete" => vec![Event::CompactComplete],
            "context_usage" => self.on_context_usage(&frame.content),
            "browser_active" => frame
                .content
                .active
                .map(|active| vec![Event::BrowserActive { active }])
                .unwrap_or_default(),
            "session_updated" => vec![Event::SessionUpdated {
                payload: extra_payload(&frame.content),
            }],
            "scheduled_task_created" => vec![Event::ScheduledTaskCreated {
                payload: extra_payload(&frame.content),
            }],
            "os_notification" => vec![Event::OsNotification {
                payload: extra_payload(&frame.content),
            }],
            _ => Vec::new(),
        }
    }

    /// `system` frame. Only `subtype == "init"` carries anything
    /// client-relevant: the session's slash-command list.
    fn on_system(&mut self, content: &StreamContent) -> Vec<Event> {
        if content.subtype.as_deref() == Some("init") {
            self.captured_slash_commands = content.slash_commands.as_ref().map(|cmds| {
                cmds.iter()
                    .map(|c| serde_json::to_value(c).unwrap_or_default())
                    .collect()
            });
        }
        Vec::new()
    }

    /// A complete `assistant` message. Persisting the message itself is
    /// the processor's job; this derives the events it produces.
    fn on_assistant(&mut self, content: &StreamContent, sidechain: Option<&str>) -> Vec<Event> {
        let Some(message) = &content.message else {
            return Vec::new();
        };
        if let Some(parent) = sidechain {
            return vec![Event::SubagentUpdated {
                parent_tool_id: parent.to_string(),
                agent_id: message.agent_id.clone(),
            }];
        }
        let mut events = vec![Event::MessagesUpdated];
        for block in message.content.as_blocks() {
            if let ContentBlock::ToolUse { id, name, input } = block {
                events.push(Event::ToolCall {
                    tool_call: serde_json::json!({ "id": id, "name": name, "input": input }),
                });
            }
        }
        events
    }

    /// A `user` frame carrying one or more `tool_result` blocks. This is
    /// the only place `subagent_completed` is ever fired, and only when
    /// the result's `tool_use_id` matches `pending_task_tool_id` — a
    /// `tool_result` carrying any other id, sidechain or not, never
    /// triggers it.
    fn on_user(&mut self, content: &StreamContent, sidechain: Option<&str>) -> Vec<Event> {
        let Some(message) = &content.message else {
            return Vec::new();
        };
        let mut events = Vec::new();
        for block in message.content.as_blocks() {
            let ContentBlock::ToolResult {
                tool_use_id,
                content: result_content,
                is_error,
                ..
            } = block
            else {
                continue;
            };

            if let Some(parent) = sidechain {
                events.push(Event::SubagentToolUseReady {
                    parent_tool_id: parent.to_string(),
                    tool_id: tool_use_id,
                    tool_name: String::new(),
                });
                continue;
            }

            let result = result_content
                .as_ref()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            events.push(Event::ToolResult {
                tool_use_id: tool_use_id.clone(),
                result,
                is_error,
            });

            if self.pending_task_tool_id.as_deref() == Some(tool_use_id.as_str()) {
                self.pending_task_tool_id = None;
                self.sidechains.complete(&tool_use_id);
                events.push(Event::SubagentCompleted {
                    parent_tool_id: tool_use_id,
                });
            }
        }
        events
    }

    /// The turn's `result` frame: clear all in-flight state and go
    /// idle. This is the sole place `session_idle` is derived from.
    fn on_result(&mut self) -> Vec<Event> {
        self.phase = TurnPhase::Idle;
        self.tool_uses.clear();
        self.tool_id_by_index.clear();
        self.pending_task_tool_id = None;
        self.sidechains = SidechainRouter::new();
        vec![Event::SessionIdle]
    }

    fn on_stream_event(&mut self, content: &StreamContent, sidechain: Option<&str>) -> Vec<Event> {
        let Some(event) = &content.event else {
            return Vec::new();
        };
        match event {
            SdkStreamEvent::MessageStart => self.on_message_start(sidechain),
            SdkStreamEvent::ContentBlockStart { index, content_block } => {
                self.on_block_start(*index, content_block, sidechain)
            }
            SdkStreamEvent::ContentBlockDelta { index, delta } => self.on_block_delta(*index, delta, sidechain),
            SdkStreamEvent::ContentBlockStop { index } => self.on_block_stop(*index, sidechain),
            SdkStreamEvent::MessageStop => self.on_message_stop(sidechain),
        }
    }

    fn on_message_start(&mut self, sidechain: Option<&str>) -> Vec<Event> {
        if let Some(parent) = sidechain {
            return vec![Event::SubagentStreamStart {
                parent_tool_id: parent.to_string(),
            }];
        }
        self.phase = TurnPhase::Active;
        let slash_commands = self.captured_slash_commands.take();
        vec![Event::StreamStart { slash_commands }]
    }

    fn on_block_start(&mut self, index: u32, block: &BlockStart, sidechain: Option<&str>) -> Vec<Event> {
        let BlockStart::ToolUse { id, name } = block else {
            return Vec::new();
        };
        self.tool_uses.insert(index, ToolUseAccumulator { name: name.clone() });
        self.tool_id_by_index.insert(index, id.clone());
        if let Some(parent) = sidechain {
            self.sidechains.note_tool_use(parent, id);
            vec![Event::SubagentToolUseStart {
                parent_tool_id: parent.to_string(),
                tool_id: id.clone(),
                tool_name: name.clone(),
            }]
        } else {
            vec![Event::ToolUseStart {
                tool_id: id.clone(),
                tool_name: name.clone(),
            }]
        }
    }

    fn on_block_delta(&mut self, index: u32, delta: &BlockDelta, sidechain: Option<&str>) -> Vec<Event> {
        match delta {
            BlockDelta::TextDelta { text } => {
                if let Some(parent) = sidechain {
                    self.sidechains.append_text(parent, text);
                    vec![Event::SubagentStreamDelta {
                        parent_tool_id: parent.to_string(),
                        text: text.clone(),
                    }]
                } else {
                    vec![Event::StreamDelta { text: text.clone() }]
                }
            }
            BlockDelta::InputJsonDelta { .. } => {
                let Some(tool_id) = self.tool_id_by_index.get(&index).cloned() else {
                    return Vec::new();
                };
                let Some(name) = self.tool_uses.get(&index).map(|acc| acc.name.clone()) else {
                    return Vec::new();
                };
                if let Some(parent) = sidechain {
                    vec![Event::SubagentToolUseStreaming {
                        parent_tool_id: parent.to_string(),
                        tool_id,
                        tool_name: name,
                    }]
                } else {
                    vec![Event::ToolUseStreaming { tool_id, tool_name: name }]
                }
            }
        }
    }

    /// `content_block_stop`. A top-level `tool_use` named `Task`
    /// completing is how `pending_task_tool_id` gets set — the only
    /// thing a later `tool_result` can then match to fire
    /// `subagent_completed`.
    fn on_block_stop(&mut self, index: u32, sidechain: Option<&str>) -> Vec<Event> {
        let Some(tool_id) = self.tool_id_by_index.get(&index).cloned() else {
            return Vec::new();
        };
        let tool_name = self.tool_uses.get(&index).map(|acc| acc.name.clone()).unwrap_or_default();

        if let Some(parent) = sidechain {
            return vec![Event::SubagentToolUseReady {
                parent_tool_id: parent.to_string(),
                tool_id,
                tool_name,
            }];
        }
        if tool_name == "Task" {
            self.pending_task_tool_id = Some(tool_id.clone());
        }
        vec![Event::ToolUseReady { tool_id, tool_name }]
    }

    /// `message_stop`. For a sidechain this only signals the sub-agent's
    /// own stream ended — it never fires `subagent_completed` itself;
    /// that only happens once the matching `tool_result` lands on the
    /// parent's stream (see `on_user`).
    fn on_message_stop(&mut self, sidechain: Option<&str>) -> Vec<Event> {
        if let Some(parent) = sidechain {
            return vec![Event::SubagentStreamEnd {
                parent_tool_id: parent.to_string(),
            }];
        }
        self.tool_uses.clear();
        self.tool_id_by_index.clear();
        vec![Event::StreamEnd]
    }

    fn on_context_usage(&mut self, content: &StreamContent) -> Vec<Event> {
        let Some(usage) = &content.usage else {
            return Vec::new();
        };
        vec![Event::ContextUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_create: usage.cache_create,
            cache_read: usage.cache_read,
            context_window: usage.context_window,
        }]
    }

    pub fn active_sidechain_count(&self) -> usize {
        self.sidechains.active_count()
    }

    pub fn pending_task_tool_id(&self) -> Option<&str> {
        self.pending_task_tool_id.as_deref()
    }
}

fn extra_payload(content: &StreamContent) -> Value {
    serde_json::to_value(&content.extra).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::wire::{ContextUsage, SlashCommand, WireContent, WireMessage};

    fn frame(kind: &str, content: StreamContent) -> StreamMessage {
        StreamMessage {
            kind: kind.to_string(),
            content,
            timestamp: "2026-01-01T00:00:00Z".into(),
            session_id: "s1".into(),
        }
    }

    fn empty_content() -> StreamContent {
        StreamContent {
            subtype: None,
            message: None,
            parent_tool_use_id: None,
            event: None,
            slash_commands: None,
            active: None,
            usage: None,
            extra: Default::default(),
        }
    }

    fn stream_event(event: SdkStreamEvent) -> StreamContent {
        let mut content = empty_content();
        content.event = Some(event);
        content
    }

    fn tool_result_content(tool_use_id: &str) -> StreamContent {
        let mut content = empty_content();
        content.message = Some(WireMessage {
            id: "m2".into(),
            content: WireContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.to_string(),
                content: Some(serde_json::json!("done")),
                is_error: false,
                tool_use_result: None,
            }]),
            agent_id: None,
        });
        content
    }

    fn set_pending_task(state: &mut StreamingState, tool_id: &str) {
        state.apply(&frame(
            "stream_event",
            stream_event(SdkStreamEvent::ContentBlockStart {
                index: 0,
                content_block: BlockStart::ToolUse {
                    id: tool_id.into(),
                    name: "Task".into(),
                },
            }),
        ));
        state.apply(&frame(
            "stream_event",
            stream_event(SdkStreamEvent::ContentBlockStop { index: 0 }),
        ));
    }

    #[test]
    fn message_start_sets_active_phase_and_emits_stream_start() {
        let mut state = StreamingState::new();
        let events = state.apply(&frame("stream_event", stream_event(SdkStreamEvent::MessageStart)));
        assert_eq!(state.phase, TurnPhase::Active);
        assert!(matches!(events[0], Event::StreamStart { .. }));
    }

    #[test]
    fn system_init_slash_commands_are_attached_to_next_stream_start() {
        let mut state = StreamingState::new();
        let mut init_content = empty_content();
        init_content.subtype = Some("init".into());
        init_content.slash_commands = Some(vec![SlashCommand {
            name: "compact".into(),
            description: None,
            argument_hint: None,
        }]);
        let events = state.apply(&frame("system", init_content));
        assert!(events.is_empty());

        let events = state.apply(&frame("stream_event", stream_event(SdkStreamEvent::MessageStart)));
        match &events[0] {
            Event::StreamStart { slash_commands } => assert_eq!(slash_commands.as_ref().unwrap().len(), 1),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn result_frame_clears_state_and_emits_session_idle() {
        let mut state = StreamingState::new();
        state.apply(&frame("stream_event", stream_event(SdkStreamEvent::MessageStart)));
        let events = state.apply(&frame("result", empty_content()));
        assert_eq!(state.phase, TurnPhase::Idle);
        assert!(matches!(events[0], Event::SessionIdle));
    }

    #[test]
    fn assistant_message_emits_messages_updated_and_tool_call() {
        let mut state = StreamingState::new();
        let mut content = empty_content();
        content.message = Some(WireMessage {
            id: "m1".into(),
            content: WireContent::Blocks(vec![ContentBlock::ToolUse {
                id: "t1".into(),
                name: "bash".into(),
                input: serde_json::json!({}),
            }]),
            agent_id: None,
        });
        let events = state.apply(&frame("assistant", content));
        assert!(events.iter().any(|e| matches!(e, Event::MessagesUpdated)));
        assert!(events.iter().any(|e| matches!(e, Event::ToolCall { .. })));
    }

    #[test]
    fn sidechain_assistant_message_emits_subagent_updated_not_messages_updated() {
        let mut state = StreamingState::new();
        let mut content = empty_content();
        content.parent_tool_use_id = Some("task-1".into());
        content.message = Some(WireMessage {
            id: "m1".into(),
            content: WireContent::Text("partial".into()),
            agent_id: Some("agent-a".into()),
        });
        let events = state.apply(&frame("assistant", content));
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::SubagentUpdated { parent_tool_id, agent_id } => {
                assert_eq!(parent_tool_id, "task-1");
                assert_eq!(agent_id.as_deref(), Some("agent-a"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn task_tool_use_completing_sets_pending_task_tool_id() {
        let mut state = StreamingState::new();
        set_pending_task(&mut state, "task-tool-1");
        assert_eq!(state.pending_task_tool_id(), Some("task-tool-1"));
    }

    #[test]
    fn sidechain_message_stop_never_fires_subagent_completed() {
        let mut state = StreamingState::new();
        set_pending_task(&mut state, "task-tool-1");
        let mut content = stream_event(SdkStreamEvent::MessageStop);
        content.parent_tool_use_id = Some("task-tool-1".into());
        let events = state.apply(&frame("stream_event", content));
        assert!(events.iter().any(|e| matches!(e, Event::SubagentStreamEnd { .. })));
        assert!(!events.iter().any(|e| matches!(e, Event::SubagentCompleted { .. })));
        assert_eq!(state.pending_task_tool_id(), Some("task-tool-1"));
    }

    #[test]
    fn tool_result_matching_pending_task_tool_id_triggers_subagent_completed() {
        let mut state = StreamingState::new();
        set_pending_task(&mut state, "task-tool-1");
        let events = state.apply(&frame("user", tool_result_content("task-tool-1")));
        assert!(events.iter().any(|e| matches!(e, Event::SubagentCompleted { .. })));
        assert!(state.pending_task_tool_id().is_none());
    }

    #[test]
    fn tool_result_with_non_matching_id_never_triggers_subagent_completed() {
        let mut state = StreamingState::new();
        set_pending_task(&mut state, "task-tool-1");
        let events = state.apply(&frame("user", tool_result_content("some-other-tool")));
        assert!(!events.iter().any(|e| matches!(e, Event::SubagentCompleted { .. })));
        assert_eq!(state.pending_task_tool_id(), Some("task-tool-1"));
    }

    #[test]
    fn second_matching_tool_result_does_not_retrigger_completion() {
        let mut state = StreamingState::new();
        set_pending_task(&mut state, "task-tool-1");
        let first = state.apply(&frame("user", tool_result_content("task-tool-1")));
        assert!(first.iter().any(|e| matches!(e, Event::SubagentCompleted { .. })));
        let second = state.apply(&frame("user", tool_result_content("task-tool-1")));
        assert!(!second.iter().any(|e| matches!(e, Event::SubagentCompleted { .. })));
    }

    #[test]
    fn context_usage_frame_emits_usage_event() {
        let mut state = StreamingState::new();
        let mut content = empty_content();
        content.usage = Some(ContextUsage {
            input_tokens: 100,
            output_tokens: 50,
            cache_create: 0,
            cache_read: 10,
            context_window: 200_000,
        });
        let events = state.apply(&frame("context_usage", content));
        match &events[0] {
            Event::ContextUsage { input_tokens, .. } => assert_eq!(*input_tokens, 100),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_kind_produces_no_events() {
        let mut state = StreamingState::new();
        let events = state.apply(&frame("something_unrecognized", empty_content()));
        assert!(events.is_empty());
    }
}

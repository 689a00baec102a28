//! The canonical on-disk transcript format: one JSON object per line,
//! append-only, written as the Session Stream Processor turns wire
//! frames into durable history.
//!
//! This is distinct from `sa_domain::wire` (what the container emits on
//! the stream) — an entry here is the persisted, replayable record a
//! client rehydrates a session from after reconnect.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sa_domain::error::{Error, Result};

/// One content block inside a message entry's `message.content`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum EntryBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    /// A `ToolUse` block after the merge transform has resolved and
    /// inlined its matching result. Only produced by `merge_transcript`,
    /// never persisted — the raw log always keeps `ToolUse` and
    /// `ToolResult` as separate entries.
    #[serde(rename = "tool_result_attached")]
    ToolResultAttached {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// The `message` object carried by a `user`/`assistant` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageBody {
    pub id: String,
    pub content: Vec<EntryBlock>,
}

/// A `user` or `assistant` line of a session's JSONL transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageEntry {
    pub uuid: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<String>,
    /// Discriminates the main transcript from a sub-agent's sidechain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    pub message: MessageBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_result: Option<Value>,
    /// Marks a `user` entry as the synthesized summary the container
    /// writes immediately after a `system/compact_boundary` entry. Not
    /// part of the documented wire payload verbatim — the container
    /// marks it some way the merge transform can recognize, and this is
    /// our chosen representation of that marker (see DESIGN.md).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_compact_summary: bool,
}

/// A `system` line. Only the `compact_boundary` subtype is modeled — it
/// is the one the merge transform pairs with a following summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemEntry {
    pub uuid: String,
    pub timestamp: DateTime<Utc>,
    pub subtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compact_metadata: Option<Value>,
}

impl SystemEntry {
    pub fn is_compact_boundary(&self) -> bool {
        self.subtype == "compact_boundary"
    }
}

/// One line of a session's JSONL transcript file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonlEntry {
    User(MessageEntry),
    Assistant(MessageEntry),
    System(SystemEntry),
}

impl JsonlEntry {
    pub fn uuid(&self) -> &str {
        match self {
            JsonlEntry::User(e) | JsonlEntry::Assistant(e) => &e.uuid,
            JsonlEntry::System(e) => &e.uuid,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JsonlEntry::User(e) | JsonlEntry::Assistant(e) => e.timestamp,
            JsonlEntry::System(e) => e.timestamp,
        }
    }
}

/// Appends entries to, and reads back, a session's `<sessionId>.jsonl`
/// transcript under the configured sessions directory.
pub struct TranscriptStore {
    base_dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        TranscriptStore {
            base_dir: base_dir.into(),
        }
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.jsonl"))
    }

    /// Append one entry. Each append is a single `write_all` of one JSON
    /// line so concurrent writers from different sessions never
    /// interleave within a line.
    pub fn append(&self, session_id: &str, entry: &JsonlEntry) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        let path = self.path(session_id);
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read the full transcript in on-disk order, skipping (and
    /// logging) malformed lines rather than failing the whole read.
    pub fn read(&self, session_id: &str) -> Result<Vec<JsonlEntry>> {
        let path = self.path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let mut entries = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonlEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "skipping malformed jsonl entry");
                }
            }
        }
        Ok(entries)
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.path(session_id).exists()
    }

    pub fn dir(&self) -> &Path {
        &self.base_dir
    }
}

/// Resolve a tool result's displayed text: prefer `toolUseResult.stdout`,
/// falling back to the block's own `content` only when `stdout` is
/// entirely absent. An empty string in `stdout` is a valid result and
/// must win over `content` — this is a nullish-coalesce, not a
/// truthiness check.
pub fn resolve_tool_result_text(tool_use_result: Option<&Value>, block_content: &str) -> String {
    match tool_use_result.and_then(|v| v.get("stdout")) {
        Some(Value::String(s)) => s.clone(),
        _ => block_content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_stdout_even_when_empty() {
        let result = serde_json::json!({ "stdout": "" });
        assert_eq!(resolve_tool_result_text(Some(&result), "fallback"), "");
    }

    #[test]
    fn resolve_falls_back_when_stdout_absent() {
        let result = serde_json::json!({ "stderr": "oops" });
        assert_eq!(resolve_tool_result_text(Some(&result), "fallback"), "fallback");
    }

    #[test]
    fn resolve_falls_back_when_no_tool_use_result() {
        assert_eq!(resolve_tool_result_text(None, "fallback"), "fallback");
    }

    fn user_entry(uuid: &str, text: &str) -> JsonlEntry {
        JsonlEntry::User(MessageEntry {
            uuid: uuid.to_string(),
            timestamp: Utc::now(),
            parent_uuid: None,
            parent_tool_use_id: None,
            message: MessageBody {
                id: "msg1".into(),
                content: vec![EntryBlock::Text { text: text.to_string() }],
            },
            tool_use_result: None,
            is_compact_summary: false,
        })
    }

    #[test]
    fn append_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path());
        let entry = user_entry("u1", "hi");
        store.append("s1", &entry).unwrap();
        let read_back = store.read("s1").unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].uuid(), "u1");
    }

    #[test]
    fn read_missing_session_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path());
        assert!(store.read("nope").unwrap().is_empty());
    }

    #[test]
    fn read_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path());
        std::fs::write(dir.path().join("s1.jsonl"), "not json\n").unwrap();
        assert!(store.read("s1").unwrap().is_empty());
    }

    #[test]
    fn system_compact_boundary_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path());
        let entry = JsonlEntry::System(SystemEntry {
            uuid: "c1".into(),
            timestamp: Utc::now(),
            subtype: "compact_boundary".into(),
            compact_metadata: Some(serde_json::json!({ "trigger": "auto" })),
        });
        store.append("s1", &entry).unwrap();
        let read_back = store.read("s1").unwrap();
        match &read_back[0] {
            JsonlEntry::System(sys) => assert!(sys.is_compact_boundary()),
            other => panic!("expected system entry, got {other:?}"),
        }
    }
}

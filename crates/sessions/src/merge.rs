//! The JSONL merge transform: turns a raw on-disk transcript (chunked
//! assistant messages, interleaved tool-result entries, compaction
//! bookkeeping) into the sequence a client actually wants to render.
//!
//! Pure function: takes a slice, returns a new owned `Vec`. Never
//! mutates its input — callers that want the merged view re-derive it
//! from the raw log on each read, keeping the on-disk format the single
//! source of truth.

use std::collections::HashMap;

use serde_json::Value;

use crate::jsonl::{resolve_tool_result_text, EntryBlock, JsonlEntry, MessageEntry, SystemEntry};
use crate::slash_command::transform_slash_command_entry;

/// How many lines ahead of a `system/compact_boundary` entry to look for
/// its paired compact-summary `user` entry.
const COMPACT_SUMMARY_LOOKAHEAD: usize = 3;

struct ToolResult {
    content: String,
    is_error: bool,
    tool_use_result: Option<Value>,
}

/// Run the full merge transform over a raw transcript.
pub fn merge_transcript(raw: &[JsonlEntry]) -> Vec<JsonlEntry> {
    let paired = pair_compact_boundaries(raw);
    let tool_results = collect_tool_results(&paired);
    let without_tool_result_entries = filter_tool_result_only_user_entries(&paired);
    let merged_assistant = merge_assistant_chunks_by_message_id(&without_tool_result_entries);
    let attached = attach_tool_results(merged_assistant, &tool_results);
    attached.into_iter().map(transform_slash_command_entry).collect()
}

/// An entry is "tool-result-only" when every block in its message is a
/// `ToolResult` — i.e. it carries no content beyond reporting a tool's
/// output, and is collapsed into the corresponding `ToolUse` block
/// instead of appearing as its own row.
fn is_tool_result_only(entry: &MessageEntry) -> bool {
    !entry.message.content.is_empty()
        && entry
            .message
            .content
            .iter()
            .all(|b| matches!(b, EntryBlock::ToolResult { .. }))
}

fn collect_tool_results(entries: &[JsonlEntry]) -> HashMap<String, ToolResult> {
    let mut map = HashMap::new();
    for entry in entries {
        let JsonlEntry::User(user) = entry else { continue };
        if !is_tool_result_only(user) {
            continue;
        }
        for block in &user.message.content {
            if let EntryBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } = block
            {
                map.insert(
                    tool_use_id.clone(),
                    ToolResult {
                        content: content.clone(),
                        is_error: *is_error,
                        tool_use_result: user.tool_use_result.clone(),
                    },
                );
            }
        }
    }
    map
}

fn filter_tool_result_only_user_entries(entries: &[JsonlEntry]) -> Vec<JsonlEntry> {
    entries
        .iter()
        .filter(|e| !matches!(e, JsonlEntry::User(m) if is_tool_result_only(m)))
        .cloned()
        .collect()
}

/// Merge consecutive assistant entries that share a `message.id` into a
/// single entry whose content is the concatenation of their blocks in
/// arrival order. Streaming assistant turns are persisted as one JSONL
/// line per chunk; a client wants to see the finished message once.
fn merge_assistant_chunks_by_message_id(entries: &[JsonlEntry]) -> Vec<JsonlEntry> {
    let mut out: Vec<JsonlEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        let same_message_id = match (&entry, out.last()) {
            (JsonlEntry::Assistant(next), Some(JsonlEntry::Assistant(prev))) => {
                prev.message.id == next.message.id
            }
            _ => false,
        };

        if same_message_id {
            if let (JsonlEntry::Assistant(next), Some(JsonlEntry::Assistant(prev))) =
                (entry, out.last_mut())
            {
                prev.message.content.extend(next.message.content.clone());
            }
        } else {
            out.push(entry.clone());
        }
    }
    out
}

/// Walk every merged entry's `ToolUse` blocks and resolve their result
/// text from the collected tool-result map, replacing the plain
/// `ToolUse` with a block carrying its resolved output. Tool calls with
/// no matching result (still in flight) are left untouched.
fn attach_tool_results(entries: Vec<JsonlEntry>, results: &HashMap<String, ToolResult>) -> Vec<JsonlEntry> {
    entries
        .into_iter()
        .map(|entry| match entry {
            JsonlEntry::Assistant(mut m) => {
                for block in m.message.content.iter_mut() {
                    if let EntryBlock::ToolUse { id, .. } = block {
                        if let Some(result) = results.get(id) {
                            let tool_use_id = id.clone();
                            let resolved = resolve_tool_result_text(
                                result.tool_use_result.as_ref(),
                                &result.content,
                            );
                            *block = EntryBlock::ToolResultAttached {
                                tool_use_id,
                                content: resolved,
                                is_error: result.is_error,
                            };
                        }
                    }
                }
                JsonlEntry::Assistant(m)
            }
            other => other,
        })
        .collect()
}

fn summary_text(entry: &MessageEntry) -> String {
    entry
        .message
        .content
        .iter()
        .filter_map(|b| match b {
            EntryBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Merge the paired summary's text into the boundary's `compactMetadata`
/// so the synthetic item carries both without inventing a new field the
/// spec didn't ask for.
fn merged_compact_metadata(boundary: &SystemEntry, summary: &MessageEntry) -> Value {
    let mut metadata = boundary
        .compact_metadata
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));
    if let Value::Object(map) = &mut metadata {
        map.insert("summary".to_string(), Value::String(summary_text(summary)));
    }
    metadata
}

/// Step 1 of the merge transform: for each `system/compact_boundary`
/// entry, look ahead up to `COMPACT_SUMMARY_LOOKAHEAD` lines for the
/// next `user` entry flagged as a compact summary, and collapse the
/// pair into one synthetic `compact_boundary` item. Both originals are
/// skipped from the output; an unpaired boundary (no summary found in
/// range) passes through unchanged.
fn pair_compact_boundaries(entries: &[JsonlEntry]) -> Vec<JsonlEntry> {
    let mut out = Vec::with_capacity(entries.len());
    let mut i = 0;
    while i < entries.len() {
        if let JsonlEntry::System(boundary) = &entries[i] {
            if boundary.is_compact_boundary() {
                let lookahead_end = (i + 1 + COMPACT_SUMMARY_LOOKAHEAD).min(entries.len());
                let found = entries[i + 1..lookahead_end]
                    .iter()
                    .position(|e| matches!(e, JsonlEntry::User(m) if m.is_compact_summary));
                if let Some(offset) = found {
                    let summary_index = i + 1 + offset;
                    if let JsonlEntry::User(summary) = &entries[summary_index] {
                        out.push(JsonlEntry::System(SystemEntry {
                            uuid: boundary.uuid.clone(),
                            timestamp: boundary.timestamp,
                            subtype: boundary.subtype.clone(),
                            compact_metadata: Some(merged_compact_metadata(boundary, summary)),
                        }));
                    }
                    i = summary_index + 1;
                    continue;
                }
            }
        }
        out.push(entries[i].clone());
        i += 1;
    }
    out
}

//! Cosmetic slash-command transform.
//!
//! A slash command the container executed locally comes back as a
//! `user` entry whose *entire* text is one of two wrapper shapes:
//! `<command-name>...</command-name>` (with optional `<command-message>`
//! and `<command-args>` siblings, in any order) or
//! `<local-command-stdout>...</local-command-stdout>`. These are an
//! artifact of the container's own prompt construction, not something a
//! client should render literally. The match is exact — any surrounding
//! text disqualifies it and the entry is left untouched — because a
//! message that merely *mentions* these tags is not the same thing as
//! one the container generated as command echo.

use crate::jsonl::{EntryBlock, JsonlEntry, MessageBody};

/// Rewrite a merged-view entry if its sole text content is a command
/// wrapper. Entries that don't match exactly, or aren't `user` entries
/// with a single text block, pass through unchanged.
pub fn transform_slash_command_entry(entry: JsonlEntry) -> JsonlEntry {
    let JsonlEntry::User(mut user) = entry else {
        return entry;
    };
    let Some(text) = sole_text(&user.message) else {
        return JsonlEntry::User(user);
    };

    if let Some(rewritten) = rewrite_command(text) {
        user.message = MessageBody {
            id: user.message.id.clone(),
            content: vec![EntryBlock::Text { text: rewritten }],
        };
        return JsonlEntry::User(user);
    }

    if let Some(stdout) = exact_stdout(text) {
        user.message = MessageBody {
            id: user.message.id.clone(),
            content: vec![EntryBlock::Text { text: stdout }],
        };
        return JsonlEntry::Assistant(user);
    }

    JsonlEntry::User(user)
}

fn sole_text(message: &MessageBody) -> Option<&str> {
    match message.content.as_slice() {
        [EntryBlock::Text { text }] => Some(text.as_str()),
        _ => None,
    }
}

/// Strip one `<tag>...</tag>` occurrence from the front of `rest`,
/// returning its inner content and the remainder. `rest` must already
/// start with the opening tag.
fn try_tag<'a>(rest: &'a str, tag: &str) -> Option<(String, &'a str)> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let after_open = rest.strip_prefix(&open)?;
    let close_idx = after_open.find(&close)?;
    let content = after_open[..close_idx].to_string();
    Some((content, &after_open[close_idx + close.len()..]))
}

/// Parse the exact `<command-name>` (+ optional `<command-message>`,
/// `<command-args>` in any order) composite, consuming the whole
/// trimmed string. Returns `None` if anything is left over — that's the
/// "any surrounding extra text disqualifies the transform" rule.
fn parse_exact_command(text: &str) -> Option<(String, Option<String>)> {
    let mut rest = text.trim();
    let mut name: Option<String> = None;
    let mut args: Option<String> = None;
    let mut message_seen = false;

    while !rest.is_empty() {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some((content, remainder)) = try_tag(rest, "command-name") {
            if name.is_some() {
                return None;
            }
            name = Some(content);
            rest = remainder;
        } else if let Some((content, remainder)) = try_tag(rest, "command-args") {
            if args.is_some() {
                return None;
            }
            args = Some(content);
            rest = remainder;
        } else if let Some((_, remainder)) = try_tag(rest, "command-message") {
            if message_seen {
                return None;
            }
            message_seen = true;
            rest = remainder;
        } else {
            return None;
        }
    }

    name.map(|n| (n, args))
}

/// `NAME` inside `<command-name>` already carries its own leading slash
/// (the container writes `<command-name>/context</command-name>`, not
/// `<command-name>context</command-name>`) — the transform echoes it
/// verbatim, it never prepends one.
fn rewrite_command(text: &str) -> Option<String> {
    let (name, args) = parse_exact_command(text)?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    match args.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        Some(args) => Some(format!("{name} {args}")),
        None => Some(name.to_string()),
    }
}

fn exact_stdout(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let open = "<local-command-stdout>";
    let close = "</local-command-stdout>";
    let inner = trimmed.strip_prefix(open)?.strip_suffix(close)?;
    Some(inner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonl::MessageEntry;
    use chrono::Utc;

    fn user_entry(text: &str) -> JsonlEntry {
        JsonlEntry::User(MessageEntry {
            uuid: "u1".into(),
            timestamp: Utc::now(),
            parent_uuid: None,
            parent_tool_use_id: None,
            message: MessageBody {
                id: "m1".into(),
                content: vec![EntryBlock::Text { text: text.to_string() }],
            },
            tool_use_result: None,
            is_compact_summary: false,
        })
    }

    fn text_of(entry: &JsonlEntry) -> &str {
        match entry {
            JsonlEntry::User(m) | JsonlEntry::Assistant(m) => match m.message.content.as_slice() {
                [EntryBlock::Text { text }] => text.as_str(),
                _ => panic!("expected sole text block"),
            },
            other => panic!("expected a message entry, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_passes_through_unchanged() {
        let entry = user_entry("hello world");
        let out = transform_slash_command_entry(entry.clone());
        assert_eq!(out, entry);
    }

    #[test]
    fn command_name_only_echoes_the_leading_slash_verbatim() {
        let out = transform_slash_command_entry(user_entry("<command-name>/context</command-name>"));
        assert!(matches!(out, JsonlEntry::User(_)));
        assert_eq!(text_of(&out), "/context");
    }

    #[test]
    fn command_with_args() {
        let out = transform_slash_command_entry(user_entry(
            "<command-name>/review</command-name><command-args>src/main.rs</command-args>",
        ));
        assert_eq!(text_of(&out), "/review src/main.rs");
    }

    #[test]
    fn command_args_may_precede_command_name() {
        let out = transform_slash_command_entry(user_entry(
            "<command-args>src/main.rs</command-args><command-name>/review</command-name>",
        ));
        assert_eq!(text_of(&out), "/review src/main.rs");
    }

    #[test]
    fn command_message_sibling_is_consumed_but_ignored_in_output() {
        let out = transform_slash_command_entry(user_entry(
            "<command-name>/compact</command-name><command-message>Compacting…</command-message>",
        ));
        assert_eq!(text_of(&out), "/compact");
    }

    #[test]
    fn local_command_stdout_flips_role_to_assistant() {
        let out = transform_slash_command_entry(user_entry(
            "<local-command-stdout>/home/user</local-command-stdout>",
        ));
        assert!(matches!(out, JsonlEntry::Assistant(_)));
        assert_eq!(text_of(&out), "/home/user");
    }

    #[test]
    fn empty_stdout_still_flips_role() {
        let out = transform_slash_command_entry(user_entry("<local-command-stdout></local-command-stdout>"));
        assert!(matches!(out, JsonlEntry::Assistant(_)));
        assert_eq!(text_of(&out), "");
    }

    #[test]
    fn surrounding_extra_text_disqualifies_the_transform() {
        let entry = user_entry("please run <command-name>/context</command-name> now");
        let out = transform_slash_command_entry(entry.clone());
        assert_eq!(out, entry);
    }

    #[test]
    fn assistant_entries_are_left_alone() {
        let entry = JsonlEntry::Assistant(MessageEntry {
            uuid: "a1".into(),
            timestamp: Utc::now(),
            parent_uuid: None,
            parent_tool_use_id: None,
            message: MessageBody {
                id: "m1".into(),
                content: vec![EntryBlock::Text {
                    text: "<command-name>/context</command-name>".into(),
                }],
            },
            tool_use_result: None,
            is_compact_summary: false,
        });
        let out = transform_slash_command_entry(entry.clone());
        assert_eq!(out, entry);
    }
}

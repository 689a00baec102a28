//! Sidechain routing: discriminate a sub-agent's interleaved stream
//! frames from the main transcript by `parent_tool_use_id`.
//!
//! The container multiplexes a `Task` tool's sub-agent turn onto the
//! same session stream as the parent. Any frame whose content carries a
//! `parent_tool_use_id` belongs to that sub-agent's sidechain, not the
//! main conversation, and is routed to `subagent_*` events instead of
//! the top-level ones.

use std::collections::HashMap;

/// Per-`parent_tool_use_id` accumulator for one in-flight sub-agent run.
#[derive(Debug, Clone, Default)]
pub struct SidechainState {
    pub text: String,
    pub tool_ids_seen: Vec<String>,
    pub completed: bool,
}

/// Tracks every sidechain active within a session's stream, keyed by the
/// `parent_tool_use_id` that introduced it.
#[derive(Debug, Default)]
pub struct SidechainRouter {
    chains: HashMap<String, SidechainState>,
}

impl SidechainRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// First frame for a `parent_tool_use_id` opens its sidechain.
    pub fn open(&mut self, parent_tool_use_id: &str) -> &mut SidechainState {
        self.chains
            .entry(parent_tool_use_id.to_string())
            .or_default()
    }

    pub fn get(&self, parent_tool_use_id: &str) -> Option<&SidechainState> {
        self.chains.get(parent_tool_use_id)
    }

    pub fn append_text(&mut self, parent_tool_use_id: &str, delta: &str) {
        self.open(parent_tool_use_id).text.push_str(delta);
    }

    pub fn note_tool_use(&mut self, parent_tool_use_id: &str, tool_id: &str) {
        self.open(parent_tool_use_id)
            .tool_ids_seen
            .push(tool_id.to_string());
    }

    /// Mark a sidechain complete and remove it from active tracking,
    /// returning its final accumulated state for the `subagent_completed`
    /// event payload.
    pub fn complete(&mut self, parent_tool_use_id: &str) -> Option<SidechainState> {
        self.chains.remove(parent_tool_use_id)
    }

    pub fn is_sidechain_frame(parent_tool_use_id: Option<&str>) -> bool {
        parent_tool_use_id.is_some()
    }

    pub fn active_count(&self) -> usize {
        self.chains.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_twice_reuses_same_chain() {
        let mut router = SidechainRouter::new();
        router.append_text("tool1", "hello ");
        router.append_text("tool1", "world");
        assert_eq!(router.get("tool1").unwrap().text, "hello world");
    }

    #[test]
    fn distinct_parents_are_isolated() {
        let mut router = SidechainRouter::new();
        router.append_text("tool1", "a");
        router.append_text("tool2", "b");
        assert_eq!(router.get("tool1").unwrap().text, "a");
        assert_eq!(router.get("tool2").unwrap().text, "b");
    }

    #[test]
    fn complete_removes_chain_and_returns_state() {
        let mut router = SidechainRouter::new();
        router.append_text("tool1", "final text");
        let final_state = router.complete("tool1").unwrap();
        assert_eq!(final_state.text, "final text");
        assert!(router.get("tool1").is_none());
    }

    #[test]
    fn is_sidechain_frame_discriminates_on_presence() {
        assert!(SidechainRouter::is_sidechain_frame(Some("tool1")));
        assert!(!SidechainRouter::is_sidechain_frame(None));
    }

    #[test]
    fn note_tool_use_tracks_ids_per_chain() {
        let mut router = SidechainRouter::new();
        router.note_tool_use("tool1", "sub-tool-a");
        router.note_tool_use("tool1", "sub-tool-b");
        assert_eq!(router.get("tool1").unwrap().tool_ids_seen.len(), 2);
    }
}

//! Session management: the Session Stream Processor and everything it
//! needs — per-session concurrency control, sidechain routing, the
//! JSONL transcript format and its merge transform, and session
//! metadata bookkeeping.

pub mod cancel;
pub mod jsonl;
pub mod lock;
pub mod merge;
pub mod processor;
pub mod sidechain;
pub mod slash_command;
pub mod store;
pub mod streaming_state;

pub use cancel::{CancelMap, CancelToken};
pub use jsonl::{JsonlEntry, TranscriptStore};
pub use lock::SessionLockMap;
pub use merge::merge_transcript;
pub use processor::SessionProcessor;
pub use sidechain::SidechainRouter;
pub use slash_command::transform_slash_command_entry;
pub use store::{SessionMeta, SessionStatus, SessionStore};
pub use streaming_state::StreamingState;

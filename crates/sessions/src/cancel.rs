//! Per-session idempotent interrupt tokens.
//!
//! No group/cascade concept here — the spec's `interruptSession` only
//! ever targets the one session it names, unlike the teacher's
//! parent-cancels-children sub-agent cascade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        CancelMap {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, session_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(session_id.to_string(), token.clone());
        token
    }

    /// Idempotent: interrupting a session with no running turn, or
    /// interrupting twice, both succeed as a no-op.
    pub fn interrupt(&self, session_id: &str) {
        if let Some(token) = self.tokens.lock().get(session_id) {
            token.cancel();
        }
    }

    pub fn remove(&self, session_id: &str) {
        self.tokens.lock().remove(session_id);
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.tokens.lock().contains_key(session_id)
    }
}

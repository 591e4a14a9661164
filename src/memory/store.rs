use crate::memory::types::{ConversationTurn, SessionHistory};
use std::collections::HashMap;

/// Trait for per-session conversation storage.
pub trait HistoryStore {
    /// Returns the session's history, registering an empty one if unseen.
    fn get_or_create(&mut self, session_id: &str) -> &SessionHistory;
    /// Appends to the end of the session's history.
    fn append(&mut self, session_id: &str, turn: ConversationTurn);
    fn history(&self, session_id: &str) -> Option<&SessionHistory>;
    fn session_count(&self) -> usize;
}

/// In-memory implementation, lives as long as its owner.
///
/// Not synchronized: the orchestrator owning it is the only writer. A
/// deployment serving several sessions at once has to serialize access per
/// session id before sharing it.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    sessions: HashMap<String, SessionHistory>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for ConversationMemory {
    fn get_or_create(&mut self, session_id: &str) -> &SessionHistory {
        self.sessions.entry(session_id.to_string()).or_default()
    }

    fn append(&mut self, session_id: &str, turn: ConversationTurn) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(turn);
    }

    fn history(&self, session_id: &str) -> Option<&SessionHistory> {
        self.sessions.get(session_id)
    }

    fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

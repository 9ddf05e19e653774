//! In-memory log of resolved recognition attempts for the current run.

use std::time::SystemTime;

use serde::Serialize;

use crate::recognition::{AttemptId, RecognitionOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEntry {
    pub timestamp: SystemTime,
    pub attempt: AttemptId,
    pub outcome: RecognitionOutcome,
    /// Whether the outcome started playback on its own.
    pub auto_played: bool,
}

/// One entry per resolved attempt, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionRecord {
    entries: Vec<SessionEntry>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, attempt: AttemptId, outcome: RecognitionOutcome, auto_played: bool) {
        self.entries.push(SessionEntry {
            timestamp: SystemTime::now(),
            attempt,
            outcome,
            auto_played,
        });
    }

    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&SessionEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty-printed JSON export of the whole record.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}

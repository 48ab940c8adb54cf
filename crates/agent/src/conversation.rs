use std::collections::{HashMap, VecDeque};

use bookbuddy_core::config::DEFAULT_SESSION_MAX_TURNS;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::llm::Turn;

/// One answered query, kept for the "recent conversations" view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub session_id: String,
    pub query: String,
    pub response: String,
    pub include_summary: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Answered queries across all sessions, in the order they completed.
#[derive(Clone, Debug, Default)]
pub struct ChatHistory {
    entries: Vec<HistoryEntry>,
}

impl ChatHistory {
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// The last `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-session prior turns, capped at `max_turns` each, plus the global history.
#[derive(Clone, Debug)]
pub struct SessionStore {
    turns: HashMap<String, VecDeque<Turn>>,
    history: ChatHistory,
    max_turns: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_MAX_TURNS)
    }
}

impl SessionStore {
    /// A zero cap is raised to one so the latest turn is always kept.
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: HashMap::new(),
            history: ChatHistory::default(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// The session's most recent turns, oldest first.
    pub fn turns(&self, session_id: &str) -> Vec<Turn> {
        self.turns
            .get(session_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        let turns = self.turns.entry(entry.session_id.clone()).or_default();
        turns.push_back(Turn { query: entry.query.clone(), reply: entry.response.clone() });
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
        self.history.push(entry);
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn session_count(&self) -> usize {
        self.turns.len()
    }
}

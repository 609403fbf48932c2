use std::sync::Arc;

use crate::collab::HistoryStore;

/// Append-only record of submitted input for the session.
///
/// Single-writer: only the input-resolution path pushes entries, so no
/// lock lives here. Pure continuation lines and bare terminators are
/// never pushed (the resolver drops their history text before they reach
/// this type).
pub struct HistoryLog {
    entries: Vec<String>,
    store: Arc<dyn HistoryStore>,
}

impl HistoryLog {
    /// Seed the log from the backing store.
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        let entries = store.load();
        Self { entries, store }
    }

    pub fn push(&mut self, entry: &str) {
        if entry.is_empty() {
            return;
        }
        self.entries.push(entry.to_string());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn persist(&self) -> anyhow::Result<()> {
        self.store.persist(&self.entries)
    }
}

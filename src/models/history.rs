use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use crate::labels::GestureId;

pub const ACTION_HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionHistoryEntry {
    pub label: GestureId,
    pub timestamp: DateTime<Utc>,
    pub confidence: f32,
    pub dispatch_latency_ms: f64,
    pub description: String,
}

/// Recently dispatched actions, newest last. Display only.
#[derive(Debug, Clone)]
pub struct ActionHistory {
    entries: VecDeque<ActionHistoryEntry>,
    capacity: usize,
}

impl ActionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: ActionHistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&ActionHistoryEntry> {
        self.entries.back()
    }

    /// The `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ActionHistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::new(ACTION_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: GestureId) -> ActionHistoryEntry {
        ActionHistoryEntry {
            label,
            timestamp: Utc::now(),
            confidence: 0.9,
            dispatch_latency_ms: 1.0,
            description: label.to_string(),
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut history = ActionHistory::new(3);
        for label in [
            GestureId::Play,
            GestureId::Pause,
            GestureId::Next,
            GestureId::Stop,
        ] {
            history.push(entry(label));
        }

        assert_eq!(history.len(), 3);
        let labels: Vec<_> = history.recent(10).iter().map(|e| e.label).collect();
        assert_eq!(labels, vec![GestureId::Pause, GestureId::Next, GestureId::Stop]);
        assert_eq!(history.latest().map(|e| e.label), Some(GestureId::Stop));

        let last_two: Vec<_> = history.recent(2).iter().map(|e| e.label).collect();
        assert_eq!(last_two, vec![GestureId::Next, GestureId::Stop]);
    }
}

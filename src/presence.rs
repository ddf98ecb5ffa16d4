//! PresenceRegistry (C7): live participants, color assignment, editing
//! focus, stale-entry reclamation. Board-level presence only — no
//! cursor/selection tracking.

use chrono::Utc;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::model::{TaskId, UserPresence};

/// Palette assigned least-recently-used-by-count across active participants.
const PALETTE: [&str; 6] = [
    "#e57373", "#64b5f6", "#81c784", "#ffd54f", "#ba68c8", "#4db6ac",
];

const PRESENCE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

struct Entry {
    presence: UserPresence,
    last_activity: Instant,
}

pub struct PresenceRegistry {
    entries: DashMap<String, Entry>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Registers a participant on connection, assigning the palette color
    /// currently used by the fewest active participants.
    pub fn connect(&self, user_id: String, display_name: String) -> UserPresence {
        let color = self.least_used_color();
        let presence = UserPresence {
            user_id: user_id.clone(),
            display_name,
            color,
            connected_at: Utc::now(),
            editing_task_id: None,
        };
        self.entries.insert(
            user_id,
            Entry {
                presence: presence.clone(),
                last_activity: Instant::now(),
            },
        );
        presence
    }

    fn least_used_color(&self) -> String {
        let mut counts = [0usize; PALETTE.len()];
        for entry in self.entries.iter() {
            if let Some(idx) = PALETTE.iter().position(|c| *c == entry.presence.color) {
                counts[idx] += 1;
            }
        }
        let (idx, _) = counts
            .iter()
            .enumerate()
            .min_by_key(|(_, count)| **count)
            .unwrap_or((0, &0));
        PALETTE[idx].to_string()
    }

    /// Refreshes TTL and editing focus on activity.
    pub fn update(&self, user_id: &str, editing_task_id: Option<TaskId>) -> Option<UserPresence> {
        let mut entry = self.entries.get_mut(user_id)?;
        entry.presence.editing_task_id = editing_task_id;
        entry.last_activity = Instant::now();
        Some(entry.presence.clone())
    }

    pub fn disconnect(&self, user_id: &str) {
        self.entries.remove(user_id);
    }

    /// Lists active participants, pruning any stale (TTL-expired) entries
    /// as a side effect.
    pub fn list_active(&self) -> Vec<UserPresence> {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.last_activity.elapsed() > PRESENCE_TTL)
            .map(|e| e.key().clone())
            .collect();
        for id in stale {
            self.entries.remove(&id);
        }
        self.entries.iter().map(|e| e.presence.clone()).collect()
    }
}

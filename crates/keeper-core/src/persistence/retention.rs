//! Retention caps.
//!
//! Logs are kept in one of two orders, and the order decides which end is
//! trimmed:
//!
//! - **Head-trim**: most-recent-first lists (command history, player
//!   actions, server events, schedule history) keep their first N entries.
//! - **Tail-trim**: append-ordered lists (performance samples) keep their
//!   last N entries.
//!
//! Each player's session list is head-trimmed independently.

use serde::{Deserialize, Serialize};

use super::types::Document;

/// Per-collection maximum sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionPolicy {
    pub command_history: usize,
    pub player_actions: usize,
    pub server_events: usize,
    pub schedule_history: usize,
    pub performance: usize,
    pub sessions_per_player: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            command_history: 500,
            player_actions: 1000,
            server_events: 500,
            schedule_history: 500,
            // One day of minute samples.
            performance: 1440,
            sessions_per_player: 50,
        }
    }
}

/// Keep the first `cap` entries. Returns how many were removed.
pub fn trim_head<T>(list: &mut Vec<T>, cap: usize) -> usize {
    let removed = list.len().saturating_sub(cap);
    list.truncate(cap);
    removed
}

/// Keep the last `cap` entries. Returns how many were removed.
pub fn trim_tail<T>(list: &mut Vec<T>, cap: usize) -> usize {
    let removed = list.len().saturating_sub(cap);
    list.drain(..removed);
    removed
}

/// Apply every cap to `doc`. Returns the total number of removed entries.
///
/// Running this twice is the same as running it once.
pub fn compact(doc: &mut Document, policy: &RetentionPolicy) -> usize {
    let mut removed = 0;

    removed += trim_head(&mut doc.command_history, policy.command_history);
    removed += trim_head(&mut doc.player_actions, policy.player_actions);
    removed += trim_head(&mut doc.server_events, policy.server_events);
    removed += trim_head(&mut doc.schedule_history, policy.schedule_history);
    removed += trim_tail(&mut doc.performance, policy.performance);

    for stats in doc.player_stats.values_mut() {
        removed += trim_head(&mut stats.sessions, policy.sessions_per_player);
    }

    removed
}

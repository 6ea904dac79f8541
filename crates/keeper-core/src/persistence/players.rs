//! Player records, playtime statistics and the player action log.
//!
//! Names are matched case-insensitively. Records keep the display name they
//! were last seen with; stats are keyed by the lowercase name.

use chrono::{DateTime, Utc};

use super::engine::Store;
use super::error::StoreError;
use super::retention::trim_head;
use super::types::{
    new_id, AccessTier, Document, PlayerAction, PlayerActionKind, PlayerRecord, PlayerSession,
    PlayerStats,
};

fn player_key(name: &str) -> String {
    name.to_lowercase()
}

fn find_player<'a>(doc: &'a mut Document, name: &str) -> Option<&'a mut PlayerRecord> {
    let key = player_key(name);
    doc.players.iter_mut().find(|p| player_key(&p.name) == key)
}

/// Find or create the record for `name`, refreshing its display name and
/// `last_seen`.
fn touch_player<'a>(doc: &'a mut Document, name: &str, at: DateTime<Utc>) -> &'a mut PlayerRecord {
    let key = player_key(name);
    let index = match doc.players.iter().position(|p| player_key(&p.name) == key) {
        Some(index) => index,
        None => {
            doc.players.push(PlayerRecord {
                id: new_id(),
                name: name.to_string(),
                access_tier: AccessTier::default(),
                note: None,
                first_seen: at,
                last_seen: at,
                created_at: at,
            });
            doc.players.len() - 1
        }
    };

    let player = &mut doc.players[index];
    player.name = name.to_string();
    if at > player.last_seen {
        player.last_seen = at;
    }
    player
}

fn push_action(
    doc: &mut Document,
    cap: usize,
    player: &str,
    action: PlayerActionKind,
    detail: Option<String>,
    at: DateTime<Utc>,
) -> PlayerAction {
    let entry = PlayerAction {
        id: new_id(),
        player: player.to_string(),
        action,
        detail,
        created_at: at,
    };
    doc.player_actions.insert(0, entry.clone());
    trim_head(&mut doc.player_actions, cap);
    entry
}

impl Store {
    /// Create the player if unknown, otherwise refresh its name and last-seen
    /// time.
    pub fn upsert_player(&self, name: &str) -> PlayerRecord {
        self.update(|doc| touch_player(doc, name, Utc::now()).clone())
    }

    pub fn get_player(&self, name: &str) -> Option<PlayerRecord> {
        let key = player_key(name);
        self.read(|doc| {
            doc.players
                .iter()
                .find(|p| player_key(&p.name) == key)
                .cloned()
        })
    }

    pub fn players(&self) -> Vec<PlayerRecord> {
        self.read(|doc| doc.players.clone())
    }

    /// Set a player's access tier, creating the player if needed. A change is
    /// logged as a `tierChanged` action.
    pub fn set_player_access_tier(&self, name: &str, tier: AccessTier) -> PlayerRecord {
        let cap = self.config().retention.player_actions;

        self.update(|doc| {
            let now = Utc::now();
            let player = touch_player(doc, name, now);
            let previous = player.access_tier;
            player.access_tier = tier;
            let record = player.clone();

            if previous != tier {
                let detail = format!("{previous:?} -> {tier:?}").to_lowercase();
                push_action(doc, cap, &record.name, PlayerActionKind::TierChanged, Some(detail), now);
            }
            record
        })
    }

    /// Replace the admin note on a known player. `None` clears it.
    pub fn set_player_note(
        &self,
        name: &str,
        note: Option<String>,
    ) -> Result<PlayerRecord, StoreError> {
        self.try_update(|doc| {
            let player = find_player(doc, name).ok_or_else(|| StoreError::not_found("Player", name))?;
            player.note = note;
            Ok(player.clone())
        })
    }

    /// Remove a player record and its stats. The action log is kept.
    pub fn delete_player(&self, name: &str) -> Result<(), StoreError> {
        let key = player_key(name);
        self.try_update(|doc| {
            let before = doc.players.len();
            doc.players.retain(|p| player_key(&p.name) != key);
            if doc.players.len() == before {
                return Err(StoreError::not_found("Player", name));
            }
            doc.player_stats.remove(&key);
            Ok(())
        })
    }

    pub fn record_player_connect(&self, name: &str) {
        self.record_player_connect_at(name, Utc::now());
    }

    /// Mark `name` online from `at`. Connecting again without a disconnect
    /// restarts the open session.
    pub fn record_player_connect_at(&self, name: &str, at: DateTime<Utc>) {
        let cap = self.config().retention.player_actions;

        self.update(|doc| {
            let display = touch_player(doc, name, at).name.clone();
            let stats = doc
                .player_stats
                .entry(player_key(name))
                .or_insert_with(|| PlayerStats::new(display.as_str()));
            stats.name = display.clone();
            stats.connected_at = Some(at);
            stats.last_seen = Some(at);

            push_action(doc, cap, &display, PlayerActionKind::Connect, None, at);
        });
    }

    pub fn record_player_disconnect(&self, name: &str) -> Option<PlayerSession> {
        self.record_player_disconnect_at(name, Utc::now())
    }

    /// Close the open session for `name`, adding its duration to the
    /// player's total. Returns `None` when the player was not online; the
    /// disconnect is still logged.
    pub fn record_player_disconnect_at(&self, name: &str, at: DateTime<Utc>) -> Option<PlayerSession> {
        let retention = self.config().retention.clone();

        self.update(|doc| {
            let display = touch_player(doc, name, at).name.clone();
            let stats = doc
                .player_stats
                .entry(player_key(name))
                .or_insert_with(|| PlayerStats::new(display.as_str()));
            stats.last_seen = Some(at);

            let session = stats.connected_at.take().map(|connected_at| {
                let duration_seconds = (at - connected_at).num_seconds().max(0) as u64;
                PlayerSession {
                    connected_at,
                    disconnected_at: at,
                    duration_seconds,
                }
            });

            if let Some(session) = &session {
                stats.total_playtime_seconds += session.duration_seconds;
                stats.session_count += 1;
                stats.sessions.insert(0, session.clone());
                trim_head(&mut stats.sessions, retention.sessions_per_player);
            } else {
                log::debug!("Disconnect for {} without an open session", display);
            }

            push_action(
                doc,
                retention.player_actions,
                &display,
                PlayerActionKind::Disconnect,
                None,
                at,
            );
            session
        })
    }

    pub fn player_stats(&self, name: &str) -> Option<PlayerStats> {
        let key = player_key(name);
        self.read(|doc| doc.player_stats.get(&key).cloned())
    }

    /// Append an arbitrary action (kick, ban, ...) to the log.
    pub fn record_player_action(
        &self,
        name: &str,
        action: PlayerActionKind,
        detail: Option<String>,
    ) -> PlayerAction {
        let cap = self.config().retention.player_actions;
        self.update(|doc| push_action(doc, cap, name, action, detail, Utc::now()))
    }

    /// Logged actions, most recent first, optionally for one player.
    pub fn player_actions(&self, player: Option<&str>, limit: Option<usize>) -> Vec<PlayerAction> {
        let key = player.map(player_key);
        self.read(|doc| {
            doc.player_actions
                .iter()
                .filter(|a| key.as_ref().map_or(true, |k| &player_key(&a.player) == k))
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::test_support::open_store;
    use crate::persistence::{Store, StoreConfig};
    use chrono::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn session_duration_accumulates() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        let start = Utc::now();

        store.record_player_connect_at("Alex", start);
        let session = store
            .record_player_disconnect_at("alex", start + Duration::seconds(10))
            .unwrap();

        assert_eq!(session.duration_seconds, 10);
        let stats = store.player_stats("ALEX").unwrap();
        assert_eq!(stats.total_playtime_seconds, 10);
        assert_eq!(stats.session_count, 1);
        assert!(stats.connected_at.is_none());
        assert_eq!(stats.sessions[0], session);
    }

    #[tokio::test]
    async fn disconnect_without_connect_has_no_session() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(store.record_player_disconnect("Steve").is_none());
        assert_eq!(store.player_stats("steve").unwrap().total_playtime_seconds, 0);
        assert_eq!(store.player_actions(Some("steve"), None).len(), 1);
    }

    #[tokio::test]
    async fn lookups_ignore_case_and_keep_latest_display_name() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        let first = store.upsert_player("notch");
        let second = store.upsert_player("Notch");

        assert_eq!(first.id, second.id);
        assert_eq!(store.players().len(), 1);
        assert_eq!(store.get_player("NOTCH").unwrap().name, "Notch");
    }

    #[tokio::test]
    async fn tier_change_is_logged_once() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        store.set_player_access_tier("Alex", AccessTier::Moderator);
        store.set_player_access_tier("alex", AccessTier::Moderator);

        let actions = store.player_actions(Some("Alex"), None);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, PlayerActionKind::TierChanged);
        assert_eq!(actions[0].detail.as_deref(), Some("guest -> moderator"));
    }

    #[tokio::test]
    async fn access_tier_survives_restart() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        store.set_player_access_tier("Alex", AccessTier::Admin);
        store.set_player_note("alex", Some("server owner's friend".to_string())).unwrap();
        store.shutdown().await;

        let config = StoreConfig {
            backup_interval_secs: 0,
            ..StoreConfig::default()
        };
        let reopened = Store::builder(dir.path().join("data"), dir.path().join("backups"))
            .config(config)
            .open()
            .await;

        let player = reopened.get_player("Alex").unwrap();
        assert_eq!(player.access_tier, AccessTier::Admin);
        assert_eq!(player.note.as_deref(), Some("server owner's friend"));
        reopened.shutdown().await;
    }

    #[tokio::test]
    async fn delete_removes_record_and_stats() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        store.record_player_connect("Alex");

        store.delete_player("ALEX").unwrap();

        assert!(store.get_player("alex").is_none());
        assert!(store.player_stats("alex").is_none());
        assert!(store.delete_player("alex").is_err());
        assert!(store.set_player_note("alex", None).is_err());
    }

    #[tokio::test]
    async fn actions_are_newest_first_and_filterable() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        store.record_player_action("Griefer", PlayerActionKind::Kick, None);
        store.record_player_action("Griefer", PlayerActionKind::Ban, Some("tnt".to_string()));
        store.record_player_action("Alex", PlayerActionKind::Kick, None);

        let all = store.player_actions(None, None);
        assert_eq!(all[0].player, "Alex");
        let griefer = store.player_actions(Some("griefer"), Some(1));
        assert_eq!(griefer.len(), 1);
        assert_eq!(griefer[0].action, PlayerActionKind::Ban);
    }
}

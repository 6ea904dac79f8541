//! Server lifecycle events, most recent first.

use chrono::Utc;

use super::engine::Store;
use super::retention::trim_head;
use super::types::{new_id, ServerEvent};

impl Store {
    pub fn record_server_event(
        &self,
        server_id: Option<&str>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> ServerEvent {
        let event = ServerEvent {
            id: new_id(),
            server_id: server_id.map(str::to_string),
            kind: kind.into(),
            message: message.into(),
            created_at: Utc::now(),
        };

        let cap = self.config().retention.server_events;
        self.update(|doc| {
            doc.server_events.insert(0, event.clone());
            trim_head(&mut doc.server_events, cap);
        });
        event
    }

    pub fn server_events(&self, limit: Option<usize>) -> Vec<ServerEvent> {
        self.read(|doc| {
            doc.server_events
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect()
        })
    }
}

//! Admin notes. Ids are sequential like scheduled tasks.

use chrono::Utc;

use super::engine::Store;
use super::error::StoreError;
use super::types::{next_seq_id, Note};

impl Store {
    pub fn add_note(&self, title: impl Into<String>, body: impl Into<String>) -> Note {
        let (title, body) = (title.into(), body.into());

        self.update(|doc| {
            let now = Utc::now();
            let note = Note {
                id: next_seq_id(doc.notes.iter().map(|n| n.id)),
                title,
                body,
                created_at: now,
                updated_at: now,
            };
            doc.notes.push(note.clone());
            note
        })
    }

    pub fn notes(&self) -> Vec<Note> {
        self.read(|doc| doc.notes.clone())
    }

    pub fn get_note(&self, id: u64) -> Option<Note> {
        self.read(|doc| doc.notes.iter().find(|n| n.id == id).cloned())
    }

    /// Replace the given fields and bump `updated_at`.
    pub fn update_note(
        &self,
        id: u64,
        title: Option<String>,
        body: Option<String>,
    ) -> Result<Note, StoreError> {
        self.try_update(|doc| {
            let note = doc
                .notes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| StoreError::not_found("Note", id))?;
            if let Some(title) = title {
                note.title = title;
            }
            if let Some(body) = body {
                note.body = body;
            }
            note.updated_at = Utc::now();
            Ok(note.clone())
        })
    }

    pub fn delete_note(&self, id: u64) -> Result<(), StoreError> {
        self.try_update(|doc| {
            let before = doc.notes.len();
            doc.notes.retain(|n| n.id != id);
            if doc.notes.len() == before {
                return Err(StoreError::not_found("Note", id));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::persistence::test_support::open_store;
    use tempfile::tempdir;

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        let note = store.add_note("Whitelist", "Ask before adding");

        let updated = store.update_note(note.id, None, Some("Vote first".to_string())).unwrap();

        assert_eq!(updated.title, "Whitelist");
        assert_eq!(updated.body, "Vote first");
        assert!(updated.updated_at >= note.updated_at);
        assert_eq!(store.get_note(note.id).unwrap(), updated);
    }

    #[tokio::test]
    async fn ids_continue_after_highest() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        let a = store.add_note("a", "");
        let b = store.add_note("b", "");
        store.delete_note(a.id).unwrap();
        let c = store.add_note("c", "");

        assert_eq!((a.id, b.id, c.id), (1, 2, 3));
        assert_eq!(store.notes().len(), 2);
        assert!(store.delete_note(a.id).is_err());
    }
}

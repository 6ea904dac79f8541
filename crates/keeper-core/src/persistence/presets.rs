//! Saved command presets.

use chrono::Utc;

use super::engine::Store;
use super::error::StoreError;
use super::types::{new_id, CommandPreset};

impl Store {
    pub fn add_preset(
        &self,
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> CommandPreset {
        let preset = CommandPreset {
            id: new_id(),
            name: name.into(),
            command: command.into(),
            args,
            created_at: Utc::now(),
        };
        self.update(|doc| doc.presets.push(preset.clone()));
        preset
    }

    pub fn presets(&self) -> Vec<CommandPreset> {
        self.read(|doc| doc.presets.clone())
    }

    pub fn get_preset(&self, id: &str) -> Option<CommandPreset> {
        self.read(|doc| doc.presets.iter().find(|p| p.id == id).cloned())
    }

    pub fn delete_preset(&self, id: &str) -> Result<(), StoreError> {
        self.try_update(|doc| {
            let before = doc.presets.len();
            doc.presets.retain(|p| p.id != id);
            if doc.presets.len() == before {
                return Err(StoreError::not_found("Preset", id));
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
    async fn presets_keep_insertion_order() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        let day = store.add_preset("Day", "time", vec!["set".to_string(), "day".to_string()]);
        store.add_preset("Clear", "weather", vec!["clear".to_string()]);

        let names: Vec<_> = store.presets().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Day", "Clear"]);
        assert_eq!(store.get_preset(&day.id).unwrap().args, vec!["set", "day"]);
    }

    #[tokio::test]
    async fn delete_unknown_preset_leaves_store_clean() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(store.delete_preset("nope").is_err());
        assert!(!store.is_dirty());
    }
}

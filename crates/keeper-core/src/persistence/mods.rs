//! Installed mod registry.

use chrono::Utc;

use super::engine::Store;
use super::error::StoreError;
use super::types::{new_id, ModEntry};

impl Store {
    pub fn add_mod(
        &self,
        name: impl Into<String>,
        version: Option<String>,
        source: Option<String>,
    ) -> ModEntry {
        let entry = ModEntry {
            id: new_id(),
            name: name.into(),
            version,
            source,
            enabled: true,
            created_at: Utc::now(),
        };
        self.update(|doc| doc.mods.push(entry.clone()));
        entry
    }

    pub fn mods(&self) -> Vec<ModEntry> {
        self.read(|doc| doc.mods.clone())
    }

    pub fn set_mod_enabled(&self, id: &str, enabled: bool) -> Result<ModEntry, StoreError> {
        self.try_update(|doc| {
            let entry = doc
                .mods
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| StoreError::not_found("Mod", id))?;
            entry.enabled = enabled;
            Ok(entry.clone())
        })
    }

    pub fn delete_mod(&self, id: &str) -> Result<(), StoreError> {
        self.try_update(|doc| {
            let before = doc.mods.len();
            doc.mods.retain(|m| m.id != id);
            if doc.mods.len() == before {
                return Err(StoreError::not_found("Mod", id));
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
    async fn mods_can_be_toggled_and_removed() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        let lithium = store.add_mod("Lithium", Some("0.12.1".to_string()), None);
        store.add_mod("Sodium", None, Some("modrinth".to_string()));
        assert!(lithium.enabled);

        let disabled = store.set_mod_enabled(&lithium.id, false).unwrap();
        assert!(!disabled.enabled);

        store.delete_mod(&lithium.id).unwrap();
        let names: Vec<_> = store.mods().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Sodium"]);
    }

    #[tokio::test]
    async fn unknown_mod_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        let err = store.set_mod_enabled("missing", true).unwrap_err();
        assert_eq!(err.to_string(), "Mod not found: missing");
        assert!(store.delete_mod("missing").is_err());
    }
}

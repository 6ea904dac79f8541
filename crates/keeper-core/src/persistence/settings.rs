//! Flat key/value settings.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::engine::Store;
use super::error::StoreError;
use super::types::Settings;

impl Store {
    pub fn get_setting(&self, key: &str) -> Option<Value> {
        self.read(|doc| doc.settings.get(key).cloned())
    }

    /// Read a setting as `T`. A value of the wrong shape reads as `None`.
    pub fn get_setting_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_setting(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                log::debug!("Setting {:?} has unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub fn set_setting(&self, key: &str, value: impl Serialize) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidInput("setting key is empty".to_string()));
        }
        let value = serde_json::to_value(value)?;
        self.update(|doc| {
            doc.settings.insert(key.to_string(), value);
        });
        Ok(())
    }

    /// Remove a setting, returning its previous value. Removing an absent key
    /// doesn't schedule a write.
    pub fn remove_setting(&self, key: &str) -> Option<Value> {
        if self.read(|doc| !doc.settings.contains_key(key)) {
            return None;
        }
        self.update(|doc| doc.settings.remove(key))
    }

    pub fn settings(&self) -> Settings {
        self.read(|doc| doc.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::test_support::open_store;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Window {
        width: u32,
        height: u32,
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        store.set_setting("window", Window { width: 800, height: 600 }).unwrap();

        assert_eq!(
            store.get_setting_as::<Window>("window"),
            Some(Window { width: 800, height: 600 })
        );
        assert_eq!(store.get_setting("window"), Some(json!({"width": 800, "height": 600})));
    }

    #[tokio::test]
    async fn wrong_shape_reads_as_none() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        store.set_setting("autoStart", "yes").unwrap();

        assert_eq!(store.get_setting_as::<bool>("autoStart"), None);
        assert_eq!(store.get_setting_as::<bool>("missing"), None);
    }

    #[tokio::test]
    async fn remove_absent_key_stays_clean() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        assert_eq!(store.remove_setting("theme"), None);
        assert!(!store.is_dirty());

        store.set_setting("theme", "dark").unwrap();
        assert_eq!(store.remove_setting("theme"), Some(json!("dark")));
        assert!(store.settings().is_empty());
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(matches!(
            store.set_setting("", 1),
            Err(StoreError::InvalidInput(_))
        ));
    }
}

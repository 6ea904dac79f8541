//! Server configurations.
//!
//! At most one server is active. The active server's connection details are
//! mirrored into the settings map so the rest of the tool can read them
//! without knowing about server records:
//!
//! | Setting          | Source field     |
//! |------------------|------------------|
//! | `activeServerId` | `id`             |
//! | `serverName`     | `name`           |
//! | `installPath`    | `install_path`   |
//! | `rconHost`       | `rcon_host`      |
//! | `rconPort`       | `rcon_port`      |
//! | `rconPassword`   | `rcon_password`  |
//! | `gamePort`       | `game_port`      |
//! | `minMemory`      | `min_memory`     |
//! | `maxMemory`      | `max_memory`     |
//! | `dataPath`       | `data_path`      |
//! | `configPath`     | `config_path`    |

use serde_json::{json, Value};

use super::engine::Store;
use super::error::StoreError;
use super::types::{Document, ServerConfig, Settings};

/// Settings keys owned by the active-server mirror.
pub const ACTIVE_SERVER_KEYS: &[&str] = &[
    "activeServerId",
    "serverName",
    "installPath",
    "rconHost",
    "rconPort",
    "rconPassword",
    "gamePort",
    "minMemory",
    "maxMemory",
    "dataPath",
    "configPath",
];

/// Rewrite the active-server keys in `settings` from `server`.
/// `None` removes them.
fn mirror_active_server(settings: &mut Settings, server: Option<&ServerConfig>) {
    for key in ACTIVE_SERVER_KEYS {
        settings.remove(*key);
    }
    let Some(server) = server else {
        return;
    };

    let optional = |value: &Option<String>| value.as_ref().map(|v| json!(v));
    let pairs: [(&str, Option<Value>); 11] = [
        ("activeServerId", Some(json!(server.id))),
        ("serverName", Some(json!(server.name))),
        ("installPath", Some(json!(server.install_path))),
        ("rconHost", Some(json!(server.rcon_host))),
        ("rconPort", Some(json!(server.rcon_port))),
        ("rconPassword", Some(json!(server.rcon_password))),
        ("gamePort", Some(json!(server.game_port))),
        ("minMemory", optional(&server.min_memory)),
        ("maxMemory", optional(&server.max_memory)),
        ("dataPath", optional(&server.data_path)),
        ("configPath", optional(&server.config_path)),
    ];
    for (key, value) in pairs {
        if let Some(value) = value {
            settings.insert(key.to_string(), value);
        }
    }
}

fn sync_active(doc: &mut Document) {
    let active = doc.servers.iter().find(|s| s.is_active).cloned();
    mirror_active_server(&mut doc.settings, active.as_ref());
}

/// Reconcile a loaded document: at most one server stays active and the
/// mirror matches it. A document with neither an active server nor a mirror
/// is left alone.
pub(crate) fn resync_active_server(doc: &mut Document) {
    let mut seen = false;
    for server in &mut doc.servers {
        if server.is_active && seen {
            log::warn!("Server {} was also marked active, deactivating", server.id);
            server.is_active = false;
        }
        seen |= server.is_active;
    }

    if seen || doc.settings.contains_key("activeServerId") {
        sync_active(doc);
    }
}

impl Store {
    /// Add a server. The first server, or one added with `is_active`, becomes
    /// the active server.
    pub fn add_server(&self, server: ServerConfig) -> ServerConfig {
        self.update(|doc| {
            let mut server = server;
            let activate = server.is_active || doc.servers.is_empty();
            if activate {
                for other in &mut doc.servers {
                    other.is_active = false;
                }
            }
            server.is_active = activate;
            doc.servers.push(server.clone());
            if activate {
                sync_active(doc);
            }
            server
        })
    }

    pub fn servers(&self) -> Vec<ServerConfig> {
        self.read(|doc| doc.servers.clone())
    }

    pub fn get_server(&self, id: &str) -> Option<ServerConfig> {
        self.read(|doc| doc.servers.iter().find(|s| s.id == id).cloned())
    }

    pub fn active_server(&self) -> Option<ServerConfig> {
        self.read(|doc| doc.servers.iter().find(|s| s.is_active).cloned())
    }

    /// Edit a server in place. Id and active flag are preserved; use
    /// [`set_active_server`](Self::set_active_server) to switch servers.
    pub fn update_server(
        &self,
        id: &str,
        edit: impl FnOnce(&mut ServerConfig),
    ) -> Result<ServerConfig, StoreError> {
        self.try_update(|doc| {
            let server = doc
                .servers
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| StoreError::not_found("Server", id))?;

            let is_active = server.is_active;
            edit(server);
            server.id = id.to_string();
            server.is_active = is_active;
            let updated = server.clone();

            if is_active {
                sync_active(doc);
            }
            Ok(updated)
        })
    }

    /// Make `id` the only active server and mirror it into settings.
    pub fn set_active_server(&self, id: &str) -> Result<ServerConfig, StoreError> {
        self.try_update(|doc| {
            if !doc.servers.iter().any(|s| s.id == id) {
                return Err(StoreError::not_found("Server", id));
            }
            for server in &mut doc.servers {
                server.is_active = server.id == id;
            }
            sync_active(doc);
            doc.servers
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("Server", id))
        })
    }

    /// Delete a server. Deleting the active one clears the mirrored settings.
    pub fn delete_server(&self, id: &str) -> Result<(), StoreError> {
        self.try_update(|doc| {
            let index = doc
                .servers
                .iter()
                .position(|s| s.id == id)
                .ok_or_else(|| StoreError::not_found("Server", id))?;

            let removed = doc.servers.remove(index);
            if removed.is_active {
                sync_active(doc);
            }
            Ok(())
        })
    }
}

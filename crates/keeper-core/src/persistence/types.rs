//! Persistence data types.
//!
//! # Data Model Overview
//!
//! Keeper persists a single JSON document:
//!
//! ```text
//! <data_dir>/keeper.json
//! {
//!   "version": 1,
//!   "commandHistory": [...],   # most recent first
//!   "scheduledTasks": [...],
//!   "scheduleHistory": [...],  # most recent first
//!   "servers": [...],
//!   "players": [...],
//!   "playerStats": { "<lowercase name>": {...} },
//!   "playerActions": [...],    # most recent first
//!   "serverEvents": [...],     # most recent first
//!   "mods": [...],
//!   "notes": [...],
//!   "presets": [...],
//!   "performance": [...],      # oldest first
//!   "settings": { ... }
//! }
//! ```
//!
//! # Design Principles
//!
//! - **One document**: Every collection is rewritten together on flush
//! - **Debounced writes**: Bursts of mutations cost one write
//! - **Tolerant loading**: Unknown or broken parts are repaired, not fatal
//! - **Atomic writes**: Write to temp file, then rename

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current document schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Settings are a flat, loosely typed mapping.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Generate an opaque random record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Next sequential identifier: highest existing id plus one.
pub fn next_seq_id(ids: impl Iterator<Item = u64>) -> u64 {
    ids.max().map_or(1, |max| max + 1)
}

// ============================================================================
// Document
// ============================================================================

/// The root persisted structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub version: u32,
    pub command_history: Vec<CommandHistoryEntry>,
    pub scheduled_tasks: Vec<ScheduledTask>,
    pub schedule_history: Vec<ScheduleRun>,
    pub servers: Vec<ServerConfig>,
    pub players: Vec<PlayerRecord>,
    pub player_stats: BTreeMap<String, PlayerStats>,
    pub player_actions: Vec<PlayerAction>,
    pub server_events: Vec<ServerEvent>,
    pub mods: Vec<ModEntry>,
    pub notes: Vec<Note>,
    pub presets: Vec<CommandPreset>,
    pub performance: Vec<PerformanceSample>,
    pub settings: Settings,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            command_history: Vec::new(),
            scheduled_tasks: Vec::new(),
            schedule_history: Vec::new(),
            servers: Vec::new(),
            players: Vec::new(),
            player_stats: BTreeMap::new(),
            player_actions: Vec::new(),
            server_events: Vec::new(),
            mods: Vec::new(),
            notes: Vec::new(),
            presets: Vec::new(),
            performance: Vec::new(),
            settings: Settings::new(),
        }
    }
}

impl Document {
    /// Record counts keyed by the collection's serialized name.
    pub fn collection_counts(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("commandHistory", self.command_history.len()),
            ("scheduledTasks", self.scheduled_tasks.len()),
            ("scheduleHistory", self.schedule_history.len()),
            ("servers", self.servers.len()),
            ("players", self.players.len()),
            ("playerStats", self.player_stats.len()),
            ("playerActions", self.player_actions.len()),
            ("serverEvents", self.server_events.len()),
            ("mods", self.mods.len()),
            ("notes", self.notes.len()),
            ("presets", self.presets.len()),
            ("performance", self.performance.len()),
            ("settings", self.settings.len()),
        ])
    }
}

// ============================================================================
// Command History
// ============================================================================

/// Outcome of one executed console command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandHistoryEntry {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub success: bool,
    /// Server response, if any was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Where the command came from ("console", "schedule", "preset", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Scheduled Tasks
// ============================================================================

/// A recurring command. Ids are sequential so users can refer to "task 3".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: u64,
    pub name: String,
    pub command: String,
    /// Cron-style expression, interpreted by the scheduler.
    pub schedule: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One execution of a scheduled task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRun {
    pub id: String,
    pub task_id: u64,
    pub task_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Servers
// ============================================================================

/// A managed game server installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub id: String,
    pub name: String,
    pub install_path: String,
    #[serde(default = "default_rcon_host")]
    pub rcon_host: String,
    #[serde(default = "default_rcon_port")]
    pub rcon_port: u16,
    #[serde(default)]
    pub rcon_password: String,
    #[serde(default = "default_game_port")]
    pub game_port: u16,
    /// JVM-style memory bound, e.g. "2G".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ServerConfig {
    /// A server with default connection settings.
    pub fn new(name: impl Into<String>, install_path: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            install_path: install_path.into(),
            rcon_host: default_rcon_host(),
            rcon_port: default_rcon_port(),
            rcon_password: String::new(),
            game_port: default_game_port(),
            min_memory: None,
            max_memory: None,
            data_path: None,
            config_path: None,
            is_active: false,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Players
// ============================================================================

/// Administrative access level of a player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessTier {
    #[default]
    Guest,
    Member,
    Moderator,
    Admin,
    Owner,
}

/// A known player and the admin's notes about them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: String,
    /// Display name as last seen; lookups ignore case.
    pub name: String,
    #[serde(default)]
    pub access_tier: AccessTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated playtime for one player, keyed by lowercase name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub name: String,
    #[serde(default)]
    pub total_playtime_seconds: u64,
    #[serde(default)]
    pub session_count: u64,
    /// Set while the player is online.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Most recent session first.
    #[serde(default)]
    pub sessions: Vec<PlayerSession>,
}

impl PlayerStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total_playtime_seconds: 0,
            session_count: 0,
            connected_at: None,
            last_seen: None,
            sessions: Vec::new(),
        }
    }
}

/// One completed connect/disconnect pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSession {
    pub connected_at: DateTime<Utc>,
    pub disconnected_at: DateTime<Utc>,
    pub duration_seconds: u64,
}

/// Kind of logged player action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerActionKind {
    Connect,
    Disconnect,
    Kick,
    Ban,
    Unban,
    TierChanged,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAction {
    pub id: String,
    pub player: String,
    pub action: PlayerActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Server Events
// ============================================================================

/// A server lifecycle event (start, stop, crash, update, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Mods, Notes, Presets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Download page or file origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Free-form admin note. Ids are sequential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A saved command the admin can replay with one click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPreset {
    pub id: String,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Performance
// ============================================================================

/// Periodic resource sample; stored oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    pub id: String,
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_mb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tps: Option<f64>,
    #[serde(default)]
    pub player_count: u32,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

fn default_rcon_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rcon_port() -> u16 {
    25575
}

fn default_game_port() -> u16 {
    25565
}

// ============================================================================
// TESTS
// ============================================================================

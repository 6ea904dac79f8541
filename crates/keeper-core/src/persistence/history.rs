//! Command history.
//!
//! Stored most recent first and head-trimmed to the retention cap.

use chrono::Utc;

use super::engine::Store;
use super::retention::trim_head;
use super::types::{new_id, CommandHistoryEntry};

/// A command execution outcome about to be recorded.
#[derive(Debug, Clone, Default)]
pub struct NewCommand {
    pub command: String,
    pub args: Vec<String>,
    pub success: bool,
    pub response: Option<String>,
    pub source: Option<String>,
}

impl NewCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: true,
            ..Self::default()
        }
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn succeeded(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Store {
    /// Record an executed command at the front of the history.
    pub fn add_command_history(&self, cmd: NewCommand) -> CommandHistoryEntry {
        let entry = CommandHistoryEntry {
            id: new_id(),
            command: cmd.command,
            args: cmd.args,
            success: cmd.success,
            response: cmd.response,
            source: cmd.source,
            created_at: Utc::now(),
        };

        let cap = self.config().retention.command_history;
        self.update(|doc| {
            doc.command_history.insert(0, entry.clone());
            trim_head(&mut doc.command_history, cap);
        });
        entry
    }

    /// Most recent commands first, up to `limit` if given.
    pub fn command_history(&self, limit: Option<usize>) -> Vec<CommandHistoryEntry> {
        self.read(|doc| {
            let limit = limit.unwrap_or(doc.command_history.len());
            doc.command_history.iter().take(limit).cloned().collect()
        })
    }

    /// Remove all history. Returns how many entries were removed.
    pub fn clear_command_history(&self) -> usize {
        self.update(|doc| {
            let removed = doc.command_history.len();
            doc.command_history.clear();
            removed
        })
    }
}

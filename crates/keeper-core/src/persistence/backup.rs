//! Rolling backups of the primary store file.
//!
//! # File Naming
//!
//! ```text
//! <backup_dir>/<prefix>-<YYYYMMDDTHHMMSSffffffZ>[-<label>].json
//! ```
//!
//! Timestamps are UTC with microseconds and strictly increase within a
//! process, so sorting names descending lists backups newest first.
//!
//! # Failure Policy
//!
//! Backups are best-effort. Creating or pruning a backup never fails the
//! operation that asked for it; problems are logged and `None` is returned.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, PoisonError};

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;

/// Why a backup was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupLabel {
    Startup,
    Manual,
    Auto,
    Shutdown,
}

impl BackupLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            BackupLabel::Startup => "startup",
            BackupLabel::Manual => "manual",
            BackupLabel::Auto => "auto",
            BackupLabel::Shutdown => "shutdown",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "startup" => Some(BackupLabel::Startup),
            "manual" => Some(BackupLabel::Manual),
            "auto" => Some(BackupLabel::Auto),
            "shutdown" => Some(BackupLabel::Shutdown),
            _ => None,
        }
    }
}

impl fmt::Display for BackupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backup file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub label: Option<BackupLabel>,
}

static BACKUP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)-(\d{8}T\d{12}Z)(?:-(startup|manual|auto|shutdown))?\.json$").unwrap()
});

/// Creates, lists and prunes snapshots of one primary file.
#[derive(Debug)]
pub struct BackupManager {
    primary: PathBuf,
    dir: PathBuf,
    prefix: String,
    keep: usize,
    /// Last timestamp handed out, in microseconds since the epoch.
    last_stamp: Mutex<i64>,
}

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6fZ";

impl BackupManager {
    pub fn new(primary: PathBuf, dir: PathBuf, prefix: &str, keep: usize) -> Self {
        Self {
            primary,
            dir,
            prefix: prefix.to_string(),
            keep,
            last_stamp: Mutex::new(i64::MIN),
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_dir(&self) -> &Path {
        &self.dir
    }

    /// Copy the primary file into the backup directory, then prune.
    ///
    /// Returns `None` if there is nothing to back up or the copy failed.
    pub fn create_backup(&self, label: Option<BackupLabel>) -> Option<PathBuf> {
        let path = self.snapshot(label)?;
        self.prune_logged();
        Some(path)
    }

    /// Copy the primary file into the backup directory without pruning.
    ///
    /// Used while older backups may still be needed for recovery; the caller
    /// prunes once they are not.
    pub fn snapshot(&self, label: Option<BackupLabel>) -> Option<PathBuf> {
        if !self.primary.exists() {
            log::debug!("No store file at {:?}, skipping backup", self.primary);
            return None;
        }

        match self.copy_primary(label) {
            Ok(path) => {
                log::info!("Created backup {:?}", path);
                Some(path)
            }
            Err(e) => {
                log::warn!("Failed to create backup of {:?}: {}", self.primary, e);
                None
            }
        }
    }

    /// Prune, logging instead of returning failures.
    pub fn prune_logged(&self) {
        if let Err(e) = self.prune_backups() {
            log::warn!("Failed to prune backups in {:?}: {}", self.dir, e);
        }
    }

    fn copy_primary(&self, label: Option<BackupLabel>) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let name = self.file_name_for(self.next_stamp(), label);
        let path = self.dir.join(&name);
        let temp_path = self.dir.join(format!("{name}.tmp"));

        // A half-copied snapshot must never match the backup name pattern.
        fs::copy(&self.primary, &temp_path)?;
        fs::rename(&temp_path, &path)?;

        Ok(path)
    }

    fn file_name_for(&self, stamp: DateTime<Utc>, label: Option<BackupLabel>) -> String {
        let stamp = stamp.format(STAMP_FORMAT);
        match label {
            Some(label) => format!("{}-{}-{}.json", self.prefix, stamp, label),
            None => format!("{}-{}.json", self.prefix, stamp),
        }
    }

    /// Current UTC time, bumped so that no two backups share a name.
    fn next_stamp(&self) -> DateTime<Utc> {
        let mut last = self.last_stamp.lock().unwrap_or_else(PoisonError::into_inner);
        let micros = Utc::now().timestamp_micros().max(last.saturating_add(1));
        *last = micros;

        let secs = micros.div_euclid(1_000_000);
        let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
        Utc.timestamp_opt(secs, nanos)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// All backups, newest first. A missing directory is an empty list.
    pub fn list_backups(&self) -> io::Result<Vec<BackupInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            let Some(caps) = BACKUP_NAME.captures(&file_name) else {
                continue;
            };
            if &caps[1] != self.prefix {
                continue;
            }
            let label = caps.get(3).and_then(|m| BackupLabel::parse(m.as_str()));

            backups.push(BackupInfo {
                path: entry.path(),
                file_name,
                label,
            });
        }

        backups.sort_by(|a, b| b.file_name.cmp(&a.file_name));
        Ok(backups)
    }

    /// Delete everything but the newest `keep` backups.
    ///
    /// Returns how many files were deleted.
    pub fn prune_backups(&self) -> io::Result<usize> {
        let backups = self.list_backups()?;
        let mut deleted = 0;

        for stale in backups.iter().skip(self.keep) {
            match fs::remove_file(&stale.path) {
                Ok(()) => deleted += 1,
                Err(e) => log::warn!("Failed to delete old backup {:?}: {}", stale.path, e),
            }
        }

        if deleted > 0 {
            log::debug!("Pruned {} old backup(s)", deleted);
        }
        Ok(deleted)
    }

    /// Path of the newest backup, if any.
    pub fn latest_backup(&self) -> Option<PathBuf> {
        match self.list_backups() {
            Ok(backups) => backups.into_iter().next().map(|b| b.path),
            Err(e) => {
                log::warn!("Failed to list backups in {:?}: {}", self.dir, e);
                None
            }
        }
    }

    pub fn backup_count(&self) -> usize {
        self.list_backups().map(|b| b.len()).unwrap_or(0)
    }

    /// Copy `backup` over the primary file (write-then-rename).
    pub fn restore_backup(&self, backup: &Path) -> io::Result<()> {
        if let Some(parent) = self.primary.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut temp_name = self.primary.as_os_str().to_owned();
        temp_name.push(".restore");
        let temp_path = PathBuf::from(temp_name);

        fs::copy(backup, &temp_path)?;
        fs::rename(&temp_path, &self.primary)?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

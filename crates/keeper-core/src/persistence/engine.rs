//! The store engine.
//!
//! # Lifecycle
//!
//! ```text
//! open ──► PreBackup ──► Load ──┬──────────────────────► Validate ──► Compact ──► Commit ──► ready
//!                               └─► Recover (latest) ──┬─► Validate
//!                                                      └─► Fresh ───► Validate
//! ready ──► shutdown: cancel timers ──► final flush ──► "shutdown" backup
//! ```
//!
//! # Writes
//!
//! Mutations only touch the in-memory [`Document`] and mark the store dirty.
//! The first mutation after a write arms a debounce timer; when it fires the
//! whole document is serialized and written with write-then-rename. Every
//! mutation inside the window shares that single write.
//!
//! Writes are serialized through an async mutex (the write chain): a flush
//! requested while another is in flight waits for it, then writes whatever
//! the document looks like at that point.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use super::backup::{BackupLabel, BackupManager};
use super::config::StoreConfig;
use super::error::{LoadError, StoreError};
use super::retention;
use super::schema::{self, RepairReport};
use super::servers;
use super::types::Document;
use crate::event_bus::{StatusBus, StatusKind};
use crate::paths::DataPaths;

/// Where the in-memory document came from at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// The primary file loaded cleanly.
    Primary,
    /// The primary file was unusable and this backup was restored.
    Backup(PathBuf),
    /// Nothing usable was found; the store started empty.
    Fresh,
}

/// What happened while opening the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    pub source: LoadSource,
    /// Snapshot taken before the primary file was read.
    pub pre_backup: Option<PathBuf>,
    pub repairs: RepairReport,
    /// Entries removed by the retention caps.
    pub compacted: usize,
}

/// Configures and opens a [`Store`].
pub struct StoreBuilder {
    data_dir: PathBuf,
    backup_dir: PathBuf,
    config: StoreConfig,
    status: Option<Arc<StatusBus>>,
    lifecycle_backups: bool,
}

impl StoreBuilder {
    pub fn new(data_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            backup_dir: backup_dir.into(),
            config: StoreConfig::default(),
            status: None,
            lifecycle_backups: true,
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish status messages on an existing bus.
    pub fn status_bus(mut self, bus: Arc<StatusBus>) -> Self {
        self.status = Some(bus);
        self
    }

    /// Take `startup` and `shutdown` snapshots (the default).
    ///
    /// Short maintenance runs turn this off so they don't push real backups
    /// out of the retention window. A startup snapshot is still taken when
    /// the primary file exists but fails to load.
    pub fn lifecycle_backups(mut self, enabled: bool) -> Self {
        self.lifecycle_backups = enabled;
        self
    }

    /// Run the startup protocol and return a ready store.
    ///
    /// Never fails: a missing or corrupt store file degrades to a restored
    /// backup or an empty document. Must be called inside a tokio runtime.
    pub async fn open(self) -> Store {
        let primary = self.data_dir.join(&self.config.file_name);
        let backups = Arc::new(BackupManager::new(
            primary.clone(),
            self.backup_dir,
            &self.config.backup_prefix,
            self.config.backup_keep,
        ));
        let status = self.status.unwrap_or_default();

        let (doc, report) = {
            let backups = Arc::clone(&backups);
            let retention = self.config.retention.clone();
            let snapshot_first = self.lifecycle_backups;
            let task = move || recover(&backups, &retention, snapshot_first);
            match tokio::task::spawn_blocking(task).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    log::error!("Store startup task failed, starting empty: {}", e);
                    (Document::default(), fresh_report())
                }
            }
        };

        announce(&status, &report);

        let store = Store {
            inner: Arc::new(Inner {
                config: self.config,
                primary,
                backups,
                doc: Mutex::new(doc),
                dirty: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                write_chain: tokio::sync::Mutex::new(()),
                debounce_timer: Mutex::new(None),
                timer_generation: AtomicU64::new(0),
                backup_timer: Mutex::new(None),
                lifecycle_backups: self.lifecycle_backups,
                runtime: Handle::current(),
                status,
                writes: AtomicU64::new(0),
                startup: report,
            }),
        };

        // Commit the repaired document right away so disk matches memory
        // even if we crash before the first mutation.
        store.inner.dirty.store(true, Ordering::SeqCst);
        store.inner.initialized.store(true, Ordering::SeqCst);
        if let Err(e) = store.flush_writes().await {
            log::warn!("Initial store commit failed, will retry: {}", e);
        }

        store.arm_backup_schedule();
        store
    }
}

/// Handle to the single in-memory document and its persistence.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    config: StoreConfig,
    primary: PathBuf,
    backups: Arc<BackupManager>,
    doc: Mutex<Document>,
    /// In-memory document has changes not yet on disk.
    dirty: AtomicBool,
    initialized: AtomicBool,
    /// Set once by `shutdown`.
    closed: AtomicBool,
    /// Held for the duration of every durable write.
    write_chain: tokio::sync::Mutex<()>,
    /// Armed debounce timer, tagged with its generation.
    debounce_timer: Mutex<Option<(u64, JoinHandle<()>)>>,
    timer_generation: AtomicU64,
    backup_timer: Mutex<Option<JoinHandle<()>>>,
    lifecycle_backups: bool,
    runtime: Handle,
    status: Arc<StatusBus>,
    writes: AtomicU64,
    startup: StartupReport,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Empty the timer slot if it still holds `generation`.
///
/// A stale timer that woke just as it was cancelled must not take the slot
/// of the timer that replaced it.
fn claim_timer(slot: &mut Option<(u64, JoinHandle<()>)>, generation: u64) -> bool {
    let current = matches!(slot, Some((armed, _)) if *armed == generation);
    if current {
        *slot = None;
    }
    current
}

impl Store {
    pub fn builder(data_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> StoreBuilder {
        StoreBuilder::new(data_dir, backup_dir)
    }

    /// Open the store in the standard data and backup directories.
    pub async fn open(paths: &DataPaths, config: StoreConfig) -> Store {
        StoreBuilder::new(&paths.data_dir, &paths.backup_dir)
            .config(config)
            .open()
            .await
    }

    // ------------------------------------------------------------------------
    // Document access
    // ------------------------------------------------------------------------

    /// A copy of the current in-memory document. Never touches disk.
    pub fn get(&self) -> Document {
        lock(&self.inner.doc).clone()
    }

    /// Run `f` against the current document without copying it.
    ///
    /// `f` must not call back into the store.
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&*lock(&self.inner.doc))
    }

    /// Mutate the document, then schedule a debounced write.
    ///
    /// `f` must not call back into the store.
    pub fn update<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let result = f(&mut *lock(&self.inner.doc));
        self.schedule_write();
        result
    }

    /// Like [`update`](Self::update), but only schedules a write when `f`
    /// succeeds. `f` must leave the document untouched when it fails.
    pub fn try_update<R>(
        &self,
        f: impl FnOnce(&mut Document) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let result = f(&mut *lock(&self.inner.doc))?;
        self.schedule_write();
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Write coalescing
    // ------------------------------------------------------------------------

    /// Mark the document dirty and arm the debounce timer if it isn't armed.
    pub fn schedule_write(&self) {
        if !self.inner.initialized.load(Ordering::SeqCst) {
            return;
        }
        self.inner.dirty.store(true, Ordering::SeqCst);

        if self.inner.closed.load(Ordering::SeqCst) {
            log::debug!("Store is shut down; change kept in memory until an explicit flush");
            return;
        }
        self.arm_debounce_timer();
    }

    fn arm_debounce_timer(&self) {
        let mut slot = lock(&self.inner.debounce_timer);
        if slot.is_some() {
            return;
        }

        let generation = self.inner.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let store = self.clone();
        let delay = self.inner.config.debounce();
        let handle = self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            // Disarm before flushing so mutations made during the write arm
            // a fresh timer. Once claimed, nothing else can abort this task.
            if !claim_timer(&mut lock(&store.inner.debounce_timer), generation) {
                return;
            }
            // Failures are logged and re-armed inside flush_writes.
            let _ = store.flush_writes().await;
        });
        *slot = Some((generation, handle));
    }

    /// Write the document if it is dirty.
    ///
    /// Returns `Ok(true)` if a write happened, `Ok(false)` if there was
    /// nothing to do. On failure the store stays dirty and a retry is
    /// scheduled.
    pub async fn flush_writes(&self) -> Result<bool, StoreError> {
        if !self.inner.initialized.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let result = {
            // Waits for any in-flight write.
            let _chain = self.inner.write_chain.lock().await;

            // Cleared before serializing: a mutation landing during the write
            // sets it again and gets its own flush.
            if !self.inner.dirty.swap(false, Ordering::SeqCst) {
                return Ok(false);
            }

            let result = self.write_current().await;
            match &result {
                Ok(()) => {
                    let n = self.inner.writes.fetch_add(1, Ordering::SeqCst) + 1;
                    log::debug!("Wrote store file {:?} (write #{})", self.inner.primary, n);
                    self.inner
                        .status
                        .emit(StatusKind::Flushed, format!("store written ({n})"));
                }
                Err(e) => {
                    self.inner.dirty.store(true, Ordering::SeqCst);
                    log::warn!("Failed to write store file {:?}: {}", self.inner.primary, e);
                    self.inner
                        .status
                        .emit(StatusKind::FlushFailed, e.to_string());
                }
            }
            result
        };

        if self.inner.dirty.load(Ordering::SeqCst) && !self.inner.closed.load(Ordering::SeqCst) {
            self.arm_debounce_timer();
        }

        result.map(|()| true)
    }

    /// Skip the debounce window and write now.
    pub async fn force_flush(&self) -> Result<bool, StoreError> {
        if let Some((_, timer)) = lock(&self.inner.debounce_timer).take() {
            timer.abort();
        }
        self.flush_writes().await
    }

    async fn write_current(&self) -> Result<(), StoreError> {
        let json = {
            let doc = lock(&self.inner.doc);
            serde_json::to_string_pretty(&*doc)?
        };
        write_atomic(&self.inner.primary, json.as_bytes()).await
    }

    // ------------------------------------------------------------------------
    // Backups
    // ------------------------------------------------------------------------

    /// Snapshot the primary file as it is on disk. Best-effort.
    pub async fn create_backup(&self, label: BackupLabel) -> Option<PathBuf> {
        let backups = Arc::clone(&self.inner.backups);
        let created =
            match tokio::task::spawn_blocking(move || backups.create_backup(Some(label))).await {
                Ok(created) => created,
                Err(e) => {
                    log::warn!("Backup task failed: {}", e);
                    None
                }
            };

        match &created {
            Some(path) => self
                .inner
                .status
                .emit(StatusKind::BackupCreated, path.display().to_string()),
            None => self
                .inner
                .status
                .emit(StatusKind::BackupFailed, format!("no {label} backup created")),
        };
        created
    }

    pub fn backups(&self) -> &BackupManager {
        &self.inner.backups
    }

    fn arm_backup_schedule(&self) {
        let Some(period) = self.inner.config.backup_interval() else {
            return;
        };

        // Weak, so the schedule alone never keeps the store alive.
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = self.inner.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Store { inner }.create_backup(BackupLabel::Auto).await;
            }
        });
        *lock(&self.inner.backup_timer) = Some(handle);
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Cancel timers, write pending changes and take a final backup.
    ///
    /// Runs at most once; later calls return immediately. A write already in
    /// progress is allowed to finish.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            log::debug!("Store already shut down");
            return;
        }
        log::info!("Shutting down store");

        if let Some(timer) = lock(&self.inner.backup_timer).take() {
            timer.abort();
        }
        if let Err(e) = self.force_flush().await {
            log::warn!("Final store flush failed: {}", e);
        }
        if self.inner.lifecycle_backups {
            self.create_backup(BackupLabel::Shutdown).await;
        }

        self.inner.status.emit(StatusKind::Shutdown, "store closed");
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of completed durable writes, including the startup commit.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub fn startup_report(&self) -> &StartupReport {
        &self.inner.startup
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn primary_path(&self) -> &Path {
        &self.inner.primary
    }

    pub fn status_bus(&self) -> Arc<StatusBus> {
        Arc::clone(&self.inner.status)
    }

    pub(crate) fn emit(&self, kind: StatusKind, message: impl Into<String>) {
        self.inner.status.emit(kind, message);
    }
}

// ============================================================================
// Startup protocol
// ============================================================================

/// Load, recover, validate and compact the primary file.
///
/// Blocking; runs on the blocking pool during `open`.
pub(crate) fn recover(
    backups: &BackupManager,
    retention: &retention::RetentionPolicy,
    snapshot_first: bool,
) -> (Document, StartupReport) {
    let primary = backups.primary_path();
    // Not pruned yet: the oldest kept backup may be the recovery source.
    let mut pre_backup = if snapshot_first {
        backups.snapshot(Some(BackupLabel::Startup))
    } else {
        None
    };

    let (raw, source) = match load_value(primary) {
        Ok(raw) => (Some(raw), LoadSource::Primary),
        Err(LoadError::Missing(_)) if backups.backup_count() == 0 => {
            log::info!("No store file at {:?}, starting fresh", primary);
            (None, LoadSource::Fresh)
        }
        Err(e) => {
            log::warn!("Failed to load store file {:?}: {}", primary, e);
            if pre_backup.is_none() && !matches!(e, LoadError::Missing(_)) {
                pre_backup = backups.snapshot(Some(BackupLabel::Startup));
            }
            restore_latest(backups, pre_backup.as_deref())
        }
    };
    backups.prune_logged();

    let (mut doc, repairs) = match raw {
        Some(raw) => schema::validate(raw),
        None => (Document::default(), RepairReport::default()),
    };
    servers::resync_active_server(&mut doc);
    let compacted = retention::compact(&mut doc, retention);

    let report = StartupReport {
        source,
        pre_backup,
        repairs,
        compacted,
    };
    (doc, report)
}

/// Restore the newest usable-looking backup and load it once.
///
/// The snapshot taken moments ago by this startup is a copy of the file that
/// just failed, so it is skipped.
fn restore_latest(
    backups: &BackupManager,
    skip: Option<&Path>,
) -> (Option<Value>, LoadSource) {
    let candidate = match backups.list_backups() {
        Ok(list) => list
            .into_iter()
            .map(|b| b.path)
            .find(|path| Some(path.as_path()) != skip),
        Err(e) => {
            log::warn!("Failed to list backups: {}", e);
            None
        }
    };

    let Some(backup) = candidate else {
        log::warn!("No backup available, starting with an empty store");
        return (None, LoadSource::Fresh);
    };

    if let Err(e) = backups.restore_backup(&backup) {
        log::warn!("Failed to restore backup {:?}: {}", backup, e);
        return (None, LoadSource::Fresh);
    }

    match load_value(backups.primary_path()) {
        Ok(raw) => {
            log::info!("Recovered store from backup {:?}", backup);
            (Some(raw), LoadSource::Backup(backup))
        }
        Err(e) => {
            log::warn!("Backup {:?} is unusable too ({}), starting empty", backup, e);
            (None, LoadSource::Fresh)
        }
    }
}

/// Read and parse the store file into an untyped JSON value.
pub(crate) fn load_value(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::Missing(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Write `contents` to `path` via a synced temp file and a rename.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

fn fresh_report() -> StartupReport {
    StartupReport {
        source: LoadSource::Fresh,
        pre_backup: None,
        repairs: RepairReport::default(),
        compacted: 0,
    }
}

fn announce(status: &StatusBus, report: &StartupReport) {
    match &report.source {
        LoadSource::Primary => {
            log::info!("Loaded store file");
            status.emit(StatusKind::Loaded, "loaded store file");
        }
        LoadSource::Backup(path) => {
            log::warn!("Store recovered from backup {:?}", path);
            status.emit(StatusKind::Recovered, path.display().to_string());
        }
        LoadSource::Fresh => {
            log::info!("Starting with an empty store");
            status.emit(StatusKind::Loaded, "started empty");
        }
    }

    if !report.repairs.is_clean() {
        log::info!(
            "Repaired store document: {} action(s), missing {:?}, mistyped {:?}, reset {:?}, dropped {} record(s)",
            report.repairs.total(),
            report.repairs.missing,
            report.repairs.mistyped,
            report.repairs.reset_fields,
            report.repairs.dropped_records
        );
        status.emit(
            StatusKind::Repaired,
            format!("{} repair(s)", report.repairs.total()),
        );
    }
    if report.compacted > 0 {
        log::info!("Trimmed {} entries over retention caps", report.compacted);
        status.emit(
            StatusKind::Compacted,
            format!("{} entries trimmed", report.compacted),
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

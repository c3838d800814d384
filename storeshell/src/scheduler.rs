//! Local notification scheduling
//!
//! Scheduled notifications are written to a durable store before an alarm is
//! armed, so a fire delivered after a process restart still finds its
//! payload. Entries are keyed by dedup key: scheduling again replaces, firing
//! consumes exactly once, cancelling after a fire does nothing.
//!
//! Every read-modify-write of the store happens under one lock, so a
//! `schedule` and a concurrent fire of the same key never interleave. Stores
//! shared between processes add an exclusive file lock on top.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ReminderConfig;
use crate::error::{ScheduleError, StoreError};
use crate::notification::Notification;

/// Dedup key of the built-in reminder
pub const WELCOME_BACK_KEY: &str = "welcome_back";

/// A notification waiting for its trigger time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub dedup_key: String,
    pub trigger_at_epoch_ms: u64,
    pub payload: Notification,
}

// ============================================
// Clock
// ============================================

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

// ============================================
// Durable store
// ============================================

pub type ScheduleMap = BTreeMap<String, ScheduledNotification>;

/// Exclusive hold on a store shared with other processes, released on drop
#[derive(Debug)]
pub struct StoreLock {
    _file: File,
}

/// Durable `dedup_key -> ScheduledNotification` record
pub trait ScheduleStore: Send {
    fn load(&self) -> Result<ScheduleMap, StoreError>;
    fn save(&mut self, entries: &ScheduleMap) -> Result<(), StoreError>;

    /// Block until no other process is between a load and a save.
    /// Stores private to one process return `None`.
    fn lock_exclusive(&self) -> Result<Option<StoreLock>, StoreError> {
        Ok(None)
    }
}

impl ScheduleStore for Box<dyn ScheduleStore> {
    fn load(&self) -> Result<ScheduleMap, StoreError> {
        (**self).load()
    }

    fn save(&mut self, entries: &ScheduleMap) -> Result<(), StoreError> {
        (**self).save(entries)
    }

    fn lock_exclusive(&self) -> Result<Option<StoreLock>, StoreError> {
        (**self).lock_exclusive()
    }
}

/// Schedule persisted as a JSON file, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }
}

impl ScheduleStore for JsonFileStore {
    fn load(&self) -> Result<ScheduleMap, StoreError> {
        if !self.path.exists() {
            return Ok(ScheduleMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(ScheduleMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&mut self, entries: &ScheduleMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn lock_exclusive(&self) -> Result<Option<StoreLock>, StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = open_locked(&self.lock_path())?;
        Ok(Some(StoreLock { _file: file }))
    }
}

/// Open `path` and take an exclusive `flock` on it, waiting for other holders
#[cfg(unix)]
fn open_locked(path: &Path) -> io::Result<File> {
    use std::os::unix::io::AsRawFd;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    loop {
        // SAFETY: flock is a standard POSIX call on a descriptor owned by
        // `file`; the lock is released when `file` is closed.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if result == 0 {
            return Ok(file);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Open `path` without sharing; retry while another handle holds it
#[cfg(windows)]
fn open_locked(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    const ERROR_SHARING_VIOLATION: i32 = 32;
    loop {
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .share_mode(0)
            .open(path)
        {
            Ok(file) => return Ok(file),
            Err(e) if e.raw_os_error() == Some(ERROR_SHARING_VIOLATION) => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(not(any(unix, windows)))]
fn open_locked(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// In-memory store. Clones share the same entries, which stand in for
/// storage that outlives a scheduler instance.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<ScheduleMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleStore for MemoryStore {
    fn load(&self) -> Result<ScheduleMap, StoreError> {
        Ok(self.entries.lock().map(|e| e.clone()).unwrap_or_default())
    }

    fn save(&mut self, entries: &ScheduleMap) -> Result<(), StoreError> {
        if let Ok(mut current) = self.entries.lock() {
            *current = entries.clone();
        }
        Ok(())
    }
}

// ============================================
// Alarm primitive
// ============================================

/// The OS facility that wakes the app at a trigger time
pub trait AlarmService: Send {
    /// Arm (or re-arm) the alarm for `dedup_key`. Errors mean the primitive
    /// is unavailable or denied.
    fn arm(&mut self, dedup_key: &str, trigger_at_ms: u64) -> Result<(), String>;
    fn disarm(&mut self, dedup_key: &str);
}

impl AlarmService for Box<dyn AlarmService> {
    fn arm(&mut self, dedup_key: &str, trigger_at_ms: u64) -> Result<(), String> {
        (**self).arm(dedup_key, trigger_at_ms)
    }

    fn disarm(&mut self, dedup_key: &str) {
        (**self).disarm(dedup_key)
    }
}

/// Records armed alarms without waking anyone. Due entries are fired by an
/// explicit `LocalScheduler::fire_due`, e.g. at the next startup.
#[derive(Debug, Clone, Default)]
pub struct ManualAlarms {
    armed: BTreeMap<String, u64>,
    denied: bool,
}

impl ManualAlarms {
    pub fn new() -> Self {
        Self::default()
    }

    /// An alarm service whose every arm request is refused
    pub fn denied() -> Self {
        Self {
            armed: BTreeMap::new(),
            denied: true,
        }
    }

    pub fn armed(&self) -> &BTreeMap<String, u64> {
        &self.armed
    }
}

impl AlarmService for ManualAlarms {
    fn arm(&mut self, dedup_key: &str, trigger_at_ms: u64) -> Result<(), String> {
        if self.denied {
            return Err("alarm permission denied".to_string());
        }
        self.armed.insert(dedup_key.to_string(), trigger_at_ms);
        Ok(())
    }

    fn disarm(&mut self, dedup_key: &str) {
        self.armed.remove(dedup_key);
    }
}

type FireHandler = Arc<dyn Fn(String) + Send + Sync>;

/// In-process alarms: one timer thread per armed key.
///
/// The handler runs on the timer thread; it should only forward the key to
/// the consumer thread. Re-arming or disarming bumps the key's generation so
/// older timers wake up inert.
pub struct ThreadAlarms {
    clock: Arc<dyn Clock>,
    on_fire: FireHandler,
    generations: Arc<Mutex<HashMap<String, u64>>>,
    next_generation: u64,
}

impl ThreadAlarms {
    pub fn new<F>(clock: Arc<dyn Clock>, on_fire: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Self {
            clock,
            on_fire: Arc::new(on_fire),
            generations: Arc::new(Mutex::new(HashMap::new())),
            next_generation: 0,
        }
    }
}

impl AlarmService for ThreadAlarms {
    fn arm(&mut self, dedup_key: &str, trigger_at_ms: u64) -> Result<(), String> {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.generations
            .lock()
            .map_err(|_| "alarm table poisoned".to_string())?
            .insert(dedup_key.to_string(), generation);

        let delay = Duration::from_millis(trigger_at_ms.saturating_sub(self.clock.now_ms()));
        let key = dedup_key.to_string();
        let generations = Arc::clone(&self.generations);
        let on_fire = Arc::clone(&self.on_fire);

        std::thread::Builder::new()
            .name(format!("alarm-{}", dedup_key))
            .spawn(move || {
                std::thread::sleep(delay);
                let current = match generations.lock() {
                    Ok(mut table) => {
                        if table.get(&key) == Some(&generation) {
                            table.remove(&key);
                            true
                        } else {
                            false
                        }
                    }
                    Err(_) => false,
                };
                if current {
                    on_fire(key);
                }
            })
            .map_err(|e| format!("failed to start alarm thread: {}", e))?;

        Ok(())
    }

    fn disarm(&mut self, dedup_key: &str) {
        if let Ok(mut table) = self.generations.lock() {
            table.remove(dedup_key);
        }
    }
}

// ============================================
// Scheduler
// ============================================

/// Scheduler over boxed store and alarms, as wired by the shell
pub type DynScheduler = LocalScheduler<Box<dyn ScheduleStore>, Box<dyn AlarmService>>;

struct Inner<S, A> {
    store: S,
    alarms: A,
}

pub struct LocalScheduler<S, A> {
    inner: Mutex<Inner<S, A>>,
    clock: Arc<dyn Clock>,
}

impl<S: ScheduleStore, A: AlarmService> LocalScheduler<S, A> {
    pub fn new(store: S, alarms: A, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner { store, alarms }),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S, A>> {
        // A panic mid-update leaves the durable store as the source of truth
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Schedule `notification` to fire after `delay_ms`, replacing any entry
    /// with the same key.
    pub fn schedule(
        &self,
        notification: Notification,
        delay_ms: u64,
        dedup_key: &str,
    ) -> Result<ScheduledNotification, ScheduleError> {
        let mut inner = self.lock();
        let _held = inner.store.lock_exclusive()?;
        let now = self.clock.now_ms();
        Self::insert_and_arm(&mut inner, notification, now.saturating_add(delay_ms), dedup_key)
    }

    fn insert_and_arm(
        inner: &mut Inner<S, A>,
        notification: Notification,
        trigger_at_epoch_ms: u64,
        dedup_key: &str,
    ) -> Result<ScheduledNotification, ScheduleError> {
        let mut entries = inner.store.load()?;

        let entry = ScheduledNotification {
            dedup_key: dedup_key.to_string(),
            trigger_at_epoch_ms,
            payload: Notification {
                dedup_key: dedup_key.to_string(),
                ..notification
            },
        };

        let previous = entries.insert(dedup_key.to_string(), entry.clone());
        inner.store.save(&entries)?;

        if let Err(reason) = inner.alarms.arm(dedup_key, entry.trigger_at_epoch_ms) {
            match previous {
                Some(prev) => entries.insert(dedup_key.to_string(), prev),
                None => entries.remove(dedup_key),
            };
            inner.store.save(&entries)?;
            warn!(dedup_key, %reason, "could not arm alarm, notification not scheduled");
            return Err(ScheduleError::AlarmUnavailable(reason));
        }

        info!(
            dedup_key,
            trigger_at = entry.trigger_at_epoch_ms,
            replaced = previous.is_some(),
            "scheduled local notification"
        );
        Ok(entry)
    }

    /// Remove a not-yet-fired entry. Returns false when nothing was pending.
    pub fn cancel(&self, dedup_key: &str) -> Result<bool, ScheduleError> {
        let mut inner = self.lock();
        let _held = inner.store.lock_exclusive()?;
        let mut entries = inner.store.load()?;

        if entries.remove(dedup_key).is_none() {
            return Ok(false);
        }
        inner.store.save(&entries)?;
        inner.alarms.disarm(dedup_key);

        debug!(dedup_key, "cancelled local notification");
        Ok(true)
    }

    /// Consume the entry for `dedup_key` when its alarm fires.
    ///
    /// Returns `None` when the entry was already fired or cancelled, or when
    /// a stale alarm arrives before the current entry's trigger time.
    pub fn on_fire(&self, dedup_key: &str) -> Result<Option<Notification>, ScheduleError> {
        let mut inner = self.lock();
        let _held = inner.store.lock_exclusive()?;
        let now = self.clock.now_ms();
        Self::consume(&mut inner, dedup_key, now)
    }

    fn consume(
        inner: &mut Inner<S, A>,
        dedup_key: &str,
        now: u64,
    ) -> Result<Option<Notification>, ScheduleError> {
        let mut entries = inner.store.load()?;

        match entries.get(dedup_key) {
            None => {
                debug!(dedup_key, "alarm fired for consumed entry, ignoring");
                return Ok(None);
            }
            Some(entry) if entry.trigger_at_epoch_ms > now => {
                debug!(dedup_key, trigger_at = entry.trigger_at_epoch_ms, now, "early alarm, ignoring");
                return Ok(None);
            }
            Some(_) => {}
        }

        let entry = entries.remove(dedup_key);
        inner.store.save(&entries)?;

        Ok(entry.map(|e| {
            info!(dedup_key, "local notification fired");
            e.payload
        }))
    }

    /// Re-arm every persisted entry; run once at startup. Entries whose
    /// alarm cannot be armed stay persisted for the next attempt.
    pub fn rearm(&self) -> Result<usize, ScheduleError> {
        let mut inner = self.lock();
        let entries = {
            let _held = inner.store.lock_exclusive()?;
            inner.store.load()?
        };

        let mut armed = 0;
        for entry in entries.values() {
            match inner.alarms.arm(&entry.dedup_key, entry.trigger_at_epoch_ms) {
                Ok(()) => armed += 1,
                Err(reason) => {
                    warn!(dedup_key = %entry.dedup_key, %reason, "could not re-arm alarm")
                }
            }
        }

        debug!(armed, total = entries.len(), "re-armed scheduled notifications");
        Ok(armed)
    }

    /// Fire every entry whose trigger time has passed
    pub fn fire_due(&self) -> Result<Vec<Notification>, ScheduleError> {
        let mut inner = self.lock();
        let _held = inner.store.lock_exclusive()?;
        let now = self.clock.now_ms();

        let due: Vec<String> = inner
            .store
            .load()?
            .values()
            .filter(|e| e.trigger_at_epoch_ms <= now)
            .map(|e| e.dedup_key.clone())
            .collect();

        let mut fired = Vec::new();
        for key in due {
            if let Some(notification) = Self::consume(&mut inner, &key, now)? {
                inner.alarms.disarm(&key);
                fired.push(notification);
            }
        }
        Ok(fired)
    }

    /// Entries not yet fired, soonest first
    pub fn pending(&self) -> Result<Vec<ScheduledNotification>, ScheduleError> {
        let inner = self.lock();
        let _held = inner.store.lock_exclusive()?;
        let mut entries: Vec<_> = inner.store.load()?.into_values().collect();
        entries.sort_by_key(|e| e.trigger_at_epoch_ms);
        Ok(entries)
    }

    /// Schedule the built-in "welcome back" reminder unless one is already
    /// pending, in which case the pending entry keeps its trigger time.
    /// Returns `None` when the reminder is disabled.
    pub fn schedule_welcome_back(
        &self,
        reminder: &ReminderConfig,
        app_name: &str,
        channel_id: &str,
    ) -> Result<Option<ScheduledNotification>, ScheduleError> {
        if !reminder.enabled {
            return Ok(None);
        }

        let mut inner = self.lock();
        let _held = inner.store.lock_exclusive()?;
        if let Some(pending) = inner.store.load()?.remove(WELCOME_BACK_KEY) {
            debug!(trigger_at = pending.trigger_at_epoch_ms, "welcome-back reminder already pending");
            return Ok(Some(pending));
        }

        let notification = Notification::new(app_name, &reminder.body, channel_id, WELCOME_BACK_KEY);
        let trigger_at = self.clock.now_ms().saturating_add(reminder.delay_ms());
        Self::insert_and_arm(&mut inner, notification, trigger_at, WELCOME_BACK_KEY).map(Some)
    }
}

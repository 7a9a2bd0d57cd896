//! What the scheduler needs to know about the outside world.
//!
//! The library database, the configured search providers and the record of
//! past job runs all live outside this crate. The controller reaches them
//! through the traits here; the in-memory implementations back tests and the
//! host binary.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::{Result, ShelfError};

/// Entity kind refreshed on a rolling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BacklogKind {
    Author,
    Series,
}

impl BacklogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Series => "series",
        }
    }
}

impl fmt::Display for BacklogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refresh backlog for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacklogStatus {
    /// Entities whose cached data is older than the cache age.
    pub overdue: u64,
    /// All monitored entities.
    pub total: u64,
    /// Name of the stalest entity.
    pub name: String,
    /// Id of the stalest entity.
    pub id: String,
    /// Age of the stalest entity's data in days.
    pub age_days: i64,
}

/// Downloads and wanted items that keep processing and search jobs alive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub snatched: u64,
    pub seeding: u64,
    pub wanted: u64,
}

/// Library state queried by the scheduler.
pub trait BacklogSource: Send + Sync {
    fn query(&self, kind: BacklogKind) -> BacklogStatus;

    fn pending(&self) -> PendingCounts;

    /// Refresh one entity's cached data.
    fn refresh(&self, kind: BacklogKind, id: &str) -> Result<()>;

    /// Ids of every monitored entity, stalest first.
    fn monitored(&self, kind: BacklogKind) -> Vec<String>;
}

/// Which kinds of search provider are configured and enabled.
pub trait ProviderStatus: Send + Sync {
    /// Direct, torrent, usenet or IRC search providers.
    fn search_available(&self) -> bool;

    fn rss_available(&self) -> bool;

    fn wishlist_available(&self) -> bool;

    fn any_available(&self) -> bool {
        self.search_available() || self.rss_available()
    }
}

/// Start and finish times of past runs, keyed by job run name.
pub trait JobHistory: Send + Sync {
    fn last_start(&self, run_name: &str) -> Option<DateTime<Utc>>;

    fn last_finish(&self, run_name: &str) -> Option<DateTime<Utc>>;

    fn record_start(&self, run_name: &str, at: DateTime<Utc>);

    fn record_finish(&self, run_name: &str, at: DateTime<Utc>);
}

// ── In-memory implementations ──

#[derive(Debug, Default)]
struct MemoryBacklogState {
    status: HashMap<BacklogKind, BacklogStatus>,
    monitored: HashMap<BacklogKind, Vec<String>>,
    pending: PendingCounts,
    refreshed: Vec<(BacklogKind, String)>,
}

/// Backlog held in memory. Refreshing an entity marks it up to date.
#[derive(Debug, Default)]
pub struct MemoryBacklog {
    state: Mutex<MemoryBacklogState>,
}

impl MemoryBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, kind: BacklogKind, status: BacklogStatus) {
        self.lock().status.insert(kind, status);
    }

    pub fn set_monitored(&self, kind: BacklogKind, ids: Vec<String>) {
        self.lock().monitored.insert(kind, ids);
    }

    pub fn set_pending(&self, pending: PendingCounts) {
        self.lock().pending = pending;
    }

    /// Every refresh performed so far, in order.
    pub fn refreshed(&self) -> Vec<(BacklogKind, String)> {
        self.lock().refreshed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryBacklogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BacklogSource for MemoryBacklog {
    fn query(&self, kind: BacklogKind) -> BacklogStatus {
        self.lock().status.get(&kind).cloned().unwrap_or_default()
    }

    fn pending(&self) -> PendingCounts {
        self.lock().pending
    }

    fn refresh(&self, kind: BacklogKind, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(ShelfError::Scheduling(format!("no {kind} id to refresh")));
        }
        let mut state = self.lock();
        state.refreshed.push((kind, id.to_owned()));
        if let Some(status) = state.status.get_mut(&kind)
            && status.id == id
        {
            status.overdue = status.overdue.saturating_sub(1);
            status.age_days = 0;
        }
        Ok(())
    }

    fn monitored(&self, kind: BacklogKind) -> Vec<String> {
        self.lock().monitored.get(&kind).cloned().unwrap_or_default()
    }
}

/// Fixed provider availability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticProviders {
    pub search: bool,
    pub rss: bool,
    pub wishlist: bool,
}

impl StaticProviders {
    pub fn all() -> Self {
        Self {
            search: true,
            rss: true,
            wishlist: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

impl ProviderStatus for StaticProviders {
    fn search_available(&self) -> bool {
        self.search
    }

    fn rss_available(&self) -> bool {
        self.rss
    }

    fn wishlist_available(&self) -> bool {
        self.wishlist
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RunTimes {
    start: Option<DateTime<Utc>>,
    finish: Option<DateTime<Utc>>,
}

/// Job history held in memory. Run names are matched case-insensitively.
#[derive(Debug, Default)]
pub struct MemoryJobHistory {
    runs: Mutex<HashMap<String, RunTimes>>,
}

impl MemoryJobHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(&self, run_name: &str, f: impl FnOnce(&mut RunTimes) -> T) -> T {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        f(runs.entry(run_name.to_ascii_uppercase()).or_default())
    }
}

impl JobHistory for MemoryJobHistory {
    fn last_start(&self, run_name: &str) -> Option<DateTime<Utc>> {
        self.with_entry(run_name, |r| r.start)
    }

    fn last_finish(&self, run_name: &str) -> Option<DateTime<Utc>> {
        self.with_entry(run_name, |r| r.finish)
    }

    fn record_start(&self, run_name: &str, at: DateTime<Utc>) {
        self.with_entry(run_name, |r| r.start = Some(at));
    }

    fn record_finish(&self, run_name: &str, at: DateTime<Utc>) {
        self.with_entry(run_name, |r| r.finish = Some(at));
    }
}

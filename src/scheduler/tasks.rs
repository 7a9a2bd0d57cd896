//! Job identifiers and the table of callable job targets.
//!
//! A scheduler item names its job by a target string such as
//! `"search.book"`. The host registers a callback under each target before the
//! controller starts; the controller resolves targets when it schedules a job.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Well-known job ID for the periodic book search.
pub const JOB_SEARCH_BOOK: &str = "search_book";

/// Well-known job ID for the RSS feed search.
pub const JOB_SEARCH_RSS: &str = "search_rss_book";

/// Well-known job ID for the wishlist search.
pub const JOB_SEARCH_WISHLIST: &str = "search_wishlist";

/// Well-known job ID for the magazine search.
pub const JOB_SEARCH_MAGAZINES: &str = "search_magazines";

/// Well-known job ID for the comic search.
pub const JOB_SEARCH_COMICS: &str = "search_comics";

/// Well-known job ID for download post-processing.
pub const JOB_POSTPROCESS: &str = "process_dir";

/// Well-known job ID for the rolling author refresh.
pub const JOB_AUTHOR_UPDATE: &str = "author_update";

/// Well-known job ID for the rolling series refresh.
pub const JOB_SERIES_UPDATE: &str = "series_update";

/// Well-known job ID for cache cleanup.
pub const JOB_CLEAN_CACHE: &str = "clean_cache";

/// Well-known job ID for config and database backups.
pub const JOB_BACKUP: &str = "backup";

/// Well-known job ID for the version check.
pub const JOB_VERSION_CHECK: &str = "check_for_updates";

/// Target run by the author refresh job. Registered by the controller.
pub const TARGET_REFRESH_AUTHOR: &str = "refresh.author";

/// Target run by the series refresh job. Registered by the controller.
pub const TARGET_REFRESH_SERIES: &str = "refresh.series";

/// Work performed when a job fires. Runs on a blocking thread.
pub type JobCallback = Arc<dyn Fn() + Send + Sync>;

/// Named job targets.
#[derive(Clone, Default)]
pub struct TargetTable {
    targets: HashMap<String, JobCallback>,
}

impl TargetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `target`, replacing any earlier entry.
    pub fn register<F>(&mut self, target: &str, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.targets.insert(target.to_owned(), Arc::new(callback));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_target<F>(mut self, target: &str, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(target, callback);
        self
    }

    pub fn contains(&self, target: &str) -> bool {
        self.targets.contains_key(target)
    }

    pub fn resolve(&self, target: &str) -> Option<JobCallback> {
        self.targets.get(target).cloned()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl fmt::Debug for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.targets.keys().collect();
        names.sort();
        f.debug_struct("TargetTable").field("targets", &names).finish()
    }
}

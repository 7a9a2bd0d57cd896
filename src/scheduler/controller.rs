//! Binds scheduler config items to live jobs.
//!
//! The controller is the single writer for the job table. Every command goes
//! through [`SchedulerController::schedule_job`], which looks the job up in
//! the config registry, works out the interval it should run at and then
//! starts, stops or replaces the live job. All commands are idempotent.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::backlog::{
    BacklogKind, BacklogSource, JobHistory, MemoryBacklog, MemoryJobHistory, ProviderStatus,
    StaticProviders,
};
use super::jobs::{JobRegistry, JobSnapshot};
use super::tasks::{
    JOB_AUTHOR_UPDATE, JOB_BACKUP, JOB_CLEAN_CACHE, JOB_POSTPROCESS, JOB_SEARCH_BOOK,
    JOB_SEARCH_COMICS, JOB_SEARCH_MAGAZINES, JOB_SEARCH_RSS, JOB_SEARCH_WISHLIST,
    JOB_SERIES_UPDATE, TARGET_REFRESH_AUTHOR, TARGET_REFRESH_SERIES, TargetTable,
};
use super::timefmt::{ago, describe_minutes, next_run_in};
use crate::config::defaults::{BACKUP_DAYS, CACHE_AGE};
use crate::config::{
    ConfigRegistry, ScheduleDescriptor, SharedItem, TimeUnit, hour_min_interval, lock_item,
};

/// A RESTART whose new interval is within this many seconds of the live one
/// leaves the job alone.
const RESTART_TOLERANCE_SECS: u64 = 2;

/// Share of the cache age over which the whole backlog should be refreshed.
const REFRESH_SPREAD_NUM: i64 = 4;
const REFRESH_SPREAD_DEN: i64 = 5;

const MINUTES_PER_DAY: i64 = 1440;

/// Command applied to a named job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    Start,
    Stop,
    Restart,
    /// Start with a zero due interval and clear the stop flag.
    StartNow,
}

impl fmt::Display for SchedulerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::Restart => "Restart",
            Self::StartNow => "StartNow",
        })
    }
}

/// What a command did to the job table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// No scheduler item has that name.
    NotConfigured,
    Started,
    /// An existing job was stopped and started again with a new interval.
    Restarted,
    /// RESTART found the interval unchanged and left the job running.
    Unchanged,
    AlreadyScheduled,
    Stopped,
    /// STOP for a job that was not running.
    NotRunning,
    /// The stop flag is set.
    Suppressed,
    /// Interval is zero or a required provider is missing.
    Disabled,
    /// The job's target has no registered callback.
    Unresolved,
}

impl ScheduleOutcome {
    /// Whether a job with this name is live after the command.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Started | Self::Restarted | Self::Unchanged | Self::AlreadyScheduled
        )
    }
}

/// Interval in minutes for the rolling author or series refresh.
///
/// Spreads a full refresh of `total` entities over 80% of the cache age, but
/// never more often than every five minutes. Returns zero when the cache age
/// is not positive, which disables the job.
pub fn refresh_interval_minutes(cache_age_days: i64, total: u64) -> i64 {
    if cache_age_days <= 0 {
        return 0;
    }
    let total = i64::try_from(total.max(1)).unwrap_or(i64::MAX);
    let minutes = cache_age_days.saturating_mul(MINUTES_PER_DAY * REFRESH_SPREAD_NUM)
        / total.saturating_mul(REFRESH_SPREAD_DEN);
    minutes.max(crate::config::item::MIN_INTERVAL_MINUTES)
}

/// When a job with no live timer should first fire.
///
/// One interval after the last finish, but never sooner than a minute from
/// `now`.
pub fn estimate_next_run(
    last_finish: Option<DateTime<Utc>>,
    interval_minutes: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let earliest = now + TimeDelta::seconds(60);
    let due = last_finish.map(|t| {
        TimeDelta::try_minutes(interval_minutes)
            .and_then(|d| t.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    });
    match due {
        Some(due) if due > earliest => due,
        _ => earliest,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn descriptor_of(item: &SharedItem) -> Option<ScheduleDescriptor> {
    let guard = lock_item(item);
    guard.schedule().cloned()
}

fn job_for(kind: BacklogKind) -> &'static str {
    match kind {
        BacklogKind::Author => JOB_AUTHOR_UPDATE,
        BacklogKind::Series => JOB_SERIES_UPDATE,
    }
}

/// Builder for [`SchedulerController`].
pub struct ControllerBuilder {
    registry: Arc<ConfigRegistry>,
    targets: TargetTable,
    backlog: Arc<dyn BacklogSource>,
    providers: Arc<dyn ProviderStatus>,
    history: Arc<dyn JobHistory>,
}

impl ControllerBuilder {
    pub fn with_targets(mut self, targets: TargetTable) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_backlog(mut self, backlog: Arc<dyn BacklogSource>) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_providers(mut self, providers: Arc<dyn ProviderStatus>) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn JobHistory>) -> Self {
        self.history = history;
        self
    }

    /// Build the controller. Jobs are spawned on `runtime`.
    ///
    /// The author and series refresh targets are registered here unless the
    /// caller supplied its own.
    pub fn build(self, runtime: Handle) -> Arc<SchedulerController> {
        Arc::new_cyclic(|weak: &Weak<SchedulerController>| {
            let mut targets = self.targets;
            for (target, kind) in [
                (TARGET_REFRESH_AUTHOR, BacklogKind::Author),
                (TARGET_REFRESH_SERIES, BacklogKind::Series),
            ] {
                if targets.contains(target) {
                    continue;
                }
                let weak = weak.clone();
                targets.register(target, move || {
                    if let Some(controller) = weak.upgrade() {
                        controller.refresh_overdue(kind, true);
                    }
                });
            }
            SchedulerController {
                registry: self.registry,
                jobs: JobRegistry::new(runtime),
                targets,
                backlog: self.backlog,
                providers: self.providers,
                history: self.history,
                stop_flag: Arc::new(AtomicBool::new(false)),
                command_lock: Mutex::new(()),
            }
        })
    }
}

/// Starts, stops and reschedules jobs from scheduler config items.
pub struct SchedulerController {
    registry: Arc<ConfigRegistry>,
    jobs: JobRegistry,
    targets: TargetTable,
    backlog: Arc<dyn BacklogSource>,
    providers: Arc<dyn ProviderStatus>,
    history: Arc<dyn JobHistory>,
    /// Process-wide cancellation. Suppresses new starts and stops backlog
    /// loops between items.
    stop_flag: Arc<AtomicBool>,
    command_lock: Mutex<()>,
}

impl SchedulerController {
    /// Start building a controller with in-memory collaborators and no
    /// providers.
    pub fn builder(registry: Arc<ConfigRegistry>) -> ControllerBuilder {
        ControllerBuilder {
            registry,
            targets: TargetTable::new(),
            backlog: Arc::new(MemoryBacklog::new()),
            providers: Arc::new(StaticProviders::none()),
            history: Arc::new(MemoryJobHistory::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    // ── Cancellation ──

    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.stop_flag.store(false, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Shared handle to the stop flag for long-running callbacks.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    // ── Commands ──

    /// Apply `command` to the job named `name`.
    pub fn schedule_job(&self, command: SchedulerCommand, name: &str) -> ScheduleOutcome {
        let _serial = lock(&self.command_lock);

        let Some(item) = self.registry.find_scheduler(name) else {
            debug!("No {name} scheduled");
            return ScheduleOutcome::NotConfigured;
        };
        let (descriptor, value, can_run) = {
            let guard = lock_item(&item);
            let Some(descriptor) = guard.schedule().cloned() else {
                return ScheduleOutcome::NotConfigured;
            };
            let providers = self.providers_for(&descriptor.schedule_name);
            let can_run = self.registry.scheduler_can_run(&guard, providers);
            (descriptor, guard.peek_int(), can_run)
        };
        let job = descriptor.schedule_name.as_str();

        let mut replaced = false;
        match command {
            SchedulerCommand::Stop => {
                return if self.jobs.remove_job(job) {
                    debug!("Stop {job} job");
                    ScheduleOutcome::Stopped
                } else {
                    debug!("Stop {job} job, not running");
                    ScheduleOutcome::NotRunning
                };
            }
            SchedulerCommand::Restart => {
                if let Some(current) = self.jobs.interval(job) {
                    if can_run && let Some(minutes) = self.adjusted_minutes(&descriptor, value) {
                        let current = i64::try_from(current.as_secs()).unwrap_or(i64::MAX);
                        if current.abs_diff(minutes.saturating_mul(60)) < RESTART_TOLERANCE_SECS {
                            debug!("Restart {job} job, interval unchanged");
                            return ScheduleOutcome::Unchanged;
                        }
                    }
                    self.jobs.remove_job(job);
                    debug!("Stop {job} job");
                    replaced = true;
                }
            }
            SchedulerCommand::StartNow => self.clear_stop(),
            SchedulerCommand::Start => {}
        }

        if self.jobs.contains(job) {
            debug!("{command} {job} job, already scheduled");
            return ScheduleOutcome::AlreadyScheduled;
        }
        if self.is_stopping() {
            debug!("{command} {job} job suppressed while stopping");
            return ScheduleOutcome::Suppressed;
        }
        if !can_run {
            debug!("{command} {job} job, not runnable");
            return ScheduleOutcome::Disabled;
        }
        let Some(callback) = self.targets.resolve(&descriptor.target) else {
            warn!(
                "Cannot {command} {job} job: no target {}",
                descriptor.target
            );
            return ScheduleOutcome::Unresolved;
        };
        let Some(minutes) = self.adjusted_minutes(&descriptor, value) else {
            warn!("{job} interval is zero, job disabled");
            return ScheduleOutcome::Disabled;
        };

        let due_minutes = if command == SchedulerCommand::StartNow {
            0
        } else {
            minutes
        };
        let first_run = self.first_run(&descriptor, due_minutes, command);
        let interval = Duration::from_secs(u64::try_from(minutes.saturating_mul(60)).unwrap_or(0));
        self.jobs.add_job(job, interval, first_run, callback);
        info!("{command} {job} job every {}", describe_minutes(minutes));

        if replaced {
            ScheduleOutcome::Restarted
        } else {
            ScheduleOutcome::Started
        }
    }

    /// Apply `command` to every scheduler item.
    ///
    /// STOP sets the stop flag first; any other command clears it.
    pub fn restart_jobs(&self, command: SchedulerCommand) {
        if command == SchedulerCommand::Stop {
            self.request_stop();
        } else {
            self.clear_stop();
        }
        for item in self.registry.get_schedulers() {
            if let Some(descriptor) = descriptor_of(&item) {
                self.schedule_job(command, &descriptor.schedule_name);
            }
        }
    }

    /// Start `name` if it is not already live. Clears the stop flag.
    pub fn ensure_running(&self, name: &str) -> ScheduleOutcome {
        self.clear_stop();
        if self.jobs.contains(name) {
            return ScheduleOutcome::AlreadyScheduled;
        }
        self.schedule_job(SchedulerCommand::Start, name)
    }

    /// Restart every runnable scheduler and stop the rest. Call after the
    /// config has been edited and saved.
    pub fn reschedule_after_save(&self) {
        for item in self.registry.get_schedulers() {
            let (name, can_run) = {
                let guard = lock_item(&item);
                let Some(descriptor) = guard.schedule() else {
                    continue;
                };
                let providers = self.providers_for(&descriptor.schedule_name);
                (
                    descriptor.schedule_name.clone(),
                    self.registry.scheduler_can_run(&guard, providers),
                )
            };
            let command = if can_run {
                SchedulerCommand::Restart
            } else {
                SchedulerCommand::Stop
            };
            self.schedule_job(command, &name);
        }
    }

    /// Consistency sweep: start the jobs current state calls for and stop the
    /// ones it does not.
    pub fn check_running_jobs(&self) {
        self.clear_stop();
        let pending = self.backlog.pending();

        if pending.snatched > 0 || pending.seeding > 0 {
            self.ensure_running(JOB_POSTPROCESS);
        }
        if pending.wanted > 0 {
            if self.providers.search_available() {
                self.ensure_running(JOB_SEARCH_BOOK);
            }
            if self.providers.rss_available() {
                self.ensure_running(JOB_SEARCH_RSS);
            }
        } else {
            self.schedule_job(SchedulerCommand::Stop, JOB_SEARCH_BOOK);
            self.schedule_job(SchedulerCommand::Stop, JOB_SEARCH_RSS);
        }
        if self.providers.wishlist_available() {
            self.ensure_running(JOB_SEARCH_WISHLIST);
        } else {
            self.schedule_job(SchedulerCommand::Stop, JOB_SEARCH_WISHLIST);
        }
        if self.providers.any_available() {
            self.ensure_running(JOB_SEARCH_MAGAZINES);
            self.ensure_running(JOB_SEARCH_COMICS);
        } else {
            self.schedule_job(SchedulerCommand::Stop, JOB_SEARCH_MAGAZINES);
            self.schedule_job(SchedulerCommand::Stop, JOB_SEARCH_COMICS);
        }
        self.ensure_running(JOB_AUTHOR_UPDATE);
        self.ensure_running(JOB_SERIES_UPDATE);
    }

    /// Stop every job and set the stop flag.
    pub fn shutdown(&self) {
        self.request_stop();
        self.jobs.shutdown();
        info!("scheduler stopped");
    }

    // ── Intervals ──

    /// Effective `(hours, minutes)` interval for a job, or `None` if the job
    /// would run at a zero interval.
    pub fn adjust_schedule(&self, name: &str) -> Option<(i64, i64)> {
        let item = self.registry.find_scheduler(name)?;
        let (descriptor, value) = {
            let guard = lock_item(&item);
            (guard.schedule().cloned()?, guard.peek_int())
        };
        self.adjusted_interval(&descriptor, value)
    }

    fn adjusted_interval(&self, descriptor: &ScheduleDescriptor, value: i64) -> Option<(i64, i64)> {
        let days = |key: &str| {
            let days = self.registry.get_int(key);
            (days > 0).then(|| hour_min_interval(days, TimeUnit::Day))
        };
        match descriptor.schedule_name.as_str() {
            JOB_CLEAN_CACHE => days(CACHE_AGE),
            JOB_BACKUP => days(BACKUP_DAYS),
            JOB_AUTHOR_UPDATE => self.refresh_interval(BacklogKind::Author),
            JOB_SERIES_UPDATE => self.refresh_interval(BacklogKind::Series),
            _ => (value > 0).then(|| hour_min_interval(value, descriptor.unit)),
        }
    }

    fn adjusted_minutes(&self, descriptor: &ScheduleDescriptor, value: i64) -> Option<i64> {
        self.adjusted_interval(descriptor, value)
            .map(|(hours, minutes)| hours.saturating_mul(60).saturating_add(minutes))
            .filter(|m| *m > 0)
    }

    fn refresh_interval(&self, kind: BacklogKind) -> Option<(i64, i64)> {
        let cache_age = self.registry.get_int(CACHE_AGE);
        let status = self.backlog.query(kind);
        let minutes = refresh_interval_minutes(cache_age, status.total);
        if minutes == 0 {
            warn!("{CACHE_AGE} is zero, {kind} refresh disabled");
            return None;
        }
        debug!(
            "Found {} {kind} entries from {} overdue update, interval {minutes} minutes",
            status.overdue, status.total
        );
        Some(hour_min_interval(minutes, TimeUnit::Min))
    }

    fn providers_for(&self, schedule_name: &str) -> bool {
        match schedule_name {
            JOB_SEARCH_BOOK | JOB_SEARCH_COMICS => self.providers.search_available(),
            JOB_SEARCH_RSS => self.providers.rss_available(),
            JOB_SEARCH_WISHLIST => self.providers.wishlist_available(),
            _ => self.providers.any_available(),
        }
    }

    /// First fire time for a job about to be added, logged with its last run.
    fn first_run(
        &self,
        descriptor: &ScheduleDescriptor,
        interval_minutes: i64,
        command: SchedulerCommand,
    ) -> DateTime<Utc> {
        let job = descriptor.schedule_name.as_str();
        let now = Utc::now();
        let last = self.history.last_finish(&descriptor.run_name);
        let (start, when) = match self.jobs.next_run(job) {
            Some(live) => (live, next_run_in((live - now).num_seconds())),
            None => {
                let start = estimate_next_run(last, interval_minutes, now);
                (start, describe_minutes((start - now).num_minutes()))
            }
        };
        match last {
            Some(last) => debug!(
                "{command} {job} job in {when} (Last run {})",
                ago((now - last).num_seconds())
            ),
            None => debug!("{command} {job} job in {when}"),
        }
        start
    }

    // ── Backlog refresh ──

    /// One step of the rolling refresh: update the stalest entity if it is
    /// overdue. With `restart`, the job is rescheduled afterwards so its
    /// interval follows the backlog. Returns a status message.
    pub fn refresh_overdue(&self, kind: BacklogKind, restart: bool) -> String {
        let job = job_for(kind);
        let run_name = self
            .registry
            .find_scheduler(job)
            .and_then(|item| descriptor_of(&item))
            .map(|d| d.run_name)
            .unwrap_or_else(|| job.to_ascii_uppercase());
        self.history.record_start(&run_name, Utc::now());

        if self.registry.get_int(CACHE_AGE) <= 0 {
            let msg = format!("{CACHE_AGE} is zero, not refreshing {kind} data");
            warn!("{msg}");
            self.history.record_finish(&run_name, Utc::now());
            return msg;
        }

        let status = self.backlog.query(kind);
        let msg = if status.total == 0 {
            format!("There are no monitored {kind} entries")
        } else if status.overdue == 0 {
            format!(
                "Oldest {kind} info ({}) is {} days old, no update due",
                status.name, status.age_days
            )
        } else {
            info!(
                "Starting update for {kind} {} ({} of {} overdue)",
                status.name, status.overdue, status.total
            );
            match self.backlog.refresh(kind, &status.id) {
                Ok(()) => format!("Updated {kind} {}", status.name),
                Err(e) => {
                    error!("{kind} refresh failed: {e}");
                    format!("Failed to update {kind} {}: {e}", status.name)
                }
            }
        };
        debug!("{msg}");
        self.history.record_finish(&run_name, Utc::now());

        if restart && status.total > 0 && !self.is_stopping() {
            self.schedule_job(SchedulerCommand::Restart, job);
        }
        msg
    }

    /// Refresh every monitored entity of `kind`, stalest first. Stops early
    /// when the stop flag is raised. Returns how many were refreshed.
    pub fn refresh_all(&self, kind: BacklogKind) -> usize {
        let ids = self.backlog.monitored(kind);
        let mut done = 0;
        for id in &ids {
            if self.is_stopping() {
                info!("Aborting {kind} refresh after {done} of {}", ids.len());
                break;
            }
            match self.backlog.refresh(kind, id) {
                Ok(()) => done += 1,
                Err(e) => warn!("Cannot refresh {kind} {id}: {e}"),
            }
        }
        info!("Refreshed {done} of {} {kind} entries", ids.len());
        done
    }

    // ── Reporting ──

    /// One line per scheduler item describing when it runs next.
    pub fn job_summaries(&self) -> Vec<String> {
        let now = Utc::now();
        let mut lines = Vec::new();
        for item in self.registry.get_schedulers() {
            let Some(descriptor) = descriptor_of(&item) else {
                continue;
            };
            let friendly = &descriptor.friendly_name;
            let Some(next) = self.jobs.next_run(&descriptor.schedule_name) else {
                lines.push(format!("{friendly}: Not scheduled"));
                continue;
            };
            let mut line = format!(
                "{friendly}: Next run in {}",
                next_run_in((next - now).num_seconds())
            );
            if self.jobs.is_running(&descriptor.schedule_name) {
                line.push_str(" (Running)");
            } else if let Some(last) = self.history.last_finish(&descriptor.run_name) {
                line.push_str(&format!(" (Last run {})", ago((now - last).num_seconds())));
            }
            lines.push(line);
        }
        lines
    }

    /// Where the rolling refresh of `kind` stands.
    pub fn backlog_summary(&self, kind: BacklogKind) -> String {
        let status = self.backlog.query(kind);
        if status.total == 0 {
            return format!("No monitored {kind} entries");
        }
        format!(
            "Oldest {kind} info ({}) is {} days old; {} of {} overdue",
            status.name, status.age_days, status.overdue, status.total
        )
    }

    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.jobs.snapshots()
    }
}

impl fmt::Debug for SchedulerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerController")
            .field("jobs", &self.jobs)
            .field("targets", &self.targets)
            .field("stopping", &self.is_stopping())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::scheduler::backlog::{BacklogStatus, PendingCounts};
    use crate::scheduler::tasks::JOB_VERSION_CHECK;

    const DEFAULT_TARGETS: [&str; 9] = [
        "search.book",
        "search.rss_book",
        "search.wishlist",
        "search.magazines",
        "search.comics",
        "postprocess.process_dir",
        "versioncheck.check",
        "cache.clean",
        "backup.run",
    ];

    fn noop_targets() -> TargetTable {
        let mut table = TargetTable::new();
        for target in DEFAULT_TARGETS {
            table.register(target, || {});
        }
        table
    }

    struct Fixture {
        controller: Arc<SchedulerController>,
        backlog: Arc<MemoryBacklog>,
        history: Arc<MemoryJobHistory>,
    }

    fn fixture(providers: StaticProviders) -> Fixture {
        let registry = Arc::new(ConfigRegistry::with_defaults().unwrap());
        let backlog = Arc::new(MemoryBacklog::new());
        let history = Arc::new(MemoryJobHistory::new());
        let controller = SchedulerController::builder(registry)
            .with_targets(noop_targets())
            .with_backlog(backlog.clone())
            .with_providers(Arc::new(providers))
            .with_history(history.clone())
            .build(Handle::current());
        Fixture {
            controller,
            backlog,
            history,
        }
    }

    fn author_backlog(overdue: u64, total: u64) -> BacklogStatus {
        BacklogStatus {
            overdue,
            total,
            name: "Ursula K. Le Guin".to_owned(),
            id: "A1".to_owned(),
            age_days: 40,
        }
    }

    // ── Pure helpers ──

    #[test]
    fn refresh_interval_follows_backlog() {
        assert_eq!(refresh_interval_minutes(10, 100), 115);
        assert_eq!(refresh_interval_minutes(10, 0), 11_520);
        assert_eq!(refresh_interval_minutes(1, 100_000), 5);
        assert_eq!(refresh_interval_minutes(0, 100), 0);
        assert!(refresh_interval_minutes(30, 10) > refresh_interval_minutes(30, 1000));
    }

    #[test]
    fn estimate_next_run_is_at_least_a_minute_out() {
        let now = Utc::now();
        assert_eq!(estimate_next_run(None, 10, now), now + TimeDelta::seconds(60));
        let stale = now - TimeDelta::hours(1);
        assert_eq!(
            estimate_next_run(Some(stale), 10, now),
            now + TimeDelta::seconds(60)
        );
        assert_eq!(
            estimate_next_run(Some(now), 10, now),
            now + TimeDelta::minutes(10)
        );
    }

    #[test]
    fn estimate_next_run_survives_huge_intervals() {
        let now = Utc::now();
        assert_eq!(
            estimate_next_run(Some(now), i64::MAX, now),
            DateTime::<Utc>::MAX_UTC
        );
        assert_eq!(
            estimate_next_run(None, i64::MAX, now),
            now + TimeDelta::seconds(60)
        );
    }

    #[test]
    fn outcome_liveness() {
        assert!(ScheduleOutcome::Unchanged.is_live());
        assert!(ScheduleOutcome::Restarted.is_live());
        assert!(!ScheduleOutcome::Unresolved.is_live());
        assert!(!ScheduleOutcome::Stopped.is_live());
    }

    // ── adjust_schedule ──

    #[tokio::test]
    async fn adjust_schedule_for_author_refresh() {
        let f = fixture(StaticProviders::all());
        f.controller.registry().set_int(CACHE_AGE, 10);
        f.backlog
            .set_status(BacklogKind::Author, author_backlog(5, 100));
        assert_eq!(f.controller.adjust_schedule(JOB_AUTHOR_UPDATE), Some((0, 115)));
    }

    #[tokio::test]
    async fn adjust_schedule_zero_cache_age_disables_refresh() {
        let f = fixture(StaticProviders::all());
        f.controller.registry().set_int(CACHE_AGE, 0);
        assert_eq!(f.controller.adjust_schedule(JOB_SERIES_UPDATE), None);
        assert_eq!(f.controller.adjust_schedule(JOB_CLEAN_CACHE), None);
        let outcome = f
            .controller
            .schedule_job(SchedulerCommand::Start, JOB_SERIES_UPDATE);
        assert_eq!(outcome, ScheduleOutcome::Disabled);
    }

    #[tokio::test]
    async fn adjust_schedule_forces_retention_days() {
        let f = fixture(StaticProviders::all());
        assert_eq!(f.controller.adjust_schedule(JOB_CLEAN_CACHE), Some((720, 0)));
        f.controller.registry().set_int(BACKUP_DAYS, 3);
        assert_eq!(f.controller.adjust_schedule(JOB_BACKUP), Some((72, 0)));
        assert_eq!(f.controller.adjust_schedule(JOB_POSTPROCESS), Some((0, 10)));
        assert_eq!(f.controller.adjust_schedule("no_such_job"), None);
    }

    #[tokio::test]
    async fn retention_days_are_bounded() {
        let f = fixture(StaticProviders::all());
        let registry = f.controller.registry();
        assert!(!registry.set_int(CACHE_AGE, i64::MAX / 4));
        assert!(!registry.set_int(BACKUP_DAYS, 1_000_000_000_000));
        assert_eq!(f.controller.adjust_schedule(JOB_CLEAN_CACHE), Some((720, 0)));
        assert_eq!(f.controller.adjust_schedule(JOB_BACKUP), Some((168, 0)));
    }

    #[tokio::test]
    async fn huge_intervals_schedule_without_panicking() {
        let f = fixture(StaticProviders::all());
        let registry = f.controller.registry();
        assert!(registry.set_int(CACHE_AGE, crate::config::defaults::MAX_RETENTION_DAYS));
        f.history
            .record_finish("AUTHORUPDATE", Utc::now() - TimeDelta::minutes(1));
        assert_eq!(
            f.controller
                .schedule_job(SchedulerCommand::Start, JOB_AUTHOR_UPDATE),
            ScheduleOutcome::Started
        );

        assert!(registry.set_int("VERSIONCHECK_INTERVAL", i64::MAX));
        assert_eq!(
            f.controller
                .schedule_job(SchedulerCommand::Start, JOB_VERSION_CHECK),
            ScheduleOutcome::Started
        );
        assert_eq!(
            f.controller
                .schedule_job(SchedulerCommand::Restart, JOB_VERSION_CHECK),
            ScheduleOutcome::Unchanged
        );
        assert!(f.controller.jobs().next_run(JOB_VERSION_CHECK).unwrap() > Utc::now());
    }

    // ── schedule_job ──

    #[tokio::test]
    async fn start_is_idempotent() {
        let f = fixture(StaticProviders::all());
        let c = &f.controller;
        assert_eq!(
            c.schedule_job(SchedulerCommand::Start, JOB_POSTPROCESS),
            ScheduleOutcome::Started
        );
        assert_eq!(
            c.schedule_job(SchedulerCommand::Start, JOB_POSTPROCESS),
            ScheduleOutcome::AlreadyScheduled
        );
        assert_eq!(c.jobs().len(), 1);
        assert_eq!(
            c.jobs().interval(JOB_POSTPROCESS),
            Some(Duration::from_secs(600))
        );
    }

    #[tokio::test]
    async fn unknown_job_is_not_configured() {
        let f = fixture(StaticProviders::all());
        assert_eq!(
            f.controller.schedule_job(SchedulerCommand::Start, "sync_to_nowhere"),
            ScheduleOutcome::NotConfigured
        );
    }

    #[tokio::test]
    async fn provider_jobs_need_providers() {
        let f = fixture(StaticProviders::none());
        assert_eq!(
            f.controller.schedule_job(SchedulerCommand::Start, JOB_SEARCH_BOOK),
            ScheduleOutcome::Disabled
        );
        assert!(!f.controller.jobs().contains(JOB_SEARCH_BOOK));
    }

    #[tokio::test]
    async fn unresolved_target_is_skipped() {
        let registry = Arc::new(ConfigRegistry::with_defaults().unwrap());
        let controller = SchedulerController::builder(registry).build(Handle::current());
        assert_eq!(
            controller.schedule_job(SchedulerCommand::Start, JOB_BACKUP),
            ScheduleOutcome::Unresolved
        );
        assert!(controller.jobs().is_empty());
        // Built-in refresh targets still resolve.
        assert_eq!(
            controller.schedule_job(SchedulerCommand::Start, JOB_AUTHOR_UPDATE),
            ScheduleOutcome::Started
        );
    }

    #[tokio::test]
    async fn restart_within_tolerance_is_noop() {
        let f = fixture(StaticProviders::all());
        let c = &f.controller;
        c.schedule_job(SchedulerCommand::Start, JOB_POSTPROCESS);
        let first = c.jobs().next_run(JOB_POSTPROCESS).unwrap();

        assert_eq!(
            c.schedule_job(SchedulerCommand::Restart, JOB_POSTPROCESS),
            ScheduleOutcome::Unchanged
        );
        assert_eq!(c.jobs().next_run(JOB_POSTPROCESS), Some(first));
    }

    #[tokio::test]
    async fn restart_with_new_interval_replaces_job() {
        let f = fixture(StaticProviders::all());
        let c = &f.controller;
        c.schedule_job(SchedulerCommand::Start, JOB_POSTPROCESS);
        c.registry().set_int("SCAN_INTERVAL", 20);

        assert_eq!(
            c.schedule_job(SchedulerCommand::Restart, JOB_POSTPROCESS),
            ScheduleOutcome::Restarted
        );
        assert_eq!(
            c.jobs().interval(JOB_POSTPROCESS),
            Some(Duration::from_secs(1200))
        );
    }

    #[tokio::test]
    async fn restart_of_absent_job_starts_it() {
        let f = fixture(StaticProviders::all());
        assert_eq!(
            f.controller
                .schedule_job(SchedulerCommand::Restart, JOB_VERSION_CHECK),
            ScheduleOutcome::Started
        );
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let f = fixture(StaticProviders::all());
        let c = &f.controller;
        c.schedule_job(SchedulerCommand::Start, JOB_BACKUP);
        assert_eq!(
            c.schedule_job(SchedulerCommand::Stop, JOB_BACKUP),
            ScheduleOutcome::Stopped
        );
        assert_eq!(
            c.schedule_job(SchedulerCommand::Stop, JOB_BACKUP),
            ScheduleOutcome::NotRunning
        );
    }

    #[tokio::test]
    async fn stop_flag_suppresses_until_start_now() {
        let f = fixture(StaticProviders::all());
        let c = &f.controller;
        c.request_stop();
        assert_eq!(
            c.schedule_job(SchedulerCommand::Start, JOB_CLEAN_CACHE),
            ScheduleOutcome::Suppressed
        );
        assert_eq!(
            c.schedule_job(SchedulerCommand::StartNow, JOB_CLEAN_CACHE),
            ScheduleOutcome::Started
        );
        assert!(!c.is_stopping());
        // Interval keeps the configured value; only the first run is early.
        assert_eq!(
            c.jobs().interval(JOB_CLEAN_CACHE),
            Some(Duration::from_secs(30 * 86_400))
        );
        let next = c.jobs().next_run(JOB_CLEAN_CACHE).unwrap();
        assert!(next <= Utc::now() + TimeDelta::seconds(61));
    }

    #[tokio::test]
    async fn first_run_follows_last_finish() {
        let f = fixture(StaticProviders::all());
        f.history.record_finish("POSTPROCESS", Utc::now());
        f.controller
            .schedule_job(SchedulerCommand::Start, JOB_POSTPROCESS);
        let next = f.controller.jobs().next_run(JOB_POSTPROCESS).unwrap();
        assert!(next > Utc::now() + TimeDelta::minutes(9));
    }

    // ── Bulk commands ──

    #[tokio::test]
    async fn restart_jobs_stop_sets_flag() {
        let f = fixture(StaticProviders::all());
        let c = &f.controller;
        c.restart_jobs(SchedulerCommand::Start);
        assert!(c.jobs().len() >= 10);

        c.restart_jobs(SchedulerCommand::Stop);
        assert!(c.jobs().is_empty());
        assert!(c.is_stopping());

        c.restart_jobs(SchedulerCommand::Restart);
        assert!(!c.is_stopping());
        assert!(!c.jobs().is_empty());
    }

    #[tokio::test]
    async fn reschedule_after_save_stops_disabled_jobs() {
        let f = fixture(StaticProviders::all());
        let c = &f.controller;
        c.schedule_job(SchedulerCommand::Start, JOB_POSTPROCESS);
        c.registry().set_int("SCAN_INTERVAL", 0);
        c.reschedule_after_save();
        assert!(!c.jobs().contains(JOB_POSTPROCESS));
        assert!(c.jobs().contains(JOB_BACKUP));
    }

    #[tokio::test]
    async fn ensure_running_clears_flag() {
        let f = fixture(StaticProviders::all());
        f.controller.request_stop();
        assert_eq!(
            f.controller.ensure_running(JOB_BACKUP),
            ScheduleOutcome::Started
        );
        assert_eq!(
            f.controller.ensure_running(JOB_BACKUP),
            ScheduleOutcome::AlreadyScheduled
        );
    }

    // ── Consistency sweep ──

    #[tokio::test]
    async fn sweep_starts_jobs_for_pending_work() {
        let providers = StaticProviders {
            search: true,
            ..StaticProviders::none()
        };
        let f = fixture(providers);
        f.backlog.set_pending(PendingCounts {
            snatched: 1,
            seeding: 0,
            wanted: 3,
        });
        f.controller.check_running_jobs();

        let jobs = f.controller.jobs();
        assert!(jobs.contains(JOB_POSTPROCESS));
        assert!(jobs.contains(JOB_SEARCH_BOOK));
        assert!(!jobs.contains(JOB_SEARCH_RSS));
        assert!(!jobs.contains(JOB_SEARCH_WISHLIST));
        assert!(jobs.contains(JOB_SEARCH_MAGAZINES));
        assert!(jobs.contains(JOB_SEARCH_COMICS));
        assert!(jobs.contains(JOB_AUTHOR_UPDATE));
        assert!(jobs.contains(JOB_SERIES_UPDATE));
    }

    #[tokio::test]
    async fn sweep_stops_searches_without_wanted_items() {
        let f = fixture(StaticProviders::all());
        let c = &f.controller;
        c.schedule_job(SchedulerCommand::Start, JOB_SEARCH_BOOK);
        c.schedule_job(SchedulerCommand::Start, JOB_SEARCH_RSS);
        c.check_running_jobs();
        assert!(!c.jobs().contains(JOB_SEARCH_BOOK));
        assert!(!c.jobs().contains(JOB_SEARCH_RSS));
        assert!(!c.jobs().contains(JOB_POSTPROCESS));
        assert!(c.jobs().contains(JOB_SEARCH_WISHLIST));
    }

    // ── Backlog refresh ──

    #[tokio::test]
    async fn refresh_overdue_updates_stalest_and_restarts() {
        let f = fixture(StaticProviders::all());
        f.backlog
            .set_status(BacklogKind::Author, author_backlog(2, 5));

        let msg = f.controller.refresh_overdue(BacklogKind::Author, true);
        assert_eq!(msg, "Updated author Ursula K. Le Guin");
        assert_eq!(
            f.backlog.refreshed(),
            vec![(BacklogKind::Author, "A1".to_owned())]
        );
        assert!(f.history.last_finish("AUTHORUPDATE").is_some());
        assert!(f.controller.jobs().contains(JOB_AUTHOR_UPDATE));
    }

    #[tokio::test]
    async fn refresh_overdue_reports_nothing_due() {
        let f = fixture(StaticProviders::all());
        f.backlog
            .set_status(BacklogKind::Author, author_backlog(0, 5));
        let msg = f.controller.refresh_overdue(BacklogKind::Author, false);
        assert_eq!(
            msg,
            "Oldest author info (Ursula K. Le Guin) is 40 days old, no update due"
        );
        assert!(f.backlog.refreshed().is_empty());
        assert!(!f.controller.jobs().contains(JOB_AUTHOR_UPDATE));
    }

    #[tokio::test]
    async fn refresh_overdue_without_entities_does_not_restart() {
        let f = fixture(StaticProviders::all());
        let msg = f.controller.refresh_overdue(BacklogKind::Series, true);
        assert_eq!(msg, "There are no monitored series entries");
        assert!(!f.controller.jobs().contains(JOB_SERIES_UPDATE));
    }

    #[tokio::test]
    async fn refresh_all_honours_stop_flag() {
        let f = fixture(StaticProviders::all());
        let ids = vec!["S1".to_owned(), "S2".to_owned(), "S3".to_owned()];
        f.backlog.set_monitored(BacklogKind::Series, ids);

        assert_eq!(f.controller.refresh_all(BacklogKind::Series), 3);
        f.controller.request_stop();
        assert_eq!(f.controller.refresh_all(BacklogKind::Series), 0);
        assert_eq!(f.backlog.refreshed().len(), 3);
    }

    // ── Reporting ──

    #[tokio::test]
    async fn job_summaries_cover_every_scheduler() {
        let f = fixture(StaticProviders::all());
        f.controller
            .schedule_job(SchedulerCommand::Start, JOB_POSTPROCESS);
        let lines = f.controller.job_summaries();
        assert_eq!(lines.len(), 11);
        let process = lines
            .iter()
            .find(|l| l.starts_with("Process downloads: Next run in "))
            .unwrap();
        assert!(process.ends_with(" seconds"), "{process}");
        assert!(lines.contains(&"Check for updates: Not scheduled".to_owned()));
    }

    #[tokio::test]
    async fn job_summary_mentions_last_run() {
        let f = fixture(StaticProviders::all());
        f.history
            .record_finish("BACKUP", Utc::now() - TimeDelta::hours(5));
        f.controller.schedule_job(SchedulerCommand::Start, JOB_BACKUP);
        let lines = f.controller.job_summaries();
        let backup = lines
            .iter()
            .find(|l| l.starts_with("Back up config and database"))
            .unwrap();
        assert!(backup.ends_with("(Last run 5 hours ago)"), "{backup}");
    }

    #[tokio::test]
    async fn backlog_summary_text() {
        let f = fixture(StaticProviders::all());
        assert_eq!(
            f.controller.backlog_summary(BacklogKind::Author),
            "No monitored author entries"
        );
        f.backlog
            .set_status(BacklogKind::Author, author_backlog(3, 40));
        assert_eq!(
            f.controller.backlog_summary(BacklogKind::Author),
            "Oldest author info (Ursula K. Le Guin) is 40 days old; 3 of 40 overdue"
        );
    }
}

//! Live periodic jobs on the tokio runtime.
//!
//! Each job is a spawned task that sleeps until its next fire time, advances
//! the fire time by the interval and runs its callback on a blocking thread.
//! A job never overlaps itself: if the previous run is still in flight when
//! the next one comes due, that fire is skipped.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::tasks::JobCallback;

type InFlightSet = Arc<Mutex<HashSet<String>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn after(start: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(interval)
        .ok()
        .and_then(|d| start.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Marks a job as running until dropped.
struct InFlight {
    name: String,
    set: InFlightSet,
}

impl InFlight {
    fn begin(set: &InFlightSet, name: &str) -> Option<Self> {
        if !lock(set).insert(name.to_owned()) {
            return None;
        }
        Some(Self {
            name: name.to_owned(),
            set: Arc::clone(set),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.name);
    }
}

struct JobEntry {
    interval: Duration,
    next_run: Arc<Mutex<DateTime<Utc>>>,
    handle: JoinHandle<()>,
}

/// Point-in-time view of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub name: String,
    pub interval: Duration,
    pub next_run: DateTime<Utc>,
    pub running: bool,
}

/// Set of live jobs keyed by schedule name.
pub struct JobRegistry {
    runtime: Handle,
    jobs: Mutex<HashMap<String, JobEntry>>,
    in_flight: InFlightSet,
}

impl JobRegistry {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            jobs: Mutex::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start a job that first fires at `first_run` and then every `interval`.
    ///
    /// Returns `false` without changing anything if a job with this name is
    /// already live.
    pub fn add_job(
        &self,
        name: &str,
        interval: Duration,
        first_run: DateTime<Utc>,
        callback: JobCallback,
    ) -> bool {
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(name) {
            return false;
        }
        let next_run = Arc::new(Mutex::new(first_run));
        let handle = self.runtime.spawn(run_job(
            name.to_owned(),
            interval,
            Arc::clone(&next_run),
            callback,
            Arc::clone(&self.in_flight),
        ));
        jobs.insert(
            name.to_owned(),
            JobEntry {
                interval,
                next_run,
                handle,
            },
        );
        true
    }

    /// Stop a job. A run already in progress finishes on its own.
    pub fn remove_job(&self, name: &str) -> bool {
        match lock(&self.jobs).remove(name) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.jobs).contains_key(name)
    }

    pub fn interval(&self, name: &str) -> Option<Duration> {
        lock(&self.jobs).get(name).map(|e| e.interval)
    }

    pub fn next_run(&self, name: &str) -> Option<DateTime<Utc>> {
        lock(&self.jobs).get(name).map(|e| *lock(&e.next_run))
    }

    /// Whether the job's callback is executing right now.
    pub fn is_running(&self, name: &str) -> bool {
        lock(&self.in_flight).contains(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.jobs).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        lock(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.jobs).is_empty()
    }

    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let jobs = lock(&self.jobs);
        let mut out: Vec<JobSnapshot> = jobs
            .iter()
            .map(|(name, entry)| JobSnapshot {
                name: name.clone(),
                interval: entry.interval,
                next_run: *lock(&entry.next_run),
                running: self.is_running(name),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Stop every job.
    pub fn shutdown(&self) {
        let mut jobs = lock(&self.jobs);
        for (name, entry) in jobs.drain() {
            debug!("stopping job {name}");
            entry.handle.abort();
        }
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}

async fn run_job(
    name: String,
    interval: Duration,
    next_run: Arc<Mutex<DateTime<Utc>>>,
    callback: JobCallback,
    in_flight: InFlightSet,
) {
    loop {
        let due = *lock(&next_run);
        let wait = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        *lock(&next_run) = after(Utc::now(), interval);

        let Some(guard) = InFlight::begin(&in_flight, &name) else {
            debug!("job {name} still running, skipping this run");
            continue;
        };
        debug!("running job {name}");
        let cb = Arc::clone(&callback);
        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            cb();
        })
        .await;
        if let Err(e) = result {
            error!("job {name} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback() -> (JobCallback, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let cb: JobCallback = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (cb, hits)
    }

    async fn wait_for(hits: &AtomicUsize, at_least: usize) {
        for _ in 0..200 {
            if hits.load(Ordering::SeqCst) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        unreachable!("callback never reached {at_least} runs");
    }

    #[tokio::test]
    async fn due_job_fires_and_advances() {
        let jobs = JobRegistry::new(Handle::current());
        let (cb, hits) = counting_callback();
        let interval = Duration::from_secs(3600);
        assert!(jobs.add_job("backup", interval, Utc::now(), cb));

        wait_for(&hits, 1).await;
        let next = jobs.next_run("backup").unwrap();
        assert!(next > Utc::now() + TimeDelta::minutes(59));
        assert_eq!(jobs.interval("backup"), Some(interval));
    }

    #[tokio::test]
    async fn future_job_does_not_fire() {
        let jobs = JobRegistry::new(Handle::current());
        let (cb, hits) = counting_callback();
        let first = Utc::now() + TimeDelta::hours(1);
        jobs.add_job("clean_cache", Duration::from_secs(86_400), first, cb);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(jobs.next_run("clean_cache"), Some(first));
    }

    #[tokio::test]
    async fn duplicate_add_is_rejected() {
        let jobs = JobRegistry::new(Handle::current());
        let (cb, _) = counting_callback();
        let later = Utc::now() + TimeDelta::hours(1);
        assert!(jobs.add_job("backup", Duration::from_secs(60), later, cb.clone()));
        assert!(!jobs.add_job("backup", Duration::from_secs(120), later, cb));
        assert_eq!(jobs.interval("backup"), Some(Duration::from_secs(60)));
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn remove_stops_job() {
        let jobs = JobRegistry::new(Handle::current());
        let (cb, _) = counting_callback();
        let later = Utc::now() + TimeDelta::hours(1);
        jobs.add_job("backup", Duration::from_secs(60), later, cb);

        assert!(jobs.remove_job("backup"));
        assert!(!jobs.contains("backup"));
        assert!(!jobs.remove_job("backup"));
        assert!(jobs.next_run("backup").is_none());
    }

    #[tokio::test]
    async fn shutdown_clears_all() {
        let jobs = JobRegistry::new(Handle::current());
        let later = Utc::now() + TimeDelta::hours(1);
        for name in ["a", "b", "c"] {
            let (cb, _) = counting_callback();
            jobs.add_job(name, Duration::from_secs(60), later, cb);
        }
        assert_eq!(jobs.names(), vec!["a", "b", "c"]);
        jobs.shutdown();
        assert!(jobs.is_empty());
    }

    #[test]
    fn in_flight_guard_blocks_overlap() {
        let set: InFlightSet = Arc::new(Mutex::new(HashSet::new()));
        let first = InFlight::begin(&set, "search_book").unwrap();
        assert!(InFlight::begin(&set, "search_book").is_none());
        assert!(InFlight::begin(&set, "search_rss_book").is_some());
        drop(first);
        assert!(InFlight::begin(&set, "search_book").is_some());
    }

    #[tokio::test]
    async fn snapshot_reports_jobs_sorted() {
        let jobs = JobRegistry::new(Handle::current());
        let later = Utc::now() + TimeDelta::hours(2);
        let (cb, _) = counting_callback();
        jobs.add_job("series_update", Duration::from_secs(300), later, cb.clone());
        jobs.add_job("author_update", Duration::from_secs(600), later, cb);

        let snaps = jobs.snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].name, "author_update");
        assert_eq!(snaps[0].interval, Duration::from_secs(600));
        assert_eq!(snaps[1].next_run, later);
        assert!(!snaps[1].running);
    }

    /// Callback that sleeps for `busy` and records the most runs ever seen
    /// in flight at once.
    fn slow_callback(busy: Duration) -> (JobCallback, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let (peak_out, runs_out) = (Arc::clone(&peak), Arc::clone(&runs));
        let cb: JobCallback = Arc::new(move || {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(busy);
            active.fetch_sub(1, Ordering::SeqCst);
            runs.fetch_add(1, Ordering::SeqCst);
        });
        (cb, peak_out, runs_out)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_job_never_overlaps_itself() {
        let jobs = JobRegistry::new(Handle::current());
        let (cb, peak, runs) = slow_callback(Duration::from_millis(60));
        jobs.add_job("postprocess", Duration::from_millis(5), Utc::now(), cb);

        wait_for(&runs, 3).await;
        jobs.shutdown();
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn restart_mid_run_waits_for_the_old_run() {
        let jobs = JobRegistry::new(Handle::current());
        let (cb, peak, runs) = slow_callback(Duration::from_millis(150));
        jobs.add_job("search_book", Duration::from_secs(3600), Utc::now(), cb.clone());
        for _ in 0..200 {
            if jobs.is_running("search_book") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(jobs.is_running("search_book"));

        assert!(jobs.remove_job("search_book"));
        assert!(jobs.add_job("search_book", Duration::from_millis(10), Utc::now(), cb));
        wait_for(&runs, 2).await;
        jobs.shutdown();
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}

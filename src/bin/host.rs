//! Headless scheduler host.
//!
//! Loads the config document, starts every scheduler job and runs the
//! consistency sweep every five minutes. On Ctrl-C the jobs are stopped and
//! the config is saved, keeping the previous file as `.bak`.
//!
//! Job targets here only log that they fired; a full deployment registers the
//! real search, post-processing and backup routines instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shelfkeeper::config::{ConfigRegistry, load_config, lock_item, save_config_and_backup_old};
use shelfkeeper::scheduler::tasks::{TARGET_REFRESH_AUTHOR, TARGET_REFRESH_SERIES};
use shelfkeeper::scheduler::{ProviderStatus, SchedulerCommand, SchedulerController, TargetTable};
use tracing::{debug, info};

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

const USAGE: &str = "usage: shelfkeeper-host [--config <path>]";

/// Provider availability read from the provider arrays in the config.
struct ConfigProviders {
    registry: Arc<ConfigRegistry>,
}

impl ConfigProviders {
    fn any_enabled(&self, array: &str) -> bool {
        self.registry
            .array_in_use(array)
            .into_iter()
            .any(|i| self.registry.get_array_str(array, i, "ENABLED") == "1")
    }
}

impl ProviderStatus for ConfigProviders {
    fn search_available(&self) -> bool {
        self.any_enabled("NEWZNAB") || self.any_enabled("TORZNAB")
    }

    fn rss_available(&self) -> bool {
        self.any_enabled("RSS")
    }

    fn wishlist_available(&self) -> bool {
        false
    }
}

fn parse_args() -> anyhow::Result<PathBuf> {
    let mut args = std::env::args().skip(1);
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}\n{USAGE}"),
        }
    }
    Ok(config.unwrap_or_else(shelfkeeper::shelf_dirs::config_file))
}

/// One logging target per scheduler item, leaving the refresh targets to the
/// controller.
fn logging_targets(registry: &ConfigRegistry) -> TargetTable {
    let mut targets = TargetTable::new();
    for item in registry.get_schedulers() {
        let descriptor = {
            let guard = lock_item(&item);
            guard.schedule().cloned()
        };
        let Some(descriptor) = descriptor else {
            continue;
        };
        if descriptor.target == TARGET_REFRESH_AUTHOR || descriptor.target == TARGET_REFRESH_SERIES
        {
            continue;
        }
        let friendly = descriptor.friendly_name.clone();
        targets.register(&descriptor.target, move || {
            info!("{friendly}: job fired");
        });
    }
    targets
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shelfkeeper=info")),
        )
        .init();

    let path = parse_args()?;
    info!("shelfkeeper-host starting with {}", path.display());

    let registry = Arc::new(ConfigRegistry::with_defaults()?);
    let loaded = load_config(&registry, &path)
        .with_context(|| format!("cannot load {}", path.display()))?;
    info!("loaded {loaded} settings");

    let controller = SchedulerController::builder(Arc::clone(&registry))
        .with_targets(logging_targets(&registry))
        .with_providers(Arc::new(ConfigProviders {
            registry: Arc::clone(&registry),
        }))
        .build(tokio::runtime::Handle::current());
    controller.restart_jobs(SchedulerCommand::Start);
    info!("scheduler started with {} jobs", controller.jobs().len());

    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = sweep.tick() => {
                controller.check_running_jobs();
                for line in controller.job_summaries() {
                    debug!("{line}");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("cannot listen for Ctrl-C")?;
                break;
            }
        }
    }

    controller.shutdown();
    let saved = save_config_and_backup_old(&registry, &path, false)
        .with_context(|| format!("cannot save {}", path.display()))?;
    info!("saved {saved} settings, shelfkeeper-host shut down cleanly");
    Ok(())
}

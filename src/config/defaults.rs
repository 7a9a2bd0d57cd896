//! Built-in setting definitions.

use super::array::ArrayDef;
use super::item::{ConfigItem, ScheduleDescriptor, TimeUnit};
use crate::error::Result;
use crate::scheduler::tasks::{
    JOB_AUTHOR_UPDATE, JOB_BACKUP, JOB_CLEAN_CACHE, JOB_POSTPROCESS, JOB_SEARCH_BOOK,
    JOB_SEARCH_COMICS, JOB_SEARCH_MAGAZINES, JOB_SEARCH_RSS, JOB_SEARCH_WISHLIST,
    JOB_SERIES_UPDATE, JOB_VERSION_CHECK,
};

/// Days cached metadata stays valid; also paces author and series refresh.
pub const CACHE_AGE: &str = "CACHE_AGE";
/// Days between config and database backups.
pub const BACKUP_DAYS: &str = "BACKUP_DAYS";

/// Upper bound for the day counts above.
pub const MAX_RETENTION_DAYS: i64 = 3650;

/// Live database handle.
pub const DB_CONNECTION: &str = "DB_CONNECTION";

fn scheduler(
    key: &str,
    default: i64,
    name: &str,
    run_name: &str,
    target: &str,
    unit: TimeUnit,
    friendly: &str,
) -> Result<ConfigItem> {
    ConfigItem::scheduler(
        "SearchScan",
        key,
        default,
        ScheduleDescriptor::new(name, run_name, target, unit).with_friendly_name(friendly),
    )
}

fn provider_scheduler(
    key: &str,
    default: i64,
    name: &str,
    run_name: &str,
    target: &str,
    unit: TimeUnit,
    friendly: &str,
) -> Result<ConfigItem> {
    ConfigItem::scheduler(
        "SearchScan",
        key,
        default,
        ScheduleDescriptor::new(name, run_name, target, unit)
            .with_friendly_name(friendly)
            .needing_provider(),
    )
}

/// Flat settings.
pub fn base_items() -> Result<Vec<ConfigItem>> {
    Ok(vec![
        // General
        ConfigItem::ranged_int("General", "LOGLEVEL", 1, 0, 3)?,
        ConfigItem::folder("General", "LOGDIR", ""),
        ConfigItem::int("General", "LOGLIMIT", 500),
        ConfigItem::ranged_int("General", CACHE_AGE, 30, 0, MAX_RETENTION_DAYS)?,
        ConfigItem::ranged_int("General", BACKUP_DAYS, 7, 0, MAX_RETENTION_DAYS)?,
        ConfigItem::int("General", "TASK_AGE", 2),
        ConfigItem::csv("General", "EBOOK_TYPE", "epub, mobi, pdf")?,
        ConfigItem::csv("General", "AUDIOBOOK_TYPE", "mp3, m4b")?,
        ConfigItem::email("General", "ADMIN_EMAIL", "")?,
        ConfigItem::boolean("General", "LAUNCH_BROWSER", true),
        // Web server
        ConfigItem::string("WebServer", "HTTP_HOST", "0.0.0.0"),
        ConfigItem::ranged_int("WebServer", "HTTP_PORT", 5299, 21, 65535)?,
        ConfigItem::string("WebServer", "HTTP_ROOT", ""),
        ConfigItem::lowercase_string("WebServer", "HTTP_LOOK", "bookstrap"),
        ConfigItem::string("WebServer", "API_KEY", ""),
        ConfigItem::boolean("WebServer", "API_ENABLED", false),
        ConfigItem::url("WebServer", "HTTP_EXT_URL", "")?,
        // Files
        ConfigItem::folder("PostProcess", "EBOOK_DEST_FOLDER", "$Author/$Title"),
        ConfigItem::folder("PostProcess", "DOWNLOAD_DIR", ""),
        ConfigItem::permission("FileMgmt", "DIR_PERM", "0o755")?,
        ConfigItem::permission("FileMgmt", "FILE_PERM", "0o644")?,
        // Jobs
        provider_scheduler(
            "SEARCH_BOOKINTERVAL",
            360,
            JOB_SEARCH_BOOK,
            "SEARCHALLBOOKS",
            "search.book",
            TimeUnit::Min,
            "Search for books",
        )?,
        provider_scheduler(
            "SEARCHRSS_INTERVAL",
            20,
            JOB_SEARCH_RSS,
            "SEARCHALLRSS",
            "search.rss_book",
            TimeUnit::Min,
            "Search RSS feeds",
        )?,
        provider_scheduler(
            "WISHLIST_INTERVAL",
            24,
            JOB_SEARCH_WISHLIST,
            "SEARCHWISHLIST",
            "search.wishlist",
            TimeUnit::Hour,
            "Search wishlists",
        )?,
        provider_scheduler(
            "SEARCH_MAGINTERVAL",
            360,
            JOB_SEARCH_MAGAZINES,
            "SEARCHALLMAG",
            "search.magazines",
            TimeUnit::Min,
            "Search for magazines",
        )?,
        provider_scheduler(
            "SEARCH_COMICINTERVAL",
            24,
            JOB_SEARCH_COMICS,
            "SEARCHALLCOMICS",
            "search.comics",
            TimeUnit::Hour,
            "Search for comics",
        )?,
        scheduler(
            "SCAN_INTERVAL",
            10,
            JOB_POSTPROCESS,
            "POSTPROCESS",
            "postprocess.process_dir",
            TimeUnit::Min,
            "Process downloads",
        )?,
        scheduler(
            "VERSIONCHECK_INTERVAL",
            24,
            JOB_VERSION_CHECK,
            "VERSIONCHECK",
            "versioncheck.check",
            TimeUnit::Hour,
            "Check for updates",
        )?,
        scheduler(
            "AUTHORUPDATE_INTERVAL",
            1,
            JOB_AUTHOR_UPDATE,
            "AUTHORUPDATE",
            "refresh.author",
            TimeUnit::Min,
            "Refresh authors",
        )?,
        scheduler(
            "SERIESUPDATE_INTERVAL",
            1,
            JOB_SERIES_UPDATE,
            "SERIESUPDATE",
            "refresh.series",
            TimeUnit::Min,
            "Refresh series",
        )?,
        scheduler(
            "CLEAN_CACHE_INTERVAL",
            1,
            JOB_CLEAN_CACHE,
            "CLEANCACHE",
            "cache.clean",
            TimeUnit::Day,
            "Clean cache",
        )?,
        scheduler(
            "BACKUP_INTERVAL",
            1,
            JOB_BACKUP,
            "BACKUP",
            "backup.run",
            TimeUnit::Day,
            "Back up config and database",
        )?,
        // Runtime handles
        ConfigItem::connection("Database", DB_CONNECTION),
    ])
}

/// Repeated blocks.
pub fn array_defs() -> Result<Vec<ArrayDef>> {
    Ok(vec![
        ArrayDef::new(
            "NEWZNAB",
            "HOST",
            vec![
                ConfigItem::string("", "NAME", ""),
                ConfigItem::string("", "DISPNAME", ""),
                ConfigItem::boolean("", "ENABLED", false),
                ConfigItem::url("", "HOST", "")?,
                ConfigItem::string("", "API", ""),
                ConfigItem::ranged_int("", "DLPRIORITY", 0, 0, 100)?,
                ConfigItem::csv("", "DLTYPES", "E")?,
            ],
        ),
        ArrayDef::new(
            "TORZNAB",
            "HOST",
            vec![
                ConfigItem::string("", "NAME", ""),
                ConfigItem::string("", "DISPNAME", ""),
                ConfigItem::boolean("", "ENABLED", false),
                ConfigItem::url("", "HOST", "")?,
                ConfigItem::string("", "API", ""),
                ConfigItem::int("", "SEEDERS", 0),
                ConfigItem::csv("", "DLTYPES", "E")?,
            ],
        ),
        ArrayDef::new(
            "RSS",
            "HOST",
            vec![
                ConfigItem::string("", "NAME", ""),
                ConfigItem::string("", "DISPNAME", ""),
                ConfigItem::boolean("", "ENABLED", false),
                ConfigItem::url("", "HOST", "")?,
                ConfigItem::lowercase_string("", "LABEL", ""),
            ],
        ),
        ArrayDef::new(
            "APPRISE",
            "URL",
            vec![
                ConfigItem::string("", "NAME", ""),
                ConfigItem::string("", "URL", ""),
                ConfigItem::boolean("", "SNATCH", false),
                ConfigItem::boolean("", "DOWNLOAD", false),
            ],
        ),
    ])
}

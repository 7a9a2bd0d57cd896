//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! # Environment Overrides
//!
//! - `SHELFKEEPER_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Directory holding `config.toml` and its `.bak`/`.new` siblings.
///
/// Resolves to `dirs::config_dir()/shelfkeeper/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SHELFKEEPER_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("shelfkeeper"))
        .unwrap_or_else(|| PathBuf::from("/tmp/shelfkeeper-config"))
}

/// Default config document path.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

//! Config document persistence.
//!
//! The document is TOML with one table per section. Every value is written as
//! a string in the item's save form; on load any scalar is accepted and fed to
//! the item as text. Section and key names are matched case-insensitively.
//!
//! [`save_config_and_backup_old`] rotates files as `.new` → current → `.bak`.
//! The three steps are not atomic as a group: a crash between them can leave a
//! `.bak` and no current file. [`load_config`] reports that case but does not
//! repair it.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::registry::{ConfigRegistry, DocumentSection, lock_item};
use crate::error::{Result, ShelfError};

/// Sibling path with `suffix` appended to the file name.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Path of the staged document written before rotation.
pub fn new_path(path: &Path) -> PathBuf {
    with_suffix(path, ".new")
}

/// Path of the previous document kept after rotation.
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

/// Render the registry as a TOML document.
///
/// Items are emitted when they persist and either `save_all` is set or they
/// differ from their default. Returns the text and the number of items
/// emitted.
pub fn render_document(registry: &ConfigRegistry, save_all: bool) -> (String, usize) {
    let mut doc = toml_edit::DocumentMut::new();
    let mut count = 0;
    for (name, shared) in registry.iter_items() {
        let item = lock_item(&shared);
        if !item.persists() || !(save_all || !item.is_default()) {
            continue;
        }
        if item.section().is_empty() {
            warn!("Not saving {name}: item has no section");
            continue;
        }
        let table = doc
            .entry(item.section())
            .or_insert(toml_edit::table());
        if let Some(table) = table.as_table_mut() {
            table.insert(
                &item.key().to_ascii_lowercase(),
                toml_edit::value(item.get_save_str()),
            );
            count += 1;
        }
    }
    (doc.to_string(), count)
}

/// Parse TOML text into sections of `(key, text value)` pairs.
///
/// # Errors
/// Returns `ShelfError::Persistence` if the text is not valid TOML.
pub fn parse_document(text: &str) -> Result<Vec<DocumentSection>> {
    let table: toml::Table = text
        .parse()
        .map_err(|e| ShelfError::Persistence(format!("failed to parse config document: {e}")))?;
    let mut sections = Vec::new();
    for (section, value) in table {
        let toml::Value::Table(entries) = value else {
            warn!("Ignoring top-level value {section} outside any section");
            continue;
        };
        let mut pairs = Vec::new();
        for (key, value) in entries {
            match scalar_text(&value) {
                Some(text) => pairs.push((key, text)),
                None => warn!("Ignoring non-scalar value {section}.{key}"),
            }
        }
        sections.push((section, pairs));
    }
    Ok(sections)
}

fn scalar_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(true) => Some("True".to_owned()),
        toml::Value::Boolean(false) => Some("False".to_owned()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ShelfError::Persistence(format!(
                    "failed to create config directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }
    }
    let mut file = std::fs::File::create(path).map_err(|e| {
        ShelfError::Persistence(format!("failed to create '{}': {e}", path.display()))
    })?;
    file.write_all(text.as_bytes())
        .map_err(|e| ShelfError::Persistence(format!("failed to write '{}': {e}", path.display())))?;
    file.sync_all()
        .map_err(|e| ShelfError::Persistence(format!("failed to sync '{}': {e}", path.display())))?;
    Ok(())
}

/// Write the registry to `path`. Returns the number of items saved.
///
/// Unused array members are dropped and the rest renumbered before writing;
/// every array gets a fresh spare member afterwards.
///
/// # Errors
/// Returns `ShelfError::Persistence` if the file cannot be written.
pub fn save_config(registry: &ConfigRegistry, path: &Path, save_all: bool) -> Result<usize> {
    registry.cleanup_arrays_for_save();
    let (text, count) = render_document(registry, save_all);
    let result = write_text(path, &text);
    registry.ensure_arrays_have_empty_item();
    result?;
    debug!("Wrote {count} config items to {}", path.display());
    Ok(count)
}

/// Remove a file, treating "not found" as success.
fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Rename, treating a missing source as success.
fn rename_if_present(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Save to `path`, keeping the previous file as `.bak`.
///
/// Writes `.new` first. If nothing was emitted the existing files are left
/// alone and `Ok(0)` is returned. Otherwise the old `.bak` is removed, the
/// current file becomes `.bak` and `.new` becomes current. Failures of the
/// first two steps are logged and the sequence continues; only a failure of
/// the final rename is reported.
///
/// # Errors
/// Returns `ShelfError::Persistence` if `.new` cannot be written and
/// `ShelfError::Io` if it cannot be moved into place.
pub fn save_config_and_backup_old(
    registry: &ConfigRegistry,
    path: &Path,
    save_all: bool,
) -> Result<usize> {
    let staged = new_path(path);
    let backup = backup_path(path);

    let count = save_config(registry, &staged, save_all)?;
    if count == 0 {
        warn!("No config items to save; leaving {} unchanged", path.display());
        if let Err(e) = remove_if_present(&staged) {
            warn!("Could not remove {}: {e}", staged.display());
        }
        return Ok(0);
    }

    if let Err(e) = remove_if_present(&backup) {
        warn!("Could not delete old backup {}: {e}", backup.display());
    }
    if let Err(e) = rename_if_present(path, &backup) {
        warn!(
            "Could not rename {} to {}: {e}",
            path.display(),
            backup.display()
        );
    }
    std::fs::rename(&staged, path).map_err(|e| {
        error!(
            "Could not rename {} to {}: {e}",
            staged.display(),
            path.display()
        );
        e
    })?;
    info!("Config file {} saved with {count} items", path.display());
    Ok(count)
}

/// Load `path` into the registry. Returns the number of sections read.
///
/// A missing file leaves the registry at its defaults. When only a `.bak`
/// remains (an interrupted rotation) the condition is logged and nothing is
/// loaded.
///
/// # Errors
/// Returns `ShelfError::Persistence` if the file exists but cannot be read
/// or parsed.
pub fn load_config(registry: &ConfigRegistry, path: &Path) -> Result<usize> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let backup = backup_path(path);
            if backup.exists() {
                warn!(
                    "Config file {} is missing but {} exists; using defaults",
                    path.display(),
                    backup.display()
                );
            } else {
                debug!("No config file at {}; using defaults", path.display());
            }
            return Ok(0);
        }
        Err(e) => {
            return Err(ShelfError::Persistence(format!(
                "failed to read config file '{}': {e}",
                path.display()
            )));
        }
    };
    let sections = parse_document(&text)?;
    registry.load_sections(&sections);
    info!("Loaded {} config sections from {}", sections.len(), path.display());
    Ok(sections.len())
}

//! Typed configuration registry.
//!
//! Settings are strongly-typed, self-validating items that count every read
//! and write. Some items double as descriptors for periodic jobs.
//!
//! # Architecture
//!
//! - **item**: `ConfigItem`, the closed set of item kinds and their rules
//! - **access**: per-item access counters
//! - **keymap**: case-insensitive ordered map used by every container
//! - **validate**: email, CSV, URL, permission and folder rules
//! - **array**: repeated sections (providers, notifiers)
//! - **registry**: `ConfigRegistry`, typed lookup, loading, equivalence
//! - **persist**: TOML save/load with `.new`/`.bak` rotation
//! - **defaults**: built-in definitions
//!
//! # Quick Start
//!
//! ```
//! use shelfkeeper::config::ConfigRegistry;
//!
//! let registry = ConfigRegistry::with_defaults().expect("defaults are valid");
//! assert_eq!(registry.get_int("CACHE_AGE"), 30);
//! assert!(registry.set_int("cache_age", 10));
//! assert_eq!(registry.get_int("Cache_Age"), 10);
//! ```

pub mod access;
pub mod array;
pub mod defaults;
pub mod item;
pub mod keymap;
pub mod persist;
pub mod registry;
pub mod validate;

pub use access::{Access, AccessCounter};
pub use array::{ArrayDef, ArrayGroup};
pub use item::{
    ChangeReason, ConfigItem, ConnectionHandle, ItemKind, OnChange, PendingChange,
    ScheduleDescriptor, TimeUnit, hour_min_interval,
};
pub use persist::{load_config, save_config, save_config_and_backup_old};
pub use registry::{ConfigRegistry, FlatItems, SharedItem, lock_item, write_item};

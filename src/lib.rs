//! Shelfkeeper: typed configuration registry and adaptive job scheduler for a
//! library manager.
//!
//! Settings are strongly-typed, self-validating items that count every access
//! and persist to a TOML document with crash-tolerant backup rotation. Some
//! settings double as descriptors for background jobs whose interval follows
//! the refresh backlog.
//!
//! # Architecture
//!
//! - **config**: `ConfigItem`, `ConfigRegistry`, array groups, persistence
//! - **scheduler**: `SchedulerController`, live jobs, backlog interfaces
//! - **error**: `ShelfError` with stable error codes
//! - **shelf_dirs**: platform config and cache directories

pub mod config;
pub mod error;
pub mod scheduler;
pub mod shelf_dirs;

pub use config::{ConfigItem, ConfigRegistry};
pub use error::{Result, ShelfError};
pub use scheduler::{SchedulerCommand, SchedulerController};

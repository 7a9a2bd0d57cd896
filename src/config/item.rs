//! Typed configuration items.
//!
//! A [`ConfigItem`] owns one setting: its kind, default, current value and
//! access counters. Every accessor records an [`Access`] outcome. Writes that
//! fail validation, or that use an accessor the kind does not support, are
//! rejected and counted; the stored value never holds an invalid value.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::access::{Access, AccessCounter};
use super::keymap::normalize_key;
use super::validate;
use crate::error::{Result, ShelfError};

/// Bounds for scheduler intervals.
pub const SCHEDULER_MIN: i64 = 0;
pub const SCHEDULER_MAX: i64 = 100_000;

/// Shortest interval a job may run at, in minutes.
pub const MIN_INTERVAL_MINUTES: i64 = 5;

/// Minute values above this are expressed in whole hours.
const MINUTES_AS_HOURS_THRESHOLD: i64 = 600;

/// Opaque handle stored by connection items.
pub type ConnectionHandle = Arc<dyn Any + Send + Sync>;

/// Callback fired after a value-changing write.
///
/// Receives the new value in its save form. Registry writes fire the hook
/// after releasing the item's lock, so the hook may read the registry again.
pub type OnChange = Arc<dyn Fn(&str, ChangeReason) + Send + Sync>;

/// Why an on-change hook fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    /// A setter or UI write.
    Setting,
    /// A value read from a config document.
    Loading,
}

/// An on-change call held back until the item is unlocked.
pub struct PendingChange {
    hook: OnChange,
    value: String,
    reason: ChangeReason,
}

impl PendingChange {
    pub fn fire(self) {
        (self.hook)(&self.value, self.reason);
    }
}

impl fmt::Debug for PendingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingChange")
            .field("value", &self.value)
            .field("reason", &self.reason)
            .finish()
    }
}

/// Unit of a scheduler item's interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Min,
    Hour,
    Day,
}

impl TimeUnit {
    pub fn label(self) -> &'static str {
        match self {
            TimeUnit::Min => "minutes",
            TimeUnit::Hour => "hours",
            TimeUnit::Day => "days",
        }
    }
}

/// Identity of the periodic job a scheduler item describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleDescriptor {
    /// Name used to look the job up (`search_book`, `clean_cache`).
    pub schedule_name: String,
    /// Name the job runs under in job history.
    pub run_name: String,
    /// Fully-qualified reference resolved through the target table.
    pub target: String,
    /// Human-readable name for summaries.
    pub friendly_name: String,
    /// Only runnable while a search provider is configured.
    pub needs_provider: bool,
    pub unit: TimeUnit,
}

impl ScheduleDescriptor {
    pub fn new(schedule_name: &str, run_name: &str, target: &str, unit: TimeUnit) -> Self {
        Self {
            schedule_name: schedule_name.to_owned(),
            run_name: run_name.to_owned(),
            target: target.to_owned(),
            friendly_name: schedule_name.to_owned(),
            needs_provider: false,
            unit,
        }
    }

    pub fn with_friendly_name(mut self, name: &str) -> Self {
        self.friendly_name = name.to_owned();
        self
    }

    pub fn needing_provider(mut self) -> Self {
        self.needs_provider = true;
        self
    }
}

/// Convert an interval to `(hours, minutes)`, floored at five minutes.
pub fn hour_min_interval(value: i64, unit: TimeUnit) -> (i64, i64) {
    let (hours, minutes) = match unit {
        TimeUnit::Day => (value.saturating_mul(24), 0),
        TimeUnit::Hour => (value, 0),
        TimeUnit::Min if value <= MINUTES_AS_HOURS_THRESHOLD => (0, value),
        TimeUnit::Min => (value / 60, 0),
    };
    if hours.saturating_mul(60).saturating_add(minutes) < MIN_INTERVAL_MINUTES {
        (0, MIN_INTERVAL_MINUTES)
    } else {
        (hours, minutes)
    }
}

/// The closed set of item kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Str { force_lower: bool },
    Int,
    RangedInt { min: i64, max: i64 },
    Bool,
    Email,
    Csv,
    Url,
    Folder,
    Permission,
    Scheduler(ScheduleDescriptor),
    Connection,
}

impl ItemKind {
    pub fn name(&self) -> &'static str {
        match self {
            ItemKind::Str { .. } => "str",
            ItemKind::Int => "int",
            ItemKind::RangedInt { .. } => "ranged-int",
            ItemKind::Bool => "bool",
            ItemKind::Email => "email",
            ItemKind::Csv => "csv",
            ItemKind::Url => "url",
            ItemKind::Folder => "folder",
            ItemKind::Permission => "permission",
            ItemKind::Scheduler(_) => "scheduler",
            ItemKind::Connection => "connection",
        }
    }

    fn holds_text(&self) -> bool {
        matches!(
            self,
            ItemKind::Str { .. } | ItemKind::Email | ItemKind::Csv | ItemKind::Url | ItemKind::Folder
        )
    }

    fn holds_int(&self) -> bool {
        matches!(
            self,
            ItemKind::Int | ItemKind::RangedInt { .. } | ItemKind::Scheduler(_) | ItemKind::Permission
        )
    }
}

/// Stored value. The variant always matches the item's kind.
#[derive(Clone)]
enum Value {
    Text(String),
    Int(i64),
    Bool(bool),
    Handle(Option<ConnectionHandle>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Handle(a), Value::Handle(b)) => match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Handle(Some(_)) => write!(f, "<connection>"),
            Value::Handle(None) => write!(f, "<none>"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// One typed setting.
#[derive(Clone)]
pub struct ConfigItem {
    section: String,
    key: String,
    kind: ItemKind,
    default: Value,
    value: Value,
    accesses: AccessCounter,
    persist: bool,
    /// Consumed by the first successful write; that write counts as a creation.
    is_new: bool,
    /// Relative folder text as loaded, written back unchanged.
    verbatim: Option<String>,
    on_change: Option<OnChange>,
    /// Set by a value-changing write until taken with `take_change`.
    pending: Option<ChangeReason>,
}

impl fmt::Debug for ConfigItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigItem")
            .field("name", &self.get_full_name())
            .field("kind", &self.kind.name())
            .field("value", &self.value)
            .field("default", &self.default)
            .field("persist", &self.persist)
            .finish()
    }
}

impl ConfigItem {
    fn build(section: &str, key: &str, kind: ItemKind, default: Value) -> Self {
        Self {
            section: normalize_key(section),
            key: normalize_key(key),
            kind,
            value: default.clone(),
            default,
            accesses: AccessCounter::default(),
            persist: true,
            is_new: false,
            verbatim: None,
            on_change: None,
            pending: None,
        }
    }

    fn checked(self) -> Result<Self> {
        if self.is_valid(&self.default) {
            Ok(self)
        } else {
            Err(ShelfError::Config(format!(
                "invalid default {} for {} item {}",
                self.default,
                self.kind.name(),
                self.get_full_name()
            )))
        }
    }

    // ── Constructors ──

    pub fn string(section: &str, key: &str, default: &str) -> Self {
        Self::build(
            section,
            key,
            ItemKind::Str { force_lower: false },
            Value::Text(default.to_owned()),
        )
    }

    /// A string item whose written values are lower-cased. The default is
    /// kept as given.
    pub fn lowercase_string(section: &str, key: &str, default: &str) -> Self {
        Self::build(
            section,
            key,
            ItemKind::Str { force_lower: true },
            Value::Text(default.to_owned()),
        )
    }

    pub fn int(section: &str, key: &str, default: i64) -> Self {
        Self::build(section, key, ItemKind::Int, Value::Int(default))
    }

    pub fn ranged_int(section: &str, key: &str, default: i64, min: i64, max: i64) -> Result<Self> {
        Self::build(
            section,
            key,
            ItemKind::RangedInt { min, max },
            Value::Int(default),
        )
        .checked()
    }

    pub fn boolean(section: &str, key: &str, default: bool) -> Self {
        Self::build(section, key, ItemKind::Bool, Value::Bool(default))
    }

    pub fn email(section: &str, key: &str, default: &str) -> Result<Self> {
        Self::build(section, key, ItemKind::Email, Value::Text(default.to_owned())).checked()
    }

    pub fn csv(section: &str, key: &str, default: &str) -> Result<Self> {
        Self::build(section, key, ItemKind::Csv, Value::Text(default.to_owned())).checked()
    }

    pub fn url(section: &str, key: &str, default: &str) -> Result<Self> {
        Self::build(section, key, ItemKind::Url, Value::Text(default.to_owned())).checked()
    }

    pub fn folder(section: &str, key: &str, default: &str) -> Self {
        Self::build(
            section,
            key,
            ItemKind::Folder,
            Value::Text(validate::to_native_separators(default)),
        )
    }

    /// Permission item with an `0oNNN` default.
    pub fn permission(section: &str, key: &str, default: &str) -> Result<Self> {
        let value = validate::parse_permission(default).ok_or_else(|| {
            ShelfError::Config(format!(
                "invalid default {default} for permission item {}.{}",
                normalize_key(section),
                normalize_key(key)
            ))
        })?;
        Self::build(section, key, ItemKind::Permission, Value::Int(value)).checked()
    }

    /// Scheduler item. Fails if the descriptor has no schedule name.
    pub fn scheduler(
        section: &str,
        key: &str,
        default: i64,
        descriptor: ScheduleDescriptor,
    ) -> Result<Self> {
        if descriptor.schedule_name.trim().is_empty() {
            return Err(ShelfError::Config(format!(
                "scheduler {}.{} has an empty schedule name",
                normalize_key(section),
                normalize_key(key)
            )));
        }
        Self::build(
            section,
            key,
            ItemKind::Scheduler(descriptor),
            Value::Int(default),
        )
        .checked()
    }

    /// Holder for a live connection handle. Never persisted.
    pub fn connection(section: &str, key: &str) -> Self {
        let mut item = Self::build(section, key, ItemKind::Connection, Value::Handle(None));
        item.persist = false;
        item
    }

    /// Placeholder created for a write to an unknown key. Its kind follows the
    /// setter that created it.
    pub(crate) fn vivified(key: &str, kind: ItemKind) -> Self {
        let default = match kind {
            ItemKind::Bool => Value::Bool(false),
            ItemKind::Connection => Value::Handle(None),
            _ if kind.holds_int() => Value::Int(0),
            _ => Value::Text(String::new()),
        };
        let mut item = Self::build("", key, kind, default);
        item.persist = false;
        item.is_new = true;
        item
    }

    /// Exclude the item from saved documents.
    pub fn transient(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn with_on_change(mut self, hook: OnChange) -> Self {
        self.on_change = Some(hook);
        self
    }

    /// A copy at its default value with clean counters, for array members.
    pub fn fresh_copy(&self) -> Self {
        let mut item = self.clone();
        item.value = item.default.clone();
        item.accesses.clear();
        item.verbatim = None;
        item.pending = None;
        item
    }

    // ── Identity ──

    pub fn section(&self) -> &str {
        &self.section
    }

    pub(crate) fn set_section(&mut self, section: &str) {
        self.section = normalize_key(section);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn is_key(&self, key: &str) -> bool {
        normalize_key(key) == self.key
    }

    /// `SECTION.KEY`, or just `KEY` for items without a section.
    pub fn get_full_name(&self) -> String {
        if self.section.is_empty() {
            self.key.clone()
        } else {
            format!("{}.{}", self.section, self.key)
        }
    }

    pub fn persists(&self) -> bool {
        self.persist
    }

    pub fn schedule(&self) -> Option<&ScheduleDescriptor> {
        match &self.kind {
            ItemKind::Scheduler(d) => Some(d),
            _ => None,
        }
    }

    // ── Validation ──

    fn is_valid(&self, value: &Value) -> bool {
        match (&self.kind, value) {
            (ItemKind::Str { .. } | ItemKind::Folder, Value::Text(_)) => true,
            (ItemKind::Email, Value::Text(s)) => validate::is_valid_email_list(s),
            (ItemKind::Csv, Value::Text(s)) => validate::is_valid_csv(s),
            (ItemKind::Url, Value::Text(s)) => validate::is_valid_url(s),
            (ItemKind::Int, Value::Int(_)) => true,
            (ItemKind::RangedInt { min, max }, Value::Int(v)) => (*min..=*max).contains(v),
            (ItemKind::Scheduler(_), Value::Int(v)) => (SCHEDULER_MIN..=SCHEDULER_MAX).contains(v),
            (ItemKind::Permission, Value::Int(v)) => validate::is_valid_permission(*v),
            (ItemKind::Bool, Value::Bool(_)) => true,
            (ItemKind::Connection, Value::Handle(_)) => true,
            _ => false,
        }
    }

    /// Turn text into a value of this item's kind, applying the kind's
    /// normalization. `None` if the text cannot represent such a value.
    fn parse_text(&self, raw: &str) -> Option<Value> {
        match &self.kind {
            ItemKind::Str { force_lower: true } => Some(Value::Text(raw.to_lowercase())),
            ItemKind::Str { force_lower: false } | ItemKind::Email | ItemKind::Csv => {
                Some(Value::Text(raw.to_owned()))
            }
            ItemKind::Url => Some(Value::Text(raw.trim_end_matches('/').to_owned())),
            ItemKind::Folder => Some(Value::Text(validate::to_native_separators(raw))),
            ItemKind::Permission => validate::parse_permission(raw).map(Value::Int),
            ItemKind::Int | ItemKind::RangedInt { .. } | ItemKind::Scheduler(_) => {
                raw.trim().parse::<i64>().ok().map(Value::Int)
            }
            ItemKind::Bool => parse_bool_text(raw).map(Value::Bool),
            ItemKind::Connection => None,
        }
    }

    /// Would `candidate` be accepted as this item's value?
    pub fn is_valid_value(&self, candidate: &str) -> bool {
        self.parse_text(candidate)
            .is_some_and(|value| self.is_valid(&value))
    }

    // ── Write plumbing ──

    fn on_set(&mut self, new: Value) -> bool {
        if !self.is_valid(&new) {
            self.accesses.record(Access::WriteErr);
            warn!("Cannot set config[{}] to {}", self.get_full_name(), new);
            return false;
        }
        let changed = new != self.value;
        if self.is_new {
            self.accesses.record(Access::CreateOk);
            self.is_new = false;
        } else if changed {
            self.accesses.record(Access::WriteOk);
        }
        if changed {
            self.value = new;
            debug!("Set config[{}] to {}", self.get_full_name(), self.value);
            self.note_change(ChangeReason::Setting);
        }
        true
    }

    fn on_type_mismatch(&mut self, shown: &dyn fmt::Display) -> bool {
        self.accesses.record(Access::WriteErr);
        warn!(
            "Cannot set config[{}] to {shown}: incorrect type",
            self.get_full_name()
        );
        false
    }

    fn on_read_err(&mut self, wanted: &str) {
        self.accesses.record(Access::ReadErr);
        warn!(
            "Type error reading config[{}] ({}) as {wanted}",
            self.get_full_name(),
            self.value
        );
    }

    fn note_change(&mut self, reason: ChangeReason) {
        if self.on_change.is_some() {
            self.pending = Some(reason);
        }
    }

    /// The hook call owed for the last change, if any. Fire it once the item
    /// is unlocked.
    pub fn take_change(&mut self) -> Option<PendingChange> {
        let reason = self.pending.take()?;
        let hook = self.on_change.clone()?;
        Some(PendingChange {
            hook,
            value: self.get_save_str(),
            reason,
        })
    }

    // ── Typed accessors ──

    /// Canonical string form. Bool false reads as `""` and true as `"1"`.
    pub fn get_str(&mut self) -> String {
        let out = match &self.value {
            Value::Text(s) => s.clone(),
            Value::Int(v) if self.kind == ItemKind::Permission => validate::format_permission(*v),
            Value::Int(v) => v.to_string(),
            Value::Bool(true) => "1".to_owned(),
            Value::Bool(false) => String::new(),
            Value::Handle(_) => {
                self.on_read_err("str");
                return String::new();
            }
        };
        self.accesses.record(Access::ReadOk);
        out
    }

    pub fn get_int(&mut self) -> i64 {
        match self.value {
            Value::Int(v) => {
                self.accesses.record(Access::ReadOk);
                v
            }
            Value::Bool(b) => {
                self.accesses.record(Access::ReadOk);
                i64::from(b)
            }
            _ => {
                self.on_read_err("int");
                0
            }
        }
    }

    pub fn get_bool(&mut self) -> bool {
        match self.value {
            Value::Bool(b) => {
                self.accesses.record(Access::ReadOk);
                b
            }
            _ => {
                self.on_read_err("bool");
                false
            }
        }
    }

    /// CSV items split into trimmed parts; other kinds yield their string.
    pub fn get_list(&mut self) -> Vec<String> {
        if self.kind == ItemKind::Csv {
            let Value::Text(s) = &self.value else {
                return Vec::new();
            };
            let parts = validate::csv_parts(s);
            self.accesses.record(Access::ReadOk);
            return parts;
        }
        let s = self.get_str();
        if s.is_empty() { Vec::new() } else { vec![s] }
    }

    pub fn get_connection(&mut self) -> Option<ConnectionHandle> {
        match &self.value {
            Value::Handle(h) => {
                let h = h.clone();
                self.accesses.record(Access::ReadOk);
                h
            }
            _ => {
                self.on_read_err("connection");
                None
            }
        }
    }

    pub fn set_str(&mut self, value: &str) -> bool {
        if !(self.kind.holds_text() || self.kind == ItemKind::Permission) {
            return self.on_type_mismatch(&value);
        }
        let Some(parsed) = self.parse_text(value) else {
            self.accesses.record(Access::WriteErr);
            warn!("Cannot set config[{}] to {value}", self.get_full_name());
            return false;
        };
        let verbatim = (self.kind == ItemKind::Folder && value.starts_with('.'))
            .then(|| value.to_owned());
        let ok = self.on_set(parsed);
        if ok && self.kind == ItemKind::Folder {
            self.verbatim = verbatim;
        }
        ok
    }

    /// Bool items accept 0 and 1.
    pub fn set_int(&mut self, value: i64) -> bool {
        match self.kind {
            ItemKind::Bool => match value {
                0 | 1 => self.on_set(Value::Bool(value == 1)),
                _ => {
                    self.accesses.record(Access::WriteErr);
                    warn!("Cannot set config[{}] to {value}", self.get_full_name());
                    false
                }
            },
            _ if self.kind.holds_int() => self.on_set(Value::Int(value)),
            _ => self.on_type_mismatch(&value),
        }
    }

    pub fn set_bool(&mut self, value: bool) -> bool {
        match self.kind {
            ItemKind::Bool => self.on_set(Value::Bool(value)),
            _ => self.on_type_mismatch(&value),
        }
    }

    pub fn set_connection(&mut self, handle: Option<ConnectionHandle>) -> bool {
        match self.kind {
            ItemKind::Connection => self.on_set(Value::Handle(handle)),
            _ => self.on_type_mismatch(&"<connection>"),
        }
    }

    /// Apply raw text from a form field. Returns true only when the value
    /// changed.
    pub fn set_from_ui(&mut self, raw: &str) -> bool {
        let candidate = match &self.kind {
            ItemKind::Int | ItemKind::RangedInt { .. } | ItemKind::Scheduler(_) => {
                match raw.trim().parse::<i64>() {
                    Ok(v) => Value::Int(v),
                    Err(_) => self.default.clone(),
                }
            }
            ItemKind::Bool => Value::Bool(is_truthy_form_value(raw)),
            ItemKind::Connection => return false,
            _ => match self.parse_text(raw) {
                Some(v) => v,
                None => {
                    self.accesses.record(Access::WriteErr);
                    warn!("Cannot set config[{}] to {raw}", self.get_full_name());
                    return false;
                }
            },
        };
        if candidate == self.value {
            return false;
        }
        let verbatim =
            (self.kind == ItemKind::Folder && raw.starts_with('.')).then(|| raw.to_owned());
        let ok = self.on_set(candidate);
        if ok && self.kind == ItemKind::Folder {
            self.verbatim = verbatim;
        }
        ok
    }

    /// Apply text read from a config document. Unparseable or invalid text
    /// counts as a format error and leaves the value alone.
    pub fn update_from_document(&mut self, raw: &str) -> bool {
        let parsed = self.parse_text(raw).filter(|v| self.is_valid(v));
        let Some(value) = parsed else {
            self.accesses.record(Access::FormatErr);
            warn!(
                "Error loading {} as {raw}: not a valid {}",
                self.get_full_name(),
                self.kind.name()
            );
            return false;
        };
        self.is_new = false;
        if self.kind == ItemKind::Folder {
            self.verbatim = raw.starts_with('.').then(|| raw.to_owned());
        }
        if value != self.value {
            self.value = value;
            self.note_change(ChangeReason::Loading);
        }
        true
    }

    // ── Defaults, persistence form, diagnostics ──

    pub fn is_default(&self) -> bool {
        self.value == self.default
    }

    /// Restore the default. Returns true if the value changed.
    pub fn reset_to_default(&mut self) -> bool {
        if self.is_default() {
            return false;
        }
        let default = self.default.clone();
        self.verbatim = None;
        self.on_set(default)
    }

    /// Default in save form.
    pub fn default_save_str(&self) -> String {
        self.render(&self.default, None)
    }

    /// Value as written to a document. Bool saves as `True`/`False`.
    pub fn get_save_str(&self) -> String {
        self.render(&self.value, self.verbatim.as_deref())
    }

    fn render(&self, value: &Value, verbatim: Option<&str>) -> String {
        match value {
            Value::Text(s) if self.kind == ItemKind::Folder => verbatim
                .map(str::to_owned)
                .unwrap_or_else(|| validate::to_portable_separators(s)),
            Value::Text(s) => s.clone(),
            Value::Int(v) if self.kind == ItemKind::Permission => validate::format_permission(*v),
            Value::Int(v) => v.to_string(),
            Value::Bool(true) => "True".to_owned(),
            Value::Bool(false) => "False".to_owned(),
            Value::Handle(_) => String::new(),
        }
    }

    /// Truthiness of the current value. Not counted as an access.
    pub fn is_enabled(&self) -> bool {
        match &self.value {
            Value::Text(s) => !s.is_empty(),
            Value::Int(v) => *v != 0,
            Value::Bool(b) => *b,
            Value::Handle(h) => h.is_some(),
        }
    }

    /// Current integer value without recording an access.
    pub(crate) fn peek_int(&self) -> i64 {
        match self.value {
            Value::Int(v) => v,
            Value::Bool(b) => i64::from(b),
            _ => 0,
        }
    }

    /// Compare values of two items without touching counters.
    pub fn same_value(&self, other: &ConfigItem) -> bool {
        self.kind == other.kind && self.value == other.value
    }

    /// Interval as `(hours, minutes)` for scheduler items.
    pub fn get_hour_min_interval(&self) -> Option<(i64, i64)> {
        let descriptor = self.schedule()?;
        Some(hour_min_interval(self.peek_int(), descriptor.unit))
    }

    pub fn accesses(&self) -> AccessCounter {
        self.accesses
    }

    pub fn read_count(&self) -> u64 {
        self.accesses.reads()
    }

    pub fn write_count(&self) -> u64 {
        self.accesses.writes()
    }

    pub fn clear_accesses(&mut self) {
        self.accesses.clear();
    }
}

/// Text forms accepted for bools in documents.
fn parse_bool_text(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Form checkboxes send a value only when ticked.
fn is_truthy_form_value(raw: &str) -> bool {
    parse_bool_text(raw).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Mutex;

    fn sched(unit: TimeUnit) -> ScheduleDescriptor {
        ScheduleDescriptor::new("search_book", "SEARCHALLBOOKS", "search.book", unit)
    }

    // ── String ──

    #[test]
    fn string_round_trip_and_default_toggle() {
        let mut item = ConfigItem::string("General", "name", "alice");
        assert!(item.is_default());
        assert!(item.set_str("bob"));
        assert_eq!(item.get_str(), "bob");
        assert!(!item.is_default());
        assert!(item.reset_to_default());
        assert!(item.is_default());
        assert_eq!(item.get_str(), "alice");
    }

    #[test]
    fn lowercase_applies_to_writes_not_default() {
        let mut item = ConfigItem::lowercase_string("General", "mode", "MiXed");
        assert_eq!(item.get_str(), "MiXed");
        item.set_str("UPPER");
        assert_eq!(item.get_str(), "upper");
    }

    #[test]
    fn string_rejects_int_and_bool_writes() {
        let mut item = ConfigItem::string("General", "name", "x");
        assert!(!item.set_int(3));
        assert!(!item.set_bool(true));
        assert_eq!(item.accesses().write_err, 2);
        assert_eq!(item.get_str(), "x");
    }

    #[test]
    fn unchanged_write_is_not_counted() {
        let mut item = ConfigItem::string("General", "name", "x");
        assert!(item.set_str("x"));
        assert_eq!(item.accesses().write_ok, 0);
        assert!(item.set_str("y"));
        assert_eq!(item.accesses().write_ok, 1);
    }

    #[test]
    fn full_name_uses_section_when_present() {
        let item = ConfigItem::string("general", "Log_Dir", "");
        assert_eq!(item.get_full_name(), "GENERAL.LOG_DIR");
        let bare = ConfigItem::vivified("loose", ItemKind::Str { force_lower: false });
        assert_eq!(bare.get_full_name(), "LOOSE");
        assert!(item.is_key("log_dir"));
    }

    // ── Int ──

    #[test]
    fn int_round_trip_and_type_errors() {
        let mut item = ConfigItem::int("General", "port", 5299);
        assert!(item.set_int(8080));
        assert_eq!(item.get_int(), 8080);
        assert!(!item.set_str("9090"));
        assert_eq!(item.get_int(), 8080);
        assert_eq!(item.accesses().write_err, 1);
        assert!(!item.get_bool());
        assert_eq!(item.accesses().read_err, 1);
    }

    #[test]
    fn int_ui_write_falls_back_to_default() {
        let mut item = ConfigItem::int("General", "num", 42);
        item.set_int(123);
        assert!(item.set_from_ui("abc"));
        assert_eq!(item.get_int(), 42);
        assert!(!item.set_from_ui("False"));
        assert_eq!(item.get_int(), 42);
        assert!(item.set_from_ui(" 7 "));
        assert_eq!(item.get_int(), 7);
    }

    #[test]
    fn ranged_int_enforces_bounds() {
        let mut item = ConfigItem::ranged_int("General", "level", 2, 1, 5).unwrap();
        assert!(item.set_int(5));
        assert!(!item.set_int(6));
        assert!(!item.set_int(0));
        assert_eq!(item.get_int(), 5);
        assert_eq!(item.accesses().write_err, 2);
    }

    #[test]
    fn ranged_int_invalid_default_is_fatal() {
        let err = ConfigItem::ranged_int("General", "level", 10, 1, 5).unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    // ── Bool ──

    #[test]
    fn bool_string_forms() {
        let mut item = ConfigItem::boolean("General", "flag", false);
        assert_eq!(item.get_str(), "");
        assert_eq!(item.get_save_str(), "False");
        item.set_bool(true);
        assert_eq!(item.get_str(), "1");
        assert_eq!(item.get_save_str(), "True");
        assert_eq!(item.get_int(), 1);
    }

    #[test]
    fn bool_accepts_zero_and_one_only() {
        let mut item = ConfigItem::boolean("General", "flag", false);
        assert!(item.set_int(1));
        assert!(item.get_bool());
        assert!(item.set_int(0));
        assert!(!item.get_bool());
        assert!(!item.set_int(2));
        assert!(!item.set_str("True"));
        assert_eq!(item.accesses().write_err, 2);
    }

    #[test]
    fn bool_ui_checkbox() {
        let mut item = ConfigItem::boolean("General", "flag", false);
        assert!(item.set_from_ui("on"));
        assert!(item.get_bool());
        assert!(!item.set_from_ui("1"));
        assert!(item.set_from_ui(""));
        assert!(!item.get_bool());
    }

    // ── Email / CSV / URL ──

    #[test]
    fn email_invalid_write_keeps_value() {
        let mut item = ConfigItem::email("Email", "to", "name@gmail.com").unwrap();
        assert!(item.set_str("bob+fred@aol.co.uk"));
        assert!(!item.set_str("toomany@alsome@bob.com"));
        assert!(!item.set_str("justastring.co.uk"));
        assert_eq!(item.get_str(), "bob+fred@aol.co.uk");
        assert_eq!(item.accesses().write_err, 2);
    }

    #[test]
    fn email_invalid_default_is_fatal() {
        assert!(ConfigItem::email("Email", "to", "nope").is_err());
    }

    #[test]
    fn csv_list_form() {
        let mut item = ConfigItem::csv("General", "names", "").unwrap();
        assert!(item.get_list().is_empty());
        assert!(item.set_str("allan, bob,fred"));
        assert_eq!(item.get_list(), vec!["allan", "bob", "fred"]);
        assert!(!item.set_str(",,test"));
        assert!(item.set_str(""));
    }

    #[test]
    fn url_strips_trailing_slash() {
        let mut item = ConfigItem::url("Host", "url", "http://localhost:5299").unwrap();
        assert!(item.set_str("https://example.com/api/"));
        assert_eq!(item.get_str(), "https://example.com/api");
        assert!(!item.set_str("mailto:someone@example.com"));
        assert_eq!(item.get_str(), "https://example.com/api");
    }

    #[test]
    fn url_invalid_default_is_fatal() {
        assert!(ConfigItem::url("Host", "url", "not a url").is_err());
    }

    // ── Folder ──

    #[test]
    fn folder_saves_with_forward_slashes() {
        let mut item = ConfigItem::folder("General", "dir", "");
        item.set_str("C:\\Windows/confused");
        assert_eq!(item.get_save_str(), "C:/Windows/confused");
        let sep = std::path::MAIN_SEPARATOR;
        assert_eq!(item.get_str(), format!("C:{sep}Windows{sep}confused"));
    }

    #[test]
    fn folder_keeps_relative_text_verbatim() {
        let mut item = ConfigItem::folder("General", "dir", "");
        assert!(item.update_from_document(".\\cache\\covers"));
        assert_eq!(item.get_save_str(), ".\\cache\\covers");
        item.set_str("/abs/path");
        assert_eq!(item.get_save_str(), "/abs/path");
    }

    // ── Permission ──

    #[test]
    fn permission_cases() {
        let mut item = ConfigItem::permission("FileMgmt", "dir_perm", "0o777").unwrap();
        assert_eq!(item.get_int(), 0o777);
        assert_eq!(item.get_str(), "0o777");
        assert!(item.set_int(0o101));
        assert_eq!(item.get_int(), 0o101);
        assert!(!item.set_int(-8));
        assert!(!item.set_int(0o7777));
        assert_eq!(item.get_int(), 0o101);
        assert_eq!(item.accesses().write_err, 2);
        assert!(item.set_str("0o321"));
        assert_eq!(item.get_int(), 0o321);
        assert!(item.set_from_ui("644"));
        assert_eq!(item.get_save_str(), "0o644");
    }

    #[test]
    fn permission_invalid_default_is_fatal() {
        assert!(ConfigItem::permission("FileMgmt", "p", "0o7777").is_err());
        assert!(ConfigItem::permission("FileMgmt", "p", "rwx").is_err());
    }

    // ── Scheduler ──

    #[test]
    fn scheduler_hour_min_interval() {
        let cases = [
            (TimeUnit::Min, 10, (0, 10)),
            (TimeUnit::Min, 1, (0, 5)),
            (TimeUnit::Min, 65, (0, 65)),
            (TimeUnit::Min, 700, (11, 0)),
            (TimeUnit::Hour, 28, (28, 0)),
            (TimeUnit::Day, 2, (48, 0)),
        ];
        for (unit, value, expected) in cases {
            let item = ConfigItem::scheduler("SearchScan", "interval", value, sched(unit)).unwrap();
            assert_eq!(item.get_hour_min_interval(), Some(expected), "{unit:?} {value}");
        }
    }

    #[test]
    fn hour_min_interval_saturates_huge_values() {
        assert_eq!(hour_min_interval(i64::MAX / 4, TimeUnit::Day), (i64::MAX, 0));
        assert_eq!(hour_min_interval(i64::MAX, TimeUnit::Hour), (i64::MAX, 0));
        assert_eq!(hour_min_interval(i64::MIN, TimeUnit::Day), (0, MIN_INTERVAL_MINUTES));
    }

    #[test]
    fn scheduler_empty_name_is_fatal() {
        let descriptor = ScheduleDescriptor::new("", "RUN", "t", TimeUnit::Min);
        let err = ConfigItem::scheduler("SearchScan", "interval", 10, descriptor).unwrap_err();
        assert!(err.to_string().contains("empty schedule name"));
    }

    #[test]
    fn scheduler_range() {
        let mut item = ConfigItem::scheduler("SearchScan", "interval", 10, sched(TimeUnit::Min)).unwrap();
        assert!(item.set_int(100_000));
        assert!(!item.set_int(100_001));
        assert!(!item.set_int(-1));
        assert_eq!(item.get_int(), 100_000);
    }

    // ── Connection ──

    #[test]
    fn connection_holds_anything_and_is_not_persisted() {
        let mut item = ConfigItem::connection("", "db");
        assert!(!item.persists());
        let handle: ConnectionHandle = Arc::new(String::from("socket"));
        assert!(item.set_connection(Some(handle.clone())));
        let back = item.get_connection().unwrap();
        assert!(Arc::ptr_eq(&back, &handle));
        assert_eq!(item.get_str(), "");
        assert_eq!(item.accesses().read_err, 1);
    }

    // ── Counting and hooks ──

    #[test]
    fn vivified_item_counts_first_write_as_create() {
        let mut item = ConfigItem::vivified("newkey", ItemKind::Int);
        assert!(item.set_int(5));
        assert_eq!(item.accesses().create_ok, 1);
        assert!(item.set_int(6));
        assert_eq!(item.accesses().write_ok, 1);
        assert_eq!(item.accesses().create_ok, 1);
    }

    #[test]
    fn on_change_fires_only_for_changes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut item = ConfigItem::boolean("General", "flag", false).with_on_change(Arc::new(
            move |value: &str, reason: ChangeReason| {
                sink.lock().unwrap().push((value.to_owned(), reason));
            },
        ));
        item.set_bool(false);
        assert!(item.take_change().is_none());
        item.set_bool(true);
        item.take_change().unwrap().fire();
        item.set_int(7);
        assert!(item.take_change().is_none());
        item.update_from_document("False");
        item.take_change().unwrap().fire();
        assert!(item.take_change().is_none());
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("True".to_owned(), ChangeReason::Setting),
                ("False".to_owned(), ChangeReason::Loading),
            ]
        );
    }

    #[test]
    fn document_format_errors_are_counted() {
        let mut item = ConfigItem::int("General", "port", 1);
        assert!(!item.update_from_document("eighty"));
        assert_eq!(item.accesses().format_err, 1);
        assert_eq!(item.get_int(), 1);
        assert!(item.update_from_document("80"));
        assert_eq!(item.get_int(), 80);
    }

    #[test]
    fn fresh_copy_resets_value_and_counters() {
        let mut item = ConfigItem::string("General", "name", "a");
        item.set_str("b");
        let copy = item.fresh_copy();
        assert!(copy.is_default());
        assert!(copy.accesses().is_empty());
    }

    #[test]
    fn is_valid_value_checks_without_writing() {
        let item = ConfigItem::ranged_int("General", "level", 2, 1, 5).unwrap();
        assert!(item.is_valid_value("3"));
        assert!(!item.is_valid_value("9"));
        assert!(!item.is_valid_value("three"));
        assert!(item.accesses().is_empty());
    }

    #[test]
    fn is_enabled_reflects_truthiness() {
        let mut item = ConfigItem::int("General", "n", 0);
        assert!(!item.is_enabled());
        item.set_int(3);
        assert!(item.is_enabled());
        assert!(!ConfigItem::string("General", "s", "").is_enabled());
    }
}

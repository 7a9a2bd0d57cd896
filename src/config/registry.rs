//! The configuration registry.
//!
//! [`ConfigRegistry`] owns every named item plus the array groups. Lookups are
//! case-insensitive. Each item sits behind its own mutex so that the counter
//! update on every access is atomic with the value it describes; the maps
//! themselves only take a write lock when their shape changes (lazy creation,
//! loading array members, cleanup before saving).

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use super::access::{Access, AccessCounter};
use super::array::{ArrayDef, ArrayGroup, split_array_section};
use super::item::{ConfigItem, ConnectionHandle, ItemKind};
use super::keymap::{KeyMap, normalize_key};

/// An item shared between the registry and its readers.
pub type SharedItem = Arc<Mutex<ConfigItem>>;

/// Lock an item. A poisoned lock still holds a consistent item because no
/// item method panics half-way through an update.
pub fn lock_item(item: &SharedItem) -> MutexGuard<'_, ConfigItem> {
    item.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run a write on an item, then fire its on-change hook once the lock is
/// released.
pub fn write_item<T>(item: &SharedItem, f: impl FnOnce(&mut ConfigItem) -> T) -> T {
    let (out, change) = {
        let mut guard = lock_item(item);
        let out = f(&mut guard);
        (out, guard.take_change())
    };
    if let Some(change) = change {
        change.fire();
    }
    out
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// One section of a loaded document: `(section, [(key, value)])`.
pub type DocumentSection = (String, Vec<(String, String)>);

/// Registry of typed config items and array groups.
pub struct ConfigRegistry {
    items: RwLock<KeyMap<SharedItem>>,
    arrays: RwLock<KeyMap<ArrayGroup>>,
    array_defs: KeyMap<ArrayDef>,
    /// Reads of keys that do not exist.
    unknown: Mutex<KeyMap<AccessCounter>>,
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("items", &read(&self.items).len())
            .field("arrays", &read(&self.arrays).len())
            .finish()
    }
}

impl ConfigRegistry {
    /// Build a registry from item and array definitions. Every array starts
    /// with one spare member.
    pub fn new(defaults: Vec<ConfigItem>, array_defs: Vec<ArrayDef>) -> Self {
        let mut items = KeyMap::new();
        for item in defaults {
            let key = item.key().to_owned();
            if items.insert(&key, Arc::new(Mutex::new(item))).is_some() {
                warn!("Duplicate config definition for {key}; keeping the last one");
            }
        }
        let mut defs = KeyMap::new();
        let mut arrays = KeyMap::new();
        for def in array_defs {
            let mut group = ArrayGroup::new(def.clone());
            group.ensure_empty_end_item();
            let name = def.name().to_owned();
            arrays.insert(&name, group);
            defs.insert(&name, def);
        }
        Self {
            items: RwLock::new(items),
            arrays: RwLock::new(arrays),
            array_defs: defs,
            unknown: Mutex::new(KeyMap::new()),
        }
    }

    /// Build from the application's built-in definitions.
    pub fn with_defaults() -> crate::Result<Self> {
        Ok(Self::new(
            super::defaults::base_items()?,
            super::defaults::array_defs()?,
        ))
    }

    // ── Item lookup ──

    pub fn get_item(&self, key: &str) -> Option<SharedItem> {
        read(&self.items).get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        read(&self.items).contains_key(key)
    }

    fn record_unknown(&self, key: &str, access: Access) {
        let mut unknown = self.unknown.lock().unwrap_or_else(|e| e.into_inner());
        match unknown.get_mut(key) {
            Some(counter) => counter.record(access),
            None => {
                let mut counter = AccessCounter::default();
                counter.record(access);
                unknown.insert(key, counter);
            }
        }
    }

    /// Run `f` on a known item, or count a read error and return `missing`.
    fn read_with<T>(&self, key: &str, missing: T, f: impl FnOnce(&mut ConfigItem) -> T) -> T {
        match self.get_item(key) {
            Some(item) => {
                let mut guard = lock_item(&item);
                f(&mut guard)
            }
            None => {
                warn!("Config key {} does not exist", normalize_key(key));
                self.record_unknown(key, Access::ReadErr);
                missing
            }
        }
    }

    /// Run `f` on an item, creating a transient one of `kind` if the key is
    /// unknown.
    fn write_with(&self, key: &str, kind: ItemKind, f: impl FnOnce(&mut ConfigItem) -> bool) -> bool {
        let item = match self.get_item(key) {
            Some(item) => item,
            None => {
                let mut items = write(&self.items);
                // Another writer may have created it between the two locks.
                match items.get(key) {
                    Some(item) => item.clone(),
                    None => {
                        info!("Creating config item {} ({})", normalize_key(key), kind.name());
                        let item = Arc::new(Mutex::new(ConfigItem::vivified(key, kind)));
                        items.insert(key, item.clone());
                        item
                    }
                }
            }
        };
        write_item(&item, f)
    }

    // ── Typed accessors ──

    pub fn get_str(&self, key: &str) -> String {
        self.read_with(key, String::new(), |item| item.get_str())
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.read_with(key, 0, |item| item.get_int())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.read_with(key, false, |item| item.get_bool())
    }

    /// CSV items as a list of parts.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.read_with(key, Vec::new(), |item| item.get_list())
    }

    pub fn get_connection(&self, key: &str) -> Option<ConnectionHandle> {
        self.read_with(key, None, |item| item.get_connection())
    }

    pub fn set_str(&self, key: &str, value: &str) -> bool {
        self.write_with(key, ItemKind::Str { force_lower: false }, |item| {
            item.set_str(value)
        })
    }

    pub fn set_int(&self, key: &str, value: i64) -> bool {
        self.write_with(key, ItemKind::Int, |item| item.set_int(value))
    }

    pub fn set_bool(&self, key: &str, value: bool) -> bool {
        self.write_with(key, ItemKind::Bool, |item| item.set_bool(value))
    }

    pub fn set_connection(&self, key: &str, handle: Option<ConnectionHandle>) -> bool {
        self.write_with(key, ItemKind::Connection, |item| item.set_connection(handle))
    }

    /// Apply a form value. Unknown keys are ignored.
    pub fn set_from_ui(&self, key: &str, raw: &str) -> bool {
        match self.get_item(key) {
            Some(item) => write_item(&item, |item| item.set_from_ui(raw)),
            None => {
                warn!("Cannot set unknown config key {} from UI", normalize_key(key));
                false
            }
        }
    }

    pub fn is_valid_value(&self, key: &str, candidate: &str) -> bool {
        match self.get_item(key) {
            Some(item) => {
                let guard = lock_item(&item);
                guard.is_valid_value(candidate)
            }
            None => false,
        }
    }

    /// Restore each listed key to its default.
    pub fn reset_to_default(&self, keys: &[&str]) {
        for key in keys {
            match self.get_item(key) {
                Some(item) => {
                    write_item(&item, ConfigItem::reset_to_default);
                }
                None => warn!("Cannot reset value of {key} as it does not exist"),
            }
        }
    }

    // ── Arrays ──

    pub fn array_names(&self) -> Vec<String> {
        read(&self.arrays).keys().map(str::to_owned).collect()
    }

    /// Number of members in the named array; counts a read error if there is
    /// no such array.
    pub fn array_count(&self, name: &str) -> usize {
        match read(&self.arrays).get(name) {
            Some(group) => group.len(),
            None => {
                self.record_unknown(name, Access::ReadErr);
                0
            }
        }
    }

    pub fn array_indexes(&self, name: &str) -> Vec<usize> {
        read(&self.arrays)
            .get(name)
            .map(ArrayGroup::indexes)
            .unwrap_or_default()
    }

    pub fn get_array_item(&self, name: &str, index: usize, key: &str) -> Option<SharedItem> {
        read(&self.arrays)
            .get(name)
            .and_then(|group| group.member(index))
            .and_then(|member| member.get(key).cloned())
    }

    pub fn get_array_str(&self, name: &str, index: usize, key: &str) -> String {
        match self.get_array_item(name, index, key) {
            Some(item) => {
                let mut guard = lock_item(&item);
                guard.get_str()
            }
            None => {
                self.record_unknown(&format!("{name}.{index}.{key}"), Access::ReadErr);
                String::new()
            }
        }
    }

    pub fn set_array_str(&self, name: &str, index: usize, key: &str, value: &str) -> bool {
        match self.get_array_item(name, index, key) {
            Some(item) => write_item(&item, |item| item.set_str(value)),
            None => {
                warn!("Cannot set {name}.{index}.{key}: no such array entry");
                self.record_unknown(&format!("{name}.{index}.{key}"), Access::WriteErr);
                false
            }
        }
    }

    /// Indexes of members whose primary key is set.
    pub fn array_in_use(&self, name: &str) -> Vec<usize> {
        read(&self.arrays)
            .get(name)
            .map(|group| {
                group
                    .indexes()
                    .into_iter()
                    .filter(|i| group.is_in_use(*i))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Create the member at `index` if missing. Returns false for unknown
    /// arrays.
    pub fn setup_array_member(&self, name: &str, index: usize) -> bool {
        match write(&self.arrays).get_mut(name) {
            Some(group) => {
                group.setup_at(index);
                true
            }
            None => false,
        }
    }

    pub fn ensure_arrays_have_empty_item(&self) {
        let mut arrays = write(&self.arrays);
        for name in self.array_defs.keys() {
            if !arrays.contains_key(name) {
                if let Some(def) = self.array_defs.get(name) {
                    arrays.insert(name, ArrayGroup::new(def.clone()));
                }
            }
            if let Some(group) = arrays.get_mut(name) {
                group.ensure_empty_end_item();
            }
        }
    }

    /// Drop unused array members and renumber the rest.
    pub fn cleanup_arrays_for_save(&self) {
        let mut arrays = write(&self.arrays);
        for name in self.array_defs.keys() {
            if let Some(group) = arrays.get_mut(name) {
                group.cleanup_for_save();
            }
        }
    }

    // ── Loading ──

    /// Apply parsed document sections. Sections ending in a digit load into
    /// array members; array sections without a matching definition are
    /// dropped with a warning.
    pub fn load_sections(&self, sections: &[DocumentSection]) {
        for (section, entries) in sections {
            match split_array_section(section) {
                Some((name, index)) => self.load_array_section(section, &name, index, entries),
                None => self.load_flat_section(section, entries),
            }
        }
        self.ensure_arrays_have_empty_item();
    }

    fn load_flat_section(&self, section: &str, entries: &[(String, String)]) {
        for (key, value) in entries {
            match self.get_item(key) {
                Some(item) => {
                    write_item(&item, |item| item.update_from_document(value));
                }
                None => warn!(
                    "Unknown option {}.{} in config",
                    normalize_key(section),
                    normalize_key(key)
                ),
            }
        }
    }

    fn load_array_section(&self, section: &str, name: &str, index: usize, entries: &[(String, String)]) {
        if !self.array_defs.contains_key(name) {
            warn!("Cannot load array {section}: Undefined");
            return;
        }
        debug!("Loading array {name} index {index}");
        let member = {
            let mut arrays = write(&self.arrays);
            if !arrays.contains_key(name)
                && let Some(def) = self.array_defs.get(name)
            {
                arrays.insert(name, ArrayGroup::new(def.clone()));
            }
            let Some(group) = arrays.get_mut(name) else {
                return;
            };
            group.setup_at(index).clone()
        };
        for (key, value) in entries {
            match member.get(key) {
                Some(item) => {
                    write_item(item, |item| item.update_from_document(value));
                }
                None => warn!(
                    "Unknown option {}.{} in config",
                    normalize_key(section),
                    normalize_key(key)
                ),
            }
        }
    }

    // ── Schedulers ──

    /// Scheduler item with the given schedule name, searching flat items
    /// first, then array members.
    pub fn find_scheduler(&self, schedule_name: &str) -> Option<SharedItem> {
        self.iter_items().map(|(_, item)| item).find(|item| {
            lock_item(item)
                .schedule()
                .is_some_and(|d| d.schedule_name.eq_ignore_ascii_case(schedule_name))
        })
    }

    /// Every scheduler item.
    pub fn get_schedulers(&self) -> Vec<SharedItem> {
        self.iter_items()
            .map(|(_, item)| item)
            .filter(|item| lock_item(item).schedule().is_some())
            .collect()
    }

    /// A scheduler may run when its interval is positive and, if it needs a
    /// search provider, one is available.
    pub fn scheduler_can_run(&self, item: &ConfigItem, providers_available: bool) -> bool {
        let Some(descriptor) = item.schedule() else {
            return false;
        };
        item.peek_int() > 0 && (!descriptor.needs_provider || providers_available)
    }

    // ── Iteration ──

    /// Every item, flat items first, then array members in index order.
    ///
    /// The iterator works on a snapshot taken when it is created and is
    /// single-pass: once exhausted it stays exhausted. Call again for another
    /// pass.
    pub fn iter_items(&self) -> FlatItems {
        let mut all = Vec::new();
        for (key, item) in read(&self.items).iter() {
            all.push((key.to_owned(), item.clone()));
        }
        for (name, group) in read(&self.arrays).iter() {
            for (index, member) in group.members() {
                for (key, item) in member.iter() {
                    all.push((format!("{name}.{index}.{key}"), item.clone()));
                }
            }
        }
        FlatItems {
            inner: all.into_iter(),
        }
    }

    // ── Diagnostics ──

    /// Counters for every item that has been accessed, keyed by
    /// `SECTION.KEY` (or `ARRAY.index.KEY`), plus reads of unknown keys.
    pub fn get_all_accesses(&self) -> BTreeMap<String, AccessCounter> {
        let mut result = BTreeMap::new();
        for (key, item) in read(&self.items).iter() {
            let item = lock_item(item);
            let counter = item.accesses();
            if !counter.is_empty() {
                let name = if item.section().is_empty() {
                    key.to_owned()
                } else {
                    format!("{}.{key}", item.section())
                };
                result.insert(name, counter);
            }
        }
        for (name, group) in read(&self.arrays).iter() {
            for (index, member) in group.members() {
                for (key, item) in member.iter() {
                    let counter = lock_item(item).accesses();
                    if !counter.is_empty() {
                        result.insert(format!("{name}.{index}.{key}"), counter);
                    }
                }
            }
        }
        for (key, counter) in self.get_error_counters() {
            result.insert(key, counter);
        }
        result
    }

    /// Counters for accesses to keys that do not exist.
    pub fn get_error_counters(&self) -> BTreeMap<String, AccessCounter> {
        let unknown = self.unknown.lock().unwrap_or_else(|e| e.into_inner());
        unknown
            .iter()
            .map(|(k, c)| (k.to_owned(), *c))
            .collect()
    }

    pub fn clear_access_counters(&self) {
        for (_, item) in self.iter_items() {
            lock_item(&item).clear_accesses();
        }
        *self.unknown.lock().unwrap_or_else(|e| e.into_inner()) = KeyMap::new();
    }

    /// Text report of every access, grouped by outcome.
    pub fn create_access_summary(&self) -> String {
        let accesses = self.get_all_accesses();
        let mut out = String::from("*** Config Item Access Summary ***\n");
        for access in Access::ALL {
            let rows: Vec<(&String, u64)> = accesses
                .iter()
                .map(|(k, c)| (k, c.get(access)))
                .filter(|(_, n)| *n > 0)
                .collect();
            if rows.is_empty() {
                continue;
            }
            let _ = writeln!(out, "Access type: {}", access.label());
            for (key, n) in rows {
                let _ = writeln!(out, "  {key:30}: {n:7}");
            }
        }
        out
    }

    /// Same keys and values, recursively through array groups.
    pub fn are_equivalent(&self, other: &ConfigRegistry) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let a = read(&self.items);
        let b = read(&other.items);
        if !members_equivalent(&a, &b) {
            warn!("Base configs differ");
            return false;
        }
        let a = read(&self.arrays);
        let b = read(&other.arrays);
        if a.len() != b.len() {
            warn!("Number of array configs differ");
            return false;
        }
        for (name, group) in a.iter() {
            let Some(other_group) = b.get(name) else {
                warn!("Array {name} missing in second config");
                return false;
            };
            if group.indexes() != other_group.indexes() {
                warn!("Array {name} has different members");
                return false;
            }
            for (index, member) in group.members() {
                let Some(other_member) = other_group.member(index) else {
                    return false;
                };
                if !members_equivalent(member, other_member) {
                    warn!("Array configs differ in {name}.{index}");
                    return false;
                }
            }
        }
        true
    }
}

fn members_equivalent(a: &KeyMap<SharedItem>, b: &KeyMap<SharedItem>) -> bool {
    if a.len() != b.len() {
        warn!("Config sizes differ: {} != {}", a.len(), b.len());
        return false;
    }
    a.iter().all(|(key, item)| match b.get(key) {
        Some(other) => {
            // One lock at a time, so comparing in both directions cannot
            // deadlock.
            let mine = lock_item(item).clone();
            let same = mine.same_value(&lock_item(other));
            if !same {
                warn!("Values for [{key}] differ");
            }
            same
        }
        None => {
            warn!("Key [{key}] missing in second config");
            false
        }
    })
}

/// Single-pass iterator over every item in a registry. See
/// [`ConfigRegistry::iter_items`].
pub struct FlatItems {
    inner: std::vec::IntoIter<(String, SharedItem)>,
}

impl Iterator for FlatItems {
    type Item = (String, SharedItem);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

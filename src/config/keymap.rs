//! Case-insensitive, insertion-ordered map.
//!
//! Keys are normalized to upper case on the way in; callers only ever see
//! the normalized form.

use std::collections::HashMap;

/// Normalize a key the way every registry map does.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

/// Map keyed by case-folded strings that remembers insertion order.
#[derive(Debug, Clone)]
pub struct KeyMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for KeyMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> KeyMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the previous value for the key, if any.
    pub fn insert(&mut self, key: &str, value: V) -> Option<V> {
        let key = normalize_key(key);
        match self.index.get(&key) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index
            .get(&normalize_key(key))
            .map(|&pos| &self.entries[pos].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        match self.index.get(&normalize_key(key)) {
            Some(&pos) => Some(&mut self.entries[pos].1),
            None => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(&normalize_key(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let pos = self.index.remove(&normalize_key(key))?;
        let (_, value) = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalized keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let mut map = KeyMap::new();
        map.insert("Log_Level", 1);
        assert_eq!(map.get("LOG_LEVEL"), Some(&1));
        assert_eq!(map.get("log_level"), Some(&1));
        assert!(map.contains_key("lOg_LeVeL"));
    }

    #[test]
    fn insert_replaces_existing_key_in_place() {
        let mut map = KeyMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        assert_eq!(map.insert("A", 3), Some(1));
        assert_eq!(map.len(), 2);
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(map.get("a"), Some(&3));
    }

    #[test]
    fn keys_are_normalized() {
        let mut map = KeyMap::new();
        map.insert(" mixedCase ", ());
        assert_eq!(map.keys().next(), Some("MIXEDCASE"));
    }

    #[test]
    fn remove_keeps_later_entries_reachable() {
        let mut map = KeyMap::new();
        map.insert("one", 1);
        map.insert("two", 2);
        map.insert("three", 3);
        assert_eq!(map.remove("TWO"), Some(2));
        assert_eq!(map.get("three"), Some(&3));
        assert_eq!(map.get("one"), Some(&1));
        assert!(map.get("two").is_none());
        assert_eq!(map.len(), 2);
    }
}

//! Array groups: repeated config blocks such as search providers.
//!
//! Each member is a deep copy of the group's item template living in its own
//! section, `<NAME>_<index>`. A member is "in use" when its primary key holds a
//! non-empty value.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::item::ConfigItem;
use super::keymap::{KeyMap, normalize_key};
use super::registry::{SharedItem, lock_item};

/// Key whose value is replaced by the member's section name.
const NAME_KEY: &str = "NAME";

/// Template for one array group.
#[derive(Debug, Clone)]
pub struct ArrayDef {
    name: String,
    primary_key: String,
    template: Vec<ConfigItem>,
}

impl ArrayDef {
    pub fn new(name: &str, primary_key: &str, template: Vec<ConfigItem>) -> Self {
        Self {
            name: normalize_key(name),
            primary_key: normalize_key(primary_key),
            template,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn section_for(&self, index: usize) -> String {
        format!("{}_{index}", self.name)
    }
}

/// Items of one array member, keyed by item key.
pub type ArrayMember = KeyMap<SharedItem>;

/// Live members of one array group, ordered by index.
#[derive(Debug)]
pub struct ArrayGroup {
    def: ArrayDef,
    members: BTreeMap<usize, ArrayMember>,
}

impl ArrayGroup {
    pub fn new(def: ArrayDef) -> Self {
        Self {
            def,
            members: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn indexes(&self) -> Vec<usize> {
        self.members.keys().copied().collect()
    }

    pub fn member(&self, index: usize) -> Option<&ArrayMember> {
        self.members.get(&index)
    }

    pub fn members(&self) -> impl Iterator<Item = (usize, &ArrayMember)> {
        self.members.iter().map(|(i, m)| (*i, m))
    }

    /// Create the member at `index` from the template if it is missing.
    pub fn setup_at(&mut self, index: usize) -> &ArrayMember {
        let def = &self.def;
        self.members.entry(index).or_insert_with(|| {
            let section = def.section_for(index);
            let mut member = KeyMap::new();
            for template in &def.template {
                let mut item = template.fresh_copy();
                item.set_section(&section);
                if item.is_key(NAME_KEY) {
                    item.update_from_document(&section);
                    // Naming a new member is not a change.
                    item.take_change();
                }
                let key = item.key().to_owned();
                member.insert(&key, Arc::new(Mutex::new(item)));
            }
            debug!("Created array member {section}");
            member
        })
    }

    /// Primary key value of a member, or empty if absent.
    pub fn primary_value(&self, index: usize) -> String {
        self.members
            .get(&index)
            .and_then(|m| m.get(self.def.primary_key()))
            .map(|item| lock_item(item).get_save_str())
            .unwrap_or_default()
    }

    pub fn is_in_use(&self, index: usize) -> bool {
        !self.primary_value(index).is_empty()
    }

    /// Append a spare member unless the last one is already unused.
    pub fn ensure_empty_end_item(&mut self) {
        match self.members.keys().next_back().copied() {
            None => {
                self.setup_at(0);
            }
            Some(last) if self.is_in_use(last) => {
                self.setup_at(last + 1);
            }
            Some(_) => {}
        }
    }

    /// Drop unused members and renumber the rest from zero.
    pub fn cleanup_for_save(&mut self) {
        let in_use: Vec<usize> = self
            .members
            .keys()
            .copied()
            .filter(|i| self.is_in_use(*i))
            .collect();
        let mut old = std::mem::take(&mut self.members);
        for (renum, index) in in_use.into_iter().enumerate() {
            let Some(member) = old.remove(&index) else {
                continue;
            };
            if renum != index {
                let section = self.def.section_for(renum);
                for item in member.values() {
                    lock_item(item).set_section(&section);
                }
            }
            self.members.insert(renum, member);
        }
    }
}

/// Split an array section name into `(array name, index)`.
///
/// `NEWZNAB_3` and `newznab3` both yield `("NEWZNAB", 3)`. Returns `None` when
/// the section does not end in a digit.
pub fn split_array_section(section: &str) -> Option<(String, usize)> {
    let section = section.trim();
    let prefix = section.trim_end_matches(|c: char| c.is_ascii_digit());
    if prefix.len() == section.len() || prefix.is_empty() {
        return None;
    }
    let index = section[prefix.len()..].parse().ok()?;
    let name = normalize_key(prefix.trim_end_matches('_'));
    Some((name, index))
}

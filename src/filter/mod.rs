//! Composable tag predicates with per-block id caches.
//!
//! Filters form a DAG of `Arc<TagFilter>` nodes. Assigning a block resolves
//! the configured strings to that block's string-table ids once
//! (`rebuild_cache`), after which `matches` compares integers instead of
//! strings; unassigned filters fall back to string comparison. A
//! `rebuild_cache` returning false means the filter provably matches
//! nothing in the assigned block, so callers may skip it outright.

#[doc(hidden)]
mod test;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::reader::primitive::{find_key, find_tag};
use crate::reader::{Primitive, PrimitiveReader, PrimitiveTypeSet, StringTableReader};

pub type FilterRef = Arc<TagFilter>;

#[derive(Clone)]
enum FilterKind {
    Type(PrimitiveTypeSet),
    Constant(bool),
    Not(FilterRef),
    Or(Vec<FilterRef>),
    And(Vec<FilterRef>),
    Key(String),
    KeyValue {
        key: String,
        value: String,
    },
    KeyMultiValue {
        key: String,
        values: FxHashSet<String>,
    },
    MultiKey(FxHashSet<String>),
    MultiKeyMultiValue(FxHashMap<String, FxHashSet<String>>),
    KeyRegex(Regex),
    IntValue {
        key: String,
        value: i64,
    },
}

/// Per-block mutable state: the assigned table handle and the resolved ids.
#[derive(Default)]
struct FilterCache {
    table: Option<Arc<StringTableReader>>,
    dirty: bool,
    key_id: u32,
    value_id: u32,
    key_ids: FxHashSet<u32>,
    value_ids: FxHashSet<u32>,
    pair_ids: FxHashMap<u32, FxHashSet<u32>>,
    latest_match: Option<usize>,
}

pub struct TagFilter {
    kind: FilterKind,
    inverted: AtomicBool,
    cache: Mutex<FilterCache>,
}

#[inline]
fn lock(cache: &Mutex<FilterCache>) -> MutexGuard<'_, FilterCache> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TagFilter {
    fn with_kind(kind: FilterKind) -> FilterRef {
        Arc::new(TagFilter {
            kind,
            inverted: AtomicBool::new(false),
            cache: Mutex::new(FilterCache::default()),
        })
    }

    /// Matches primitives whose type is in `types`.
    pub fn primitive_type(types: PrimitiveTypeSet) -> FilterRef {
        TagFilter::with_kind(FilterKind::Type(types))
    }

    pub fn constant(value: bool) -> FilterRef {
        TagFilter::with_kind(FilterKind::Constant(value))
    }

    pub fn not(child: FilterRef) -> FilterRef {
        TagFilter::with_kind(FilterKind::Not(child))
    }

    /// Short-circuit disjunction; empty matches nothing.
    pub fn or(children: Vec<FilterRef>) -> FilterRef {
        TagFilter::with_kind(FilterKind::Or(children))
    }

    /// Short-circuit conjunction; empty matches everything.
    pub fn and(children: Vec<FilterRef>) -> FilterRef {
        TagFilter::with_kind(FilterKind::And(children))
    }

    /// Matches primitives carrying a tag with this key.
    pub fn key(key: &str) -> FilterRef {
        TagFilter::with_kind(FilterKind::Key(key.to_owned()))
    }

    /// Matches the exact (key, value) tag.
    pub fn key_value(key: &str, value: &str) -> FilterRef {
        TagFilter::with_kind(FilterKind::KeyValue {
            key: key.to_owned(),
            value: value.to_owned(),
        })
    }

    /// Matches a tag with this key whose value is in `values`.
    pub fn key_values(key: &str, values: &[&str]) -> FilterRef {
        TagFilter::with_kind(FilterKind::KeyMultiValue {
            key: key.to_owned(),
            values: values.iter().map(|v| (*v).to_owned()).collect(),
        })
    }

    /// Matches any tag whose key is in `keys`.
    pub fn keys(keys: &[&str]) -> FilterRef {
        TagFilter::with_kind(FilterKind::MultiKey(
            keys.iter().map(|k| (*k).to_owned()).collect(),
        ))
    }

    /// Matches any tag (k, v) with v in the value set configured for k.
    pub fn key_value_map(entries: &[(&str, &[&str])]) -> FilterRef {
        TagFilter::with_kind(FilterKind::MultiKeyMultiValue(
            entries
                .iter()
                .map(|(key, values)| {
                    (
                        (*key).to_owned(),
                        values.iter().map(|v| (*v).to_owned()).collect(),
                    )
                })
                .collect(),
        ))
    }

    /// Matches any tag whose key matches the compiled regex.
    pub fn key_regex(pattern: Regex) -> FilterRef {
        TagFilter::with_kind(FilterKind::KeyRegex(pattern))
    }

    /// Matches a tag with `key` whose value, parsed as a base-10 integer
    /// consuming the entire string, equals `value`.
    pub fn int_value(key: &str, value: i64) -> FilterRef {
        TagFilter::with_kind(FilterKind::IntValue {
            key: key.to_owned(),
            value,
        })
    }

    /// Matches a boolean tag: true/yes/1 or false/no/0.
    pub fn bool_value(key: &str, value: bool) -> FilterRef {
        if value {
            TagFilter::key_values(key, &["true", "yes", "1"])
        } else {
            TagFilter::key_values(key, &["false", "no", "0"])
        }
    }

    /// Toggles the result negation; returns the new state.
    pub fn invert(&self) -> bool {
        !self.inverted.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn set_inverted(&self, value: bool) {
        self.inverted.store(value, Ordering::Relaxed);
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted.load(Ordering::Relaxed)
    }

    /// Binds the filter tree to a block (or unbinds with `None`). Caches go
    /// dirty whenever the block changed; call `rebuild_cache` before
    /// matching.
    pub fn assign_block(&self, reader: Option<&PrimitiveReader>) {
        self.assign_table(reader.map(|r| r.shared_string_table()));
    }

    fn assign_table(&self, table: Option<Arc<StringTableReader>>) {
        match &self.kind {
            FilterKind::Not(child) => child.assign_table(table.clone()),
            FilterKind::Or(children) | FilterKind::And(children) => {
                for child in children {
                    child.assign_table(table.clone());
                }
            }
            _ => {}
        }

        let mut cache = lock(&self.cache);
        let changed = match (&cache.table, &table) {
            (Some(current), Some(next)) => !Arc::ptr_eq(current, next),
            (None, None) => false,
            _ => true,
        };
        if changed {
            cache.table = table;
            cache.dirty = true;
        }
    }

    /// Resolves configured strings against the assigned block's string
    /// table. Returns false only when the filter provably matches nothing
    /// in this block; unassigned filters return true. Children are always
    /// all rebuilt.
    pub fn rebuild_cache(&self) -> bool {
        match &self.kind {
            FilterKind::Constant(value) => *value,
            FilterKind::Type(types) => !types.is_empty(),
            FilterKind::Not(child) => {
                child.rebuild_cache();
                // A child matching nothing makes the inversion match
                // everything; nothing provable either way.
                true
            }
            FilterKind::Or(children) => children.iter().fold(false, |any, child| {
                let rebuilt = child.rebuild_cache();
                any | rebuilt
            }),
            FilterKind::And(children) => children.iter().fold(true, |all, child| {
                let rebuilt = child.rebuild_cache();
                all & rebuilt
            }),
            _ => {
                let mut cache = lock(&self.cache);
                self.rebuild_leaf(&mut cache)
            }
        }
    }

    fn rebuild_leaf(&self, cache: &mut FilterCache) -> bool {
        cache.dirty = false;

        let Some(table) = cache.table.clone() else {
            cache.key_id = 0;
            cache.value_id = 0;
            cache.key_ids.clear();
            cache.value_ids.clear();
            cache.pair_ids.clear();
            return true;
        };

        match &self.kind {
            FilterKind::Key(key) => {
                cache.key_id = table.find(key);
                cache.key_id != 0
            }
            FilterKind::KeyValue { key, value } => {
                cache.key_id = table.find(key);
                cache.value_id = table.find(value);
                cache.key_id != 0 && cache.value_id != 0
            }
            FilterKind::KeyMultiValue { key, values } => {
                cache.key_id = table.find(key);
                cache.value_ids = table
                    .entries()
                    .filter(|(_, entry)| values.contains(*entry))
                    .map(|(id, _)| id)
                    .collect();
                cache.key_id != 0 && !cache.value_ids.is_empty()
            }
            FilterKind::MultiKey(keys) => {
                cache.key_ids = table
                    .entries()
                    .filter(|(_, entry)| keys.contains(*entry))
                    .map(|(id, _)| id)
                    .collect();
                !cache.key_ids.is_empty()
            }
            FilterKind::MultiKeyMultiValue(map) => {
                cache.pair_ids.clear();
                for (key, values) in map {
                    let key_id = table.find(key);
                    if key_id == 0 {
                        continue;
                    }
                    let value_ids: FxHashSet<u32> = table
                        .entries()
                        .filter(|(_, entry)| values.contains(*entry))
                        .map(|(id, _)| id)
                        .collect();
                    if !value_ids.is_empty() {
                        cache.pair_ids.insert(key_id, value_ids);
                    }
                }
                !cache.pair_ids.is_empty()
            }
            FilterKind::KeyRegex(pattern) => {
                cache.key_ids = table
                    .entries()
                    .filter(|(_, entry)| pattern.is_match(entry))
                    .map(|(id, _)| id)
                    .collect();
                !cache.key_ids.is_empty()
            }
            FilterKind::IntValue { key, value } => {
                cache.key_id = table.find(key);
                // Every spelling that parses to the target counts.
                cache.value_ids = table
                    .entries()
                    .filter(|(_, entry)| entry.parse::<i64>() == Ok(*value))
                    .map(|(id, _)| id)
                    .collect();
                cache.key_id != 0 && !cache.value_ids.is_empty()
            }
            // Composite and constant kinds never reach here.
            _ => true,
        }
    }

    /// Evaluates the predicate, applying this node's inversion flag.
    pub fn matches<P: Primitive + ?Sized>(&self, primitive: &P) -> bool {
        let result = self.p_matches(primitive);
        if self.inverted.load(Ordering::Relaxed) {
            !result
        } else {
            result
        }
    }

    fn p_matches<P: Primitive + ?Sized>(&self, primitive: &P) -> bool {
        match &self.kind {
            FilterKind::Constant(value) => *value,
            FilterKind::Type(types) => types.contains(primitive.primitive_type()),
            FilterKind::Not(child) => !child.matches(primitive),
            FilterKind::Or(children) => children.iter().any(|child| child.matches(primitive)),
            FilterKind::And(children) => children.iter().all(|child| child.matches(primitive)),
            _ => self.match_leaf(primitive),
        }
    }

    fn match_leaf<P: Primitive + ?Sized>(&self, primitive: &P) -> bool {
        let mut cache = lock(&self.cache);
        if cache.dirty {
            self.rebuild_leaf(&mut cache);
        }
        cache.latest_match = None;
        let assigned = cache.table.is_some();

        match &self.kind {
            FilterKind::Key(key) => {
                if key.is_empty() {
                    return false;
                }
                if assigned {
                    cache.latest_match = find_key(primitive, cache.key_id);
                    cache.latest_match.is_some()
                } else {
                    for i in 0..primitive.tags_len() {
                        if primitive.key(i) == key {
                            cache.latest_match = Some(i);
                            return true;
                        }
                    }
                    false
                }
            }
            FilterKind::KeyValue { key, value } => {
                if key.is_empty() {
                    return false;
                }
                if assigned {
                    cache.latest_match = find_tag(primitive, cache.key_id, cache.value_id);
                    cache.latest_match.is_some()
                } else {
                    for i in 0..primitive.tags_len() {
                        if primitive.key(i) == key && primitive.value(i) == value {
                            cache.latest_match = Some(i);
                            return true;
                        }
                    }
                    false
                }
            }
            FilterKind::KeyMultiValue { key, values } => {
                if key.is_empty() {
                    return false;
                }
                if assigned {
                    if cache.key_id == 0 || cache.value_ids.is_empty() {
                        return false;
                    }
                    for i in 0..primitive.tags_len() {
                        if primitive.key_id(i) == cache.key_id
                            && cache.value_ids.contains(&primitive.value_id(i))
                        {
                            cache.latest_match = Some(i);
                            return true;
                        }
                    }
                    false
                } else {
                    for i in 0..primitive.tags_len() {
                        if primitive.key(i) == key && values.contains(primitive.value(i)) {
                            cache.latest_match = Some(i);
                            return true;
                        }
                    }
                    false
                }
            }
            FilterKind::MultiKey(keys) => {
                for i in 0..primitive.tags_len() {
                    let hit = if assigned {
                        cache.key_ids.contains(&primitive.key_id(i))
                    } else {
                        keys.contains(primitive.key(i))
                    };
                    if hit {
                        cache.latest_match = Some(i);
                        return true;
                    }
                }
                false
            }
            FilterKind::MultiKeyMultiValue(map) => {
                for i in 0..primitive.tags_len() {
                    let hit = if assigned {
                        cache
                            .pair_ids
                            .get(&primitive.key_id(i))
                            .is_some_and(|values| values.contains(&primitive.value_id(i)))
                    } else {
                        map.get(primitive.key(i))
                            .is_some_and(|values| values.contains(primitive.value(i)))
                    };
                    if hit {
                        cache.latest_match = Some(i);
                        return true;
                    }
                }
                false
            }
            FilterKind::KeyRegex(pattern) => {
                for i in 0..primitive.tags_len() {
                    let hit = if assigned {
                        cache.key_ids.contains(&primitive.key_id(i))
                    } else {
                        pattern.is_match(primitive.key(i))
                    };
                    if hit {
                        cache.latest_match = Some(i);
                        return true;
                    }
                }
                false
            }
            FilterKind::IntValue { key, value } => {
                if key.is_empty() {
                    return false;
                }
                if assigned {
                    if cache.key_id == 0 || cache.value_ids.is_empty() {
                        return false;
                    }
                    for i in 0..primitive.tags_len() {
                        if primitive.key_id(i) == cache.key_id
                            && cache.value_ids.contains(&primitive.value_id(i))
                        {
                            cache.latest_match = Some(i);
                            return true;
                        }
                    }
                    false
                } else {
                    for i in 0..primitive.tags_len() {
                        if primitive.key(i) == key
                            && primitive.value(i).parse::<i64>() == Ok(*value)
                        {
                            cache.latest_match = Some(i);
                            return true;
                        }
                    }
                    false
                }
            }
            // Composite and constant kinds are handled in p_matches.
            _ => false,
        }
    }

    /// Index of the tag the last successful leaf match landed on.
    pub fn matching_tag(&self) -> Option<usize> {
        lock(&self.cache).latest_match
    }

    /// Deep copy of the DAG. Shared children stay shared in the copy; the
    /// copies start with clean caches.
    pub fn copy(self: &Arc<Self>) -> FilterRef {
        let mut copies = CopyMap::default();
        self.copy_with(&mut copies)
    }

    fn copy_with(self: &Arc<Self>, copies: &mut CopyMap) -> FilterRef {
        let address = Arc::as_ptr(self) as usize;
        if let Some(existing) = copies.get(&address) {
            return Arc::clone(existing);
        }

        let kind = match &self.kind {
            FilterKind::Not(child) => FilterKind::Not(child.copy_with(copies)),
            FilterKind::Or(children) => FilterKind::Or(
                children.iter().map(|child| child.copy_with(copies)).collect(),
            ),
            FilterKind::And(children) => FilterKind::And(
                children.iter().map(|child| child.copy_with(copies)).collect(),
            ),
            other => other.clone(),
        };

        let copied = Arc::new(TagFilter {
            kind,
            inverted: AtomicBool::new(self.inverted.load(Ordering::Relaxed)),
            cache: Mutex::new(FilterCache::default()),
        });
        copies.insert(address, Arc::clone(&copied));
        copied
    }
}

type CopyMap = FxHashMap<usize, FilterRef>;

#[cfg(test)]
impl TagFilter {
    pub(crate) fn children(&self) -> Vec<FilterRef> {
        match &self.kind {
            FilterKind::Not(child) => vec![Arc::clone(child)],
            FilterKind::Or(children) | FilterKind::And(children) => children.to_vec(),
            _ => Vec::new(),
        }
    }
}

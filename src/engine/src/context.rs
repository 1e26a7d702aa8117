//! Context sets and satisfaction matching
//!
//! A context is a `(key, value)` tag pair restricting when a node applies,
//! e.g. `server=survival` or `world=nether`. A context set may carry several
//! values for the same key. Two variants exist: `MutableContextSet` is the
//! builder, `ImmutableContextSet` is frozen, hashable and usable as a cache
//! key. Set equality is independent of insertion order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Governs how a node's context set must be satisfied by a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSatisfyMode {
    /// For every key in the node's set, at least one of its values must
    /// appear under the same key in the query.
    #[default]
    AtLeastOneValuePerKey,

    /// Every `(key, value)` pair in the node's set must appear in the query.
    AllValuesPerKey,
}

/// A single context tag.
///
/// Keys and values are normalized to lowercase with surrounding whitespace
/// removed; an entry with an empty key or value is silently rejected by the
/// set insertion methods.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Context {
    pub key: String,
    pub value: String,
}

impl Context {
    fn normalize(key: &str, value: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        let value = value.trim().to_lowercase();
        if key.is_empty() || value.is_empty() {
            return None;
        }
        Some(Context { key, value })
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Frozen context set, usable as a map key.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImmutableContextSet {
    entries: BTreeSet<Context>,
}

/// Builder counterpart of [`ImmutableContextSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutableContextSet {
    entries: BTreeSet<Context>,
}

impl ImmutableContextSet {
    /// The empty (global) context set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a frozen set from `(key, value)` pairs
    pub fn of<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut set = MutableContextSet::new();
        for (k, v) in pairs {
            set.add(k.as_ref(), v.as_ref());
        }
        set.freeze()
    }

    /// Builds a single-entry set
    pub fn singleton(key: &str, value: &str) -> Self {
        Self::of([(key, value)])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &str, value: &str) -> bool {
        match Context::normalize(key, value) {
            Some(ctx) => self.entries.contains(&ctx),
            None => false,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let key = key.trim().to_lowercase();
        self.entries.iter().any(|c| c.key == key)
    }

    /// All values held under `key`
    pub fn values_of<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> {
        let key = key.trim().to_lowercase();
        self.entries
            .iter()
            .filter(move |c| c.key == key)
            .map(|c| c.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Context> {
        self.entries.iter()
    }

    /// Unfreezes into a builder copy
    pub fn mutable_copy(&self) -> MutableContextSet {
        MutableContextSet {
            entries: self.entries.clone(),
        }
    }

    /// Whether this set (a node's scope) is satisfied by `query`.
    ///
    /// The empty set is global scope and always satisfied.
    pub fn satisfied_by(&self, query: &ImmutableContextSet, mode: ContextSatisfyMode) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        match mode {
            ContextSatisfyMode::AllValuesPerKey => self
                .entries
                .iter()
                .all(|ctx| query.entries.contains(ctx)),
            ContextSatisfyMode::AtLeastOneValuePerKey => {
                let mut keys_seen: Option<&str> = None;
                let mut satisfied = true;
                let mut any = false;
                for ctx in &self.entries {
                    // entries are sorted, so values of a key are adjacent
                    if keys_seen != Some(ctx.key.as_str()) {
                        if keys_seen.is_some() && !any {
                            satisfied = false;
                        }
                        keys_seen = Some(ctx.key.as_str());
                        any = false;
                    }
                    if query.entries.contains(ctx) {
                        any = true;
                    }
                }
                satisfied && any
            }
        }
    }
}

impl MutableContextSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag; empty keys or values are ignored
    pub fn add(&mut self, key: &str, value: &str) -> &mut Self {
        if let Some(ctx) = Context::normalize(key, value) {
            self.entries.insert(ctx);
        }
        self
    }

    /// Removes a tag if present
    pub fn remove(&mut self, key: &str, value: &str) -> &mut Self {
        if let Some(ctx) = Context::normalize(key, value) {
            self.entries.remove(&ctx);
        }
        self
    }

    /// Removes every value held under `key`
    pub fn remove_all(&mut self, key: &str) -> &mut Self {
        let key = key.trim().to_lowercase();
        self.entries.retain(|c| c.key != key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freezes into the immutable variant
    pub fn freeze(self) -> ImmutableContextSet {
        ImmutableContextSet {
            entries: self.entries,
        }
    }
}

impl<'a> IntoIterator for &'a ImmutableContextSet {
    type Item = &'a Context;
    type IntoIter = std::collections::btree_set::Iter<'a, Context>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for ImmutableContextSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for ctx in &self.entries {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", ctx)?;
            first = false;
        }
        Ok(())
    }
}

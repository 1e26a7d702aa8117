//! Immutable permission and metadata nodes
//!
//! A node is a single fact attached to a holder: a permission grant or
//! negation, a group membership, a chat-meta entry, a weight, or a display
//! name. Nodes are immutable once built; mutating a holder means replacing
//! one node with another in its collection.
//!
//! The raw key grammar mirrors what the storage layer persists:
//!
//! - `group.<name>`                - inheritance
//! - `prefix.<priority>.<value>`   - prefix
//! - `suffix.<priority>.<value>`   - suffix
//! - `meta.<key>.<value>`          - meta
//! - `weight.<n>`                  - weight
//! - `displayname.<name>`         - display name
//! - `r=<pattern>` / `R=<pattern>` - regex permission
//! - anything else                 - plain permission

pub mod wildcard;

use crate::context::ImmutableContextSet;
use crate::model::{DataType, HolderIdentifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The typed payload of a [`Node`], discriminated by its key grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// A plain permission string
    Permission,

    /// A permission expressed as a regular expression over permission keys
    RegexPermission { pattern: String },

    /// Membership of (inheritance from) a group
    Inheritance { group: String },

    /// An arbitrary meta key/value pair
    Meta { meta_key: String, meta_value: String },

    /// A chat prefix with priority
    Prefix { priority: i32, value: String },

    /// A chat suffix with priority
    Suffix { priority: i32, value: String },

    /// A weight entry, the holder-level tie-break priority
    Weight { weight: i32 },

    /// A display name override
    DisplayName { name: String },
}

/// Where a node came from: which holder contributed it, and from which of
/// the holder's two collections. Stamped when the node enters a collection;
/// used for own-vs-inherited tie breaks and for explaining results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InheritanceOrigin {
    pub holder: HolderIdentifier,
    pub data_type: DataType,
}

/// An immutable, context-scoped permission or metadata fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    key: String,
    kind: NodeKind,
    value: bool,
    contexts: ImmutableContextSet,
    expiry: Option<DateTime<Utc>>,
    origin: Option<InheritanceOrigin>,
}

impl Node {
    /// Starts a builder for a raw key, inferring the kind from the grammar
    pub fn builder(key: &str) -> NodeBuilder {
        NodeBuilder::new(key.to_string(), parse_kind(key))
    }

    /// A plain permission node builder
    pub fn permission(key: &str) -> NodeBuilder {
        NodeBuilder::new(key.to_string(), NodeKind::Permission)
    }

    /// A regex permission node builder
    pub fn regex_permission(pattern: &str) -> NodeBuilder {
        NodeBuilder::new(
            format!("r={}", pattern),
            NodeKind::RegexPermission {
                pattern: pattern.to_string(),
            },
        )
    }

    /// An inheritance node builder for the named group
    pub fn inheritance(group: &str) -> NodeBuilder {
        let group = group.to_lowercase();
        NodeBuilder::new(
            format!("group.{}", group),
            NodeKind::Inheritance { group },
        )
    }

    /// A meta node builder
    pub fn meta(key: &str, value: &str) -> NodeBuilder {
        NodeBuilder::new(
            format!("meta.{}.{}", key, value),
            NodeKind::Meta {
                meta_key: key.to_string(),
                meta_value: value.to_string(),
            },
        )
    }

    /// A prefix node builder
    pub fn prefix(value: &str, priority: i32) -> NodeBuilder {
        NodeBuilder::new(
            format!("prefix.{}.{}", priority, value),
            NodeKind::Prefix {
                priority,
                value: value.to_string(),
            },
        )
    }

    /// A suffix node builder
    pub fn suffix(value: &str, priority: i32) -> NodeBuilder {
        NodeBuilder::new(
            format!("suffix.{}.{}", priority, value),
            NodeKind::Suffix {
                priority,
                value: value.to_string(),
            },
        )
    }

    /// A weight node builder
    pub fn weight(weight: i32) -> NodeBuilder {
        NodeBuilder::new(format!("weight.{}", weight), NodeKind::Weight { weight })
    }

    /// A display name node builder
    pub fn display_name(name: &str) -> NodeBuilder {
        NodeBuilder::new(
            format!("displayname.{}", name),
            NodeKind::DisplayName {
                name: name.to_string(),
            },
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Whether this node grants (`true`) or explicitly negates (`false`)
    pub fn value(&self) -> bool {
        self.value
    }

    pub fn contexts(&self) -> &ImmutableContextSet {
        &self.contexts
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// Whether the node is temporary (carries an expiry)
    pub fn is_temporary(&self) -> bool {
        self.expiry.is_some()
    }

    /// Whether the node has expired as of `now`
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry, Some(expiry) if expiry <= now)
    }

    pub fn origin(&self) -> Option<&InheritanceOrigin> {
        self.origin.as_ref()
    }

    /// Copy of this node stamped with the contributing holder's origin
    pub(crate) fn stamped(&self, holder: HolderIdentifier, data_type: DataType) -> Node {
        let mut node = self.clone();
        node.origin = Some(InheritanceOrigin { holder, data_type });
        node
    }

    /// Whether the key is a wildcard permission (`a.b.*` or the root `*`)
    pub fn is_wildcard(&self) -> bool {
        matches!(self.kind, NodeKind::Permission) && wildcard::is_wildcard(&self.key)
    }

    /// Specificity of a wildcard permission: segments before the marker.
    /// `None` for non-wildcard nodes; the root `*` is level 0.
    pub fn wildcard_level(&self) -> Option<usize> {
        if self.is_wildcard() {
            wildcard::level(&self.key)
        } else {
            None
        }
    }

    /// Equality ignoring provenance, used when replacing nodes in a
    /// holder's collection
    pub fn equals_ignoring_origin(&self, other: &Node) -> bool {
        self.key == other.key
            && self.value == other.value
            && self.contexts == other.contexts
            && self.expiry == other.expiry
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)?;
        if !self.contexts.is_empty() {
            write!(f, " ({})", self.contexts)?;
        }
        Ok(())
    }
}

/// Builder for [`Node`]
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    key: String,
    kind: NodeKind,
    value: bool,
    contexts: ImmutableContextSet,
    expiry: Option<DateTime<Utc>>,
    origin: Option<InheritanceOrigin>,
}

impl NodeBuilder {
    fn new(key: String, kind: NodeKind) -> Self {
        Self {
            key,
            kind,
            value: true,
            contexts: ImmutableContextSet::empty(),
            expiry: None,
            origin: None,
        }
    }

    pub fn value(mut self, value: bool) -> Self {
        self.value = value;
        self
    }

    /// Adds a single context tag to the node's scope
    pub fn context(mut self, key: &str, value: &str) -> Self {
        let mut set = self.contexts.mutable_copy();
        set.add(key, value);
        self.contexts = set.freeze();
        self
    }

    /// Replaces the node's scope wholesale
    pub fn contexts(mut self, contexts: ImmutableContextSet) -> Self {
        self.contexts = contexts;
        self
    }

    pub fn expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn origin(mut self, holder: HolderIdentifier, data_type: DataType) -> Self {
        self.origin = Some(InheritanceOrigin { holder, data_type });
        self
    }

    pub fn build(self) -> Node {
        Node {
            key: self.key,
            kind: self.kind,
            value: self.value,
            contexts: self.contexts,
            expiry: self.expiry,
            origin: self.origin,
        }
    }
}

/// Recovers the node kind from a raw key string.
///
/// Keys that look like a typed node but fail to parse (e.g. a prefix with a
/// non-numeric priority) fall back to plain permissions rather than erroring,
/// matching what the storage layer may feed in.
fn parse_kind(key: &str) -> NodeKind {
    let lower = key.to_lowercase();

    if let Some(pattern) = key.strip_prefix("r=").or_else(|| key.strip_prefix("R=")) {
        return NodeKind::RegexPermission {
            pattern: pattern.to_string(),
        };
    }

    if let Some(group) = lower.strip_prefix("group.") {
        if !group.is_empty() {
            return NodeKind::Inheritance {
                group: group.to_string(),
            };
        }
    }

    if let Some(rest) = key.strip_prefix("prefix.") {
        if let Some((priority, value)) = split_chat_meta(rest) {
            return NodeKind::Prefix { priority, value };
        }
    }

    if let Some(rest) = key.strip_prefix("suffix.") {
        if let Some((priority, value)) = split_chat_meta(rest) {
            return NodeKind::Suffix { priority, value };
        }
    }

    if let Some(rest) = key.strip_prefix("meta.") {
        if let Some((meta_key, meta_value)) = rest.split_once('.') {
            if !meta_key.is_empty() {
                return NodeKind::Meta {
                    meta_key: meta_key.to_string(),
                    meta_value: meta_value.to_string(),
                };
            }
        }
    }

    if let Some(rest) = lower.strip_prefix("weight.") {
        if let Ok(weight) = rest.parse::<i32>() {
            return NodeKind::Weight { weight };
        }
    }

    if let Some(name) = key.strip_prefix("displayname.") {
        if !name.is_empty() {
            return NodeKind::DisplayName {
                name: name.to_string(),
            };
        }
    }

    NodeKind::Permission
}

fn split_chat_meta(rest: &str) -> Option<(i32, String)> {
    let (priority, value) = rest.split_once('.')?;
    let priority = priority.parse::<i32>().ok()?;
    if value.is_empty() {
        return None;
    }
    Some((priority, value.to_string()))
}

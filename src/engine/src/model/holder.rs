//! Permission holders and their copy-on-write node collections

use super::{DataType, HolderIdentifier, HolderType};
use crate::context::ImmutableContextSet;
use crate::node::{Node, NodeKind};
use crate::query::QueryOptions;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

type ContextMap = HashMap<ImmutableContextSet, Vec<Node>>;

/// A holder's node collection, partitioned by context set.
///
/// Reads snapshot an `Arc` of the whole map and never block on writers;
/// writers clone, modify and swap. Every node entering the map is stamped
/// with the owning holder's origin.
pub struct NodeMap {
    owner: HolderIdentifier,
    data_type: DataType,
    inner: RwLock<Arc<ContextMap>>,
}

impl NodeMap {
    fn new(owner: HolderIdentifier, data_type: DataType) -> Self {
        Self {
            owner,
            data_type,
            inner: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// A consistent point-in-time view of the collection
    pub fn snapshot(&self) -> Arc<ContextMap> {
        self.inner.read().clone()
    }

    /// Adds a node, replacing any existing node equal up to provenance.
    /// Returns `false` if an identical node was already present.
    pub fn add(&self, node: Node) -> bool {
        let node = node.stamped(self.owner.clone(), self.data_type);
        let mut guard = self.inner.write();
        let mut map = (**guard).clone();
        let bucket = map.entry(node.contexts().clone()).or_default();
        if bucket.iter().any(|n| n == &node) {
            return false;
        }
        bucket.retain(|n| !(n.key() == node.key() && n.contexts() == node.contexts()));
        bucket.push(node);
        *guard = Arc::new(map);
        true
    }

    /// Removes a node matching up to provenance. Returns whether anything
    /// was removed.
    pub fn remove(&self, node: &Node) -> bool {
        let mut guard = self.inner.write();
        let mut map = (**guard).clone();
        let mut removed = false;
        if let Some(bucket) = map.get_mut(node.contexts()) {
            let before = bucket.len();
            bucket.retain(|n| !n.equals_ignoring_origin(node));
            removed = bucket.len() != before;
            if bucket.is_empty() {
                map.remove(node.contexts());
            }
        }
        if removed {
            *guard = Arc::new(map);
        }
        removed
    }

    /// Replaces the whole collection, e.g. after a storage reload
    pub fn set_content<I: IntoIterator<Item = Node>>(&self, nodes: I) {
        let mut map: ContextMap = HashMap::new();
        for node in nodes {
            let node = node.stamped(self.owner.clone(), self.data_type);
            map.entry(node.contexts().clone()).or_default().push(node);
        }
        *self.inner.write() = Arc::new(map);
    }

    pub fn clear(&self) {
        *self.inner.write() = Arc::new(HashMap::new());
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Nodes applying under `query` as of `now`. Buckets with more specific
    /// context sets come first so the flattened order is deterministic.
    pub fn active_nodes(
        &self,
        query: &QueryOptions,
        now: DateTime<Utc>,
        out: &mut Vec<Node>,
    ) {
        let snapshot = self.snapshot();
        let mut matching: Vec<_> = snapshot
            .iter()
            .filter(|(contexts, _)| query.satisfies(contexts))
            .collect();
        matching.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

        for (_, bucket) in matching {
            for node in bucket {
                if !query.flags().include_expired && node.has_expired(now) {
                    continue;
                }
                out.push(node.clone());
            }
        }
    }
}

/// A user or group owning two node collections: an enduring one the storage
/// layer persists, and a transient one that lives only for the process.
pub struct PermissionHolder {
    identifier: HolderIdentifier,
    enduring: NodeMap,
    transient: NodeMap,
}

impl PermissionHolder {
    fn new(identifier: HolderIdentifier) -> Self {
        Self {
            enduring: NodeMap::new(identifier.clone(), DataType::Enduring),
            transient: NodeMap::new(identifier.clone(), DataType::Transient),
            identifier,
        }
    }

    pub fn identifier(&self) -> &HolderIdentifier {
        &self.identifier
    }

    pub fn holder_type(&self) -> HolderType {
        self.identifier.holder_type
    }

    pub fn nodes(&self, data_type: DataType) -> &NodeMap {
        match data_type {
            DataType::Enduring => &self.enduring,
            DataType::Transient => &self.transient,
        }
    }

    /// The holder's own nodes applying under `query`, transient before
    /// enduring
    pub fn active_nodes(&self, query: &QueryOptions, now: DateTime<Utc>) -> Vec<Node> {
        let mut out = Vec::new();
        self.transient.active_nodes(query, now, &mut out);
        self.enduring.active_nodes(query, now, &mut out);
        out
    }

    /// Names of groups this holder directly inherits under `query`
    pub fn inherited_group_names(&self, query: &QueryOptions, now: DateTime<Utc>) -> Vec<String> {
        self.active_nodes(query, now)
            .into_iter()
            .filter(|node| node.value())
            .filter_map(|node| match node.kind() {
                NodeKind::Inheritance { group } => Some(group.clone()),
                _ => None,
            })
            .collect()
    }

    /// The holder's weight: the maximum active `Weight` node value in the
    /// global context, or `None` if it has none
    pub fn weight(&self) -> Option<i32> {
        let now = Utc::now();
        self.active_nodes(&QueryOptions::non_contextual(), now)
            .iter()
            .filter(|node| node.value())
            .filter_map(|node| match node.kind() {
                NodeKind::Weight { weight } => Some(*weight),
                _ => None,
            })
            .max()
    }
}

/// A group holder. Groups are inheritance targets and carry a weight used
/// to order multi-parent inheritance.
pub struct Group {
    holder: Arc<PermissionHolder>,
}

impl Group {
    pub fn new(name: &str) -> Self {
        Self {
            holder: Arc::new(PermissionHolder::new(HolderIdentifier::group(name))),
        }
    }

    pub fn name(&self) -> &str {
        &self.holder.identifier().name
    }

    pub fn holder(&self) -> &Arc<PermissionHolder> {
        &self.holder
    }

    pub fn weight(&self) -> Option<i32> {
        self.holder.weight()
    }
}

/// A user holder. Users additionally carry a primary group name.
pub struct User {
    holder: Arc<PermissionHolder>,
    username: RwLock<Option<String>>,
    primary_group: RwLock<String>,
}

/// The primary group users start in
pub const DEFAULT_PRIMARY_GROUP: &str = "default";

impl User {
    pub fn new(id: Uuid, username: Option<&str>) -> Self {
        Self {
            holder: Arc::new(PermissionHolder::new(HolderIdentifier::user(id))),
            username: RwLock::new(username.map(|s| s.to_string())),
            primary_group: RwLock::new(DEFAULT_PRIMARY_GROUP.to_string()),
        }
    }

    pub fn holder(&self) -> &Arc<PermissionHolder> {
        &self.holder
    }

    pub fn username(&self) -> Option<String> {
        self.username.read().clone()
    }

    pub fn set_username(&self, username: Option<&str>) {
        *self.username.write() = username.map(|s| s.to_string());
    }

    pub fn primary_group(&self) -> String {
        self.primary_group.read().clone()
    }

    pub fn set_primary_group(&self, group: &str) {
        *self.primary_group.write() = group.to_lowercase();
    }
}

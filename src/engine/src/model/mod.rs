//! Permission holders and the boundary traits the engine consumes
//!
//! The engine never creates or destroys holders; the storage/housekeeping
//! layers own their lifecycle. The engine only reads node collections and
//! looks groups and tracks up through the [`GroupResolver`] and
//! [`TrackResolver`] traits.

mod holder;

pub use holder::{Group, NodeMap, PermissionHolder, User, DEFAULT_PRIMARY_GROUP};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which of a holder's two node collections a node lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Persisted by the storage layer
    Enduring,
    /// Runtime-only, never persisted
    Transient,
}

/// Whether a holder is a user or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderType {
    User,
    Group,
}

/// Identity of a holder: type plus name (a UUID string for users, the group
/// name for groups).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HolderIdentifier {
    pub holder_type: HolderType,
    pub name: String,
}

impl HolderIdentifier {
    pub fn user(id: uuid::Uuid) -> Self {
        Self {
            holder_type: HolderType::User,
            name: id.to_string(),
        }
    }

    pub fn group(name: &str) -> Self {
        Self {
            holder_type: HolderType::Group,
            name: name.to_lowercase(),
        }
    }
}

impl fmt::Display for HolderIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.holder_type {
            HolderType::User => write!(f, "user:{}", self.name),
            HolderType::Group => write!(f, "group:{}", self.name),
        }
    }
}

/// Group lookup, consumed from the storage layer.
///
/// A name that resolves to nothing is not an error; the group simply
/// contributes no nodes.
pub trait GroupResolver: Send + Sync {
    fn resolve_group(&self, name: &str) -> Option<Arc<Group>>;
}

/// Track membership lookup, consumed by the on-track meta stack elements.
pub trait TrackResolver: Send + Sync {
    /// Whether `group` is on the named track. Unknown tracks contain
    /// nothing.
    fn track_contains(&self, track: &str, group: &str) -> bool;
}

/// In-memory group registry, suitable for tests and embedded use.
#[derive(Default)]
pub struct InMemoryGroupRegistry {
    groups: DashMap<String, Arc<Group>>,
}

impl InMemoryGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a group, replacing any previous one with the same name
    pub fn insert(&self, group: Arc<Group>) {
        self.groups.insert(group.name().to_string(), group);
    }

    /// Creates and registers an empty group
    pub fn get_or_create(&self, name: &str) -> Arc<Group> {
        self.groups
            .entry(name.to_lowercase())
            .or_insert_with(|| Arc::new(Group::new(name)))
            .clone()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.remove(&name.to_lowercase()).map(|(_, g)| g)
    }
}

impl GroupResolver for InMemoryGroupRegistry {
    fn resolve_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.get(&name.to_lowercase()).map(|g| g.clone())
    }
}

/// In-memory track registry.
#[derive(Default)]
pub struct InMemoryTrackRegistry {
    tracks: DashMap<String, Vec<String>>,
}

impl InMemoryTrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ordered group list for a track
    pub fn set_track(&self, name: &str, groups: Vec<String>) {
        let groups = groups.into_iter().map(|g| g.to_lowercase()).collect();
        self.tracks.insert(name.to_lowercase(), groups);
    }
}

impl TrackResolver for InMemoryTrackRegistry {
    fn track_contains(&self, track: &str, group: &str) -> bool {
        let group = group.to_lowercase();
        self.tracks
            .get(&track.to_lowercase())
            .map(|groups| groups.contains(&group))
            .unwrap_or(false)
    }
}

/// A [`TrackResolver`] that knows no tracks.
pub struct NoTracks;

impl TrackResolver for NoTracks {
    fn track_contains(&self, _track: &str, _group: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_display() {
        assert_eq!(HolderIdentifier::group("Admin").to_string(), "group:admin");
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            HolderIdentifier::user(id).to_string(),
            format!("user:{}", id)
        );
    }

    #[test]
    fn test_group_registry() {
        let registry = InMemoryGroupRegistry::new();
        let group = registry.get_or_create("Admin");
        assert_eq!(group.name(), "admin");
        assert!(registry.resolve_group("ADMIN").is_some());
        assert!(registry.resolve_group("missing").is_none());
        registry.remove("admin");
        assert!(registry.resolve_group("admin").is_none());
    }

    #[test]
    fn test_track_registry() {
        let registry = InMemoryTrackRegistry::new();
        registry.set_track("staff", vec!["mod".to_string(), "admin".to_string()]);
        assert!(registry.track_contains("staff", "mod"));
        assert!(registry.track_contains("STAFF", "Admin"));
        assert!(!registry.track_contains("staff", "default"));
        assert!(!registry.track_contains("missing", "mod"));
    }
}

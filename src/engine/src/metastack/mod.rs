//! Meta stacks
//!
//! A meta stack governs how multiple prefix/suffix contributions fold into a
//! single value. A [`MetaStackDefinition`] is an ordered list of
//! [`MetaStackElement`]s; each element owns one accumulation slot and is a
//! pure predicate over `(chat meta type, candidate node, current slot
//! content)` - internally a conjunction of a type check, a priority
//! comparison and an optional origin filter. The slot values are joined with
//! the definition's spacers after duplicate removal.

pub mod accumulator;

pub use accumulator::MetaAccumulator;

use crate::model::{HolderIdentifier, HolderType, TrackResolver};
use crate::node::{Node, NodeKind};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The two chat-meta node families a stack can fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMetaType {
    Prefix,
    Suffix,
}

impl ChatMetaType {
    /// The `(priority, value)` entry of `node` if it is of this type and
    /// active, `None` otherwise
    pub fn entry<'a>(&self, node: &'a Node) -> Option<(i32, &'a str)> {
        if !node.value() {
            return None;
        }
        match (self, node.kind()) {
            (ChatMetaType::Prefix, NodeKind::Prefix { priority, value }) => {
                Some((*priority, value.as_str()))
            }
            (ChatMetaType::Suffix, NodeKind::Suffix { priority, value }) => {
                Some((*priority, value.as_str()))
            }
            _ => None,
        }
    }
}

/// Evaluation surroundings for origin-sensitive elements: whose stack is
/// being folded, and how track membership is looked up.
pub struct StackContext<'a> {
    pub subject: &'a HolderIdentifier,
    pub tracks: &'a dyn TrackResolver,
}

/// A single stack element: decides whether a candidate node should replace
/// the element's current accumulation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaStackElement {
    /// Accept any higher-priority node
    Highest,
    /// Accept any lower-priority node
    Lowest,
    /// Highest priority among the subject's own nodes
    HighestOwn,
    /// Lowest priority among the subject's own nodes
    LowestOwn,
    /// Highest priority among inherited nodes
    HighestInherited,
    /// Lowest priority among inherited nodes
    LowestInherited,
    /// Highest priority among nodes from groups on the named track
    HighestOnTrack(String),
    /// Lowest priority among nodes from groups on the named track
    LowestOnTrack(String),
    /// Highest priority among nodes not from groups on the named track
    HighestNotOnTrack(String),
    /// Lowest priority among nodes not from groups on the named track
    LowestNotOnTrack(String),
}

impl MetaStackElement {
    /// Parses the configuration string form, e.g. `highest`,
    /// `lowest_own`, `highest_on_track_staff`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        match s.as_str() {
            "highest" => return Some(Self::Highest),
            "lowest" => return Some(Self::Lowest),
            "highest_own" => return Some(Self::HighestOwn),
            "lowest_own" => return Some(Self::LowestOwn),
            "highest_inherited" => return Some(Self::HighestInherited),
            "lowest_inherited" => return Some(Self::LowestInherited),
            _ => {}
        }
        for (prefix, ctor) in [
            (
                "highest_on_track_",
                Self::HighestOnTrack as fn(String) -> Self,
            ),
            ("lowest_on_track_", Self::LowestOnTrack),
            ("highest_not_on_track_", Self::HighestNotOnTrack),
            ("lowest_not_on_track_", Self::LowestNotOnTrack),
        ] {
            if let Some(track) = s.strip_prefix(prefix) {
                if !track.is_empty() {
                    return Some(ctor(track.to_string()));
                }
            }
        }
        None
    }

    /// Whether `node` should replace the element's `current` accumulation.
    pub fn should_accumulate(
        &self,
        ty: ChatMetaType,
        node: &Node,
        current: Option<&Node>,
        ctx: &StackContext<'_>,
    ) -> bool {
        let (priority, _) = match ty.entry(node) {
            Some(entry) => entry,
            None => return false,
        };

        let origin_check = match self {
            Self::Highest | Self::Lowest => true,
            Self::HighestOwn | Self::LowestOwn => is_own(node, ctx),
            Self::HighestInherited | Self::LowestInherited => !is_own(node, ctx),
            Self::HighestOnTrack(track) | Self::LowestOnTrack(track) => {
                from_group_on_track(node, track, ctx)
            }
            Self::HighestNotOnTrack(track) | Self::LowestNotOnTrack(track) => {
                !from_group_on_track(node, track, ctx)
            }
        };
        if !origin_check {
            return false;
        }

        let current_priority = current.and_then(|n| ty.entry(n)).map(|(p, _)| p);
        match current_priority {
            None => true,
            Some(cur) => {
                if self.is_highest() {
                    priority > cur
                } else {
                    priority < cur
                }
            }
        }
    }

    fn is_highest(&self) -> bool {
        matches!(
            self,
            Self::Highest
                | Self::HighestOwn
                | Self::HighestInherited
                | Self::HighestOnTrack(_)
                | Self::HighestNotOnTrack(_)
        )
    }
}

fn is_own(node: &Node, ctx: &StackContext<'_>) -> bool {
    match node.origin() {
        Some(origin) => &origin.holder == ctx.subject,
        // an unstamped node can only be the subject's own
        None => true,
    }
}

fn from_group_on_track(node: &Node, track: &str, ctx: &StackContext<'_>) -> bool {
    match node.origin() {
        Some(origin) if origin.holder.holder_type == HolderType::Group => {
            ctx.tracks.track_contains(track, &origin.holder.name)
        }
        _ => false,
    }
}

/// How duplicate values in the accumulated stack are folded before joining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateRemoval {
    /// Keep everything
    #[default]
    RetainAll,
    /// Remove duplicates, keeping the first occurrence
    FirstOnly,
    /// Remove duplicates, keeping the last occurrence
    LastOnly,
}

impl DuplicateRemoval {
    fn apply(self, values: Vec<String>) -> Vec<String> {
        match self {
            Self::RetainAll => values,
            Self::FirstOnly => {
                let mut seen = Vec::new();
                for v in values {
                    if !seen.contains(&v) {
                        seen.push(v);
                    }
                }
                seen
            }
            Self::LastOnly => {
                let mut kept: Vec<String> = Vec::new();
                for v in values.into_iter().rev() {
                    if !kept.contains(&v) {
                        kept.push(v);
                    }
                }
                kept.reverse();
                kept
            }
        }
    }
}

/// An immutable stack definition: elements plus formatting rules.
///
/// Definitions are shared across many evaluations, so the hash is computed
/// once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaStackDefinition {
    elements: Vec<MetaStackElement>,
    start_spacer: String,
    middle_spacer: String,
    end_spacer: String,
    duplicate_removal: DuplicateRemoval,
    cached_hash: u64,
}

impl MetaStackDefinition {
    pub fn new(
        elements: Vec<MetaStackElement>,
        start_spacer: &str,
        middle_spacer: &str,
        end_spacer: &str,
        duplicate_removal: DuplicateRemoval,
    ) -> Self {
        let mut def = Self {
            elements,
            start_spacer: start_spacer.to_string(),
            middle_spacer: middle_spacer.to_string(),
            end_spacer: end_spacer.to_string(),
            duplicate_removal,
            cached_hash: 0,
        };
        def.cached_hash = def.compute_hash();
        def
    }

    /// The default single-element definition: highest priority wins, no
    /// spacers.
    pub fn standard() -> Arc<Self> {
        Arc::new(Self::new(
            vec![MetaStackElement::Highest],
            "",
            "",
            "",
            DuplicateRemoval::RetainAll,
        ))
    }

    pub fn elements(&self) -> &[MetaStackElement] {
        &self.elements
    }

    fn compute_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        self.elements.hash(&mut hasher);
        self.start_spacer.hash(&mut hasher);
        self.middle_spacer.hash(&mut hasher);
        self.end_spacer.hash(&mut hasher);
        self.duplicate_removal.hash(&mut hasher);
        hasher.finish()
    }
}

impl Hash for MetaStackDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.cached_hash);
    }
}

/// Accumulation state for one chat-meta type: one slot per element.
pub struct MetaStack {
    definition: Arc<MetaStackDefinition>,
    ty: ChatMetaType,
    slots: Vec<Option<Node>>,
}

impl MetaStack {
    pub fn new(definition: Arc<MetaStackDefinition>, ty: ChatMetaType) -> Self {
        let slots = vec![None; definition.elements.len()];
        Self {
            definition,
            ty,
            slots,
        }
    }

    /// Offers a candidate node to every element's slot
    pub fn offer(&mut self, node: &Node, ctx: &StackContext<'_>) {
        for (element, slot) in self.definition.elements.iter().zip(self.slots.iter_mut()) {
            if element.should_accumulate(self.ty, node, slot.as_ref(), ctx) {
                *slot = Some(node.clone());
            }
        }
    }

    /// The node in the first filled slot, for provenance queries
    pub fn top(&self) -> Option<&Node> {
        self.slots.iter().flatten().next()
    }

    /// Folds the slot values into the formatted stack string; `None` if
    /// nothing accumulated.
    pub fn to_formatted_string(&self) -> Option<String> {
        let values: Vec<String> = self
            .slots
            .iter()
            .flatten()
            .filter_map(|node| self.ty.entry(node).map(|(_, v)| v.to_string()))
            .collect();
        if values.is_empty() {
            return None;
        }
        let values = self.definition.duplicate_removal.apply(values);

        let mut out = String::new();
        out.push_str(&self.definition.start_spacer);
        out.push_str(&values.join(&self.definition.middle_spacer));
        out.push_str(&self.definition.end_spacer);
        Some(out)
    }

    pub fn definition(&self) -> &Arc<MetaStackDefinition> {
        &self.definition
    }
}

//! Query options: the unit of evaluation and cache keying
//!
//! A query is fully defined by value so it can key a cache: the context set
//! the subject is being evaluated in, the satisfy mode that governs context
//! matching, and a small set of behavior flags.

use crate::context::{ContextSatisfyMode, ImmutableContextSet};
use serde::{Deserialize, Serialize};

/// Behavior flags carried by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryFlags {
    /// Include temporary nodes that have expired but not yet been purged
    pub include_expired: bool,

    /// Apply platform-provided default nodes where the host platform
    /// supplies them
    pub apply_platform_defaults: bool,
}

impl Default for QueryFlags {
    fn default() -> Self {
        Self {
            include_expired: false,
            apply_platform_defaults: true,
        }
    }
}

/// A context set plus evaluation flags; the cache key for computed data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryOptions {
    contexts: ImmutableContextSet,
    satisfy_mode: ContextSatisfyMode,
    flags: QueryFlags,
}

impl QueryOptions {
    /// A query in the global (empty) context
    pub fn non_contextual() -> Self {
        Self::default()
    }

    /// A query in the given context with default flags and satisfy mode
    pub fn contextual(contexts: ImmutableContextSet) -> Self {
        Self {
            contexts,
            ..Self::default()
        }
    }

    pub fn with_satisfy_mode(mut self, mode: ContextSatisfyMode) -> Self {
        self.satisfy_mode = mode;
        self
    }

    pub fn with_flags(mut self, flags: QueryFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn contexts(&self) -> &ImmutableContextSet {
        &self.contexts
    }

    pub fn satisfy_mode(&self) -> ContextSatisfyMode {
        self.satisfy_mode
    }

    pub fn flags(&self) -> QueryFlags {
        self.flags
    }

    /// Whether a node scoped to `scope` applies under this query
    pub fn satisfies(&self, scope: &ImmutableContextSet) -> bool {
        scope.satisfied_by(&self.contexts, self.satisfy_mode)
    }
}

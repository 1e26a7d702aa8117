//! Cached permission data for one (holder, query) pair

use crate::calculator::processor::standard_processors;
use crate::calculator::{CalculatorSource, PermissionCalculator, TristateResult};
use crate::node::Node;
use crate::query::QueryOptions;
use std::collections::HashMap;

/// A computed permission snapshot: the flattened permission map plus a
/// calculator answering point lookups with provenance.
pub struct PermissionCache {
    query: QueryOptions,
    calculator: PermissionCalculator,
}

impl PermissionCache {
    /// Builds the snapshot from the resolved node list, which must already
    /// be in priority order.
    pub fn new(query: QueryOptions, resolved_nodes: &[Node], lookup_cache_capacity: usize) -> Self {
        let source = CalculatorSource::build(resolved_nodes);
        let calculator = PermissionCalculator::with_cache_capacity(
            source,
            standard_processors(),
            lookup_cache_capacity,
        );
        Self { query, calculator }
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.query
    }

    /// Decides the outcome for `permission`, with the causing node
    pub fn query_permission(&self, permission: &str) -> TristateResult {
        self.calculator.check(permission)
    }

    /// The flattened permission map, first occurrence per key winning
    pub fn permission_map(&self) -> &HashMap<String, bool> {
        self.calculator.source().permission_map()
    }

    /// Clears the calculator's memoized lookups without recomputing the
    /// snapshot
    pub fn invalidate_lookup_cache(&self) {
        self.calculator.invalidate_lookup_cache();
    }
}

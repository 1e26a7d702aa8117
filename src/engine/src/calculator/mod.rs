//! Permission calculation pipeline
//!
//! A calculator owns the resolved node set for one `(holder, query)` pair
//! and answers point lookups by running a fixed pipeline of processors:
//! direct match, then wildcard, then regex. The first decisive answer wins;
//! the result carries the node that caused it and the processor that
//! decided, so callers can explain outcomes.

pub mod processor;

use crate::node::{Node, NodeKind};
use crate::tristate::Tristate;
use lru::LruCache;
use parking_lot::Mutex;
use processor::PermissionProcessor;
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// Default capacity of the per-calculator lookup cache
pub const DEFAULT_LOOKUP_CACHE_CAPACITY: usize = 1024;

/// Outcome of a permission lookup with provenance.
#[derive(Debug, Clone)]
pub struct TristateResult {
    result: Tristate,
    node: Option<Node>,
    processor: Option<&'static str>,
}

impl TristateResult {
    /// The undecided result, carrying no causing node
    pub fn undefined() -> Self {
        Self {
            result: Tristate::Undefined,
            node: None,
            processor: None,
        }
    }

    fn decided(result: Tristate, node: Node, processor: &'static str) -> Self {
        Self {
            result,
            node: Some(node),
            processor: Some(processor),
        }
    }

    pub fn result(&self) -> Tristate {
        self.result
    }

    /// The node that caused a decided outcome; `None` when undefined
    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    /// Name of the processor that decided; `None` when undefined
    pub fn processor(&self) -> Option<&'static str> {
        self.processor
    }
}

/// The resolved node set arranged for processor lookups.
///
/// Built from nodes in resolution (priority) order; the order encodes all
/// priority semantics, so "first wins" is the only rule processors need.
pub struct CalculatorSource {
    direct: HashMap<String, Node>,
    wildcards: Vec<Node>,
    regexes: Vec<Node>,
    permission_map: HashMap<String, bool>,
}

impl CalculatorSource {
    pub fn build(resolved_nodes: &[Node]) -> Self {
        let mut direct: HashMap<String, Node> = HashMap::new();
        let mut wildcards = Vec::new();
        let mut regexes = Vec::new();
        let mut permission_map = HashMap::new();

        for node in resolved_nodes {
            match node.kind() {
                NodeKind::Permission => {
                    if !direct.contains_key(node.key()) {
                        direct.insert(node.key().to_string(), node.clone());
                        permission_map.insert(node.key().to_string(), node.value());
                    }
                    if node.is_wildcard() {
                        wildcards.push(node.clone());
                    }
                }
                NodeKind::RegexPermission { .. } => {
                    permission_map
                        .entry(node.key().to_string())
                        .or_insert_with(|| node.value());
                    regexes.push(node.clone());
                }
                _ => {}
            }
        }

        Self {
            direct,
            wildcards,
            regexes,
            permission_map,
        }
    }

    pub fn direct(&self) -> &HashMap<String, Node> {
        &self.direct
    }

    /// Wildcard permission nodes in resolution order
    pub fn wildcards(&self) -> &[Node] {
        &self.wildcards
    }

    /// Regex permission nodes in resolution order
    pub fn regexes(&self) -> &[Node] {
        &self.regexes
    }

    /// The flattened permission map, first occurrence per key winning
    pub fn permission_map(&self) -> &HashMap<String, bool> {
        &self.permission_map
    }
}

/// Runs the processor pipeline over a [`CalculatorSource`], memoizing
/// lookups in a bounded LRU cache.
pub struct PermissionCalculator {
    source: CalculatorSource,
    processors: Vec<Box<dyn PermissionProcessor>>,
    lookup_cache: Mutex<LruCache<String, TristateResult>>,
}

impl PermissionCalculator {
    pub fn new(source: CalculatorSource, processors: Vec<Box<dyn PermissionProcessor>>) -> Self {
        Self::with_cache_capacity(source, processors, DEFAULT_LOOKUP_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(
        source: CalculatorSource,
        processors: Vec<Box<dyn PermissionProcessor>>,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            processors,
            lookup_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Decides the tristate outcome for `permission`
    pub fn check(&self, permission: &str) -> TristateResult {
        if let Some(cached) = self.lookup_cache.lock().get(permission) {
            return cached.clone();
        }

        let result = self.check_uncached(permission);
        self.lookup_cache
            .lock()
            .put(permission.to_string(), result.clone());
        result
    }

    fn check_uncached(&self, permission: &str) -> TristateResult {
        for processor in &self.processors {
            if let Some((tristate, node)) = processor.check(&self.source, permission) {
                return TristateResult::decided(tristate, node, processor.name());
            }
        }
        TristateResult::undefined()
    }

    pub fn source(&self) -> &CalculatorSource {
        &self.source
    }

    /// Drops memoized lookups. Called when platform default permissions
    /// change without any node mutation.
    pub fn invalidate_lookup_cache(&self) {
        self.lookup_cache.lock().clear();
    }
}

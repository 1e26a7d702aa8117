//! Cached meta data for one (holder, query) pair

use crate::metastack::{MetaAccumulator, MetaStackDefinition};
use crate::node::{Node, NodeKind};
use crate::query::QueryOptions;
use std::collections::HashMap;
use std::sync::Arc;

/// A resolved meta value with the node that supplied it.
#[derive(Debug, Clone)]
pub struct MetaValue {
    value: String,
    node: Node,
}

impl MetaValue {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn node(&self) -> &Node {
        &self.node
    }
}

/// A computed meta snapshot: resolved meta map, chat-meta stacks, weight and
/// primary group.
pub struct MetaCache {
    query: QueryOptions,
    meta: HashMap<String, Vec<String>>,
    meta_first: HashMap<String, MetaValue>,
    prefixes: Vec<(i32, String)>,
    suffixes: Vec<(i32, String)>,
    prefix: Option<String>,
    suffix: Option<String>,
    prefix_node: Option<Node>,
    suffix_node: Option<Node>,
    weight: Option<(i32, Node)>,
    display_name: Option<String>,
    primary_group: Option<String>,
    prefix_definition: Arc<MetaStackDefinition>,
    suffix_definition: Arc<MetaStackDefinition>,
}

impl MetaCache {
    pub fn from_accumulator(
        query: QueryOptions,
        accumulator: MetaAccumulator<'_>,
        primary_group: Option<String>,
    ) -> Self {
        let meta_first = accumulator
            .meta_first()
            .iter()
            .map(|(key, node)| {
                let value = match node.kind() {
                    NodeKind::Meta { meta_value, .. } => meta_value.clone(),
                    _ => String::new(),
                };
                (
                    key.clone(),
                    MetaValue {
                        value,
                        node: node.clone(),
                    },
                )
            })
            .collect();

        let display_name = accumulator.display_name().and_then(|node| match node.kind() {
            NodeKind::DisplayName { name } => Some(name.clone()),
            _ => None,
        });

        Self {
            meta: accumulator.meta().clone(),
            meta_first,
            prefixes: accumulator
                .prefixes()
                .map(|(p, v)| (p, v.to_string()))
                .collect(),
            suffixes: accumulator
                .suffixes()
                .map(|(p, v)| (p, v.to_string()))
                .collect(),
            prefix: accumulator.prefix_stack().to_formatted_string(),
            suffix: accumulator.suffix_stack().to_formatted_string(),
            prefix_node: accumulator.prefix_stack().top().cloned(),
            suffix_node: accumulator.suffix_stack().top().cloned(),
            weight: accumulator.weight().map(|(w, n)| (w, n.clone())),
            display_name,
            primary_group,
            prefix_definition: accumulator.prefix_stack().definition().clone(),
            suffix_definition: accumulator.suffix_stack().definition().clone(),
            query,
        }
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.query
    }

    /// The winning value for a meta key, with provenance
    pub fn query_meta_value(&self, key: &str) -> Option<&MetaValue> {
        self.meta_first.get(key)
    }

    /// The formatted prefix stack result
    pub fn query_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The formatted suffix stack result
    pub fn query_suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// The node at the top of the prefix stack
    pub fn prefix_node(&self) -> Option<&Node> {
        self.prefix_node.as_ref()
    }

    /// The node at the top of the suffix stack
    pub fn suffix_node(&self) -> Option<&Node> {
        self.suffix_node.as_ref()
    }

    /// The holder's weight, `None` if it carries no weight node
    pub fn query_weight(&self) -> Option<i32> {
        self.weight.as_ref().map(|(w, _)| *w)
    }

    /// The holder's weight, defaulting to 0
    pub fn weight_or_default(&self) -> i32 {
        self.query_weight().unwrap_or(0)
    }

    pub fn weight_node(&self) -> Option<&Node> {
        self.weight.as_ref().map(|(_, n)| n)
    }

    /// All values per meta key, in resolution order
    pub fn meta(&self) -> &HashMap<String, Vec<String>> {
        &self.meta
    }

    /// All prefixes sorted by priority, highest first
    pub fn prefixes(&self) -> &[(i32, String)] {
        &self.prefixes
    }

    /// All suffixes sorted by priority, highest first
    pub fn suffixes(&self) -> &[(i32, String)] {
        &self.suffixes
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// The subject's primary group; `None` for group holders
    pub fn primary_group(&self) -> Option<&str> {
        self.primary_group.as_deref()
    }

    pub fn prefix_definition(&self) -> &Arc<MetaStackDefinition> {
        &self.prefix_definition
    }

    pub fn suffix_definition(&self) -> &Arc<MetaStackDefinition> {
        &self.suffix_definition
    }
}

//! Inheritance graph resolution
//!
//! Resolves the ordered closure of holders a subject inherits from. The
//! traversal walks holder identifiers with an explicit stack and an external
//! visited set (first visit wins), so cyclic and diamond-shaped graphs
//! terminate and produce one stable ordering. "Nearer" sources come before
//! "farther" ones, and at each level parents are ordered by descending group
//! weight with ties broken by name.

use crate::model::{GroupResolver, PermissionHolder};
use crate::node::Node;
use crate::query::QueryOptions;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Order in which the inheritance closure is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalOrder {
    /// Depth-first pre-order: the default, and the one the priority
    /// semantics of permission and meta resolution are defined against.
    #[default]
    DepthFirstPreOrder,

    /// Breadth-first: all direct parents before any grandparents.
    BreadthFirst,
}

/// Resolves inheritance closures against a [`GroupResolver`].
pub struct InheritanceGraph<'a> {
    groups: &'a dyn GroupResolver,
    order: TraversalOrder,
}

impl<'a> InheritanceGraph<'a> {
    pub fn new(groups: &'a dyn GroupResolver, order: TraversalOrder) -> Self {
        Self { groups, order }
    }

    /// The ordered closure of holders `start` inherits from, starting with
    /// `start` itself.
    pub fn resolve(
        &self,
        start: Arc<PermissionHolder>,
        query: &QueryOptions,
    ) -> Vec<Arc<PermissionHolder>> {
        // a single timestamp keeps expiry checks stable across the pass
        let now = Utc::now();

        let mut visited: HashSet<_> = HashSet::new();
        let mut resolved = Vec::new();

        match self.order {
            TraversalOrder::DepthFirstPreOrder => {
                let mut stack = vec![start];
                while let Some(holder) = stack.pop() {
                    if !visited.insert(holder.identifier().clone()) {
                        continue;
                    }
                    let parents = self.parents_of(&holder, query, now);
                    resolved.push(holder);
                    // reversed so the highest-priority parent is popped first
                    for parent in parents.into_iter().rev() {
                        stack.push(parent);
                    }
                }
            }
            TraversalOrder::BreadthFirst => {
                let mut queue = VecDeque::from([start]);
                while let Some(holder) = queue.pop_front() {
                    if !visited.insert(holder.identifier().clone()) {
                        continue;
                    }
                    let parents = self.parents_of(&holder, query, now);
                    resolved.push(holder);
                    queue.extend(parents);
                }
            }
        }

        debug!(
            subject = %resolved[0].identifier(),
            holders = resolved.len(),
            "resolved inheritance closure"
        );
        resolved
    }

    /// Flattens the closure's active nodes in resolution order: own nodes
    /// first, then inherited, nearer before farther.
    pub fn resolve_nodes(
        &self,
        start: Arc<PermissionHolder>,
        query: &QueryOptions,
    ) -> Vec<Node> {
        let now = Utc::now();
        self.resolve(start, query)
            .iter()
            .flat_map(|holder| holder.active_nodes(query, now))
            .collect()
    }

    /// Direct parents of a holder under `query`, ordered by descending
    /// weight then name. Unresolvable groups contribute nothing.
    fn parents_of(
        &self,
        holder: &PermissionHolder,
        query: &QueryOptions,
        now: chrono::DateTime<Utc>,
    ) -> Vec<Arc<PermissionHolder>> {
        let mut parents: Vec<_> = holder
            .inherited_group_names(query, now)
            .into_iter()
            .filter_map(|name| self.groups.resolve_group(&name))
            .collect();

        parents.sort_by(|a, b| {
            let wa = a.weight().unwrap_or(0);
            let wb = b.weight().unwrap_or(0);
            wb.cmp(&wa).then_with(|| a.name().cmp(b.name()))
        });

        parents.into_iter().map(|g| g.holder().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, InMemoryGroupRegistry};

    fn add_nodes(registry: &InMemoryGroupRegistry, group: &str, nodes: &[Node]) {
        let group = registry.get_or_create(group);
        for node in nodes {
            group.holder().nodes(DataType::Enduring).add(node.clone());
        }
    }

    fn names(resolved: &[Arc<PermissionHolder>]) -> Vec<String> {
        resolved
            .iter()
            .map(|h| h.identifier().name.clone())
            .collect()
    }

    #[test]
    fn test_cycle_terminates() {
        let registry = InMemoryGroupRegistry::new();
        add_nodes(&registry, "a", &[Node::inheritance("b").build()]);
        add_nodes(&registry, "b", &[Node::inheritance("a").build()]);

        let graph = InheritanceGraph::new(&registry, TraversalOrder::default());
        let start = registry.resolve_group("a").unwrap().holder().clone();
        let resolved = graph.resolve(start, &QueryOptions::non_contextual());

        assert_eq!(names(&resolved), vec!["a", "b"]);
    }

    #[test]
    fn test_weight_ordering() {
        let registry = InMemoryGroupRegistry::new();
        add_nodes(
            &registry,
            "subject",
            &[
                Node::inheritance("light").build(),
                Node::inheritance("heavy").build(),
            ],
        );
        add_nodes(&registry, "light", &[Node::weight(10).build()]);
        add_nodes(&registry, "heavy", &[Node::weight(100).build()]);

        let graph = InheritanceGraph::new(&registry, TraversalOrder::default());
        let start = registry.resolve_group("subject").unwrap().holder().clone();
        let resolved = graph.resolve(start, &QueryOptions::non_contextual());

        assert_eq!(names(&resolved), vec!["subject", "heavy", "light"]);
    }

    #[test]
    fn test_diamond_first_visit_wins() {
        // subject -> (b, c), b -> d, c -> d
        let registry = InMemoryGroupRegistry::new();
        add_nodes(
            &registry,
            "subject",
            &[
                Node::inheritance("b").build(),
                Node::inheritance("c").build(),
            ],
        );
        add_nodes(&registry, "b", &[Node::inheritance("d").build()]);
        add_nodes(&registry, "c", &[Node::inheritance("d").build()]);
        registry.get_or_create("d");

        let graph = InheritanceGraph::new(&registry, TraversalOrder::default());
        let start = registry.resolve_group("subject").unwrap().holder().clone();
        let resolved = graph.resolve(start, &QueryOptions::non_contextual());

        // depth-first: d is reached through b, then c contributes nothing new
        assert_eq!(names(&resolved), vec!["subject", "b", "d", "c"]);
    }

    #[test]
    fn test_breadth_first_order() {
        let registry = InMemoryGroupRegistry::new();
        add_nodes(
            &registry,
            "subject",
            &[
                Node::inheritance("b").build(),
                Node::inheritance("c").build(),
            ],
        );
        add_nodes(&registry, "b", &[Node::inheritance("d").build()]);
        registry.get_or_create("c");
        registry.get_or_create("d");

        let graph = InheritanceGraph::new(&registry, TraversalOrder::BreadthFirst);
        let start = registry.resolve_group("subject").unwrap().holder().clone();
        let resolved = graph.resolve(start, &QueryOptions::non_contextual());

        assert_eq!(names(&resolved), vec!["subject", "b", "c", "d"]);
    }

    #[test]
    fn test_unknown_group_skipped() {
        let registry = InMemoryGroupRegistry::new();
        add_nodes(
            &registry,
            "subject",
            &[Node::inheritance("missing").build()],
        );

        let graph = InheritanceGraph::new(&registry, TraversalOrder::default());
        let start = registry.resolve_group("subject").unwrap().holder().clone();
        let resolved = graph.resolve(start, &QueryOptions::non_contextual());

        assert_eq!(names(&resolved), vec!["subject"]);
    }

    #[test]
    fn test_context_scoped_inheritance() {
        use crate::context::ImmutableContextSet;

        let registry = InMemoryGroupRegistry::new();
        add_nodes(
            &registry,
            "subject",
            &[Node::inheritance("vip")
                .context("server", "survival")
                .build()],
        );
        registry.get_or_create("vip");

        let graph = InheritanceGraph::new(&registry, TraversalOrder::default());
        let start = registry.resolve_group("subject").unwrap().holder().clone();

        let global = graph.resolve(start.clone(), &QueryOptions::non_contextual());
        assert_eq!(names(&global), vec!["subject"]);

        let survival = QueryOptions::contextual(ImmutableContextSet::singleton(
            "server", "survival",
        ));
        let scoped = graph.resolve(start, &survival);
        assert_eq!(names(&scoped), vec!["subject", "vip"]);
    }

    #[test]
    fn test_negated_inheritance_ignored() {
        let registry = InMemoryGroupRegistry::new();
        add_nodes(
            &registry,
            "subject",
            &[Node::inheritance("vip").value(false).build()],
        );
        registry.get_or_create("vip");

        let graph = InheritanceGraph::new(&registry, TraversalOrder::default());
        let start = registry.resolve_group("subject").unwrap().holder().clone();
        let resolved = graph.resolve(start, &QueryOptions::non_contextual());

        assert_eq!(names(&resolved), vec!["subject"]);
    }
}

//! Meta accumulation
//!
//! Walks the resolved node set in inheritance order and folds meta, prefix,
//! suffix, weight and display-name nodes into one snapshot. Plain meta keys
//! use first-value-wins in resolution order; prefixes and suffixes are
//! folded both into priority-sorted maps and through the configured meta
//! stacks.

use super::{ChatMetaType, MetaStack, MetaStackDefinition, StackContext};
use crate::model::{HolderIdentifier, TrackResolver};
use crate::node::{Node, NodeKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Folds resolved nodes into a meta snapshot.
pub struct MetaAccumulator<'a> {
    ctx: StackContext<'a>,
    meta: HashMap<String, Vec<String>>,
    meta_first: HashMap<String, Node>,
    prefixes: BTreeMap<i32, String>,
    suffixes: BTreeMap<i32, String>,
    weight: Option<(i32, Node)>,
    display_name: Option<Node>,
    prefix_stack: MetaStack,
    suffix_stack: MetaStack,
}

impl<'a> MetaAccumulator<'a> {
    pub fn new(
        subject: &'a HolderIdentifier,
        tracks: &'a dyn TrackResolver,
        prefix_definition: Arc<MetaStackDefinition>,
        suffix_definition: Arc<MetaStackDefinition>,
    ) -> Self {
        Self {
            ctx: StackContext { subject, tracks },
            meta: HashMap::new(),
            meta_first: HashMap::new(),
            prefixes: BTreeMap::new(),
            suffixes: BTreeMap::new(),
            weight: None,
            display_name: None,
            prefix_stack: MetaStack::new(prefix_definition, ChatMetaType::Prefix),
            suffix_stack: MetaStack::new(suffix_definition, ChatMetaType::Suffix),
        }
    }

    /// Accumulates one node. Nodes with `value == false` are inactive facts
    /// and contribute nothing.
    pub fn accumulate(&mut self, node: &Node) {
        if !node.value() {
            return;
        }
        match node.kind() {
            NodeKind::Meta {
                meta_key,
                meta_value,
            } => {
                self.meta
                    .entry(meta_key.clone())
                    .or_default()
                    .push(meta_value.clone());
                self.meta_first
                    .entry(meta_key.clone())
                    .or_insert_with(|| node.clone());
            }
            NodeKind::Prefix { priority, value } => {
                self.prefixes
                    .entry(*priority)
                    .or_insert_with(|| value.clone());
                self.prefix_stack.offer(node, &self.ctx);
            }
            NodeKind::Suffix { priority, value } => {
                self.suffixes
                    .entry(*priority)
                    .or_insert_with(|| value.clone());
                self.suffix_stack.offer(node, &self.ctx);
            }
            NodeKind::Weight { weight } => {
                let higher = match &self.weight {
                    Some((current, _)) => *weight > *current,
                    None => true,
                };
                if higher {
                    self.weight = Some((*weight, node.clone()));
                }
            }
            NodeKind::DisplayName { .. } => {
                if self.display_name.is_none() {
                    self.display_name = Some(node.clone());
                }
            }
            _ => {}
        }
    }

    /// Accumulates a full resolved node list in order
    pub fn accumulate_all<'n, I: IntoIterator<Item = &'n Node>>(&mut self, nodes: I) {
        for node in nodes {
            self.accumulate(node);
        }
    }

    /// All values per meta key, in resolution order
    pub fn meta(&self) -> &HashMap<String, Vec<String>> {
        &self.meta
    }

    /// The winning (first) node per meta key
    pub fn meta_first(&self) -> &HashMap<String, Node> {
        &self.meta_first
    }

    /// Prefixes by priority, highest first
    pub fn prefixes(&self) -> impl Iterator<Item = (i32, &str)> {
        self.prefixes.iter().rev().map(|(p, v)| (*p, v.as_str()))
    }

    /// Suffixes by priority, highest first
    pub fn suffixes(&self) -> impl Iterator<Item = (i32, &str)> {
        self.suffixes.iter().rev().map(|(p, v)| (*p, v.as_str()))
    }

    pub fn weight(&self) -> Option<(i32, &Node)> {
        self.weight.as_ref().map(|(w, n)| (*w, n))
    }

    pub fn display_name(&self) -> Option<&Node> {
        self.display_name.as_ref()
    }

    pub fn prefix_stack(&self) -> &MetaStack {
        &self.prefix_stack
    }

    pub fn suffix_stack(&self) -> &MetaStack {
        &self.suffix_stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, NoTracks};

    fn accumulator<'a>(subject: &'a HolderIdentifier) -> MetaAccumulator<'a> {
        MetaAccumulator::new(
            subject,
            &NoTracks,
            MetaStackDefinition::standard(),
            MetaStackDefinition::standard(),
        )
    }

    #[test]
    fn test_meta_first_value_wins() {
        let subject = HolderIdentifier::group("test");
        let mut acc = accumulator(&subject);
        acc.accumulate(&Node::meta("rank", "first").build());
        acc.accumulate(&Node::meta("rank", "second").build());

        assert_eq!(acc.meta()["rank"], vec!["first", "second"]);
        match acc.meta_first()["rank"].kind() {
            NodeKind::Meta { meta_value, .. } => assert_eq!(meta_value, "first"),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_negated_nodes_skipped() {
        let subject = HolderIdentifier::group("test");
        let mut acc = accumulator(&subject);
        acc.accumulate(&Node::meta("rank", "hidden").value(false).build());
        acc.accumulate(&Node::prefix("[X]", 10).value(false).build());

        assert!(acc.meta().is_empty());
        assert_eq!(acc.prefix_stack().to_formatted_string(), None);
    }

    #[test]
    fn test_prefix_priority_order() {
        let subject = HolderIdentifier::group("test");
        let mut acc = accumulator(&subject);
        acc.accumulate(&Node::prefix("[Low]", 10).build());
        acc.accumulate(&Node::prefix("[High]", 100).build());
        acc.accumulate(&Node::prefix("[Mid]", 50).build());

        let prefixes: Vec<_> = acc.prefixes().collect();
        assert_eq!(
            prefixes,
            vec![(100, "[High]"), (50, "[Mid]"), (10, "[Low]")]
        );
        assert_eq!(
            acc.prefix_stack().to_formatted_string().as_deref(),
            Some("[High]")
        );
    }

    #[test]
    fn test_equal_priority_first_wins() {
        let subject = HolderIdentifier::group("test");
        let mut acc = accumulator(&subject);
        acc.accumulate(&Node::prefix("[Own]", 50).build());
        acc.accumulate(&Node::prefix("[Inherited]", 50).build());

        let prefixes: Vec<_> = acc.prefixes().collect();
        assert_eq!(prefixes, vec![(50, "[Own]")]);
    }

    #[test]
    fn test_weight_max() {
        let subject = HolderIdentifier::group("test");
        let mut acc = accumulator(&subject);
        assert_eq!(acc.weight(), None);
        acc.accumulate(&Node::weight(10).build());
        acc.accumulate(&Node::weight(100).build());
        acc.accumulate(&Node::weight(50).build());
        assert_eq!(acc.weight().map(|(w, _)| w), Some(100));
    }

    #[test]
    fn test_display_name_first_wins() {
        let subject = HolderIdentifier::group("test");
        let mut acc = accumulator(&subject);
        acc.accumulate(&Node::display_name("First").build());
        acc.accumulate(&Node::display_name("Second").build());
        match acc.display_name().unwrap().kind() {
            NodeKind::DisplayName { name } => assert_eq!(name, "First"),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_own_vs_inherited_stacks() {
        let subject = HolderIdentifier::user(uuid::Uuid::new_v4());
        let tracks = NoTracks;

        let own = Node::prefix("[A]", 10)
            .origin(subject.clone(), DataType::Enduring)
            .build();
        let inherited = Node::prefix("[B]", 50)
            .origin(HolderIdentifier::group("admin"), DataType::Enduring)
            .build();

        // highest overall
        let mut acc = MetaAccumulator::new(
            &subject,
            &tracks,
            MetaStackDefinition::standard(),
            MetaStackDefinition::standard(),
        );
        acc.accumulate(&own);
        acc.accumulate(&inherited);
        assert_eq!(
            acc.prefix_stack().to_formatted_string().as_deref(),
            Some("[B]")
        );

        // highest own only
        let own_def = Arc::new(MetaStackDefinition::new(
            vec![super::super::MetaStackElement::HighestOwn],
            "",
            "",
            "",
            super::super::DuplicateRemoval::RetainAll,
        ));
        let mut acc = MetaAccumulator::new(
            &subject,
            &tracks,
            own_def,
            MetaStackDefinition::standard(),
        );
        acc.accumulate(&own);
        acc.accumulate(&inherited);
        assert_eq!(
            acc.prefix_stack().to_formatted_string().as_deref(),
            Some("[A]")
        );
    }
}

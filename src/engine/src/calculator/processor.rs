//! Permission processors
//!
//! Each processor inspects the prepared [`CalculatorSource`] and either
//! decides the outcome or passes. The pipeline order is fixed: direct,
//! wildcard, regex.

use super::CalculatorSource;
use crate::node::{wildcard, Node, NodeKind};
use crate::tristate::Tristate;
use dashmap::DashMap;
use regex::Regex;
use tracing::warn;

/// A single stage of the calculation pipeline.
pub trait PermissionProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Some` to decide the outcome with the causing node, `None` to pass
    fn check(&self, source: &CalculatorSource, permission: &str) -> Option<(Tristate, Node)>;
}

/// The standard pipeline in its fixed order.
pub fn standard_processors() -> Vec<Box<dyn PermissionProcessor>> {
    vec![
        Box::new(DirectProcessor),
        Box::new(WildcardProcessor),
        Box::new(RegexProcessor::new()),
    ]
}

/// Exact string match against permission nodes. The resolution order
/// already encodes priority, so the stored first occurrence decides.
pub struct DirectProcessor;

impl PermissionProcessor for DirectProcessor {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn check(&self, source: &CalculatorSource, permission: &str) -> Option<(Tristate, Node)> {
        source
            .direct()
            .get(permission)
            .map(|node| (Tristate::of(node.value()), node.clone()))
    }
}

/// Matches wildcard permission nodes; the highest wildcard level (most
/// specific) wins, ties broken by resolution order.
pub struct WildcardProcessor;

impl PermissionProcessor for WildcardProcessor {
    fn name(&self) -> &'static str {
        "wildcard"
    }

    fn check(&self, source: &CalculatorSource, permission: &str) -> Option<(Tristate, Node)> {
        let mut best: Option<(&Node, usize)> = None;
        for node in source.wildcards() {
            if !wildcard::covers(node.key(), permission) {
                continue;
            }
            let level = node.wildcard_level().unwrap_or(0);
            // strictly greater keeps the earlier node on ties
            if best.map_or(true, |(_, best_level)| level > best_level) {
                best = Some((node, level));
            }
        }
        best.map(|(node, _)| (Tristate::of(node.value()), node.clone()))
    }
}

/// Matches regex permission nodes. Patterns are compiled once and memoized;
/// unparsable patterns never match and never propagate an error.
pub struct RegexProcessor {
    compiled: DashMap<String, Option<Regex>>,
}

impl RegexProcessor {
    pub fn new() -> Self {
        Self {
            compiled: DashMap::new(),
        }
    }

    fn pattern_matches(&self, pattern: &str, permission: &str) -> bool {
        if let Some(entry) = self.compiled.get(pattern) {
            return entry
                .as_ref()
                .map(|re| re.is_match(permission))
                .unwrap_or(false);
        }

        let compiled = match Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(re) => Some(re),
            Err(err) => {
                warn!(pattern, %err, "ignoring unparsable regex permission");
                None
            }
        };
        let matches = compiled
            .as_ref()
            .map(|re| re.is_match(permission))
            .unwrap_or(false);
        self.compiled.insert(pattern.to_string(), compiled);
        matches
    }
}

impl Default for RegexProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionProcessor for RegexProcessor {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn check(&self, source: &CalculatorSource, permission: &str) -> Option<(Tristate, Node)> {
        for node in source.regexes() {
            let pattern = match node.kind() {
                NodeKind::RegexPermission { pattern } => pattern,
                _ => continue,
            };
            if self.pattern_matches(pattern, permission) {
                return Some((Tristate::of(node.value()), node.clone()));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_tie_keeps_resolution_order() {
        let nodes = vec![
            Node::permission("a.b.*").value(true).build(),
            Node::permission("a.c.*").value(false).build(),
        ];
        let source = CalculatorSource::build(&nodes);
        let (tristate, node) = WildcardProcessor.check(&source, "a.b.x").unwrap();
        assert_eq!(tristate, Tristate::True);
        assert_eq!(node.key(), "a.b.*");
    }

    #[test]
    fn test_regex_anchored() {
        let nodes = vec![Node::regex_permission("foo\\.bar").build()];
        let source = CalculatorSource::build(&nodes);
        let processor = RegexProcessor::new();
        assert!(processor.check(&source, "foo.bar").is_some());
        // the pattern must cover the whole permission string
        assert!(processor.check(&source, "foo.bar.baz").is_none());
    }
}

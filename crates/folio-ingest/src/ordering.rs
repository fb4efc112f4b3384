//! Logical order trees
//!
//! A logical order is a recursive tree of labeled nodes. Leaves carry a proxy
//! reference to the file unit they stand for; interior nodes group leaves into
//! structural divisions (chapters, leaves, recto/verso). The same type is used
//! while parsing descriptors, where proxies name file references, and after
//! graph construction, where proxies name file unit identifiers.
//!
//! The persisted form is canonical JSON with string keys only:
//!
//! ```json
//! {"nodes": [{"label": "leaf 1", "nodes": [{"label": "leaf 1. recto", "proxy": "..."}]}]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One node of a logical order
///
/// The root conventionally has an empty label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingNode {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<OrderingNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl OrderingNode {
    /// Root node holding the given top-level divisions
    pub fn root(nodes: Vec<OrderingNode>) -> Self {
        Self {
            label: String::new(),
            nodes,
            proxy: None,
        }
    }

    /// Structural (non-leaf) node
    pub fn division(label: impl Into<String>, nodes: Vec<OrderingNode>) -> Self {
        Self {
            label: label.into(),
            nodes,
            proxy: None,
        }
    }

    /// Leaf pointing at a file unit (or file reference)
    pub fn leaf(label: impl Into<String>, proxy: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            nodes: Vec::new(),
            proxy: Some(proxy.into()),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.proxy.is_none()
    }

    /// Leaves in depth-first, document order
    pub fn leaves(&self) -> Vec<&OrderingNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a OrderingNode>) {
        if self.is_leaf() {
            out.push(self);
        }
        for child in &self.nodes {
            child.collect_leaves(out);
        }
    }

    /// Every proxy reference, in document order
    pub fn proxies(&self) -> Vec<&str> {
        self.leaves()
            .into_iter()
            .filter_map(|leaf| leaf.proxy.as_deref())
            .collect()
    }

    /// Label of the first leaf whose proxy equals `proxy`
    pub fn label_for(&self, proxy: &str) -> Option<&str> {
        self.leaves()
            .into_iter()
            .find(|leaf| leaf.proxy.as_deref() == Some(proxy))
            .map(|leaf| leaf.label.as_str())
            .filter(|label| !label.is_empty())
    }

    /// Maximum depth; a lone root is depth 1
    pub fn depth(&self) -> usize {
        1 + self.nodes.iter().map(OrderingNode::depth).max().unwrap_or(0)
    }

    /// Copy of this tree with every proxy mapped through `resolve`
    ///
    /// Labels and shape are preserved exactly. The first failure aborts.
    pub fn try_map_proxies<E, F>(&self, mut resolve: F) -> Result<OrderingNode, E>
    where
        F: FnMut(&OrderingNode, &str) -> Result<String, E>,
    {
        self.map_proxies_with(&mut resolve)
    }

    fn map_proxies_with<E, F>(&self, resolve: &mut F) -> Result<OrderingNode, E>
    where
        F: FnMut(&OrderingNode, &str) -> Result<String, E>,
    {
        let proxy = match self.proxy.as_deref() {
            Some(reference) => Some(resolve(self, reference)?),
            None => None,
        };
        let nodes = self
            .nodes
            .iter()
            .map(|child| child.map_proxies_with(resolve))
            .collect::<Result<Vec<_>, E>>()?;

        Ok(OrderingNode {
            label: self.label.clone(),
            nodes,
            proxy,
        })
    }

    /// Replace every occurrence of one proxy with another; returns the count
    pub fn rewrite_proxy(&mut self, from: &str, to: &str) -> usize {
        let mut rewritten = 0;
        if self.proxy.as_deref() == Some(from) {
            self.proxy = Some(to.to_string());
            rewritten += 1;
        }
        for child in &mut self.nodes {
            rewritten += child.rewrite_proxy(from, to);
        }
        rewritten
    }

    /// Canonical JSON value
    pub fn to_canonical(&self) -> Value {
        // Plain struct of strings and vectors; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_canonical(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> OrderingNode {
        OrderingNode::root(vec![
            OrderingNode::division(
                "Chapter 1",
                vec![
                    OrderingNode::leaf("p. 1", "f1"),
                    OrderingNode::leaf("p. 2", "f2"),
                ],
            ),
            OrderingNode::division(
                "Chapter 2",
                vec![OrderingNode::division(
                    "Section 2.1",
                    vec![OrderingNode::leaf("p. 3", "f3")],
                )],
            ),
        ])
    }

    #[test]
    fn test_canonical_form() {
        let tree = OrderingNode::root(vec![OrderingNode::division(
            "leaf 1",
            vec![OrderingNode::leaf("leaf 1. recto", "unit-1")],
        )]);

        assert_eq!(
            tree.to_canonical(),
            json!({"nodes": [{"label": "leaf 1", "nodes": [{"label": "leaf 1. recto", "proxy": "unit-1"}]}]})
        );
    }

    #[test]
    fn test_canonical_roundtrip_preserves_structure() {
        let tree = sample();
        let back = OrderingNode::from_canonical(tree.to_canonical()).unwrap();
        assert_eq!(back, tree);
        assert_eq!(back.depth(), 4);
    }

    #[test]
    fn test_leaves_in_document_order() {
        assert_eq!(sample().proxies(), vec!["f1", "f2", "f3"]);
        assert_eq!(sample().label_for("f3"), Some("p. 3"));
        assert_eq!(sample().label_for("missing"), None);
    }

    #[test]
    fn test_try_map_proxies() {
        let mapped = sample()
            .try_map_proxies(|_: &OrderingNode, p: &str| Ok::<_, String>(format!("unit-{}", p)))
            .unwrap();
        assert_eq!(mapped.proxies(), vec!["unit-f1", "unit-f2", "unit-f3"]);
        assert_eq!(mapped.nodes[1].nodes[0].label, "Section 2.1");

        let err = sample()
            .try_map_proxies(|node: &OrderingNode, p: &str| {
                if p == "f2" {
                    Err(node.label.clone())
                } else {
                    Ok(p.to_string())
                }
            })
            .unwrap_err();
        assert_eq!(err, "p. 2");
    }

    #[test]
    fn test_rewrite_proxy() {
        let mut tree = OrderingNode::root(vec![
            OrderingNode::leaf("a", "x"),
            OrderingNode::division("b", vec![OrderingNode::leaf("c", "x")]),
        ]);
        assert_eq!(tree.rewrite_proxy("x", "y"), 2);
        assert_eq!(tree.proxies(), vec!["y", "y"]);
    }

    #[test]
    fn test_empty_root() {
        let root = OrderingNode::default();
        assert!(root.is_empty());
        assert_eq!(root.to_canonical(), json!({}));
    }
}

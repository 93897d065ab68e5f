//! Structured request graphs
//!
//! A [`RequestStructure`] is built from one left-to-right scan of a decoded
//! record's edges. The first edge's source node is the root. Children are
//! ordered by name so traversal and printing are deterministic.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::decoder::{DecodedRequest, NodeId};

/// A node in a request graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub name: String,
    pub children: Vec<NodeId>,
}

/// Tree view of one request: root plus node id -> {name, children}
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestStructure {
    pub root: NodeId,
    pub nodes: BTreeMap<NodeId, GraphNode>,
}

impl RequestStructure {
    /// Build the structure from a decoded request
    ///
    /// Returns `None` when the request has no edges.
    pub fn from_decoded(decoded: &DecodedRequest) -> Option<Self> {
        let first = decoded.edges.first()?;
        let root = first.src.clone();

        let mut nodes: BTreeMap<NodeId, GraphNode> = BTreeMap::new();
        for edge in &decoded.edges {
            for id in [&edge.src, &edge.dest] {
                nodes.entry(id.clone()).or_insert_with(|| GraphNode {
                    name: decoded.node_name(id).to_string(),
                    children: Vec::new(),
                });
            }
            if let Some(parent) = nodes.get_mut(&edge.src) {
                if !parent.children.contains(&edge.dest) {
                    parent.children.push(edge.dest.clone());
                }
            }
        }

        // Sort children by name, node id breaks ties
        let names: BTreeMap<NodeId, String> = nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.name.clone()))
            .collect();
        for node in nodes.values_mut() {
            node.children.sort_by(|a, b| {
                let name_a = names.get(a).map(String::as_str).unwrap_or("");
                let name_b = names.get(b).map(String::as_str).unwrap_or("");
                name_a.cmp(name_b).then_with(|| a.cmp(b))
            });
        }

        Some(Self { root, nodes })
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edge names in depth-first order from the root
    ///
    /// This is the sequence the edit-distance oracle compares.
    pub fn edge_sequence(&self) -> Vec<String> {
        let mut sequence = Vec::new();
        let mut stack = vec![self.root.clone()];
        let mut visited = std::collections::HashSet::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            for child in &node.children {
                if let Some(child_node) = self.nodes.get(child) {
                    sequence.push(format!("{}->{}", node.name, child_node.name));
                }
            }
            for child in node.children.iter().rev() {
                stack.push(child.clone());
            }
        }

        sequence
    }

    /// Indented text rendering, one node per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root.clone(), 0usize)];
        let mut visited = std::collections::HashSet::new();

        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push_str(&"  ".repeat(depth));
            out.push_str(&node.name);
            if !visited.insert(id.clone()) {
                out.push_str(" (revisited)\n");
                continue;
            }
            out.push('\n');
            for child in node.children.iter().rev() {
                stack.push((child.clone(), depth + 1));
            }
        }

        out
    }
}

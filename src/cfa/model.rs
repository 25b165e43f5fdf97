//! Canonical control-flow automaton (CFA) model.
//!
//! `CfaModel` is the serialized form embedded in a verification report.
//! `CanonicalGraph` is the immutable, indexed view the resolver and the
//! built-in worker read from.

use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// A CFA location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfaNode {
    /// Index of the location in the CFA.
    pub index: u32,
    /// Function the location belongs to.
    pub func: String,
    /// Reverse-postorder id (traversal rank).
    #[serde(default)]
    pub rpid: u32,
}

/// A CFA transition between two locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfaEdge {
    pub source: u32,
    pub target: u32,
    /// Source line of the statement; 0 when unknown.
    #[serde(default)]
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stmt: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl CfaEdge {
    /// Line to jump to in the source view. Unknown lines map to the first line.
    pub fn source_line(&self) -> u32 {
        self.line.max(1)
    }
}

/// Serialized CFA together with its overlay mappings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfaModel {
    pub nodes: Vec<CfaNode>,
    pub edges: Vec<CfaEdge>,
    /// Displayed merged-node id to the canonical indices it stands for.
    #[serde(default)]
    pub combined_nodes: BTreeMap<u32, Vec<u32>>,
    /// Displayed caller-side id to `[callee entry, return target]`.
    #[serde(default)]
    pub function_call_edges: BTreeMap<u32, Vec<u32>>,
}

impl CfaModel {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Read-only indexed CFA.
///
/// Nodes are keyed by their CFA index. Edges keep their declaration order so
/// that a lookup between two locations with parallel edges returns the one
/// declared first.
#[derive(Debug, Clone)]
pub struct CanonicalGraph {
    graph: DiGraph<CfaNode, CfaEdge>,
    node_index: HashMap<u32, NodeIndex>,
}

impl CanonicalGraph {
    /// Build the graph, rejecting duplicate node indices and edges whose
    /// endpoints are not declared nodes.
    pub fn new(nodes: Vec<CfaNode>, edges: Vec<CfaEdge>) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut node_index = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let index = node.index;
            if node_index.contains_key(&index) {
                return Err(Error::Validation(format!("duplicate CFA node {}", index)));
            }
            node_index.insert(index, graph.add_node(node));
        }

        for edge in edges {
            let source = *node_index.get(&edge.source).ok_or_else(|| {
                Error::Validation(format!(
                    "edge {}->{} starts at unknown node",
                    edge.source, edge.target
                ))
            })?;
            let target = *node_index.get(&edge.target).ok_or_else(|| {
                Error::Validation(format!(
                    "edge {}->{} ends at unknown node",
                    edge.source, edge.target
                ))
            })?;
            graph.add_edge(source, target, edge);
        }

        Ok(Self { graph, node_index })
    }

    pub fn node(&self, index: u32) -> Option<&CfaNode> {
        self.node_index
            .get(&index)
            .and_then(|&ix| self.graph.node_weight(ix))
    }

    pub fn contains_node(&self, index: u32) -> bool {
        self.node_index.contains_key(&index)
    }

    /// First declared edge from `source` to `target`.
    pub fn edge(&self, source: u32, target: u32) -> Option<&CfaEdge> {
        let from = *self.node_index.get(&source)?;
        let to = *self.node_index.get(&target)?;
        let first = self
            .graph
            .edges_connecting(from, to)
            .map(|e| e.id())
            .min()?;
        self.graph.edge_weight(first)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Names of all functions, sorted.
    pub fn functions(&self) -> BTreeSet<&str> {
        self.graph.node_weights().map(|n| n.func.as_str()).collect()
    }

    /// Nodes of `func` and the edges that stay inside it.
    pub fn function_subgraph(&self, func: &str) -> (Vec<&CfaNode>, Vec<&CfaEdge>) {
        let nodes = self
            .graph
            .node_weights()
            .filter(|n| n.func == func)
            .collect();
        let edges = self
            .graph
            .edge_references()
            .filter(|e| {
                self.graph[e.source()].func == func && self.graph[e.target()].func == func
            })
            .map(|e| e.weight())
            .collect();
        (nodes, edges)
    }
}

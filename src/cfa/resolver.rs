//! Maps elements of the rendered CFA back to the canonical model.
//!
//! The rendered graph differs from the canonical one in three ways: chains of
//! nodes are merged into one displayed node, inlined calls get synthetic
//! marker nodes, and edges whose endpoints land in different rendered
//! subgraphs are split into two fragments that carry the true endpoints in
//! their element id.

use crate::cfa::model::{CanonicalGraph, CfaEdge, CfaModel, CfaNode};
use crate::cfa::overlay::{DisplayNode, Overlay};
use crate::cvlog_trace;
use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// `<prefix>_<source>-<target>`, e.g. `cfa-split-edge_12-13`.
static SPLIT_EDGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d+)-(\d+)$").expect("split edge pattern is valid"));

/// Canonical endpoints encoded in a split-edge fragment's element id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitEdgeId {
    pub source: u32,
    pub target: u32,
}

impl SplitEdgeId {
    pub fn parse(element_id: &str) -> Result<Self> {
        let invalid = || Error::InvalidDisplayId(element_id.to_string());
        let caps = SPLIT_EDGE_ID_RE.captures(element_id).ok_or_else(invalid)?;
        let source = caps[1].parse().map_err(|_| invalid())?;
        let target = caps[2].parse().map_err(|_| invalid())?;
        Ok(Self { source, target })
    }
}

/// What a displayed node stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeDescriptor<'a> {
    /// Synthetic call-site marker with no canonical counterpart.
    FunctionCall { marker: u32 },
    /// Merged node covering canonical indices `first..=last`.
    Combined {
        node: &'a CfaNode,
        first: u32,
        last: u32,
    },
    Node(&'a CfaNode),
}

impl NodeDescriptor<'_> {
    /// The facts the UI shows for this node, one per line.
    pub fn describe(&self) -> String {
        match self {
            NodeDescriptor::FunctionCall { .. } => "type: function call node".to_string(),
            NodeDescriptor::Combined { node, first, last } => format!(
                "function: {}\ncombines nodes: {}-{}\nreverse postorder Id: {}",
                node.func, first, last, node.rpid
            ),
            NodeDescriptor::Node(node) => {
                format!("function: {}\nreverse postorder Id: {}", node.func, node.rpid)
            }
        }
    }
}

impl fmt::Display for NodeDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Graph correspondence resolver.
///
/// Pure lookups over an immutable graph and overlay: the same inputs always
/// resolve to the same result.
#[derive(Debug, Clone)]
pub struct Resolver {
    graph: CanonicalGraph,
    overlay: Overlay,
}

impl Resolver {
    pub fn new(graph: CanonicalGraph, overlay: Overlay) -> Self {
        Self { graph, overlay }
    }

    pub fn from_model(model: CfaModel) -> Result<Self> {
        let graph = CanonicalGraph::new(model.nodes, model.edges)?;
        let overlay = Overlay::new(model.combined_nodes, model.function_call_edges)?;
        Ok(Self::new(graph, overlay))
    }

    pub fn graph(&self) -> &CanonicalGraph {
        &self.graph
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Resolve a displayed edge given its endpoint tokens.
    ///
    /// `Ok(None)` means the element has no canonical counterpart, which is
    /// expected for rendering-only edges.
    pub fn resolve_edge(&self, source: &str, target: &str) -> Result<Option<&CfaEdge>> {
        let source: DisplayNode = source.parse()?;
        let target: DisplayNode = target.parse()?;
        Ok(self.resolve_display_edge(source, target))
    }

    pub fn resolve_display_edge(
        &self,
        source: DisplayNode,
        target: DisplayNode,
    ) -> Option<&CfaEdge> {
        let mut from = match source {
            DisplayNode::CallMarker(marker) => self.overlay.caller_of(marker)?,
            DisplayNode::Canonical(id) => id,
        };
        // Return markers are keyed by the displayed source, not the resolved
        // caller: call and return share the caller's entry.
        let to = match target {
            DisplayNode::CallMarker(_) => self.overlay.return_target(source.id())?,
            DisplayNode::Canonical(id) => id,
        };
        if self.overlay.is_combined(from) {
            from = self.overlay.merge_exit(from)?;
        }

        let edge = self.graph.edge(from, to);
        cvlog_trace!(
            "resolve_edge {}->{} canonical {}->{} found={}",
            source,
            target,
            from,
            to,
            edge.is_some()
        );
        edge
    }

    /// Resolve a split-edge fragment; its endpoints are already canonical.
    pub fn resolve_split_edge(&self, source: &str, target: &str) -> Result<Option<&CfaEdge>> {
        let source = parse_index(source)?;
        let target = parse_index(target)?;
        Ok(self.graph.edge(source, target))
    }

    /// Resolve an edge element, falling back to the endpoints encoded in its
    /// element id when the displayed endpoints do not resolve.
    pub fn resolve_edge_or_split(
        &self,
        source: &str,
        target: &str,
        element_id: &str,
    ) -> Result<Option<&CfaEdge>> {
        if let Some(edge) = self.resolve_edge(source, target)? {
            return Ok(Some(edge));
        }
        let split = SplitEdgeId::parse(element_id)?;
        cvlog_trace!(
            "resolve_edge {}->{} falling back to split id {}",
            source,
            target,
            element_id
        );
        Ok(self.graph.edge(split.source, split.target))
    }

    /// Describe a displayed node.
    ///
    /// A non-synthetic id missing from the canonical graph means the overlay
    /// and the model disagree, and is reported as `NodeNotFound`.
    pub fn resolve_node(&self, id: &str) -> Result<NodeDescriptor<'_>> {
        let index = match id.parse::<DisplayNode>()? {
            DisplayNode::CallMarker(marker) => {
                return Ok(NodeDescriptor::FunctionCall { marker });
            }
            DisplayNode::Canonical(index) => index,
        };

        let node = self.graph.node(index).ok_or(Error::NodeNotFound(index))?;
        match self.overlay.merge_bounds(index) {
            Some((first, last)) => Ok(NodeDescriptor::Combined { node, first, last }),
            None => Ok(NodeDescriptor::Node(node)),
        }
    }
}

fn parse_index(token: &str) -> Result<u32> {
    token
        .trim()
        .parse()
        .map_err(|_| Error::InvalidDisplayId(token.to_string()))
}

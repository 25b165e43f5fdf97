//! Identity mappings layered over the canonical CFA by the rendered view.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Display ids above this value are synthetic function-call markers.
pub const SYNTHETIC_ID_THRESHOLD: u32 = 100_000;

/// A node id as it appears in the rendered graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayNode {
    /// A CFA location, possibly standing for a merged range.
    Canonical(u32),
    /// A synthetic node marking an inlined function call or its return.
    CallMarker(u32),
}

impl DisplayNode {
    pub fn from_id(id: u32) -> Self {
        if id > SYNTHETIC_ID_THRESHOLD {
            DisplayNode::CallMarker(id)
        } else {
            DisplayNode::Canonical(id)
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            DisplayNode::Canonical(id) | DisplayNode::CallMarker(id) => *id,
        }
    }

    pub fn is_call_marker(&self) -> bool {
        matches!(self, DisplayNode::CallMarker(_))
    }
}

impl FromStr for DisplayNode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u32>()
            .map(Self::from_id)
            .map_err(|_| Error::InvalidDisplayId(s.to_string()))
    }
}

impl fmt::Display for DisplayNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Combined-node and function-call maps, plus the reverse index from call
/// markers to their caller.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    combined_nodes: BTreeMap<u32, Vec<u32>>,
    function_call_edges: BTreeMap<u32, Vec<u32>>,
    marker_callers: HashMap<u32, u32>,
}

impl Overlay {
    /// Build the overlay. Empty merge ranges are rejected.
    ///
    /// When a marker appears under several callers, the smallest caller id
    /// owns it.
    pub fn new(
        combined_nodes: BTreeMap<u32, Vec<u32>>,
        function_call_edges: BTreeMap<u32, Vec<u32>>,
    ) -> Result<Self> {
        if let Some((id, _)) = combined_nodes.iter().find(|(_, range)| range.is_empty()) {
            return Err(Error::Validation(format!(
                "combined node {} has an empty merge range",
                id
            )));
        }

        let mut marker_callers = HashMap::new();
        for (&caller, targets) in &function_call_edges {
            for &target in targets {
                marker_callers.entry(target).or_insert(caller);
            }
        }

        Ok(Self {
            combined_nodes,
            function_call_edges,
            marker_callers,
        })
    }

    /// Caller-side node whose function-call entry mentions `marker`.
    pub fn caller_of(&self, marker: u32) -> Option<u32> {
        self.marker_callers.get(&marker).copied()
    }

    /// Return target recorded for the call made at `caller`.
    pub fn return_target(&self, caller: u32) -> Option<u32> {
        self.function_call_edges
            .get(&caller)
            .and_then(|targets| targets.get(1))
            .copied()
    }

    pub fn merge_range(&self, id: u32) -> Option<&[u32]> {
        self.combined_nodes.get(&id).map(Vec::as_slice)
    }

    pub fn is_combined(&self, id: u32) -> bool {
        self.combined_nodes.contains_key(&id)
    }

    /// Last canonical node of a merged chain; edges leaving the merged node
    /// belong to it.
    pub fn merge_exit(&self, id: u32) -> Option<u32> {
        self.merge_range(id).and_then(|range| range.last()).copied()
    }

    /// Smallest and largest canonical index of a merged node.
    pub fn merge_bounds(&self, id: u32) -> Option<(u32, u32)> {
        let range = self.merge_range(id)?;
        Some((*range.iter().min()?, *range.iter().max()?))
    }
}

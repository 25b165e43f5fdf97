//! Canonical CFA model and the resolver that maps rendered graph elements
//! back onto it.

pub mod model;
pub mod overlay;
pub mod resolver;

pub use model::{CanonicalGraph, CfaEdge, CfaModel, CfaNode};
pub use overlay::{DisplayNode, Overlay, SYNTHETIC_ID_THRESHOLD};
pub use resolver::{NodeDescriptor, Resolver, SplitEdgeId};

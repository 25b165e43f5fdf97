//! Display-to-canonical resolution over a model loaded from disk.

use cfaview::cfa::{CfaModel, DisplayNode, NodeDescriptor, Resolver};
use cfaview::Error;

use crate::fixtures::{sample_resolver, SampleFile};

#[test]
fn test_model_loads_from_file() {
    let file = SampleFile::new();
    let resolver = Resolver::from_model(CfaModel::load(&file.path).unwrap()).unwrap();
    assert_eq!(resolver.graph().node_count(), 10);
    assert_eq!(resolver.graph().edge_count(), 9);
}

#[test]
fn test_resolution_is_idempotent() {
    let resolver = sample_resolver();
    let pairs = [("1", "2"), ("5", "8"), ("100002", "20"), ("3", "100003"), ("42", "99")];
    for (source, target) in pairs {
        let first = resolver.resolve_edge(source, target).unwrap().cloned();
        let second = resolver.resolve_edge(source, target).unwrap().cloned();
        assert_eq!(first, second, "{} -> {}", source, target);
    }
}

#[test]
fn test_combined_source_resolves_to_last_node() {
    let resolver = sample_resolver();
    let edge = resolver.resolve_edge("5", "8").unwrap().unwrap();
    assert_eq!((edge.source, edge.target), (7, 8));
    assert_eq!(edge.stmt.as_deref(), Some("return y;"));
}

#[test]
fn test_call_marker_resolves_to_caller() {
    let resolver = sample_resolver();
    let edge = resolver.resolve_edge("100002", "20").unwrap().unwrap();
    assert_eq!((edge.source, edge.target), (3, 20));
    assert_eq!(edge.kind.as_deref(), Some("FunctionCallEdge"));
}

#[test]
fn test_return_marker_resolves_to_return_node() {
    let resolver = sample_resolver();
    let edge = resolver.resolve_edge("3", "100003").unwrap().unwrap();
    assert_eq!((edge.source, edge.target), (3, 4));
    assert_eq!(edge.kind.as_deref(), Some("FunctionSummaryEdge"));
}

#[test]
fn test_unknown_edge_is_none() {
    let resolver = sample_resolver();
    assert!(resolver.resolve_edge("42", "99").unwrap().is_none());
    assert!(resolver
        .resolve_display_edge(DisplayNode::Canonical(42), DisplayNode::Canonical(99))
        .is_none());
}

#[test]
fn test_split_fragment_resolves_through_element_id() {
    let resolver = sample_resolver();
    let edge = resolver
        .resolve_edge_or_split("100100", "100101", "cfa-split-edge_2-3")
        .unwrap()
        .unwrap();
    assert_eq!(edge.line, 4);

    assert!(matches!(
        resolver.resolve_edge_or_split("100100", "100101", "cfa-split-edge"),
        Err(Error::InvalidDisplayId(_))
    ));
}

#[test]
fn test_node_descriptions() {
    let resolver = sample_resolver();
    assert_eq!(
        resolver.resolve_node("100002").unwrap().describe(),
        "type: function call node"
    );
    assert_eq!(
        resolver.resolve_node("5").unwrap().to_string(),
        "function: main\ncombines nodes: 5-7\nreverse postorder Id: 4"
    );
    match resolver.resolve_node("20").unwrap() {
        NodeDescriptor::Node(node) => assert_eq!(node.func, "abs"),
        other => panic!("Expected a plain node, got {:?}", other),
    }
    assert!(matches!(
        resolver.resolve_node("99"),
        Err(Error::NodeNotFound(99))
    ));
}

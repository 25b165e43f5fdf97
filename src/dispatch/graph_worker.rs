//! Built-in worker that hands out the CFA one function at a time.

use std::collections::VecDeque;

use serde::Serialize;

use super::worker::{GraphUnit, Renderer, Worker, WorkerReply, WorkerRequest};
use crate::cfa::{CanonicalGraph, CfaEdge, CfaNode};
use crate::Result;

/// Status sent once every subgraph has been handed out.
pub const DONE_STATUS: &str = "done";

#[derive(Serialize)]
struct Subgraph<'a> {
    func: &'a str,
    nodes: Vec<&'a CfaNode>,
    edges: Vec<&'a CfaEdge>,
}

/// Answers each `ready` with the next function's subgraph serialized as JSON,
/// then with a `done` status.
pub struct FunctionGraphWorker {
    pending: VecDeque<(String, String)>,
    next_id: u32,
}

impl FunctionGraphWorker {
    /// Serialize one subgraph per function, in function-name order.
    pub fn new(graph: &CanonicalGraph) -> Result<Self> {
        let mut pending = VecDeque::new();
        for func in graph.functions() {
            let (nodes, edges) = graph.function_subgraph(func);
            let json = serde_json::to_string(&Subgraph { func, nodes, edges })?;
            pending.push_back((func.to_string(), json));
        }
        Ok(Self {
            pending,
            next_id: 0,
        })
    }

    /// A worker with nothing to hand out.
    pub fn empty() -> Self {
        Self {
            pending: VecDeque::new(),
            next_id: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Worker for FunctionGraphWorker {
    fn handle(&mut self, request: WorkerRequest) -> std::result::Result<WorkerReply, String> {
        match request.renderer {
            Renderer::Ready => match self.pending.pop_front() {
                Some((func, graph)) => {
                    let id = self.next_id;
                    self.next_id += 1;
                    Ok(WorkerReply::Graph(GraphUnit {
                        id,
                        graph,
                        func,
                        cfa_split: request.cfa_split,
                        arg_tab_disabled: request.arg_tab_disabled,
                    }))
                }
                None => Ok(WorkerReply::status(DONE_STATUS)),
            },
        }
    }
}

//! Render sessions driving real workers through the dispatcher.

use std::collections::HashSet;

use cfaview::cfa::CanonicalGraph;
use cfaview::dispatch::{Dispatcher, FunctionGraphWorker, GraphUnit, WorkerReply, WorkerRequest, DONE_STATUS};
use cfaview::render::{GraphSink, RenderOptions, RenderSession, ARG_WORKER, CFA_WORKER};
use cfaview::{Error, Result};

use crate::fixtures::sample_model;

#[derive(Default)]
struct RecordingSink {
    shown: HashSet<u32>,
    rendered: Vec<String>,
    completed: Option<String>,
    arg: Option<WorkerReply>,
}

impl GraphSink for RecordingSink {
    fn contains(&self, id: u32) -> bool {
        self.shown.contains(&id)
    }

    fn render_graph(&mut self, unit: GraphUnit) -> Result<()> {
        self.shown.insert(unit.id);
        self.rendered.push(unit.func);
        Ok(())
    }

    fn cfa_complete(&mut self, status: &str) {
        self.completed = Some(status.to_string());
    }

    fn arg_reply(&mut self, reply: WorkerReply) {
        self.arg = Some(reply);
    }
}

fn sample_dispatcher() -> Dispatcher {
    let model = sample_model();
    let graph = CanonicalGraph::new(model.nodes, model.edges).unwrap();
    Dispatcher::builder()
        .worker(CFA_WORKER, FunctionGraphWorker::new(&graph).unwrap())
        .worker(ARG_WORKER, FunctionGraphWorker::empty())
        .spawn()
        .unwrap()
}

#[tokio::test]
async fn test_session_renders_every_function_then_hands_off() {
    let dispatcher = sample_dispatcher();
    let mut sink = RecordingSink::default();

    let summary = RenderSession::new(&dispatcher, RenderOptions::default())
        .run(&mut sink)
        .await
        .unwrap();

    assert_eq!(summary.rendered, 2);
    assert_eq!(summary.skipped, 0);
    assert!(summary.arg_requested);
    assert_eq!(sink.rendered, vec!["abs", "main"]);
    assert_eq!(sink.completed.as_deref(), Some(DONE_STATUS));
    assert_eq!(sink.arg, Some(WorkerReply::status(DONE_STATUS)));
}

#[tokio::test]
async fn test_split_view_stops_after_cfa() {
    let dispatcher = sample_dispatcher();
    let mut sink = RecordingSink::default();
    let options = RenderOptions {
        cfa_split: true,
        arg_tab_disabled: false,
    };

    let summary = RenderSession::new(&dispatcher, options)
        .run(&mut sink)
        .await
        .unwrap();

    assert_eq!(summary.rendered, 2);
    assert!(!summary.arg_requested);
    assert!(sink.arg.is_none());
}

#[tokio::test]
async fn test_already_shown_graphs_are_skipped() {
    let dispatcher = sample_dispatcher();
    let mut sink = RecordingSink::default();
    sink.shown.insert(0);
    let options = RenderOptions {
        cfa_split: false,
        arg_tab_disabled: true,
    };

    let summary = RenderSession::new(&dispatcher, options)
        .run(&mut sink)
        .await
        .unwrap();

    assert_eq!((summary.rendered, summary.skipped), (1, 1));
    assert_eq!(sink.rendered, vec!["main"]);
    assert!(!summary.arg_requested);
}

#[tokio::test]
async fn test_worker_fault_ends_session() {
    let dispatcher = Dispatcher::builder()
        .worker(CFA_WORKER, |_req: WorkerRequest| {
            Err::<WorkerReply, _>("no layout engine".to_string())
        })
        .spawn()
        .unwrap();
    let mut sink = RecordingSink::default();

    let result = RenderSession::new(&dispatcher, RenderOptions::default())
        .run(&mut sink)
        .await;

    assert!(matches!(result, Err(Error::WorkerFault { .. })));
    assert!(sink.rendered.is_empty());
}

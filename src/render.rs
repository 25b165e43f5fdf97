//! Render session: the request loop a viewer runs on top of the dispatcher.
//!
//! The CFA worker is asked for subgraphs one `ready` at a time. Each new
//! subgraph goes to the `GraphSink`; ids the sink already shows are skipped.
//! When the CFA worker reports completion, the session either stops (split
//! view, or ARG tab disabled) or hands over to the ARG worker.

use crate::config::Config;
use crate::dispatch::{Dispatcher, GraphUnit, WorkerReply, WorkerRequest};
use crate::{cvlog_debug, Result};

pub const CFA_WORKER: &str = "cfaWorker";
pub const ARG_WORKER: &str = "argWorker";

/// The UI side of a render session.
pub trait GraphSink {
    /// Whether the subgraph with this id is already shown.
    fn contains(&self, id: u32) -> bool;

    fn render_graph(&mut self, unit: GraphUnit) -> Result<()>;

    /// All CFA subgraphs have been delivered.
    fn cfa_complete(&mut self, _status: &str) {}

    /// First reply of the ARG worker after the hand-off.
    fn arg_reply(&mut self, _reply: WorkerReply) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub cfa_split: bool,
    pub arg_tab_disabled: bool,
}

impl From<&Config> for RenderOptions {
    fn from(config: &Config) -> Self {
        Self {
            cfa_split: config.cfa_split,
            arg_tab_disabled: config.arg_tab_disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub rendered: usize,
    pub skipped: usize,
    pub arg_requested: bool,
}

pub struct RenderSession<'a> {
    dispatcher: &'a Dispatcher,
    options: RenderOptions,
}

impl<'a> RenderSession<'a> {
    pub fn new(dispatcher: &'a Dispatcher, options: RenderOptions) -> Self {
        Self {
            dispatcher,
            options,
        }
    }

    /// Drive the CFA worker to completion. A worker fault ends the session.
    pub async fn run<S: GraphSink>(&self, sink: &mut S) -> Result<RenderSummary> {
        let mut summary = RenderSummary::default();
        let mut request = WorkerRequest::ready()
            .with_cfa_split(self.options.cfa_split)
            .with_arg_tab_disabled(self.options.arg_tab_disabled);

        loop {
            match self.dispatcher.submit(CFA_WORKER, request.clone()).await? {
                WorkerReply::Graph(unit) => {
                    request = WorkerRequest::ready()
                        .with_cfa_split(unit.cfa_split)
                        .with_arg_tab_disabled(unit.arg_tab_disabled);
                    if sink.contains(unit.id) {
                        cvlog_debug!("graph {} already rendered, skipping", unit.id);
                        summary.skipped += 1;
                        continue;
                    }
                    cvlog_debug!("render graph {} ({})", unit.id, unit.func);
                    sink.render_graph(unit)?;
                    summary.rendered += 1;
                }
                WorkerReply::Status { status } => {
                    sink.cfa_complete(&status);
                    if request.cfa_split || request.arg_tab_disabled {
                        return Ok(summary);
                    }
                    summary.arg_requested = true;
                    let reply = self
                        .dispatcher
                        .submit(ARG_WORKER, WorkerRequest::ready())
                        .await?;
                    sink.arg_reply(reply);
                    return Ok(summary);
                }
            }
        }
    }
}

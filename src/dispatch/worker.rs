//! Worker boundary: message types and the thread that hosts a worker.
//!
//! A worker owns its state exclusively and runs on a dedicated OS thread. It
//! receives requests through a crossbeam inbox and answers through the
//! dispatcher's command channel, so it shares no memory with the control
//! task.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::dispatcher::Command;
use crate::{cvlog_debug, Result};

/// What the worker should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Renderer {
    /// Advance to the next unit of work.
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub renderer: Renderer,
    /// The CFA is split across several rendered subgraphs.
    #[serde(default)]
    pub cfa_split: bool,
    /// The ARG pass after the CFA is disabled.
    #[serde(default)]
    pub arg_tab_disabled: bool,
}

impl WorkerRequest {
    pub fn ready() -> Self {
        Self {
            renderer: Renderer::Ready,
            cfa_split: false,
            arg_tab_disabled: false,
        }
    }

    pub fn with_cfa_split(mut self, cfa_split: bool) -> Self {
        self.cfa_split = cfa_split;
        self
    }

    pub fn with_arg_tab_disabled(mut self, arg_tab_disabled: bool) -> Self {
        self.arg_tab_disabled = arg_tab_disabled;
        self
    }
}

/// One subgraph ready to be laid out and drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUnit {
    pub id: u32,
    /// Serialized graph handed to the layout engine.
    pub graph: String,
    pub func: String,
    pub cfa_split: bool,
    pub arg_tab_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerReply {
    Graph(GraphUnit),
    /// The worker has nothing more to produce.
    Status { status: String },
}

impl WorkerReply {
    pub fn status(status: impl Into<String>) -> Self {
        WorkerReply::Status {
            status: status.into(),
        }
    }
}

/// A stateful background worker.
///
/// `handle` is called for one request at a time. Returning `Err` (or
/// panicking) fails only the job being handled.
pub trait Worker: Send + 'static {
    fn handle(&mut self, request: WorkerRequest) -> std::result::Result<WorkerReply, String>;
}

impl<F> Worker for F
where
    F: FnMut(WorkerRequest) -> std::result::Result<WorkerReply, String> + Send + 'static,
{
    fn handle(&mut self, request: WorkerRequest) -> std::result::Result<WorkerReply, String> {
        self(request)
    }
}

/// Start the thread hosting `worker` and return its inbox.
///
/// The thread exits once the inbox is dropped or the dispatcher stops
/// accepting replies.
pub(crate) fn spawn_host(
    name: String,
    mut worker: Box<dyn Worker>,
    replies: mpsc::UnboundedSender<Command>,
) -> Result<crossbeam_channel::Sender<WorkerRequest>> {
    let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded::<WorkerRequest>();

    thread::Builder::new()
        .name(format!("worker-{}", name))
        .spawn(move || {
            cvlog_debug!("worker {} started", name);
            for request in inbox_rx.iter() {
                let outcome = catch_unwind(AssertUnwindSafe(|| worker.handle(request)))
                    .unwrap_or_else(|payload| Err(panic_message(payload)));
                let completed = Command::Completed {
                    worker: name.clone(),
                    outcome,
                };
                if replies.send(completed).is_err() {
                    break;
                }
            }
            cvlog_debug!("worker {} stopped", name);
        })?;

    Ok(inbox_tx)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", msg)
    } else {
        "worker panicked".to_string()
    }
}

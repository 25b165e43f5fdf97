//! Background job dispatch.
//!
//! A small fixed set of named workers, each running at most one job at a
//! time, fed from one FIFO queue. Every submitted job yields a `JobHandle`
//! future that resolves with the worker's reply or fault.

mod dispatcher;
mod graph_worker;
mod queue;
mod worker;

pub use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherSnapshot, JobHandle};
pub use graph_worker::{FunctionGraphWorker, DONE_STATUS};
pub use queue::JobId;
pub use worker::{GraphUnit, Renderer, Worker, WorkerReply, WorkerRequest};

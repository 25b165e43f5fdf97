//! Job dispatcher for the background worker pool.
//!
//! All scheduling state (the job queue and each worker's `Idle`/`Busy`
//! state) is owned by a single tokio task, the dispatch loop. Callers,
//! workers and the loop itself talk to it through one command channel, so a
//! drain pass never runs synchronously inside `submit` and worker replies
//! queued before a retry are handled first.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::queue::{Job, JobId, JobQueue};
use super::worker::{spawn_host, Worker, WorkerReply, WorkerRequest};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::{cvlog_debug, cvlog_trace, cvlog_warn};

pub(crate) enum Command {
    Submit(Job),
    Drain,
    Completed {
        worker: String,
        outcome: std::result::Result<WorkerReply, String>,
    },
    Snapshot(oneshot::Sender<DispatcherSnapshot>),
}

enum WorkerState {
    Idle,
    /// Holds the completion of the single job in flight.
    Busy {
        job: JobId,
        completion: oneshot::Sender<Result<WorkerReply>>,
    },
}

struct WorkerSlot {
    inbox: crossbeam_channel::Sender<WorkerRequest>,
    state: WorkerState,
}

impl WorkerSlot {
    fn is_busy(&self) -> bool {
        matches!(self.state, WorkerState::Busy { .. })
    }
}

/// Point-in-time view of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSnapshot {
    /// Jobs waiting in the queue.
    pub queued: usize,
    /// Busy flag per worker name.
    pub workers: BTreeMap<String, bool>,
}

impl DispatcherSnapshot {
    pub fn is_busy(&self, worker: &str) -> bool {
        self.workers.get(worker).copied().unwrap_or(false)
    }

    /// Nothing queued and no worker busy.
    pub fn is_quiescent(&self) -> bool {
        self.queued == 0 && self.workers.values().all(|busy| !busy)
    }
}

/// Pending result of a submitted job.
///
/// Resolves once with the worker's reply, `Error::WorkerFault` if the worker
/// failed, or `Error::DispatcherClosed` if the dispatcher went away first.
/// Dropping the handle does not cancel the job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    worker: String,
    rx: oneshot::Receiver<Result<WorkerReply>>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }
}

impl Future for JobHandle {
    type Output = Result<WorkerReply>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::DispatcherClosed)))
    }
}

/// Registers workers and starts the dispatch loop.
pub struct DispatcherBuilder {
    workers: Vec<(String, Box<dyn Worker>)>,
    drain_retry: Duration,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            workers: Vec::new(),
            drain_retry: Config::default().drain_retry(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new().drain_retry(config.drain_retry())
    }

    /// Delay before a drain pass retries a job whose worker is busy.
    pub fn drain_retry(mut self, delay: Duration) -> Self {
        self.drain_retry = delay;
        self
    }

    pub fn worker(mut self, name: impl Into<String>, worker: impl Worker) -> Self {
        self.workers.push((name.into(), Box::new(worker)));
        self
    }

    /// Start every worker thread and the dispatch loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<Dispatcher> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut slots = HashMap::with_capacity(self.workers.len());
        for (name, worker) in self.workers {
            if slots.contains_key(&name) {
                return Err(Error::Validation(format!(
                    "worker {} registered twice",
                    name
                )));
            }
            let inbox = spawn_host(name.clone(), worker, cmd_tx.clone())?;
            slots.insert(
                name,
                WorkerSlot {
                    inbox,
                    state: WorkerState::Idle,
                },
            );
        }

        let names = slots.keys().cloned().collect();
        let cancel = CancellationToken::new();
        let dispatch_loop = DispatchLoop {
            queue: JobQueue::default(),
            workers: slots,
            cmd_tx: cmd_tx.clone(),
            drain_retry: self.drain_retry,
            retry_at: None,
        };
        cvlog_debug!(
            "Dispatcher::spawn workers={:?} drain_retry={:?}",
            dispatch_loop.workers.keys().collect::<Vec<_>>(),
            self.drain_retry
        );
        tokio::spawn(dispatch_loop.run(cmd_rx, cancel.clone()));

        Ok(Dispatcher {
            cmd_tx,
            workers: names,
            cancel,
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running dispatcher. Dropping it shuts the dispatcher down.
pub struct Dispatcher {
    cmd_tx: mpsc::UnboundedSender<Command>,
    workers: HashSet<String>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Queue `request` for the worker called `worker`.
    ///
    /// The job is queued immediately, whether or not the handle is awaited.
    pub fn submit(&self, worker: &str, request: WorkerRequest) -> JobHandle {
        let id = JobId::new();
        let (completion, rx) = oneshot::channel();
        let handle = JobHandle {
            id,
            worker: worker.to_string(),
            rx,
        };

        if !self.workers.contains(worker) {
            cvlog_warn!("submit job {} to unknown worker {}", id.short(), worker);
            let _ = completion.send(Err(Error::UnknownWorker(worker.to_string())));
            return handle;
        }

        let job = Job {
            id,
            worker: worker.to_string(),
            request,
            completion,
        };
        // On failure the job, and with it the completion, is dropped, which
        // the handle reports as DispatcherClosed.
        if self.cmd_tx.send(Command::Submit(job)).is_err() {
            cvlog_debug!("submit job {} after shutdown", id.short());
        }
        handle
    }

    pub async fn snapshot(&self) -> Result<DispatcherSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Snapshot(tx))
            .map_err(|_| Error::DispatcherClosed)?;
        rx.await.map_err(|_| Error::DispatcherClosed)
    }

    pub fn has_worker(&self, worker: &str) -> bool {
        self.workers.contains(worker)
    }

    /// Stop the dispatch loop. Queued and in-flight jobs fail with
    /// `DispatcherClosed`; worker threads exit after their current job.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct DispatchLoop {
    queue: JobQueue,
    workers: HashMap<String, WorkerSlot>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    drain_retry: Duration,
    retry_at: Option<Instant>,
}

impl DispatchLoop {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        loop {
            let retry_at = self.retry_at;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.drain();
                }
            }
        }
        self.close();
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Submit(job) => {
                cvlog_trace!("queue job {} for {}", job.id.short(), job.worker);
                self.queue.push_back(job);
                self.schedule_drain();
            }
            Command::Drain => self.drain(),
            Command::Completed { worker, outcome } => self.complete(worker, outcome),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Post a drain pass behind whatever is already in the command channel.
    fn schedule_drain(&self) {
        let _ = self.cmd_tx.send(Command::Drain);
    }

    fn schedule_retry(&mut self) {
        let at = Instant::now() + self.drain_retry;
        self.retry_at = Some(self.retry_at.map_or(at, |current| current.min(at)));
    }

    /// Try to dispatch the head job.
    fn drain(&mut self) {
        let Some(job) = self.queue.pop_front() else {
            return;
        };

        let busy = match self.workers.get(&job.worker) {
            Some(slot) => slot.is_busy(),
            None => {
                let _ = job
                    .completion
                    .send(Err(Error::UnknownWorker(job.worker.clone())));
                self.schedule_drain();
                return;
            }
        };

        if busy {
            cvlog_trace!("worker {} busy, job {} stays at head", job.worker, job.id.short());
            self.queue.requeue_front(job);
            self.schedule_retry();
            return;
        }

        let Job {
            id,
            worker,
            request,
            completion,
        } = job;
        if let Some(slot) = self.workers.get_mut(&worker) {
            match slot.inbox.send(request) {
                Ok(()) => {
                    cvlog_debug!("dispatch job {} to {}", id.short(), worker);
                    slot.state = WorkerState::Busy { job: id, completion };
                }
                Err(_) => {
                    cvlog_warn!("worker {} is gone, failing job {}", worker, id.short());
                    let _ = completion.send(Err(Error::WorkerFault {
                        worker: worker.clone(),
                        message: "worker thread has exited".to_string(),
                    }));
                }
            }
        }
        self.schedule_drain();
    }

    fn complete(&mut self, worker: String, outcome: std::result::Result<WorkerReply, String>) {
        let Some(slot) = self.workers.get_mut(&worker) else {
            cvlog_warn!("reply from unregistered worker {}", worker);
            return;
        };

        match std::mem::replace(&mut slot.state, WorkerState::Idle) {
            WorkerState::Busy { job, completion } => {
                let result = outcome.map_err(|message| {
                    cvlog_warn!("worker {} failed job {}: {}", worker, job.short(), message);
                    Error::WorkerFault {
                        worker: worker.clone(),
                        message,
                    }
                });
                cvlog_debug!("worker {} finished job {}", worker, job.short());
                if completion.send(result).is_err() {
                    cvlog_trace!("job {} handle was dropped", job.short());
                }
            }
            WorkerState::Idle => {
                cvlog_warn!("worker {} replied while idle, reply dropped", worker);
            }
        }
    }

    fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            queued: self.queue.len(),
            workers: self
                .workers
                .iter()
                .map(|(name, slot)| (name.clone(), slot.is_busy()))
                .collect(),
        }
    }

    fn close(&mut self) {
        let queued = self.queue.len();
        for job in self.queue.drain() {
            let _ = job.completion.send(Err(Error::DispatcherClosed));
        }
        for slot in self.workers.values_mut() {
            if let WorkerState::Busy { completion, .. } =
                std::mem::replace(&mut slot.state, WorkerState::Idle)
            {
                let _ = completion.send(Err(Error::DispatcherClosed));
            }
        }
        cvlog_debug!("dispatch loop stopped, {} queued jobs failed", queued);
    }
}

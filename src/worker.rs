use crate::snmp::{
    BatchHints, InterfaceStats, ItemRequest, ItemResult, PollError, PollerSession, Target,
    WalkParams,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("poller worker {0} is not running")]
    Stopped(usize),
    #[error("poller worker {0} didn't respond")]
    NoResponse(usize),
    #[error("no poller workers configured")]
    Empty,
    #[error("failed to spawn poller worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Everything a worker needs to poll one interface.
#[derive(Debug, Clone)]
pub struct InterfaceJob {
    pub id: String,
    pub target: Target,
    pub bulk: bool,
    pub items: Vec<ItemRequest>,
}

/// Request sent to a worker thread
#[derive(Debug)]
pub enum PollRequest {
    Poll {
        job: InterfaceJob,
        response_tx: oneshot::Sender<Vec<ItemResult>>,
    },
    Walk {
        job: InterfaceJob,
        oid: String,
        response_tx: oneshot::Sender<Result<Vec<(String, String)>, PollError>>,
    },
    ClearCache,
    Shutdown,
}

/// Polling thread that owns one `PollerSession` and its index cache
pub struct PollerWorker {
    index: usize,
    request_tx: mpsc::UnboundedSender<PollRequest>,
}

impl PollerWorker {
    /// Spawn the worker thread
    pub fn spawn(
        index: usize,
        session: PollerSession,
        max_batch_items: usize,
    ) -> Result<Self, WorkerError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();

        // 8MB stack for SNMPv3 crypto operations
        std::thread::Builder::new()
            .name(format!("poller-{}", index))
            .stack_size(8 * 1024 * 1024)
            .spawn(move || run_worker_thread(index, session, max_batch_items, request_rx))?;

        tracing::info!("Spawned poller worker {}", index);

        Ok(Self { index, request_tx })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Poll every item of one interface
    pub async fn poll(&self, job: InterfaceJob) -> Result<Vec<ItemResult>, WorkerError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send(PollRequest::Poll { job, response_tx })
            .map_err(|_| WorkerError::Stopped(self.index))?;

        response_rx
            .await
            .map_err(|_| WorkerError::NoResponse(self.index))
    }

    /// Walk one subtree on the interface's target
    pub async fn walk(
        &self,
        job: InterfaceJob,
        oid: String,
    ) -> Result<Result<Vec<(String, String)>, PollError>, WorkerError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send(PollRequest::Walk {
                job,
                oid,
                response_tx,
            })
            .map_err(|_| WorkerError::Stopped(self.index))?;

        response_rx
            .await
            .map_err(|_| WorkerError::NoResponse(self.index))
    }

    pub fn clear_cache(&self) {
        let _ = self.request_tx.send(PollRequest::ClearCache);
    }

    pub fn shutdown(&self) {
        let _ = self.request_tx.send(PollRequest::Shutdown);
    }
}

/// Run the worker thread (blocking)
fn run_worker_thread(
    index: usize,
    mut session: PollerSession,
    max_batch_items: usize,
    mut request_rx: mpsc::UnboundedReceiver<PollRequest>,
) {
    tracing::debug!("Poller worker {} started", index);
    let mut stats = InterfaceStats::new(max_batch_items);

    while let Some(request) = request_rx.blocking_recv() {
        match request {
            PollRequest::Poll { job, response_tx } => {
                stats.register(&job.id, job.bulk);
                let results = session.get_values(&job.id, &job.target, &job.items, &mut stats);
                let _ = response_tx.send(results);
            }
            PollRequest::Walk {
                job,
                oid,
                response_tx,
            } => {
                stats.register(&job.id, job.bulk);
                let (max_vars, bulk) = stats.suggested_vars(&job.id);
                let result = session.walk_table(&job.target, &oid, WalkParams { bulk, max_vars });
                let _ = response_tx.send(result);
            }
            PollRequest::ClearCache => session.clear_cache(),
            PollRequest::Shutdown => {
                tracing::debug!("Poller worker {} shutting down", index);
                break;
            }
        }
    }

    tracing::debug!("Poller worker {} stopped", index);
}

/// Fixed set of workers; each interface always lands on the same one so
/// its index cache stays warm.
pub struct WorkerPool {
    workers: Vec<PollerWorker>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        max_batch_items: usize,
        mut make_session: impl FnMut() -> PollerSession,
    ) -> Result<Self, WorkerError> {
        let workers = (0..count.max(1))
            .map(|index| PollerWorker::spawn(index, make_session(), max_batch_items))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!("Started {} poller workers", workers.len());
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Worker that owns `interface_id`.
    pub fn worker_for(&self, interface_id: &str) -> Result<&PollerWorker, WorkerError> {
        if self.workers.is_empty() {
            return Err(WorkerError::Empty);
        }
        let mut hasher = DefaultHasher::new();
        interface_id.hash(&mut hasher);
        let index = (hasher.finish() % self.workers.len() as u64) as usize;
        Ok(&self.workers[index])
    }

    pub async fn poll(&self, job: InterfaceJob) -> Result<Vec<ItemResult>, WorkerError> {
        self.worker_for(&job.id)?.poll(job).await
    }

    pub async fn walk(
        &self,
        job: InterfaceJob,
        oid: String,
    ) -> Result<Result<Vec<(String, String)>, PollError>, WorkerError> {
        self.worker_for(&job.id)?.walk(job, oid).await
    }

    pub fn clear_caches(&self) {
        for worker in &self.workers {
            worker.clear_cache();
        }
    }

    pub fn shutdown_all(&self) {
        tracing::info!("Shutting down {} poller workers", self.workers.len());
        for worker in &self.workers {
            worker.shutdown();
        }
    }
}

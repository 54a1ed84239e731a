use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::config::{QueueConfig, QueueMode};
use crate::{Error, Result};

/// Executes named tasks. Payloads in and out are encoded strings.
#[async_trait]
pub trait TaskWorker: Send + Sync + 'static {
    async fn execute(&self, task: &str, payload: String) -> String;
}

/// Handle to a submitted task
pub trait PendingTask: Send {
    /// `None` while the task is running. `Some(Err(..))` when the task can
    /// no longer produce a result.
    fn try_result(&mut self) -> Option<std::result::Result<String, String>>;
}

/// Accepts task submissions without blocking the caller
pub trait TaskQueue: Send + Sync {
    fn submit(&self, task: &str, payload: String) -> Result<Box<dyn PendingTask>>;
}

struct OneshotTask {
    rx: oneshot::Receiver<String>,
}

impl PendingTask for OneshotTask {
    fn try_result(&mut self) -> Option<std::result::Result<String, String>> {
        match self.rx.try_recv() {
            Ok(payload) => Some(Ok(payload)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err("worker dropped the task".to_string()))
            }
        }
    }
}

/// Runs tasks on the caller's tokio runtime
pub struct InProcessQueue {
    worker: Arc<dyn TaskWorker>,
    handle: Handle,
}

impl InProcessQueue {
    /// Must be called from within a tokio runtime
    pub fn new(worker: Arc<dyn TaskWorker>) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Other(format!("in-process queue needs a tokio runtime: {}", e)))?;
        Ok(Self { worker, handle })
    }
}

impl TaskQueue for InProcessQueue {
    fn submit(&self, task: &str, payload: String) -> Result<Box<dyn PendingTask>> {
        let (tx, rx) = oneshot::channel();
        let worker = Arc::clone(&self.worker);
        let task = task.to_string();

        self.handle.spawn(async move {
            let output = worker.execute(&task, payload).await;
            let _ = tx.send(output);
        });

        Ok(Box::new(OneshotTask { rx }))
    }
}

struct Job {
    task: String,
    payload: String,
    reply: oneshot::Sender<String>,
}

/// Runs tasks on a dedicated multi-threaded runtime owned by a background
/// thread. The thread exits once the queue is dropped and in-flight jobs
/// have been handed off.
pub struct WorkerPoolQueue {
    jobs: mpsc::UnboundedSender<Job>,
}

impl WorkerPoolQueue {
    pub fn new(worker: Arc<dyn TaskWorker>, workers: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name("feedsync-worker")
            .enable_all()
            .build()?;

        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();

        std::thread::Builder::new()
            .name("feedsync-queue".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(job) = rx.recv().await {
                        let worker = Arc::clone(&worker);
                        tokio::spawn(async move {
                            let output = worker.execute(&job.task, job.payload).await;
                            let _ = job.reply.send(output);
                        });
                    }
                });
                tracing::debug!("Worker pool shut down");
            })?;

        tracing::info!("Started worker pool with {} threads", workers.max(1));
        Ok(Self { jobs })
    }
}

impl TaskQueue for WorkerPoolQueue {
    fn submit(&self, task: &str, payload: String) -> Result<Box<dyn PendingTask>> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job {
                task: task.to_string(),
                payload,
                reply,
            })
            .map_err(|_| Error::TaskTransport("worker pool is not running".to_string()))?;

        Ok(Box::new(OneshotTask { rx }))
    }
}

/// Build the queue selected by configuration
pub fn build_queue(config: &QueueConfig, worker: Arc<dyn TaskWorker>) -> Result<Arc<dyn TaskQueue>> {
    match config.mode {
        QueueMode::InProcess => {
            tracing::info!("Running fetch tasks in process");
            Ok(Arc::new(InProcessQueue::new(worker)?))
        }
        QueueMode::WorkerPool => Ok(Arc::new(WorkerPoolQueue::new(worker, config.workers)?)),
    }
}

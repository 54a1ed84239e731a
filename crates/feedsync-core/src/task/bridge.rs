use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::protocol::{decode_output, encode_args, FetchTaskArgs, TaskOutcome, FETCH_FEED};
use super::queue::{PendingTask, TaskQueue};
use crate::config::SyncConfig;
use crate::{Error, Result};

/// Resolves once the submitted task completes, fails or times out
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<TaskOutcome>> + Send>>;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

type Delivery = std::result::Result<String, String>;

struct Outstanding {
    task: Box<dyn PendingTask>,
    reply: oneshot::Sender<Delivery>,
}

#[derive(Default)]
struct BridgeState {
    outstanding: Vec<Outstanding>,
    polling: bool,
}

/// Turns queue submissions into awaitable futures.
///
/// A poll task checks every outstanding submission at a fixed interval and
/// delivers finished results. It stops itself when nothing is outstanding
/// and is restarted by the next [`TaskBridge::run`].
pub struct TaskBridge {
    queue: Arc<dyn TaskQueue>,
    poll_interval: Duration,
    task_timeout: Duration,
    state: Arc<Mutex<BridgeState>>,
}

impl TaskBridge {
    /// A zero `poll_interval` is raised to 1 ms
    pub fn new(queue: Arc<dyn TaskQueue>, poll_interval: Duration, task_timeout: Duration) -> Self {
        Self {
            queue,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            task_timeout,
            state: Arc::new(Mutex::new(BridgeState::default())),
        }
    }

    pub fn from_config(queue: Arc<dyn TaskQueue>, config: &SyncConfig) -> Self {
        Self::new(queue, config.poll_interval(), config.task_timeout())
    }

    /// Submit a fetch task and return its future without waiting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(&self, args: &FetchTaskArgs) -> Result<TaskFuture> {
        let payload = encode_args(args)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Other(format!("task bridge needs a tokio runtime: {}", e)))?;

        let task = self.queue.submit(FETCH_FEED, payload)?;
        let (reply, rx) = oneshot::channel();

        let start_poller = {
            let mut state = lock(&self.state);
            state.outstanding.push(Outstanding { task, reply });
            !std::mem::replace(&mut state.polling, true)
        };

        if start_poller {
            debug!("Starting task poller");
            runtime.spawn(poll_loop(Arc::clone(&self.state), self.poll_interval));
        }

        let timeout = self.task_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        Ok(Box::pin(async move {
            match tokio::time::timeout_at(deadline, rx).await {
                Err(_) => Err(Error::TaskTimeout(timeout)),
                Ok(Err(_)) => Err(Error::TaskFailed("task bridge dropped the task".to_string())),
                Ok(Ok(Err(reason))) => Err(Error::TaskFailed(reason)),
                Ok(Ok(Ok(payload))) => decode_output(&payload),
            }
        }))
    }

    /// Number of submissions not yet delivered
    pub fn outstanding(&self) -> usize {
        lock(&self.state).outstanding.len()
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.state).polling
    }
}

fn lock(state: &Mutex<BridgeState>) -> MutexGuard<'_, BridgeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn poll_loop(state: Arc<Mutex<BridgeState>>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        // Work on a snapshot; submissions arriving meanwhile are appended
        // after the survivors.
        let snapshot = std::mem::take(&mut lock(&state).outstanding);
        let mut kept = Vec::with_capacity(snapshot.len());

        for mut entry in snapshot {
            if entry.reply.is_closed() {
                trace!("Dropping task whose caller went away");
                continue;
            }
            match entry.task.try_result() {
                None => kept.push(entry),
                Some(result) => {
                    let _ = entry.reply.send(result);
                }
            }
        }

        let mut state = lock(&state);
        let submitted = std::mem::take(&mut state.outstanding);
        kept.extend(submitted);
        state.outstanding = kept;

        if state.outstanding.is_empty() {
            state.polling = false;
            debug!("Task poller idle");
            break;
        }
    }
}

//! Bounded worker-pool executor with panic isolation (§4.1).

use crate::error::ExecError;
use crate::task::Task;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Runs submitted [`Task`]s on a fixed pool of background tokio tasks.
///
/// Each worker spawns every task it dequeues as its own tokio task and
/// awaits the join handle, so a panic inside a task's future is caught by
/// the runtime and logged rather than unwinding the worker loop.
pub struct Executor {
    tx: Mutex<Option<mpsc::Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    inflight: Arc<AtomicUsize>,
    queue_capacity: usize,
    worker_count: usize,
}

impl Executor {
    pub fn start(worker_count: usize, queue_capacity: usize) -> Arc<Self> {
        let worker_count = worker_count.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Task>(queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let inflight = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = Arc::clone(&rx);
            let inflight = Arc::clone(&inflight);
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, inflight).await;
            }));
        }

        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            closed: AtomicBool::new(false),
            inflight,
            queue_capacity,
            worker_count,
        })
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn submit(&self, task: Task) -> Result<(), ExecError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExecError::Closed);
        }
        let guard = self.tx.lock();
        match guard.as_ref() {
            None => Err(ExecError::Closed),
            Some(tx) => match tx.try_send(task) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => Err(ExecError::QueueFull),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(ExecError::Closed),
            },
        }
    }

    /// Closes the queue and waits up to `grace` for in-flight and queued
    /// tasks to drain. Idempotent.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), ExecError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Dropping the sender closes the channel so workers' recv() drains
        // remaining queued tasks and then returns None.
        let sender = self.tx.lock().take();
        drop(sender);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let joined = tokio::time::timeout(grace, futures_util::future::join_all(handles)).await;
        match joined {
            Ok(results) => {
                for result in results {
                    if let Err(join_err) = result {
                        if join_err.is_panic() {
                            error!("executor worker panicked during shutdown");
                        }
                    }
                }
                Ok(())
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "executor shutdown timed out");
                Err(ExecError::Timeout)
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    inflight: Arc<AtomicUsize>,
) {
    loop {
        let task = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(task) = task else {
            break;
        };

        inflight.fetch_add(1, Ordering::AcqRel);
        let name = task.name().to_string();
        let handle = tokio::spawn(task.fut);
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(task = %name, worker = worker_id, error = %err, "task completed with error");
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    error!(task = %name, worker = worker_id, "task panicked");
                } else {
                    warn!(task = %name, worker = worker_id, "task was cancelled");
                }
            }
        }
        inflight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_submitted_task_to_completion() {
        let executor = Executor::start(2, 4);
        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = Arc::clone(&counter);
        executor
            .submit(Task::new("inc", async move {
                counter2.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::Acquire), 1);
        executor.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn submit_rejects_once_queue_is_full() {
        // Single worker blocked on a gate so the queue backs up.
        let gate = Arc::new(tokio::sync::Notify::new());
        let executor = Executor::start(1, 1);

        let gate2 = Arc::clone(&gate);
        executor
            .submit(Task::new("blocker", async move {
                gate2.notified().await;
                Ok(())
            }))
            .unwrap();

        // Give the worker a moment to dequeue the blocker so the queue is
        // empty but the worker itself is busy; then fill the one queue slot.
        tokio::time::sleep(Duration::from_millis(20)).await;
        executor.submit(Task::new("queued", async { Ok(()) })).unwrap();

        let result = executor.submit(Task::new("overflow", async { Ok(()) }));
        assert_eq!(result, Err(ExecError::QueueFull));

        gate.notify_waiters();
        executor.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn panicking_task_is_isolated_and_worker_continues() {
        let executor = Executor::start(1, 4);
        executor
            .submit(Task::new("boom", async { panic!("intentional") }))
            .unwrap();

        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = Arc::clone(&counter);
        executor
            .submit(Task::new("after", async move {
                counter2.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::Acquire), 1);
        executor.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let executor = Executor::start(1, 4);
        executor.shutdown(Duration::from_secs(1)).await.unwrap();
        let result = executor.submit(Task::new("late", async { Ok(()) }));
        assert_eq!(result, Err(ExecError::Closed));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let executor = Executor::start(1, 4);
        executor.shutdown(Duration::from_secs(1)).await.unwrap();
        executor.shutdown(Duration::from_secs(1)).await.unwrap();
    }
}

//! # Task Queue and Worker Pool
//!
//! Accepted deliveries are placed on an unbounded in-memory FIFO and drained
//! by a fixed number of background workers. A worker hands each task to a
//! [`TaskProcessor`], records the outcome and moves on; no failure or panic
//! inside a task stops the worker.
//!
//! The queue lives only in memory. Tasks still pending when the process
//! exits are lost.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::WorkerConfig;
use crate::pipeline::{PipelineError, PipelineReport};
use crate::{TaskId, Timestamp};

// ============================================================================
// Task
// ============================================================================

/// Unit of work created per accepted webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisTask {
    pub task_id: TaskId,
    pub repository_url: String,
    pub base_target_directory: PathBuf,
    pub enqueued_at: Timestamp,
}

impl AnalysisTask {
    pub fn new(repository_url: impl Into<String>, base_target_directory: impl Into<PathBuf>) -> Self {
        Self {
            task_id: TaskId::new(),
            repository_url: repository_url.into(),
            base_target_directory: base_target_directory.into(),
            enqueued_at: Timestamp::now(),
        }
    }
}

/// Work performed by a worker for each dequeued task
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: AnalysisTask) -> Result<PipelineReport, PipelineError>;
}

/// Failure to enqueue a task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("task queue is closed")]
    Closed,
}

// ============================================================================
// Statistics
// ============================================================================

/// Live counters shared by the queue handles and the workers
#[derive(Debug, Default)]
pub struct PoolStats {
    pending: AtomicUsize,
    in_flight: AtomicUsize,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`PoolStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub queue_depth: usize,
    pub in_flight: usize,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl PoolStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queue_depth: self.pending.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    fn task_started(&self) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    fn task_finished(&self, success: bool) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        // Last, so a reader seeing `processed` also sees the outcome.
        self.processed.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// TaskQueue
// ============================================================================

/// Producer handle of the task queue
///
/// Cloneable; the workers stop once every handle is dropped and the queue
/// has been drained.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<AnalysisTask>,
    stats: Arc<PoolStats>,
}

impl TaskQueue {
    /// Append a task. Never blocks.
    pub fn enqueue(&self, task: AnalysisTask) -> Result<TaskId, QueueError> {
        let task_id = task.task_id;
        self.stats.pending.fetch_add(1, Ordering::Relaxed);

        if self.sender.send(task).is_err() {
            self.stats.pending.fetch_sub(1, Ordering::Relaxed);
            return Err(QueueError::Closed);
        }

        debug!(task_id = %task_id, "Task enqueued");
        Ok(task_id)
    }

    /// Number of tasks waiting for a worker
    pub fn depth(&self) -> usize {
        self.stats.pending.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ============================================================================
// WorkerPool
// ============================================================================

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<AnalysisTask>>>;

/// Fixed set of background workers draining a [`TaskQueue`]
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Create the queue and start `config.count` workers on the current
    /// runtime.
    pub fn start(config: &WorkerConfig, processor: Arc<dyn TaskProcessor>) -> (TaskQueue, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(PoolStats::default());
        let count = config.count.max(1);

        let workers = (0..count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    receiver.clone(),
                    processor.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        info!(workers = count, "Worker pool started");

        let queue = TaskQueue {
            sender,
            stats: stats.clone(),
        };
        (queue, Self { workers, stats })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Wait for the workers to drain the queue and exit.
    ///
    /// Workers exit once every [`TaskQueue`] handle has been dropped and no
    /// task is pending. Returns `false` when `timeout` expires first; the
    /// remaining workers and their in-flight tasks are then aborted, which
    /// closes the queue.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        let workers = &mut self.workers;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(worker) = workers.last_mut() {
                if let Err(e) = worker.await {
                    warn!(error = %e, "Worker terminated abnormally");
                }
                workers.pop();
            }
        })
        .await
        .is_ok();

        if drained {
            info!("Worker pool drained");
        } else {
            let snapshot = self.stats.snapshot();
            warn!(
                pending = snapshot.queue_depth,
                in_flight = snapshot.in_flight,
                "Worker pool shutdown timed out; aborting workers"
            );
            for worker in &self.workers {
                worker.abort();
            }
            for worker in self.workers.drain(..) {
                let _ = worker.await;
            }
        }
        drained
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: SharedReceiver,
    processor: Arc<dyn TaskProcessor>,
    stats: Arc<PoolStats>,
) {
    debug!(worker_id, "Worker started");

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        stats.task_started();
        let task_id = task.task_id;
        let repository_url = task.repository_url.clone();
        let queued_ms = Timestamp::now().duration_since(task.enqueued_at).as_millis() as u64;

        let span = info_span!(
            "analysis_task",
            worker_id,
            task_id = %task_id,
            repository = %repository_url
        );

        // Run in a separate task so a panic inside the processor is contained.
        let processor = processor.clone();
        let mut running = AbortOnDrop(tokio::spawn(
            async move { processor.process(task).await }.instrument(span),
        ));
        let outcome = (&mut running.0)
            .await
            .unwrap_or_else(|join_error| {
                Err(PipelineError::Unexpected {
                    message: join_error.to_string(),
                })
            });

        match outcome {
            Ok(report) => {
                stats.task_finished(true);
                info!(
                    worker_id,
                    task_id = %task_id,
                    repository = %repository_url,
                    group_id = %report.group_id,
                    application_id = report.application_id,
                    queued_ms,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Task completed"
                );
            }
            Err(e) => {
                stats.task_finished(false);
                error!(
                    worker_id,
                    task_id = %task_id,
                    repository = %repository_url,
                    group_id = e.group_id().map(|g| g.as_str()).unwrap_or("-"),
                    stage = e.stage(),
                    error = %e,
                    "Task failed"
                );
            }
        }
    }

    debug!(worker_id, "Worker stopped");
}

/// Aborts the task when dropped, so an aborted worker takes its in-flight
/// task down with it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

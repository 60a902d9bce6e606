/// In-process task queue for fanout
///
/// Jobs go through a bounded mpsc channel to a pool of worker tasks. A
/// publish schedules one plan job; the worker that runs it enumerates the
/// followers and enqueues one delivery job per batch. Delivery is
/// at-least-once: a failed job is re-enqueued after an exponential backoff
/// until `max_attempts` is reached, then counted as failed. Batches are
/// independent, so one failing batch never holds up the others.
///
/// `DispatchMode::Eager` runs the plan and every batch inline inside
/// `schedule`, retries included. Tests and single-shot tools use it to
/// observe fanout results without waiting on workers.
use super::batch::{BatchWriter, FanoutBatch};
use super::plan::{FanoutPlan, Planner};
use crate::error::{AppError, Result};
use crate::metrics::feed::{record_fanout_batch, record_fanout_plan, FANOUT_BATCHES_TOTAL};
use crate::models::FeedItem;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Background,
    Eager,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub mode: DispatchMode,
    pub workers: usize,
    pub capacity: usize,
    /// Total runs per job, first one included
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutJob {
    Plan(FanoutPlan),
    Deliver(FanoutBatch),
}

impl FanoutJob {
    fn item(&self) -> &FeedItem {
        match self {
            FanoutJob::Plan(plan) => &plan.item,
            FanoutJob::Deliver(batch) => &batch.item,
        }
    }

    fn attempt(&self) -> u32 {
        match self {
            FanoutJob::Plan(plan) => plan.attempt,
            FanoutJob::Deliver(batch) => batch.attempt,
        }
    }

    fn retry(&self) -> FanoutJob {
        match self {
            FanoutJob::Plan(plan) => FanoutJob::Plan(plan.retry()),
            FanoutJob::Deliver(batch) => FanoutJob::Deliver(batch.retry()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FanoutJob::Plan(_) => "plan",
            FanoutJob::Deliver(_) => "batch",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutStats {
    pub plans_scheduled: u64,
    pub plans_completed: u64,
    pub plans_failed: u64,
    pub scheduled: u64,
    pub delivered: u64,
    pub retried: u64,
    /// Batches given up on after `max_attempts`
    pub failed: u64,
    pub entries_written: u64,
    /// Plans and batches not yet completed or failed
    pub pending: u64,
}

#[derive(Default)]
struct Counters {
    plans_scheduled: AtomicU64,
    plans_completed: AtomicU64,
    plans_failed: AtomicU64,
    scheduled: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    entries_written: AtomicU64,
}

struct Shared {
    writer: BatchWriter,
    planner: Planner,
    settings: QueueSettings,
    counters: Counters,
}

enum Outcome {
    /// Follow-up batches, empty for a delivered batch
    Done(Vec<FanoutBatch>),
    Retry(FanoutJob, Duration),
    Failed,
}

impl Shared {
    async fn run(&self, job: &FanoutJob) -> Outcome {
        let result = match job {
            FanoutJob::Plan(plan) => self.planner.plan(plan).await.map(|batches| {
                // counted before the plan completes, so pending never dips early
                self.counters
                    .scheduled
                    .fetch_add(batches.len() as u64, Ordering::Relaxed);
                FANOUT_BATCHES_TOTAL
                    .with_label_values(&["scheduled"])
                    .inc_by(batches.len() as u64);
                self.counters.plans_completed.fetch_add(1, Ordering::Relaxed);
                record_fanout_plan("completed");
                batches
            }),
            FanoutJob::Deliver(batch) => self.writer.write(batch).await.map(|written| {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .entries_written
                    .fetch_add(written as u64, Ordering::Relaxed);
                record_fanout_batch("delivered");
                Vec::new()
            }),
        };

        match result {
            Ok(batches) => Outcome::Done(batches),
            Err(e) if job.attempt() + 1 < self.settings.max_attempts => {
                let delay = backoff(self.settings.retry_backoff, job.attempt());
                match job {
                    FanoutJob::Plan(_) => record_fanout_plan("retried"),
                    FanoutJob::Deliver(_) => {
                        self.counters.retried.fetch_add(1, Ordering::Relaxed);
                        record_fanout_batch("retried");
                    }
                }
                warn!(
                    job = job.kind(),
                    item_id = job.item().id,
                    attempt = job.attempt() + 1,
                    max_attempts = self.settings.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Fanout job failed, retrying"
                );
                Outcome::Retry(job.retry(), delay)
            }
            Err(e) => {
                self.fail(job, &e.to_string());
                Outcome::Failed
            }
        }
    }

    fn fail(&self, job: &FanoutJob, reason: &str) {
        let recipients = match job {
            FanoutJob::Plan(_) => {
                self.counters.plans_failed.fetch_add(1, Ordering::Relaxed);
                record_fanout_plan("failed");
                None
            }
            FanoutJob::Deliver(batch) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                record_fanout_batch("failed");
                Some(batch.recipient_ids.len())
            }
        };
        error!(
            job = job.kind(),
            item_id = job.item().id,
            recipients,
            attempts = job.attempt() + 1,
            error = %reason,
            "Fanout job undelivered"
        );
    }

    fn fail_all(&self, jobs: impl IntoIterator<Item = FanoutJob>, reason: &str) {
        for job in jobs {
            self.fail(&job, reason);
        }
    }
}

#[derive(Clone)]
pub struct FanoutQueue {
    shared: Arc<Shared>,
    sender: Option<mpsc::Sender<FanoutJob>>,
}

impl FanoutQueue {
    /// Starts the queue. In background mode this spawns the workers, so it
    /// must run inside a Tokio runtime.
    pub fn start(writer: BatchWriter, planner: Planner, settings: QueueSettings) -> Self {
        let shared = Arc::new(Shared {
            writer,
            planner,
            settings: settings.clone(),
            counters: Counters::default(),
        });

        if settings.mode == DispatchMode::Eager {
            return Self {
                shared,
                sender: None,
            };
        }

        let (sender, receiver) = mpsc::channel(settings.capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        for worker_id in 0..settings.workers.max(1) {
            tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&shared),
                Arc::clone(&receiver),
                sender.downgrade(),
            ));
        }
        info!(
            workers = settings.workers,
            capacity = settings.capacity,
            "Fanout queue started"
        );

        Self {
            shared,
            sender: Some(sender),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.shared.settings.mode
    }

    /// Schedules follower fanout for `item`. In background mode this never
    /// waits on the graph or on queue capacity.
    pub async fn schedule(&self, item: &FeedItem) -> Result<()> {
        self.shared
            .counters
            .plans_scheduled
            .fetch_add(1, Ordering::Relaxed);
        record_fanout_plan("scheduled");
        let job = FanoutJob::Plan(FanoutPlan::new(item.clone()));

        let Some(sender) = &self.sender else {
            self.run_inline(job).await;
            return Ok(());
        };

        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                let sender = sender.clone();
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    if let Err(e) = sender.send(job).await {
                        shared.fail(&e.0, "queue closed");
                    }
                });
                Ok(())
            }
            Err(TrySendError::Closed(job)) => {
                self.shared.fail(&job, "queue closed");
                Err(AppError::Queue("fanout queue is closed".to_string()))
            }
        }
    }

    async fn run_inline(&self, job: FanoutJob) {
        let mut jobs = VecDeque::from([job]);
        while let Some(job) = jobs.pop_front() {
            match self.shared.run(&job).await {
                Outcome::Done(batches) => jobs.extend(batches.into_iter().map(FanoutJob::Deliver)),
                Outcome::Retry(next, delay) => {
                    tokio::time::sleep(delay).await;
                    jobs.push_front(next);
                }
                Outcome::Failed => {}
            }
        }
    }

    pub fn stats(&self) -> FanoutStats {
        let counters = &self.shared.counters;
        let plans_scheduled = counters.plans_scheduled.load(Ordering::Relaxed);
        let plans_completed = counters.plans_completed.load(Ordering::Relaxed);
        let plans_failed = counters.plans_failed.load(Ordering::Relaxed);
        let delivered = counters.delivered.load(Ordering::Relaxed);
        let failed = counters.failed.load(Ordering::Relaxed);
        let scheduled = counters.scheduled.load(Ordering::Relaxed);

        let pending_plans = plans_scheduled.saturating_sub(plans_completed + plans_failed);
        let pending_batches = scheduled.saturating_sub(delivered + failed);

        FanoutStats {
            plans_scheduled,
            plans_completed,
            plans_failed,
            scheduled,
            delivered,
            retried: counters.retried.load(Ordering::Relaxed),
            failed,
            entries_written: counters.entries_written.load(Ordering::Relaxed),
            pending: pending_plans + pending_batches,
        }
    }

    /// Waits until every scheduled plan and batch is done or failed.
    /// Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let idle = async {
            while self.stats().pending > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }
}

async fn run_worker(
    worker_id: usize,
    shared: Arc<Shared>,
    receiver: Arc<Mutex<mpsc::Receiver<FanoutJob>>>,
    requeue: mpsc::WeakSender<FanoutJob>,
) {
    info!(worker_id, "Fanout worker started");

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else { break };

        let (follow_up, delay) = match shared.run(&job).await {
            Outcome::Done(batches) if batches.is_empty() => continue,
            Outcome::Done(batches) => (
                batches.into_iter().map(FanoutJob::Deliver).collect::<Vec<_>>(),
                Duration::ZERO,
            ),
            Outcome::Retry(retry, delay) => (vec![retry], delay),
            Outcome::Failed => continue,
        };

        let Some(sender) = requeue.upgrade() else {
            shared.fail_all(follow_up, "queue closed");
            continue;
        };
        // sent from a separate task: workers must not wait on their own channel
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut jobs = follow_up.into_iter();
            while let Some(job) = jobs.next() {
                if let Err(e) = sender.send(job).await {
                    shared.fail(&e.0, "queue closed");
                    shared.fail_all(jobs, "queue closed");
                    return;
                }
            }
        });
    }

    info!(worker_id, "Fanout worker stopped (channel closed)");
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16)).min(MAX_BACKOFF)
}

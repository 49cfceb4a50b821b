//! Background observation of submitted jobs.
//!
//! One task owns the work queue and every [`JobWatch`] in it. Each pass visits the queued
//! jobs in FIFO order; a tick sentinel marks the end of a pass and paces the next one.
//! Jobs re-enter the queue until nothing is left to observe, at which point they are
//! dropped together with their admission slot.

mod job;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};
use trainhub_core::{AdmissionGate, AdmissionSlot, ArtifactStore, ComputeBackend, ReportingSink, TrainingError};

use job::JobWatch;
pub use job::WatchRegistration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Minimum wall time between the starts of two passes.
    pub interval: Duration,
    /// Jobs still running after this many seconds are terminated.
    pub timeout_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout_secs: 86_400,
        }
    }
}

enum QueueItem {
    Tick,
    Job(Box<Tracked>),
}

struct Tracked {
    watch: JobWatch,
    // Held for as long as the job is tracked.
    _slot: AdmissionSlot,
}

pub struct WatchEngine {
    config: WatchConfig,
    compute: Arc<dyn ComputeBackend>,
    artifacts: Arc<dyn ArtifactStore>,
    sink: Arc<dyn ReportingSink>,
    tx: mpsc::Sender<QueueItem>,
    rx: mpsc::Receiver<QueueItem>,
}

/// Cloneable entry point for adding jobs to a [`WatchEngine`].
#[derive(Clone)]
pub struct WatchHandle {
    tx: mpsc::Sender<QueueItem>,
    gate: Arc<AdmissionGate>,
}

/// A started engine. Dropping it also ends the loop, without waiting for it.
pub struct RunningWatch {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatchEngine {
    /// Builds the engine and the handle used to register jobs.
    ///
    /// The queue holds one entry per admission slot plus the tick, so re-enqueueing from
    /// the engine task never waits on itself.
    pub fn new(
        config: WatchConfig,
        gate: &Arc<AdmissionGate>,
        compute: Arc<dyn ComputeBackend>,
        artifacts: Arc<dyn ArtifactStore>,
        sink: Arc<dyn ReportingSink>,
    ) -> (Self, WatchHandle) {
        let (tx, rx) = mpsc::channel(gate.capacity() + 1);
        let handle = WatchHandle {
            tx: tx.clone(),
            gate: Arc::clone(gate),
        };
        let engine = Self {
            config,
            compute,
            artifacts,
            sink,
            tx,
            rx,
        };
        (engine, handle)
    }

    pub fn start(self) -> RunningWatch {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        RunningWatch { stop, task }
    }

    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            timeout_secs = self.config.timeout_secs,
            "watch engine started"
        );
        self.enqueue(QueueItem::Tick).await;
        let mut pass_started = Instant::now();

        loop {
            let item = tokio::select! {
                biased;
                _ = stop.changed() => break,
                item = self.rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            match item {
                QueueItem::Tick => {
                    debug!("finish a loop");
                    tokio::select! {
                        biased;
                        _ = stop.changed() => break,
                        _ = sleep_until(pass_started + self.config.interval) => {}
                    }
                    self.enqueue(QueueItem::Tick).await;
                    pass_started = Instant::now();
                }
                QueueItem::Job(mut tracked) => {
                    if !self.visit(&mut tracked.watch).await {
                        self.enqueue(QueueItem::Job(tracked)).await;
                    }
                }
            }
        }

        info!("watch engine stopped");
    }

    /// Checks one job and reports if needed. Returns true when the job is finished with.
    async fn visit(&self, watch: &mut JobWatch) -> bool {
        debug!(training_id = %watch.index.id, job_id = %watch.job.job_id, "check training");

        let changed = watch
            .check(&*self.compute, &*self.artifacts, self.config.timeout_secs)
            .await;
        let terminal = watch.is_terminal();
        if !(changed || terminal || watch.report_pending) {
            return false;
        }

        match self.sink.set_training_info(&watch.index, &watch.result).await {
            Ok(()) => {
                watch.report_pending = false;
                if terminal {
                    info!(
                        training_id = %watch.index.id,
                        status = ?watch.result.status,
                        "training finished"
                    );
                }
                terminal
            }
            Err(e) => {
                error!(training_id = %watch.index.id, error = %e, "report training result failed");
                watch.report_pending = true;
                false
            }
        }
    }

    async fn enqueue(&self, item: QueueItem) {
        // The engine holds the receiver, so the channel cannot be closed here.
        if self.tx.send(item).await.is_err() {
            error!("watch queue closed");
        }
    }
}

impl WatchHandle {
    /// Starts tracking a submitted job. The slot is released once tracking ends.
    ///
    /// Waits while the queue is full.
    pub async fn register(
        &self,
        reg: WatchRegistration,
        slot: AdmissionSlot,
    ) -> Result<(), TrainingError> {
        debug_assert!(slot.belongs_to(&self.gate), "slot from a different gate");
        let tracked = Tracked {
            watch: JobWatch::new(reg),
            _slot: slot,
        };
        self.tx
            .send(QueueItem::Job(Box::new(tracked)))
            .await
            .map_err(|_| anyhow!("watch engine is not running").into())
    }
}

impl RunningWatch {
    /// Signals the loop to exit and waits for it.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "watch engine task failed");
        }
    }
}

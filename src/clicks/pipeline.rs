//! Batched click recording.
//!
//! Redirect handlers call [`ClickPipeline::submit`], which never blocks and
//! never fails. A single flusher task wakes every `period`, drains the queue
//! for up to 95% of the period and hands the batch to a detached flush task
//! so the next drain starts immediately.
//!
//! Delivery is best-effort. When the shutdown signal fires the pipeline
//! returns to `Stopped`: events still queued, events drained by an
//! unfinished tick, and flushes still in flight may all be lost. Only
//! batches whose flush completed before the process exits are persisted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::models::ClickEvent;
use crate::storage::AnalyticsStore;

#[derive(Debug, Clone)]
pub struct ClickPipelineConfig {
    /// Maximum number of queued, undrained events
    pub capacity: usize,
    /// Time between drain cycles
    pub period: Duration,
}

impl Default for ClickPipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            period: Duration::from_secs(10),
        }
    }
}

enum PipelineState {
    Stopped,
    Running { sender: mpsc::Sender<ClickEvent> },
}

pub struct ClickPipeline {
    store: Arc<dyn AnalyticsStore>,
    config: ClickPipelineConfig,
    state: Mutex<PipelineState>,
    dropped: AtomicU64,
}

impl ClickPipeline {
    pub fn new(store: Arc<dyn AnalyticsStore>, config: ClickPipelineConfig) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(PipelineState::Stopped),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), PipelineState::Running { .. })
    }

    /// Events rejected because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue a click for the next batch.
    ///
    /// Dropped silently while stopped; dropped with a warning when the
    /// buffer is full.
    pub fn submit(&self, event: ClickEvent) {
        let state = self.state.lock();
        let PipelineState::Running { sender } = &*state else {
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let count = self.dropped.fetch_add(1, Ordering::Relaxed);
                // Log the first drop and every 100th after that
                if count % 100 == 0 {
                    warn!(dropped_count = count + 1, "click buffer full, dropping event");
                }
            }
            // Flusher already exited; same as stopped
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Allocate the buffer and spawn the flusher.
    ///
    /// The flusher runs until `shutdown` turns `true` (or its sender is
    /// dropped); await the returned handle for a controlled stop.
    pub fn start(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        if self.config.period.is_zero() {
            bail!("click batching period must be non-zero");
        }

        let mut state = self.state.lock();
        if matches!(*state, PipelineState::Running { .. }) {
            bail!("click pipeline is already running");
        }

        let (sender, receiver) = mpsc::channel(self.config.capacity.max(1));
        *state = PipelineState::Running { sender };
        drop(state);

        info!(
            capacity = self.config.capacity,
            period_ms = self.config.period.as_millis() as u64,
            "click pipeline started"
        );

        let pipeline = Arc::clone(self);
        Ok(tokio::spawn(async move {
            pipeline.run(receiver, &mut shutdown).await;
            pipeline.stop();
        }))
    }

    fn stop(&self) {
        *self.state.lock() = PipelineState::Stopped;
        info!("click pipeline stopped");
    }

    async fn run(&self, mut receiver: mpsc::Receiver<ClickEvent>, shutdown: &mut watch::Receiver<bool>) {
        let period = self.config.period;
        let drain_window = period.mul_f64(0.95);

        // First tick fires one full period after start
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut batch = Vec::with_capacity(self.config.capacity);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_shutdown(shutdown) => break,
            }

            batch.clear();
            let deadline = Instant::now() + drain_window;
            if !drain_until(&mut receiver, &mut batch, deadline, shutdown).await {
                debug!(pending = batch.len(), "shutdown during drain, discarding batch");
                break;
            }

            if batch.is_empty() {
                continue;
            }

            let to_flush = batch.clone();
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                flush_batch(store.as_ref(), to_flush).await;
            });
        }
    }
}

/// Pull events until `deadline`. Returns `false` if shutdown was requested.
async fn drain_until(
    receiver: &mut mpsc::Receiver<ClickEvent>,
    batch: &mut Vec<ClickEvent>,
    deadline: Instant,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            received = time::timeout_at(deadline, receiver.recv()) => match received {
                Ok(Some(event)) => batch.push(event),
                // Deadline hit, or every sender is gone
                Ok(None) | Err(_) => return true,
            },
            _ = wait_for_shutdown(shutdown) => return false,
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender counts as shutdown
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn flush_batch(store: &dyn AnalyticsStore, batch: Vec<ClickEvent>) {
    let submitted = batch.len() as u64;
    match store.insert_batch(&batch).await {
        Ok(inserted) if inserted == submitted => {
            debug!(inserted, "flushed click batch");
        }
        Ok(inserted) => {
            error!(inserted, submitted, "click batch partially inserted");
        }
        Err(err) => {
            error!(submitted, error = %err, "failed to flush click batch");
        }
    }
}

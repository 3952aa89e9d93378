//! The periodic job scheduler.
//!
//! Each background job runs on its own fixed interval in its own task. A
//! tick body is awaited inline before the next tick is taken, so a job
//! never overlaps itself — slow ticks delay the schedule instead of
//! stacking up and double-processing a batch.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Owns the background job tasks and their shutdown signal.
pub struct Scheduler {
    shutdown: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawn a periodic job. `tick` is called once per interval; its future
    /// is awaited to completion before the next tick fires.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, period: Duration, tick: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut shutdown = self.shutdown.subscribe();
        info!(job = name, period_secs = period.as_secs(), "job scheduled");
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately; consume
            // it so jobs start one period after boot.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!(job = name, "job stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        tick().await;
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    /// Number of scheduled jobs.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal all jobs to stop and wait for them to finish their current
    /// tick.
    pub async fn shutdown(self) {
        drop(self.shutdown.send(()));
        for handle in self.handles {
            drop(handle.await);
        }
        info!("scheduler shut down");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

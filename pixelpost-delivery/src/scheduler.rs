//! Decides when the dispatcher runs.
//!
//! Three things trigger a pass:
//! - a run request from the enqueuer (shortly after new work arrives)
//! - a run request from the dispatcher itself while a backlog remains
//! - the safety-net tick, which covers restarts and lost requests
//!
//! Requests are debounced: only the earliest pending deadline is kept, so a
//! burst of enqueues results in a single pass. Passes run inline on the
//! scheduler task and can never overlap.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use pixelpost_common::{Signal, internal};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, mpsc},
    time::{Instant, MissedTickBehavior},
};

use crate::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay between an enqueue and the pass that picks it up.
    ///
    /// Default: 5
    #[serde(default = "defaults::enqueue_delay_secs")]
    pub enqueue_delay_secs: u64,

    /// Delay before another pass while rows remain queued.
    ///
    /// Default: 30
    #[serde(default = "defaults::backlog_delay_secs")]
    pub backlog_delay_secs: u64,

    /// Period of the safety-net pass.
    ///
    /// Default: 3600
    #[serde(default = "defaults::safety_interval_secs")]
    pub safety_interval_secs: u64,

    /// Delay before the first safety-net pass after startup.
    ///
    /// Default: 300
    #[serde(default = "defaults::initial_delay_secs")]
    pub initial_delay_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enqueue_delay_secs: defaults::enqueue_delay_secs(),
            backlog_delay_secs: defaults::backlog_delay_secs(),
            safety_interval_secs: defaults::safety_interval_secs(),
            initial_delay_secs: defaults::initial_delay_secs(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn enqueue_delay(&self) -> Duration {
        Duration::from_secs(self.enqueue_delay_secs)
    }

    #[must_use]
    pub const fn backlog_delay(&self) -> Duration {
        Duration::from_secs(self.backlog_delay_secs)
    }
}

mod defaults {
    pub const fn enqueue_delay_secs() -> u64 {
        5
    }

    pub const fn backlog_delay_secs() -> u64 {
        30
    }

    pub const fn safety_interval_secs() -> u64 {
        3600
    }

    pub const fn initial_delay_secs() -> u64 {
        300
    }
}

/// Cheap, clonable handle used to ask for a dispatcher pass.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Duration>,
    runs: Arc<AtomicU64>,
}

/// Receiving half of [`SchedulerHandle::channel`], consumed by [`Scheduler::new`].
#[derive(Debug)]
pub struct RunRequests {
    rx: mpsc::UnboundedReceiver<Duration>,
    runs: Arc<AtomicU64>,
}

impl SchedulerHandle {
    #[must_use]
    pub fn channel() -> (Self, RunRequests) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runs = Arc::new(AtomicU64::new(0));

        (
            Self {
                tx,
                runs: Arc::clone(&runs),
            },
            RunRequests { rx, runs },
        )
    }

    /// Ask for a pass no later than `delay` from now. Never blocks.
    pub fn request_run(&self, delay: Duration) {
        if self.tx.send(delay).is_err() {
            tracing::debug!(?delay, "Scheduler has stopped, run request dropped");
        }
    }

    /// Number of passes the scheduler has completed.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
    requests: RunRequests,
    config: SchedulerConfig,
    batch_limit: usize,
}

impl Scheduler {
    #[must_use]
    pub const fn new(
        dispatcher: Arc<Dispatcher>,
        requests: RunRequests,
        config: SchedulerConfig,
        batch_limit: usize,
    ) -> Self {
        Self {
            dispatcher,
            requests,
            config,
            batch_limit,
        }
    }

    async fn run(&self, trigger: &'static str) {
        match self.dispatcher.process(self.batch_limit).await {
            Ok(0) => tracing::debug!(trigger, "Nothing ready to dispatch"),
            Ok(count) => internal!(level = DEBUG, trigger, count, "Dispatch pass complete"),
            Err(e) => tracing::error!(trigger, error = %e, "Dispatch pass failed"),
        }
        self.requests.runs.fetch_add(1, Ordering::AcqRel);
    }

    /// Run until a shutdown signal arrives.
    pub async fn serve(mut self, mut shutdown: broadcast::Receiver<Signal>) -> crate::Result<()> {
        internal!(
            "Scheduler starting: safety pass every {}s, first in {}s",
            self.config.safety_interval_secs,
            self.config.initial_delay_secs
        );

        let mut safety = tokio::time::interval_at(
            Instant::now() + Duration::from_secs(self.config.initial_delay_secs),
            Duration::from_secs(self.config.safety_interval_secs.max(1)),
        );
        safety.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut pending: Option<Instant> = None;

        loop {
            tokio::select! {
                Some(delay) = self.requests.rx.recv() => {
                    let at = Instant::now() + delay;
                    pending = Some(pending.map_or(at, |current| current.min(at)));
                }
                () = wait_for(pending) => {
                    pending = None;
                    self.run("requested").await;
                }
                _ = safety.tick() => {
                    self.run("safety").await;
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Scheduler received shutdown signal");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Scheduler shutdown channel error");
                        }
                    }
                    break;
                }
            }
        }

        internal!("Scheduler stopped");
        Ok(())
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

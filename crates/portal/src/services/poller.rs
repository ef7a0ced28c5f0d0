//! Bounded, cancellable payment status polling.
//!
//! A [`StatusPoller`] asks a check function for the current status with
//! exponential backoff until the status is terminal, the attempt budget runs
//! out, or it is stopped. The next check is only scheduled after the previous
//! one returned, so a poller never has two requests in flight.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::Instrument;

use credits_core::PaymentStatus;

/// Polling schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollerConfig {
    /// Delay before the first check.
    pub initial_interval: Duration,
    /// Growth factor between consecutive delays (values below 1 are treated as 1).
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_interval: Duration,
    /// Checks before giving up.
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(4),
            multiplier: 1.5,
            max_interval: Duration::from_secs(30),
            max_attempts: 45,
        }
    }
}

impl PollerConfig {
    /// Delay before check number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1.0)
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let secs = self.initial_interval.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A terminal status was observed.
    Settled(PaymentStatus),
    /// The attempt budget ran out before a terminal status.
    Exhausted {
        attempts: u32,
        last_status: Option<PaymentStatus>,
    },
    /// [`PollHandle::stop`] was called.
    Cancelled,
}

/// Runs status checks on a backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct StatusPoller {
    config: PollerConfig,
}

impl StatusPoller {
    #[must_use]
    pub const fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Spawn the polling loop on the runtime and return its handle.
    ///
    /// The task inherits the caller's tracing span.
    pub fn start<F, Fut, E>(self, check: F) -> PollHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<PaymentStatus, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let stop = Arc::new(Notify::new());
        let signal = Arc::clone(&stop);
        let config = self.config;

        let task = tokio::spawn(
            async move {
                let outcome = poll(config, check, &signal).await;
                tracing::info!(?outcome, "status polling finished");
                outcome
            }
            .in_current_span(),
        );

        PollHandle { stop, task }
    }

    /// Poll on the current task until done. Never cancelled.
    pub async fn run<F, Fut, E>(self, check: F) -> PollOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PaymentStatus, E>>,
        E: Display,
    {
        poll(self.config, check, &Notify::new()).await
    }
}

async fn poll<F, Fut, E>(config: PollerConfig, mut check: F, stop: &Notify) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PaymentStatus, E>>,
    E: Display,
{
    let mut last_status = None;

    for attempt in 0..config.max_attempts {
        tokio::select! {
            biased;
            () = stop.notified() => return PollOutcome::Cancelled,
            () = tokio::time::sleep(config.delay_for(attempt)) => {}
        }

        let result = tokio::select! {
            biased;
            () = stop.notified() => return PollOutcome::Cancelled,
            result = check() => result,
        };

        match result {
            Ok(status) if status.is_terminal() => return PollOutcome::Settled(status),
            Ok(status) => {
                tracing::debug!(attempt = attempt + 1, status = %status, "payment still in flight");
                last_status = Some(status);
            }
            Err(e) => {
                tracing::warn!(attempt = attempt + 1, error = %e, "status check failed");
            }
        }
    }

    PollOutcome::Exhausted {
        attempts: config.max_attempts,
        last_status,
    }
}

/// Handle to a running poller.
#[derive(Debug)]
pub struct PollHandle {
    stop: Arc<Notify>,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    /// Ask the poller to stop. Takes effect at the next await point.
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    /// Whether the polling task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the poller to end.
    pub async fn join(self) -> PollOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "status poller task failed");
                PollOutcome::Cancelled
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks background pollers by payment id.
#[derive(Clone, Default)]
pub struct PollerRegistry {
    handles: Arc<Mutex<HashMap<String, PollHandle>>>,
}

impl PollerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a poller for `key` unless one is already running.
    ///
    /// Returns `false` (and does not call `start`) when a live poller exists.
    pub fn start_unique(&self, key: &str, start: impl FnOnce() -> PollHandle) -> bool {
        let mut handles = lock(&self.handles);
        handles.retain(|_, handle| !handle.is_finished());
        if handles.contains_key(key) {
            return false;
        }
        handles.insert(key.to_string(), start());
        true
    }

    /// Number of pollers still running.
    #[must_use]
    pub fn active(&self) -> usize {
        lock(&self.handles)
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Stop every poller and wait for them to end.
    pub async fn shutdown(&self) {
        let handles: Vec<PollHandle> = lock(&self.handles).drain().map(|(_, h)| h).collect();
        if handles.is_empty() {
            return;
        }
        tracing::info!(count = handles.len(), "stopping status pollers");
        for handle in &handles {
            handle.stop();
        }
        for handle in handles {
            handle.join().await;
        }
    }
}

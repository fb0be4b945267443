//! Work queue that drives reconciles.
//!
//! # Architecture
//!
//! - [`Controller::enqueue`] adds an owner key; a key already waiting is not
//!   added twice.
//! - Workers pop keys and run [`Reconciler::reconcile`]. A key is held by at
//!   most one worker; enqueueing it meanwhile marks it dirty and it runs again
//!   once the current pass finishes.
//! - Failed passes are retried with exponential backoff. After
//!   `max_retries` consecutive failures the key is dropped until enqueued again.
//!
//! # Example
//!
//! ```ignore
//! let controller = Arc::new(Controller::new(reconciler, ControllerConfig::default()));
//! controller.enqueue(ObjectKey::new("tracing", "simplest"));
//!
//! let handle = tokio::spawn({
//!     let controller = controller.clone();
//!     async move { controller.run().await }
//! });
//!
//! controller.shutdown();
//! handle.await?;
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rolesync_core::ObjectKey;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reconcile::Reconciler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Number of keys reconciled concurrently.
    pub workers: usize,
    /// Delay before the first retry of a failed key.
    pub base_backoff: Duration,
    /// Upper bound on the retry delay.
    pub max_backoff: Duration,
    /// Consecutive failures after which a key is dropped. `0` retries forever.
    pub max_retries: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            max_retries: 0,
        }
    }
}

impl ControllerConfig {
    /// Short delays and a bounded retry count.
    pub fn for_testing() -> Self {
        Self {
            workers: 2,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            max_retries: 3,
        }
    }

    /// Delay before retrying a key that has failed `failures` times in a row.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub reconciles: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    failures: HashMap<ObjectKey, u32>,
    /// Retry timers still sleeping.
    backing_off: usize,
}

impl QueueState {
    fn push(&mut self, key: ObjectKey) -> bool {
        if self.processing.contains(&key) {
            self.dirty.insert(key);
            return false;
        }
        if self.queued.insert(key.clone()) {
            self.queue.push_back(key);
            return true;
        }
        false
    }

    fn pop(&mut self) -> Option<ObjectKey> {
        let key = self.queue.pop_front()?;
        self.queued.remove(&key);
        self.processing.insert(key.clone());
        Some(key)
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.processing.is_empty() && self.backing_off == 0
    }
}

pub struct Controller {
    reconciler: Arc<Reconciler>,
    config: ControllerConfig,
    state: Mutex<QueueState>,
    wake: Notify,
    shutdown: CancellationToken,
    reconciles: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    dropped: AtomicU64,
}

impl Controller {
    pub fn new(reconciler: Arc<Reconciler>, config: ControllerConfig) -> Self {
        Self {
            reconciler,
            config,
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            reconciles: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Requests a reconcile of `key`.
    pub fn enqueue(&self, key: ObjectKey) {
        let added = self.lock().push(key);
        if added {
            self.wake.notify_one();
        }
    }

    /// Requests a reconcile of `key` after `delay`.
    pub fn enqueue_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        self.schedule(key, delay, false);
    }

    /// Spawns a timer that enqueues `key`. A `retry` timer keeps the queue
    /// from counting as idle until it fires.
    fn schedule(self: &Arc<Self>, key: ObjectKey, delay: Duration, retry: bool) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = this.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }

            let (added, idle) = {
                let mut state = this.lock();
                if retry {
                    state.backing_off -= 1;
                }
                let added = !this.shutdown.is_cancelled() && state.push(key);
                (added, state.is_idle())
            };
            if added {
                this.wake.notify_one();
            }
            if idle {
                this.wake.notify_waiters();
            }
        });
    }

    /// Runs workers until [`Controller::shutdown`] is called.
    pub async fn run(self: &Arc<Self>) {
        info!(workers = self.config.workers, "Controller started");
        self.run_workers(false).await;
        info!("Controller stopped");
    }

    /// Runs workers until nothing is queued, in flight or waiting to be retried.
    pub async fn run_until_idle(self: &Arc<Self>) {
        self.run_workers(true).await;
    }

    async fn run_workers(self: &Arc<Self>, until_idle: bool) {
        let mut workers = JoinSet::new();
        for id in 0..self.config.workers.max(1) {
            let this = Arc::clone(self);
            workers.spawn(async move { this.worker(id, until_idle).await });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Controller worker panicked");
            }
        }
    }

    async fn worker(self: Arc<Self>, id: usize, until_idle: bool) {
        debug!(worker = id, "Worker started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            // Registered before inspecting the queue so a wakeup in between is kept
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = {
                let mut state = self.lock();
                match state.pop() {
                    Some(key) => Some(key),
                    None if until_idle && state.is_idle() => break,
                    None => None,
                }
            };

            match next {
                Some(key) => self.process(key).await,
                None => {
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => break,
                        _ = &mut notified => {}
                    }
                }
            }
        }
        debug!(worker = id, "Worker stopped");
    }

    async fn process(self: &Arc<Self>, key: ObjectKey) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
        let result = self.reconciler.reconcile(&key, &self.shutdown).await;

        let failed = match &result {
            Ok(outcome) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                debug!(owner = %key, changes = outcome.changes(), "Reconcile succeeded");
                false
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(owner = %key, retryable = e.is_retryable(), error = %e, "Reconcile failed");
                true
            }
        };

        let (rerun, retry, idle) = {
            let mut state = self.lock();
            state.processing.remove(&key);

            let retry = if failed {
                let count = state.failures.entry(key.clone()).or_insert(0);
                *count += 1;
                let count = *count;
                if self.config.max_retries > 0 && count >= self.config.max_retries {
                    state.failures.remove(&key);
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(owner = %key, failures = count, "Giving up on owner");
                    None
                } else {
                    Some(self.config.backoff(count))
                }
            } else {
                state.failures.remove(&key);
                None
            };

            let rerun = state.dirty.remove(&key) && state.push(key.clone());
            // A dirty key runs again right away; its retry timer would be redundant
            let retry = retry.filter(|_| !rerun);
            if retry.is_some() {
                state.backing_off += 1;
            }
            (rerun, retry, state.is_idle())
        };

        if rerun {
            self.wake.notify_one();
        }
        if let Some(delay) = retry {
            self.retries.fetch_add(1, Ordering::Relaxed);
            debug!(owner = %key, delay_ms = delay.as_millis() as u64, "Retry scheduled");
            self.schedule(key.clone(), delay, true);
        }
        if let Ok(outcome) = &result {
            if let Some(delay) = outcome.requeue_after {
                self.enqueue_after(key, delay);
            }
        }
        if idle {
            self.wake.notify_waiters();
        }
    }

    /// Stops workers and aborts in-flight reconciles.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.wake.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.lock().is_idle()
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            reconciles: self.reconciles.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

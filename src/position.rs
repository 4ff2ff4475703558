//! Position source: best-effort fixes from the platform's positioning capability.
//!
//! The capability itself is injected. This module adds a timeout, a short
//! staleness cache so rapid repeated requests don't hit the hardware again,
//! and owned watch subscriptions. It reports raw accuracy; deciding whether
//! a fix is good enough belongs to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::VerificationConfig;
use crate::model::Position;

/// Shortest polling period a watch will use.
const MIN_WATCH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("location permission denied")]
    Denied,

    #[error("timed out waiting for a position fix")]
    TimedOut,

    #[error("position request cancelled")]
    Cancelled,

    #[error("positioning unavailable: {0}")]
    Unavailable(String),
}

/// The platform's positioning capability.
#[async_trait]
pub trait PositioningCapability: Send + Sync {
    /// Asks the platform for one fix, giving up after `timeout`.
    async fn request_fix(&self, timeout: Duration) -> Result<Position, PositionError>;
}

/// Knobs for a single fix request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixOptions {
    pub timeout: Duration,

    /// Reuse a cached fix younger than this. Zero disables the cache.
    pub max_age: Duration,
}

impl From<&VerificationConfig> for FixOptions {
    fn from(config: &VerificationConfig) -> Self {
        Self {
            timeout: config.fix_timeout(),
            max_age: config.fix_max_age(),
        }
    }
}

impl Default for FixOptions {
    fn default() -> Self {
        Self::from(&VerificationConfig::default())
    }
}

pub struct PositionSource {
    capability: Arc<dyn PositioningCapability>,
    cached: Option<(Position, Instant)>,
}

impl PositionSource {
    pub fn new(capability: Arc<dyn PositioningCapability>) -> Self {
        Self {
            capability,
            cached: None,
        }
    }

    /// Returns a fix, from cache if fresh enough, else from the capability.
    ///
    /// The wait is bounded by `options.timeout` even if the capability
    /// ignores its own timeout argument.
    pub async fn current_fix(
        &mut self,
        options: FixOptions,
        mut cancel: CancelToken,
    ) -> Result<Position, PositionError> {
        if let Some((position, at)) = self.cached
            && at.elapsed() < options.max_age
        {
            debug!(age = ?at.elapsed(), "reusing cached fix");
            return Ok(position);
        }

        let request = self.capability.request_fix(options.timeout);
        let result = tokio::select! {
            result = tokio::time::timeout(options.timeout, request) => {
                result.unwrap_or(Err(PositionError::TimedOut))
            }
            () = cancel.cancelled() => Err(PositionError::Cancelled),
        };

        match &result {
            Ok(position) => {
                debug!(accuracy = position.accuracy_meters, "acquired fix");
                self.cached = Some((*position, Instant::now()));
            }
            Err(e) => warn!(error = %e, "position fix failed"),
        }
        result
    }

    /// Starts continuous updates, polling the capability every `interval`.
    ///
    /// Intervals shorter than 100ms are raised to 100ms. The subscription
    /// runs until the returned handle is cancelled or dropped, or until
    /// `cancel` fires.
    pub fn watch<F>(
        &self,
        interval: Duration,
        timeout: Duration,
        mut cancel: CancelToken,
        mut callback: F,
    ) -> WatchHandle
    where
        F: FnMut(Result<Position, PositionError>) + Send + 'static,
    {
        let capability = self.capability.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = interval.max(MIN_WATCH_INTERVAL);
        if period != interval {
            debug!(requested = ?interval, used = ?period, "watch interval raised");
        }

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let update = tokio::time::timeout(timeout, capability.request_fix(timeout))
                            .await
                            .unwrap_or(Err(PositionError::TimedOut));
                        callback(update);
                    }
                    _ = &mut stop_rx => {
                        debug!("position watch stopped by handle");
                        break;
                    }
                    () = cancel.cancelled() => {
                        debug!("position watch stopped by session teardown");
                        break;
                    }
                }
            }
        });

        WatchHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// An open position subscription. Call [`WatchHandle::cancel`] when done.
#[must_use = "dropping the handle stops the subscription"]
#[derive(Debug)]
pub struct WatchHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stops the subscription and waits for it to wind down.
    pub async fn cancel(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted positioning capability for tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    pub(crate) struct FakeCapability {
        script: Mutex<VecDeque<Result<Position, PositionError>>>,
        fallback: Mutex<Option<Position>>,
        hang: bool,
        calls: AtomicU32,
    }

    impl FakeCapability {
        /// Always answers with `position`.
        pub(crate) fn fixed(position: Position) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(Some(position)),
                hang: false,
                calls: AtomicU32::new(0),
            }
        }

        /// Answers from `script` in order, then with `Denied`.
        pub(crate) fn scripted(script: Vec<Result<Position, PositionError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: Mutex::new(None),
                hang: false,
                calls: AtomicU32::new(0),
            }
        }

        /// Never answers.
        pub(crate) fn hanging() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(None),
                hang: true,
                calls: AtomicU32::new(0),
            }
        }

        pub(crate) fn set_fixed(&self, position: Position) {
            *self.fallback.lock().unwrap() = Some(position);
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PositioningCapability for FakeCapability {
        async fn request_fix(&self, _timeout: Duration) -> Result<Position, PositionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                return next;
            }
            let fallback = *self.fallback.lock().unwrap();
            fallback.ok_or(PositionError::Denied)
        }
    }
}

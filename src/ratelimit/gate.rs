//! Sliding-window admission gate.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use super::window::TimeUnit;
use crate::error::{GateError, Result};

/// Deadline offset used when a window is too long to add to the clock.
/// A pruning caller still wakes sleepers through the broadcast.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Outcome of one evaluation of the gate under its lock.
enum Admission {
    /// A slot was recorded for the caller
    Granted,
    /// The gate is full until the given instant, unless capacity is freed earlier
    WaitUntil(Instant),
}

/// Enforces at most `limit` admissions in any trailing window of `window`.
///
/// The gate keeps the instants of recent admissions, oldest first. Every
/// evaluation prunes expired entries, then either records a new admission or
/// computes how long until the oldest one expires. Callers that find the gate
/// full suspend until that deadline or until another caller's prune frees
/// capacity, whichever comes first.
///
/// Admission order among suspended callers is not FIFO. All of them wake on
/// the same broadcast and race for the freed slots, so a caller that started
/// waiting earlier may be admitted after one that started later. The cap
/// itself always holds.
pub struct AdmissionGate {
    /// Maximum admissions per window
    limit: usize,
    /// Length of the sliding window
    window: Duration,
    /// Instants of active admissions, oldest first
    history: Mutex<VecDeque<Instant>>,
    /// Broadcast to suspended callers whenever a prune frees capacity
    capacity_freed: Notify,
}

impl AdmissionGate {
    /// Create a gate admitting at most `limit` callers per `window`.
    pub fn new(limit: usize, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(GateError::InvalidArgument(
                "request limit must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(GateError::InvalidArgument(
                "rate limit window must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            limit,
            window,
            history: Mutex::new(VecDeque::with_capacity(limit)),
            capacity_freed: Notify::new(),
        })
    }

    /// Create a gate admitting at most `limit` callers per one `unit`.
    pub fn per_unit(limit: usize, unit: TimeUnit) -> Result<Self> {
        Self::new(limit, unit.duration())
    }

    /// Wait until a slot is free and record it.
    ///
    /// Returns only once the admission is recorded. Dropping the future
    /// while it is suspended records nothing.
    pub async fn acquire(&self) {
        loop {
            let notified = self.capacity_freed.notified();
            tokio::pin!(notified);

            let deadline = match self.evaluate(notified.as_mut()) {
                Admission::Granted => return,
                Admission::WaitUntil(deadline) => deadline,
            };

            debug!(
                limit = self.limit,
                wait_ms = deadline
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64,
                "Admission gate full, waiting for capacity"
            );

            tokio::select! {
                _ = &mut notified => trace!("Woken by freed capacity"),
                _ = time::sleep_until(deadline) => trace!("Oldest admission expired"),
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up once `cancel` completes.
    ///
    /// Returns [`GateError::Cancelled`] when the signal wins. No slot is
    /// recorded in that case.
    pub async fn acquire_or_cancel<F>(&self, cancel: F) -> Result<()>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                debug!("Admission wait cancelled");
                Err(GateError::Cancelled)
            }
            _ = self.acquire() => Ok(()),
        }
    }

    /// Like [`acquire`](Self::acquire), but fails with
    /// [`GateError::AdmissionTimeout`] if no slot is granted within `max_wait`.
    pub async fn acquire_timeout(&self, max_wait: Duration) -> Result<()> {
        time::timeout(max_wait, self.acquire()).await.map_err(|_| {
            debug!(max_wait_ms = max_wait.as_millis() as u64, "Admission wait timed out");
            GateError::AdmissionTimeout(max_wait)
        })
    }

    /// Record a slot if one is free right now.
    ///
    /// Returns `true` if the caller was admitted, `false` if the gate is full.
    pub fn try_acquire(&self) -> bool {
        let mut history = self.history.lock();
        let now = Instant::now();
        self.prune(&mut history, now);

        if history.len() < self.limit {
            history.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of slots that could be granted right now.
    pub fn available(&self) -> usize {
        let mut history = self.history.lock();
        self.prune(&mut history, Instant::now());
        self.limit - history.len()
    }

    /// Get the duration until a slot frees up, or zero if one is free now.
    pub fn time_until_available(&self) -> Duration {
        let mut history = self.history.lock();
        let now = Instant::now();
        self.prune(&mut history, now);

        if history.len() < self.limit {
            return Duration::ZERO;
        }
        history
            .front()
            .map(|oldest| self.remaining_for(*oldest, now))
            .unwrap_or(Duration::ZERO)
    }

    /// Get the maximum admissions per window.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Get the window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// One pass of prune, check and append under the lock.
    ///
    /// When the gate is full, `notified` is enabled before the lock is
    /// released so a prune by another caller in between is not missed.
    fn evaluate(&self, notified: Pin<&mut Notified<'_>>) -> Admission {
        let mut history = self.history.lock();
        let now = Instant::now();
        self.prune(&mut history, now);

        trace!(
            active = history.len(),
            limit = self.limit,
            "Evaluating admission gate"
        );

        if history.len() < self.limit {
            history.push_back(now);
            debug!(
                active = history.len(),
                limit = self.limit,
                "Admission granted"
            );
            return Admission::Granted;
        }

        notified.enable();
        let oldest = history.front().copied().unwrap_or(now);
        let remaining = self.remaining_for(oldest, now);
        let deadline = now
            .checked_add(remaining)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Admission::WaitUntil(deadline)
    }

    /// Time left before an admission recorded at `admitted` leaves the window.
    fn remaining_for(&self, admitted: Instant, now: Instant) -> Duration {
        self.window
            .saturating_sub(now.saturating_duration_since(admitted))
    }

    /// Drop admissions that have left the window and wake waiters if any did.
    fn prune(&self, history: &mut VecDeque<Instant>, now: Instant) {
        let before = history.len();
        while let Some(oldest) = history.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                history.pop_front();
            } else {
                break;
            }
        }

        if history.len() < before {
            trace!(expired = before - history.len(), "Pruned expired admissions");
            self.capacity_freed.notify_waiters();
        }
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("active", &self.history.lock().len())
            .finish()
    }
}

//! Retry timing.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Callback fired when a scheduled retry is due.
pub type Wake = Box<dyn FnOnce() + Send + 'static>;

/// Delayed-callback abstraction so backoff can be tested without wall-clock waits.
pub trait RetryScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, wake: Wake);

    /// Drop every pending wake-up without firing it.
    fn cancel_all(&self);
}

/// `min(base * 2^retry_count, cap)`, saturating.
pub fn backoff_delay(retry_count: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2_u32.checked_pow(retry_count).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// Scheduler backed by `tokio::time::sleep` tasks.
#[derive(Default)]
pub struct TokioRetryScheduler {
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioRetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.retain(|timer| !timer.is_finished());
        timers.len()
    }
}

impl RetryScheduler for TokioRetryScheduler {
    fn schedule(&self, delay: Duration, wake: Wake) {
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            wake();
        });
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.retain(|timer| !timer.is_finished());
        timers.push(timer);
    }

    fn cancel_all(&self) {
        let timers = std::mem::take(&mut *self.timers.lock().unwrap_or_else(PoisonError::into_inner));
        for timer in &timers {
            timer.abort();
        }
        if !timers.is_empty() {
            tracing::debug!("Cancelled {} retry timers", timers.len());
        }
    }
}

//! Repeating timers on the tokio runtime.
//!
//! Timers follow `setInterval` semantics: the first call happens one period
//! after scheduling, and ticks that fall behind are skipped rather than
//! queued.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Creates and tracks repeating timers.
///
/// Cloning a scheduler shares its live-timer count.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    active: Arc<AtomicUsize>,
}

/// A live repeating timer. Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    period: Duration,
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    active: Arc<AtomicUsize>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` every `period` until the returned handle is cancelled.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn schedule_repeating<F>(&self, period: Duration, mut callback: F) -> TimerHandle
    where
        F: FnMut() + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                callback();
            }
        });

        self.active.fetch_add(1, Ordering::SeqCst);
        TimerHandle {
            period,
            cancelled,
            task: Some(task),
            active: Arc::clone(&self.active),
        }
    }

    /// Cancel a timer. Equivalent to dropping the handle.
    pub fn cancel(&self, handle: TimerHandle) {
        drop(handle);
    }

    /// Number of timers scheduled and not yet cancelled.
    pub fn active_timers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl TimerHandle {
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        // No callback starts after this flag is set, even on another worker.
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counter() -> (Arc<AtomicU32>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let scheduler = Scheduler::new();
        let (count, tick) = counter();
        let _timer = scheduler.schedule_repeating(Duration::from_millis(100), tick);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_callbacks() {
        let scheduler = Scheduler::new();
        let (count, tick) = counter();
        let timer = scheduler.schedule_repeating(Duration::from_millis(10), tick);
        assert_eq!(scheduler.active_timers(), 1);

        tokio::time::sleep(Duration::from_millis(35)).await;
        scheduler.cancel(timer);
        let seen = count.load(Ordering::SeqCst);
        assert_eq!(scheduler.active_timers(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let scheduler = Scheduler::new();
        {
            let _a = scheduler.schedule_repeating(Duration::from_millis(10), || {});
            let _b = scheduler.schedule_repeating(Duration::from_millis(10), || {});
            assert_eq!(scheduler.active_timers(), 2);
        }
        assert_eq!(scheduler.active_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_clamped() {
        let scheduler = Scheduler::new();
        let timer = scheduler.schedule_repeating(Duration::ZERO, || {});
        assert_eq!(timer.period(), Duration::from_millis(1));
    }
}

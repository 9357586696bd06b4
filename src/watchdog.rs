// ABOUTME: Reschedulable single-shot deadline timer that terminates stalled handlers
// ABOUTME: Each unit of I/O progress restarts the countdown; cancel disarms it permanently
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

const IDLE: u8 = 0;
const ARMED: u8 = 1;
const FIRED: u8 = 2;
const CANCELLED: u8 = 3;

/// Lifecycle of a [`Watchdog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Created but not armed
    Idle,
    /// Counting down
    Armed,
    /// Callback has started (terminal)
    Fired,
    /// Disarmed for good (terminal)
    Cancelled,
}

impl WatchdogState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            IDLE => Self::Idle,
            ARMED => Self::Armed,
            FIRED => Self::Fired,
            _ => Self::Cancelled,
        }
    }
}

/// Deadline timer bounding the time a call may go without output progress
///
/// The countdown runs on its own task. [`reschedule`](Self::reschedule)
/// restarts it from the full duration; reschedules are coalesced, so calling
/// it on every chunk is cheap. A firing that has already started is never
/// retracted, and nothing revives a watchdog once it is fired or cancelled.
/// Dropping the watchdog cancels it.
#[derive(Debug)]
pub struct Watchdog {
    duration: Duration,
    state: Arc<AtomicU8>,
    wake: Arc<Notify>,
}

impl Watchdog {
    /// Create an idle watchdog with the given countdown
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            state: Arc::new(AtomicU8::new(IDLE)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Create a watchdog and arm it immediately
    pub fn armed<F, Fut>(duration: Duration, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let watchdog = Self::new(duration);
        watchdog.arm(callback);
        watchdog
    }

    /// Start the countdown; `callback` runs once if it ever elapses
    ///
    /// Arming a watchdog that is not idle has no effect.
    pub fn arm<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self
            .state
            .compare_exchange(IDLE, ARMED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(state = ?self.state(), "watchdog already armed or finished");
            return;
        }

        let duration = self.duration;
        let state = Arc::clone(&self.state);
        let wake = Arc::clone(&self.wake);
        tokio::spawn(async move {
            let mut deadline = Instant::now() + duration;
            loop {
                tokio::select! {
                    biased;
                    () = wake.notified() => {
                        if state.load(Ordering::Acquire) != ARMED {
                            return;
                        }
                        deadline = Instant::now() + duration;
                    }
                    () = sleep_until(deadline) => break,
                }
            }

            if state
                .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                info!(timeout = ?duration, "watchdog fired, no output progress");
                callback().await;
            }
        });
    }

    /// Restart the countdown from the full duration
    pub fn reschedule(&self) {
        if self.state.load(Ordering::Acquire) == ARMED {
            self.wake.notify_one();
        }
    }

    /// Permanently disarm; a firing already under way still completes
    pub fn cancel(&self) {
        let previous = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
            (s == IDLE || s == ARMED).then_some(CANCELLED)
        });
        if previous == Ok(ARMED) {
            self.wake.notify_one();
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> WatchdogState {
        WatchdogState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Configured countdown
    pub const fn duration(&self) -> Duration {
        self.duration
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::time::sleep;

    use super::*;

    fn counting_watchdog(duration: Duration) -> (Watchdog, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let watchdog = Watchdog::armed(duration, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (watchdog, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_duration() {
        let (watchdog, fired) = counting_watchdog(Duration::from_millis(100));
        assert_eq!(watchdog.state(), WatchdogState::Armed);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(watchdog.state(), WatchdogState::Fired);

        watchdog.reschedule();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(watchdog.state(), WatchdogState::Fired);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_faster_than_timeout_never_fires() {
        let (watchdog, fired) = counting_watchdog(Duration::from_millis(100));

        for _ in 0..50 {
            sleep(Duration::from_millis(90)).await;
            watchdog.reschedule();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let (watchdog, fired) = counting_watchdog(Duration::from_millis(100));
        sleep(Duration::from_millis(60)).await;
        watchdog.cancel();
        assert_eq!(watchdog.state(), WatchdogState::Cancelled);

        watchdog.reschedule();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(watchdog.state(), WatchdogState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fire_keeps_fired() {
        let (watchdog, fired) = counting_watchdog(Duration::from_millis(10));
        sleep(Duration::from_millis(50)).await;
        watchdog.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(watchdog.state(), WatchdogState::Fired);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_watchdog_never_fires_and_cannot_arm_after_cancel() {
        let watchdog = Watchdog::new(Duration::from_millis(10));
        assert_eq!(watchdog.state(), WatchdogState::Idle);
        watchdog.cancel();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        watchdog.arm(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(watchdog.duration(), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let (watchdog, fired) = counting_watchdog(Duration::from_millis(100));
        drop(watchdog);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}

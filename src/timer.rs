//! Recurring timers for the playback watcher.
//!
//! A [`Timer`] runs a tick callback at a fixed cadence until the returned
//! [`TimerHandle`] is cancelled or dropped. [`TokioTimer`] drives ticks from a
//! tokio interval; [`ManualTimer`] only ticks when [`ManualTimer::fire`] is
//! awaited, which keeps watcher tests free of wall-clock sleeps.

use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};

/// Callback invoked on every tick. The returned future is awaited before the
/// next tick may start.
pub type TickFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Schedules recurring ticks.
pub trait Timer: Send + Sync + fmt::Debug {
    fn schedule_recurring(&self, period: Duration, tick: TickFn) -> TimerHandle;
}

/// Shared timer handle.
pub type SharedTimer = Arc<dyn Timer>;

/// Cancels a scheduled recurring tick. Dropping the handle cancels as well.
#[derive(Debug)]
pub struct TimerHandle {
    cancel_tx: watch::Sender<bool>,
}

impl TimerHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (Self { cancel_tx }, cancel_rx)
    }

    /// Stops further ticks. A tick that is already running completes.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

fn is_cancelled(rx: &watch::Receiver<bool>) -> bool {
    // A dropped handle reads as cancelled.
    *rx.borrow() || rx.has_changed().is_err()
}

/// Timer backed by `tokio::time::interval`.
///
/// The first tick fires immediately. Ticks that would overlap a slow callback
/// are skipped rather than queued. Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn schedule_recurring(&self, period: Duration, tick: TickFn) -> TimerHandle {
        let (handle, mut cancel_rx) = TimerHandle::new();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    // Only `true` is ever sent, and a closed channel means
                    // the handle was dropped.
                    _ = cancel_rx.changed() => break,

                    _ = ticker.tick() => tick().await,
                }
            }

            tracing::debug!("recurring timer stopped");
        });

        handle
    }
}

/// Timer that ticks only when told to.
#[derive(Default)]
pub struct ManualTimer {
    scheduled: Mutex<Vec<(Duration, TickFn, watch::Receiver<bool>)>>,
}

impl fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTimer")
            .field("active", &self.active())
            .finish()
    }
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one tick of every schedule that has not been cancelled, in the
    /// order they were scheduled.
    pub async fn fire(&self) {
        let ticks: Vec<TickFn> = {
            let mut scheduled = self.scheduled.lock().unwrap_or_else(|e| e.into_inner());
            scheduled.retain(|(_, _, rx)| !is_cancelled(rx));
            scheduled.iter().map(|(_, tick, _)| Arc::clone(tick)).collect()
        };

        for tick in ticks {
            tick().await;
        }
    }

    /// Number of schedules still active.
    pub fn active(&self) -> usize {
        let scheduled = self.scheduled.lock().unwrap_or_else(|e| e.into_inner());
        scheduled.iter().filter(|(_, _, rx)| !is_cancelled(rx)).count()
    }

    /// Period of the most recent active schedule.
    pub fn period(&self) -> Option<Duration> {
        let scheduled = self.scheduled.lock().unwrap_or_else(|e| e.into_inner());
        scheduled
            .iter()
            .rev()
            .find(|(_, _, rx)| !is_cancelled(rx))
            .map(|(period, _, _)| *period)
    }
}

impl Timer for ManualTimer {
    fn schedule_recurring(&self, period: Duration, tick: TickFn) -> TimerHandle {
        let (handle, cancel_rx) = TimerHandle::new();
        let mut scheduled = self.scheduled.lock().unwrap_or_else(|e| e.into_inner());
        scheduled.push((period, tick, cancel_rx));
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;

    use super::*;

    fn counting_tick(counter: &Arc<AtomicUsize>) -> TickFn {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_manual_timer_fires_until_cancelled() {
        let timer = ManualTimer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = timer.schedule_recurring(Duration::from_secs(1), counting_tick(&counter));
        assert_eq!(timer.active(), 1);
        assert_eq!(timer.period(), Some(Duration::from_secs(1)));

        timer.fire().await;
        timer.fire().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        handle.cancel();
        assert!(handle.is_cancelled());
        timer.fire().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(timer.active(), 0);
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels() {
        let timer = ManualTimer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        drop(timer.schedule_recurring(Duration::from_secs(1), counting_tick(&counter)));
        timer.fire().await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tokio_timer_ticks_and_stops() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = TokioTimer.schedule_recurring(Duration::from_millis(10), counting_tick(&counter));

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        // Let the task observe the cancellation.
        tokio::time::sleep(Duration::from_millis(30)).await;

        let seen = counter.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several ticks, saw {seen}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
    }
}

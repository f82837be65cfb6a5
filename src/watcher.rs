//! Polling based playback change detection.
//!
//! [`PlaybackWatcher`] asks a [`PlaybackSource`] what is playing at a fixed
//! cadence and diffs the answer against the previous one. Track changes come
//! out of [`PlaybackWatcher::subscribe`] as [`PlaybackEvent`]s; failed polls
//! come out of [`PlaybackWatcher::errors`] and leave the state untouched.
//!
//! The diff itself lives in [`PlaybackState::advance`], which has no I/O and
//! can be driven directly.

use std::{
    sync::{
        Arc, Mutex as StdMutex, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};

use crate::{
    clock::SharedClock,
    error::Result,
    timer::{SharedTimer, TickFn, TimerHandle},
    token::TokenManager,
    types::{PlaybackEvent, PlaybackSnapshot, PollError},
};

/// A track abandoned with more than this much of its duration left counts as
/// skipped.
pub const SKIP_THRESHOLD_MS: i64 = 5_000;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

const CHANNEL_CAPACITY: usize = 64;

/// The "what is playing right now" call.
#[async_trait]
pub trait PlaybackSource: Send + Sync + std::fmt::Debug {
    /// Returns the playback payload, or `None` when the service answered
    /// without a body. A `None` leaves the watcher state untouched; only a
    /// payload without an `item` counts as nothing playing.
    async fn current_playback(&self, access_token: &str) -> Result<Option<Value>>;
}

/// `current` is the most recent observation with an item, `last` the one
/// before it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub current: Option<PlaybackSnapshot>,
    pub last: Option<PlaybackSnapshot>,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    /// Applies one observation and returns the events it produces, in
    /// emission order.
    pub fn advance(&mut self, fetched: Option<PlaybackSnapshot>) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();

        match (self.current.take(), fetched) {
            (None, None) => {}
            (None, Some(fetched)) => {
                events.push(PlaybackEvent::new_track(fetched.clone()));
                self.current = Some(fetched);
            }
            (Some(current), None) => {
                self.last = Some(current);
            }
            (Some(current), Some(fetched)) if current.track_name != fetched.track_name => {
                if current.progress_ms <= current.duration_ms - SKIP_THRESHOLD_MS {
                    events.push(PlaybackEvent::track_skipped(current.clone()));
                }
                events.push(PlaybackEvent::new_track(fetched.clone()));
                self.last = Some(current);
                self.current = Some(fetched);
            }
            (Some(_), Some(fetched)) => {
                self.current = Some(fetched);
            }
        }

        events
    }
}

/// Watches playback through a recurring timer.
///
/// Cloning is cheap and every clone controls the same watcher.
#[derive(Debug, Clone)]
pub struct PlaybackWatcher {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tokens: Arc<TokenManager>,
    source: Arc<dyn PlaybackSource>,
    timer: SharedTimer,
    clock: SharedClock,
    period: Duration,
    // Held for the whole fetch and diff of a tick.
    state: Mutex<PlaybackState>,
    running: AtomicBool,
    generation: AtomicU64,
    handle: StdMutex<Option<TimerHandle>>,
    events: StdMutex<broadcast::Sender<PlaybackEvent>>,
    errors: StdMutex<broadcast::Sender<PollError>>,
}

impl PlaybackWatcher {
    /// Creates a stopped watcher.
    ///
    /// # Arguments
    ///
    /// * `tokens` - Supplies the access token for every poll
    /// * `source` - Answers what is playing
    /// * `timer` - Drives the polls once [`start`](Self::start)ed
    /// * `clock` - Timestamps [`PollError`]s
    /// * `period` - Time between two polls
    pub fn new(
        tokens: Arc<TokenManager>,
        source: Arc<dyn PlaybackSource>,
        timer: SharedTimer,
        clock: SharedClock,
        period: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (errors, _) = broadcast::channel(CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                tokens,
                source,
                timer,
                clock,
                period,
                state: Mutex::new(PlaybackState::default()),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                handle: StdMutex::new(None),
                events: StdMutex::new(events),
                errors: StdMutex::new(errors),
            }),
        }
    }

    /// Time between two polls.
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Starts polling. Does nothing if already running.
    pub fn start(&self) {
        let mut handle = lock(&self.inner.handle);
        if handle.is_some() {
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.running.store(true, Ordering::SeqCst);

        // The timer must not keep the watcher alive.
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let tick: TickFn = Arc::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.scheduled_tick(generation).await;
                }
            }
            .boxed()
        });

        *handle = Some(self.inner.timer.schedule_recurring(self.inner.period, tick));
        tracing::info!(period_ms = self.inner.period.as_millis() as u64, "playback watcher started");
    }

    /// Stops polling.
    ///
    /// Waits for a tick that is in flight, then closes the current event and
    /// error streams. Once this returns nothing more is emitted until the
    /// next [`start`](Self::start). If another clone starts the watcher while
    /// this waits, the streams stay open for the new run.
    pub async fn stop(&self) {
        let (handle, generation) = {
            let mut handle = lock(&self.inner.handle);
            self.inner.running.store(false, Ordering::SeqCst);
            (handle.take(), self.inner.generation.load(Ordering::SeqCst))
        };

        let Some(handle) = handle else {
            return;
        };
        handle.cancel();

        let _state = self.inner.state.lock().await;

        // A start() from another clone while we waited owns the streams now.
        let guard = lock(&self.inner.handle);
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("playback watcher restarted during stop, keeping streams");
            return;
        }

        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (errors, _) = broadcast::channel(CHANNEL_CAPACITY);
        *lock(&self.inner.events) = events;
        *lock(&self.inner.errors) = errors;
        drop(guard);

        tracing::info!("playback watcher stopped");
    }

    /// True between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Receiver for track change events. Ends at the next [`stop`](Self::stop).
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        lock(&self.inner.events).subscribe()
    }

    /// Receiver for failed polls. Ends at the next [`stop`](Self::stop).
    pub fn errors(&self) -> broadcast::Receiver<PollError> {
        lock(&self.inner.errors).subscribe()
    }

    /// Runs one poll right away, whether or not the watcher is running.
    ///
    /// Events are published to subscribers and also returned. A failure is
    /// returned to the caller only.
    pub async fn poll_once(&self) -> Result<Vec<PlaybackEvent>> {
        let mut state = self.inner.state.lock().await;
        self.inner.poll(&mut state, None).await
    }

    /// What the most recent poll with an item saw, `None` while idle.
    pub async fn current(&self) -> Option<PlaybackSnapshot> {
        self.inner.state.lock().await.current.clone()
    }

    /// The track played before [`current`](Self::current).
    pub async fn last(&self) -> Option<PlaybackSnapshot> {
        self.inner.state.lock().await.last.clone()
    }

    /// Copy of both snapshots, taken under one lock.
    pub async fn state(&self) -> PlaybackState {
        self.inner.state.lock().await.clone()
    }
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn scheduled_tick(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if !self.is_current(generation) {
            return;
        }

        if let Err(error) = self.poll(&mut state, Some(generation)).await {
            if !self.is_current(generation) {
                return;
            }

            tracing::warn!("playback poll failed: {error}");
            let _ = lock(&self.errors).send(PollError {
                error,
                at_ms: self.clock.now_millis(),
            });
        }
    }

    async fn poll(
        &self,
        state: &mut PlaybackState,
        generation: Option<u64>,
    ) -> Result<Vec<PlaybackEvent>> {
        let access_token = self.tokens.ensure_valid_access_token().await?;
        let Some(payload) = self.source.current_playback(&access_token).await? else {
            // An empty answer says nothing about the track; keep the state.
            return Ok(Vec::new());
        };
        let fetched = PlaybackSnapshot::from_payload(payload);

        // Stopped while fetching.
        if generation.is_some_and(|generation| !self.is_current(generation)) {
            return Ok(Vec::new());
        }

        let events = state.advance(fetched);

        let sender = lock(&self.events);
        for event in &events {
            tracing::debug!(kind = ?event.kind, track = ?event.snapshot.track_name, "playback event");
            // No subscribers is fine.
            let _ = sender.send(event.clone());
        }

        Ok(events)
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::EventKind;

    fn snapshot(name: &str, progress_ms: i64, duration_ms: i64) -> Option<PlaybackSnapshot> {
        PlaybackSnapshot::from_payload(json!({
            "progress_ms": progress_ms,
            "item": { "name": name, "duration_ms": duration_ms }
        }))
    }

    #[test]
    fn test_idle_without_item_stays_idle() {
        let mut state = PlaybackState::default();
        assert!(state.advance(None).is_empty());
        assert_eq!(state, PlaybackState::default());
    }

    #[test]
    fn test_track_played_to_the_end_is_not_skipped() {
        let mut state = PlaybackState::default();
        state.advance(snapshot("A", 0, 200_000));
        state.advance(snapshot("A", 196_000, 200_000));

        let events = state.advance(snapshot("B", 0, 180_000));
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::NewTrack]);
        assert_eq!(
            state.last.as_ref().and_then(|s| s.track_name.as_deref()),
            Some("A")
        );
    }

    #[test]
    fn test_skip_threshold_is_inclusive() {
        let mut state = PlaybackState::default();
        state.advance(snapshot("A", 195_000, 200_000));

        let events = state.advance(snapshot("B", 0, 180_000));
        assert_eq!(events[0].kind, EventKind::TrackSkipped);
        assert_eq!(events[0].snapshot.progress_ms, 195_000);
        assert_eq!(events[1].kind, EventKind::NewTrack);
    }

    #[test]
    fn test_same_track_updates_progress_silently() {
        let mut state = PlaybackState::default();
        state.advance(snapshot("A", 0, 200_000));

        assert!(state.advance(snapshot("A", 1_000, 200_000)).is_empty());
        assert_eq!(state.current.as_ref().map(|s| s.progress_ms), Some(1_000));
        assert_eq!(state.last, None);
    }
}

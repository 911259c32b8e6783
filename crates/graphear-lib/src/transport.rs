//! Transport controller — play/pause/seek/rate against one media resource.
//!
//! ```text
//! load(url) → media.set_source + load, position 0, readiness reset
//!     → host forwards LoadedMetadata → duration captured, rate reapplied,
//!       readiness resolved
//!     → play() → media.play() awaited outside the lock → is_playing
//! ```
//!
//! The controller is a cloneable handle. The seek engine and the TTS
//! orchestrator hold clones and go through these methods; nothing else
//! touches the media resource.
//!
//! The lock is never held across an `.await`: `play()` takes the platform's
//! play future out under the lock and awaits it after releasing it, and
//! `metadata_ready()` subscribes under the lock and waits outside it.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};

use graphear_core::types::{PlaybackSnapshot, PlayerConfig};

use crate::media::{MediaEvent, MediaResource, PlaybackError, ReadyState};

/// Cloneable handle to one playback session.
pub struct TransportController<M: MediaResource> {
    shared: Arc<Shared<M>>,
}

struct Shared<M> {
    inner: Mutex<Inner<M>>,
    status_tx: watch::Sender<PlaybackSnapshot>,
    /// `true` once metadata for the current source has loaded.
    ready_tx: watch::Sender<bool>,
}

struct Inner<M> {
    media: M,
    config: PlayerConfig,
    state: PlaybackSnapshot,
}

impl<M: MediaResource> Clone for TransportController<M> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M: MediaResource> TransportController<M> {
    pub fn new(mut media: M, config: PlayerConfig) -> Self {
        let state = PlaybackSnapshot::new(&config);
        media.set_playback_rate(state.playback_rate);
        let (status_tx, _) = watch::channel(state.clone());
        let (ready_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    media,
                    config,
                    state,
                }),
                status_tx,
                ready_tx,
            }),
        }
    }

    /// Bind a new source and rewind. Does not start playback; await
    /// [`metadata_ready`](Self::metadata_ready) before calling `play`.
    pub fn load(&self, url: &str) {
        self.update(|inner| {
            if !inner.media.is_paused() {
                inner.media.pause();
            }
            inner.media.set_source(url);
            inner.media.set_current_time(0.0);
            inner.media.load();

            let s = &mut inner.state;
            s.source_url = Some(url.to_string());
            s.is_playing = false;
            s.current_time = 0.0;
            s.duration = None;
            s.progress_percent = 0.0;
        });
        self.shared.ready_tx.send_replace(false);
        debug!("transport: loaded {url}");
    }

    /// Start playback. `is_playing` turns true only once the platform
    /// confirms; a rejection leaves it false and is returned to the caller.
    pub async fn play(&self) -> Result<(), PlaybackError> {
        let attempt = self.lock().media.play();
        match attempt.await {
            Ok(()) => {
                self.update(|inner| inner.state.is_playing = true);
                debug!("transport: playing");
                Ok(())
            }
            Err(e) => {
                self.update(|inner| inner.state.is_playing = false);
                warn!("transport: play rejected: {e}");
                Err(e)
            }
        }
    }

    pub fn pause(&self) {
        self.update(|inner| {
            inner.media.pause();
            inner.state.is_playing = false;
        });
    }

    /// Play when paused, pause otherwise.
    pub async fn toggle(&self) -> Result<(), PlaybackError> {
        let paused = self.lock().media.is_paused();
        if paused {
            self.play().await
        } else {
            self.pause();
            Ok(())
        }
    }

    /// Move by `delta` seconds, clamped to `[0, duration]`. Returns the new
    /// position, or `None` while the duration is unknown.
    pub fn seek_by(&self, delta: f64) -> Option<f64> {
        self.update(|inner| {
            let target = inner.media.current_time() + delta;
            inner.seek(target)
        })
    }

    /// Jump to `seconds`, clamped to `[0, duration]`.
    pub fn seek_to(&self, seconds: f64) -> Option<f64> {
        self.update(|inner| inner.seek(seconds))
    }

    /// Jump to `fraction` of the duration and set the fill to match.
    pub fn seek_to_fraction(&self, fraction: f64) -> Option<f64> {
        self.update(|inner| {
            let duration = inner.known_duration()?;
            let fraction = fraction.clamp(0.0, 1.0);
            let time = fraction * duration;
            if !time.is_finite() {
                return None;
            }
            inner.media.set_current_time(time);
            inner.state.current_time = time;
            inner.state.progress_percent = fraction * 100.0;
            Some(time)
        })
    }

    /// Mark a scrub gesture as active; the fill bar drops its smoothing
    /// transition while set.
    pub fn set_seeking(&self, seeking: bool) {
        self.update(|inner| inner.state.is_seeking = seeking);
    }

    /// Advance to the next speed level, wrapping after the last, and apply it
    /// to the resource right away. Returns the new index.
    pub fn cycle_speed(&self) -> usize {
        self.update(|inner| {
            let next = inner.config.next_speed_index(inner.state.speed_index);
            let rate = inner.config.rate_at(next);
            inner.media.set_playback_rate(rate);
            inner.state.speed_index = next;
            inner.state.playback_rate = rate;
            next
        })
    }

    /// Sync derived state from a media element event.
    pub fn handle_event(&self, event: MediaEvent) {
        match event {
            MediaEvent::LoadedMetadata => {
                self.update(|inner| {
                    let d = inner.media.duration();
                    inner.state.duration = (d.is_finite() && d >= 0.0).then_some(d);
                    // A new source resets the platform rate.
                    inner.media.set_playback_rate(inner.state.playback_rate);
                });
                self.shared.ready_tx.send_replace(true);
                debug!("transport: metadata ready");
            }
            MediaEvent::TimeUpdate => {
                self.update(|inner| {
                    let t = inner.media.current_time().max(0.0);
                    let t = match inner.state.duration {
                        Some(d) => t.min(d),
                        None => t,
                    };
                    inner.state.current_time = t;
                    inner.state.progress_percent = inner.progress_percent(t);
                });
            }
            MediaEvent::Ended => {
                self.update(|inner| {
                    inner.media.set_current_time(0.0);
                    inner.state.current_time = 0.0;
                    inner.state.progress_percent = 0.0;
                    inner.state.is_playing = false;
                });
                debug!("transport: ended");
            }
        }
    }

    /// Resolve once metadata for the current source is available.
    ///
    /// Returns immediately when the resource is already at or past
    /// [`ReadyState::HaveMetadata`]; otherwise waits for the next
    /// [`MediaEvent::LoadedMetadata`].
    pub async fn metadata_ready(&self) -> Result<(), PlaybackError> {
        let mut ready_rx = {
            let inner = self.lock();
            if inner.media.ready_state() >= ReadyState::HaveMetadata {
                return Ok(());
            }
            self.shared.ready_tx.subscribe()
        };
        ready_rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| PlaybackError::Closed)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.lock().state.clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.shared.status_tx.subscribe()
    }

    pub fn speed_label(&self) -> String {
        let inner = self.lock();
        inner.config.label_at(inner.state.speed_index)
    }

    pub fn seek_step(&self) -> f64 {
        self.lock().config.seek_step
    }

    fn lock(&self) -> MutexGuard<'_, Inner<M>> {
        self.shared.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate under the lock, then publish the snapshot if it changed.
    fn update<R>(&self, f: impl FnOnce(&mut Inner<M>) -> R) -> R {
        let mut inner = self.lock();
        let out = f(&mut inner);
        let state = inner.state.clone();
        drop(inner);
        self.shared.status_tx.send_if_modified(|s| {
            if *s == state {
                false
            } else {
                *s = state;
                true
            }
        });
        out
    }
}

impl<M> Inner<M>
where
    M: MediaResource,
{
    fn known_duration(&self) -> Option<f64> {
        self.state.duration.filter(|d| d.is_finite() && *d > 0.0)
    }

    fn progress_percent(&self, time: f64) -> f64 {
        match self.known_duration() {
            Some(d) => (time / d * 100.0).clamp(0.0, 100.0),
            None => 0.0,
        }
    }

    fn seek(&mut self, target: f64) -> Option<f64> {
        let duration = self.known_duration()?;
        if !target.is_finite() {
            return None;
        }
        let t = target.clamp(0.0, duration);
        self.media.set_current_time(t);
        self.state.current_time = t;
        self.state.progress_percent = self.progress_percent(t);
        Some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMedia, PlayBehavior};

    fn loaded(duration: f64) -> (TransportController<FakeMedia>, FakeMedia) {
        let media = FakeMedia::new();
        let transport = TransportController::new(media.clone(), PlayerConfig::default());
        transport.load("http://host/a.mp3");
        media.finish_loading(duration);
        transport.handle_event(MediaEvent::LoadedMetadata);
        (transport, media)
    }

    #[test]
    fn load_resets_position_without_playing() {
        let (transport, media) = loaded(100.0);
        transport.seek_to(40.0);
        transport.load("http://host/b.mp3");

        let snap = transport.snapshot();
        assert_eq!(snap.source_url.as_deref(), Some("http://host/b.mp3"));
        assert_eq!(snap.current_time, 0.0);
        assert_eq!(snap.duration, None);
        assert!(!snap.is_playing);
        assert_eq!(media.get().load_calls, 2);
        assert!(media.get().paused);
    }

    #[tokio::test]
    async fn play_sets_playing_only_on_success() {
        let (transport, media) = loaded(100.0);
        transport.play().await.unwrap();
        assert!(transport.snapshot().is_playing);

        transport.pause();
        media.set_play_behavior(PlayBehavior::NotAllowed);
        let err = transport.play().await.unwrap_err();
        assert!(matches!(err, PlaybackError::NotAllowed(_)));
        assert!(!transport.snapshot().is_playing);
    }

    #[test]
    fn pause_twice_is_harmless() {
        let (transport, _media) = loaded(100.0);
        transport.pause();
        assert!(!transport.snapshot().is_playing);
        transport.pause();
        assert!(!transport.snapshot().is_playing);
    }

    #[tokio::test]
    async fn toggle_alternates() {
        let (transport, _media) = loaded(100.0);
        transport.toggle().await.unwrap();
        assert!(transport.snapshot().is_playing);
        transport.toggle().await.unwrap();
        assert!(!transport.snapshot().is_playing);
    }

    #[test]
    fn seek_by_clamps_to_duration() {
        let (transport, media) = loaded(100.0);
        transport.seek_to(97.0);
        assert_eq!(transport.seek_by(10.0), Some(100.0));
        assert_eq!(transport.snapshot().current_time, 100.0);
        assert_eq!(media.get().current_time, 100.0);

        assert_eq!(transport.seek_by(-250.0), Some(0.0));
        assert_eq!(transport.snapshot().current_time, 0.0);
    }

    #[test]
    fn seek_without_duration_is_a_no_op() {
        let media = FakeMedia::new();
        let transport = TransportController::new(media.clone(), PlayerConfig::default());
        transport.load("http://host/a.mp3");
        assert_eq!(transport.seek_by(10.0), None);
        assert_eq!(transport.seek_to_fraction(0.5), None);
        assert_eq!(media.get().current_time, 0.0);
    }

    #[test]
    fn speed_cycles_with_wraparound_and_applies_immediately() {
        let media = FakeMedia::new();
        let transport = TransportController::new(media.clone(), PlayerConfig::default());
        assert_eq!(transport.snapshot().speed_index, 1);
        assert_eq!(media.get().playback_rate, 1.5);

        let seen: Vec<usize> = (0..4).map(|_| transport.cycle_speed()).collect();
        assert_eq!(seen, vec![2, 3, 0, 1]);
        assert_eq!(media.get().playback_rate, 1.5);

        transport.cycle_speed();
        assert_eq!(media.get().playback_rate, 2.0);
        assert_eq!(transport.speed_label(), "2x");
    }

    #[test]
    fn metadata_reapplies_current_speed() {
        let media = FakeMedia::new();
        let transport = TransportController::new(media.clone(), PlayerConfig::default());
        transport.cycle_speed();
        transport.load("http://host/a.mp3");
        media.finish_loading(30.0);
        assert_eq!(media.get().playback_rate, 1.0);

        transport.handle_event(MediaEvent::LoadedMetadata);
        assert_eq!(media.get().playback_rate, 2.0);
        assert_eq!(transport.snapshot().duration, Some(30.0));
    }

    #[test]
    fn time_update_tracks_progress() {
        let (transport, media) = loaded(200.0);
        media.get().current_time = 50.0;
        transport.handle_event(MediaEvent::TimeUpdate);
        let snap = transport.snapshot();
        assert_eq!(snap.current_time, 50.0);
        assert_eq!(snap.progress_percent, 25.0);
    }

    #[test]
    fn time_update_without_duration_keeps_zero_progress() {
        let media = FakeMedia::new();
        let transport = TransportController::new(media.clone(), PlayerConfig::default());
        transport.load("http://host/a.mp3");
        media.get().current_time = 3.0;
        transport.handle_event(MediaEvent::TimeUpdate);
        assert_eq!(transport.snapshot().progress_percent, 0.0);
    }

    #[tokio::test]
    async fn ended_rewinds_and_stops() {
        let (transport, media) = loaded(100.0);
        transport.play().await.unwrap();
        media.get().current_time = 100.0;
        transport.handle_event(MediaEvent::Ended);

        let snap = transport.snapshot();
        assert!(!snap.is_playing);
        assert_eq!(snap.current_time, 0.0);
        assert_eq!(media.get().current_time, 0.0);
    }

    #[tokio::test]
    async fn metadata_ready_fast_path() {
        let (transport, _media) = loaded(10.0);
        transport.metadata_ready().await.unwrap();
    }

    #[tokio::test]
    async fn metadata_ready_waits_for_event() {
        let media = FakeMedia::new();
        let transport = TransportController::new(media.clone(), PlayerConfig::default());
        transport.load("http://host/a.mp3");

        let waiter = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.metadata_ready().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        media.finish_loading(12.0);
        transport.handle_event(MediaEvent::LoadedMetadata);
        waiter.await.unwrap().unwrap();
    }

    #[test]
    fn subscribers_see_changes() {
        let (transport, _media) = loaded(100.0);
        let mut rx = transport.subscribe();
        rx.mark_unchanged();
        transport.seek_to(10.0);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().current_time, 10.0);
    }
}

//! Platform media element seam.
//!
//! The host (browser binding, desktop shell, test fake) implements
//! [`MediaResource`]; only the [`TransportController`](crate::transport::TransportController)
//! ever touches it.

use futures_util::future::BoxFuture;

/// How much of the resource is buffered, ordered like the HTML media
/// `readyState` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Why the platform refused or aborted playback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaybackError {
    /// Autoplay policy rejected a play attempt without a user gesture.
    #[error("playback not allowed: {0}")]
    NotAllowed(String),
    #[error("playback failed: {0}")]
    Failed(String),
    /// The controller went away while a caller was waiting on it.
    #[error("media resource closed")]
    Closed,
}

/// Outcome of a play attempt. `'static` so callers can release any lock on
/// the resource before awaiting it.
pub type PlayFuture = BoxFuture<'static, Result<(), PlaybackError>>;

/// Lifecycle events the host forwards from the media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    LoadedMetadata,
    TimeUpdate,
    Ended,
}

/// A single playable media resource.
pub trait MediaResource: Send + 'static {
    fn set_source(&mut self, url: &str);
    /// Re-buffer metadata for the current source.
    fn load(&mut self);
    fn play(&mut self) -> PlayFuture;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    /// NaN while unknown.
    fn duration(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64);
    fn ready_state(&self) -> ReadyState;
}

//! Test doubles for the platform seams and an in-process mock HTTP server.
//!
//! Compiled for this crate's tests and for downstream crates that enable the
//! `test-util` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use tokio::sync::Notify;

use graphear_core::types::SynthesizeRequest;

use crate::client::{Backend, BackendError};
use crate::media::{MediaResource, PlayFuture, PlaybackError, ReadyState};
use crate::orchestrator::DownloadSink;
use crate::seek::{PointerKind, WindowListeners};

// ─── Media ─────────────────────────────────────────────────────────────────

/// How [`FakeMedia::play`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayBehavior {
    Allow,
    NotAllowed,
    Fail,
}

#[derive(Debug)]
pub struct FakeMediaState {
    pub src: Option<String>,
    pub paused: bool,
    pub current_time: f64,
    pub duration: f64,
    pub playback_rate: f64,
    pub ready_state: ReadyState,
    pub load_calls: usize,
    pub play_calls: usize,
    pub play_behavior: PlayBehavior,
    /// When set, `load()` reports metadata immediately with this duration.
    pub cached_duration: Option<f64>,
}

/// Shared-state media element; clones observe the same state.
#[derive(Debug, Clone)]
pub struct FakeMedia(Arc<Mutex<FakeMediaState>>);

impl FakeMedia {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(FakeMediaState {
            src: None,
            paused: true,
            current_time: 0.0,
            duration: f64::NAN,
            playback_rate: 1.0,
            ready_state: ReadyState::HaveNothing,
            load_calls: 0,
            play_calls: 0,
            play_behavior: PlayBehavior::Allow,
            cached_duration: None,
        })))
    }

    /// Media whose loads resolve metadata synchronously.
    pub fn cached(duration: f64) -> Self {
        let media = Self::new();
        media.get().cached_duration = Some(duration);
        media
    }

    pub fn get(&self) -> MutexGuard<'_, FakeMediaState> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Simulate metadata arriving for the current source.
    pub fn finish_loading(&self, duration: f64) {
        let mut s = self.get();
        s.duration = duration;
        s.ready_state = ReadyState::HaveMetadata;
    }

    pub fn set_play_behavior(&self, behavior: PlayBehavior) {
        self.get().play_behavior = behavior;
    }
}

impl Default for FakeMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaResource for FakeMedia {
    fn set_source(&mut self, url: &str) {
        self.get().src = Some(url.to_string());
    }

    fn load(&mut self) {
        let mut s = self.get();
        s.load_calls += 1;
        s.paused = true;
        s.playback_rate = 1.0;
        match s.cached_duration {
            Some(d) => {
                s.duration = d;
                s.ready_state = ReadyState::HaveMetadata;
            }
            None => {
                s.duration = f64::NAN;
                s.ready_state = ReadyState::HaveNothing;
            }
        }
    }

    fn play(&mut self) -> PlayFuture {
        let mut s = self.get();
        s.play_calls += 1;
        let result = if s.src.is_none() {
            Err(PlaybackError::Failed("no supported source".into()))
        } else {
            match s.play_behavior {
                PlayBehavior::Allow => {
                    s.paused = false;
                    Ok(())
                }
                PlayBehavior::NotAllowed => Err(PlaybackError::NotAllowed(
                    "play() requires a user gesture".into(),
                )),
                PlayBehavior::Fail => Err(PlaybackError::Failed("decode error".into())),
            }
        };
        futures_util::future::ready(result).boxed()
    }

    fn pause(&mut self) {
        self.get().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.get().paused
    }

    fn current_time(&self) -> f64 {
        self.get().current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.get().current_time = seconds;
    }

    fn duration(&self) -> f64 {
        self.get().duration
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.get().playback_rate = rate;
    }

    fn ready_state(&self) -> ReadyState {
        self.get().ready_state
    }
}

// ─── Window listeners ──────────────────────────────────────────────────────

/// Records which drag listeners are attached to the window.
#[derive(Debug, Clone, Default)]
pub struct FakeWindow {
    attached: Arc<Mutex<HashMap<usize, PointerKind>>>,
    next_id: Arc<AtomicUsize>,
}

impl FakeWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self, kind: PointerKind) -> bool {
        self.lock().values().any(|k| *k == kind)
    }

    pub fn attached_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, PointerKind>> {
        self.attached.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl WindowListeners for FakeWindow {
    type Token = usize;

    fn attach(&mut self, kind: PointerKind) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(id, kind);
        id
    }

    fn detach(&mut self, token: usize) {
        self.lock().remove(&token);
    }
}

// ─── Backend ───────────────────────────────────────────────────────────────

/// Backend that answers from canned results and counts calls.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    pub synth_calls: Arc<AtomicUsize>,
    pub last_request: Arc<Mutex<Option<SynthesizeRequest>>>,
    synth_result: Arc<Mutex<Result<String, BackendError>>>,
    extract_result: Arc<Mutex<Result<String, BackendError>>>,
    /// When set, `synthesize` waits for a notification before answering.
    gate: Option<Arc<Notify>>,
}

impl FakeBackend {
    pub fn returning(audio_url: &str) -> Self {
        Self {
            synth_calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
            synth_result: Arc::new(Mutex::new(Ok(audio_url.to_string()))),
            extract_result: Arc::new(Mutex::new(Ok("1번 문제, 다음을 읽고 답하시오.".into()))),
            gate: None,
        }
    }

    pub fn failing(err: BackendError) -> Self {
        let backend = Self::returning("");
        *backend.synth_result.lock().unwrap_or_else(|e| e.into_inner()) = Err(err);
        backend
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_extract_result(self, result: Result<String, BackendError>) -> Self {
        *self.extract_result.lock().unwrap_or_else(|e| e.into_inner()) = result;
        self
    }

    pub fn calls(&self) -> usize {
        self.synth_calls.load(Ordering::SeqCst)
    }
}

impl Backend for FakeBackend {
    async fn synthesize(&self, request: &SynthesizeRequest) -> Result<String, BackendError> {
        self.synth_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.synth_result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn extract_text(&self, _pdf: Vec<u8>, _file_name: &str) -> Result<String, BackendError> {
        self.extract_result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

// ─── Downloads ─────────────────────────────────────────────────────────────

/// Records `(url, filename)` pairs instead of fetching.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub downloads: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingSink {
    pub fn taken(&self) -> Vec<(String, String)> {
        self.downloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl DownloadSink for RecordingSink {
    async fn download(&self, url: &str, filename: &str) -> Result<(), String> {
        self.downloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((url.to_string(), filename.to_string()));
        Ok(())
    }
}

// ─── Mock HTTP server ──────────────────────────────────────────────────────

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub async fn spawn_mock(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock server");
    let addr = listener.local_addr().expect("mock server has no address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

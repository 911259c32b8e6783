//! Listening page — one transport, one TTS orchestrator, the controls around
//! them.
//!
//! Mounting the page synthesizes the extracted text and starts playback
//! once. The host forwards media events, key presses and progress-bar
//! gestures (through [`AudioPage::seek_engine`]) and renders from
//! [`AudioPage::snapshot`] and the label getters.
//!
//! Every method takes `&self`: a pending [`AudioPage::mount`] waits for
//! `LoadedMetadata`, which the host delivers through
//! [`AudioPage::handle_event`] on the same page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info};

use graphear_core::text_prep::split_questions;
use graphear_core::time::format_time;
use graphear_core::types::{
    NavState, PlaybackSnapshot, PlayerConfig, Question, SpeechConfig, SpeechRequest,
};
use graphear_lib::client::Backend;
use graphear_lib::media::{MediaEvent, MediaResource};
use graphear_lib::orchestrator::{playback_message, DownloadSink, TtsError, TtsOrchestrator};
use graphear_lib::seek::{SeekEngine, WindowListeners};
use graphear_lib::transport::TransportController;

use crate::state::Route;

pub const DEFAULT_TITLE: &str = "기본 듣기 파일";
pub const HEADER_BEFORE_MOUNT: &str = "문제 듣기";
pub const HEADER_AFTER_MOUNT: &str = "PDF 변환 결과 재생";
pub const NO_SOURCE: &str = "TTS 음원 로드 중이거나 로드에 실패했습니다. \
     잠시 후 다시 시도하거나 재생 버튼을 다시 누르세요.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Space,
    Other,
}

impl Key {
    /// Map a DOM-style key name.
    pub fn from_name(name: &str) -> Key {
        match name {
            "ArrowLeft" => Key::ArrowLeft,
            "ArrowRight" => Key::ArrowRight,
            " " | "Space" | "Spacebar" => Key::Space,
            _ => Key::Other,
        }
    }
}

pub struct AudioPage<B: Backend, M: MediaResource> {
    problem_title: String,
    text: String,
    transport: TransportController<M>,
    tts: TtsOrchestrator<B, M>,
    mounted: AtomicBool,
    auto_load_attempted: AtomicBool,
    error: Mutex<Option<String>>,
}

impl<B: Backend, M: MediaResource> AudioPage<B, M> {
    pub fn new(backend: B, media: M, nav: Option<NavState>) -> Self {
        Self::with_config(backend, media, nav, PlayerConfig::default(), SpeechConfig::default())
    }

    pub fn with_config(
        backend: B,
        media: M,
        nav: Option<NavState>,
        player: PlayerConfig,
        speech: SpeechConfig,
    ) -> Self {
        let nav = nav.unwrap_or_default();
        let problem_title = nav
            .problem_title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let text = nav
            .extracted_text
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| speech.placeholder_text.clone());

        let transport = TransportController::new(media, player);
        let tts = TtsOrchestrator::new(backend, transport.clone(), speech);
        Self {
            problem_title,
            text,
            transport,
            tts,
            mounted: AtomicBool::new(false),
            auto_load_attempted: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    /// Initial auto-load. Runs the request at most once per page; later
    /// calls return `None`.
    pub async fn mount(&self) -> Option<Result<(), TtsError>> {
        self.mounted.store(true, Ordering::SeqCst);
        if !self.tts.is_valid_text(&self.text) {
            return None;
        }
        if self
            .auto_load_attempted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        info!("audio page: auto-loading speech for {}", self.problem_title);
        Some(self.play(&self.text).await)
    }

    /// Request speech for the page text again and play it.
    pub async fn restart(&self) -> Result<(), TtsError> {
        self.play(&self.text).await
    }

    /// The page text split at its `[문항 N]` headers.
    pub fn questions(&self) -> Vec<Question> {
        split_questions(&self.text)
    }

    /// Request speech for one question's body and play it.
    pub async fn play_question(&self, number: u32) -> Result<(), TtsError> {
        let Some(question) = self.questions().into_iter().find(|q| q.number == number) else {
            debug!("audio page: no question {number}");
            return Err(TtsError::InvalidInput);
        };
        self.play(&question.body).await
    }

    pub async fn toggle_play_pause(&self) -> bool {
        if self.transport.snapshot().source_url.is_none() {
            self.set_error(Some(NO_SOURCE.into()));
            return false;
        }
        if let Err(e) = self.transport.toggle().await {
            self.set_error(Some(playback_message(&e)));
        }
        true
    }

    /// Returns true when the key was handled and its default action should
    /// be suppressed.
    pub async fn handle_key(&self, key: Key) -> bool {
        match key {
            Key::ArrowLeft => {
                self.rewind();
                true
            }
            Key::ArrowRight => {
                self.fast_forward();
                true
            }
            Key::Space => {
                self.toggle_play_pause().await;
                true
            }
            Key::Other => false,
        }
    }

    pub fn rewind(&self) -> Option<f64> {
        self.transport.seek_by(-self.transport.seek_step())
    }

    pub fn fast_forward(&self) -> Option<f64> {
        self.transport.seek_by(self.transport.seek_step())
    }

    /// Advance to the next playback speed; returns its label.
    pub fn cycle_speed(&self) -> String {
        self.transport.cycle_speed();
        self.transport.speed_label()
    }

    pub async fn download<D: DownloadSink>(&self, sink: &D) -> Result<String, TtsError> {
        self.set_error(None);
        self.tts
            .request_and_download(&self.text, Some(&self.problem_title), sink)
            .await
    }

    /// Pause and go back to the upload page.
    pub fn leave_to_upload(&self) -> Route {
        if self.transport.snapshot().is_playing {
            self.transport.pause();
        }
        Route::PdfConverter
    }

    pub fn go_home(&self) -> Route {
        Route::Home
    }

    pub fn handle_event(&self, event: MediaEvent) {
        self.transport.handle_event(event);
    }

    /// A handle on the page's transport, for hosts that dispatch media
    /// events from another task.
    pub fn transport(&self) -> TransportController<M> {
        self.transport.clone()
    }

    pub fn seek_engine<W: WindowListeners>(&self, window: W) -> SeekEngine<M, W> {
        SeekEngine::new(self.transport.clone(), window)
    }

    // ── view ──────────────────────────────────────────────────────────

    pub fn problem_title(&self) -> &str {
        &self.problem_title
    }

    pub fn header_title(&self) -> &'static str {
        if self.mounted.load(Ordering::SeqCst) {
            HEADER_AFTER_MOUNT
        } else {
            HEADER_BEFORE_MOUNT
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.transport.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.transport.subscribe()
    }

    pub fn request(&self) -> SpeechRequest {
        self.tts.request()
    }

    pub fn is_tts_loading(&self) -> bool {
        self.tts.is_loading()
    }

    pub fn speed_label(&self) -> String {
        self.transport.speed_label()
    }

    /// `"m:ss / m:ss"`; an unknown duration reads as `0:00`.
    pub fn time_label(&self) -> String {
        let s = self.transport.snapshot();
        format!(
            "{} / {}",
            format_time(s.current_time),
            format_time(s.duration.unwrap_or(f64::NAN))
        )
    }

    /// Page-level error, else the last speech request's error.
    pub fn error(&self) -> Option<String> {
        self.error_slot()
            .clone()
            .or_else(|| self.tts.request().error_message)
    }

    async fn play(&self, text: &str) -> Result<(), TtsError> {
        self.set_error(None);
        let result = self.tts.request_and_play(text).await;
        if let Err(e) = &result {
            debug!("audio page: speech request ended with {e}");
        }
        result
    }

    fn set_error(&self, error: Option<String>) {
        *self.error_slot() = error;
    }

    fn error_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.error.lock().unwrap_or_else(|e| e.into_inner())
    }
}

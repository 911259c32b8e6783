//! TTS orchestrator — synthesis request → transport load → readiness →
//! autoplay, plus the download variant.
//!
//! ```text
//! request_and_play(text)
//!     → validate (placeholder / empty rejected, no network)
//!     → Loading → backend.synthesize → audioUrl
//!     → transport.load(url) → transport.metadata_ready() → transport.play()
//! ```
//!
//! [`SpeechRequester`] is the synthesis half: validation, the in-flight
//! guard and the observable [`SpeechRequest`]. It needs no media resource,
//! so downloads and headless callers use it directly. [`TtsOrchestrator`]
//! pairs it with a [`TransportController`] for playback.
//!
//! At most one request is in flight per requester. A second call while one
//! is loading returns [`TtsError::Busy`] without touching the first
//! request's state. The in-flight flag is released by a drop guard, so it is
//! cleared on every exit path, including a caller dropping the future.
//!
//! Every failure is also recorded in the observable [`SpeechRequest`] state;
//! the returned `Result` is for callers that want to branch on it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use graphear_core::text_prep::download_filename;
use graphear_core::types::{SpeechConfig, SpeechRequest, SpeechStatus, SynthesizeRequest};

use crate::client::{Backend, BackendError};
use crate::media::{MediaResource, PlaybackError};
use crate::transport::TransportController;

/// Hands a synthesized file to the user without navigating away.
pub trait DownloadSink {
    fn download(
        &self,
        url: &str,
        filename: &str,
    ) -> impl Future<Output = Result<(), String>> + Send;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TtsError {
    #[error("이미 음성 요청이 진행 중입니다.")]
    Busy,
    #[error("재생할 해설 텍스트가 없습니다.")]
    InvalidInput,
    #[error("TTS 생성 실패: {0}")]
    Backend(#[from] BackendError),
    #[error("{}", playback_message(.0))]
    Playback(#[from] PlaybackError),
    #[error("다운로드 실패: {0}")]
    Download(String),
}

/// User-facing guidance for a failed play attempt.
pub fn playback_message(err: &PlaybackError) -> String {
    match err {
        PlaybackError::NotAllowed(_) => {
            "자동 재생이 차단되었습니다. 메인 재생 버튼을 수동으로 눌러주세요.".to_string()
        }
        PlaybackError::Failed(reason) => format!("재생 실패: {reason}."),
        PlaybackError::Closed => "재생 실패: 플레이어가 닫혔습니다.".to_string(),
    }
}

/// Validated, single-flight synthesis requests against a [`Backend`].
pub struct SpeechRequester<B: Backend> {
    backend: B,
    config: SpeechConfig,
    in_flight: AtomicBool,
    request_tx: watch::Sender<SpeechRequest>,
}

/// Clears the in-flight flag on drop; a request abandoned mid-flight is
/// marked failed rather than left loading.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    request_tx: &'a watch::Sender<SpeechRequest>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.request_tx.send_if_modified(|r| {
            if r.is_loading() {
                r.status = SpeechStatus::Failed;
                r.error_message = Some("음성 요청이 취소되었습니다.".into());
                true
            } else {
                false
            }
        });
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl<B: Backend> SpeechRequester<B> {
    pub fn new(backend: B, config: SpeechConfig) -> Self {
        let (request_tx, _) = watch::channel(SpeechRequest::idle());
        Self {
            backend,
            config,
            in_flight: AtomicBool::new(false),
            request_tx,
        }
    }

    /// Synthesize `text` and return the audio URL.
    pub async fn request_audio(&self, text: &str) -> Result<String, TtsError> {
        let _guard = self.begin()?;
        self.validate(text)?;
        self.synthesize(text).await
    }

    /// Synthesize `text` and hand the file to `sink`, named after
    /// `problem_title`. Returns the file name.
    pub async fn request_and_download<D: DownloadSink>(
        &self,
        text: &str,
        problem_title: Option<&str>,
        sink: &D,
    ) -> Result<String, TtsError> {
        let _guard = self.begin()?;
        self.validate(text)?;
        let url = self.synthesize(text).await?;

        let filename = download_filename(problem_title, &self.config.default_download_name);
        if let Err(e) = sink.download(&url, &filename).await {
            warn!("tts: download of {url} failed: {e}");
            let err = TtsError::Download(e);
            let message = err.to_string();
            self.update(|r| r.error_message = Some(message));
            return Err(err);
        }

        info!("tts: download triggered as {filename}");
        Ok(filename)
    }

    pub fn request(&self) -> SpeechRequest {
        self.request_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SpeechRequest> {
        self.request_tx.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// True when `text` may be sent for synthesis.
    pub fn is_valid_text(&self, text: &str) -> bool {
        !text.trim().is_empty() && text != self.config.placeholder_text
    }

    fn begin(&self) -> Result<InFlight<'_>, TtsError> {
        match self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Ok(InFlight {
                flag: &self.in_flight,
                request_tx: &self.request_tx,
            }),
            Err(_) => {
                debug!("tts: request already in flight, ignoring");
                Err(TtsError::Busy)
            }
        }
    }

    fn validate(&self, text: &str) -> Result<(), TtsError> {
        if self.is_valid_text(text) {
            return Ok(());
        }
        let err = TtsError::InvalidInput;
        self.request_tx.send_replace(SpeechRequest {
            text: text.to_string(),
            status: SpeechStatus::Failed,
            result_url: None,
            error_message: Some(err.to_string()),
        });
        Err(err)
    }

    async fn synthesize(&self, text: &str) -> Result<String, TtsError> {
        self.request_tx.send_replace(SpeechRequest {
            text: text.to_string(),
            status: SpeechStatus::Loading,
            result_url: None,
            error_message: None,
        });

        let request = SynthesizeRequest {
            text: text.to_string(),
            voice_name: self.config.voice_name.clone(),
            speaking_rate: self.config.speaking_rate,
        };

        match self.backend.synthesize(&request).await {
            Ok(url) => {
                debug!("tts: synthesized {url}");
                self.update(|r| {
                    r.status = SpeechStatus::Succeeded;
                    r.result_url = Some(url.clone());
                });
                Ok(url)
            }
            Err(e) => {
                let err = TtsError::Backend(e);
                warn!("tts: {err}");
                let message = err.to_string();
                self.update(|r| {
                    r.status = SpeechStatus::Failed;
                    r.error_message = Some(message);
                });
                Err(err)
            }
        }
    }

    fn update(&self, f: impl FnOnce(&mut SpeechRequest)) {
        self.request_tx.send_modify(f);
    }
}

/// A [`SpeechRequester`] wired to a transport for autoplay.
pub struct TtsOrchestrator<B: Backend, M: MediaResource> {
    speech: SpeechRequester<B>,
    transport: TransportController<M>,
}

impl<B: Backend, M: MediaResource> TtsOrchestrator<B, M> {
    pub fn new(backend: B, transport: TransportController<M>, config: SpeechConfig) -> Self {
        Self {
            speech: SpeechRequester::new(backend, config),
            transport,
        }
    }

    /// Synthesize `text`, load it into the transport and try to autoplay.
    pub async fn request_and_play(&self, text: &str) -> Result<(), TtsError> {
        let speech = &self.speech;
        let _guard = speech.begin()?;
        speech.validate(text)?;
        let url = speech.synthesize(text).await?;

        self.transport.load(&url);
        info!("tts: audio loaded, waiting for metadata");

        let outcome = match self.transport.metadata_ready().await {
            Ok(()) => self.transport.play().await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            let message = playback_message(&e);
            warn!("tts: autoplay failed: {e}");
            speech.update(|r| r.error_message = Some(message));
            return Err(TtsError::Playback(e));
        }

        info!("tts: playback started");
        Ok(())
    }

    /// See [`SpeechRequester::request_and_download`]; the transport is not
    /// touched.
    pub async fn request_and_download<D: DownloadSink>(
        &self,
        text: &str,
        problem_title: Option<&str>,
        sink: &D,
    ) -> Result<String, TtsError> {
        self.speech
            .request_and_download(text, problem_title, sink)
            .await
    }

    pub fn speech(&self) -> &SpeechRequester<B> {
        &self.speech
    }

    pub fn request(&self) -> SpeechRequest {
        self.speech.request()
    }

    pub fn subscribe(&self) -> watch::Receiver<SpeechRequest> {
        self.speech.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.speech.is_loading()
    }

    pub fn config(&self) -> &SpeechConfig {
        self.speech.config()
    }

    pub fn is_valid_text(&self, text: &str) -> bool {
        self.speech.is_valid_text(text)
    }
}

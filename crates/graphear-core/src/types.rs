//! Shared types for the graphear listening pipeline.
//!
//! These types are used across graphear-lib, graphear-app and graphear-cli.
//! Keeping them in graphear-core means consumers can depend on types without
//! pulling in tokio, reqwest, or axum.

use serde::{Deserialize, Serialize};

// ─── Player types ──────────────────────────────────────────────────────────

/// Transport configuration. Each player instance owns its own copy.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Playback multipliers, cycled in order by the speed button.
    pub speeds: Vec<f64>,
    pub initial_speed_index: usize,
    /// Seconds moved by the rewind/forward buttons and arrow keys.
    pub seek_step: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            speeds: vec![1.0, 1.5, 2.0, 0.5],
            initial_speed_index: 1,
            seek_step: 10.0,
        }
    }
}

impl PlayerConfig {
    /// Index that follows `index`, wrapping to the first entry after the last.
    pub fn next_speed_index(&self, index: usize) -> usize {
        if self.speeds.is_empty() {
            return 0;
        }
        (index + 1) % self.speeds.len()
    }

    /// Multiplier at `index`, or 1.0 for an out-of-range index.
    pub fn rate_at(&self, index: usize) -> f64 {
        self.speeds.get(index).copied().unwrap_or(1.0)
    }

    /// Button label such as `1.5x`.
    pub fn label_at(&self, index: usize) -> String {
        format!("{}x", self.rate_at(index))
    }
}

/// Observable playback state for one media resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub source_url: Option<String>,
    pub is_playing: bool,
    pub current_time: f64,
    /// `None` until metadata has loaded.
    pub duration: Option<f64>,
    pub speed_index: usize,
    pub playback_rate: f64,
    /// True while a seek gesture is in progress; the fill bar skips its
    /// smoothing transition.
    pub is_seeking: bool,
    pub progress_percent: f64,
}

impl PlaybackSnapshot {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            source_url: None,
            is_playing: false,
            current_time: 0.0,
            duration: None,
            speed_index: config.initial_speed_index,
            playback_rate: config.rate_at(config.initial_speed_index),
            is_seeking: false,
            progress_percent: 0.0,
        }
    }
}

// ─── Speech types ──────────────────────────────────────────────────────────

/// Fixed synthesis options plus the sentinel text the pages fall back to.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub voice_name: String,
    pub speaking_rate: f32,
    /// Text shown when nothing was extracted. Never sent for synthesis.
    pub placeholder_text: String,
    /// Download file stem used when the problem title sanitizes to nothing.
    pub default_download_name: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice_name: "ko-KR-Wavenet-B".into(),
            speaking_rate: 0.95,
            placeholder_text: "PDF에서 추출된 해설 텍스트가 없습니다. 기본 텍스트를 사용합니다.".into(),
            default_download_name: "explanation_tts".into(),
        }
    }
}

/// Lifecycle of a synthesis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechStatus {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// The most recent synthesis request of one orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    pub text: String,
    pub status: SpeechStatus,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

impl SpeechRequest {
    pub fn idle() -> Self {
        Self {
            text: String::new(),
            status: SpeechStatus::Idle,
            result_url: None,
            error_message: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == SpeechStatus::Loading
    }
}

// ─── Wire types ────────────────────────────────────────────────────────────

/// Body of `POST /api/synthesize-speech`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeRequest {
    pub text: String,
    pub voice_name: String,
    pub speaking_rate: f32,
}

/// Success body of `POST /api/synthesize-speech`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

/// Success body of `POST /api/extract-text`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Failure body shared by both endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Human-readable message, or `None` when the body carries neither field.
    pub fn message(&self) -> Option<String> {
        match (&self.error, &self.details) {
            (Some(e), Some(d)) => Some(format!("{e} (상세: {})", d.replace('"', ""))),
            (Some(e), None) => Some(e.clone()),
            (None, Some(d)) => Some(d.replace('"', "")),
            (None, None) => None,
        }
    }
}

/// One `[문항 N]` section of an extracted script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// 0 when the script carried no question headers.
    pub number: u32,
    /// The full header line, empty when there was none.
    pub header: String,
    pub body: String,
}

// ─── Navigation types ──────────────────────────────────────────────────────

/// State carried from the upload page to the audio page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavState {
    pub problem_title: Option<String>,
    pub extracted_text: Option<String>,
}

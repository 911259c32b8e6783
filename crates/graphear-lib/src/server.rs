//! Forwarding backend: PDF → script via the OCR model, text → mp3 via the
//! speech endpoint, and static hosting of the generated files.
//!
//! Runs on port 3001 by default. CORS-permissive so the listening pages can
//! call it from any local dev origin.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use graphear_core::text_prep::DEFAULT_MAX_CHUNK_LEN;
use graphear_core::types::{ErrorBody, ExtractResponse, SynthesizeResponse};

use crate::ocr::{GeminiOcr, OcrConfig};
use crate::tts::{SpeechSynthesizer, SynthConfig};

/// Upload cap for a single PDF.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub uploads_dir: PathBuf,
    /// Base used to build `audioUrl`s handed back to clients.
    pub public_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_url: String,
    pub gemini_model: String,
    pub tts_url: String,
    pub tts_lang: String,
    pub max_chunk_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let ocr = OcrConfig::default();
        let synth = SynthConfig::default();
        Self {
            host: "127.0.0.1".into(),
            port: 3001,
            uploads_dir: PathBuf::from("uploads"),
            public_url: "http://localhost:3001".into(),
            gemini_api_key: None,
            gemini_url: ocr.base_url,
            gemini_model: ocr.model,
            tts_url: synth.tts_url,
            tts_lang: synth.default_lang,
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to create uploads dir {path}: {source}")]
    UploadsDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid listen address {0}")]
    Addr(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[derive(Clone)]
pub struct ServerState {
    ocr: GeminiOcr,
    synth: SpeechSynthesizer,
    uploads_dir: PathBuf,
    public_url: String,
    seq: Arc<AtomicU64>,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> Self {
        let client = reqwest::Client::new();
        Self {
            ocr: GeminiOcr::new(
                client.clone(),
                OcrConfig {
                    api_key: config.gemini_api_key.clone(),
                    base_url: config.gemini_url.clone(),
                    model: config.gemini_model.clone(),
                },
            ),
            synth: SpeechSynthesizer::new(
                client,
                SynthConfig {
                    tts_url: config.tts_url.clone(),
                    default_lang: config.tts_lang.clone(),
                    max_chunk_len: config.max_chunk_len,
                },
            ),
            uploads_dir: config.uploads_dir.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_file_name(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("speech_{millis}_{seq}.mp3")
    }
}

/// Build the axum router over a shared [`ServerState`].
pub fn router(state: ServerState) -> Router {
    let uploads = ServeDir::new(&state.uploads_dir);
    Router::new()
        .route("/api/extract-text", post(extract_text))
        .route("/api/synthesize-speech", post(synthesize_speech))
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create the uploads dir, bind and serve until the process exits.
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    tokio::fs::create_dir_all(&config.uploads_dir)
        .await
        .map_err(|source| ServerError::UploadsDir {
            path: config.uploads_dir.clone(),
            source,
        })?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::Addr(format!("{}:{}", config.host, config.port)))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    if config.gemini_api_key.is_none() {
        warn!("no Gemini API key configured; /api/extract-text will fail");
    }
    info!("graphear backend listening on http://{addr}");

    axum::serve(listener, router(ServerState::new(&config)))
        .await
        .map_err(ServerError::Serve)
}

// ─── Errors ────────────────────────────────────────────────────────────────

struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn bad_request(error: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::new(error),
        }
    }

    fn internal(error: &str, details: impl ToString) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody::new(error).with_details(details.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ─── Handlers ──────────────────────────────────────────────────────────────

async fn extract_text(
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let mut pdf = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(&format!("malformed upload: {e}")))?
    {
        if field.name() != Some("pdfFile") {
            continue;
        }
        let mime = field
            .content_type()
            .unwrap_or("application/pdf")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(&format!("malformed upload: {e}")))?;
        pdf = Some((bytes, mime));
        break;
    }

    let Some((bytes, mime)) = pdf.filter(|(b, _)| !b.is_empty()) else {
        return Err(ApiError::bad_request("파일 없음"));
    };

    info!("extract: {} bytes ({mime})", bytes.len());
    match state.ocr.extract(&bytes, &mime).await {
        Ok(text) => Ok(Json(ExtractResponse { text: Some(text) })),
        Err(e) => {
            error!("extract: OCR failed: {e}");
            Err(ApiError::internal("변환 실패", e))
        }
    }
}

/// Only `text` is required; the voice options are advisory.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechBody {
    #[serde(default)]
    text: String,
    #[serde(default)]
    voice_name: Option<String>,
}

async fn synthesize_speech(
    State(state): State<ServerState>,
    Json(body): Json<SpeechBody>,
) -> Result<Json<SynthesizeResponse>, ApiError> {
    if body.text.trim().is_empty() {
        return Err(ApiError::bad_request("텍스트가 없습니다."));
    }

    let lang = match body.voice_name.as_deref() {
        Some(voice) => state.synth.lang_for_voice(voice),
        None => state.synth.lang_for_voice(""),
    };
    info!("synthesize: {} chars ({lang})", body.text.chars().count());

    let audio = state.synth.synthesize(&body.text, &lang).await.map_err(|e| {
        error!("synthesize: {e}");
        ApiError::internal("오디오 생성 실패", e)
    })?;

    let file_name = state.next_file_name();
    let path = state.uploads_dir.join(&file_name);
    tokio::fs::create_dir_all(&state.uploads_dir)
        .await
        .map_err(|e| ApiError::internal("오디오 생성 실패", e))?;
    tokio::fs::write(&path, &audio)
        .await
        .map_err(|e| ApiError::internal("오디오 생성 실패", e))?;

    info!("synthesize: wrote {} ({} bytes)", path.display(), audio.len());
    Ok(Json(SynthesizeResponse {
        audio_url: Some(format!("{}/uploads/{file_name}", state.public_url)),
    }))
}

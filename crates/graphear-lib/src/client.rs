//! HTTP client for the graphear backend — text extraction and speech
//! synthesis.
//!
//! Both endpoints may be slow or fail. Failure bodies look like
//! `{ "error": "...", "details": "..." }`; when a failure body is not JSON the
//! message falls back to the HTTP status.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use graphear_core::types::{ErrorBody, ExtractResponse, SynthesizeRequest, SynthesizeResponse};

/// Where the backend lives and how long to wait for it.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Whole-request timeout. Synthesis of a long exam script can take a while.
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".into(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// The request never completed (connection refused, timeout, reset).
    #[error("네트워크 오류: {0}")]
    Network(String),
    /// Non-2xx answer; `message` comes from the body when it has one.
    #[error("서버 오류 ({status}): {message}")]
    Server { status: u16, message: String },
    /// A 2xx answer whose body is not the expected JSON.
    #[error("서버 응답을 JSON으로 처리하는 데 실패했습니다: {0}")]
    Decode(String),
    /// A 2xx JSON answer without the field the caller needs.
    #[error("서버 응답 형식 오류: {0} 필드를 받지 못했습니다.")]
    MissingField(&'static str),
}

/// The two backend operations the listening pipeline depends on.
pub trait Backend: Send + Sync {
    /// Synthesize speech; resolves to a playable audio URL.
    fn synthesize(
        &self,
        request: &SynthesizeRequest,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    /// Extract readable text from a PDF.
    fn extract_text(
        &self,
        pdf: Vec<u8>,
        file_name: &str,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;
}

/// [`Backend`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Backend for HttpBackend {
    async fn synthesize(&self, request: &SynthesizeRequest) -> Result<String, BackendError> {
        let url = format!("{}/api/synthesize-speech", self.base_url);
        debug!("backend: POST {url} ({} chars)", request.text.chars().count());

        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: SynthesizeResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        body.audio_url
            .filter(|u| !u.is_empty())
            .ok_or(BackendError::MissingField("audioUrl"))
    }

    async fn extract_text(&self, pdf: Vec<u8>, file_name: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/extract-text", self.base_url);
        debug!("backend: POST {url} ({} bytes)", pdf.len());

        let part = reqwest::multipart::Part::bytes(pdf)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| BackendError::Network(format!("mime error: {e}")))?;
        let form = reqwest::multipart::Form::new().part("pdfFile", part);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: ExtractResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        body.text.ok_or(BackendError::MissingField("text"))
    }
}

/// Build a [`BackendError::Server`] from a failed response, preferring the
/// message in its JSON body.
async fn error_from_response(resp: reqwest::Response) -> BackendError {
    let status = resp.status();
    let fallback = match status.canonical_reason() {
        Some(reason) => format!("서버 오류: {} {reason}", status.as_u16()),
        None => format!("서버 오류: {}", status.as_u16()),
    };
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.message().unwrap_or(fallback),
        Err(e) => {
            warn!("backend: unreadable error body for {status}: {e}");
            fallback
        }
    };
    BackendError::Server {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_mock;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    fn request(text: &str) -> SynthesizeRequest {
        SynthesizeRequest {
            text: text.into(),
            voice_name: "ko-KR-Wavenet-B".into(),
            speaking_rate: 0.95,
        }
    }

    async fn backend_for(router: Router) -> HttpBackend {
        let base_url = spawn_mock(router).await;
        HttpBackend::new(&BackendConfig {
            base_url,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn synthesize_returns_audio_url_and_sends_fixed_options() {
        let router = Router::new().route(
            "/api/synthesize-speech",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["voiceName"], "ko-KR-Wavenet-B");
                assert_eq!(body["text"], "hello");
                Json(serde_json::json!({ "audioUrl": "http://host/f.mp3" }))
            }),
        );
        let backend = backend_for(router).await;
        assert_eq!(
            backend.synthesize(&request("hello")).await.unwrap(),
            "http://host/f.mp3"
        );
    }

    #[tokio::test]
    async fn server_error_uses_body_message() {
        let router = Router::new().route(
            "/api/synthesize-speech",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "boom" })),
                )
            }),
        );
        let backend = backend_for(router).await;
        let err = backend.synthesize(&request("hello")).await.unwrap_err();
        assert_eq!(
            err,
            BackendError::Server {
                status: 500,
                message: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn non_json_error_body_falls_back_to_status() {
        let router = Router::new().route(
            "/api/synthesize-speech",
            post(|| async { (StatusCode::BAD_GATEWAY, "<html>upstream down</html>") }),
        );
        let backend = backend_for(router).await;
        let err = backend.synthesize(&request("hello")).await.unwrap_err();
        match err {
            BackendError::Server { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "서버 오류: 502 Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_audio_url_is_a_format_error() {
        let router = Router::new().route(
            "/api/synthesize-speech",
            post(|| async { Json(serde_json::json!({ "ok": true })) }),
        );
        let backend = backend_for(router).await;
        let err = backend.synthesize(&request("hello")).await.unwrap_err();
        assert_eq!(err, BackendError::MissingField("audioUrl"));
        assert!(err.to_string().contains("서버 응답 형식 오류"));
    }

    #[tokio::test]
    async fn unparseable_success_body_is_a_decode_error() {
        let router = Router::new().route(
            "/api/synthesize-speech",
            post(|| async { "not json" }),
        );
        let backend = backend_for(router).await;
        let err = backend.synthesize(&request("hello")).await.unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::new(&BackendConfig {
            base_url: format!("http://{addr}"),
            ..Default::default()
        })
        .unwrap();
        let err = backend.synthesize(&request("hello")).await.unwrap_err();
        assert!(matches!(err, BackendError::Network(_)));
    }

    #[tokio::test]
    async fn extract_text_posts_multipart_pdf() {
        let router = Router::new().route(
            "/api/extract-text",
            post(|mut multipart: axum::extract::Multipart| async move {
                let field = multipart.next_field().await.unwrap().unwrap();
                assert_eq!(field.name(), Some("pdfFile"));
                assert_eq!(field.file_name(), Some("exam.pdf"));
                let bytes = field.bytes().await.unwrap();
                assert_eq!(&bytes[..], b"%PDF-1.7");
                Json(serde_json::json!({ "text": "1번 문제" }))
            }),
        );
        let backend = backend_for(router).await;
        let text = backend
            .extract_text(b"%PDF-1.7".to_vec(), "exam.pdf")
            .await
            .unwrap();
        assert_eq!(text, "1번 문제");
    }

    #[tokio::test]
    async fn extract_error_includes_details() {
        let router = Router::new().route(
            "/api/extract-text",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "error": "변환 실패",
                        "details": "quota exceeded",
                    })),
                )
            }),
        );
        let backend = backend_for(router).await;
        let err = backend.extract_text(vec![1, 2, 3], "a.pdf").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "서버 오류 (500): 변환 실패 (상세: quota exceeded)"
        );
    }
}

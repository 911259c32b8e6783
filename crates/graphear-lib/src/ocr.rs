//! PDF → spoken-script conversion through a Gemini `generateContent` call.
//!
//! The PDF travels inline as base64. The prompt asks for a plain-text script
//! a screen-reader user can listen to from start to finish, with every
//! formula spelled out in Korean pronunciation.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SYSTEM_INSTRUCTION: &str = "당신은 전문적인 OCR 및 텍스트 추출기입니다. \
사용자의 지시를 철저히 따르며, 문단 또는 문항 구분이 바뀔 때와 문장이 끝나는 문장 부호마다 \
줄 바꿈 문자(\\n)를 삽입하여 가독성을 높여야 합니다. \
모든 텍스트 추출은 사용자가 지정한 형식에 엄격하게 맞추어 출력해야 합니다.";

const SCRIPT_PROMPT: &str = "\
당신은 시각장애인 수험생을 위해 수학 문제지를 읽어주는 AI 성우입니다.
제공된 문제지를 분석하여, 별도의 포맷팅(JSON, 마크다운 코드블록 등) 없이 처음부터 끝까지 \
쭉 읽을 수 있는 구어체 대본 형태의 텍스트로 변환하십시오.

# 1. 출력 형식
- JSON이나 특수기호, 불필요한 서론/결론을 포함하지 마십시오.
- 문제의 내용만 듣기 편한 줄글 형태로 출력하십시오.
- 문제와 문제 사이에는 줄바꿈을 두 번 넣으십시오.

# 2. 수식 및 기호
- 모든 수식은 LaTeX 코드가 아닌 한글 발음으로 풀어서 작성하십시오.
- '$' 기호를 사용하지 마십시오.
- 예: f(x) = x^2 + 3x → \"함수 에프 엑스는, 엑스의 제곱 더하기 3엑스\"
- 예: 1/2 → \"2분의 1\" (분모 먼저)
- 예: a_n → \"수열 a n\", 시그마 k=1..n → \"시그마 k는 1부터 n까지\"
- 예: ≤, ≥ → \"작거나 같다\", \"크거나 같다\"; 선분 AB → \"선분 A B\"

# 3. 읽는 순서
1. 문항 번호: \"1번 문제,\" 와 같이 시작.
2. 그래프나 도형이 있으면 본문보다 먼저 묘사하십시오.
3. 본문: 쉼표와 마침표로 끊어 읽기 좋게 쓰고, 밑줄은 \"밑줄 시작\", \"밑줄 끝\"으로 언급하십시오.
4. 선택지: \"1번, 내용, 2번, 내용, 3번, 내용, 4번, 내용, 5번, 내용,\"

# 4. 제외
- 손글씨 풀이 흔적, 페이지 번호, 머리말/꼬리말은 읽지 마십시오.
";

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("no Gemini API key configured")]
    MissingKey,
    #[error("Gemini request failed: {0}")]
    Request(String),
    #[error("Gemini returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Gemini returned no text")]
    Empty,
}

/// Connection settings for the OCR model.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-2.5-flash".into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    Text(&'a str),
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
        data: String,
    },
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiOcr {
    client: reqwest::Client,
    config: OcrConfig,
}

impl GeminiOcr {
    pub fn new(client: reqwest::Client, config: OcrConfig) -> Self {
        Self { client, config }
    }

    /// Convert a PDF into a listening script.
    pub async fn extract(&self, pdf: &[u8], mime_type: &str) -> Result<String, OcrError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(OcrError::MissingKey)?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let body = GenerateRequest {
            system_instruction: Content {
                parts: vec![Part::Text(SYSTEM_INSTRUCTION)],
            },
            contents: [Content {
                parts: vec![
                    Part::InlineData {
                        mime_type,
                        data: base64::engine::general_purpose::STANDARD.encode(pdf),
                    },
                    Part::Text(SCRIPT_PROMPT),
                ],
            }],
        };

        debug!("ocr: POST {url} ({} bytes)", pdf.len());
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OcrError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("ocr: {status}: {body}");
            return Err(OcrError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| OcrError::Request(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(OcrError::Empty);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_mock;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    fn ocr(base_url: String, key: Option<&str>) -> GeminiOcr {
        GeminiOcr::new(
            reqwest::Client::new(),
            OcrConfig {
                api_key: key.map(str::to_string),
                base_url,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn sends_inline_pdf_and_joins_parts() {
        let router = Router::new().route(
            "/v1beta/models/gemini-2.5-flash:generateContent",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                assert_eq!(headers["x-goog-api-key"], "k");
                let parts = &body["contents"][0]["parts"];
                assert_eq!(parts[0]["inlineData"]["mimeType"], "application/pdf");
                assert_eq!(parts[0]["inlineData"]["data"], "JVBERg==");
                assert!(body["systemInstruction"]["parts"][0]["text"].is_string());
                Json(serde_json::json!({
                    "candidates": [{ "content": { "parts": [
                        { "text": "1번 문제,\n" },
                        { "text": "다음 중 옳은 것은?" }
                    ] } }]
                }))
            }),
        );
        let base = spawn_mock(router).await;

        let text = ocr(base, Some("k"))
            .extract(b"%PDF", "application/pdf")
            .await
            .unwrap();
        assert_eq!(text, "1번 문제,\n다음 중 옳은 것은?");
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let err = ocr("http://127.0.0.1:9".into(), None)
            .extract(b"%PDF", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::MissingKey));
    }

    #[tokio::test]
    async fn upstream_error_and_empty_answer() {
        let router = Router::new()
            .route(
                "/v1beta/models/gemini-2.5-flash:generateContent",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exceeded") }),
            )
            .route(
                "/v1beta/models/other:generateContent",
                post(|| async { Json(serde_json::json!({ "candidates": [] })) }),
            );
        let base = spawn_mock(router).await;

        let err = ocr(base.clone(), Some("k"))
            .extract(b"%PDF", "application/pdf")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Gemini returned 429: quota exceeded");

        let other = GeminiOcr::new(
            reqwest::Client::new(),
            OcrConfig {
                api_key: Some("k".into()),
                base_url: base,
                model: "other".into(),
            },
        );
        let err = other.extract(b"%PDF", "application/pdf").await.unwrap_err();
        assert!(matches!(err, OcrError::Empty));
    }
}

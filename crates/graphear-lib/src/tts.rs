//! Speech synthesizer — prepared text → chunked translate-style TTS fetches →
//! one concatenated mp3.
//!
//! ```text
//! synthesize("text", lang)
//!     → prepare_for_speech: strip markup, newlines → spoken pauses
//!     → split_text: ≤ max_chunk_len chars per chunk
//!     → GET tts_url?ie=UTF-8&client=tw-ob&tl=<lang>&q=<chunk>   (sequential)
//!     → mp3 frames appended in order
//! ```
//!
//! MP3 frames are self-delimiting, so concatenating the per-chunk bodies
//! yields a single playable file.

use futures_util::StreamExt;
use tracing::{debug, warn};

use graphear_core::text_prep::{prepare_for_speech, split_text, DEFAULT_MAX_CHUNK_LEN};

#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("nothing to synthesize")]
    Empty,
    #[error("speech request failed for chunk {index}: {reason}")]
    Request { index: usize, reason: String },
    #[error("speech endpoint returned {status} for chunk {index}")]
    Status { index: usize, status: u16 },
}

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub tts_url: String,
    /// Fallback language when a voice name carries none.
    pub default_lang: String,
    pub max_chunk_len: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            tts_url: "https://translate.google.com/translate_tts".into(),
            default_lang: "ko".into(),
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
        }
    }
}

/// Cloneable handle; the HTTP client is shared.
#[derive(Debug, Clone)]
pub struct SpeechSynthesizer {
    client: reqwest::Client,
    config: SynthConfig,
}

impl SpeechSynthesizer {
    pub fn new(client: reqwest::Client, config: SynthConfig) -> Self {
        Self { client, config }
    }

    /// Language code for a voice name: `ko-KR-Wavenet-B` → `ko`.
    pub fn lang_for_voice(&self, voice_name: &str) -> String {
        voice_name
            .split('-')
            .next()
            .filter(|l| (2..=3).contains(&l.len()) && l.chars().all(|c| c.is_ascii_alphabetic()))
            .map(|l| l.to_ascii_lowercase())
            .unwrap_or_else(|| self.config.default_lang.clone())
    }

    /// Synthesize `text` into mp3 bytes.
    pub async fn synthesize(&self, text: &str, lang: &str) -> Result<Vec<u8>, SynthError> {
        let prepared = prepare_for_speech(text);
        let chunks = split_text(&prepared, self.config.max_chunk_len);
        if chunks.is_empty() {
            return Err(SynthError::Empty);
        }
        debug!("tts: {} chunks ({lang})", chunks.len());

        let total = chunks.len();
        let mut audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            self.fetch_chunk(index, chunk, lang, total, &mut audio).await?;
        }
        debug!("tts: {} bytes of audio", audio.len());
        Ok(audio)
    }

    async fn fetch_chunk(
        &self,
        index: usize,
        chunk: &str,
        lang: &str,
        total: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), SynthError> {
        let idx = index.to_string();
        let textlen = chunk.chars().count().to_string();
        let total = total.to_string();
        let resp = self
            .client
            .get(&self.config.tts_url)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", lang),
                ("q", chunk),
                ("idx", idx.as_str()),
                ("total", total.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SynthError::Request {
                index,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            warn!("tts: chunk {index} failed with {}", resp.status());
            return Err(SynthError::Status {
                index,
                status: resp.status().as_u16(),
            });
        }

        let mut stream = resp.bytes_stream();
        while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| SynthError::Request {
                index,
                reason: e.to_string(),
            })?;
            out.extend_from_slice(&bytes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_mock;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;

    fn synth(tts_url: String, max_chunk_len: usize) -> SpeechSynthesizer {
        SpeechSynthesizer::new(
            reqwest::Client::new(),
            SynthConfig {
                tts_url,
                max_chunk_len,
                ..Default::default()
            },
        )
    }

    #[test]
    fn language_comes_from_voice_prefix() {
        let s = SpeechSynthesizer::new(reqwest::Client::new(), SynthConfig::default());
        assert_eq!(s.lang_for_voice("ko-KR-Wavenet-B"), "ko");
        assert_eq!(s.lang_for_voice("EN-us-Standard-A"), "en");
        assert_eq!(s.lang_for_voice(""), "ko");
        assert_eq!(s.lang_for_voice("Wavenet"), "ko");
    }

    #[tokio::test]
    async fn chunks_are_fetched_in_order_and_concatenated() {
        let router = Router::new().route(
            "/tts",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q["tl"], "ko");
                assert_eq!(q["client"], "tw-ob");
                assert!(q["q"].chars().count() <= 20);
                q["idx"].clone().into_bytes()
            }),
        );
        let base = spawn_mock(router).await;

        let text = "첫 번째 문장입니다. 두 번째 문장입니다. 세 번째 문장입니다.";
        let audio = synth(format!("{base}/tts"), 20)
            .synthesize(text, "ko")
            .await
            .unwrap();
        assert_eq!(audio, b"012");
    }

    #[tokio::test]
    async fn markup_only_text_is_empty() {
        let s = synth("http://127.0.0.1:9/tts".into(), 100);
        assert!(matches!(s.synthesize("$$ ** **", "ko").await, Err(SynthError::Empty)));
    }

    #[tokio::test]
    async fn upstream_failure_names_the_chunk() {
        let router = Router::new().route("/tts", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let base = spawn_mock(router).await;

        let err = synth(format!("{base}/tts"), 100)
            .synthesize("안녕하세요", "ko")
            .await
            .unwrap_err();
        assert!(matches!(err, SynthError::Status { index: 0, status: 503 }));
    }
}

//! graphear-lib — Listening engine.
//!
//! Transport control, seek gestures, TTS orchestration, the backend client,
//! file downloads and the forwarding backend (OCR + speech synthesis).
//! Depends on graphear-core for pure types and text processing.

pub mod client;
pub mod download;
pub mod media;
pub mod ocr;
pub mod orchestrator;
pub mod seek;
pub mod server;
pub mod transport;
pub mod tts;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export graphear-core for convenience
pub use graphear_core;

//! Upload page — pick a PDF, convert it to a listening script.

use tracing::{info, warn};

use graphear_core::types::NavState;
use graphear_lib::client::{Backend, BackendError};

use crate::state::Route;

pub const NOT_A_PDF: &str = "PDF 파일(.pdf)만 선택할 수 있습니다.";
pub const NO_FILE: &str = "업로드할 PDF 파일을 선택해 주세요.";

#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub struct UploadPage<B: Backend> {
    backend: B,
    file: Option<SelectedFile>,
    extracted_text: Option<String>,
    is_loading: bool,
    error: Option<String>,
}

impl<B: Backend> UploadPage<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            file: None,
            extracted_text: None,
            is_loading: false,
            error: None,
        }
    }

    /// Accept a selection when it is a PDF; anything else clears the
    /// selection and shows an error.
    pub fn select_file(&mut self, name: &str, mime: &str, bytes: Vec<u8>) -> bool {
        let is_pdf = mime == "application/pdf" || name.to_ascii_lowercase().ends_with(".pdf");
        if is_pdf {
            self.file = Some(SelectedFile {
                name: name.to_string(),
                bytes,
            });
            self.error = None;
            self.extracted_text = None;
        } else {
            self.file = None;
            self.error = Some(NOT_A_PDF.into());
        }
        is_pdf
    }

    pub fn can_convert(&self) -> bool {
        self.file.is_some() && !self.is_loading
    }

    /// Send the selected PDF for extraction. On success returns the state to
    /// hand to the audio page.
    pub async fn convert(&mut self) -> Option<NavState> {
        let Some(file) = self.file.clone() else {
            self.error = Some(NO_FILE.into());
            return None;
        };
        if self.is_loading {
            return None;
        }

        self.is_loading = true;
        self.error = None;
        self.extracted_text = None;

        let result = self.backend.extract_text(file.bytes, &file.name).await;
        self.is_loading = false;

        match result {
            Ok(text) => {
                info!("upload: extracted {} chars from {}", text.chars().count(), file.name);
                self.extracted_text = Some(text.clone());
                Some(NavState {
                    problem_title: Some(title_from_file_name(&file.name)),
                    extracted_text: Some(text),
                })
            }
            Err(e) => {
                warn!("upload: extraction failed: {e}");
                self.error = Some(error_message(&e));
                None
            }
        }
    }

    pub fn go_back(&self) -> Route {
        Route::Home
    }

    pub fn selected_file_name(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.name.as_str())
    }

    pub fn extracted_text(&self) -> Option<&str> {
        self.extracted_text.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

fn title_from_file_name(name: &str) -> String {
    let stem = match name.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case("pdf") && !stem.is_empty() => stem,
        _ => name,
    };
    stem.to_string()
}

fn error_message(err: &BackendError) -> String {
    match err {
        BackendError::Network(reason) => {
            format!("네트워크 오류가 발생했습니다 ({reason}). 서버가 실행 중인지 확인하세요.")
        }
        BackendError::Server { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphear_lib::testing::FakeBackend;

    fn page() -> UploadPage<FakeBackend> {
        UploadPage::new(FakeBackend::returning("http://host/f.mp3"))
    }

    #[test]
    fn only_pdfs_are_accepted() {
        let mut page = page();
        assert!(!page.select_file("notes.txt", "text/plain", vec![1]));
        assert_eq!(page.error(), Some(NOT_A_PDF));
        assert!(!page.can_convert());

        assert!(page.select_file("exam.pdf", "application/pdf", vec![1]));
        assert_eq!(page.error(), None);
        assert_eq!(page.selected_file_name(), Some("exam.pdf"));

        assert!(page.select_file("SCAN.PDF", "application/octet-stream", vec![1]));
        assert!(!page.select_file("image.png", "image/png", vec![1]));
        assert_eq!(page.selected_file_name(), None);
    }

    #[tokio::test]
    async fn convert_without_file_asks_for_one() {
        let mut page = page();
        assert_eq!(page.convert().await, None);
        assert_eq!(page.error(), Some(NO_FILE));
    }

    #[tokio::test]
    async fn convert_hands_text_to_the_audio_page() {
        let mut page = page();
        page.select_file("2026 모의고사.pdf", "application/pdf", b"%PDF".to_vec());
        let nav = page.convert().await.unwrap();

        assert_eq!(nav.problem_title.as_deref(), Some("2026 모의고사"));
        assert_eq!(nav.extracted_text.as_deref(), page.extracted_text());
        assert!(!page.is_loading());
        assert!(page.can_convert());
    }

    #[tokio::test]
    async fn server_error_message_is_shown() {
        let backend = FakeBackend::returning("").with_extract_result(Err(BackendError::Server {
            status: 500,
            message: "변환 실패 (상세: quota)".into(),
        }));
        let mut page = UploadPage::new(backend);
        page.select_file("a.pdf", "application/pdf", vec![1]);

        assert_eq!(page.convert().await, None);
        assert_eq!(page.error(), Some("변환 실패 (상세: quota)"));
        assert_eq!(page.extracted_text(), None);
        assert!(!page.is_loading());
    }

    #[tokio::test]
    async fn network_error_points_at_the_server() {
        let backend = FakeBackend::returning("")
            .with_extract_result(Err(BackendError::Network("connection refused".into())));
        let mut page = UploadPage::new(backend);
        page.select_file("a.pdf", "application/pdf", vec![1]);

        page.convert().await;
        assert!(page.error().unwrap().contains("서버가 실행 중인지 확인하세요"));
    }
}

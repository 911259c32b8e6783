//! graphear-app — page shells for the upload and listening screens.
//!
//! Each page owns its state and talks to the backend through
//! graphear-lib's [`Backend`](graphear_lib::client::Backend) seam. The host
//! renders from the getters and forwards input events.

pub mod audio_page;
pub mod state;
pub mod upload_page;

pub use audio_page::{AudioPage, Key};
pub use state::{Navigator, Route};
pub use upload_page::UploadPage;

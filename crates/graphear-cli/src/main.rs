//! graphear CLI — backend server and client commands.
//!
//! ```text
//! graphear serve [--port 3001] [--host 127.0.0.1] [--uploads-dir uploads]
//! graphear extract exam.pdf [--server http://localhost:3001]
//! graphear speak "1번 문제, ..." [--server ...]
//! graphear download "1번 문제, ..." [--title "2026 모의고사"] [--out .]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use graphear_core::text_prep::DEFAULT_MAX_CHUNK_LEN;
use graphear_core::types::{SpeechConfig, SynthesizeResponse};
use graphear_lib::client::{Backend, BackendConfig, HttpBackend};
use graphear_lib::download::HttpDownloadSink;
use graphear_lib::orchestrator::SpeechRequester;
use graphear_lib::server::{self, ServerConfig};

/// graphear — PDF exam scripts as speech
#[derive(Parser)]
#[command(name = "graphear", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ClientArgs {
    /// Backend URL
    #[arg(long, env = "GRAPHEAR_SERVER", default_value = "http://localhost:3001")]
    server: String,
    /// Request timeout in seconds
    #[arg(long, default_value = "120")]
    timeout_secs: u64,
}

impl ClientArgs {
    fn backend(&self) -> Result<HttpBackend, String> {
        HttpBackend::new(&BackendConfig {
            base_url: self.server.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
        .map_err(|e| e.to_string())
    }

    fn speech(&self) -> Result<SpeechRequester<HttpBackend>, String> {
        Ok(SpeechRequester::new(self.backend()?, SpeechConfig::default()))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Start the graphear backend
    Serve {
        /// Listen port
        #[arg(long, default_value = "3001")]
        port: u16,
        /// Listen host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Where synthesized audio is written and served from
        #[arg(long, default_value = "uploads")]
        uploads_dir: PathBuf,
        /// Base URL used in returned audio links [default: http://localhost:<port>]
        #[arg(long)]
        public_url: Option<String>,
        /// Gemini API key used for PDF extraction
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        gemini_key: Option<String>,
        /// Gemini API base URL
        #[arg(long, default_value = "https://generativelanguage.googleapis.com")]
        gemini_url: String,
        /// Gemini model
        #[arg(long, default_value = "gemini-2.5-flash")]
        gemini_model: String,
        /// Speech endpoint
        #[arg(long, default_value = "https://translate.google.com/translate_tts")]
        tts_url: String,
        /// Fallback speech language
        #[arg(long, default_value = "ko")]
        tts_lang: String,
        /// Max characters per speech request
        #[arg(long, default_value_t = DEFAULT_MAX_CHUNK_LEN)]
        max_chunk_len: usize,
    },
    /// Extract a listening script from a PDF
    Extract {
        /// PDF file
        pdf: PathBuf,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Synthesize speech and print the audio URL
    Speak {
        /// Text to speak
        text: String,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Synthesize speech and save the mp3
    Download {
        /// Text to speak
        text: String,
        /// Problem title used for the file name
        #[arg(long)]
        title: Option<String>,
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graphear_lib=debug,graphear_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Serve {
            port,
            host,
            uploads_dir,
            public_url,
            gemini_key,
            gemini_url,
            gemini_model,
            tts_url,
            tts_lang,
            max_chunk_len,
        } => {
            let config = ServerConfig {
                public_url: public_url.unwrap_or_else(|| format!("http://localhost:{port}")),
                host,
                port,
                uploads_dir,
                gemini_api_key: gemini_key,
                gemini_url,
                gemini_model,
                tts_url,
                tts_lang,
                max_chunk_len,
            };
            server::serve(config).await.map_err(|e| e.to_string())
        }

        Command::Extract { pdf, client } => {
            let bytes = tokio::fs::read(&pdf)
                .await
                .map_err(|e| format!("failed to read {}: {e}", pdf.display()))?;
            let name = pdf
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.pdf".into());
            let text = client
                .backend()?
                .extract_text(bytes, &name)
                .await
                .map_err(|e| e.to_string())?;
            println!("{text}");
            Ok(())
        }

        Command::Speak { text, client } => {
            let audio_url = client
                .speech()?
                .request_audio(&text)
                .await
                .map_err(|e| e.to_string())?;
            let body = SynthesizeResponse {
                audio_url: Some(audio_url),
            };
            let json = serde_json::to_string_pretty(&body).map_err(|e| e.to_string())?;
            println!("{json}");
            Ok(())
        }

        Command::Download {
            text,
            title,
            out,
            client,
        } => {
            let sink = HttpDownloadSink::new(&out);
            let filename = client
                .speech()?
                .request_and_download(&text, title.as_deref(), &sink)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", out.join(filename).display());
            Ok(())
        }
    }
}

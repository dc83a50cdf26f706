use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stt_stream::{Config, HttpSessionApi, NoPayment, PaymentAuthorizer, StaticHeader, SttClient};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stt-stream", version, about = "Stream audio to a paid realtime speech-to-text service")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config/stt-stream.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream a 16kHz mono 16-bit WAV file and print the transcript
    Transcribe {
        file: PathBuf,

        /// Minutes to purchase (defaults to the configured value)
        #[arg(short, long)]
        minutes: Option<u32>,

        /// Language code (defaults to the configured value)
        #[arg(short, long)]
        language: Option<String>,

        /// Do not buy more time when the session runs low
        #[arg(long)]
        no_auto_extend: bool,
    },
    /// Show current pricing
    Pricing,
    /// Check service health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    info!("Using service at {}", cfg.server.url);

    let authorizer: Arc<dyn PaymentAuthorizer> = match (&cfg.payment.header, &cfg.payment.value) {
        (Some(header), Some(value)) => Arc::new(StaticHeader::new(header, value)),
        _ => Arc::new(NoPayment),
    };
    let api = HttpSessionApi::new(&cfg.server.url, authorizer);
    let mut stream_config = cfg.stream_config();

    match cli.command {
        Command::Transcribe {
            file,
            minutes,
            language,
            no_auto_extend,
        } => {
            if let Some(language) = language {
                stream_config.language = language;
            }
            if no_auto_extend {
                stream_config.auto_extend = false;
            }
            let client = SttClient::new(api, stream_config);
            let minutes = minutes.unwrap_or(cfg.session.minutes);

            let transcriptions = client
                .transcribe_file(&file, minutes)
                .await
                .with_context(|| format!("Failed to transcribe {}", file.display()))?;

            for transcription in transcriptions {
                if transcription.is_final {
                    println!("{}", transcription.text);
                } else {
                    debug!("partial: {}", transcription.text);
                }
            }
        }
        Command::Pricing => {
            let pricing = SttClient::new(api, stream_config).pricing().await?;
            println!("{}", serde_json::to_string_pretty(&pricing)?);
        }
        Command::Health => {
            let health = SttClient::new(api, stream_config).health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }

    Ok(())
}

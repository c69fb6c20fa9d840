use anyhow::{Context, Result};
use clap::Parser;
use rt_transcriber::models::transcript_text;
use rt_transcriber::{FileConfig, SslMode, TranscriptionClient};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Stream an audio file to a real-time transcription server and print the transcript
#[derive(Debug, Parser)]
#[command(name = "rt-transcriber", version)]
struct Cli {
    /// Audio file to transcribe, or `-` for stdin
    file: PathBuf,

    /// WebSocket URL of the server, e.g. wss://localhost:9000/v2
    #[arg(long)]
    url: Option<String>,

    #[arg(long, value_enum)]
    ssl_mode: Option<SslMode>,

    /// Language code of the audio
    #[arg(long = "lang")]
    language: Option<String>,

    /// Print partial transcripts as they arrive
    #[arg(long)]
    enable_partials: bool,

    /// Maximum delay in seconds before a final transcript is emitted
    #[arg(long)]
    max_delay: Option<f64>,

    #[arg(long)]
    operating_point: Option<String>,

    /// Bytes of audio per message
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Sample rate of raw audio
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Raw sample encoding (e.g. pcm_s16le); omit to send the file as is
    #[arg(long)]
    encoding: Option<String>,

    /// Maximum number of unacknowledged audio messages
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Give up on the whole session after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Configuration file (defaults to the user configuration directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> FileConfig {
        FileConfig {
            url: self.url.clone(),
            ssl_mode: self.ssl_mode,
            language: self.language.clone(),
            enable_partials: self.enable_partials.then_some(true),
            max_delay: self.max_delay,
            operating_point: self.operating_point.clone(),
            chunk_size: self.chunk_size,
            sample_rate: self.sample_rate,
            encoding: self.encoding.clone(),
            buffer_size: self.buffer_size,
            semaphore_timeout_secs: None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::load_default()?,
    };
    let config = file_config.merge(&cli.overrides());

    let settings = config
        .connection_settings()
        .context("No server URL given; pass --url or set `url` in the configuration file")?;
    let transcription_config = config.transcription_config();
    let audio_settings = config.audio_settings();
    let show_partials = transcription_config.enable_partials.unwrap_or(false);

    let mut client = TranscriptionClient::new(settings);
    client.add_event_handler("AddTranscript", |message| {
        if let Some(text) = transcript_text(&message) {
            println!("{}", text);
        }
        Ok(())
    })?;
    if show_partials {
        client.add_event_handler("AddPartialTranscript", |message| {
            if let Some(text) = transcript_text(&message) {
                print!("\r{}", text);
                std::io::stdout().flush().ok();
            }
            Ok(())
        })?;
    }

    info!("Transcribing {}", cli.file.display());
    let timeout = cli.timeout.map(Duration::from_secs);

    let stats = if cli.file.as_os_str() == "-" {
        client.run_and_wait(
            tokio::io::stdin(),
            transcription_config,
            audio_settings,
            timeout,
        )?
    } else {
        let file = std::fs::File::open(&cli.file)
            .with_context(|| format!("Failed to open audio file: {}", cli.file.display()))?;
        client.run_and_wait(
            tokio::fs::File::from_std(file),
            transcription_config,
            audio_settings,
            timeout,
        )?
    };

    info!(
        "Done: {} chunks sent in {:.1}s",
        stats.chunks_sent, stats.duration_secs
    );
    for warning in &stats.warnings {
        info!("Server warning during session: {}", warning);
    }

    Ok(())
}

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use recite::audio::{AudioFile, CaptureConfig, MicBackend};
use recite::session::{RecordingSession, SessionConfig, SessionEvent};
use recite::upload::{AccuracyReport, ApiClient, TranscriptionApi};
use recite::Config;

#[derive(Parser)]
#[command(name = "recite", version, about = "Speech-transcription accuracy demo client")]
struct Cli {
    /// Path to the configuration file (TOML, optional)
    #[arg(long, default_value = "config/recite")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record microphone audio in timed segments and upload each one for
    /// transcription. Ctrl-C stops the session; it also stops by itself at
    /// the session-length cap.
    Record {
        /// Seconds per segment (overrides the configured value)
        #[arg(long)]
        segment_secs: Option<u64>,

        /// Reference text to score each transcript against
        #[arg(long)]
        reference: Option<String>,

        /// Session identifier (defaults to a generated one)
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Upload a WAV file for transcription
    Upload {
        /// Path to the audio file
        file: PathBuf,

        /// Reference text to score the transcript against
        #[arg(long)]
        reference: Option<String>,
    },

    /// Upload reference text to score against the most recent transcript
    Score {
        /// The reference text
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recite=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("recite v{}", env!("CARGO_PKG_VERSION"));
    info!("Transcription server: {}", cfg.server.base_url);

    let api = ApiClient::new(&cfg.server.base_url, &cfg.server.csrf_token)
        .context("Failed to build upload client")?;

    match cli.command {
        Command::Record {
            segment_secs,
            reference,
            session_id,
        } => record(cfg, api, segment_secs, reference, session_id).await,
        Command::Upload { file, reference } => upload(cfg, api, file, reference).await,
        Command::Score { text } => score(api, &text).await,
    }
}

async fn record(
    cfg: Config,
    api: ApiClient,
    segment_secs: Option<u64>,
    reference: Option<String>,
    session_id: Option<String>,
) -> Result<()> {
    let capture_config = CaptureConfig {
        sample_rate: cfg.recording.sample_rate,
        channels: cfg.recording.channels,
        ..CaptureConfig::default()
    };
    let backend = Box::new(MicBackend::new(capture_config));

    let mut session_config = SessionConfig {
        segment_duration: Duration::from_secs(segment_secs.unwrap_or(cfg.recording.segment_secs)),
        max_duration: Duration::from_secs(cfg.recording.max_session_secs),
        ..SessionConfig::default()
    };
    if let Some(id) = session_id {
        session_config.session_id = id;
    }

    let (session, mut events) = RecordingSession::new(session_config, Arc::new(api), backend);

    if let Some(reference) = reference {
        session.set_reference_text(reference).await;
    }

    if let Err(e) = session.toggle().await {
        bail!(
            "Could not start recording: {}. Microphone access is required \
             to record an audio sample.",
            e
        );
    }

    println!("Recording... press Ctrl-C to stop.");

    let mut stopped = false;
    while !stopped {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Stopped { forced }) => {
                    if forced {
                        println!("\nSession length cap reached, recording stopped.");
                    } else {
                        println!("\nRecording stopped.");
                    }
                    stopped = true;
                }
                Some(event) => render_event(&event),
                None => stopped = true,
            },
            _ = tokio::signal::ctrl_c() => {
                session.stop().await;
            }
        }
    }

    // The final flush runs on a detached task; give its transcript and
    // metrics a chance to arrive before exiting.
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(10), events.recv()).await
    {
        match event {
            SessionEvent::Metrics(_) => {
                render_event(&event);
                break;
            }
            event => render_event(&event),
        }
    }

    let stats = session.stats();
    info!(
        "Session complete: {} segments uploaded, {} transcripts received",
        stats.segments_uploaded, stats.transcripts_received
    );

    Ok(())
}

async fn upload(cfg: Config, api: ApiClient, file: PathBuf, reference: Option<String>) -> Result<()> {
    let audio = AudioFile::open(&file)?;

    if !audio.is_long_enough(cfg.recording.min_upload_secs) {
        bail!(
            "Audio file is too short ({:.2}s, minimum {:.1}s)",
            audio.duration_seconds,
            cfg.recording.min_upload_secs
        );
    }

    let file_name = audio.file_name().to_string();
    let text = api.transcribe_file(&file_name, audio.bytes).await?;
    println!("{text}");

    if let Some(reference) = reference {
        let report = api.score_reference(&reference).await?;
        print_report(&report);
    }

    Ok(())
}

async fn score(api: ApiClient, text: &str) -> Result<()> {
    let report = api.score_reference(text).await?;
    print_report(&report);
    Ok(())
}

fn render_event(event: &SessionEvent) {
    match event {
        SessionEvent::Started => {}
        SessionEvent::Elapsed { seconds } => {
            print!("\r{seconds:>6.2}s");
            std::io::stdout().flush().ok();
        }
        SessionEvent::Transcript { text } => {
            println!("\n{text}");
        }
        SessionEvent::Metrics(report) => {
            println!();
            print_report(report);
        }
        SessionEvent::UploadFailed { message } => {
            eprintln!("\nUpload failed: {message}");
        }
        SessionEvent::Stopped { .. } => {}
    }
}

fn print_report(report: &AccuracyReport) {
    println!("WER: {}  WCR: {}  RTF: {}", report.wer, report.wcr, report.rtf);
    println!(
        "Precision (micro/macro): {} / {}",
        report.precision_micro, report.precision_macro
    );
    println!(
        "Recall    (micro/macro): {} / {}",
        report.recall_micro, report.recall_macro
    );
    println!(
        "F1        (micro/macro): {} / {}",
        report.f1_micro, report.f1_macro
    );
}

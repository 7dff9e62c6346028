use anyhow::Context;
use clap::{Parser, ValueEnum};
use lectern_app::{ServiceConfig, SpeechService};
use lectern_audio::{PlaybackEventKind, RodioBackend, SimulatedBackend};
use lectern_foundation::next_session_id;
use lectern_tts::{normalize, split_into_chunks, SineConfig, SineEngine, TtsEngine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "lectern")]
#[command(version)]
#[command(about = "Read a text file aloud through the Lectern speech pipeline")]
struct Cli {
    /// Text file to read; built-in sample text when omitted
    file: Option<PathBuf>,

    /// Generation mode
    #[arg(short, long, value_enum, default_value_t = Mode::Chunked)]
    mode: Mode,

    /// Voice id from the catalog
    #[arg(long, default_value = "af_heart")]
    voice: String,

    /// Speed multiplier
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Characters per chunk in chunked mode
    #[arg(long, default_value_t = 300)]
    chunk_chars: usize,

    /// Use the headless simulated sink instead of the audio device
    #[arg(long)]
    simulated: bool,

    /// Print the voice catalog and exit
    #[arg(long)]
    list_voices: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Chunked,
    Streaming,
}

fn init_logging() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_level).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let engine = Arc::new(SineEngine::new(SineConfig::default()));
    if cli.list_voices {
        for voice in engine.voices() {
            println!("{:12} {:20} {:?}", voice.id, voice.name, voice.gender);
        }
        return Ok(());
    }

    let text = match &cli.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => SAMPLE_TEXT.to_string(),
    };
    let normalized = normalize(&text);
    anyhow::ensure!(!normalized.is_empty(), "input text is empty");

    let config = ServiceConfig::default();
    let service = if cli.simulated {
        SpeechService::spawn(engine, SimulatedBackend::new(), config.clone())
    } else {
        SpeechService::spawn(engine, RodioBackend, config.clone())
    };

    let mut events = service.subscribe();
    let session = next_session_id();
    service.start_session(session);

    let last_index = match cli.mode {
        Mode::Chunked => {
            let chunks = split_into_chunks(&normalized, cli.chunk_chars);
            let last = chunks.len() - 1;
            for (index, chunk) in chunks.into_iter().enumerate() {
                service
                    .enqueue_chunk(session, index, &chunk, &cli.voice, cli.speed)
                    .await?;
            }
            last
        }
        Mode::Streaming => {
            // Sub-chunk count mirrors what the scheduler will produce.
            let last = split_into_chunks(&normalized, config.scheduler.max_stream_chars).len() - 1;
            service
                .stream_text(session, &normalized, &cli.voice, cli.speed)
                .await?;
            last
        }
    };

    tracing::info!(%session, chunks = last_index + 1, "playback started");
    loop {
        tokio::select! {
            ev = events.recv() => {
                let ev = ev.context("event channel closed")?;
                if ev.session_id != session {
                    continue;
                }
                match ev.event {
                    PlaybackEventKind::GenerationError | PlaybackEventKind::Error => {
                        let detail = ev.message.unwrap_or_default();
                        eprintln!("chunk {} failed: {detail}", ev.chunk_index);
                        break;
                    }
                    PlaybackEventKind::ChunkFinished if ev.chunk_index == last_index => {
                        println!("done ({} chunks)", last_index + 1);
                        break;
                    }
                    kind => {
                        tracing::debug!(chunk = ev.chunk_index, event = ?kind, "event");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("interrupted");
                service.stop();
                break;
            }
        }
    }

    // Let the sink drain its tail before tearing the thread down.
    tokio::time::sleep(Duration::from_millis(100)).await;
    service.shutdown();
    Ok(())
}

const SAMPLE_TEXT: &str = "Lectern reads books aloud. This sample exercises the \
chunked pipeline end to end: text is normalized, split at sentence boundaries, \
synthesized ahead of playback, and queued to the audio sink in order.";

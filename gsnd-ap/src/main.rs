//! Audio Player (gsnd-ap) - Main entry point
//!
//! `play` streams background music and sound effects to the default audio
//! device; `probe` decodes a file without playback and prints its frame
//! statistics.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gsnd_ap::audio::Mp3CodecFactory;
use gsnd_ap::probe::probe_file;
use gsnd_ap::{PlaybackEngine, PlayerConfig};
use gsnd_common::PlayerEvent;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for gsnd-ap
#[derive(Parser, Debug)]
#[command(name = "gsnd-ap")]
#[command(about = "Streaming MP3 player for game music and sound effects")]
#[command(version)]
struct Cli {
    /// Configuration file (overrides GSND_CONFIG and the platform default)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play background music and sound effects
    Play(PlayArgs),
    /// Decode a file without playback and print frame statistics
    Probe {
        /// File to decode
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Background playlist entry (repeatable)
    #[arg(short, long = "music")]
    music: Vec<PathBuf>,

    /// Playlist index to start from
    #[arg(long, default_value = "0")]
    start_index: usize,

    /// Loop the background music
    #[arg(short, long = "loop", env = "GSND_LOOP")]
    looping: bool,

    /// One-shot sound effect (repeatable)
    #[arg(short, long = "sound")]
    sound: Vec<PathBuf>,

    /// Discard audio instead of opening the audio device
    #[arg(long, env = "GSND_NULL_OUTPUT")]
    null_output: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PlayerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = format!(
        "gsnd_ap={level},gsnd_common={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Play(args) => play(config, args).await,
        Command::Probe { file } => {
            let report = probe_file(&file, &Mp3CodecFactory)
                .with_context(|| format!("Failed to probe {}", file.display()))?;
            println!("{}", report);
            Ok(())
        }
    }
}

async fn play(config: PlayerConfig, args: PlayArgs) -> Result<()> {
    if args.music.is_empty() && args.sound.is_empty() {
        anyhow::bail!("Nothing to play: give at least one --music or --sound file");
    }

    let engine = if args.null_output {
        PlaybackEngine::with_null_output(config)
    } else {
        PlaybackEngine::new(config)
    }
    .context("Failed to initialize playback engine")?;
    info!("Playback engine initialized");

    let mut events = engine.subscribe();

    engine.set_loop(args.looping)?;
    if !args.music.is_empty() {
        engine
            .play_music(&args.music, args.start_index)
            .context("Failed to start background music")?;
    }
    for sound in &args.sound {
        if let Err(e) = engine.play_sound(sound) {
            warn!("Skipping {}: {}", sound.display(), e);
        }
    }

    tokio::select! {
        _ = wait_until_idle(&engine, &mut events) => {
            info!("Playback finished");
        }
        result = signal::ctrl_c() => {
            result.context("Failed to install Ctrl+C handler")?;
            info!("Received Ctrl+C, shutting down");
        }
    }

    engine.shutdown();
    Ok(())
}

/// Resolve once no background track or effect is left.
async fn wait_until_idle(
    engine: &PlaybackEngine,
    events: &mut tokio::sync::broadcast::Receiver<PlayerEvent>,
) {
    while !engine.is_idle() {
        match events.recv().await {
            Ok(event) => info!("{}: {:?}", event.event_type(), event),
            Err(RecvError::Lagged(skipped)) => warn!("Missed {} player events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

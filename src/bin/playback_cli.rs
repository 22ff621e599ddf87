use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use timeshift_player::config::AppConfig;
use timeshift_player::engine::PlatformBackend;
use timeshift_player::host::{negotiate, FixedHostProperties, HostAudioProperties};
use timeshift_player::managers::{PlaybackController, PlaybackMonitor, PlaybackStatus};
use timeshift_player::stream::PlaybackRegion;
use timeshift_player::timeshift::{now_millis, synchronization_offset, Broadcast};

#[derive(Parser, Debug)]
#[command(
    name = "playback_cli",
    about = "Drive the time-shift playback engine on the local audio device"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/playback_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Report this sample rate instead of querying the device
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Report this burst size instead of querying the device
    #[arg(long)]
    frames_per_burst: Option<u32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the stream parameters the engine would be created with
    Probe,
    /// Play a region of a source and print status on every poll
    Play {
        /// WAV (16-bit) or raw little-endian 16-bit PCM file
        #[arg(long)]
        source: PathBuf,
        /// Start position in milliseconds
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Loop length in milliseconds (0 loops the whole source)
        #[arg(long, default_value_t = 0)]
        size: u64,
        /// Playback shift in milliseconds applied after play starts
        #[arg(long, allow_hyphen_values = true)]
        shift: Option<i64>,
        /// Treat the source as a broadcast that started looping at this Unix
        /// time (ms); overrides --offset with the live position
        #[arg(long)]
        live_epoch: Option<i64>,
        /// How long to play before deleting the engine
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

#[derive(Serialize)]
struct StatusLine {
    #[serde(flatten)]
    status: PlaybackStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_offset_millis: Option<i64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => default_config(),
    };
    let host = host_for(&cli);

    match cli.command {
        Commands::Probe => run_probe(host.as_ref(), &config),
        Commands::Play {
            source,
            offset,
            size,
            shift,
            live_epoch,
            seconds,
        } => {
            let broadcast = live_epoch.map(|epoch| Broadcast::new(epoch, size));
            let region = match broadcast {
                Some(broadcast) => broadcast.live_region(now_millis()),
                None => PlaybackRegion::new(offset, size),
            };
            run_play(host, config, source, region, shift, broadcast, seconds).await
        }
    }
}

fn run_probe(host: &dyn HostAudioProperties, config: &AppConfig) -> Result<ExitCode> {
    let params = negotiate(host, &config.stream);
    println!("{}", serde_json::to_string(&params)?);
    Ok(ExitCode::from(0))
}

async fn run_play(
    host: Arc<dyn HostAudioProperties>,
    config: AppConfig,
    source: PathBuf,
    region: PlaybackRegion,
    shift: Option<i64>,
    broadcast: Option<Broadcast>,
    seconds: u64,
) -> Result<ExitCode> {
    if !source.is_file() {
        bail!("source {} does not exist", source.display());
    }

    let backend = PlatformBackend::new(config.engine.clone());
    let controller = Arc::new(PlaybackController::new(backend, host, config.stream.clone()));
    if !controller.create() {
        bail!("failed to create playback engine");
    }
    if let Some(params) = controller.stream_parameters() {
        eprintln!("Engine created: {}", params);
    }

    controller.prepare(&source);
    controller.play(region);
    if let Some(shift) = shift {
        controller.set_playback_shift(shift);
    }

    let monitor = PlaybackMonitor::spawn(Arc::clone(&controller), &config.monitor);
    let mut statuses = monitor.subscribe();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            received = statuses.recv() => match received {
                Ok(status) => {
                    let sync_offset_millis = broadcast.map(|broadcast| {
                        let expected = broadcast.live_region(now_millis()).offset as i64;
                        synchronization_offset(expected, status.position_millis)
                    });
                    let line = StatusLine { status, sync_offset_millis };
                    println!("{}", serde_json::to_string(&line)?);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("status output lagged, skipped {} polls", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    monitor.stop();
    controller.delete();
    Ok(ExitCode::from(0))
}

#[cfg(not(target_os = "android"))]
fn default_config() -> AppConfig {
    AppConfig::load()
}

#[cfg(target_os = "android")]
fn default_config() -> AppConfig {
    AppConfig::load_android()
}

/// Command-line overrides replace the device query entirely.
fn host_for(cli: &Cli) -> Arc<dyn HostAudioProperties> {
    if cli.sample_rate.is_some() || cli.frames_per_burst.is_some() {
        return Arc::new(FixedHostProperties::new(
            cli.sample_rate,
            cli.frames_per_burst,
        ));
    }
    device_host()
}

#[cfg(not(target_os = "android"))]
fn device_host() -> Arc<dyn HostAudioProperties> {
    Arc::new(timeshift_player::host::CpalHostProperties::new())
}

#[cfg(target_os = "android")]
fn device_host() -> Arc<dyn HostAudioProperties> {
    // No application context outside the app process; use configured values
    Arc::new(FixedHostProperties::default())
}

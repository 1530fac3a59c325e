//! Mixdeck player - main entry point
//!
//! Wires storage, the audio sink, the playback pipeline and a button source
//! together, then runs the control loop until Ctrl+C, SIGTERM or `q`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mixdeck_common::config::{load_toml_config, resolve_config_path, CONFIG_ENV_VAR};
use mixdeck_common::events::{EventBus, PlayerEvent};
use mixdeck_player::audio::output::{list_devices, CpalSink};
use mixdeck_player::audio::sink::{AudioSink, NullSink, WavFileSink};
use mixdeck_player::audio::storage::{FsStorage, Storage};
use mixdeck_player::config::{ButtonSourceKind, PlayerConfig, SinkKind};
use mixdeck_player::control::source::{run_key_source, run_level_poller, SysfsLevelSource};
use mixdeck_player::control::{edge_channel, ControlStateMachine};
use mixdeck_player::Pipeline;
use tokio::signal;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mixdeck
#[derive(Parser, Debug)]
#[command(name = "mixdeck")]
#[command(about = "Button-controlled WAV player with a blendable mix stream")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mount point of the removable storage
    #[arg(short, long, env = "MIXDECK_ROOT")]
    root: Option<PathBuf>,

    /// Primary WAV file, relative to the storage root
    #[arg(long, env = "MIXDECK_PRIMARY_FILE")]
    primary_file: Option<PathBuf>,

    /// Mix WAV file, relative to the storage root
    #[arg(long, env = "MIXDECK_MIX_FILE")]
    mix_file: Option<PathBuf>,

    /// Output kind: device, wav or null
    #[arg(short, long, env = "MIXDECK_OUTPUT")]
    output: Option<String>,

    /// Output device name
    #[arg(long, env = "MIXDECK_DEVICE")]
    device: Option<String>,

    /// Target file for the wav output
    #[arg(long, env = "MIXDECK_WAV_PATH")]
    wav_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MIXDECK_LOG_LEVEL")]
    log_level: Option<String>,

    /// List audio output devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    /// Command line and environment take priority over the file
    fn apply(&self, config: &mut PlayerConfig) -> Result<()> {
        if let Some(root) = &self.root {
            config.storage.root = root.clone();
        }
        if let Some(file) = &self.primary_file {
            config.playback.primary_file = file.clone();
        }
        if let Some(file) = &self.mix_file {
            config.playback.mix_file = file.clone();
        }
        if let Some(kind) = &self.output {
            config.output.kind = kind.parse::<SinkKind>()?;
        }
        if let Some(device) = &self.device {
            config.output.device = Some(device.clone());
        }
        if let Some(path) = &self.wav_path {
            config.output.wav_path = path.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_source = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let loaded = load_toml_config::<PlayerConfig>(config_source)
        .context("Failed to load configuration")?;
    let mut config = loaded.config;
    args.apply(&mut config)?;

    init_tracing(&config).context("Failed to initialize logging")?;

    info!("Starting mixdeck v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", loaded.source);

    if args.list_devices {
        for name in list_devices().context("Failed to enumerate audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    config.validate()?;

    let storage = Arc::new(FsStorage::new(&config.storage.root));
    log_storage_contents(storage.as_ref(), &config);

    let events = EventBus::default();
    tokio::spawn(log_events(events.subscribe()));

    let sink = build_sink(&config);
    let pipeline = Arc::new(
        Pipeline::new(config.pipeline_settings(), storage, sink, events.clone())
            .context("Failed to initialize playback pipeline")?,
    );

    let (notifier, edges) = edge_channel(config.control.edge_queue_capacity);
    let (quit_tx, quit_rx) = oneshot::channel::<()>();
    // Keeps the edge channel open when the source finishes early (stdin at EOF)
    let _edge_keepalive = notifier.clone();

    match config.control.source {
        ButtonSourceKind::Keyboard => {
            info!("Keyboard control: p = play/stop, m = mix on/off, q = quit");
            let reader = tokio::io::BufReader::new(tokio::io::stdin());
            tokio::spawn(run_key_source(reader, notifier, quit_tx));
        }
        ButtonSourceKind::Gpio => {
            // validate() guarantees both paths are present
            let play = config.control.play_gpio.clone().unwrap_or_default();
            let mix = config.control.mix_gpio.clone().unwrap_or_default();
            info!(play = %play.display(), mix = %mix.display(), "GPIO button control");
            let source = SysfsLevelSource::new(play, mix, config.control.active_low);
            tokio::spawn(run_level_poller(
                source,
                notifier,
                config.control.poll_interval(),
                std::future::pending::<()>(),
            ));
            // Only signals stop a GPIO-controlled player
            drop(quit_tx);
        }
    }

    let machine = ControlStateMachine::new(
        config.control.debounce_window(),
        config.control.require_stable_level,
    )
    .with_events(events.clone());

    let shutdown = async move {
        tokio::select! {
            _ = shutdown_signal() => {}
            Ok(()) = quit_rx => {}
        }
    };
    machine.run(edges, Arc::clone(&pipeline), shutdown).await;

    let stopping = Arc::clone(&pipeline);
    tokio::task::spawn_blocking(move || stopping.shutdown())
        .await
        .context("Pipeline shutdown panicked")?;

    info!("Shutdown complete");
    Ok(())
}

/// Registry with an env filter, a stderr layer, and an optional file layer
fn init_tracing(config: &PlayerConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn build_sink(config: &PlayerConfig) -> Box<dyn AudioSink> {
    let output = &config.output;
    match output.kind {
        SinkKind::Device => {
            info!(device = output.device.as_deref().unwrap_or("default"), "Audio output: device");
            Box::new(CpalSink::new(output.device.clone(), output.write_timeout()))
        }
        SinkKind::Wav => {
            info!(path = %output.wav_path.display(), "Audio output: WAV file");
            Box::new(WavFileSink::new(&output.wav_path))
        }
        SinkKind::Null => {
            info!("Audio output: null (paced)");
            Box::new(NullSink::paced())
        }
    }
}

/// Startup diagnostics: what is on the card, and whether our files are there
fn log_storage_contents(storage: &FsStorage, config: &PlayerConfig) {
    info!("Storage root: {}", storage.root().display());
    match storage.list() {
        Ok(names) => {
            for name in &names {
                info!("Found file: {}", name);
            }
            for wanted in [&config.playback.primary_file, &config.playback.mix_file] {
                if !storage.resolve(wanted).exists() {
                    warn!("{} not found on storage", wanted.display());
                }
            }
        }
        Err(e) => error!("Cannot list storage root: {}", e),
    }
}

async fn log_events(mut rx: broadcast::Receiver<PlayerEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                match &event {
                    PlayerEvent::SessionStartFailed { file, error, .. } => {
                        warn!("Playback of {} not started: {}", file, error)
                    }
                    PlayerEvent::MixExhausted { .. } => info!("Mix stream finished, mix released"),
                    other => info!("Event: {}", other.name()),
                }
                if let Ok(json) = serde_json::to_string(&event) {
                    debug!("{}", json);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event logger lagged, {} events skipped", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

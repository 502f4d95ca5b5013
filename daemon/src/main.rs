mod asset;
mod config;
mod controller;
mod ipc_server;
mod library;
mod macros;
mod mode_feed;
mod runtime;
mod scheduler;
mod selector;
mod surface;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::surface::{EventSink, PlaybackSurface, PrepareWorker, SharedFrames, SurfaceId};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Standclock Daemon v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = config::Config::default_config_path()?;
    log::info!("Looking for config at: {}", config_path.display());

    let config = match config::Config::load() {
        Ok(cfg) => {
            log::info!("✓ Configuration loaded successfully");
            log::info!("    - Log level: {}", cfg.general.log_level);
            log::info!("    - Library sources: {} path(s)", cfg.library.sources.len());
            log::info!(
                "    - Crossfade: {}ms, prepare lead {}ms",
                cfg.timing.fade_duration,
                cfg.timing.prepare_lead
            );
            log::info!(
                "    - Mode feed: {} (day {} - {}), video periods: {}",
                if cfg.mode.auto { "auto" } else { "manual" },
                cfg.mode.day_start,
                cfg.mode.day_end,
                cfg.mode.video_periods.join(", ")
            );
            cfg
        }
        Err(e) => {
            log::warn!("Failed to load config: {:#}. Using defaults.", e);
            config::Config::default()
        }
    };

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let state = Arc::new(Mutex::new(DaemonState::new()));
    let frames = Arc::new(SharedFrames::new());

    let worker = PrepareWorker::spawn()?;
    let engines = build_engines(&config, &frames, &worker, event_tx)?;

    let selector = selector::ContentSelector::new(config.brightness.to_policy());
    let timing = config.timing.to_timing();
    let sched = scheduler::CrossfadeScheduler::new(engines, selector, timing).with_worker(worker);

    let runtime = runtime::Runtime::new(
        sched,
        controller::ModeController::new(config.mode.periods()),
        mode_feed::ModeFeed::new(&config.mode)?,
        library::Library::new(&config.library),
        frames,
        state.clone(),
        (command_tx.clone(), command_rx),
        event_rx,
        timing.position_poll,
    );

    // Start IPC server
    let ipc_state = state.clone();
    let ipc_tx = command_tx.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(ipc_state, ipc_tx).await {
            log::error!("IPC server error: {:#}", e);
        }
    });

    // Start control loop
    let runtime_handle = tokio::spawn(async move {
        if let Err(e) = runtime.run().await {
            log::error!("Control loop error: {:#}", e);
        }
    });

    // Set up signal handlers
    let signal_tx = command_tx;
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down...");
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down...");
            }
        }

        let _ = signal_tx.send(ControlCommand::Shutdown);
    });

    // The control loop owns the surfaces; wait for it to release them
    if let Err(e) = runtime_handle.await {
        log::error!("Control loop panicked: {}", e);
    }
    state.lock().await.should_exit = true;

    if let Err(e) = ipc_handle.await {
        log::error!("IPC server panicked: {}", e);
    }

    log::info!("Daemon shutting down");
    Ok(())
}

#[cfg(feature = "video")]
fn build_engines(
    config: &config::Config,
    frames: &Arc<SharedFrames>,
    worker: &PrepareWorker,
    sink: EventSink,
) -> Result<[Box<dyn PlaybackSurface>; 2]> {
    use crate::surface::{GstSurface, RenderTarget};

    surface::initialize_gstreamer()?;

    let target: Arc<dyn RenderTarget> = frames.clone();
    let size = (config.video.decode_width, config.video.decode_height);
    let engine = |id: SurfaceId| -> Result<Box<dyn PlaybackSurface>> {
        let handle = worker.handle().context("Prepare worker not running")?;
        Ok(Box::new(GstSurface::new(
            id,
            target.clone(),
            handle,
            sink.clone(),
            size,
        )))
    };

    log::info!("Video engine: GStreamer ({}x{})", size.0, size.1);
    Ok([engine(SurfaceId::A)?, engine(SurfaceId::B)?])
}

#[cfg(not(feature = "video"))]
fn build_engines(
    config: &config::Config,
    frames: &Arc<SharedFrames>,
    worker: &PrepareWorker,
    sink: EventSink,
) -> Result<[Box<dyn PlaybackSurface>; 2]> {
    use crate::surface::{RenderTarget, StubSurface};
    use std::time::Duration;

    let target: Arc<dyn RenderTarget> = frames.clone();
    let duration = Duration::from_millis(config.video.simulated_duration);
    let engine = |id: SurfaceId| -> Result<Box<dyn PlaybackSurface>> {
        let handle = worker.handle().context("Prepare worker not running")?;
        Ok(Box::new(StubSurface::new(
            id,
            target.clone(),
            handle,
            sink.clone(),
            duration,
        )))
    };

    log::info!(
        "Video engine: stub ({}ms per clip, built without the video feature)",
        duration.as_millis()
    );
    Ok([engine(SurfaceId::A)?, engine(SurfaceId::B)?])
}

/// Commands sent from IPC (and signals) to the control loop
#[derive(Debug, Clone)]
pub enum ControlCommand {
    SetPlaylist(Vec<PathBuf>),
    Rescan,
    SetMode(common::Mode),
    AutoMode,
    Pause,
    Resume,
    Shutdown,
}

/// Shared daemon state
pub struct DaemonState {
    pub should_exit: bool,
    pub start_time: std::time::Instant,
    /// Latest snapshot published by the control loop
    pub status: Option<common::DisplayStatus>,
}

impl DaemonState {
    fn new() -> Self {
        Self {
            should_exit: false,
            start_time: std::time::Instant::now(),
            status: None,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

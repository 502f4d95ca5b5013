//! Control loop.
//!
//! One task owns the scheduler and everything that feeds it: IPC commands,
//! surface events, the automatic mode feed and periodic library rescans. It
//! sleeps until the earliest of their deadlines.

use anyhow::Result;
use chrono::Local;
use common::DisplayStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};

use crate::controller::ModeController;
use crate::library::Library;
use crate::mode_feed::ModeFeed;
use crate::scheduler::CrossfadeScheduler;
use crate::surface::{SharedFrames, SurfaceEvent, SurfaceId};
use crate::{ControlCommand, DaemonState};

/// Wake-up interval with nothing scheduled
const IDLE_WAKEUP: Duration = Duration::from_secs(1);

/// How often frame statistics are logged
const STATS_INTERVAL: Duration = Duration::from_secs(60);

pub struct Runtime {
    sched: CrossfadeScheduler,
    controller: ModeController,
    feed: ModeFeed,
    library: Library,
    frames: Arc<SharedFrames>,
    state: Arc<Mutex<DaemonState>>,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    /// Loops rescan results back into `commands`
    command_tx: mpsc::UnboundedSender<ControlCommand>,
    events: mpsc::UnboundedReceiver<SurfaceEvent>,
    /// Engine service cadence while a clip is advancing
    service_interval: Duration,
    next_stats: Instant,
}

impl Runtime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sched: CrossfadeScheduler,
        controller: ModeController,
        feed: ModeFeed,
        library: Library,
        frames: Arc<SharedFrames>,
        state: Arc<Mutex<DaemonState>>,
        channels: (
            mpsc::UnboundedSender<ControlCommand>,
            mpsc::UnboundedReceiver<ControlCommand>,
        ),
        events: mpsc::UnboundedReceiver<SurfaceEvent>,
        service_interval: Duration,
    ) -> Self {
        let (command_tx, commands) = channels;
        Self {
            sched,
            controller,
            feed,
            library,
            frames,
            state,
            commands,
            command_tx,
            events,
            service_interval,
            next_stats: Instant::now() + STATS_INTERVAL,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let now = Instant::now();

        // Establish backdrop or playback for the starting mode
        let mut mode = self.sched.mode();
        if self.feed.is_enabled()
            && let Some(fed) = self.feed.check(now, Local::now().naive_local())
        {
            mode = fed;
        }
        self.controller.set_mode(&mut self.sched, mode, now);
        self.request_rescan(now);
        self.publish().await;

        loop {
            let deadline = self.next_wakeup(Instant::now());

            let command = tokio::select! {
                command = self.commands.recv() => {
                    Some(command.unwrap_or(ControlCommand::Shutdown))
                }
                Some(event) = self.events.recv() => {
                    self.sched.handle_event(event, Instant::now());
                    None
                }
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => None,
            };

            let now = Instant::now();
            if let Some(command) = command
                && !self.handle_command(command, now)
            {
                break;
            }

            self.sched.tick(now);
            self.poll_feed(now);
            self.poll_library(now);
            self.log_stats(now);
            self.publish().await;
        }

        self.controller.release(&mut self.sched);
        self.publish().await;
        self.state.lock().await.should_exit = true;
        log::info!("Control loop stopped");
        Ok(())
    }

    /// Returns false once the loop should stop
    fn handle_command(&mut self, command: ControlCommand, now: Instant) -> bool {
        log::debug!("Control command: {:?}", command);

        match command {
            ControlCommand::SetPlaylist(paths) => {
                self.controller.set_playlist(&mut self.sched, paths, now);
            }
            ControlCommand::Rescan => self.request_rescan(now),
            ControlCommand::SetMode(mode) => {
                self.feed.disable();
                self.controller.set_mode(&mut self.sched, mode, now);
            }
            ControlCommand::AutoMode => self.feed.enable(),
            ControlCommand::Pause => self.controller.pause(&mut self.sched, now),
            ControlCommand::Resume => self.controller.resume(&mut self.sched, now),
            ControlCommand::Shutdown => {
                log::info!("Shutdown requested");
                return false;
            }
        }
        true
    }

    fn next_wakeup(&self, now: Instant) -> Instant {
        let service = (self.sched.is_advancing() && !self.sched.is_paused())
            .then(|| now + self.service_interval);

        [
            self.sched.next_deadline(),
            self.feed.next_check(now),
            self.library.next_rescan(),
            service,
            Some(self.next_stats),
        ]
        .into_iter()
        .flatten()
        .min()
        .map_or(now + IDLE_WAKEUP, |at| at.min(now + IDLE_WAKEUP))
    }

    fn poll_feed(&mut self, now: Instant) {
        if !self.feed.should_check(now) {
            return;
        }
        if let Some(mode) = self.feed.check(now, Local::now().naive_local()) {
            self.controller.set_mode(&mut self.sched, mode, now);
        }
    }

    fn poll_library(&mut self, now: Instant) {
        if self.library.should_rescan(now) {
            self.request_rescan(now);
        }
    }

    /// Scan the library off the control loop; the result comes back as
    /// `SetPlaylist`
    fn request_rescan(&mut self, now: Instant) {
        if !self.library.has_sources() {
            log::debug!("No library sources configured, skipping scan");
            return;
        }

        self.library.mark_scanned(now);
        let scan = self.library.scanner();
        let tx = self.command_tx.clone();
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(scan).await {
                Ok(paths) => {
                    if tx.send(ControlCommand::SetPlaylist(paths)).is_err() {
                        log::debug!("Scan finished after shutdown");
                    }
                }
                Err(e) => log::error!("Library scan failed: {}", e),
            }
        });
    }

    fn log_stats(&mut self, now: Instant) {
        if now < self.next_stats {
            return;
        }
        self.next_stats = now + STATS_INTERVAL;

        for id in SurfaceId::ALL {
            let stats = self.frames.stats(id);
            if stats.presented > 0 {
                log::debug!(
                    "Surface {}: {} frames presented, {} dropped ({:.1}%)",
                    id,
                    stats.presented,
                    stats.dropped,
                    stats.drop_rate()
                );
            }
        }
    }

    async fn publish(&mut self) {
        let now = Instant::now();
        let display = self.sched.display_state();
        let status = DisplayStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: 0,
            phase: self.sched.phase().to_string(),
            mode: self.sched.mode(),
            paused: self.sched.is_paused(),
            auto_mode: self.feed.is_enabled(),
            catalog_size: self.sched.catalog_len(),
            current: self.sched.current_clip().map(str::to_string),
            standby: self.sched.standby_clip().map(str::to_string),
            remaining_ms: self
                .sched
                .remaining(now)
                .map(|r| r.as_millis() as u64),
            opacity: display.opacity,
            backdrop: display.backdrop,
        };

        self.state.lock().await.status = Some(status);
    }
}

//! GStreamer playback engine
//!
//! Each surface owns at most one pipeline:
//!
//! ```text
//! filesrc ! decodebin ! videoconvert ! videoscale ! video/x-raw,format=BGRA ! appsink
//! ```
//!
//! Audio pads of `decodebin` are left unlinked, so playback is always muted.
//! Building and prerolling a pipeline can take hundreds of milliseconds and
//! runs on the prepare worker; only the resulting pipeline handle crosses back.

use super::worker::{Handoff, WorkerHandle};
use super::{
    EventSink, Frame, PlaybackSurface, RenderTarget, SurfaceError, SurfaceEvent, SurfaceId,
    Ticket,
};
use crate::asset::Asset;
use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::path::Path;
use std::sync::{Arc, mpsc};
use std::time::Duration;

/// Upper bound on waiting for a pipeline to preroll
const PREROLL_TIMEOUT_SECS: u64 = 10;

/// Initialize GStreamer (idempotent)
pub fn initialize() -> Result<()> {
    gst::init().context("Failed to initialize GStreamer")?;
    log::info!("GStreamer initialized ({})", gst::version_string());
    Ok(())
}

#[derive(Default)]
struct Loaded {
    /// Ticket the surface currently expects results for
    active: Option<Ticket>,
    pipeline: Option<gst::Pipeline>,
    playing: bool,
}

pub struct GstSurface {
    id: SurfaceId,
    target: Arc<dyn RenderTarget>,
    worker: Option<WorkerHandle>,
    sink: EventSink,
    decode_size: (u32, u32),
    loaded: Loaded,
    prerolled: Handoff<gst::Pipeline>,
}

impl GstSurface {
    pub fn new(
        id: SurfaceId,
        target: Arc<dyn RenderTarget>,
        worker: WorkerHandle,
        sink: EventSink,
        decode_size: (u32, u32),
    ) -> Self {
        if !target.attach_surface(id) {
            log::warn!("Render target not ready for surface {}", id);
        }

        Self {
            id,
            target,
            worker: Some(worker),
            sink,
            decode_size,
            loaded: Loaded::default(),
            prerolled: Handoff::new(),
        }
    }

    /// Install a pipeline the worker finished for the active ticket
    fn install_prerolled(&mut self) {
        let active = self.loaded.active;
        let mut superseded = Vec::new();
        let claimed = self.prerolled.claim(active, |pipeline| superseded.push(pipeline));
        for pipeline in superseded {
            log::trace!("Surface {} discarding superseded pipeline", self.id);
            self.dispose(pipeline);
        }
        if let Some(pipeline) = claimed
            && let Some(previous) = self.loaded.pipeline.replace(pipeline)
        {
            self.dispose(previous);
        }
    }

    /// Forget the loaded clip; pending results become superseded
    fn unload(&mut self, active: Option<Ticket>) {
        self.loaded.active = active;
        self.loaded.playing = false;
        if let Some(pipeline) = self.loaded.pipeline.take() {
            self.dispose(pipeline);
        }
        self.install_prerolled();
    }

    fn report(&self, event: SurfaceEvent) {
        if self.sink.send(event).is_err() {
            log::trace!("Surface {} event dropped: control loop gone", self.id);
        }
    }

    /// Tear down a pipeline off the control loop
    fn dispose(&self, pipeline: gst::Pipeline) {
        let submitted = self
            .worker
            .as_ref()
            .is_some_and(|w| w.submit(move || shutdown_pipeline(&pipeline)));
        if !submitted {
            log::trace!("Surface {} disposing pipeline without worker", self.id);
        }
    }

    fn fail(&mut self, reason: String) {
        self.loaded.playing = false;
        if let Some(pipeline) = self.loaded.pipeline.take() {
            self.dispose(pipeline);
        }
        if let Some(ticket) = self.loaded.active {
            self.report(SurfaceEvent::error(ticket, SurfaceError::Decode(reason)));
        }
    }
}

impl PlaybackSurface for GstSurface {
    fn is_attached(&self) -> bool {
        self.target.is_attached(self.id)
    }

    fn prepare(&mut self, asset: &Asset, ticket: Ticket) {
        self.unload(Some(ticket));

        let Some(worker) = self.worker.as_ref() else {
            self.report(SurfaceEvent::error(ticket, SurfaceError::Released));
            return;
        };

        let path = asset.path().to_path_buf();
        let id = self.id;
        let target = Arc::clone(&self.target);
        let prerolled = self.prerolled.sender();
        let sink = self.sink.clone();
        let (width, height) = self.decode_size;

        let submitted = worker.submit(move || {
            let event = match load(&path, id, target, width, height) {
                Ok((pipeline, duration)) => {
                    // Handed over before Ready so begin() always finds it
                    if let Err(mpsc::SendError((_, pipeline))) = prerolled.send((ticket, pipeline))
                    {
                        shutdown_pipeline(&pipeline);
                        return;
                    }
                    SurfaceEvent::ready(ticket, duration)
                }
                Err(e) => {
                    log::warn!("Surface {} failed to prepare {}: {}", id, path.display(), e);
                    SurfaceEvent::error(ticket, e)
                }
            };
            let _ = sink.send(event);
        });

        if !submitted {
            self.report(SurfaceEvent::error(ticket, SurfaceError::Released));
        }
    }

    fn begin(&mut self) {
        self.install_prerolled();
        if self.loaded.playing {
            return;
        }
        let Some(pipeline) = self.loaded.pipeline.clone() else {
            return;
        };

        let started = pipeline
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
                gst::ClockTime::ZERO,
            )
            .map_err(|e| e.to_string())
            .and_then(|()| {
                pipeline
                    .set_state(gst::State::Playing)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            });

        match started {
            Ok(()) => self.loaded.playing = true,
            Err(e) => self.fail(format!("failed to start playback: {}", e)),
        }
    }

    fn set_opacity(&mut self, opacity: f32) {
        self.target.set_opacity(self.id, opacity);
    }

    fn pause(&mut self) {
        if self.loaded.playing
            && let Some(pipeline) = self.loaded.pipeline.as_ref()
        {
            crate::log_and_continue!(pipeline.set_state(gst::State::Paused), "pause pipeline");
        }
    }

    fn resume(&mut self) {
        if self.loaded.playing
            && let Some(pipeline) = self.loaded.pipeline.as_ref()
        {
            crate::log_and_continue!(pipeline.set_state(gst::State::Playing), "resume pipeline");
        }
    }

    fn stop(&mut self) {
        self.unload(None);
    }

    fn release(&mut self) {
        self.stop();
        self.target.set_opacity(self.id, 0.0);
        // Dropping the handle lets the worker drain and exit
        self.worker = None;
    }

    fn position(&self) -> Option<Duration> {
        if !self.loaded.playing {
            return None;
        }
        let position = self
            .loaded
            .pipeline
            .as_ref()?
            .query_position::<gst::ClockTime>()?;
        Some(Duration::from_nanos(position.nseconds()))
    }

    fn service(&mut self) {
        self.install_prerolled();
        let Some(bus) = self.loaded.pipeline.as_ref().and_then(|p| p.bus()) else {
            return;
        };

        // Drain everything so the bus does not grow unbounded
        while let Some(msg) = bus.pop() {
            match msg.view() {
                gst::MessageView::Eos(_) => {
                    log::debug!("Surface {} reached EOS, looping", self.id);
                    if let Some(pipeline) = self.loaded.pipeline.as_ref() {
                        crate::log_and_continue!(
                            pipeline.seek_simple(
                                gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
                                gst::ClockTime::ZERO,
                            ),
                            "loop clip"
                        );
                    }
                }
                gst::MessageView::Error(err) => {
                    log::error!(
                        "Surface {} GStreamer error: {} (debug: {:?})",
                        self.id,
                        err.error(),
                        err.debug()
                    );
                    self.fail(err.error().to_string());
                    return;
                }
                _ => {}
            }
        }
    }
}

impl Drop for GstSurface {
    fn drop(&mut self) {
        if let Some(pipeline) = self.loaded.pipeline.take() {
            shutdown_pipeline(&pipeline);
        }
        let _ = self.prerolled.claim(None, |pipeline| shutdown_pipeline(&pipeline));
    }
}

/// Build, preroll and measure a pipeline for `path`
fn load(
    path: &Path,
    id: SurfaceId,
    target: Arc<dyn RenderTarget>,
    width: u32,
    height: u32,
) -> Result<(gst::Pipeline, Duration), SurfaceError> {
    if !path.is_file() {
        return Err(SurfaceError::AssetUnavailable(path.to_path_buf()));
    }

    let (pipeline, app_sink) = build_pipeline(path, width, height)
        .map_err(|e| SurfaceError::Decode(format!("{:#}", e)))?;
    configure_app_sink(&app_sink);
    setup_frame_callback(&app_sink, id, target);

    let prerolled = pipeline
        .set_state(gst::State::Paused)
        .map_err(|e| e.to_string())
        .and_then(|_| {
            let (result, _, _) = pipeline.state(Some(gst::ClockTime::from_seconds(
                PREROLL_TIMEOUT_SECS,
            )));
            result.map(|_| ()).map_err(|e| e.to_string())
        });

    if let Err(e) = prerolled {
        let reason = first_bus_error(&pipeline).unwrap_or(e);
        shutdown_pipeline(&pipeline);
        return Err(SurfaceError::Decode(reason));
    }

    let duration = pipeline
        .query_duration::<gst::ClockTime>()
        .map(|d| Duration::from_nanos(d.nseconds()))
        .filter(|d| !d.is_zero());

    match duration {
        Some(duration) => {
            log::debug!(
                "Surface {} prerolled {} ({} ms)",
                id,
                path.display(),
                duration.as_millis()
            );
            Ok((pipeline, duration))
        }
        None => {
            shutdown_pipeline(&pipeline);
            Err(SurfaceError::Decode("unknown or zero duration".to_string()))
        }
    }
}

fn build_pipeline(
    path: &Path,
    width: u32,
    height: u32,
) -> Result<(gst::Pipeline, gst_app::AppSink)> {
    let pipeline_str = format!(
        "filesrc name=src ! decodebin ! videoconvert ! videoscale ! video/x-raw,format=BGRA,width={},height={} ! appsink name=sink",
        width, height
    );
    log::debug!("GStreamer pipeline: {}", pipeline_str);

    let pipeline = gst::parse::launch(&pipeline_str)
        .context("Failed to create GStreamer pipeline")?
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| anyhow::anyhow!("Pipeline is not a gst::Pipeline"))?;

    pipeline
        .by_name("src")
        .context("Failed to get filesrc from pipeline")?
        .set_property("location", path.to_string_lossy().as_ref());

    let app_sink = pipeline
        .by_name("sink")
        .context("Failed to get appsink from pipeline")?
        .dynamic_cast::<gst_app::AppSink>()
        .map_err(|_| anyhow::anyhow!("sink is not an AppSink"))?;

    Ok((pipeline, app_sink))
}

/// Frame pacing follows stream timestamps; only the newest frame is kept
fn configure_app_sink(app_sink: &gst_app::AppSink) {
    app_sink.set_property("sync", true);
    app_sink.set_property("max-buffers", 1u32);
    app_sink.set_property("drop", true);
}

fn setup_frame_callback(app_sink: &gst_app::AppSink, id: SurfaceId, target: Arc<dyn RenderTarget>) {
    app_sink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let info = sample
                    .caps()
                    .and_then(|caps| gst_video::VideoInfo::from_caps(caps).ok())
                    .ok_or(gst::FlowError::NotNegotiated)?;
                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                target.present_frame(
                    id,
                    Frame {
                        width: info.width(),
                        height: info.height(),
                        data: map.as_slice().to_vec(),
                    },
                );

                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
}

fn first_bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    while let Some(msg) = bus.pop() {
        if let gst::MessageView::Error(err) = msg.view() {
            return Some(err.error().to_string());
        }
    }
    None
}

fn shutdown_pipeline(pipeline: &gst::Pipeline) {
    if let Err(e) = pipeline.set_state(gst::State::Null) {
        log::warn!("Failed to set pipeline state to Null: {}", e);
        return;
    }

    let (result, _, _) = pipeline.state(Some(gst::ClockTime::from_seconds(2)));
    if let Err(e) = result {
        log::warn!("Pipeline did not reach Null: {:?}", e);
    }

    if let Some(bus) = pipeline.bus() {
        while bus.pop().is_some() {}
    }
}

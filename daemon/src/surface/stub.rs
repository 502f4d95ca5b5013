//! Timing-only engine for builds without the `video` feature.
//!
//! Clips are never decoded: prepare checks that the file exists and reports a
//! fixed duration, and position is left to the slot's wall clock fallback.

use super::worker::WorkerHandle;
use super::{
    EventSink, PlaybackSurface, RenderTarget, SurfaceError, SurfaceEvent, SurfaceId, Ticket,
};
use crate::asset::Asset;
use std::sync::Arc;
use std::time::Duration;

pub struct StubSurface {
    id: SurfaceId,
    target: Arc<dyn RenderTarget>,
    worker: Option<WorkerHandle>,
    sink: EventSink,
    duration: Duration,
}

impl StubSurface {
    pub fn new(
        id: SurfaceId,
        target: Arc<dyn RenderTarget>,
        worker: WorkerHandle,
        sink: EventSink,
        duration: Duration,
    ) -> Self {
        target.attach_surface(id);
        Self {
            id,
            target,
            worker: Some(worker),
            sink,
            duration,
        }
    }
}

impl PlaybackSurface for StubSurface {
    fn is_attached(&self) -> bool {
        self.target.is_attached(self.id)
    }

    fn prepare(&mut self, asset: &Asset, ticket: Ticket) {
        let path = asset.path().to_path_buf();
        let duration = self.duration;
        let sink = self.sink.clone();

        let submitted = self.worker.as_ref().is_some_and(|worker| {
            worker.submit(move || {
                let event = if path.is_file() {
                    SurfaceEvent::ready(ticket, duration)
                } else {
                    SurfaceEvent::error(ticket, SurfaceError::AssetUnavailable(path))
                };
                let _ = sink.send(event);
            })
        });

        if !submitted {
            let _ = self
                .sink
                .send(SurfaceEvent::error(ticket, SurfaceError::Released));
        }
    }

    fn begin(&mut self) {
        log::trace!("Stub surface {} begin", self.id);
    }

    fn set_opacity(&mut self, opacity: f32) {
        self.target.set_opacity(self.id, opacity);
    }

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    fn stop(&mut self) {}

    fn release(&mut self) {
        self.target.set_opacity(self.id, 0.0);
        self.worker = None;
    }

    fn position(&self) -> Option<Duration> {
        None
    }
}

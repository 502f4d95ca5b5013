//! Playback surfaces.
//!
//! A playback surface owns one decode pipeline and renders into a
//! [`RenderTarget`]. The scheduler owns exactly two of them for the whole
//! session and reuses them between clips, never recreating decoders.
//!
//! - `slot`: per-surface lifecycle state, generations and opacity
//! - `monitor`: position-polling near-completion detection
//! - `worker`: the single dedicated prepare worker
//! - `frames`: shared latest-frame render target
//! - `gst` / `stub`: engine implementations (GStreamer, or a timing stub
//!   when built without the `video` feature)
//!
//! # Events
//!
//! Engines report asynchronously through an [`EventSink`]. Every event carries
//! the [`Ticket`] it was issued for, so results belonging to a superseded
//! clip are recognised and dropped by the consumer.

mod frames;
mod monitor;
mod slot;
mod worker;

#[cfg(feature = "video")]
mod gst;
#[cfg(not(feature = "video"))]
mod stub;

pub use frames::{Frame, SharedFrames};
pub use monitor::CompletionMonitor;
pub use slot::{SlotState, SurfaceSlot};
pub use worker::PrepareWorker;

#[cfg(feature = "video")]
pub use self::gst::{GstSurface, initialize as initialize_gstreamer};
#[cfg(not(feature = "video"))]
pub use stub::StubSurface;

use crate::asset::Asset;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Which of the two surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceId {
    A,
    B,
}

impl SurfaceId {
    pub const ALL: [SurfaceId; 2] = [SurfaceId::A, SurfaceId::B];

    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

/// Identifies one prepare request: the surface and its clip generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub surface: SurfaceId,
    pub generation: u64,
}

/// Failures reported by a playback surface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("asset unavailable: {}", .0.display())]
    AssetUnavailable(PathBuf),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("surface released")]
    Released,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEventKind {
    /// Buffered and duration known
    Ready { duration: Duration },
    /// Open, decode or IO failure
    Error(SurfaceError),
    /// The playing clip is within the lookahead window of its end
    NearCompletion { remaining: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceEvent {
    pub ticket: Ticket,
    pub kind: SurfaceEventKind,
}

impl SurfaceEvent {
    pub fn ready(ticket: Ticket, duration: Duration) -> Self {
        Self {
            ticket,
            kind: SurfaceEventKind::Ready { duration },
        }
    }

    pub fn error(ticket: Ticket, error: SurfaceError) -> Self {
        Self {
            ticket,
            kind: SurfaceEventKind::Error(error),
        }
    }
}

/// Channel engines use to hand results back to the control loop
pub type EventSink = mpsc::UnboundedSender<SurfaceEvent>;

/// One decode/playback pipeline.
///
/// No method may block: opening and buffering happen off the control loop and
/// complete through the engine's [`EventSink`]. Playback is always muted and
/// looping, so a late crossfade never exposes an ended stream. Decoder faults
/// are converted to [`SurfaceEventKind::Error`], never propagated.
pub trait PlaybackSurface: Send {
    /// Whether the render target for this surface is attached and usable
    fn is_attached(&self) -> bool;

    /// Open and buffer `asset` without becoming visible or audible
    fn prepare(&mut self, asset: &Asset, ticket: Ticket);

    /// Start playback from position 0; no-op when already playing
    fn begin(&mut self);

    fn set_opacity(&mut self, opacity: f32);

    fn pause(&mut self);

    fn resume(&mut self);

    /// Stop playback and drop the loaded clip; the surface stays reusable
    fn stop(&mut self);

    /// Terminal: release decoder resources
    fn release(&mut self);

    /// Current playback position, when the engine can report one
    fn position(&self) -> Option<Duration>;

    /// Drain engine-side messages (end-of-stream looping, late decode errors)
    fn service(&mut self) {}
}

/// Capability interface of the compositing surface a pipeline renders into
pub trait RenderTarget: Send + Sync {
    /// Bind a playback surface; returns whether the target is ready for it
    fn attach_surface(&self, surface: SurfaceId) -> bool;

    fn is_attached(&self, surface: SurfaceId) -> bool;

    fn set_opacity(&self, surface: SurfaceId, opacity: f32);

    fn present_frame(&self, surface: SurfaceId, frame: Frame);
}

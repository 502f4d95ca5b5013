//! Latest-frame render target
//!
//! Decoders push BGRA frames from their streaming threads; the compositor
//! side pulls whatever is newest. Frames not consumed in time are replaced and
//! counted as dropped.

use super::{RenderTarget, SurfaceId};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// One decoded frame (BGRA)
#[allow(dead_code)] // Fields read by the compositor
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Per-surface frame slot
#[derive(Default)]
struct Layer {
    attached: AtomicBool,
    current: Mutex<Option<Frame>>,
    new_frame_available: AtomicBool,
    /// Opacity stored as f32 bits
    opacity: AtomicU32,
    frames_presented: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Frame counters for one surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub dropped: u64,
}

impl FrameStats {
    /// Share of presented frames replaced before the compositor took them
    pub fn drop_rate(&self) -> f64 {
        if self.presented == 0 {
            0.0
        } else {
            (self.dropped as f64 / self.presented as f64) * 100.0
        }
    }
}

/// Two-layer render target shared between decoders and the compositor
#[derive(Default)]
pub struct SharedFrames {
    layers: [Layer; 2],
}

impl SharedFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the newest frame if one arrived since the last call
    #[allow(dead_code)] // Compositor side
    pub fn take_new_frame(&self, surface: SurfaceId) -> Option<Frame> {
        let layer = &self.layers[surface.index()];
        if !layer.new_frame_available.swap(false, Ordering::AcqRel) {
            return None;
        }
        layer.current.lock().ok()?.clone()
    }

    #[allow(dead_code)] // Compositor side
    pub fn opacity(&self, surface: SurfaceId) -> f32 {
        f32::from_bits(self.layers[surface.index()].opacity.load(Ordering::Acquire))
    }

    pub fn stats(&self, surface: SurfaceId) -> FrameStats {
        let layer = &self.layers[surface.index()];
        FrameStats {
            presented: layer.frames_presented.load(Ordering::Relaxed),
            dropped: layer.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl RenderTarget for SharedFrames {
    fn attach_surface(&self, surface: SurfaceId) -> bool {
        self.layers[surface.index()]
            .attached
            .store(true, Ordering::Release);
        log::debug!("Surface {} attached to render target", surface);
        true
    }

    fn is_attached(&self, surface: SurfaceId) -> bool {
        self.layers[surface.index()].attached.load(Ordering::Acquire)
    }

    fn set_opacity(&self, surface: SurfaceId, opacity: f32) {
        self.layers[surface.index()]
            .opacity
            .store(opacity.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }

    fn present_frame(&self, surface: SurfaceId, frame: Frame) {
        let layer = &self.layers[surface.index()];
        if let Ok(mut current) = layer.current.lock() {
            if layer.new_frame_available.load(Ordering::Relaxed) {
                layer.frames_dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("Surface {} frame dropped (previous not consumed)", surface);
            }
            *current = Some(frame);
            layer.new_frame_available.store(true, Ordering::Release);
            layer.frames_presented.fetch_add(1, Ordering::Relaxed);
        }
    }
}

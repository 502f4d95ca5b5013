use super::{
    CompletionMonitor, PlaybackSurface, SurfaceEvent, SurfaceEventKind, SurfaceId, Ticket,
};
use crate::asset::Asset;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of one surface.
///
/// `Idle -> Loading -> Ready -> Playing -> Completed`, with `Failed` reachable
/// from `Loading` and `Playing`. `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Loading,
    Ready,
    Playing,
    Completed,
    Failed,
    Released,
}

/// Scheduler-side bookkeeping around one [`PlaybackSurface`].
///
/// Every `prepare` or `reset` bumps the generation; events stamped with an
/// older generation are rejected by [`SurfaceSlot::accept`].
pub struct SurfaceSlot {
    id: SurfaceId,
    engine: Box<dyn PlaybackSurface>,
    state: SlotState,
    generation: u64,
    asset: Option<Arc<Asset>>,
    brightness: f32,
    opacity: f32,
    duration: Option<Duration>,
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
    monitor: Option<CompletionMonitor>,
}

impl SurfaceSlot {
    pub fn new(id: SurfaceId, engine: Box<dyn PlaybackSurface>) -> Self {
        Self {
            id,
            engine,
            state: SlotState::Idle,
            generation: 0,
            asset: None,
            brightness: 1.0,
            opacity: 0.0,
            duration: None,
            started_at: None,
            paused_at: None,
            paused_total: Duration::ZERO,
            monitor: None,
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn asset(&self) -> Option<&Arc<Asset>> {
        self.asset.as_ref()
    }

    /// Peak opacity for the loaded clip
    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// When `begin()` was issued for the current clip
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn is_attached(&self) -> bool {
        self.engine.is_attached()
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            surface: self.id,
            generation: self.generation,
        }
    }

    /// Start loading `asset` invisibly; returns the ticket results will carry
    pub fn prepare(&mut self, asset: Arc<Asset>, brightness: f32) -> Option<Ticket> {
        if self.state == SlotState::Released {
            return None;
        }

        if matches!(self.state, SlotState::Playing | SlotState::Ready) {
            self.engine.stop();
        }

        self.generation += 1;
        self.state = SlotState::Loading;
        self.duration = None;
        self.started_at = None;
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
        self.monitor = None;
        self.brightness = brightness;
        self.apply_opacity(0.0);

        let ticket = self.ticket();
        log::debug!(
            "Surface {} preparing {} (generation {}, brightness {:.2})",
            self.id,
            asset.name(),
            self.generation,
            brightness
        );
        self.engine.prepare(&asset, ticket);
        self.asset = Some(asset);
        Some(ticket)
    }

    /// Validate an engine event against the current generation and state,
    /// applying its effect. Returns false for stale or out-of-order events.
    pub fn accept(&mut self, event: &SurfaceEvent) -> bool {
        if event.ticket.surface != self.id || event.ticket.generation != self.generation {
            return false;
        }

        match (&event.kind, self.state) {
            (SurfaceEventKind::Ready { duration }, SlotState::Loading) => {
                self.duration = Some(*duration);
                self.state = SlotState::Ready;
                true
            }
            (SurfaceEventKind::Error(_), SlotState::Loading | SlotState::Ready | SlotState::Playing) => {
                self.engine.stop();
                self.state = SlotState::Failed;
                self.monitor = None;
                true
            }
            (SurfaceEventKind::NearCompletion { .. }, SlotState::Playing) => true,
            _ => false,
        }
    }

    /// Start playback; no-op unless the clip is ready
    pub fn begin(&mut self, now: Instant) -> bool {
        match self.state {
            SlotState::Ready => {
                self.engine.begin();
                self.state = SlotState::Playing;
                self.started_at = Some(now);
                self.paused_at = None;
                self.paused_total = Duration::ZERO;
                log::debug!("Surface {} playing", self.id);
                true
            }
            SlotState::Playing => true,
            _ => false,
        }
    }

    /// Watch the playing clip for the end of its reported duration
    pub fn arm_monitor(&mut self, window: Duration, interval: Duration, now: Instant) {
        if let (SlotState::Playing, Some(duration)) = (self.state, self.duration) {
            self.monitor = Some(CompletionMonitor::new(duration, window, interval, now));
        }
    }

    pub fn next_poll(&self) -> Option<Instant> {
        if self.paused_at.is_some() {
            return None;
        }
        self.monitor.as_ref().and_then(CompletionMonitor::next_check)
    }

    /// Service the engine and run the completion monitor when due
    pub fn poll(&mut self, now: Instant) -> Option<SurfaceEvent> {
        if self.state != SlotState::Playing || self.paused_at.is_some() {
            return None;
        }

        self.engine.service();

        let position = self.position(now);
        let remaining = self.monitor.as_mut()?.check(now, position?)?;
        Some(SurfaceEvent {
            ticket: self.ticket(),
            kind: SurfaceEventKind::NearCompletion { remaining },
        })
    }

    /// Engine-reported position, else time played since `begin()`
    pub fn position(&self, now: Instant) -> Option<Duration> {
        if let Some(position) = self.engine.position() {
            return Some(position);
        }

        let started = self.started_at?;
        let paused = self.paused_total
            + self
                .paused_at
                .map(|at| now.saturating_duration_since(at))
                .unwrap_or_default();
        Some(now.saturating_duration_since(started).saturating_sub(paused))
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.apply_opacity(opacity);
    }

    fn apply_opacity(&mut self, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity != self.opacity {
            self.opacity = opacity;
            self.engine.set_opacity(opacity);
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_some() || self.state == SlotState::Released {
            return;
        }
        self.paused_at = Some(now);
        if self.state == SlotState::Playing {
            self.engine.pause();
        }
    }

    pub fn resume(&mut self, now: Instant) {
        let Some(at) = self.paused_at.take() else {
            return;
        };
        self.paused_total += now.saturating_duration_since(at);
        if self.state == SlotState::Playing {
            self.engine.resume();
            if let Some(monitor) = self.monitor.as_mut() {
                monitor.delay(now);
            }
        }
    }

    /// The clip finished its turn as current; keep the surface for reuse
    pub fn finish(&mut self) {
        self.halt(SlotState::Completed);
    }

    /// Cancel whatever the surface is doing
    pub fn reset(&mut self) {
        self.halt(SlotState::Idle);
    }

    fn halt(&mut self, next: SlotState) {
        if self.state == SlotState::Released {
            return;
        }
        if !matches!(self.state, SlotState::Idle | SlotState::Completed) {
            self.engine.stop();
        }
        self.generation += 1;
        self.state = next;
        self.monitor = None;
        self.started_at = None;
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
        self.apply_opacity(0.0);
    }

    pub fn release(&mut self) {
        if self.state == SlotState::Released {
            return;
        }
        self.apply_opacity(0.0);
        self.engine.release();
        self.generation += 1;
        self.state = SlotState::Released;
        self.monitor = None;
        self.asset = None;
        log::debug!("Surface {} released", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockLog, MockSurface};
    use std::sync::Mutex;

    fn slot() -> (SurfaceSlot, Arc<Mutex<MockLog>>) {
        let log = Arc::new(Mutex::new(MockLog::default()));
        let engine = MockSurface::new(SurfaceId::A, log.clone());
        (SurfaceSlot::new(SurfaceId::A, Box::new(engine)), log)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_stale_events_rejected() {
        let (mut slot, _) = slot();
        let first = slot.prepare(Arc::new(Asset::new("a.mp4")), 1.0).unwrap();
        let second = slot.prepare(Arc::new(Asset::new("b.mp4")), 1.0).unwrap();
        assert_ne!(first.generation, second.generation);

        assert!(!slot.accept(&SurfaceEvent::ready(first, ms(5000))));
        assert_eq!(slot.state(), SlotState::Loading);

        assert!(slot.accept(&SurfaceEvent::ready(second, ms(4000))));
        assert_eq!(slot.state(), SlotState::Ready);
        assert_eq!(slot.duration(), Some(ms(4000)));

        // Duplicate delivery is out of order now
        assert!(!slot.accept(&SurfaceEvent::ready(second, ms(4000))));
    }

    #[test]
    fn test_reset_supersedes_in_flight_prepare() {
        let (mut slot, _) = slot();
        let ticket = slot.prepare(Arc::new(Asset::new("a.mp4")), 1.0).unwrap();
        slot.reset();
        assert!(!slot.accept(&SurfaceEvent::ready(ticket, ms(5000))));
        assert_eq!(slot.state(), SlotState::Idle);
    }

    #[test]
    fn test_begin_requires_ready() {
        let t0 = Instant::now();
        let (mut slot, log) = slot();
        assert!(!slot.begin(t0));

        let ticket = slot.prepare(Arc::new(Asset::new("a.mp4")), 1.0).unwrap();
        assert!(!slot.begin(t0));

        slot.accept(&SurfaceEvent::ready(ticket, ms(5000)));
        assert!(slot.begin(t0));
        assert!(slot.begin(t0 + ms(10)));
        assert_eq!(slot.started_at(), Some(t0));

        let begins = log
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(_, c)| *c == Call::Begin)
            .count();
        assert_eq!(begins, 1);
    }

    #[test]
    fn test_position_falls_back_to_wall_clock_minus_pauses() {
        let t0 = Instant::now();
        let (mut slot, _) = slot();
        let ticket = slot.prepare(Arc::new(Asset::new("a.mp4")), 1.0).unwrap();
        slot.accept(&SurfaceEvent::ready(ticket, ms(5000)));
        slot.begin(t0);

        slot.pause(t0 + ms(1000));
        assert_eq!(slot.position(t0 + ms(60_000)), Some(ms(1000)));
        slot.resume(t0 + ms(61_000));
        assert_eq!(slot.position(t0 + ms(61_500)), Some(ms(1500)));
    }

    #[test]
    fn test_near_completion_polled_once() {
        let t0 = Instant::now();
        let (mut slot, _) = slot();
        let ticket = slot.prepare(Arc::new(Asset::new("a.mp4")), 1.0).unwrap();
        slot.accept(&SurfaceEvent::ready(ticket, ms(2000)));
        slot.begin(t0);
        slot.arm_monitor(ms(1200), ms(100), t0);

        assert_eq!(slot.next_poll(), Some(t0 + ms(100)));
        assert!(slot.poll(t0 + ms(700)).is_none());

        let event = slot.poll(t0 + ms(800)).unwrap();
        assert_eq!(
            event.kind,
            SurfaceEventKind::NearCompletion {
                remaining: ms(1200)
            }
        );
        assert!(slot.accept(&event));
        assert!(slot.next_poll().is_none());
        assert!(slot.poll(t0 + ms(900)).is_none());
    }

    #[test]
    fn test_opacity_forwarded_only_on_change() {
        let (mut slot, log) = slot();
        slot.set_opacity(0.5);
        slot.set_opacity(0.5);
        slot.set_opacity(2.0);
        assert_eq!(slot.opacity(), 1.0);

        let opacities: Vec<f32> = log
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|(_, c)| match c {
                Call::Opacity(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(opacities, vec![0.5, 1.0]);
    }

    #[test]
    fn test_released_is_terminal() {
        let (mut slot, log) = slot();
        slot.release();
        slot.release();
        assert_eq!(slot.state(), SlotState::Released);
        assert!(slot.prepare(Arc::new(Asset::new("a.mp4")), 1.0).is_none());

        let releases = log
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(_, c)| *c == Call::Release)
            .count();
        assert_eq!(releases, 1);
    }
}

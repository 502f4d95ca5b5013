//! Dual-surface crossfade scheduler.
//!
//! Two playback surfaces alternate between *current* (visible) and
//! *standby* (loading the next clip invisibly). Every cycle runs
//! prepare, start, crossfade and swap, all deadlines derived from the
//! current clip's start time and reported duration:
//!
//! ```text
//! ends_at      = started_at + duration
//! prepare_at   = ends_at - fade - prepare_lead
//! crossfade_at = ends_at - fade
//! start_at     = crossfade_at - start_advance
//! ```
//!
//! The scheduler never reads the clock: every entry point takes `now`. The
//! control loop drives it with [`CrossfadeScheduler::tick`] at
//! [`CrossfadeScheduler::next_deadline`] and feeds surface events through
//! [`CrossfadeScheduler::handle_event`], all on one task.

mod phase;
mod ramp;
mod timers;


pub use phase::Phase;
use phase::{Action, Signal};
use ramp::Ramp;
use timers::{TimerKind, Timers};

use crate::selector::ContentSelector;
use crate::surface::{
    PlaybackSurface, PrepareWorker, SlotState, SurfaceError, SurfaceEvent, SurfaceEventKind,
    SurfaceId, SurfaceSlot,
};
use common::{BackdropColor, Mode};
use std::time::{Duration, Instant};

/// Upper bound on timers fired within one tick
const MAX_TIMER_STEPS: usize = 32;

/// Scheduler timing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Length of every opacity ramp
    pub fade: Duration,
    /// How long before the crossfade window the standby starts loading
    pub prepare_lead: Duration,
    /// How long before the crossfade the standby starts playing
    pub start_advance: Duration,
    /// Lookahead for near-completion detection
    pub near_completion: Duration,
    pub retry_backoff: Duration,
    /// Re-check interval while the crossfade waits for the standby
    pub fade_poll: Duration,
    /// Delay between a late `begin()` and the crossfade ramp
    pub start_settle: Duration,
    pub position_poll: Duration,
    /// Opacity update cadence during ramps
    pub frame_interval: Duration,
    /// Poll interval while waiting for render targets
    pub surface_poll: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            fade: Duration::from_millis(1000),
            prepare_lead: Duration::from_millis(2000),
            start_advance: Duration::from_millis(300),
            near_completion: Duration::from_millis(1200),
            retry_backoff: Duration::from_millis(500),
            fade_poll: Duration::from_millis(50),
            start_settle: Duration::from_millis(100),
            position_poll: Duration::from_millis(100),
            frame_interval: Duration::from_millis(16),
            surface_poll: Duration::from_millis(100),
        }
    }
}

/// What the compositor should show right now
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayState {
    /// Opacity of surface A and B
    pub opacity: [f32; 2],
    /// Full-screen colour behind (or instead of) the video layers
    pub backdrop: Option<BackdropColor>,
}

/// Start time and reported duration of the visible clip
#[derive(Debug, Clone, Copy)]
struct ClipClock {
    started_at: Instant,
    duration: Duration,
}

impl ClipClock {
    fn ends_at(&self) -> Instant {
        self.started_at + self.duration
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.ends_at().saturating_duration_since(now)
    }

    /// `lead` before the end of the clip, never earlier than `now`
    fn before_end(&self, lead: Duration, now: Instant) -> Instant {
        self.ends_at()
            .checked_sub(lead)
            .map_or(now, |at| at.max(now))
    }
}

#[derive(Debug, Clone, Copy)]
struct FadeIn {
    ramp: Ramp,
    to: f32,
}

#[derive(Debug, Clone, Copy)]
struct Crossfade {
    ramp: Ramp,
    /// Outgoing clip's opacity at ramp start
    from: f32,
    /// Incoming clip's brightness at ramp end
    to: f32,
}

pub struct CrossfadeScheduler {
    slots: [SurfaceSlot; 2],
    current: SurfaceId,
    phase: Phase,
    timers: Timers,
    timing: Timing,
    selector: ContentSelector,
    mode: Mode,
    clip: Option<ClipClock>,
    fade_in: Option<FadeIn>,
    crossfade: Option<Crossfade>,
    last_frame: Option<Instant>,
    paused_at: Option<Instant>,
    /// Surface events that arrived while paused, replayed on resume
    deferred: Vec<SurfaceEvent>,
    backdrop: Option<BackdropColor>,
    first_failures: usize,
    /// Standby failures since the current clip itself failed
    stranded_failures: usize,
    worker: Option<PrepareWorker>,
}

impl CrossfadeScheduler {
    pub fn new(
        engines: [Box<dyn PlaybackSurface>; 2],
        selector: ContentSelector,
        timing: Timing,
    ) -> Self {
        let [a, b] = engines;
        Self {
            slots: [
                SurfaceSlot::new(SurfaceId::A, a),
                SurfaceSlot::new(SurfaceId::B, b),
            ],
            current: SurfaceId::A,
            phase: Phase::Idle,
            timers: Timers::default(),
            timing,
            selector,
            mode: Mode::default(),
            clip: None,
            fade_in: None,
            crossfade: None,
            last_frame: None,
            paused_at: None,
            deferred: Vec::new(),
            backdrop: None,
            first_failures: 0,
            stranded_failures: 0,
            worker: None,
        }
    }

    /// Hand over the prepare worker so release can join it
    pub fn with_worker(mut self, worker: PrepareWorker) -> Self {
        self.worker = Some(worker);
        self
    }

    fn slot(&self, id: SurfaceId) -> &SurfaceSlot {
        &self.slots[id.index()]
    }

    fn slot_mut(&mut self, id: SurfaceId) -> &mut SurfaceSlot {
        &mut self.slots[id.index()]
    }

    fn standby(&self) -> SurfaceId {
        self.current.other()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Whether a playback cycle is running (or trying to start)
    pub fn is_advancing(&self) -> bool {
        self.phase.is_advancing()
    }

    pub fn catalog_len(&self) -> usize {
        self.selector.catalog_len()
    }

    #[cfg(test)]
    fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Replace the catalog; takes effect at the next selection
    pub fn set_catalog<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<std::path::PathBuf>,
    {
        self.selector.set_catalog(paths);
    }

    /// Record the active mode; consulted at the next selection
    pub fn apply_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if self.backdrop.is_some() {
            self.backdrop = Some(BackdropColor::for_day(mode.is_day));
        }
    }

    /// Cancel everything and start over from the first clip
    pub fn restart(&mut self, now: Instant) {
        if self.phase == Phase::Released {
            return;
        }

        self.halt_cycle();
        self.current = SurfaceId::A;
        self.first_failures = 0;
        self.stranded_failures = 0;
        self.backdrop = None;

        if self.selector.is_empty() {
            self.go_idle();
            return;
        }

        log::info!("Starting playback ({} clips, mode {})", self.catalog_len(), self.mode);
        self.set_phase(Phase::AwaitingSurfaces);
        self.timers.arm(TimerKind::Prepare, now);
    }

    /// Stop video and show a plain colour instead
    pub fn enter_backdrop(&mut self, color: BackdropColor) {
        if self.phase == Phase::Released {
            return;
        }
        if self.phase != Phase::Backdrop {
            log::info!("Video suppressed for mode {}, showing {:?} backdrop", self.mode, color);
        }
        self.halt_cycle();
        self.set_phase(Phase::Backdrop);
        self.backdrop = Some(color);
    }

    fn go_idle(&mut self) {
        log::warn!("No playable clips for mode {}, showing backdrop", self.mode);
        self.halt_cycle();
        self.set_phase(Phase::Idle);
        self.backdrop = Some(BackdropColor::for_day(self.mode.is_day));
    }

    fn halt_cycle(&mut self) {
        self.timers.clear();
        self.fade_in = None;
        self.crossfade = None;
        self.last_frame = None;
        self.clip = None;
        self.deferred.clear();
        for slot in &mut self.slots {
            slot.reset();
        }
    }

    fn set_phase(&mut self, next: Phase) {
        if next != self.phase {
            log::debug!("Phase {} -> {}", self.phase, next);
            self.phase = next;
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_some() || self.phase == Phase::Released {
            return;
        }

        self.paused_at = Some(now);
        self.timers.clear();
        for slot in &mut self.slots {
            slot.pause(now);
        }
        if let Some(fade) = self.fade_in.as_mut() {
            fade.ramp.freeze(now);
        }
        if let Some(fade) = self.crossfade.as_mut() {
            fade.ramp.freeze(now);
        }
        log::info!("Playback paused in phase {}", self.phase);
    }

    pub fn resume(&mut self, now: Instant) {
        let Some(paused_at) = self.paused_at.take() else {
            return;
        };

        for slot in &mut self.slots {
            slot.resume(now);
        }
        if let Some(fade) = self.fade_in.as_mut() {
            fade.ramp.thaw(now);
        }
        if let Some(fade) = self.crossfade.as_mut() {
            fade.ramp.thaw(now);
        }

        self.reschedule(now);

        for event in std::mem::take(&mut self.deferred) {
            self.dispatch_event(event, now);
        }

        log::info!(
            "Playback resumed in phase {} after {:.1}s",
            self.phase,
            now.saturating_duration_since(paused_at).as_secs_f32()
        );
    }

    /// Recompute the timers of the current phase from the clip clock.
    ///
    /// Deadlines already in the past fire immediately.
    fn reschedule(&mut self, now: Instant) {
        let fade = self.timing.fade;
        let clip = self.clip;
        let at = |lead: Duration| clip.map_or(now, |c| c.before_end(lead, now));

        match self.phase {
            Phase::AwaitingSurfaces => self.timers.arm(TimerKind::Prepare, now),
            Phase::LoadingFirst => {
                if self.slot(self.current).state() != SlotState::Loading {
                    self.timers.arm(TimerKind::Prepare, now);
                }
            }
            Phase::PlayingCurrentOnly => {
                self.timers
                    .arm(TimerKind::Prepare, at(fade + self.timing.prepare_lead));
                self.timers.arm(TimerKind::Crossfade, at(fade));
            }
            Phase::PreparingNext | Phase::NextStarted => {
                self.timers.arm(TimerKind::Crossfade, at(fade));
            }
            Phase::NextReady => {
                self.timers
                    .arm(TimerKind::Start, at(fade + self.timing.start_advance));
                self.timers.arm(TimerKind::Crossfade, at(fade));
            }
            Phase::Crossfading | Phase::Idle | Phase::Backdrop | Phase::Released => {}
        }
    }

    /// Tear down for good; every later call is a no-op
    pub fn release(&mut self) {
        if self.phase == Phase::Released {
            return;
        }

        self.timers.clear();
        self.fade_in = None;
        self.crossfade = None;
        self.deferred.clear();
        self.backdrop = None;
        for slot in &mut self.slots {
            slot.release();
        }
        self.set_phase(Phase::Released);

        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
        log::info!("Scheduler released");
    }

    /// When `tick` next needs to run; `None` while paused, released or idle
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.phase == Phase::Released || self.paused_at.is_some() {
            return None;
        }

        let ramp = self
            .crossfade
            .map(|f| f.ramp)
            .or_else(|| self.fade_in.map(|f| f.ramp));
        let frame = ramp.map(|ramp| {
            let next = self
                .last_frame
                .map_or(ramp.ends_at(), |t| t + self.timing.frame_interval);
            next.min(ramp.ends_at())
        });

        [
            self.timers.next_deadline(),
            self.slots[0].next_poll(),
            self.slots[1].next_poll(),
            frame,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Advance ramps, poll surfaces and fire every timer due at `now`
    pub fn tick(&mut self, now: Instant) {
        if self.phase == Phase::Released || self.paused_at.is_some() {
            return;
        }

        for id in SurfaceId::ALL {
            if let Some(event) = self.slot_mut(id).poll(now) {
                self.dispatch_event(event, now);
            }
        }

        self.update_fades(now);

        for _ in 0..MAX_TIMER_STEPS {
            if self.paused_at.is_some() {
                break;
            }
            let Some(kind) = self.timers.pop_due(now) else {
                return;
            };
            self.fire(kind, now);
        }
        log::trace!("Timer step limit reached, continuing next tick");
    }

    /// Entry point for results reported by the surfaces
    pub fn handle_event(&mut self, event: SurfaceEvent, now: Instant) {
        if self.phase == Phase::Released {
            return;
        }
        if self.paused_at.is_some() {
            self.deferred.push(event);
            return;
        }
        self.dispatch_event(event, now);
    }

    fn dispatch_event(&mut self, event: SurfaceEvent, now: Instant) {
        let event = match event.kind {
            SurfaceEventKind::Ready { duration } if duration.is_zero() => SurfaceEvent::error(
                event.ticket,
                SurfaceError::Decode("reported zero duration".to_string()),
            ),
            _ => event,
        };
        let id = event.ticket.surface;
        if !self.slot_mut(id).accept(&event) {
            log::trace!(
                "Dropping stale {:?} from surface {} (generation {})",
                event.kind,
                id,
                event.ticket.generation
            );
            return;
        }

        let is_current = id == self.current;
        let signal = match event.kind {
            SurfaceEventKind::Ready { .. } if is_current => Signal::FirstReady,
            SurfaceEventKind::Ready { .. } => Signal::StandbyReady,
            SurfaceEventKind::Error(ref e) => {
                let name = self
                    .slot(id)
                    .asset()
                    .map_or("<none>", |a| a.name())
                    .to_string();
                log::warn!("Surface {} failed on {}: {}", id, name, e);
                match (is_current, self.phase) {
                    (true, Phase::LoadingFirst) => Signal::FirstFailed,
                    (true, _) => Signal::CurrentFailed,
                    (false, _) => Signal::StandbyFailed,
                }
            }
            SurfaceEventKind::NearCompletion { remaining } if is_current => {
                Signal::NearCompletion { remaining }
            }
            SurfaceEventKind::NearCompletion { .. } => return,
        };

        self.dispatch(signal, now);
    }

    fn fire(&mut self, kind: TimerKind, now: Instant) {
        match kind {
            TimerKind::Prepare if self.phase == Phase::AwaitingSurfaces => {
                if self.slots.iter().all(SurfaceSlot::is_attached) {
                    self.dispatch(Signal::SurfacesReady, now);
                } else {
                    log::trace!("Render targets not attached yet");
                    self.timers
                        .arm(TimerKind::Prepare, now + self.timing.surface_poll);
                }
            }
            TimerKind::Prepare => self.dispatch(Signal::PrepareDue, now),
            TimerKind::Start => self.dispatch(Signal::StartDue, now),
            TimerKind::Crossfade => {
                // A standby started moments ago gets to render before the ramp
                if self.phase == Phase::NextStarted
                    && let Some(began) = self.slot(self.standby()).started_at()
                {
                    let settled = began + self.timing.start_settle;
                    if now < settled {
                        self.timers.arm(TimerKind::Crossfade, settled);
                        return;
                    }
                }
                self.dispatch(Signal::CrossfadeDue, now);
            }
        }
    }

    fn dispatch(&mut self, signal: Signal, now: Instant) {
        let (next, action) = self.phase.on(signal);
        if action == Action::Ignore {
            log::trace!("Ignoring {:?} in phase {}", signal, self.phase);
        }
        self.set_phase(next);
        self.perform(action, now);
    }

    fn perform(&mut self, action: Action, now: Instant) {
        let timing = self.timing;

        match action {
            Action::Ignore => {}

            Action::LoadFirst => {
                let Some(asset) = self.selector.pick_next(self.mode) else {
                    self.go_idle();
                    return;
                };
                let brightness = self.selector.brightness_for(&asset, self.mode);
                log::info!("Loading {} on surface {}", asset.name(), self.current);
                let current = self.current;
                self.slot_mut(current).prepare(asset, brightness);
            }

            Action::BeginFirst => {
                let current = self.current;
                let slot = self.slot_mut(current);
                slot.begin(now);
                slot.arm_monitor(timing.near_completion, timing.position_poll, now);
                let to = slot.brightness();
                let duration = slot.duration().unwrap_or_default();
                if let Some(asset) = slot.asset() {
                    log::info!("Playing {} on surface {}", asset.name(), current);
                }

                self.clip = Some(ClipClock {
                    started_at: now,
                    duration,
                });
                self.fade_in = Some(FadeIn {
                    ramp: Ramp::new(now, timing.fade),
                    to,
                });
                self.first_failures = 0;
                self.backdrop = None;
                self.arm_prepare(now);
                self.update_fades(now);
            }

            Action::RetryFirst => {
                self.first_failures += 1;
                if self.backdrop.is_none()
                    && self.first_failures >= self.selector.catalog_len().max(1)
                {
                    log::warn!("No clip could be loaded, showing backdrop while retrying");
                    self.backdrop = Some(BackdropColor::for_day(self.mode.is_day));
                }
                self.timers
                    .arm(TimerKind::Prepare, now + timing.retry_backoff);
            }

            Action::PrepareStandby => {
                let Some(asset) = self.selector.pick_next(self.mode) else {
                    self.go_idle();
                    return;
                };
                let brightness = self.selector.brightness_for(&asset, self.mode);
                let standby = self.standby();
                log::info!("Preparing {} on surface {}", asset.name(), standby);
                self.slot_mut(standby).prepare(asset, brightness);
            }

            Action::RetryStandby => {
                if self.crossfade.take().is_some() {
                    log::warn!("Incoming clip failed mid-crossfade, keeping current");
                    let current = self.current;
                    let slot = self.slot_mut(current);
                    let brightness = slot.brightness();
                    slot.set_opacity(brightness);
                    let standby = self.standby();
                    self.slot_mut(standby).set_opacity(0.0);
                }

                // Nothing left to show: the current clip is dead as well
                if self.slot(self.current).state() == SlotState::Failed {
                    self.stranded_failures += 1;
                    if self.backdrop.is_none()
                        && self.stranded_failures >= self.selector.catalog_len().max(1)
                    {
                        log::warn!(
                            "Current clip failed and no replacement loads, showing backdrop while retrying"
                        );
                        self.backdrop = Some(BackdropColor::for_day(self.mode.is_day));
                    }
                    if self.backdrop.is_some() {
                        let current = self.current;
                        self.slot_mut(current).set_opacity(0.0);
                    }
                }
                self.timers.cancel(TimerKind::Start);
                self.timers
                    .arm(TimerKind::Prepare, now + timing.retry_backoff);
            }

            Action::ArmStandbyTimers => {
                let clip = self.clip;
                let at = |lead: Duration| clip.map_or(now, |c| c.before_end(lead, now));
                self.timers
                    .arm(TimerKind::Start, at(timing.fade + timing.start_advance));
                self.timers.arm_earliest(TimerKind::Crossfade, at(timing.fade));
            }

            Action::BeginStandby => {
                let standby = self.standby();
                self.slot_mut(standby).begin(now);
            }

            Action::BeginStandbyThenSettle => {
                let standby = self.standby();
                self.slot_mut(standby).begin(now);
                self.timers.cancel(TimerKind::Start);
                self.timers
                    .arm(TimerKind::Crossfade, now + timing.start_settle);
            }

            Action::WaitForStandby => {
                log::debug!("Crossfade due but standby not ready, polling");
                self.timers
                    .arm(TimerKind::Crossfade, now + timing.fade_poll);
                if self.phase == Phase::PlayingCurrentOnly
                    && self.slot(self.standby()).state() != SlotState::Failed
                {
                    self.timers.arm_earliest(TimerKind::Prepare, now);
                }
            }

            Action::StartCrossfade => {
                self.timers.cancel(TimerKind::Start);
                self.timers.cancel(TimerKind::Crossfade);
                self.fade_in = None;
                self.crossfade = Some(Crossfade {
                    ramp: Ramp::new(now, timing.fade),
                    from: self.slot(self.current).opacity(),
                    to: self.slot(self.standby()).brightness(),
                });
                self.last_frame = None;
                log::debug!("Crossfade {} -> {}", self.current, self.standby());
                self.update_fades(now);
            }

            Action::Swap => {
                let outgoing = self.current;
                self.current = outgoing.other();
                self.slot_mut(outgoing).finish();
                self.crossfade = None;
                self.stranded_failures = 0;
                self.backdrop = None;

                let current = self.current;
                let slot = self.slot_mut(current);
                let brightness = slot.brightness();
                slot.set_opacity(brightness);
                slot.arm_monitor(timing.near_completion, timing.position_poll, now);
                let started_at = slot.started_at().unwrap_or(now);
                let duration = slot.duration().unwrap_or_default();
                if let Some(asset) = slot.asset() {
                    log::info!("Now showing {} on surface {}", asset.name(), current);
                }

                self.clip = Some(ClipClock {
                    started_at,
                    duration,
                });
                self.arm_prepare(now);
            }

            Action::RearmCrossfade { remaining } => {
                let at = now + remaining.saturating_sub(timing.fade);
                log::debug!("Near completion, {} ms remaining", remaining.as_millis());
                self.timers.arm_earliest(TimerKind::Crossfade, at);
                match self.phase {
                    Phase::NextReady => {
                        let start = at.checked_sub(timing.start_advance).map_or(now, |t| t.max(now));
                        self.timers.arm_earliest(TimerKind::Start, start);
                    }
                    Phase::PlayingCurrentOnly
                        if self.slot(self.standby()).state() != SlotState::Failed =>
                    {
                        self.timers.arm_earliest(TimerKind::Prepare, now);
                    }
                    _ => {}
                }
            }
        }
    }

    fn arm_prepare(&mut self, now: Instant) {
        if let Some(clip) = self.clip {
            let at = clip.before_end(self.timing.fade + self.timing.prepare_lead, now);
            self.timers.arm(TimerKind::Prepare, at);
        }
    }

    fn update_fades(&mut self, now: Instant) {
        if self.fade_in.is_none() && self.crossfade.is_none() {
            return;
        }
        self.last_frame = Some(now);

        if let Some(fade) = self.fade_in {
            let current = self.current;
            self.slot_mut(current)
                .set_opacity(fade.to * fade.ramp.progress(now));
            if fade.ramp.is_complete(now) {
                self.fade_in = None;
            }
        }

        if let Some(fade) = self.crossfade {
            let progress = fade.ramp.progress(now);
            let (current, standby) = (self.current, self.standby());
            self.slot_mut(current)
                .set_opacity(fade.from * (1.0 - progress));
            self.slot_mut(standby).set_opacity(fade.to * progress);

            if fade.ramp.is_complete(now) {
                self.dispatch(Signal::FadeComplete, now);
            }
        }
    }

    pub fn display_state(&self) -> DisplayState {
        DisplayState {
            opacity: [self.slots[0].opacity(), self.slots[1].opacity()],
            backdrop: self.backdrop,
        }
    }

    /// Clip on the visible surface
    pub fn current_clip(&self) -> Option<&str> {
        let slot = self.slot(self.current);
        match slot.state() {
            SlotState::Playing | SlotState::Loading | SlotState::Ready => {
                slot.asset().map(|a| a.name())
            }
            _ => None,
        }
    }

    /// Clip loading or playing on the standby surface
    pub fn standby_clip(&self) -> Option<&str> {
        let slot = self.slot(self.standby());
        match slot.state() {
            SlotState::Playing | SlotState::Loading | SlotState::Ready => {
                slot.asset().map(|a| a.name())
            }
            _ => None,
        }
    }

    /// Remaining time of the visible clip by the clip clock
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.clip.map(|c| c.remaining(now))
    }

    /// Surface currently visible
    #[cfg(test)]
    pub fn current_surface(&self) -> SurfaceId {
        self.current
    }
}

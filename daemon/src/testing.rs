//! Scripted surfaces and a virtual-clock harness for scheduler tests.

use crate::asset::Asset;
use crate::scheduler::{CrossfadeScheduler, Timing};
use crate::selector::{BrightnessPolicy, ContentSelector};
use crate::surface::{PlaybackSurface, SurfaceError, SurfaceEvent, SurfaceId, Ticket};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Prepare { name: String, ticket: Ticket },
    Begin,
    Opacity(f32),
    Pause,
    Resume,
    Stop,
    Release,
}

#[derive(Debug, Default)]
pub struct MockLog {
    pub calls: Vec<(SurfaceId, Call)>,
    pub detached: [bool; 2],
    pub positions: [Option<Duration>; 2],
}

/// Records every call; results are delivered by the harness
pub struct MockSurface {
    id: SurfaceId,
    log: Arc<Mutex<MockLog>>,
}

impl MockSurface {
    pub fn new(id: SurfaceId, log: Arc<Mutex<MockLog>>) -> Self {
        Self { id, log }
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().calls.push((self.id, call));
    }
}

impl PlaybackSurface for MockSurface {
    fn is_attached(&self) -> bool {
        !self.log.lock().unwrap().detached[self.id.index()]
    }

    fn prepare(&mut self, asset: &Asset, ticket: Ticket) {
        self.record(Call::Prepare {
            name: asset.name().to_string(),
            ticket,
        });
    }

    fn begin(&mut self) {
        self.record(Call::Begin);
    }

    fn set_opacity(&mut self, opacity: f32) {
        self.record(Call::Opacity(opacity));
    }

    fn pause(&mut self) {
        self.record(Call::Pause);
    }

    fn resume(&mut self) {
        self.record(Call::Resume);
    }

    fn stop(&mut self) {
        self.record(Call::Stop);
    }

    fn release(&mut self) {
        self.record(Call::Release);
    }

    fn position(&self) -> Option<Duration> {
        self.log.lock().unwrap().positions[self.id.index()]
    }
}

pub fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

/// Discrete-event driver: jumps virtual time from deadline to deadline and
/// answers every `prepare` from a per-clip script.
pub struct Harness {
    pub sched: CrossfadeScheduler,
    pub log: Arc<Mutex<MockLog>>,
    pub t0: Instant,
    pub now: Instant,
    /// Every surface call with the virtual time (ms) it was made at
    pub trace: Vec<(u64, SurfaceId, Call)>,
    durations: HashMap<String, Duration>,
    latencies: HashMap<String, Duration>,
    failing: HashSet<String>,
    default_duration: Duration,
    pending: Vec<(Instant, SurfaceEvent)>,
    seen: usize,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timing(Timing::default())
    }

    pub fn with_timing(timing: Timing) -> Self {
        let log = Arc::new(Mutex::new(MockLog::default()));
        let engines: [Box<dyn PlaybackSurface>; 2] = [
            Box::new(MockSurface::new(SurfaceId::A, log.clone())),
            Box::new(MockSurface::new(SurfaceId::B, log.clone())),
        ];
        let selector =
            ContentSelector::with_rng(BrightnessPolicy::default(), StdRng::seed_from_u64(42));
        let t0 = Instant::now();

        Self {
            sched: CrossfadeScheduler::new(engines, selector, timing),
            log,
            t0,
            now: t0,
            trace: Vec::new(),
            durations: HashMap::new(),
            latencies: HashMap::new(),
            failing: HashSet::new(),
            default_duration: ms(5000),
            pending: Vec::new(),
            seen: 0,
        }
    }

    /// Reported duration for `name`
    pub fn clip(mut self, name: &str, duration_ms: u64) -> Self {
        self.durations.insert(name.to_string(), ms(duration_ms));
        self
    }

    /// Prepare latency for `name`
    pub fn latency(mut self, name: &str, latency_ms: u64) -> Self {
        self.latencies.insert(name.to_string(), ms(latency_ms));
        self
    }

    /// Every prepare of `name` fails
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn set_failing(&mut self, name: &str, failing: bool) {
        if failing {
            self.failing.insert(name.to_string());
        } else {
            self.failing.remove(name);
        }
    }

    pub fn at(&self, offset_ms: u64) -> Instant {
        self.t0 + ms(offset_ms)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.now.duration_since(self.t0).as_millis() as u64
    }

    pub fn catalog(&mut self, names: &[&str]) {
        self.sched
            .set_catalog(names.iter().map(|n| format!("/clips/{}", n)));
    }

    /// Set the catalog and start playback at the current virtual time
    pub fn start(&mut self, names: &[&str]) {
        self.catalog(names);
        self.sched.restart(self.now);
        self.collect();
    }

    pub fn pause(&mut self) {
        self.sched.pause(self.now);
        self.collect();
    }

    pub fn resume(&mut self) {
        self.sched.resume(self.now);
        self.collect();
    }

    /// Run every deadline and delivery up to and including `offset_ms`
    pub fn run_until(&mut self, offset_ms: u64) {
        let target = self.at(offset_ms);

        for _ in 0..1_000_000 {
            let next_delivery = self.pending.iter().map(|(at, _)| *at).min();
            let next = [self.sched.next_deadline(), next_delivery]
                .into_iter()
                .flatten()
                .min();

            match next {
                Some(at) if at <= target => {
                    self.now = self.now.max(at);
                    self.deliver_due();
                    self.sched.tick(self.now);
                    self.collect();
                }
                _ => {
                    self.now = self.now.max(target);
                    return;
                }
            }
        }
        panic!("scheduler did not settle before {} ms", offset_ms);
    }

    /// Drive the scheduler directly at the current virtual time
    pub fn apply(&mut self, f: impl FnOnce(&mut CrossfadeScheduler, Instant)) {
        f(&mut self.sched, self.now);
        self.collect();
    }

    /// Hand an event to the scheduler right now
    pub fn inject(&mut self, event: SurfaceEvent) {
        self.sched.handle_event(event, self.now);
        self.sched.tick(self.now);
        self.collect();
    }

    fn deliver_due(&mut self) {
        while let Some(idx) = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, (at, _))| *at <= self.now)
            .min_by_key(|(i, (at, _))| (*at, *i))
            .map(|(i, _)| i)
        {
            let (_, event) = self.pending.remove(idx);
            self.sched.handle_event(event, self.now);
            self.collect();
        }
    }

    fn collect(&mut self) {
        let calls: Vec<(SurfaceId, Call)> = {
            let log = self.log.lock().unwrap();
            log.calls[self.seen..].to_vec()
        };
        self.seen += calls.len();
        let elapsed = self.elapsed_ms();

        for (id, call) in calls {
            if let Call::Prepare { name, ticket } = &call {
                let latency = self.latencies.get(name).copied().unwrap_or_default();
                let event = if self.failing.contains(name) {
                    SurfaceEvent::error(*ticket, SurfaceError::Decode("scripted".to_string()))
                } else {
                    let duration = self
                        .durations
                        .get(name)
                        .copied()
                        .unwrap_or(self.default_duration);
                    SurfaceEvent::ready(*ticket, duration)
                };
                self.pending.push((self.now + latency, event));
            }
            self.trace.push((elapsed, id, call));
        }
    }

    /// `(ms, surface, clip)` for every prepare
    pub fn prepares(&self) -> Vec<(u64, SurfaceId, String)> {
        self.trace
            .iter()
            .filter_map(|(t, id, call)| match call {
                Call::Prepare { name, .. } => Some((*t, *id, name.clone())),
                _ => None,
            })
            .collect()
    }

    /// Ticket of the most recent prepare on `id`
    pub fn last_ticket(&self, id: SurfaceId) -> Option<Ticket> {
        self.trace
            .iter()
            .filter_map(|(_, sid, call)| match call {
                Call::Prepare { ticket, .. } if *sid == id => Some(*ticket),
                _ => None,
            })
            .next_back()
    }

    /// `(ms, surface)` for every begin
    pub fn begins(&self) -> Vec<(u64, SurfaceId)> {
        self.calls(|c| *c == Call::Begin)
    }

    pub fn calls(&self, pred: impl Fn(&Call) -> bool) -> Vec<(u64, SurfaceId)> {
        self.trace
            .iter()
            .filter(|(_, _, call)| pred(call))
            .map(|(t, id, _)| (*t, *id))
            .collect()
    }

    pub fn opacity(&self, id: SurfaceId) -> f32 {
        self.sched.display_state().opacity[id.index()]
    }

    /// Last opacity sent to `id` at or before `offset_ms`
    pub fn opacity_at(&self, id: SurfaceId, offset_ms: u64) -> f32 {
        self.trace
            .iter()
            .filter(|(t, sid, _)| *t <= offset_ms && *sid == id)
            .filter_map(|(_, _, call)| match call {
                Call::Opacity(v) => Some(*v),
                _ => None,
            })
            .next_back()
            .unwrap_or(0.0)
    }
}

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

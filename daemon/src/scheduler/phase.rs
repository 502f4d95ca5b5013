//! Cycle phases and the pure transition table.
//!
//! `Phase::on` decides *what* happens for a signal; the scheduler performs
//! the returned [`Action`] against surfaces and timers.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing to play
    Idle,
    /// Video suppressed for the current mode; backdrop colour shown
    Backdrop,
    /// Waiting for both render targets to attach
    AwaitingSurfaces,
    /// First clip loading on the current surface
    LoadingFirst,
    PlayingCurrentOnly,
    PreparingNext,
    NextReady,
    NextStarted,
    Crossfading,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    SurfacesReady,
    FirstReady,
    FirstFailed,
    PrepareDue,
    StandbyReady,
    StandbyFailed,
    StartDue,
    CrossfadeDue,
    NearCompletion { remaining: Duration },
    CurrentFailed,
    FadeComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ignore,
    LoadFirst,
    BeginFirst,
    RetryFirst,
    PrepareStandby,
    RetryStandby,
    ArmStandbyTimers,
    BeginStandby,
    /// Crossfade came due before the standby started: start it, then let
    /// it render a frame before ramping
    BeginStandbyThenSettle,
    /// Crossfade came due before the standby was ready: poll again shortly
    WaitForStandby,
    StartCrossfade,
    Swap,
    RearmCrossfade { remaining: Duration },
}

impl Phase {
    pub fn on(self, signal: Signal) -> (Phase, Action) {
        use Action as A;
        use Phase as P;
        use Signal as S;

        match (self, signal) {
            (P::AwaitingSurfaces, S::SurfacesReady) => (P::LoadingFirst, A::LoadFirst),

            (P::LoadingFirst, S::PrepareDue) => (P::LoadingFirst, A::LoadFirst),
            (P::LoadingFirst, S::FirstReady) => (P::PlayingCurrentOnly, A::BeginFirst),
            (P::LoadingFirst, S::FirstFailed) => (P::LoadingFirst, A::RetryFirst),

            (P::PlayingCurrentOnly, S::PrepareDue) => (P::PreparingNext, A::PrepareStandby),
            (P::PreparingNext, S::StandbyReady) => (P::NextReady, A::ArmStandbyTimers),
            (P::NextReady, S::StartDue) => (P::NextStarted, A::BeginStandby),

            (
                P::PreparingNext | P::NextReady | P::NextStarted | P::Crossfading,
                S::StandbyFailed,
            ) => (P::PlayingCurrentOnly, A::RetryStandby),

            (
                P::PlayingCurrentOnly | P::PreparingNext,
                S::CrossfadeDue | S::CurrentFailed,
            ) => (self, A::WaitForStandby),
            (P::NextReady, S::CrossfadeDue | S::CurrentFailed) => {
                (P::NextStarted, A::BeginStandbyThenSettle)
            }
            (P::NextStarted, S::CrossfadeDue | S::CurrentFailed) => {
                (P::Crossfading, A::StartCrossfade)
            }

            (
                P::PlayingCurrentOnly | P::PreparingNext | P::NextReady | P::NextStarted,
                S::NearCompletion { remaining },
            ) => (self, A::RearmCrossfade { remaining }),

            (P::Crossfading, S::FadeComplete) => (P::PlayingCurrentOnly, A::Swap),

            _ => (self, A::Ignore),
        }
    }

    /// Phases in which the cycle moves forward on its own
    pub fn is_advancing(self) -> bool {
        !matches!(self, Self::Idle | Self::Backdrop | Self::Released)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Backdrop => "backdrop",
            Self::AwaitingSurfaces => "awaiting_surfaces",
            Self::LoadingFirst => "loading_first",
            Self::PlayingCurrentOnly => "playing_current_only",
            Self::PreparingNext => "preparing_next",
            Self::NextReady => "next_ready",
            Self::NextStarted => "next_started",
            Self::Crossfading => "crossfading",
            Self::Released => "released",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PHASES: [Phase; 10] = [
        Phase::Idle,
        Phase::Backdrop,
        Phase::AwaitingSurfaces,
        Phase::LoadingFirst,
        Phase::PlayingCurrentOnly,
        Phase::PreparingNext,
        Phase::NextReady,
        Phase::NextStarted,
        Phase::Crossfading,
        Phase::Released,
    ];

    #[test]
    fn test_happy_path() {
        let steps = [
            (Signal::SurfacesReady, Phase::LoadingFirst, Action::LoadFirst),
            (Signal::FirstReady, Phase::PlayingCurrentOnly, Action::BeginFirst),
            (Signal::PrepareDue, Phase::PreparingNext, Action::PrepareStandby),
            (Signal::StandbyReady, Phase::NextReady, Action::ArmStandbyTimers),
            (Signal::StartDue, Phase::NextStarted, Action::BeginStandby),
            (Signal::CrossfadeDue, Phase::Crossfading, Action::StartCrossfade),
            (Signal::FadeComplete, Phase::PlayingCurrentOnly, Action::Swap),
        ];

        let mut phase = Phase::AwaitingSurfaces;
        for (signal, expected_phase, expected_action) in steps {
            let (next, action) = phase.on(signal);
            assert_eq!((next, action), (expected_phase, expected_action), "{signal:?}");
            phase = next;
        }
    }

    #[test]
    fn test_crossfade_due_early() {
        assert_eq!(
            Phase::PlayingCurrentOnly.on(Signal::CrossfadeDue),
            (Phase::PlayingCurrentOnly, Action::WaitForStandby)
        );
        assert_eq!(
            Phase::PreparingNext.on(Signal::CrossfadeDue),
            (Phase::PreparingNext, Action::WaitForStandby)
        );
        assert_eq!(
            Phase::NextReady.on(Signal::CrossfadeDue),
            (Phase::NextStarted, Action::BeginStandbyThenSettle)
        );
    }

    #[test]
    fn test_current_failure_treated_as_crossfade_due() {
        for phase in ALL_PHASES {
            if phase == Phase::Crossfading {
                continue;
            }
            assert_eq!(
                phase.on(Signal::CurrentFailed),
                phase.on(Signal::CrossfadeDue),
                "{phase}"
            );
        }
        assert_eq!(
            Phase::Crossfading.on(Signal::CurrentFailed),
            (Phase::Crossfading, Action::Ignore)
        );
    }

    #[test]
    fn test_failures_retry() {
        assert_eq!(
            Phase::LoadingFirst.on(Signal::FirstFailed),
            (Phase::LoadingFirst, Action::RetryFirst)
        );
        assert_eq!(
            Phase::LoadingFirst.on(Signal::PrepareDue),
            (Phase::LoadingFirst, Action::LoadFirst)
        );
        for phase in [
            Phase::PreparingNext,
            Phase::NextReady,
            Phase::NextStarted,
            Phase::Crossfading,
        ] {
            assert_eq!(
                phase.on(Signal::StandbyFailed),
                (Phase::PlayingCurrentOnly, Action::RetryStandby)
            );
        }
    }

    #[test]
    fn test_near_completion_rearms_without_phase_change() {
        let remaining = Duration::from_millis(1200);
        for phase in [
            Phase::PlayingCurrentOnly,
            Phase::PreparingNext,
            Phase::NextReady,
            Phase::NextStarted,
        ] {
            assert_eq!(
                phase.on(Signal::NearCompletion { remaining }),
                (phase, Action::RearmCrossfade { remaining })
            );
        }
        assert_eq!(
            Phase::Crossfading.on(Signal::NearCompletion { remaining }),
            (Phase::Crossfading, Action::Ignore)
        );
    }

    #[test]
    fn test_inactive_phases_ignore_everything() {
        let signals = [
            Signal::SurfacesReady,
            Signal::FirstReady,
            Signal::FirstFailed,
            Signal::PrepareDue,
            Signal::StandbyReady,
            Signal::StandbyFailed,
            Signal::StartDue,
            Signal::CrossfadeDue,
            Signal::CurrentFailed,
            Signal::FadeComplete,
        ];
        for phase in [Phase::Idle, Phase::Backdrop, Phase::Released] {
            assert!(!phase.is_advancing());
            for signal in signals {
                assert_eq!(phase.on(signal), (phase, Action::Ignore));
            }
        }
    }

    #[test]
    fn test_stale_signals_ignored() {
        // Late results for a phase that already moved on
        assert_eq!(
            Phase::Crossfading.on(Signal::StandbyReady),
            (Phase::Crossfading, Action::Ignore)
        );
        assert_eq!(
            Phase::PlayingCurrentOnly.on(Signal::StartDue),
            (Phase::PlayingCurrentOnly, Action::Ignore)
        );
        assert_eq!(
            Phase::NextStarted.on(Signal::FadeComplete),
            (Phase::NextStarted, Action::Ignore)
        );
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::PlayingCurrentOnly.to_string(), "playing_current_only");
        assert_eq!(Phase::Released.as_str(), "released");
        assert!(Phase::Crossfading.is_advancing());
    }
}

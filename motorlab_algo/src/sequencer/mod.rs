// Implements the timed hardware experiments used to characterize the motor.

// Key Features:
// - Coast-down: full power spin-up, power cut, periodic speed logging.
// - Steady-state and back-EMF: fixed command, settling delay, periodic reports.
// - Pure transition function, so the machine can be tested without real timing.

// Detailed Operation:
// `transition` maps (state, event) to (next state, effect) and never touches
// hardware. `TestSequencer` owns the current state, feeds it start/tick/stop
// events and applies the returned effect: commanding the actuator, emitting a
// DATA line or writing the phase/completion markers. All timing is measured as
// elapsed time from the start of the run, so the u32 millisecond clock may wrap.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::fmt::{self, Write};

pub mod test_run;
pub use test_run::{
    CollectedRun, ElectricalReading, RunCollector, RunError, RunOutcome, RunSample, TestKind,
    TestRun, RUN_CAPACITY,
};

use crate::config::SequenceTiming;
use crate::protocol::telemetry::{RunPhase, TelemetryLine};
use crate::MotorDrive;

/// A start request accepted by the protocol layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunRequest {
    pub kind: TestKind,
    pub pwm: i16,
    pub duration_ms: u32,
}

impl RunRequest {
    /// Coast-down always spins up at the configured full command.
    pub fn coast_down(timing: &SequenceTiming) -> Self {
        Self {
            kind: TestKind::CoastDown,
            pwm: timing.coast_pwm,
            duration_ms: timing.coast_duration_ms(),
        }
    }

    pub fn steady_state(pwm: i16, duration_ms: u32) -> Self {
        Self {
            kind: TestKind::SteadyState,
            pwm,
            duration_ms,
        }
    }

    pub fn back_emf(pwm: i16, duration_ms: u32) -> Self {
        Self {
            kind: TestKind::BackEmf,
            pwm,
            duration_ms,
        }
    }
}

/// Sequencer states. `next_ms` is the elapsed time of the next sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerState {
    Idle,
    CoastAccel { start_ms: u32 },
    CoastLog { start_ms: u32, next_ms: u32 },
    SteadyRun { start_ms: u32, duration_ms: u32, next_ms: u32 },
    BackEmfRun { start_ms: u32, duration_ms: u32, next_ms: u32 },
    Done { kind: TestKind },
}

impl SequencerState {
    /// Test that owns the actuator, if any.
    pub fn active_kind(&self) -> Option<TestKind> {
        match self {
            SequencerState::CoastAccel { .. } | SequencerState::CoastLog { .. } => {
                Some(TestKind::CoastDown)
            }
            SequencerState::SteadyRun { .. } => Some(TestKind::SteadyState),
            SequencerState::BackEmfRun { .. } => Some(TestKind::BackEmf),
            SequencerState::Idle | SequencerState::Done { .. } => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_kind().is_some()
    }

    fn start_ms(&self) -> Option<u32> {
        match *self {
            SequencerState::CoastAccel { start_ms }
            | SequencerState::CoastLog { start_ms, .. }
            | SequencerState::SteadyRun { start_ms, .. }
            | SequencerState::BackEmfRun { start_ms, .. } => Some(start_ms),
            SequencerState::Idle | SequencerState::Done { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerEvent {
    Start { request: RunRequest, now_ms: u32 },
    Tick { now_ms: u32 },
    Stop,
}

/// What the wrapper must do after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerEffect {
    None,
    Energize(i16), // Command the actuator
    CutPower,      // Zero the actuator, announce the logging phase, emit the first DATA line
    Sample,        // Emit one DATA line
    Complete,      // Zero the actuator, run finished normally
    Abort,         // Zero the actuator, run stopped
}

/// Pure state transition.
pub fn transition(
    state: SequencerState,
    event: SequencerEvent,
    timing: &SequenceTiming,
) -> (SequencerState, SequencerEffect) {
    use SequencerEffect as E;
    use SequencerState as S;

    match (state, event) {
        (S::Idle | S::Done { .. }, SequencerEvent::Start { request, now_ms }) => {
            let next = match request.kind {
                TestKind::CoastDown => S::CoastAccel { start_ms: now_ms },
                TestKind::SteadyState => S::SteadyRun {
                    start_ms: now_ms,
                    duration_ms: request.duration_ms,
                    next_ms: timing.steady_settle_ms,
                },
                TestKind::BackEmf => S::BackEmfRun {
                    start_ms: now_ms,
                    duration_ms: request.duration_ms,
                    next_ms: timing.back_emf_settle_ms,
                },
            };
            (next, E::Energize(request.pwm))
        }
        // A second start while running is rejected by the caller
        (running, SequencerEvent::Start { .. }) => (running, E::None),

        (S::Idle | S::Done { .. }, SequencerEvent::Stop) => (S::Idle, E::None),
        (_, SequencerEvent::Stop) => (S::Idle, E::Abort),

        (S::CoastAccel { start_ms }, SequencerEvent::Tick { now_ms }) => {
            if now_ms.wrapping_sub(start_ms) >= timing.coast_accel_ms {
                // The first logged point goes out with the phase marker
                let next = S::CoastLog {
                    start_ms,
                    next_ms: timing.coast_accel_ms + timing.coast_sample_ms,
                };
                (next, E::CutPower)
            } else {
                (state, E::None)
            }
        }
        (S::CoastLog { start_ms, next_ms }, SequencerEvent::Tick { now_ms }) => {
            let elapsed = now_ms.wrapping_sub(start_ms);
            if elapsed >= timing.coast_duration_ms() {
                (S::Done { kind: TestKind::CoastDown }, E::Complete)
            } else if elapsed >= next_ms {
                let next_ms = advance(next_ms, elapsed, timing.coast_sample_ms);
                (S::CoastLog { start_ms, next_ms }, E::Sample)
            } else {
                (state, E::None)
            }
        }
        (S::SteadyRun { start_ms, duration_ms, next_ms }, SequencerEvent::Tick { now_ms }) => {
            match report_step(now_ms.wrapping_sub(start_ms), duration_ms, next_ms, timing) {
                Step::Finished => (S::Done { kind: TestKind::SteadyState }, E::Complete),
                Step::Report(next_ms) => (S::SteadyRun { start_ms, duration_ms, next_ms }, E::Sample),
                Step::Wait => (state, E::None),
            }
        }
        (S::BackEmfRun { start_ms, duration_ms, next_ms }, SequencerEvent::Tick { now_ms }) => {
            match report_step(now_ms.wrapping_sub(start_ms), duration_ms, next_ms, timing) {
                Step::Finished => (S::Done { kind: TestKind::BackEmf }, E::Complete),
                Step::Report(next_ms) => (S::BackEmfRun { start_ms, duration_ms, next_ms }, E::Sample),
                Step::Wait => (state, E::None),
            }
        }
        (S::Idle | S::Done { .. }, SequencerEvent::Tick { .. }) => (state, E::None),
    }
}

enum Step {
    Finished,
    Report(u32),
    Wait,
}

fn report_step(elapsed: u32, duration_ms: u32, next_ms: u32, timing: &SequenceTiming) -> Step {
    if elapsed >= duration_ms {
        Step::Finished
    } else if elapsed >= next_ms {
        Step::Report(advance(next_ms, elapsed, timing.report_interval_ms))
    } else {
        Step::Wait
    }
}

/// Next sample slot; skips missed slots instead of bursting to catch up.
fn advance(next_ms: u32, elapsed: u32, interval: u32) -> u32 {
    let interval = interval.max(1);
    let next = next_ms + interval;
    if next > elapsed {
        next
    } else {
        elapsed - (elapsed - next_ms) % interval + interval
    }
}

/// Inputs observed by the main loop on one iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub now_ms: u32,
    pub position: i32,
    pub rpm: f32,
    pub electrical: Option<ElectricalReading>,
}

/// Runs the state machine against a real actuator and telemetry sink.
pub struct TestSequencer {
    state: SequencerState,
    timing: SequenceTiming,
}

impl TestSequencer {
    pub fn new(timing: SequenceTiming) -> Self {
        Self {
            state: SequencerState::Idle,
            timing,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn timing(&self) -> &SequenceTiming {
        &self.timing
    }

    /// Starts a run and writes `TEST_STARTED`. Ignored while another run is active.
    pub fn start<D: MotorDrive, W: Write>(
        &mut self,
        request: RunRequest,
        now_ms: u32,
        drive: &mut D,
        out: &mut W,
    ) -> fmt::Result {
        if self.is_active() {
            return Ok(());
        }
        let (next, effect) = transition(
            self.state,
            SequencerEvent::Start { request, now_ms },
            &self.timing,
        );
        self.state = next;
        info!("test started: {} pwm {}", request.kind, request.pwm);
        let started = TelemetryLine::TestStarted {
            kind: request.kind,
            pwm: request.pwm,
            duration_ms: request.duration_ms,
        };
        writeln!(out, "{}", started)?;
        self.apply(effect, request.kind, None, drive, out)
    }

    /// Advances the active run by one main-loop iteration.
    pub fn tick<D: MotorDrive, W: Write>(
        &mut self,
        obs: Observation,
        drive: &mut D,
        out: &mut W,
    ) -> fmt::Result {
        let (kind, start_ms) = match (self.state.active_kind(), self.state.start_ms()) {
            (Some(kind), Some(start_ms)) => (kind, start_ms),
            _ => return Ok(()),
        };
        let (next, effect) =
            transition(self.state, SequencerEvent::Tick { now_ms: obs.now_ms }, &self.timing);
        self.state = next;

        let sample = RunSample {
            elapsed_ms: obs.now_ms.wrapping_sub(start_ms),
            rpm: obs.rpm,
            position: obs.position,
            electrical: match kind {
                TestKind::CoastDown => None, // Unpowered, nothing to measure
                TestKind::SteadyState | TestKind::BackEmf => obs.electrical,
            },
        };
        self.apply(effect, kind, Some(sample), drive, out)
    }

    /// Aborts the active run, if any, writing `TEST_STOPPED`.
    pub fn stop<D: MotorDrive, W: Write>(&mut self, drive: &mut D, out: &mut W) -> fmt::Result {
        let kind = self.state.active_kind();
        let (next, effect) = transition(self.state, SequencerEvent::Stop, &self.timing);
        self.state = next;
        match kind {
            Some(kind) => self.apply(effect, kind, None, drive, out),
            None => Ok(()),
        }
    }

    fn apply<D: MotorDrive, W: Write>(
        &mut self,
        effect: SequencerEffect,
        kind: TestKind,
        sample: Option<RunSample>,
        drive: &mut D,
        out: &mut W,
    ) -> fmt::Result {
        match effect {
            SequencerEffect::None => Ok(()),
            SequencerEffect::Energize(pwm) => {
                drive.set_command(pwm);
                Ok(())
            }
            SequencerEffect::CutPower => {
                drive.set_command(0);
                debug!("coast-down: power cut");
                let phase = TelemetryLine::Phase {
                    kind,
                    phase: RunPhase::Logging,
                };
                writeln!(out, "{}", phase)?;
                match sample {
                    Some(sample) => writeln!(out, "{}", TelemetryLine::Data { kind, sample }),
                    None => Ok(()),
                }
            }
            SequencerEffect::Sample => match sample {
                Some(sample) => writeln!(out, "{}", TelemetryLine::Data { kind, sample }),
                None => Ok(()),
            },
            SequencerEffect::Complete => {
                drive.set_command(0);
                info!("test complete: {}", kind);
                writeln!(out, "{}", TelemetryLine::TestComplete(kind))
            }
            SequencerEffect::Abort => {
                drive.set_command(0);
                warn!("test stopped: {}", kind);
                writeln!(out, "{}", TelemetryLine::TestStopped(kind))
            }
        }
    }
}

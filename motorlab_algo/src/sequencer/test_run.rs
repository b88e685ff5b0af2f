//! Recorded test runs and their assembly from a telemetry stream.

use core::fmt;

use heapless::Vec;
use thiserror::Error;

use crate::protocol::{TelemetryError, TelemetryLine};

/// Default number of samples kept per run (~200 s of 100 ms reports).
pub const RUN_CAPACITY: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TestKind {
    CoastDown,
    SteadyState,
    BackEmf,
}

impl TestKind {
    /// Name used on the wire.
    pub const fn name(self) -> &'static str {
        match self {
            TestKind::CoastDown => "COAST_DOWN",
            TestKind::SteadyState => "STEADY_STATE",
            TestKind::BackEmf => "BACK_EMF",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "COAST_DOWN" => Some(TestKind::CoastDown),
            "STEADY_STATE" => Some(TestKind::SteadyState),
            "BACK_EMF" => Some(TestKind::BackEmf),
            _ => None,
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Winding current and supply voltage, when the board is instrumented.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ElectricalReading {
    pub current_a: f32,
    pub voltage_v: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunSample {
    pub elapsed_ms: u32, // From the start of the run
    pub rpm: f32,
    pub position: i32, // Raw encoder counts
    pub electrical: Option<ElectricalReading>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunError {
    #[error("sample storage is full")]
    CapacityExceeded,
    #[error("sample belongs to a different test")]
    KindMismatch,
    #[error("telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunOutcome {
    Completed,
    Stopped,
}

/// A run being recorded.
#[derive(Clone, Debug)]
pub struct TestRun<const N: usize = RUN_CAPACITY> {
    kind: TestKind,
    pwm_command: i16,
    duration_ms: u32,
    start_time_ms: u32,
    samples: Vec<RunSample, N>,
}

impl<const N: usize> TestRun<N> {
    pub fn new(kind: TestKind, pwm_command: i16, duration_ms: u32, start_time_ms: u32) -> Self {
        Self {
            kind,
            pwm_command,
            duration_ms,
            start_time_ms,
            samples: Vec::new(),
        }
    }

    pub fn kind(&self) -> TestKind {
        self.kind
    }

    pub fn push(&mut self, sample: RunSample) -> Result<(), RunError> {
        self.samples
            .push(sample)
            .map_err(|_| RunError::CapacityExceeded)
    }

    pub fn samples(&self) -> &[RunSample] {
        &self.samples
    }

    /// Freezes the run. No samples can be added afterwards.
    pub fn finish(self, outcome: RunOutcome) -> CollectedRun<N> {
        CollectedRun { run: self, outcome }
    }
}

/// Immutable, finished run handed to the estimator.
#[derive(Clone, Debug)]
pub struct CollectedRun<const N: usize = RUN_CAPACITY> {
    run: TestRun<N>,
    outcome: RunOutcome,
}

impl<const N: usize> CollectedRun<N> {
    pub fn kind(&self) -> TestKind {
        self.run.kind
    }

    pub fn pwm_command(&self) -> i16 {
        self.run.pwm_command
    }

    pub fn duration_ms(&self) -> u32 {
        self.run.duration_ms
    }

    pub fn start_time_ms(&self) -> u32 {
        self.run.start_time_ms
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    pub fn samples(&self) -> &[RunSample] {
        &self.run.samples
    }
}

/// Rebuilds runs from received telemetry lines.
///
/// A run is only released after its `TEST_COMPLETE` or `TEST_STOPPED` marker,
/// so the estimator never sees a run that is still being streamed. Host-side
/// runs use the device's elapsed clock, so their start time is 0.
pub struct RunCollector<const N: usize = RUN_CAPACITY> {
    active: Option<TestRun<N>>,
}

impl<const N: usize> RunCollector<N> {
    pub const fn new() -> Self {
        Self { active: None }
    }

    /// Kind of the run currently being assembled.
    pub fn in_progress(&self) -> Option<TestKind> {
        self.active.as_ref().map(TestRun::kind)
    }

    pub fn feed(&mut self, line: &str) -> Result<Option<CollectedRun<N>>, RunError> {
        let parsed = match TelemetryLine::parse(line)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        match parsed {
            TelemetryLine::TestStarted { kind, pwm, duration_ms } => {
                if let Some(dropped) = self.active.replace(TestRun::new(kind, pwm, duration_ms, 0)) {
                    warn!("unterminated run replaced, {} samples dropped", dropped.samples().len());
                }
                Ok(None)
            }
            TelemetryLine::Data { kind, sample } => match self.active.as_mut() {
                Some(run) if run.kind == kind => run.push(sample).map(|_| None),
                Some(_) => Err(RunError::KindMismatch),
                None => {
                    debug!("data line outside of a run ignored");
                    Ok(None)
                }
            },
            TelemetryLine::Phase { .. } => Ok(None),
            TelemetryLine::TestComplete(kind) => Ok(self.finish(kind, RunOutcome::Completed)),
            TelemetryLine::TestStopped(kind) => Ok(self.finish(kind, RunOutcome::Stopped)),
        }
    }

    fn finish(&mut self, kind: TestKind, outcome: RunOutcome) -> Option<CollectedRun<N>> {
        match self.active.take() {
            Some(run) if run.kind == kind => Some(run.finish(outcome)),
            other => {
                self.active = other; // Marker for some other run: keep collecting
                None
            }
        }
    }
}

impl<const N: usize> Default for RunCollector<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_only_after_completion_marker() {
        let mut collector: RunCollector<16> = RunCollector::new();
        assert!(collector.feed("TEST_STARTED,STEADY_STATE,150,3000").unwrap().is_none());
        assert!(collector.feed("DATA,2000,120.00,100,STEADY_STATE").unwrap().is_none());
        assert!(collector.feed("DATA,2100,121.00,300,STEADY_STATE").unwrap().is_none());
        assert_eq!(collector.in_progress(), Some(TestKind::SteadyState));

        let run = collector.feed("TEST_COMPLETE,STEADY_STATE").unwrap().unwrap();
        assert_eq!(run.kind(), TestKind::SteadyState);
        assert_eq!(run.outcome(), RunOutcome::Completed);
        assert_eq!(run.pwm_command(), 150);
        assert_eq!(run.duration_ms(), 3000);
        assert_eq!(run.samples().len(), 2);
        assert_eq!(collector.in_progress(), None);
    }

    #[test]
    fn test_stopped_run_is_released_as_stopped() {
        let mut collector: RunCollector<16> = RunCollector::new();
        collector.feed("TEST_STARTED,COAST_DOWN,255,12000").unwrap();
        collector.feed("PHASE,COAST_DOWN,LOGGING").unwrap();
        collector.feed("DATA,4000,900.00,1,COAST_DOWN").unwrap();
        let run = collector.feed("TEST_STOPPED,COAST_DOWN").unwrap().unwrap();
        assert_eq!(run.outcome(), RunOutcome::Stopped);
        assert_eq!(run.samples().len(), 1);
    }

    #[test]
    fn test_replies_between_data_are_ignored() {
        let mut collector: RunCollector<16> = RunCollector::new();
        collector.feed("TEST_STARTED,BACK_EMF,200,5000").unwrap();
        assert!(collector.feed("SPEED:12.00").unwrap().is_none());
        assert!(collector.feed("DATA,1000,200.00,5,BACK_EMF,0.600,12.000").unwrap().is_none());
        let run = collector.feed("TEST_COMPLETE,BACK_EMF").unwrap().unwrap();
        assert!(run.samples()[0].electrical.is_some());
    }

    #[test]
    fn test_kind_mismatch() {
        let mut collector: RunCollector<16> = RunCollector::new();
        collector.feed("TEST_STARTED,BACK_EMF,200,5000").unwrap();
        assert_eq!(
            collector.feed("DATA,1000,200.00,5,COAST_DOWN").unwrap_err(),
            RunError::KindMismatch
        );
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut collector: RunCollector<2> = RunCollector::new();
        collector.feed("TEST_STARTED,STEADY_STATE,100,10000").unwrap();
        collector.feed("DATA,2000,1.00,0,STEADY_STATE").unwrap();
        collector.feed("DATA,2100,1.00,0,STEADY_STATE").unwrap();
        assert_eq!(
            collector.feed("DATA,2200,1.00,0,STEADY_STATE").unwrap_err(),
            RunError::CapacityExceeded
        );
    }

    #[test]
    fn test_malformed_line_surfaces_error() {
        let mut collector: RunCollector<2> = RunCollector::new();
        assert_eq!(
            collector.feed("DATA,x,1.00,0,STEADY_STATE").unwrap_err(),
            RunError::Telemetry(TelemetryError::MalformedField("elapsed"))
        );
    }
}

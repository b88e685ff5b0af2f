//! Telemetry lines streamed while a test runs, and their host-side parser.
//!
//! ```text
//! TEST_STARTED,<testName>,<pwm>,<durationMs>
//! DATA,<elapsedMs>,<rpm>,<rawPosition>,<testName>[,<currentA>,<voltageV>]
//! PHASE,COAST_DOWN,LOGGING
//! TEST_COMPLETE,<testName>
//! TEST_STOPPED,<testName>
//! ```

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

use crate::sequencer::{ElectricalReading, RunSample, TestKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryError {
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("malformed {0} field")]
    MalformedField(&'static str),
    #[error("unknown test name")]
    UnknownTest,
    #[error("unknown phase name")]
    UnknownPhase,
}

/// Sub-phase marker inside a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunPhase {
    Logging, // Coast-down: power cut, samples follow
}

impl RunPhase {
    pub const fn token(self) -> &'static str {
        match self {
            RunPhase::Logging => "LOGGING",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryLine {
    TestStarted { kind: TestKind, pwm: i16, duration_ms: u32 },
    Data { kind: TestKind, sample: RunSample },
    Phase { kind: TestKind, phase: RunPhase },
    TestComplete(TestKind),
    TestStopped(TestKind),
}

impl fmt::Display for TelemetryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TelemetryLine::TestStarted { kind, pwm, duration_ms } => {
                write!(f, "TEST_STARTED,{},{},{}", kind.name(), pwm, duration_ms)
            }
            TelemetryLine::Data { kind, sample } => {
                write!(
                    f,
                    "DATA,{},{:.2},{},{}",
                    sample.elapsed_ms,
                    sample.rpm,
                    sample.position,
                    kind.name()
                )?;
                if let Some(e) = sample.electrical {
                    write!(f, ",{:.3},{:.3}", e.current_a, e.voltage_v)?;
                }
                Ok(())
            }
            TelemetryLine::Phase { kind, phase } => {
                write!(f, "PHASE,{},{}", kind.name(), phase.token())
            }
            TelemetryLine::TestComplete(kind) => write!(f, "TEST_COMPLETE,{}", kind.name()),
            TelemetryLine::TestStopped(kind) => write!(f, "TEST_STOPPED,{}", kind.name()),
        }
    }
}

impl TelemetryLine {
    /// Parses one received line. Lines that are not telemetry (command
    /// replies, blank lines) yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, TelemetryError> {
        let mut fields = line.trim().split(',').map(str::trim);
        let tag = fields.next().unwrap_or("");

        let parsed = match tag {
            "TEST_STARTED" => TelemetryLine::TestStarted {
                kind: test_kind(&mut fields)?,
                pwm: number(&mut fields, "pwm")?,
                duration_ms: number(&mut fields, "duration")?,
            },
            "DATA" => {
                let elapsed_ms = number(&mut fields, "elapsed")?;
                let rpm = number(&mut fields, "rpm")?;
                let position = number(&mut fields, "position")?;
                let kind = test_kind(&mut fields)?;
                let electrical = match fields.next() {
                    None => None,
                    Some(current) => Some(ElectricalReading {
                        current_a: current
                            .parse()
                            .map_err(|_| TelemetryError::MalformedField("current"))?,
                        voltage_v: number(&mut fields, "voltage")?,
                    }),
                };
                TelemetryLine::Data {
                    kind,
                    sample: RunSample {
                        elapsed_ms,
                        rpm,
                        position,
                        electrical,
                    },
                }
            }
            "PHASE" => {
                let kind = test_kind(&mut fields)?;
                let phase = match fields.next() {
                    Some("LOGGING") => RunPhase::Logging,
                    Some(_) => return Err(TelemetryError::UnknownPhase),
                    None => return Err(TelemetryError::MissingField("phase")),
                };
                TelemetryLine::Phase { kind, phase }
            }
            "TEST_COMPLETE" => TelemetryLine::TestComplete(test_kind(&mut fields)?),
            "TEST_STOPPED" => TelemetryLine::TestStopped(test_kind(&mut fields)?),
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

fn number<'a, T: FromStr>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<T, TelemetryError> {
    fields
        .next()
        .ok_or(TelemetryError::MissingField(name))?
        .parse()
        .map_err(|_| TelemetryError::MalformedField(name))
}

fn test_kind<'a>(fields: &mut impl Iterator<Item = &'a str>) -> Result<TestKind, TelemetryError> {
    let name = fields.next().ok_or(TelemetryError::MissingField("test"))?;
    TestKind::from_name(name).ok_or(TelemetryError::UnknownTest)
}

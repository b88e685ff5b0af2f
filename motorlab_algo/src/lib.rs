#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod encoder_position;
pub mod estimator;
pub mod math_float;
pub mod protocol;
pub mod sequencer;
pub mod speed_control;

use thiserror::Error;

pub use config::{LabConfig, SequenceTiming, PWM_MAX};
pub use encoder_position::{EncoderSample, QuadratureDecoder, SpeedEstimator};
pub use protocol::{Command, LineBuffer, ProtocolError, QueuedWriter, Response};
pub use sequencer::{ElectricalReading, Observation, RunRequest, SequencerState, TestSequencer};
pub use speed_control::{PidSnapshot, SpeedControlLoop};

use math_float::controllers::PidGains;

/// Reported by `SYSTEM_INFO`.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Actuator primitive shared by the test sequencer and the speed loop.
///
/// `pwm` is a signed command in `-PWM_MAX..=PWM_MAX`; zero releases the motor.
pub trait MotorDrive {
    fn set_command(&mut self, pwm: i16);
}

impl<D: MotorDrive + ?Sized> MotorDrive for &mut D {
    fn set_command(&mut self, pwm: i16) {
        (**self).set_command(pwm)
    }
}

/// Command refused because another owner holds the actuator.
///
/// The sequencer, the speed loop and the open-loop `MOTOR_*` drive are
/// mutually exclusive; `STOP` releases all three.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LabError {
    #[error("ERROR_TEST_ACTIVE")]
    TestActive,
    #[error("ERROR_PID_CONTROL_ACTIVE")]
    PidControlActive,
    #[error("ERROR_MANUAL_DRIVE_ACTIVE")]
    ManualDriveActive,
}

/// Hardware readings gathered by the main loop before each poll.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LabInputs {
    pub position: i32,                         // Raw decoder count
    pub electrical: Option<ElectricalReading>, // None on boards without sensing
}

/// The main lab struct, holding the test sequencer, the speed loop and the actuator.
pub struct MotorLab<D: MotorDrive> {
    drive: D,                     // Actuator shared by both controllers
    config: LabConfig,            // Geometry, periods and timing
    speed: SpeedEstimator,        // Windowed speed from decoder snapshots
    speed_due_ms: Option<u32>,    // Next speed window boundary, None before the first poll
    sequencer: TestSequencer,     // Timed experiments
    control: SpeedControlLoop,    // Closed-loop speed control
    manual: bool,                 // Open-loop command holds the actuator
    zero_offset: i32,             // Raw count treated as position zero
    last_sample: EncoderSample,   // Latest calibrated position snapshot
}

impl<D: MotorDrive> MotorLab<D> {
    /// Create a new lab around an actuator. The actuator is zeroed immediately.
    pub fn new(mut drive: D, config: LabConfig) -> Self {
        drive.set_command(0);
        let gains = PidGains::new(
            config.kp,
            config.ki,
            config.kd,
            config.output_min,
            config.output_max,
        );
        Self {
            drive,
            config,
            speed: SpeedEstimator::new(config.counts_per_rev),
            speed_due_ms: None,
            sequencer: TestSequencer::new(config.timing),
            control: SpeedControlLoop::new(gains, config.control_period_ms),
            manual: false,
            zero_offset: 0,
            last_sample: EncoderSample::default(),
        }
    }

    /// Parses and executes one received line, writing the reply to `out`.
    pub fn handle_line<W: core::fmt::Write>(&mut self, line: &str, now_ms: u32, out: &mut W) -> core::fmt::Result {
        match Command::parse(line) {
            Ok(Some(command)) => self.handle_command(command, now_ms, out),
            Ok(None) => Ok(()),
            Err(err) => {
                warn!("rejected command: {}", err);
                writeln!(out, "{}", err)
            }
        }
    }

    /// Executes a parsed command. Every accepted command gets a one-line confirmation
    /// and every rejected one a one-line error.
    pub fn handle_command<W: core::fmt::Write>(
        &mut self,
        command: Command,
        now_ms: u32,
        out: &mut W,
    ) -> core::fmt::Result {
        debug!("command: {}", command);
        let response = match command {
            Command::StartCoastDown => {
                let request = RunRequest::coast_down(self.sequencer.timing());
                return self.start_test(request, now_ms, out);
            }
            Command::StartSteadyState { pwm, duration_ms } => {
                return self.start_test(RunRequest::steady_state(pwm, duration_ms), now_ms, out);
            }
            Command::StartBackEmf { pwm, duration_ms } => {
                return self.start_test(RunRequest::back_emf(pwm, duration_ms), now_ms, out);
            }
            Command::Stop => {
                self.stop_all(out)?;
                Response::Stopped
            }
            Command::SetPid { kp, ki, kd } => {
                let gains = self.control.set_gains(kp, ki, kd);
                Response::PidSet {
                    kp: gains.kp,
                    ki: gains.ki,
                    kd: gains.kd,
                }
            }
            Command::SetSpeed { rpm } => {
                self.control.set_setpoint(rpm);
                Response::SpeedSet { rpm }
            }
            Command::StartPidControl => {
                if self.sequencer.is_active() {
                    return reject(LabError::TestActive, out);
                }
                if self.manual {
                    return reject(LabError::ManualDriveActive, out);
                }
                if !self.control.is_enabled() {
                    self.control.enable(now_ms);
                    info!("speed control enabled, target {} rpm", self.control.setpoint());
                }
                Response::PidControlStarted
            }
            Command::StopPidControl => {
                if self.control.is_enabled() {
                    self.control.disable(&mut self.drive);
                    info!("speed control disabled");
                }
                Response::PidControlStopped
            }
            Command::GetSpeed => Response::Speed { rpm: self.rpm() },
            Command::GetPidData => {
                let snapshot = self.control.snapshot();
                Response::PidData {
                    speed: self.rpm(),
                    error: snapshot.error,
                    output: snapshot.output,
                }
            }
            Command::Handshake => Response::Ready,
            Command::ReadEncoder => Response::Encoder {
                position: self.last_sample.position_counts,
                rpm: self.rpm(),
                timestamp_ms: now_ms,
            },
            Command::CalibrateEncoder => {
                self.zero_offset = self.zero_offset.wrapping_add(self.last_sample.position_counts);
                self.last_sample.position_counts = 0;
                self.speed.reset();
                self.speed_due_ms = None;
                Response::EncoderCalibrated
            }
            Command::Disconnect => {
                self.stop_all(out)?;
                info!("host disconnected");
                Response::Disconnected
            }
            Command::Motor { pwm } => {
                if self.sequencer.is_active() {
                    return reject(LabError::TestActive, out);
                }
                if self.control.is_enabled() {
                    return reject(LabError::PidControlActive, out);
                }
                self.drive.set_command(pwm);
                self.manual = pwm != 0;
                Response::MotorSet { pwm }
            }
            Command::SystemInfo => Response::SystemInfo {
                counts_per_rev: self.config.counts_per_rev,
                speed_window_ms: self.config.speed_window_ms,
                control_period_ms: self.config.control_period_ms,
                firmware: FIRMWARE_VERSION,
            },
        };
        writeln!(out, "{}", response)
    }

    /// One main-loop iteration: refresh the speed estimate, then advance whichever
    /// controller owns the actuator.
    pub fn poll<W: core::fmt::Write>(&mut self, now_ms: u32, inputs: LabInputs, out: &mut W) -> core::fmt::Result {
        let sample = EncoderSample::new(inputs.position.wrapping_sub(self.zero_offset), now_ms);
        self.last_sample = sample;

        let due = match self.speed_due_ms {
            Some(due_ms) => now_ms.wrapping_sub(due_ms) as i32 >= 0,
            None => true,
        };
        if due {
            self.speed.tick(sample);
            self.speed_due_ms = Some(now_ms.wrapping_add(self.config.speed_window_ms));
        }
        let rpm = self.rpm();

        if self.sequencer.is_active() {
            let obs = Observation {
                now_ms,
                position: sample.position_counts,
                rpm,
                electrical: inputs.electrical,
            };
            self.sequencer.tick(obs, &mut self.drive, out)
        } else {
            self.control.tick(now_ms, rpm, &mut self.drive);
            Ok(())
        }
    }

    fn start_test<W: core::fmt::Write>(&mut self, request: RunRequest, now_ms: u32, out: &mut W) -> core::fmt::Result {
        if self.control.is_enabled() {
            return reject(LabError::PidControlActive, out);
        }
        if self.sequencer.is_active() {
            return reject(LabError::TestActive, out);
        }
        if self.manual {
            return reject(LabError::ManualDriveActive, out);
        }
        self.sequencer.start(request, now_ms, &mut self.drive, out)
    }

    /// Aborts any run, releases the speed loop and zeroes the actuator.
    fn stop_all<W: core::fmt::Write>(&mut self, out: &mut W) -> core::fmt::Result {
        self.sequencer.stop(&mut self.drive, out)?;
        self.control.disable(&mut self.drive);
        self.manual = false;
        self.drive.set_command(0);
        Ok(())
    }

    /// Latest speed estimate in rpm.
    #[inline(always)]
    pub fn rpm(&self) -> f32 {
        self.speed.speed().rpm
    }

    pub fn sequencer_state(&self) -> SequencerState {
        self.sequencer.state()
    }

    pub fn control(&self) -> &SpeedControlLoop {
        &self.control
    }

    pub fn drive(&self) -> &D {
        &self.drive
    }
}

fn reject<W: core::fmt::Write>(err: LabError, out: &mut W) -> core::fmt::Result {
    warn!("rejected: {}", err);
    writeln!(out, "{}", err)
}

// Implements the fixed-period closed-loop speed controller.

// Key Features:
// - Runs the PID only when a full control period has elapsed.
// - Commands the actuator with the rounded, clamped controller output.
// - Zeroes the actuator synchronously when disabled.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::math_float::controllers::{PidGains, PID};
use crate::MotorDrive;

/// Values reported by `GET_PID_DATA`, from the most recent control tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidSnapshot {
    pub speed: f32,
    pub error: f32,
    pub output: i16,
}

pub struct SpeedControlLoop {
    pid: PID,
    period_ms: u32,    // Control period
    setpoint: f32,     // Target speed in rpm
    enabled: bool,     // Loop owns the actuator
    last_tick_ms: u32, // Time of the last controller update
    snapshot: PidSnapshot,
}

impl SpeedControlLoop {
    pub fn new(gains: PidGains, period_ms: u32) -> Self {
        Self {
            pid: PID::new(gains),
            period_ms: period_ms.max(1),
            setpoint: 0.0,
            enabled: false,
            last_tick_ms: 0,
            snapshot: PidSnapshot::default(),
        }
    }

    /// Replaces the gains, keeping the output limits, and clears the integrator.
    pub fn set_gains(&mut self, kp: f32, ki: f32, kd: f32) -> PidGains {
        let gains = self.pid.gains().with_gains(kp, ki, kd);
        self.pid.set_gains(gains);
        gains
    }

    pub fn gains(&self) -> PidGains {
        self.pid.gains()
    }

    pub fn set_setpoint(&mut self, rpm: f32) {
        self.setpoint = rpm;
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Hands the actuator to the loop; the first update happens one period later.
    pub fn enable(&mut self, now_ms: u32) {
        self.enabled = true;
        self.last_tick_ms = now_ms;
        self.pid.reset();
        self.snapshot = PidSnapshot::default();
    }

    /// Releases the actuator and zeroes it before returning.
    pub fn disable<D: MotorDrive>(&mut self, drive: &mut D) {
        self.enabled = false;
        drive.set_command(0);
        self.pid.reset();
        self.snapshot.output = 0;
    }

    /// Runs one controller update if a period has elapsed. Returns the new command.
    pub fn tick<D: MotorDrive>(&mut self, now_ms: u32, speed_rpm: f32, drive: &mut D) -> Option<i16> {
        if !self.enabled {
            return None;
        }
        let elapsed = now_ms.wrapping_sub(self.last_tick_ms);
        if elapsed < self.period_ms {
            return None;
        }
        self.last_tick_ms = now_ms;

        let error = self.setpoint - speed_rpm;
        let output = self.pid.tick(error, elapsed as f32 / 1000.0);
        let command = libm::roundf(output) as i16; // Output is already clamped to the actuator range
        drive.set_command(command);

        self.snapshot = PidSnapshot {
            speed: speed_rpm,
            error,
            output: command,
        };
        Some(command)
    }

    pub fn snapshot(&self) -> PidSnapshot {
        self.snapshot
    }

    pub fn integral(&self) -> f32 {
        self.pid.integral()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Drive(Option<i16>);

    impl MotorDrive for Drive {
        fn set_command(&mut self, pwm: i16) {
            self.0 = Some(pwm);
        }
    }

    fn control() -> SpeedControlLoop {
        SpeedControlLoop::new(PidGains::new(0.0, 0.0, 0.0, 0.0, 255.0), 50)
    }

    #[test]
    fn test_waits_for_full_period() {
        let mut ctl = control();
        let mut drive = Drive::default();
        ctl.set_gains(1.0, 0.0, 0.0);
        ctl.set_setpoint(100.0);
        ctl.enable(1000);
        assert_eq!(ctl.tick(1049, 0.0, &mut drive), None);
        assert_eq!(drive.0, None);
        assert_eq!(ctl.tick(1050, 40.0, &mut drive), Some(60));
        assert_eq!(drive.0, Some(60));
        assert_eq!(
            ctl.snapshot(),
            PidSnapshot { speed: 40.0, error: 60.0, output: 60 }
        );
    }

    #[test]
    fn test_disabled_loop_never_drives() {
        let mut ctl = control();
        let mut drive = Drive::default();
        ctl.set_gains(1.0, 0.0, 0.0);
        ctl.set_setpoint(100.0);
        assert_eq!(ctl.tick(5000, 0.0, &mut drive), None);
        assert_eq!(drive.0, None);
    }

    #[test]
    fn test_disable_zeroes_actuator() {
        let mut ctl = control();
        let mut drive = Drive::default();
        ctl.set_gains(2.0, 0.0, 0.0);
        ctl.set_setpoint(100.0);
        ctl.enable(0);
        ctl.tick(50, 0.0, &mut drive);
        assert_eq!(drive.0, Some(200));
        ctl.disable(&mut drive);
        assert_eq!(drive.0, Some(0));
        assert_eq!(ctl.snapshot().output, 0);
    }

    #[test]
    fn test_set_gains_keeps_limits_and_clears_integral() {
        let mut ctl = control();
        let mut drive = Drive::default();
        ctl.set_gains(0.0, 10.0, 0.0);
        ctl.set_setpoint(100.0);
        ctl.enable(0);
        ctl.tick(50, 0.0, &mut drive);
        assert!(ctl.integral() > 0.0);
        let gains = ctl.set_gains(1.0, 0.1, 0.01);
        assert_eq!(gains.output_max, 255.0);
        assert_eq!(ctl.integral(), 0.0);
    }
}

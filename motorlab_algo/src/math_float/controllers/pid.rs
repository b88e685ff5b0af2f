// Implements a floating-point PID controller with a time-scaled integral and
// derivative, for loops that run at a fixed but configurable period.

// Key Features:
// - Gains and output limits are replaced as one unit, never mid-tick.
// - Integrates ki * error * dt with anti-windup via clamping to the output limits.
// - Derivative is skipped on the first tick after a reset to avoid a kick.
// - Provides output and integral retrieval for telemetry.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Controller gains together with the output clamp they apply to.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidGains {
    pub kp: f32,         // Proportional gain.
    pub ki: f32,         // Integral gain (per second).
    pub kd: f32,         // Derivative gain (seconds).
    pub output_min: f32, // Lower output clamp.
    pub output_max: f32, // Upper output clamp.
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32, output_min: f32, output_max: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            output_min,
            output_max,
        }
    }

    /// Same limits, new gains.
    pub const fn with_gains(self, kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd, ..self }
    }
}

/// Implements the PID controller for precise process control.
pub struct PID {
    gains: PidGains,             // Active gains and limits.
    integral: f32,               // Accumulated ki * error * dt.
    previous_error: Option<f32>, // Previous error value for derivative calculation.
    output: f32,                 // Current output of the PID controller.
}

impl PID {
    /// Creates a new PID controller with specified gains.
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            previous_error: None,
            output: 0.0,
        }
    }

    /// Replaces the gains and clears the accumulated state.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
        self.reset();
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Clears the integrator, derivative history and output.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
        self.output = 0.0;
    }

    /// Updates the PID controller with the current error over a step of `dt` seconds.
    pub fn tick(&mut self, error: f32, dt: f32) -> f32 {
        let PidGains {
            kp,
            ki,
            kd,
            output_min,
            output_max,
        } = self.gains;

        // Calculate proportional term
        let p = kp * error;

        let d = if dt > 0.0 {
            // Integrate and clamp to avoid windup beyond the actuator range
            self.integral = (self.integral + ki * error * dt).clamp(output_min, output_max);

            // Calculate derivative term, zero until an error history exists
            match self.previous_error {
                Some(previous) => kd * (error - previous) / dt,
                None => 0.0,
            }
        } else {
            0.0 // No time elapsed: proportional and held integral only
        };

        // Update previous error for the next calculation
        self.previous_error = Some(error);

        // Calculate the total output with clamping
        self.output = (p + self.integral + d).clamp(output_min, output_max);
        self.output
    }

    /// Retrieves the current output of the PID controller.
    pub fn output(&self) -> f32 {
        self.output
    }

    /// Retrieves the accumulated integral term.
    pub fn integral(&self) -> f32 {
        self.integral
    }
}

// Runtime configuration for the lab: encoder geometry, loop periods, actuator
// limits and the timing of each hardware experiment.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Largest magnitude accepted by the actuator (8-bit PWM).
pub const PWM_MAX: i16 = 255;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LabConfig {
    pub counts_per_rev: u32,    // Encoder counts per revolution after 4x decoding
    pub speed_window_ms: u32,   // Minimum spacing between speed estimates
    pub control_period_ms: u32, // Speed loop period
    pub output_min: f32,        // Lower clamp of the speed loop output
    pub output_max: f32,        // Upper clamp of the speed loop output
    pub kp: f32,                // Gains used until the first SET_PID
    pub ki: f32,
    pub kd: f32,
    pub timing: SequenceTiming,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            counts_per_rev: 1200,
            speed_window_ms: 50,
            control_period_ms: 50,
            output_min: 0.0,
            output_max: PWM_MAX as f32,
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            timing: SequenceTiming::default(),
        }
    }
}

/// Durations and intervals of the timed experiments, all in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceTiming {
    pub coast_accel_ms: u32,       // Full-power spin up before the coast
    pub coast_log_ms: u32,         // Logging window after power is cut
    pub coast_sample_ms: u32,      // Coast-down sample interval
    pub steady_settle_ms: u32,     // Steady-state settling delay before reporting
    pub back_emf_settle_ms: u32,   // Back-EMF settling delay before reporting
    pub report_interval_ms: u32,   // Steady-state / back-EMF sample interval
    pub coast_pwm: i16,            // Command used to spin up for the coast
}

impl SequenceTiming {
    /// Total length of the coast-down experiment.
    pub const fn coast_duration_ms(&self) -> u32 {
        self.coast_accel_ms + self.coast_log_ms
    }
}

impl Default for SequenceTiming {
    fn default() -> Self {
        Self {
            coast_accel_ms: 4000,
            coast_log_ms: 8000,
            coast_sample_ms: 50,
            steady_settle_ms: 2000,
            back_emf_settle_ms: 1000,
            report_interval_ms: 100,
            coast_pwm: PWM_MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = LabConfig::default();
        assert_eq!(cfg.control_period_ms, 50);
        assert_eq!(cfg.output_max, 255.0);
        assert_eq!(cfg.timing.coast_duration_ms(), 12_000);
        assert_eq!(cfg.timing.coast_pwm, 255);
    }
}

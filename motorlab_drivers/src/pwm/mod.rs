// Sign-magnitude H-bridge drive on TIM2.

// Forward commands modulate IN1 while IN2 stays low, reverse commands do the
// opposite. A zero command leaves both inputs low so the motor coasts, which
// is what the coast-down experiment relies on.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use hal::{
    clocks::Clocks,
    pac::TIM2,
    timer::{
        Alignment, CaptureCompareDma, CountDir, OutputCompare, TimChannel, Timer, TimerConfig,
        UpdateReqSrc,
    },
};

use motorlab_algo::{MotorDrive, PWM_MAX};

use super::pinout;

const FORWARD: TimChannel = TimChannel::C1;
const REVERSE: TimChannel = TimChannel::C2;

pub struct HBridgePwm {
    tim: Timer<TIM2>,
    command: i16,
}

impl HBridgePwm {
    pub fn new(tim2: TIM2, clock_cfg: &Clocks, freq: u16) -> Self {
        let mut timer = Timer::new_tim2(
            tim2,
            freq as f32,
            TimerConfig {
                one_pulse_mode: false,
                update_request_source: UpdateReqSrc::Any,
                auto_reload_preload: true,
                alignment: Alignment::Edge,
                capture_compare_dma: CaptureCompareDma::Update,
                direction: CountDir::Up,
            },
            clock_cfg,
        );
        timer.enable();

        HBridgePwm {
            tim: timer,
            command: 0,
        }
    }

    /// Routes both channels to the bridge inputs with zero duty.
    pub fn begin(&mut self) {
        self.tim.enable_pwm_output(FORWARD, OutputCompare::Pwm1, 0.0);
        self.tim.enable_pwm_output(REVERSE, OutputCompare::Pwm1, 0.0);

        pinout::driver::IN1.init();
        pinout::driver::IN2.init();
    }

    /// Last command applied, after clamping.
    pub fn command(&self) -> i16 {
        self.command
    }

    fn apply(&mut self, pwm: i16) {
        let pwm = pwm.clamp(-PWM_MAX, PWM_MAX);
        let duty = duty2period(pwm.unsigned_abs(), self.tim.get_max_duty());
        let (fwd, rev) = if pwm >= 0 { (duty, 0) } else { (0, duty) };
        self.tim.set_duty(FORWARD, fwd);
        self.tim.set_duty(REVERSE, rev);
        self.command = pwm;
    }
}

impl MotorDrive for HBridgePwm {
    fn set_command(&mut self, pwm: i16) {
        self.apply(pwm);
    }
}

/// Scales an 8-bit magnitude onto the timer period.
fn duty2period(magnitude: u16, period: u32) -> u32 {
    magnitude as u32 * period / PWM_MAX as u32
}

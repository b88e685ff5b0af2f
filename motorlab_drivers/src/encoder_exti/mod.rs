// Quadrature encoder inputs on EXTI lines.

// Each phase raises its own interrupt on both edges. The handlers read both
// levels and hand them to the decoder, so they stay constant time and touch
// nothing but the decoder's atomic count.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use hal::gpio::{self, Edge, Pin, Pull};

use motorlab_algo::QuadratureDecoder;

use super::pinout;

pub struct EncoderPins {
    a: Pin,
    b: Pin,
}

impl EncoderPins {
    /// Configures both phases with pull-ups and arms interrupts on either edge.
    pub fn new() -> Self {
        let mut a = pinout::encoder::ENC_A.init();
        let mut b = pinout::encoder::ENC_B.init();
        for pin in [&mut a, &mut b] {
            pin.pull(Pull::Up);
            pin.enable_interrupt(Edge::Either);
        }
        EncoderPins { a, b }
    }

    /// Current (A, B) levels.
    pub fn levels(&self) -> (bool, bool) {
        (self.a.is_high(), self.b.is_high())
    }

    /// Body of the phase A interrupt.
    pub fn on_a(&self, decoder: &QuadratureDecoder) {
        gpio::clear_exti_interrupt(pinout::encoder::ENC_A.exti_line());
        let (a, b) = self.levels();
        decoder.on_edge_a(a, b);
    }

    /// Body of the phase B interrupt.
    pub fn on_b(&self, decoder: &QuadratureDecoder) {
        gpio::clear_exti_interrupt(pinout::encoder::ENC_B.exti_line());
        let (a, b) = self.levels();
        decoder.on_edge_b(a, b);
    }
}

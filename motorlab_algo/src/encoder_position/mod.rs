// Implements interrupt-driven quadrature decoding for an incremental A/B encoder.

// Key Features:
// - Counts every edge of both phase lines (4x resolution) without a lookup table.
// - Keeps the position in a single atomic word so readers never observe a torn value.
// - Provides timestamped snapshots that feed the speed estimator.

// Detailed Operation:
// Each phase line has its own edge interrupt. When A toggles, the direction is
// forward if A and B now differ; when B toggles, the direction is forward if A and
// B now match. Both handlers only perform one atomic add, so they stay O(1) and can
// preempt any blocking work in the main loop without losing counts.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::sync::atomic::{AtomicI32, Ordering};

pub mod speed_estimator;
pub use self::speed_estimator::{SpeedEstimator, SpeedReading};

/// Position snapshot taken from the decoder at a given time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderSample {
    /// Signed position in encoder counts (4 counts per line pulse)
    pub position_counts: i32,
    /// Millisecond timestamp of the snapshot
    pub timestamp_ms: u32,
}

impl EncoderSample {
    pub const fn new(position_counts: i32, timestamp_ms: u32) -> Self {
        Self {
            position_counts,
            timestamp_ms,
        }
    }
}

/// Quadrature decoder shared between the two phase interrupts and the main loop.
///
/// Intended to live in a `static`; all methods take `&self`.
pub struct QuadratureDecoder {
    count: AtomicI32, // Only the edge handlers below ever modify this
}

impl QuadratureDecoder {
    /// Creates a decoder with the position at zero.
    pub const fn new() -> Self {
        Self {
            count: AtomicI32::new(0),
        }
    }

    /// Phase A edge handler. `a` and `b` are the line levels sampled after the edge.
    #[inline(always)]
    pub fn on_edge_a(&self, a: bool, b: bool) {
        let step = if a != b { 1 } else { -1 };
        self.count.fetch_add(step, Ordering::Relaxed);
    }

    /// Phase B edge handler. `a` and `b` are the line levels sampled after the edge.
    #[inline(always)]
    pub fn on_edge_b(&self, a: bool, b: bool) {
        let step = if a == b { 1 } else { -1 };
        self.count.fetch_add(step, Ordering::Relaxed);
    }

    /// Latest position in counts.
    #[inline(always)]
    pub fn read_position(&self) -> i32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Position together with the time it was read.
    #[inline(always)]
    pub fn sample(&self, timestamp_ms: u32) -> EncoderSample {
        EncoderSample::new(self.read_position(), timestamp_ms)
    }
}

impl Default for QuadratureDecoder {
    fn default() -> Self {
        Self::new()
    }
}

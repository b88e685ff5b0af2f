//! SpeedEstimator converts successive position snapshots into shaft speed.

use super::EncoderSample;

/// Shaft speed in revolutions per minute at a given time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedReading {
    pub rpm: f32,
    pub timestamp_ms: u32,
}

impl SpeedReading {
    /// Speed between two snapshots, `None` when no time has elapsed.
    pub fn between(previous: EncoderSample, current: EncoderSample, counts_per_rev: u32) -> Option<Self> {
        let dt_ms = current.timestamp_ms.wrapping_sub(previous.timestamp_ms); // Survives the u32 ms rollover
        if dt_ms == 0 || counts_per_rev == 0 {
            return None;
        }
        let delta = current.position_counts.wrapping_sub(previous.position_counts);
        let revolutions = delta as f32 / counts_per_rev as f32;
        Some(Self {
            rpm: revolutions * 60_000.0 / dt_ms as f32,
            timestamp_ms: current.timestamp_ms,
        })
    }
}

pub struct SpeedEstimator {
    counts_per_rev: u32,             // Encoder counts per shaft revolution (after 4x decoding)
    previous: Option<EncoderSample>, // Last snapshot, None until the first tick
    reading: SpeedReading,           // Last computed speed
}

impl SpeedEstimator {
    // Create new speed estimator
    pub fn new(counts_per_rev: u32) -> Self {
        Self {
            counts_per_rev,
            previous: None,
            reading: SpeedReading::default(),
        }
    }

    // Math call
    pub fn tick(&mut self, sample: EncoderSample) -> SpeedReading {
        if let Some(previous) = self.previous {
            match SpeedReading::between(previous, sample, self.counts_per_rev) {
                Some(reading) => self.reading = reading,
                None => return self.reading, // Same millisecond: keep the old window start
            }
        }
        self.previous = Some(sample);
        self.reading
    }

    /// Forget the history; the next tick only seeds the window.
    pub fn reset(&mut self) {
        self.previous = None;
        self.reading = SpeedReading::default();
    }

    // Getter for instant speed
    pub fn speed(&self) -> SpeedReading {
        self.reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_revolution_per_second_is_60_rpm() {
        let reading =
            SpeedReading::between(EncoderSample::new(0, 1000), EncoderSample::new(1200, 2000), 1200);
        assert_eq!(reading.map(|r| r.rpm), Some(60.0));
    }

    #[test]
    fn test_zero_interval_yields_nothing() {
        let s = EncoderSample::new(10, 5);
        assert!(SpeedReading::between(s, s, 1200).is_none());
    }

    #[test]
    fn test_reverse_speed_is_negative() {
        let mut est = SpeedEstimator::new(1000);
        est.tick(EncoderSample::new(500, 0));
        let r = est.tick(EncoderSample::new(0, 50));
        // -0.5 rev in 50 ms = -600 rpm
        assert!((r.rpm + 600.0).abs() < 1e-3);
    }

    #[test]
    fn test_first_tick_only_seeds() {
        let mut est = SpeedEstimator::new(1000);
        let r = est.tick(EncoderSample::new(12345, 100));
        assert_eq!(r.rpm, 0.0);
        let r = est.tick(EncoderSample::new(12345 + 1000, 1100));
        assert!((r.rpm - 60.0).abs() < 1e-3);
    }

    #[test]
    fn test_reset_forgets_window() {
        let mut est = SpeedEstimator::new(100);
        est.tick(EncoderSample::new(0, 0));
        est.tick(EncoderSample::new(100, 100));
        est.reset();
        assert_eq!(est.speed().rpm, 0.0);
        assert_eq!(est.tick(EncoderSample::new(5000, 200)).rpm, 0.0);
        let r = est.tick(EncoderSample::new(5010, 300));
        assert!((r.rpm - 60.0).abs() < 1e-3);
    }

    #[test]
    fn test_timestamp_rollover() {
        let mut est = SpeedEstimator::new(100);
        est.tick(EncoderSample::new(0, u32::MAX - 49));
        let r = est.tick(EncoderSample::new(100, 50)); // 100 ms later
        assert!((r.rpm - 600.0).abs() < 1e-3);
    }
}

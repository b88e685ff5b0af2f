// Implements the parameter estimation for a brushed DC motor from captured test runs.

// Key Features:
// - Back-EMF and torque constants from a constant-command run with current sensing.
// - Viscous damping from the steady-state balance of motor torque and friction.
// - Rotor inertia from the deceleration slope of a coast-down run.
// - Locked-rotor resistance fit, coast-down time constant and plausibility checks.

// Detailed Operation:
// All maths is done in f64 on completed runs only. Every procedure refuses to
// produce a number when its inputs cannot support one: too few samples, a
// degenerate fit or a missing prerequisite parameter is reported as an
// `EstimateError` instead. Parameters accumulate in `MotorParameterSet`, which
// enforces the derivation order R -> Ke/Kt -> b -> J.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::f64::consts::PI;
use core::fmt;

use thiserror::Error;

use crate::sequencer::{CollectedRun, RunSample, TestKind};

pub mod regression;
pub mod report;

pub use regression::{linear_fit, LinearFit, MIN_FIT_POINTS};
pub use report::{Check, ValidationReport};

/// Number of trailing samples averaged for steady-state values.
pub const TAIL_SAMPLES: usize = 10;

/// Copper temperature coefficient of resistance, per kelvin.
pub const COPPER_ALPHA: f64 = 0.004;

/// Coast-down samples at or below this speed are treated as a stopped shaft.
pub const COAST_SPEED_FLOOR_RPM: f64 = 1.0;

/// The inertia fit ends once speed falls below this fraction of the first sample.
pub const COAST_FIT_FRACTION: f64 = 0.5;

/// Lowest R² at which a coast-down slope is trusted.
pub const COAST_MIN_R_SQUARED: f64 = 0.95;

/// Converts shaft speed from rpm to rad/s.
#[inline(always)]
pub fn rpm_to_rad_s(rpm: f64) -> f64 {
    rpm * 2.0 * PI / 60.0
}

/// Parameter named by `EstimateError::MissingPrerequisite`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parameter {
    Resistance,
    TorqueConstant,
    Damping,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parameter::Resistance => "resistance R",
            Parameter::TorqueConstant => "torque constant Kt",
            Parameter::Damping => "damping b",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EstimateError {
    #[error("insufficient data: {got} samples, at least {needed} required")]
    InsufficientData { needed: usize, got: usize },
    #[error("degenerate fit: samples do not span the fitted axis")]
    DegenerateFit,
    #[error("speed is not decaying during the coast-down")]
    NotDecaying,
    #[error("{0} must be known first")]
    MissingPrerequisite(Parameter),
    #[error("run has no {0} measurement")]
    MissingMeasurement(&'static str),
    #[error("expected a {expected} run, got {actual}")]
    WrongRun { expected: TestKind, actual: TestKind },
    #[error("shaft speed too low to divide by")]
    ZeroSpeed,
    #[error("fitted value is not physical")]
    NonPhysical,
    #[error("coast-down is not linear enough over the fitted segment")]
    PoorFit,
}

/// Result of the back-EMF procedure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackEmfConstants {
    pub v_emf: f64, // V
    pub ke: f64,    // V*s/rad
    pub kt: f64,    // N*m/A, equal to Ke in SI units
}

/// Result of the coast-down inertia procedure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InertiaEstimate {
    pub j: f64,             // kg*m^2
    pub slope: f64,         // dω/dt, rad/s^2
    pub omega_avg: f64,     // rad/s over the fitted segment
    pub r_squared: f64,     // Quality of the linear fit
    pub assumed_damping: Option<f64>, // Set when b was assumed rather than measured
}

/// Mechanical time constant from a log-linear coast-down fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeConstantFit {
    pub tau: f64, // s
    pub omega0: f64,
    pub r_squared: f64,
}

/// Locked-rotor resistance fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResistanceFit {
    pub resistance: f64, // Ohm
    pub offset_v: f64,   // Intercept, ideally near zero
    pub r_squared: f64,
}

/// `V_emf = V_supply − I·R`, `Ke = V_emf / ω`, `Kt = Ke`.
pub fn back_emf_constants(
    v_supply: f64,
    current_a: f64,
    resistance: f64,
    omega_rad_s: f64,
) -> Result<BackEmfConstants, EstimateError> {
    if libm::fabs(omega_rad_s) < 1e-6 {
        return Err(EstimateError::ZeroSpeed);
    }
    let v_emf = v_supply - current_a * resistance;
    let ke = v_emf / omega_rad_s;
    Ok(BackEmfConstants { v_emf, ke, kt: ke })
}

/// Averages over the last `TAIL_SAMPLES` samples carrying a current reading.
struct Tail {
    omega: f64,
    current: f64,
    voltage: f64,
}

fn electrical_tail(samples: &[RunSample]) -> Result<Tail, EstimateError> {
    let (mut n, mut rpm, mut current, mut voltage) = (0usize, 0.0, 0.0, 0.0);
    for sample in samples.iter().rev() {
        if let Some(e) = sample.electrical {
            n += 1;
            rpm += sample.rpm as f64;
            current += e.current_a as f64;
            voltage += e.voltage_v as f64;
            if n == TAIL_SAMPLES {
                break;
            }
        }
    }
    if n == 0 {
        return Err(if samples.is_empty() {
            EstimateError::InsufficientData { needed: 1, got: 0 }
        } else {
            EstimateError::MissingMeasurement("current")
        });
    }
    let nf = n as f64;
    Ok(Tail {
        omega: rpm_to_rad_s(rpm / nf),
        current: current / nf,
        voltage: voltage / nf,
    })
}

fn expect_kind<const N: usize>(run: &CollectedRun<N>, expected: TestKind) -> Result<(), EstimateError> {
    match run.kind() {
        actual if actual == expected => Ok(()),
        actual => Err(EstimateError::WrongRun { expected, actual }),
    }
}

/// Ke/Kt from a back-EMF run. The measured supply voltage is used unless
/// `supply_override` is given.
pub fn estimate_back_emf<const N: usize>(
    run: &CollectedRun<N>,
    resistance: f64,
    supply_override: Option<f64>,
) -> Result<BackEmfConstants, EstimateError> {
    expect_kind(run, TestKind::BackEmf)?;
    let tail = electrical_tail(run.samples())?;
    let v_supply = supply_override.unwrap_or(tail.voltage);
    back_emf_constants(v_supply, tail.current, resistance, tail.omega)
}

/// `b = Kt · I_ss / ω_ss` from a steady-state run.
pub fn estimate_damping<const N: usize>(run: &CollectedRun<N>, kt: f64) -> Result<f64, EstimateError> {
    expect_kind(run, TestKind::SteadyState)?;
    let tail = electrical_tail(run.samples())?;
    if libm::fabs(tail.omega) < 1e-6 {
        return Err(EstimateError::ZeroSpeed);
    }
    Ok(kt * tail.current / tail.omega)
}

/// `J = −b · ω_avg / (dω/dt)` over the early coast-down segment.
///
/// The fit starts at the first logged sample and stops at the first one below
/// `COAST_SPEED_FLOOR_RPM` or `COAST_FIT_FRACTION` of the starting speed, so a
/// shaft that stops inside the window does not flatten the slope.
///
/// Without a measured `b` this refuses to compute; see
/// [`estimate_inertia_with_assumed_damping`] for the explicit fallback.
pub fn estimate_inertia<const N: usize>(
    run: &CollectedRun<N>,
    damping: Option<f64>,
) -> Result<InertiaEstimate, EstimateError> {
    let b = damping.ok_or(EstimateError::MissingPrerequisite(Parameter::Damping))?;
    inertia_from_coast(run, b, None)
}

/// Same as [`estimate_inertia`] with a caller-chosen `b`. The estimate is only
/// as good as the assumption and is tagged with it.
pub fn estimate_inertia_with_assumed_damping<const N: usize>(
    run: &CollectedRun<N>,
    assumed_b: f64,
) -> Result<InertiaEstimate, EstimateError> {
    inertia_from_coast(run, assumed_b, Some(assumed_b))
}

fn inertia_from_coast<const N: usize>(
    run: &CollectedRun<N>,
    b: f64,
    assumed_damping: Option<f64>,
) -> Result<InertiaEstimate, EstimateError> {
    expect_kind(run, TestKind::CoastDown)?;
    let start_rpm = run.samples().first().map(|s| s.rpm as f64).unwrap_or(0.0);
    let cutoff = libm::fmax(COAST_SPEED_FLOOR_RPM, COAST_FIT_FRACTION * start_rpm);
    let segment = run.samples().iter().take_while(|s| {
        let rpm = s.rpm as f64;
        rpm > COAST_SPEED_FLOOR_RPM && rpm >= cutoff
    });
    let fit = linear_fit(segment.map(|s| (s.elapsed_ms as f64 / 1000.0, rpm_to_rad_s(s.rpm as f64))))?;
    if fit.slope >= 0.0 {
        return Err(EstimateError::NotDecaying);
    }
    if fit.r_squared < COAST_MIN_R_SQUARED {
        debug!("coast-down fit rejected, R^2 {}", fit.r_squared);
        return Err(EstimateError::PoorFit);
    }
    let omega_avg = fit.mean_y;
    Ok(InertiaEstimate {
        j: -b * omega_avg / fit.slope,
        slope: fit.slope,
        omega_avg,
        r_squared: fit.r_squared,
        assumed_damping,
    })
}

/// Fits `ln ω = ln ω₀ − t/τ` over the coast-down samples above the speed floor.
pub fn coast_time_constant<const N: usize>(run: &CollectedRun<N>) -> Result<TimeConstantFit, EstimateError> {
    expect_kind(run, TestKind::CoastDown)?;
    let first_ms = run.samples().first().map(|s| s.elapsed_ms).unwrap_or(0);
    let fit = linear_fit(run.samples().iter().filter(|s| s.rpm as f64 > COAST_SPEED_FLOOR_RPM).map(|s| {
        let t = s.elapsed_ms.wrapping_sub(first_ms) as f64 / 1000.0;
        (t, libm::log(rpm_to_rad_s(s.rpm as f64)))
    }))?;
    if fit.slope >= 0.0 {
        return Err(EstimateError::NotDecaying);
    }
    Ok(TimeConstantFit {
        tau: -1.0 / fit.slope,
        omega0: libm::exp(fit.intercept),
        r_squared: fit.r_squared,
    })
}

/// Least-squares `V = R·I` over locked-rotor `(voltage, current)` points.
pub fn fit_resistance(points: &[(f64, f64)]) -> Result<ResistanceFit, EstimateError> {
    let fit = linear_fit(points.iter().map(|&(v, i)| (i, v)))?;
    if fit.slope <= 0.0 {
        return Err(EstimateError::NonPhysical);
    }
    Ok(ResistanceFit {
        resistance: fit.slope,
        offset_v: fit.intercept,
        r_squared: fit.r_squared,
    })
}

/// Refers a resistance measured at `temp_c` back to 20 °C.
pub fn resistance_at_20c(resistance: f64, temp_c: f64) -> f64 {
    resistance / (1.0 + COPPER_ALPHA * (temp_c - 20.0))
}

/// Motor parameters accumulated in derivation order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotorParameterSet {
    pub resistance: Option<f64>,     // R, Ohm
    pub inductance: Option<f64>,     // L, H
    pub inertia: Option<f64>,        // J, kg*m^2
    pub damping: Option<f64>,        // b, N*m*s/rad
    pub back_emf: Option<f64>,       // Ke, V*s/rad
    pub torque: Option<f64>,         // Kt, N*m/A
    pub assumed_damping: Option<f64>, // b used for J when no measured b existed
}

impl MotorParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplied from an external measurement.
    pub fn set_resistance(&mut self, ohms: f64) {
        self.resistance = Some(ohms);
    }

    /// Supplied from an external measurement.
    pub fn set_inductance(&mut self, henries: f64) {
        self.inductance = Some(henries);
    }

    /// Needs R. Sets Ke and Kt.
    pub fn apply_back_emf<const N: usize>(
        &mut self,
        run: &CollectedRun<N>,
        supply_override: Option<f64>,
    ) -> Result<BackEmfConstants, EstimateError> {
        let r = self
            .resistance
            .ok_or(EstimateError::MissingPrerequisite(Parameter::Resistance))?;
        let constants = estimate_back_emf(run, r, supply_override)?;
        self.back_emf = Some(constants.ke);
        self.torque = Some(constants.kt);
        Ok(constants)
    }

    /// Needs Kt. Sets b.
    pub fn apply_steady_state<const N: usize>(&mut self, run: &CollectedRun<N>) -> Result<f64, EstimateError> {
        let kt = self
            .torque
            .ok_or(EstimateError::MissingPrerequisite(Parameter::TorqueConstant))?;
        let b = estimate_damping(run, kt)?;
        self.damping = Some(b);
        Ok(b)
    }

    /// Needs b. Sets J.
    pub fn apply_coast_down<const N: usize>(
        &mut self,
        run: &CollectedRun<N>,
    ) -> Result<InertiaEstimate, EstimateError> {
        let estimate = estimate_inertia(run, self.damping)?;
        self.inertia = Some(estimate.j);
        self.assumed_damping = None;
        Ok(estimate)
    }

    /// Sets J from an assumed b and records the assumption.
    pub fn apply_coast_down_assuming_damping<const N: usize>(
        &mut self,
        run: &CollectedRun<N>,
        assumed_b: f64,
    ) -> Result<InertiaEstimate, EstimateError> {
        let estimate = estimate_inertia_with_assumed_damping(run, assumed_b)?;
        self.inertia = Some(estimate.j);
        self.assumed_damping = Some(assumed_b);
        Ok(estimate)
    }

    /// Plausibility checks over whatever is known.
    pub fn validate(&self) -> ValidationReport {
        ValidationReport::for_parameters(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::{ElectricalReading, RunOutcome, TestRun};

    fn run_of(kind: TestKind, samples: impl IntoIterator<Item = RunSample>) -> CollectedRun<512> {
        let mut run = TestRun::new(kind, 200, 10_000, 0);
        for s in samples {
            run.push(s).unwrap();
        }
        run.finish(RunOutcome::Completed)
    }

    fn sample(elapsed_ms: u32, rpm: f32, electrical: Option<(f32, f32)>) -> RunSample {
        RunSample {
            elapsed_ms,
            rpm,
            position: 0,
            electrical: electrical.map(|(current_a, voltage_v)| ElectricalReading { current_a, voltage_v }),
        }
    }

    /// ω(t) = ω₀·e^{−t/τ} sampled at 50 ms over the 8 s logging window.
    fn synthetic_coast(omega0: f64, tau: f64) -> CollectedRun<512> {
        run_of(
            TestKind::CoastDown,
            (0..160).map(|k| {
                let t_ms = 4000 + 50 * k;
                let t = (t_ms - 4000) as f64 / 1000.0;
                let omega = omega0 * libm::exp(-t / tau);
                sample(t_ms, (omega * 60.0 / (2.0 * PI)) as f32, None)
            }),
        )
    }

    #[test]
    fn test_back_emf_numeric_example() {
        let c = back_emf_constants(12.0, 0.6, 2.0, 20.94).unwrap();
        assert!((c.v_emf - 10.8).abs() < 1e-9);
        assert!((c.ke - 0.516).abs() < 1e-3);
        assert_eq!(c.ke, c.kt);
    }

    #[test]
    fn test_back_emf_from_run() {
        let run = run_of(
            TestKind::BackEmf,
            (0..20).map(|k| sample(1000 + 100 * k, 200.0, Some((0.6, 12.0)))),
        );
        let c = estimate_back_emf(&run, 2.0, None).unwrap();
        // 200 rpm = 20.944 rad/s
        assert!((c.ke - 10.8 / rpm_to_rad_s(200.0)).abs() < 1e-5);
        let c = estimate_back_emf(&run, 2.0, Some(11.0)).unwrap();
        assert!((c.v_emf - 9.8).abs() < 1e-5);
    }

    #[test]
    fn test_back_emf_needs_current() {
        let run = run_of(TestKind::BackEmf, (0..20).map(|k| sample(100 * k, 200.0, None)));
        assert_eq!(
            estimate_back_emf(&run, 2.0, None),
            Err(EstimateError::MissingMeasurement("current"))
        );
    }

    #[test]
    fn test_damping_uses_tail_average() {
        // Spin-up samples at the head are ignored by the 10-sample tail
        let head = (0..5).map(|k| sample(2000 + 100 * k, 50.0, Some((2.0, 12.0))));
        let tail = (5..25).map(|k| sample(2000 + 100 * k, 300.0, Some((0.1, 12.0))));
        let run = run_of(TestKind::SteadyState, head.chain(tail));
        let b = estimate_damping(&run, 0.05).unwrap();
        let expected = 0.05 * 0.1 / rpm_to_rad_s(300.0);
        assert!((b - expected).abs() < 1e-9);
    }

    #[test]
    fn test_coast_down_round_trip() {
        let (j, b) = (2e-4, 5e-6); // τ = 40 s
        let run = synthetic_coast(300.0, j / b);
        let est = estimate_inertia(&run, Some(b)).unwrap();
        assert!((est.j - j).abs() / j < 0.01, "J = {}", est.j);
        assert!(est.r_squared > 0.99);
        assert_eq!(est.assumed_damping, None);

        let tau = coast_time_constant(&run).unwrap();
        assert!((tau.tau - 40.0).abs() / 40.0 < 1e-3);
        assert!((tau.omega0 - 300.0).abs() / 300.0 < 1e-3);
    }

    #[test]
    fn test_coast_round_trip_across_time_constants() {
        let b = 1e-5;
        for tau in [0.5, 2.0, 10.0] {
            let run = synthetic_coast(300.0, tau);
            let est = estimate_inertia(&run, Some(b)).unwrap();
            let j = b * tau;
            assert!((est.j - j).abs() / j < 0.02, "tau {}: J = {}", tau, est.j);
            assert!(est.r_squared >= COAST_MIN_R_SQUARED);

            let fit = coast_time_constant(&run).unwrap();
            assert!((fit.tau - tau).abs() / tau < 0.01, "tau {}: fitted {}", tau, fit.tau);
        }
    }

    #[test]
    fn test_stopped_shaft_tail_is_not_fitted() {
        // Decays for 1 s, then sits at zero for the rest of the window
        let run = run_of(
            TestKind::CoastDown,
            (0..160).map(|k| {
                let t = 0.05 * k as f64;
                let rpm = libm::fmax(0.0, 1000.0 * (1.0 - t));
                sample(4000 + 50 * k, rpm as f32, None)
            }),
        );
        let est = estimate_inertia(&run, Some(1e-5)).unwrap();
        // dω/dt = −1000 rpm/s over the fitted part
        assert!((est.slope + rpm_to_rad_s(1000.0)).abs() / rpm_to_rad_s(1000.0) < 1e-3);
        assert!(est.r_squared > 0.999);
    }

    #[test]
    fn test_too_fast_coast_is_insufficient() {
        // Falls below half speed before five samples are logged
        let run = synthetic_coast(300.0, 0.1);
        assert!(matches!(
            estimate_inertia(&run, Some(1e-5)),
            Err(EstimateError::InsufficientData { needed: 5, .. })
        ));
    }

    #[test]
    fn test_noisy_coast_is_rejected() {
        let jitter: [f32; 10] = [0.0, 120.0, -90.0, 140.0, -130.0, 60.0, -150.0, 110.0, -40.0, 90.0];
        let run = run_of(
            TestKind::CoastDown,
            jitter.iter().enumerate().map(|(k, j)| sample(4000 + 50 * k as u32, 1000.0 - 5.0 * k as f32 + j, None)),
        );
        assert_eq!(estimate_inertia(&run, Some(1e-5)), Err(EstimateError::PoorFit));
    }

    #[test]
    fn test_inertia_requires_damping() {
        let run = synthetic_coast(300.0, 40.0);
        assert_eq!(
            estimate_inertia(&run, None),
            Err(EstimateError::MissingPrerequisite(Parameter::Damping))
        );
        let est = estimate_inertia_with_assumed_damping(&run, 1e-5).unwrap();
        assert_eq!(est.assumed_damping, Some(1e-5));
    }

    #[test]
    fn test_short_coast_down_is_insufficient() {
        let run = run_of(
            TestKind::CoastDown,
            (0..4).map(|k| sample(4000 + 50 * k, 1000.0 - 10.0 * k as f32, None)),
        );
        assert_eq!(
            estimate_inertia(&run, Some(1e-5)),
            Err(EstimateError::InsufficientData { needed: 5, got: 4 })
        );
    }

    #[test]
    fn test_flat_coast_is_not_decaying() {
        let run = run_of(TestKind::CoastDown, (0..10).map(|k| sample(4000 + 50 * k, 500.0, None)));
        assert_eq!(estimate_inertia(&run, Some(1e-5)), Err(EstimateError::NotDecaying));
    }

    #[test]
    fn test_wrong_run_kind() {
        let run = synthetic_coast(300.0, 40.0);
        assert_eq!(
            estimate_damping(&run, 0.05),
            Err(EstimateError::WrongRun {
                expected: TestKind::SteadyState,
                actual: TestKind::CoastDown
            })
        );
    }

    #[test]
    fn test_resistance_fit_and_temperature_correction() {
        let points: [(f64, f64); 5] = [(1.0, 0.5), (2.0, 1.0), (3.0, 1.5), (4.0, 2.0), (5.0, 2.5)];
        let fit = fit_resistance(&points).unwrap();
        assert!((fit.resistance - 2.0).abs() < 1e-12);
        assert!(fit.offset_v.abs() < 1e-12);
        assert!((resistance_at_20c(2.2, 45.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_parameter_order_is_enforced() {
        let mut params = MotorParameterSet::new();
        let bemf = run_of(TestKind::BackEmf, (0..10).map(|k| sample(1000 + 100 * k, 200.0, Some((0.6, 12.0)))));
        let steady = run_of(TestKind::SteadyState, (0..10).map(|k| sample(2000 + 100 * k, 200.0, Some((0.2, 12.0)))));

        assert_eq!(
            params.apply_back_emf(&bemf, None),
            Err(EstimateError::MissingPrerequisite(Parameter::Resistance))
        );
        assert_eq!(
            params.apply_steady_state(&steady),
            Err(EstimateError::MissingPrerequisite(Parameter::TorqueConstant))
        );

        params.set_resistance(2.0);
        params.apply_back_emf(&bemf, None).unwrap();
        params.apply_steady_state(&steady).unwrap();
        params.apply_coast_down(&synthetic_coast(200.0, 40.0)).unwrap();
        assert!(params.inertia.is_some());
        assert_eq!(params.back_emf, params.torque);
    }
}

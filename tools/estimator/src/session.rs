//! Turns captured serial sessions into a motor parameter set.

use anyhow::{Context, Result};
use motorlab_algo::estimator::{self, MotorParameterSet, TimeConstantFit};
use motorlab_algo::sequencer::{CollectedRun, RunCollector, RunOutcome, TestKind};

use crate::config::EstimatorConfig;

/// Completed and stopped runs found in a capture, in order of appearance.
pub fn collect_runs(text: &str) -> Result<Vec<CollectedRun>> {
    let mut collector: Box<RunCollector> = Box::default();
    let mut runs = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let released = collector
            .feed(line.trim())
            .with_context(|| format!("line {}: {:?}", n + 1, line))?;
        if let Some(run) = released {
            log::debug!(
                "{} run with {} samples ({:?})",
                run.kind(),
                run.samples().len(),
                run.outcome()
            );
            runs.push(run);
        }
    }
    if let Some(kind) = collector.in_progress() {
        log::warn!("Capture ends inside an unfinished {} run, ignoring it", kind);
    }
    Ok(runs)
}

/// Most recent run of `kind` that ran to completion.
pub fn latest_completed(runs: &[CollectedRun], kind: TestKind) -> Option<&CollectedRun> {
    runs.iter()
        .rev()
        .find(|r| r.kind() == kind && r.outcome() == RunOutcome::Completed)
}

/// Parses locked-rotor `volts,amps` points, one per line.
pub fn parse_locked_rotor(text: &str) -> Result<Vec<(f64, f64)>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| -> Result<(f64, f64)> {
            let (v, i) = l
                .split_once(',')
                .with_context(|| format!("expected volts,amps: {:?}", l))?;
            let v = v.trim().parse::<f64>().with_context(|| format!("bad voltage in {:?}", l))?;
            let i = i.trim().parse::<f64>().with_context(|| format!("bad current in {:?}", l))?;
            Ok((v, i))
        })
        .collect()
}

pub struct Characterization {
    pub parameters: MotorParameterSet,
    pub coast_tau: Option<TimeConstantFit>,
}

/// Derives parameters in dependency order: R and L, then Ke/Kt, then b, then J.
///
/// A step that cannot run leaves its parameters unknown and is logged; the
/// report shows what could be derived.
pub fn characterize(
    runs: &[CollectedRun],
    cfg: &EstimatorConfig,
    locked_rotor: Option<&[(f64, f64)]>,
) -> Characterization {
    let mut params = MotorParameterSet::new();

    match (cfg.resistance_ohm, locked_rotor) {
        (Some(r), _) => params.set_resistance(r),
        (None, Some(points)) => match estimator::fit_resistance(points) {
            Ok(fit) => {
                log::info!("Locked-rotor fit: R = {:.4} Ohm (R^2 {:.4})", fit.resistance, fit.r_squared);
                let r = match cfg.winding_temp_c {
                    Some(t) => estimator::resistance_at_20c(fit.resistance, t),
                    None => fit.resistance,
                };
                params.set_resistance(r);
            }
            Err(err) => log::warn!("Locked-rotor fit failed: {}", err),
        },
        (None, None) => log::warn!("No resistance given, back-EMF constants cannot be derived"),
    }
    if let Some(l) = cfg.inductance_h {
        params.set_inductance(l);
    }

    match latest_completed(runs, TestKind::BackEmf) {
        Some(run) => match params.apply_back_emf(run, cfg.supply_v) {
            Ok(c) => log::info!("Back-EMF: V_emf = {:.3} V, Ke = Kt = {:.4}", c.v_emf, c.ke),
            Err(err) => log::warn!("Back-EMF step skipped: {}", err),
        },
        None => log::warn!("No completed BACK_EMF run in the captures"),
    }

    match latest_completed(runs, TestKind::SteadyState) {
        Some(run) => match params.apply_steady_state(run) {
            Ok(b) => log::info!("Steady state: b = {:.3e} N*m*s/rad", b),
            Err(err) => log::warn!("Steady-state step skipped: {}", err),
        },
        None => log::warn!("No completed STEADY_STATE run in the captures"),
    }

    let mut coast_tau = None;
    if let Some(run) = latest_completed(runs, TestKind::CoastDown) {
        let inertia = match (params.damping, cfg.assume_damping) {
            (None, Some(b)) => {
                log::warn!("Damping not measured, assuming b = {:.3e}", b);
                params.apply_coast_down_assuming_damping(run, b)
            }
            _ => params.apply_coast_down(run),
        };
        match inertia {
            Ok(est) => log::info!("Coast-down: J = {:.3e} kg*m^2 (R^2 {:.4})", est.j, est.r_squared),
            Err(err) => log::warn!("Coast-down step skipped: {}", err),
        }
        match estimator::coast_time_constant(run) {
            Ok(fit) => coast_tau = Some(fit),
            Err(err) => log::warn!("Coast-down time constant fit failed: {}", err),
        }
    } else {
        log::warn!("No completed COAST_DOWN run in the captures");
    }

    Characterization {
        parameters: params,
        coast_tau,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    fn electrical_run(kind: &str, rpm: f64, current: f64, out: &mut String) {
        writeln!(out, "TEST_STARTED,{},200,5000", kind).unwrap();
        for k in 0..20 {
            writeln!(out, "DATA,{},{:.2},{},{},{:.3},12.000", 1000 + k * 100, rpm, k * 40, kind, current).unwrap();
        }
        writeln!(out, "TEST_COMPLETE,{}", kind).unwrap();
    }

    fn coast_run(tau_s: f64, out: &mut String) {
        writeln!(out, "TEST_STARTED,COAST_DOWN,255,12000").unwrap();
        writeln!(out, "PHASE,COAST_DOWN,LOGGING").unwrap();
        for k in 0..160u32 {
            let elapsed = 4000 + k * 50;
            let rpm = 2500.0 * (-(k as f64 * 0.05) / tau_s).exp();
            writeln!(out, "DATA,{},{:.2},{},COAST_DOWN", elapsed, rpm, k * 100).unwrap();
        }
        writeln!(out, "TEST_COMPLETE,COAST_DOWN").unwrap();
    }

    fn full_capture() -> String {
        let mut text = String::from("READY\n");
        electrical_run("BACK_EMF", 2000.0, 0.6, &mut text);
        electrical_run("STEADY_STATE", 1500.0, 0.05, &mut text);
        coast_run(40.0, &mut text);
        text
    }

    #[test]
    fn test_collects_runs_and_skips_chatter() {
        let runs = collect_runs(&full_capture()).unwrap();
        let kinds: Vec<_> = runs.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, [TestKind::BackEmf, TestKind::SteadyState, TestKind::CoastDown]);
        assert_eq!(runs[2].samples().len(), 160);
    }

    #[test]
    fn test_stopped_runs_are_not_used() {
        let mut text = full_capture();
        text.push_str("TEST_STARTED,BACK_EMF,200,5000\nDATA,1000,10.00,0,BACK_EMF,0.100,12.000\nTEST_STOPPED,BACK_EMF\n");
        let runs = collect_runs(&text).unwrap();
        assert_eq!(runs.len(), 4);
        let chosen = latest_completed(&runs, TestKind::BackEmf).unwrap();
        assert_eq!(chosen.samples().len(), 20);
    }

    #[test]
    fn test_mixed_kinds_are_rejected() {
        let text = "TEST_STARTED,BACK_EMF,200,5000\nDATA,1000,10.00,0,COAST_DOWN\n";
        assert!(collect_runs(text).is_err());
    }

    #[test]
    fn test_full_characterization() {
        let runs = collect_runs(&full_capture()).unwrap();
        let cfg = EstimatorConfig {
            resistance_ohm: Some(2.0),
            inductance_h: Some(1.5e-3),
            ..Default::default()
        };
        let result = characterize(&runs, &cfg, None);
        let p = result.parameters;

        let kt = p.torque.unwrap();
        assert!((kt - 10.8 / estimator::rpm_to_rad_s(2000.0)).abs() / kt < 0.01);
        let b = p.damping.unwrap();
        assert!((b - kt * 0.05 / estimator::rpm_to_rad_s(1500.0)).abs() / b < 0.01);
        assert!((p.inertia.unwrap() / b - 40.0).abs() / 40.0 < 0.03);
        assert!(p.assumed_damping.is_none());

        let tau = result.coast_tau.unwrap();
        assert!((tau.tau - 40.0).abs() / 40.0 < 0.01);
    }

    #[test]
    fn test_coast_only_needs_assumed_damping() {
        let mut text = String::new();
        coast_run(40.0, &mut text);
        let runs = collect_runs(&text).unwrap();

        let without = characterize(&runs, &EstimatorConfig::default(), None);
        assert_eq!(without.parameters.inertia, None);

        let cfg = EstimatorConfig {
            assume_damping: Some(1e-5),
            ..Default::default()
        };
        let with = characterize(&runs, &cfg, None).parameters;
        assert_eq!(with.assumed_damping, Some(1e-5));
        assert!(with.inertia.is_some());
    }

    #[test]
    fn test_locked_rotor_resistance() {
        let points = parse_locked_rotor("# V,A\n1.0,0.5\n2.0,1.0\n3.0,1.5\n4.0,2.0\n5.0,2.5\n").unwrap();
        assert_eq!(points.len(), 5);
        let cfg = EstimatorConfig {
            winding_temp_c: Some(20.0),
            ..Default::default()
        };
        let p = characterize(&[], &cfg, Some(&points)).parameters;
        assert!((p.resistance.unwrap() - 2.0).abs() < 1e-9);

        assert!(parse_locked_rotor("1.0;0.5\n").is_err());
    }
}

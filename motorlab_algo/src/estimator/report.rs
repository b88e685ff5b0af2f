//! Human-readable parameter report and plausibility checks.

use core::fmt;

use super::MotorParameterSet;

/// One plausibility check over a derived quantity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Check {
    pub name: &'static str,
    pub unit: &'static str,
    pub value: Option<f64>, // None when its inputs are unknown
    pub min: f64,
    pub max: f64,
}

impl Check {
    /// `None` when the check could not run.
    pub fn passed(&self) -> Option<bool> {
        self.value.map(|v| v >= self.min && v <= self.max)
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.value, self.passed()) {
            (Some(v), Some(ok)) => write!(
                f,
                "{}: {:.3e}{} (expected {}..{}) {}",
                self.name,
                v,
                self.unit,
                self.min,
                self.max,
                if ok { "PASS" } else { "FAIL" }
            ),
            _ => write!(f, "{}: skipped, inputs unknown", self.name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValidationReport {
    pub kt_ke_ratio: Check,    // SI units make these equal
    pub electrical_tau: Check, // L/R
    pub mechanical_tau: Check, // J/b
}

impl ValidationReport {
    pub fn for_parameters(p: &MotorParameterSet) -> Self {
        let ratio = |num: Option<f64>, den: Option<f64>| match (num, den) {
            (Some(n), Some(d)) if d != 0.0 => Some(n / d),
            _ => None,
        };
        // An assumed b makes J/b circular, so the check only runs on a measured b
        let measured_damping = match p.assumed_damping {
            Some(_) => None,
            None => p.damping,
        };
        Self {
            kt_ke_ratio: Check {
                name: "Kt/Ke ratio",
                unit: "",
                value: ratio(p.torque, p.back_emf),
                min: 0.8,
                max: 1.2,
            },
            electrical_tau: Check {
                name: "Electrical time constant L/R",
                unit: " s",
                value: ratio(p.inductance, p.resistance),
                min: 1e-4,
                max: 1e-2,
            },
            mechanical_tau: Check {
                name: "Mechanical time constant J/b",
                unit: " s",
                value: ratio(p.inertia, measured_damping),
                min: 0.1,
                max: 10.0,
            },
        }
    }

    pub fn checks(&self) -> [Check; 3] {
        [self.kt_ke_ratio, self.electrical_tau, self.mechanical_tau]
    }

    /// True when no check that could run has failed.
    pub fn all_passed(&self) -> bool {
        self.checks().iter().all(|c| c.passed() != Some(false))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in self.checks() {
            writeln!(f, "{}", check)?;
        }
        Ok(())
    }
}

struct Value(Option<f64>, bool);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value(None, _) => f.write_str("unknown"),
            Value(Some(v), true) => write!(f, "{:.3e}", v),
            Value(Some(v), false) => write!(f, "{:.4}", v),
        }
    }
}

impl fmt::Display for MotorParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Resistance R:      {} Ohm", Value(self.resistance, false))?;
        writeln!(f, "Inductance L:      {} H", Value(self.inductance, true))?;
        write!(f, "Inertia J:         {} kg*m^2", Value(self.inertia, true))?;
        if let Some(b) = self.assumed_damping {
            write!(f, " (assumes b = {:.3e} N*m*s/rad, accuracy limited)", b)?;
        }
        writeln!(f)?;
        writeln!(f, "Damping b:         {} N*m*s/rad", Value(self.damping, true))?;
        writeln!(f, "Back-EMF Ke:       {} V*s/rad", Value(self.back_emf, false))?;
        writeln!(f, "Torque Kt:         {} N*m/A", Value(self.torque, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> MotorParameterSet {
        MotorParameterSet {
            resistance: Some(2.0),
            inductance: Some(1.5e-3),
            inertia: Some(2e-4),
            damping: Some(5e-5),
            back_emf: Some(0.516),
            torque: Some(0.516),
            assumed_damping: None,
        }
    }

    #[test]
    fn test_plausible_motor_passes() {
        let report = known().validate();
        assert_eq!(report.kt_ke_ratio.passed(), Some(true));
        assert_eq!(report.electrical_tau.passed(), Some(true)); // 0.75 ms
        assert_eq!(report.mechanical_tau.passed(), Some(true)); // 4 s
        assert!(report.all_passed());
    }

    #[test]
    fn test_implausible_time_constant_fails() {
        let mut p = known();
        p.damping = Some(1e-7); // J/b = 2000 s
        let report = p.validate();
        assert_eq!(report.mechanical_tau.passed(), Some(false));
        assert!(!report.all_passed());
    }

    #[test]
    fn test_unknowns_are_skipped() {
        let report = MotorParameterSet::new().validate();
        assert!(report.checks().iter().all(|c| c.passed().is_none()));
        assert!(report.all_passed());
    }

    #[test]
    fn test_report_uses_units_and_scientific_notation() {
        let text = known().to_string();
        assert!(text.contains("Inertia J:         2.000e-4 kg*m^2"));
        assert!(text.contains("Damping b:         5.000e-5 N*m*s/rad"));
        assert!(text.contains("Resistance R:      2.0000 Ohm"));

        let text = MotorParameterSet::new().to_string();
        assert!(text.contains("Inertia J:         unknown kg*m^2"));
    }

    #[test]
    fn test_assumed_damping_is_flagged() {
        let mut p = known();
        p.damping = None;
        p.assumed_damping = Some(1e-5);
        assert!(p.to_string().contains("assumes b = 1.000e-5"));
        assert_eq!(p.validate().mechanical_tau.passed(), None);
    }
}

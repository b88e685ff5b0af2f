//! Simple TOML-subset config loader for the estimator.
//! Supports [sections] with key = value pairs (strings and floats).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Parsed configuration values, keyed by "section.key".
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    /// Load config from a file. A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config file at {:?}, using defaults", path);
            return Ok(Self { values: HashMap::new() });
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        log::info!("Loaded config from {:?}", path);
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();
        let mut section = String::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_string();
                continue;
            }
            let Some((key, val)) = line.split_once('=') else {
                log::warn!("Ignoring config line without '=': {}", line);
                continue;
            };
            let val = match val.find('#') {
                Some(hash) => &val[..hash],
                None => val,
            };
            let val = val.trim().trim_matches('"');
            let full_key = if section.is_empty() {
                key.trim().to_string()
            } else {
                format!("{}.{}", section, key.trim())
            };
            values.insert(full_key, val.to_string());
        }

        Self { values }
    }

    /// `None` when the key is absent. A present but malformed value is an error,
    /// so a typo never silently becomes a default.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        self.values
            .get(key)
            .map(|v| {
                v.parse::<f64>()
                    .with_context(|| format!("config key {} is not a number: {:?}", key, v))
            })
            .transpose()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Everything the derivation needs besides the captured runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EstimatorConfig {
    // Motor
    pub resistance_ohm: Option<f64>,
    pub inductance_h: Option<f64>,
    pub winding_temp_c: Option<f64>, // Temperature at which R was measured
    pub locked_rotor: Option<String>, // CSV of "volts,amps" points
    // Estimator
    pub supply_v: Option<f64>,        // Overrides the measured supply in back-EMF runs
    pub assume_damping: Option<f64>,  // Fallback b for the coast-down
}

impl EstimatorConfig {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            resistance_ohm: cfg.get_f64("motor.resistance_ohm")?,
            inductance_h: cfg.get_f64("motor.inductance_h")?,
            winding_temp_c: cfg.get_f64("motor.winding_temp_c")?,
            locked_rotor: cfg.get_str("motor.locked_rotor").map(str::to_string),
            supply_v: cfg.get_f64("estimator.supply_v")?,
            assume_damping: cfg.get_f64("estimator.assume_damping")?,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_config(&Config::load(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# bench motor
[motor]
resistance_ohm = 2.0   # measured cold
inductance_h = 1.5e-3
locked_rotor = "locked.csv"

[estimator]
supply_v = 12.0
"#;

    #[test]
    fn test_sections_and_comments() {
        let cfg = Config::parse(SAMPLE);
        assert_eq!(cfg.get_f64("motor.resistance_ohm").unwrap(), Some(2.0));
        assert_eq!(cfg.get_f64("motor.inductance_h").unwrap(), Some(1.5e-3));
        assert_eq!(cfg.get_str("motor.locked_rotor"), Some("locked.csv"));
        assert_eq!(cfg.get_f64("estimator.assume_damping").unwrap(), None);
    }

    #[test]
    fn test_estimator_config_from_text() {
        let est = EstimatorConfig::from_config(&Config::parse(SAMPLE)).unwrap();
        assert_eq!(est.resistance_ohm, Some(2.0));
        assert_eq!(est.supply_v, Some(12.0));
        assert_eq!(est.winding_temp_c, None);
        assert_eq!(est.locked_rotor.as_deref(), Some("locked.csv"));
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let cfg = Config::parse("[motor]\nresistance_ohm = two\n");
        assert!(cfg.get_f64("motor.resistance_ohm").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let est = EstimatorConfig::from_file(Path::new("/nonexistent/estimator.toml")).unwrap();
        assert_eq!(est, EstimatorConfig::default());
    }
}

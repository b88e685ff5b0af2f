//! Command-line flags. Flags override values from the config file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::config::EstimatorConfig;

pub const USAGE: &str = "\
usage: estimator [options] <capture>...

  --config <file>          config file (default: estimator.toml)
  --resistance <ohm>       winding resistance
  --inductance <H>         winding inductance
  --locked-rotor <file>    fit R from locked-rotor volts,amps points
  --winding-temp <C>       temperature at which R was measured
  --supply <V>             supply voltage for back-EMF runs
  --assume-damping <b>     fallback damping for the coast-down (N*m*s/rad)";

const VALUE_FLAGS: [&str; 7] = [
    "--config",
    "--resistance",
    "--inductance",
    "--locked-rotor",
    "--winding-temp",
    "--supply",
    "--assume-damping",
];

#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    pub config: PathBuf,
    pub overrides: EstimatorConfig,
    pub captures: Vec<PathBuf>,
    pub help: bool,
}

fn find_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

fn find_f64(args: &[String], flag: &str) -> Result<Option<f64>> {
    find_arg(args, flag)
        .map(|v| {
            v.parse::<f64>()
                .with_context(|| format!("{} expects a number, got {:?}", flag, v))
        })
        .transpose()
}

impl Options {
    /// Parses everything after the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut captures = Vec::new();
        let mut help = false;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--help" || arg == "-h" {
                help = true;
            } else if VALUE_FLAGS.contains(&arg.as_str()) {
                if iter.next().is_none() {
                    bail!("{} expects a value", arg);
                }
            } else if arg.starts_with("--") {
                bail!("unknown flag {}", arg);
            } else {
                captures.push(PathBuf::from(arg));
            }
        }

        Ok(Self {
            config: find_arg(args, "--config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("estimator.toml")),
            overrides: EstimatorConfig {
                resistance_ohm: find_f64(args, "--resistance")?,
                inductance_h: find_f64(args, "--inductance")?,
                winding_temp_c: find_f64(args, "--winding-temp")?,
                locked_rotor: find_arg(args, "--locked-rotor"),
                supply_v: find_f64(args, "--supply")?,
                assume_damping: find_f64(args, "--assume-damping")?,
            },
            captures,
            help,
        })
    }

    /// Values given on the command line win over the file.
    pub fn merge(&self, file: EstimatorConfig) -> EstimatorConfig {
        let o = &self.overrides;
        EstimatorConfig {
            resistance_ohm: o.resistance_ohm.or(file.resistance_ohm),
            inductance_h: o.inductance_h.or(file.inductance_h),
            winding_temp_c: o.winding_temp_c.or(file.winding_temp_c),
            locked_rotor: o.locked_rotor.clone().or(file.locked_rotor),
            supply_v: o.supply_v.or(file.supply_v),
            assume_damping: o.assume_damping.or(file.assume_damping),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_flags_and_captures() {
        let opts = Options::parse(&args("--resistance 2.0 run1.log --supply 12 run2.log")).unwrap();
        assert_eq!(opts.overrides.resistance_ohm, Some(2.0));
        assert_eq!(opts.overrides.supply_v, Some(12.0));
        assert_eq!(opts.captures, [PathBuf::from("run1.log"), PathBuf::from("run2.log")]);
        assert_eq!(opts.config, PathBuf::from("estimator.toml"));
        assert!(!opts.help);
    }

    #[test]
    fn test_bad_input_is_rejected() {
        assert!(Options::parse(&args("--resistance abc run.log")).is_err());
        assert!(Options::parse(&args("--frobnicate run.log")).is_err());
        assert!(Options::parse(&args("run.log --supply")).is_err());
    }

    #[test]
    fn test_command_line_overrides_file() {
        let opts = Options::parse(&args("--assume-damping 1e-5 run.log")).unwrap();
        let file = EstimatorConfig {
            resistance_ohm: Some(2.0),
            assume_damping: Some(3e-5),
            ..Default::default()
        };
        let merged = opts.merge(file);
        assert_eq!(merged.resistance_ohm, Some(2.0));
        assert_eq!(merged.assume_damping, Some(1e-5));
    }
}

mod cli;
mod config;
mod session;

use std::path::Path;

use anyhow::{bail, Context, Result};

use cli::{Options, USAGE};
use config::EstimatorConfig;

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))
}

fn main() -> Result<()> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(env)
        .filter(Some("estimator"), log::LevelFilter::Debug)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = Options::parse(&args)?;
    if opts.help {
        println!("{}", USAGE);
        return Ok(());
    }
    if opts.captures.is_empty() {
        bail!("no capture files given\n\n{}", USAGE);
    }

    let cfg = opts.merge(EstimatorConfig::from_file(&opts.config)?);

    let mut runs = Vec::new();
    for path in &opts.captures {
        let found = session::collect_runs(&read(path)?)
            .with_context(|| format!("parsing capture {:?}", path))?;
        log::info!("{:?}: {} runs", path, found.len());
        runs.extend(found);
    }

    let locked_rotor = match &cfg.locked_rotor {
        Some(path) => Some(session::parse_locked_rotor(&read(Path::new(path))?)?),
        None => None,
    };

    let result = session::characterize(&runs, &cfg, locked_rotor.as_deref());

    println!("{}", result.parameters);
    if let Some(fit) = result.coast_tau {
        println!(
            "Coast-down tau:    {:.3} s (R^2 {:.4})",
            fit.tau, fit.r_squared
        );
    }
    println!();
    let report = result.parameters.validate();
    print!("{}", report);
    if !report.all_passed() {
        log::warn!("Some parameters are outside their plausible range");
    }
    Ok(())
}

mod cli;
mod progress;
mod report;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Cli::parse();

    #[cfg(not(feature = "serial"))]
    rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global()?;

    let materials = MaterialTable::builtin();
    match &args.command {
        Command::Run { scenario } => {
            let mut progress = Progress::new();
            progress.start(&format!("Reading {}", scenario.display()));
            let scenario = read_config_file(scenario)?;
            progress.done();
            progress.start("Simulating");
            let report = desim::run(&scenario, &materials)?;
            progress.done();
            report::print(&report);
        },
        Command::Sweep { scenario, low_kvp, step } => {
            let scenario = read_config_file(scenario)?;
            sweep(&scenario, &materials, low_kvp, *step)?;
        },
    }
    Ok(())
}

/// Re-run `scenario` with each low-energy voltage in `low_kvp` and tabulate
/// the results. Settings which fail are reported and skipped.
fn sweep(scenario: &Scenario, materials: &MaterialTable, low_kvp: &Range<f64>, step: f64) -> Result<(), Box<dyn Error>> {
    let settings = steps(low_kvp, step);
    if settings.is_empty() {
        return Err(format!("no low-energy settings in {low_kvp:?} kV with step {step} kV").into());
    }
    let progress = progress::Progress::new(settings.len())?;

    #[cfg    (feature = "serial") ] let iter = settings.    iter();
    #[cfg(not(feature = "serial"))] let iter = settings.par_iter();

    let results: Vec<_> = iter.map(|&kvp| {
        progress.start(kvp);
        let mut scenario = scenario.clone();
        scenario.low.kvp = Some(kv(kvp));
        let result = desim::run(&scenario, materials);
        progress.done();
        (kvp, result)
    }).collect();
    let n_failed = results.iter().filter(|(_, r)| r.is_err()).count();
    progress.final_report(n_failed);
    report::print_sweep(&results);
    Ok(())
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::{error::Error, ops::Range};
use clap::Parser;
use cli::{Cli, Command};
use desim::{
    Scenario,
    config::read_config_file,
    material::MaterialTable,
    utils::{steps, timing::Progress},
};
use units::kv;
#[cfg(not(feature = "serial"))]
use rayon::prelude::*;

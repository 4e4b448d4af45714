/// Command line interface for `desim` executable
#[derive(clap::Parser, Debug, Clone)]
#[clap(
    name = "desim",
    about = "Simulate dual-energy radiography and evaluate image-quality metrics",
)]
pub (super) struct Cli {

    #[cfg(not(feature = "serial"))]
    /// Maximum number of rayon threads
    #[clap(short = 'j', long, default_value = "4")]
    pub threads: usize,

    #[clap(subcommand)]
    pub (super) command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub (super) enum Command {

    /// Run a scenario and print its metric report
    Run {
        /// TOML scenario file
        scenario: PathBuf,
    },

    /// Re-run a scenario over a range of low-energy tube voltages
    Sweep {
        /// TOML scenario file
        scenario: PathBuf,

        /// Low-energy tube voltages to compare, in kV (end excluded)
        #[clap(long, value_parser = parse_range::<f64>, default_value = "50..81")]
        low_kvp: Range<f64>,

        /// Voltage increment between settings, in kV
        #[clap(long, default_value = "5")]
        step: f64,
    },
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::{ops::Range, path::PathBuf};
use desim::utils::parse_range;

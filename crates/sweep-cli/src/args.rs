use clap::{Parser, Subcommand};
use std::path::PathBuf;
use sweep_core::{DoctorType, SearchParams};

/// CLI arguments for postcode-sweep
#[derive(Debug, Parser)]
#[command(
    name = "postcode-sweep",
    version,
    about = "Enumerate registry search results by refining capped postal-code prefixes"
)]
pub struct CliArgs {
    /// Path to a TOML config file (default: platform config directory)
    #[arg(short = 'c', long = "config", global = true, env = "SWEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Search filters shared by the fetching commands.
#[derive(Debug, Clone, clap::Args)]
pub struct SearchArgs {
    /// Physician category: any, family-doctor or specialist
    #[arg(long = "doctor-type", default_value = "any")]
    pub doctor_type: DoctorType,

    /// Restrict results to a last name (ignored for doctor type "any")
    #[arg(long = "last-name")]
    pub last_name: Option<String>,
}

impl SearchArgs {
    pub fn params(&self) -> SearchParams {
        SearchParams::new(self.doctor_type, self.last_name.clone())
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Expand capped keys of the previous level into the next key set
    Permute {
        /// Level to generate (1, 2 or 3)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=3))]
        level: u8,

        /// Key file to expand (default: <criteria_dir>/FSA_LDU0.json for level 1,
        /// <results_dir>/summary.csv otherwise)
        #[arg(short = 'i', long = "input")]
        input: Option<PathBuf>,

        /// Directory for the generated key set (default: criteria_dir)
        #[arg(short = 'o', long = "output-dir")]
        output_dir: Option<PathBuf>,
    },

    /// Fetch every key of a key file once
    Scrape {
        /// Key file; its stem names the raw-store partition
        #[arg(short = 'i', long = "input-file")]
        input_file: PathBuf,

        /// Raw store root (default: data_dir)
        #[arg(short = 'o', long = "output-dir")]
        output_dir: Option<PathBuf>,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Run the full refinement loop from seed prefixes
    Refine {
        /// Seed file (FSAs, or a summary whose capped rows are refined)
        #[arg(short = 's', long = "seeds")]
        seeds: PathBuf,

        /// Deepest rank to refine to
        #[arg(long = "max-rank", default_value_t = 3,
              value_parser = clap::value_parser!(u8).range(1..=3))]
        max_rank: u8,

        /// Write the run report as JSON to this file
        #[arg(long = "report")]
        report: Option<PathBuf>,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Build summary.csv and details.csv from the raw store
    Aggregate {
        /// Raw store root (default: data_dir)
        #[arg(short = 'd', long = "data-dir")]
        data_dir: Option<PathBuf>,

        /// Output directory (default: results_dir)
        #[arg(short = 'o', long = "output-dir")]
        output_dir: Option<PathBuf>,
    },
}

//! Command-line surface of `liquid`: global flags, subcommands, and the
//! value types they parse into.
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use liquid_core::Mechanism;

/// Where an instance is read from: `-` means stdin, any other value is a
/// path.
#[derive(Clone, Debug)]
pub enum PathOrStdin {
    /// The `-` argument.
    Stdin,
    /// A path on disk.
    Path(PathBuf),
}

impl std::str::FromStr for PathOrStdin {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            Ok(PathOrStdin::Stdin)
        } else {
            Ok(PathOrStdin::Path(PathBuf::from(s)))
        }
    }
}

impl PathOrStdin {
    /// Label used in error messages: the path, or `-` for stdin.
    pub fn label(&self) -> String {
        match self {
            Self::Stdin => "-".to_owned(),
            Self::Path(path) => path.display().to_string(),
        }
    }
}

/// How `round` and `solve` print their result.
///
/// `Human` emits aligned key/value lines to stdout. `Json` emits a single
/// JSON object to stdout.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output (default).
    Human,
    /// Structured JSON output.
    Json,
}

/// Rounding mechanism selected on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MechanismArg {
    /// Greedy sink merging, `(1 + log2 n)`-approximation.
    LogTwo,
    /// Sink-component rebalancing, `(1 + ln n)`-approximation (default).
    Ln,
}

impl From<MechanismArg> for Mechanism {
    fn from(arg: MechanismArg) -> Self {
        match arg {
            MechanismArg::LogTwo => Mechanism::OnePlusLogTwo,
            MechanismArg::Ln => Mechanism::OnePlusLn,
        }
    }
}

/// All top-level subcommands exposed by the `liquid` binary.
#[derive(Subcommand)]
pub enum Command {
    /// Round a delegation instance to a confluent delegation.
    Round {
        /// Path to a JSON instance, or `-` for stdin.
        #[arg(value_name = "FILE")]
        file: PathOrStdin,
        /// Rounding mechanism: ln (default) or log-two.
        #[arg(long, short = 'm', default_value = "ln")]
        mechanism: MechanismArg,
        /// Round this precomputed fractional flow instead of solving for one.
        ///
        /// The file holds a JSON array parallel to the instance: `null` for
        /// voters, an object mapping successor id to flow for delegators.
        #[arg(long, value_name = "FLOW_FILE")]
        flow: Option<PathBuf>,
    },

    /// Compute the congestion-minimizing splittable flow of an instance.
    Solve {
        /// Path to a JSON instance, or `-` for stdin.
        #[arg(value_name = "FILE")]
        file: PathOrStdin,
    },

    /// Print the liquid-core library version.
    Version,
}

/// Parsed arguments of `liquid`. Every flag is global and may follow the
/// subcommand.
#[derive(Parser)]
#[command(
    name = "liquid",
    version,
    about = "Confluent delegation rounding for liquid democracy",
    long_about = "Computes confluent delegations for liquid democracy instances.\n\
                  Solves the splittable flow that minimizes the heaviest voter\n\
                  and rounds it with a provable approximation guarantee."
)]
pub struct Cli {
    /// Active subcommand.
    #[command(subcommand)]
    pub command: Command,

    /// `human` key/value lines or a single `json` document.
    #[arg(long, short = 'f', default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Only log errors to stderr (incompatible with `--verbose`).
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log engine steps to stderr (incompatible with `--quiet`).
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// JSON file with rounding configuration; absent fields keep defaults.
    #[arg(long, global = true, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Wall-clock limit in seconds for solving plus rounding.
    ///
    /// Overrides `time_limit` from `--config`.
    #[arg(long, global = true, value_name = "SECS")]
    pub time_limit: Option<f64>,

    /// Flow values at or below this count as zero.
    ///
    /// Overrides `epsilon` from `--config`.
    #[arg(long, global = true, value_name = "EPS")]
    pub epsilon: Option<f64>,

    /// Largest accepted instance, flow, or config input, in bytes (256 MB
    /// unless `LIQUID_MAX_FILE_SIZE` says otherwise).
    #[arg(
        long,
        global = true,
        env = "LIQUID_MAX_FILE_SIZE",
        default_value = "268435456"
    )]
    pub max_file_size: u64,
}

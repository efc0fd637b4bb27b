/// Command module for the `liquid` CLI.
///
/// Each submodule implements one subcommand. The `run` function in each
/// module takes the parsed arguments and returns `Ok(())` on success or
/// a [`crate::error::CliError`] on failure.
pub mod round;
pub mod solve;

use std::path::Path;

use liquid_core::RoundingConfig;

use crate::PathOrStdin;
use crate::error::CliError;
use crate::io;

/// Builds the rounding configuration: defaults, then the JSON file at
/// `config_file` if given, then the individual flag overrides.
///
/// # Errors
///
/// - Any read or parse error of the config file (exit code 2).
/// - [`CliError::InvalidConfig`] if the result holds a non-positive
///   epsilon, a negative time limit, or a non-finite value.
pub fn load_config(
    config_file: Option<&Path>,
    time_limit: Option<f64>,
    epsilon: Option<f64>,
    max_file_size: u64,
) -> Result<RoundingConfig, CliError> {
    let mut config = match config_file {
        Some(path) => io::read_json(&PathOrStdin::Path(path.to_path_buf()), max_file_size)?,
        None => RoundingConfig::default(),
    };
    if let Some(limit) = time_limit {
        config.time_limit = Some(limit);
    }
    if let Some(eps) = epsilon {
        config.epsilon = eps;
    }

    if !(config.epsilon.is_finite() && config.epsilon > 0.0) {
        return Err(CliError::InvalidConfig {
            detail: format!("epsilon must be positive, got {}", config.epsilon),
        });
    }
    if let Some(limit) = config
        .time_limit
        .filter(|limit| !(limit.is_finite() && *limit >= 0.0))
    {
        return Err(CliError::InvalidConfig {
            detail: format!("time limit must be a non-negative number of seconds, got {limit}"),
        });
    }
    if !(config.rebalance_tolerance.is_finite() && config.bisection_tolerance.is_finite()) {
        return Err(CliError::InvalidConfig {
            detail: "tolerances must be finite".to_owned(),
        });
    }
    Ok(config)
}

/// Maps a failed write to stdout.
pub(crate) fn stdout_error(e: &std::io::Error) -> CliError {
    CliError::IoError {
        source: "stdout".to_owned(),
        detail: e.to_string(),
    }
}

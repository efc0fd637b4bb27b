/// Errors of the `liquid` binary and the exit codes they end in.
///
/// [`CliError::exit_code`] sorts every variant into one of two classes:
///
/// - Exit code **2**: input failure. The input could not be read, parsed,
///   or describes an invalid instance. Nothing was solved.
/// - Exit code **1**: logical failure. The input was fine but solving or
///   rounding failed (solver failure, timeout, engine invariant).
use std::fmt;
use std::path::PathBuf;

use liquid_core::RoundingError;

// ---------------------------------------------------------------------------
// CliError
// ---------------------------------------------------------------------------

/// All error conditions that the `liquid` CLI can produce.
#[derive(Debug)]
pub enum CliError {
    // Exit code 2
    /// An instance, flow, or config path does not exist.
    FileNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// An input path exists but is not readable.
    PermissionDenied {
        /// The unreadable path.
        path: PathBuf,
    },

    /// The input exceeds the configured `--max-file-size` limit.
    FileTooLarge {
        /// `"-"` for stdin, or the filesystem path.
        source: String,
        /// Limit in bytes.
        limit: u64,
        /// Size of the file on disk; unknown for stdin.
        actual: Option<u64>,
    },

    /// Reading the instance from stdin failed.
    StdinReadError {
        /// Message of the failed read.
        detail: String,
    },

    /// Any other read or write failure.
    IoError {
        /// `"-"` for stdin, `"stdout"`, or the filesystem path.
        source: String,
        /// Message of the failed operation.
        detail: String,
    },

    /// The input is not the JSON document the command expects.
    ParseFailed {
        /// `"-"` for stdin, or the filesystem path.
        source: String,
        /// Parser message including line and column.
        detail: String,
    },

    /// The configuration file or flags hold an unusable value.
    InvalidConfig {
        /// What is wrong.
        detail: String,
    },

    /// The instance or the supplied flow was rejected by validation.
    InvalidInstance {
        /// The validation message.
        detail: String,
    },

    // Exit code 1
    /// Solving or rounding a valid instance failed.
    RoundingFailed {
        /// The library error message.
        detail: String,
    },

    /// The wall-clock limit expired before a result was available.
    TimedOut {
        /// The library error message.
        detail: String,
    },
}

impl CliError {
    /// `2` when nothing was solved because the input is unusable, `1` when
    /// a valid instance could not be rounded.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::FileTooLarge { .. }
            | Self::StdinReadError { .. }
            | Self::IoError { .. }
            | Self::ParseFailed { .. }
            | Self::InvalidConfig { .. }
            | Self::InvalidInstance { .. } => 2,

            Self::RoundingFailed { .. } | Self::TimedOut { .. } => 1,
        }
    }

    /// The one-line message `main` prints to stderr.
    pub fn message(&self) -> String {
        match self {
            Self::FileNotFound { path } => {
                format!("error: file not found: {}", path.display())
            }
            Self::PermissionDenied { path } => {
                format!("error: permission denied: {}", path.display())
            }
            Self::FileTooLarge {
                source,
                limit,
                actual: Some(actual),
            } => {
                format!("error: {source} has {actual} bytes, more than the {limit} byte limit")
            }
            Self::FileTooLarge {
                source,
                limit,
                actual: None,
            } => {
                format!("error: {source} is larger than the {limit} byte limit")
            }
            Self::StdinReadError { detail } => {
                format!("error: reading stdin: {detail}")
            }
            Self::IoError { source, detail } => {
                format!("error: {source}: {detail}")
            }
            Self::ParseFailed { source, detail } => {
                format!("error: cannot parse {source}: {detail}")
            }
            Self::InvalidConfig { detail } => format!("error: invalid configuration: {detail}"),
            Self::InvalidInstance { detail } => format!("error: invalid instance: {detail}"),
            Self::RoundingFailed { detail } => format!("error: rounding failed: {detail}"),
            Self::TimedOut { detail } => format!("error: {detail}"),
        }
    }
}

impl From<RoundingError> for CliError {
    fn from(err: RoundingError) -> Self {
        let detail = err.to_string();
        match err {
            RoundingError::InvalidInput(_) => Self::InvalidInstance { detail },
            RoundingError::TimedOut { .. } => Self::TimedOut { detail },
            RoundingError::SolverFailure { .. }
            | RoundingError::InternalInvariantViolation { .. } => Self::RoundingFailed { detail },
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for CliError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// File and stdin reading with size enforcement and JSON decoding.
///
/// All input I/O of the `liquid` binary happens here; `liquid-core` never
/// touches the filesystem.
///
/// A file's length is compared against the limit before it is opened, and
/// stdin is read through `Read::take`, so an oversized instance never gets
/// fully buffered. Every failure here exits with code 2.
use std::io::Read as _;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::PathOrStdin;
use crate::error::CliError;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Reads `source` and decodes it as JSON into `T`.
///
/// # Errors
///
/// Any error of [`read_input`], or [`CliError::ParseFailed`] with line and
/// column when the content is not a valid `T`.
pub fn read_json<T: DeserializeOwned>(source: &PathOrStdin, max_size: u64) -> Result<T, CliError> {
    let bytes = read_input(source, max_size)?;
    parse_json(&bytes, &source.label())
}

/// Reads the entire contents of `source`.
///
/// # Errors
///
/// Returns [`CliError`] (exit code 2) for a missing or unreadable file, an
/// input larger than `max_size`, or any other I/O error.
pub fn read_input(source: &PathOrStdin, max_size: u64) -> Result<Vec<u8>, CliError> {
    match source {
        PathOrStdin::Path(path) => read_file(path, max_size),
        PathOrStdin::Stdin => read_stdin(max_size),
    }
}

/// Decodes `bytes` as JSON, labelling errors with `source`.
pub fn parse_json<T: DeserializeOwned>(bytes: &[u8], source: &str) -> Result<T, CliError> {
    serde_json::from_slice(bytes).map_err(|e| CliError::ParseFailed {
        source: source.to_owned(),
        detail: format!("line {}, column {}: {e}", e.line(), e.column()),
    })
}

// ---------------------------------------------------------------------------
// Disk file reading
// ---------------------------------------------------------------------------

fn read_file(path: &Path, max_size: u64) -> Result<Vec<u8>, CliError> {
    let file_size = std::fs::metadata(path)
        .map_err(|e| io_error_to_cli(&e, path))?
        .len();
    if file_size > max_size {
        return Err(CliError::FileTooLarge {
            source: path.display().to_string(),
            limit: max_size,
            actual: Some(file_size),
        });
    }
    std::fs::read(path).map_err(|e| io_error_to_cli(&e, path))
}

/// Classifies a failed read of `path`.
fn io_error_to_cli(e: &std::io::Error, path: &Path) -> CliError {
    let kind = e.kind();
    if kind == std::io::ErrorKind::NotFound {
        CliError::FileNotFound {
            path: path.to_path_buf(),
        }
    } else if kind == std::io::ErrorKind::PermissionDenied {
        CliError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        CliError::IoError {
            source: path.display().to_string(),
            detail: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stdin reading
// ---------------------------------------------------------------------------

/// Reads stdin to the end, or to `max_size` bytes.
///
/// If the stream produces exactly `max_size` bytes one more byte is probed
/// to tell "at the limit" from "over the limit".
fn read_stdin(max_size: u64) -> Result<Vec<u8>, CliError> {
    let stdin = std::io::stdin();
    let mut handle = stdin.lock();
    let mut buf: Vec<u8> = Vec::new();

    handle
        .by_ref()
        .take(max_size)
        .read_to_end(&mut buf)
        .map_err(|e| CliError::StdinReadError {
            detail: e.to_string(),
        })?;

    if buf.len() as u64 == max_size {
        let mut probe = [0u8; 1];
        let extra = handle
            .read(&mut probe)
            .map_err(|e| CliError::StdinReadError {
                detail: e.to_string(),
            })?;
        if extra > 0 {
            return Err(CliError::FileTooLarge {
                source: "-".to_owned(),
                limit: max_size,
                actual: None,
            });
        }
    }

    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use std::io::Write as _;
    use std::path::PathBuf;

    use liquid_core::DelegationGraph;

    use super::*;

    fn temp_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content).expect("write");
        file
    }

    #[test]
    fn reads_instance_from_disk() {
        let file = temp_file(b"[null, null, [0, 1]]");
        let source = PathOrStdin::Path(file.path().to_path_buf());
        let graph: DelegationGraph = read_json(&source, 1024).expect("reads");
        assert_eq!(graph.node_count(), 3);
        assert!(graph.is_voter(1));
    }

    #[test]
    fn missing_file_is_reported() {
        let source = PathOrStdin::Path(PathBuf::from("/definitely/not/here.json"));
        let err = read_input(&source, 1024).expect_err("missing");
        assert!(matches!(err, CliError::FileNotFound { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn oversized_file_is_rejected_before_reading() {
        let file = temp_file(b"[null, null, null, null]");
        let source = PathOrStdin::Path(file.path().to_path_buf());
        let err = read_input(&source, 4).expect_err("too large");
        let CliError::FileTooLarge { limit, actual, .. } = err else {
            panic!("expected FileTooLarge");
        };
        assert_eq!(limit, 4);
        assert_eq!(actual, Some(24));
    }

    #[test]
    fn malformed_json_reports_position() {
        let err = parse_json::<DelegationGraph>(b"[null,\n [0,", "instance.json")
            .expect_err("truncated");
        let CliError::ParseFailed { source, detail } = err else {
            panic!("expected ParseFailed");
        };
        assert_eq!(source, "instance.json");
        assert!(detail.contains("line 2"), "detail: {detail}");
    }
}

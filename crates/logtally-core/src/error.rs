//! Error types for the tally pipeline.
//!
//! [`TallyError`] carries the file and line context of every failure.
//! [`ErrorKind`] is the stable, machine-readable classification used in
//! failure reports and CLI diagnostics.

use std::fmt;
use std::io;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Machine-readable error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedLine,
    MalformedIdFragment,
    UnreadableFile,
    UnreadableDirectory,
    WorkerFailed,
}

impl ErrorKind {
    /// All error kinds, in code order.
    pub const ALL: [Self; 5] = [
        Self::MalformedLine,
        Self::MalformedIdFragment,
        Self::UnreadableFile,
        Self::UnreadableDirectory,
        Self::WorkerFailed,
    ];

    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MalformedLine => "E1001",
            Self::MalformedIdFragment => "E1002",
            Self::UnreadableFile => "E2001",
            Self::UnreadableDirectory => "E2002",
            Self::WorkerFailed => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MalformedLine => "Malformed log line",
            Self::MalformedIdFragment => "Malformed id= fragment in query string",
            Self::UnreadableFile => "Log file could not be read",
            Self::UnreadableDirectory => "Log directory could not be listed",
            Self::WorkerFailed => "Worker thread failed",
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::MalformedLine | Self::MalformedIdFragment => {
                Some("Fix or remove the offending line, or rerun with --keep-going.")
            }
            Self::UnreadableFile => Some("Check file permissions, or rerun with --keep-going."),
            Self::UnreadableDirectory => Some("Check that the directory exists and is readable."),
            Self::WorkerFailed => Some("Retry once. If persistent, report a bug with logs."),
        }
    }

    /// Whether [`ErrorPolicy::Isolate`](crate::config::ErrorPolicy::Isolate)
    /// may skip past an error of this kind.
    #[must_use]
    pub const fn is_isolatable(self) -> bool {
        matches!(
            self,
            Self::MalformedLine | Self::MalformedIdFragment | Self::UnreadableFile
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors raised while scanning, streaming, validating or distributing.
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    /// The line is not a JSON object with the four required fields.
    #[error("{}:{line}: malformed line: {source}", path.display())]
    MalformedLine {
        path: PathBuf,
        line: u64,
        source: serde_json::Error,
    },

    /// An `id=` query chunk whose suffix is not a base-10 integer.
    #[error("{}:{line}: malformed id fragment 'id={fragment}': {source}", path.display())]
    MalformedIdFragment {
        path: PathBuf,
        line: u64,
        fragment: String,
        source: ParseIntError,
    },

    /// The file could not be opened or read.
    #[error("cannot read {}: {source}", path.display())]
    UnreadableFile { path: PathBuf, source: io::Error },

    /// The source directory could not be listed.
    #[error("cannot list {}: {source}", path.display())]
    UnreadableDirectory { path: PathBuf, source: io::Error },

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] io::Error),

    /// A worker thread panicked.
    #[error("worker thread '{name}' panicked")]
    WorkerPanicked { name: String },
}

impl TallyError {
    /// The machine-readable class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedLine { .. } => ErrorKind::MalformedLine,
            Self::MalformedIdFragment { .. } => ErrorKind::MalformedIdFragment,
            Self::UnreadableFile { .. } => ErrorKind::UnreadableFile,
            Self::UnreadableDirectory { .. } => ErrorKind::UnreadableDirectory,
            Self::WorkerSpawn(_) | Self::WorkerPanicked { .. } => ErrorKind::WorkerFailed,
        }
    }

    /// The file or directory the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::MalformedLine { path, .. }
            | Self::MalformedIdFragment { path, .. }
            | Self::UnreadableFile { path, .. }
            | Self::UnreadableDirectory { path, .. } => Some(path),
            Self::WorkerSpawn(_) | Self::WorkerPanicked { .. } => None,
        }
    }

    /// The 1-based line number the error refers to, if any.
    #[must_use]
    pub const fn line(&self) -> Option<u64> {
        match self {
            Self::MalformedLine { line, .. } | Self::MalformedIdFragment { line, .. } => {
                Some(*line)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for kind in ErrorKind::ALL {
            assert!(seen.insert(kind.code()), "duplicate code {}", kind.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for kind in ErrorKind::ALL {
            let code = kind.code();
            assert_eq!(code.len(), 5);
            assert!(code.starts_with('E'));
            assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn only_line_and_file_errors_are_isolatable() {
        assert!(ErrorKind::MalformedLine.is_isolatable());
        assert!(ErrorKind::MalformedIdFragment.is_isolatable());
        assert!(ErrorKind::UnreadableFile.is_isolatable());
        assert!(!ErrorKind::UnreadableDirectory.is_isolatable());
        assert!(!ErrorKind::WorkerFailed.is_isolatable());
    }

    #[test]
    fn display_includes_path_and_line() {
        let source = "x".parse::<i64>().expect_err("not a number");
        let err = TallyError::MalformedIdFragment {
            path: PathBuf::from("logs/a.log"),
            line: 17,
            fragment: "x".into(),
            source,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("logs/a.log:17:"), "{msg}");
        assert!(msg.contains("id=x"), "{msg}");
        assert_eq!(err.kind(), ErrorKind::MalformedIdFragment);
        assert_eq!(err.line(), Some(17));
        assert_eq!(err.path(), Some(Path::new("logs/a.log")));
    }

    #[test]
    fn unreadable_file_has_no_line() {
        let err = TallyError::UnreadableFile {
            path: PathBuf::from("missing.log"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.kind(), ErrorKind::UnreadableFile);
        assert_eq!(err.line(), None);
        assert!(err.to_string().contains("missing.log"));
    }
}

//! Run-level bookkeeping that travels alongside the aggregation table:
//! counters, isolated failures, and the final [`RunSummary`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::aggregate::AggregationTable;
use crate::error::{ErrorKind, TallyError};

/// Counters for one file, one worker, or a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Files fully consumed.
    pub files: u64,
    /// Lines decoded, validated and counted.
    pub lines: u64,
    /// Lines skipped because they were malformed (isolating policy only).
    pub skipped_lines: u64,
    /// Files skipped because they could not be read (isolating policy only).
    pub failed_files: u64,
}

/// One isolated failure, kept verbatim for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSample {
    pub kind: ErrorKind,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    pub message: String,
}

impl From<&TallyError> for FailureSample {
    fn from(err: &TallyError) -> Self {
        let kind = err.kind();
        Self {
            kind,
            code: kind.code(),
            path: err.path().map(PathBuf::from),
            line: err.line(),
            message: err.to_string(),
        }
    }
}

/// Failures skipped under the isolating policy.
///
/// Counts are exact; at most `limit` failures are kept verbatim. Which
/// samples survive a merge depends on fold order, the counts do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub total: u64,
    pub by_kind: BTreeMap<ErrorKind, u64>,
    pub samples: Vec<FailureSample>,
    #[serde(skip)]
    limit: usize,
}

impl FailureReport {
    /// An empty report that keeps at most `limit` samples.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            total: 0,
            by_kind: BTreeMap::new(),
            samples: Vec::new(),
            limit,
        }
    }

    /// Record one failure.
    pub fn record(&mut self, err: &TallyError) {
        self.total += 1;
        *self.by_kind.entry(err.kind()).or_insert(0) += 1;
        if self.samples.len() < self.limit {
            self.samples.push(FailureSample::from(err));
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Maximum number of samples kept.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn absorb(&mut self, other: Self) {
        self.total += other.total;
        for (kind, count) in other.by_kind {
            *self.by_kind.entry(kind).or_insert(0) += count;
        }
        let room = self.limit.saturating_sub(self.samples.len());
        self.samples.extend(other.samples.into_iter().take(room));
    }
}

/// Everything a completed run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub table: AggregationTable,
    pub stats: RunStats,
    pub failures: FailureReport,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn unreadable(name: &str) -> TallyError {
        TallyError::UnreadableFile {
            path: PathBuf::from(name),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        }
    }

    #[test]
    fn record_counts_beyond_limit() {
        let mut report = FailureReport::new(2);
        for i in 0..5 {
            report.record(&unreadable(&format!("{i}.log")));
        }
        assert_eq!(report.total, 5);
        assert_eq!(report.samples.len(), 2);
        assert_eq!(report.by_kind.get(&ErrorKind::UnreadableFile), Some(&5));
        assert_eq!(report.samples[0].path, Some(PathBuf::from("0.log")));
        assert_eq!(report.samples[0].code, "E2001");
    }

    #[test]
    fn zero_limit_keeps_counts_only() {
        let mut report = FailureReport::new(0);
        report.record(&unreadable("a.log"));
        assert!(!report.is_empty());
        assert!(report.samples.is_empty());
    }

    #[test]
    fn absorb_respects_receiver_limit() {
        let mut left = FailureReport::new(3);
        left.record(&unreadable("a.log"));
        let mut right = FailureReport::new(3);
        for name in ["b.log", "c.log", "d.log"] {
            right.record(&unreadable(name));
        }
        left.absorb(right);
        assert_eq!(left.total, 4);
        assert_eq!(left.samples.len(), 3);
        assert_eq!(left.by_kind.get(&ErrorKind::UnreadableFile), Some(&4));
    }

    #[test]
    fn report_serializes_kind_keys() {
        let mut report = FailureReport::new(1);
        report.record(&unreadable("a.log"));
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["total"], 1);
        assert_eq!(json["by_kind"]["unreadable_file"], 1);
        assert_eq!(json["samples"][0]["path"], "a.log");
        assert!(json["samples"][0].get("line").is_none());
        assert!(json.get("limit").is_none());
    }
}

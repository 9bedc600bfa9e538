//! Count tables and the per-file aggregation pass.
//!
//! # Table shape
//!
//! ```text
//! validity -> day start (UTC seconds) -> kind -> count
//! ```
//!
//! Every day entry carries `create`, `update` and `delete` counters, zero
//! when unobserved. Records with an unrecognised `event_type` are always
//! non-valid and are counted under their literal kind string next to the
//! three fixed counters.
//!
//! Tables are plain owned values. A worker builds one [`PartialTable`] per
//! file with [`tally_stream`] and hands it to the
//! [`Reducer`](crate::reduce::Reducer) by value.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ErrorPolicy;
use crate::error::TallyError;
use crate::record::{DayBucket, EventKind, RequestKind, Validity};
use crate::stream::LineStream;
use crate::summary::{FailureReport, RunStats};
use crate::validate::validate;

/// Per-kind counters for one (validity, day) cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    #[serde(default)]
    pub create: u64,
    #[serde(default)]
    pub update: u64,
    #[serde(default)]
    pub delete: u64,
    /// Counters for unrecognised kinds, keyed by their literal string.
    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, u64>,
}

impl KindCounts {
    /// Count for one kind (zero if never seen).
    #[must_use]
    pub fn get(&self, kind: &EventKind) -> u64 {
        match kind {
            EventKind::Known(known) => self.known(*known),
            EventKind::Unrecognized(raw) => self.unrecognized.get(raw).copied().unwrap_or(0),
        }
    }

    #[must_use]
    pub const fn known(&self, kind: RequestKind) -> u64 {
        match kind {
            RequestKind::Create => self.create,
            RequestKind::Update => self.update,
            RequestKind::Delete => self.delete,
        }
    }

    /// Add `n` to one kind's counter.
    pub fn add(&mut self, kind: &EventKind, n: u64) {
        match kind {
            EventKind::Known(RequestKind::Create) => self.create += n,
            EventKind::Known(RequestKind::Update) => self.update += n,
            EventKind::Known(RequestKind::Delete) => self.delete += n,
            EventKind::Unrecognized(raw) => {
                if let Some(count) = self.unrecognized.get_mut(raw.as_str()) {
                    *count += n;
                } else {
                    self.unrecognized.insert(raw.clone(), n);
                }
            }
        }
    }

    /// Sum over every kind, recognised or not.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.create + self.update + self.delete + self.unrecognized.values().sum::<u64>()
    }

    /// All `(kind, count)` pairs: the three fixed kinds first, then
    /// unrecognised kinds in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        RequestKind::ALL
            .into_iter()
            .map(|kind| (kind.as_str(), self.known(kind)))
            .chain(self.unrecognized.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

/// Nested count table: validity, then day, then kind.
///
/// Serializes to `{"valid": {<day>: {...}}, "non_valid": {...}}` with days
/// in ascending order. Both validity keys are always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationTable {
    #[serde(default)]
    valid: BTreeMap<DayBucket, KindCounts>,
    #[serde(default)]
    non_valid: BTreeMap<DayBucket, KindCounts>,
}

/// A table built from one file (or one worker) before reduction.
pub type PartialTable = AggregationTable;

impl AggregationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for one classified record.
    ///
    /// The day entry is created with all three fixed kinds at zero on first
    /// touch.
    pub fn accumulate(&mut self, validity: Validity, day: DayBucket, kind: &EventKind) {
        self.group_mut(validity)
            .entry(day)
            .or_default()
            .add(kind, 1);
    }

    /// Days observed for one validity group, in ascending order.
    #[must_use]
    pub const fn group(&self, validity: Validity) -> &BTreeMap<DayBucket, KindCounts> {
        match validity {
            Validity::Valid => &self.valid,
            Validity::NonValid => &self.non_valid,
        }
    }

    pub(crate) const fn group_mut(
        &mut self,
        validity: Validity,
    ) -> &mut BTreeMap<DayBucket, KindCounts> {
        match validity {
            Validity::Valid => &mut self.valid,
            Validity::NonValid => &mut self.non_valid,
        }
    }

    /// Count for one `(validity, day, kind)` key (zero if absent).
    #[must_use]
    pub fn get(&self, validity: Validity, day: DayBucket, kind: &EventKind) -> u64 {
        self.group(validity).get(&day).map_or(0, |counts| counts.get(kind))
    }

    /// Sum of all counters in the table.
    #[must_use]
    pub fn total(&self) -> u64 {
        Validity::ALL
            .into_iter()
            .flat_map(|validity| self.group(validity).values())
            .map(KindCounts::total)
            .sum()
    }

    /// Sum of all counters in one validity group.
    #[must_use]
    pub fn group_total(&self, validity: Validity) -> u64 {
        self.group(validity).values().map(KindCounts::total).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty() && self.non_valid.is_empty()
    }

    /// Every `(validity, day, counts)` cell, valid group first.
    pub fn iter(&self) -> impl Iterator<Item = (Validity, DayBucket, &KindCounts)> {
        Validity::ALL.into_iter().flat_map(move |validity| {
            self.group(validity)
                .iter()
                .map(move |(day, counts)| (validity, *day, counts))
        })
    }
}

/// Result of aggregating one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTally {
    pub table: PartialTable,
    pub stats: RunStats,
    pub failures: FailureReport,
}

/// Stream, validate and count every record of one file.
///
/// Under [`ErrorPolicy::Isolate`] malformed lines are recorded in the
/// returned failure report and skipped. Checking `cancel` between lines lets
/// a fail-fast run stop promptly once another worker has failed; a cancelled
/// tally returns whatever it counted so far.
///
/// # Errors
///
/// Under [`ErrorPolicy::FailFast`], returns the first malformed line, bad
/// `id=` fragment or read error. Under [`ErrorPolicy::Isolate`], returns
/// only a read error that ends the file early.
pub fn tally_stream<R: BufRead>(
    stream: &mut LineStream<R>,
    policy: ErrorPolicy,
    failure_samples: usize,
    cancel: &AtomicBool,
) -> Result<FileTally, TallyError> {
    let mut table = PartialTable::new();
    let mut stats = RunStats::default();
    let mut failures = FailureReport::new(failure_samples);

    while let Some(item) = stream.next() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        let outcome = item.and_then(|record| {
            validate(&record)
                .map(|validity| (validity, record))
                .map_err(|err| TallyError::MalformedIdFragment {
                    path: stream.path().to_path_buf(),
                    line: stream.line(),
                    fragment: err.fragment,
                    source: err.source,
                })
        });

        match outcome {
            Ok((validity, record)) => {
                table.accumulate(validity, record.day(), &record.kind());
                stats.lines += 1;
            }
            Err(err @ TallyError::UnreadableFile { .. }) => return Err(err),
            Err(err) if policy == ErrorPolicy::Isolate => {
                warn!(code = %err.kind(), "skipping line: {err}");
                failures.record(&err);
                stats.skipped_lines += 1;
            }
            Err(err) => return Err(err),
        }
    }

    stats.files = 1;
    debug!(
        path = %stream.path().display(),
        lines = stats.lines,
        skipped = stats.skipped_lines,
        "tallied file"
    );
    Ok(FileTally {
        table,
        stats,
        failures,
    })
}

/// Open and tally one file with the fail-fast policy.
///
/// # Errors
///
/// Returns the first [`TallyError`] met while opening, reading, decoding or
/// validating the file.
pub fn tally_file(path: &Path) -> Result<PartialTable, TallyError> {
    let mut stream = LineStream::open(path)?;
    tally_stream(&mut stream, ErrorPolicy::FailFast, 0, &AtomicBool::new(false))
        .map(|tally| tally.table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Cursor;

    const DAY: u64 = 1_525_305_600;

    fn known(kind: RequestKind) -> EventKind {
        EventKind::Known(kind)
    }

    fn run(input: &str, policy: ErrorPolicy) -> Result<FileTally, TallyError> {
        let mut stream = LineStream::from_reader("t.log", Cursor::new(input.as_bytes().to_vec()));
        tally_stream(&mut stream, policy, 10, &AtomicBool::new(false))
    }

    fn line(ts: u64, kind: &str, ids: &str, qs: &str) -> String {
        format!(
            r#"{{"timestamp":{ts},"event_type":"{kind}","ids":[{ids}],"query_string":"{qs}"}}"#
        )
    }

    #[test]
    fn first_touch_creates_zeroed_triple() {
        let mut table = AggregationTable::new();
        let day = DayBucket::from_timestamp(DAY + 10);
        table.accumulate(Validity::Valid, day, &known(RequestKind::Update));

        let counts = &table.group(Validity::Valid)[&day];
        assert_eq!(counts.create, 0);
        assert_eq!(counts.update, 1);
        assert_eq!(counts.delete, 0);
        assert!(table.group(Validity::NonValid).is_empty());
    }

    #[test]
    fn unrecognized_kind_gets_its_own_slot() {
        let mut table = AggregationTable::new();
        let day = DayBucket::from_timestamp(DAY);
        let cancel = EventKind::from("cancel");
        table.accumulate(Validity::NonValid, day, &cancel);
        table.accumulate(Validity::NonValid, day, &cancel);

        assert_eq!(table.get(Validity::NonValid, day, &cancel), 2);
        assert_eq!(table.get(Validity::NonValid, day, &known(RequestKind::Create)), 0);
        assert_eq!(table.total(), 2);
    }

    #[test]
    fn serializes_to_nested_report_shape() {
        let mut table = AggregationTable::new();
        let day = DayBucket::from_timestamp(DAY);
        table.accumulate(Validity::Valid, day, &known(RequestKind::Create));
        table.accumulate(Validity::NonValid, day, &EventKind::from("cancel"));

        let json = serde_json::to_value(&table).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "valid": {"1525305600": {"create": 1, "update": 0, "delete": 0}},
                "non_valid": {"1525305600": {"create": 0, "update": 0, "delete": 0, "cancel": 1}}
            })
        );
    }

    #[test]
    fn empty_table_keeps_both_groups() {
        let json = serde_json::to_string(&AggregationTable::new()).expect("serialize");
        assert_eq!(json, r#"{"valid":{},"non_valid":{}}"#);
    }

    #[test]
    fn table_json_roundtrips() {
        let mut table = AggregationTable::new();
        table.accumulate(
            Validity::Valid,
            DayBucket::from_timestamp(DAY),
            &known(RequestKind::Delete),
        );
        table.accumulate(
            Validity::NonValid,
            DayBucket::from_timestamp(DAY + 86_400),
            &EventKind::from("purge"),
        );
        let json = serde_json::to_string(&table).expect("serialize");
        let back: AggregationTable = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, table);
    }

    #[test]
    fn kind_counts_iter_orders_fixed_kinds_first() {
        let mut counts = KindCounts::default();
        counts.add(&EventKind::from("zap"), 2);
        counts.add(&EventKind::from("alpha"), 1);
        counts.add(&known(RequestKind::Delete), 4);
        let pairs: Vec<_> = counts.iter().collect();
        assert_eq!(
            pairs,
            vec![("create", 0), ("update", 0), ("delete", 4), ("alpha", 1), ("zap", 2)]
        );
        assert_eq!(counts.total(), 7);
    }

    #[test]
    fn tally_counts_every_line() {
        let input = [
            line(DAY + 1, "delete", "7,3,9", "btksf=btksf&id=3&id=7&id=9"),
            line(DAY + 500, "delete", "1", "id=1"),
            line(DAY + 2, "create", "7,6", "id=19&id=15"),
            line(DAY + 86_400, "cancel", "1", "id=1"),
        ]
        .join("\n");

        let tally = run(&input, ErrorPolicy::FailFast).expect("tally");
        let day = DayBucket::from_timestamp(DAY);
        let next = DayBucket::from_timestamp(DAY + 86_400);
        let t = &tally.table;
        assert_eq!(t.get(Validity::Valid, day, &known(RequestKind::Delete)), 2);
        assert_eq!(t.get(Validity::NonValid, day, &known(RequestKind::Create)), 1);
        assert_eq!(t.get(Validity::NonValid, next, &EventKind::from("cancel")), 1);
        assert_eq!(t.total(), 4);
        assert_eq!(tally.stats.lines, 4);
        assert_eq!(tally.stats.files, 1);
        assert!(tally.failures.is_empty());
    }

    #[test]
    fn fail_fast_stops_on_malformed_line() {
        let input = format!("{}\n{{oops\n", line(DAY, "create", "", ""));
        let err = run(&input, ErrorPolicy::FailFast).expect_err("malformed");
        assert_eq!(err.kind(), ErrorKind::MalformedLine);
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn fail_fast_reports_id_fragment_with_line() {
        let input = format!(
            "{}\n{}\n",
            line(DAY, "create", "", ""),
            line(DAY, "update", "1", "id=1&id=x1")
        );
        let err = run(&input, ErrorPolicy::FailFast).expect_err("bad fragment");
        match err {
            TallyError::MalformedIdFragment { line, fragment, .. } => {
                assert_eq!(line, 2);
                assert_eq!(fragment, "x1");
            }
            other => panic!("expected MalformedIdFragment, got {other:?}"),
        }
    }

    #[test]
    fn isolate_skips_bad_lines_and_keeps_counting() {
        let input = [
            line(DAY, "create", "", ""),
            "not json".to_string(),
            line(DAY, "update", "1", "id=oops"),
            line(DAY, "create", "", ""),
        ]
        .join("\n");

        let tally = run(&input, ErrorPolicy::Isolate).expect("tally");
        assert_eq!(tally.stats.lines, 2);
        assert_eq!(tally.stats.skipped_lines, 2);
        assert_eq!(tally.failures.total, 2);
        assert_eq!(tally.failures.by_kind.get(&ErrorKind::MalformedLine), Some(&1));
        assert_eq!(
            tally.failures.by_kind.get(&ErrorKind::MalformedIdFragment),
            Some(&1)
        );
        assert_eq!(tally.table.total(), 2);
    }

    #[test]
    fn cancelled_tally_stops_early() {
        let input = [line(DAY, "create", "", ""), line(DAY, "create", "", "")].join("\n");
        let mut stream = LineStream::from_reader("t.log", Cursor::new(input.into_bytes()));
        let tally = tally_stream(&mut stream, ErrorPolicy::FailFast, 0, &AtomicBool::new(true))
            .expect("tally");
        assert_eq!(tally.stats.lines, 0);
        assert!(tally.table.is_empty());
    }

    #[test]
    fn tally_file_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.log");
        std::fs::write(&path, line(DAY, "delete", "1,2", "id=2&id=1")).expect("write");
        let table = tally_file(&path).expect("tally");
        assert_eq!(
            table.get(
                Validity::Valid,
                DayBucket::from_timestamp(DAY),
                &known(RequestKind::Delete)
            ),
            1
        );
    }
}

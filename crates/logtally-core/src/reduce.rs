//! Associative, commutative merge of partial results.
//!
//! Merging is plain counter addition at every level, so the final table does
//! not depend on fold order, on how files were grouped into partial tables,
//! or on how many workers produced them.

use std::collections::btree_map::Entry;

use crate::aggregate::{AggregationTable, KindCounts, PartialTable};
use crate::record::Validity;
use crate::summary::{FailureReport, RunStats};

pub trait Merge {
    fn merge(&mut self, other: Self);
}

impl Merge for KindCounts {
    fn merge(&mut self, other: Self) {
        self.create += other.create;
        self.update += other.update;
        self.delete += other.delete;
        for (kind, count) in other.unrecognized {
            *self.unrecognized.entry(kind).or_insert(0) += count;
        }
    }
}

impl Merge for AggregationTable {
    fn merge(&mut self, mut other: Self) {
        for validity in Validity::ALL {
            let theirs = std::mem::take(other.group_mut(validity));
            let ours = self.group_mut(validity);
            for (day, counts) in theirs {
                match ours.entry(day) {
                    Entry::Vacant(slot) => {
                        slot.insert(counts);
                    }
                    Entry::Occupied(mut slot) => slot.get_mut().merge(counts),
                }
            }
        }
    }
}

impl Merge for RunStats {
    fn merge(&mut self, other: Self) {
        self.files += other.files;
        self.lines += other.lines;
        self.skipped_lines += other.skipped_lines;
        self.failed_files += other.failed_files;
    }
}

impl Merge for FailureReport {
    fn merge(&mut self, other: Self) {
        self.absorb(other);
    }
}

/// Incremental fold of partial tables into one global table.
#[derive(Debug, Default)]
pub struct Reducer {
    table: AggregationTable,
    folded: usize,
}

impl Reducer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one partial table in. The partial is consumed.
    pub fn fold(&mut self, partial: PartialTable) {
        self.table.merge(partial);
        self.folded += 1;
    }

    /// Number of partial tables folded so far.
    #[must_use]
    pub const fn folded(&self) -> usize {
        self.folded
    }

    #[must_use]
    pub fn finish(self) -> AggregationTable {
        self.table
    }
}

/// Merge any number of partial tables into one.
#[must_use]
pub fn reduce<I>(tables: I) -> AggregationTable
where
    I: IntoIterator<Item = PartialTable>,
{
    let mut reducer = Reducer::new();
    for table in tables {
        reducer.fold(table);
    }
    reducer.finish()
}

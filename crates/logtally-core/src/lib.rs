//! logtally-core library.
//!
//! Counts valid and non-valid requests per UTC day and request kind over a
//! directory of NDJSON log files, streaming every file line by line and
//! reducing per-file partial tables into one result.
//!
//! ```text
//! scan_dir ─► Distributor ─► LineStream ─► validate ─► AggregationTable::accumulate
//!                                                              │
//!                                               Reducer::fold ◄┘
//! ```
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`TallyError`]; configuration
//!   loading uses `anyhow::Result`.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod aggregate;
pub mod config;
pub mod distribute;
pub mod error;
pub mod record;
pub mod reduce;
pub mod scan;
pub mod stream;
pub mod summary;
pub mod validate;

use std::path::Path;

use tracing::debug;

pub use aggregate::{AggregationTable, KindCounts, PartialTable};
pub use config::{ErrorPolicy, TallyConfig};
pub use distribute::Distributor;
pub use error::{ErrorKind, TallyError};
pub use record::{DayBucket, EventKind, Record, RequestKind, Validity};
pub use summary::{FailureReport, RunStats, RunSummary};

/// Tally every eligible file in `dir` with the given configuration.
///
/// # Errors
///
/// See [`Distributor::run`].
pub fn tally_dir(dir: impl AsRef<Path>, config: &TallyConfig) -> Result<RunSummary, TallyError> {
    let files = scan::scan_dir(dir)?;
    debug!(dir = %files.dir().display(), "scanning log directory");
    Distributor::new(config).run(files)
}

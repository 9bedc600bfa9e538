//! Report rendering for pretty, text, and JSON output.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `LOGTALLY_FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use chrono::DateTime;
use clap::ValueEnum;
use logtally_core::{AggregationTable, FailureReport, KindCounts, RunSummary, TallyError, Validity};
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, ISO dates, totals).
    Pretty,
    /// One `validity day kind count` row per counter, for pipes.
    Text,
    /// The aggregation table as JSON.
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    #[cfg(test)]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }

    if json_flag {
        return OutputMode::Json;
    }

    if let Some(val) = format_env {
        match val.to_lowercase().as_str() {
            "json" => return OutputMode::Json,
            "text" => return OutputMode::Text,
            "pretty" => return OutputMode::Pretty,
            _ => {} // unknown value, fall through to TTY detection
        }
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, and TTY defaults.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_val = std::env::var("LOGTALLY_FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(format_flag, json_flag, env_val.as_deref(), is_tty)
}

// ────────────────────────────────────────────────────────────────────────────
// Reports
// ────────────────────────────────────────────────────────────────────────────

/// JSON document for a completed run: the table at the top level, plus a
/// `failures` key only when something was skipped.
#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    table: &'a AggregationTable,
    #[serde(skip_serializing_if = "no_failures")]
    failures: &'a FailureReport,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_failures(failures: &&FailureReport) -> bool {
    failures.is_empty()
}

pub fn write_json(w: &mut dyn Write, summary: &RunSummary) -> anyhow::Result<()> {
    let report = JsonReport {
        table: &summary.table,
        failures: &summary.failures,
    };
    serde_json::to_writer_pretty(&mut *w, &report)?;
    writeln!(w)?;
    Ok(())
}

pub fn write_text(w: &mut dyn Write, table: &AggregationTable) -> io::Result<()> {
    for (validity, day, counts) in table.iter() {
        for (kind, count) in counts.iter() {
            writeln!(w, "{validity} {day} {kind} {count}")?;
        }
    }
    Ok(())
}

/// ISO date for a day bucket, or the raw seconds when out of chrono's range.
fn iso_date(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map_or_else(|| secs.to_string(), |dt| dt.format("%Y-%m-%d").to_string())
}

fn pretty_counts(counts: &KindCounts) -> String {
    counts
        .iter()
        .map(|(kind, count)| format!("{kind} {count:>6}"))
        .collect::<Vec<_>>()
        .join("   ")
}

pub fn write_pretty(w: &mut dyn Write, summary: &RunSummary) -> io::Result<()> {
    let table = &summary.table;
    for validity in Validity::ALL {
        pretty_section(w, validity.as_str())?;
        let group = table.group(validity);
        if group.is_empty() {
            writeln!(w, "  (none)")?;
        }
        for (day, counts) in group {
            writeln!(w, "  {}   {}", iso_date(day.as_secs()), pretty_counts(counts))?;
        }
        writeln!(w)?;
    }

    pretty_section(w, "totals")?;
    pretty_kv(w, "valid", table.group_total(Validity::Valid).to_string())?;
    pretty_kv(w, "non_valid", table.group_total(Validity::NonValid).to_string())?;
    pretty_kv(w, "files", summary.stats.files.to_string())?;
    pretty_kv(w, "lines", summary.stats.lines.to_string())?;
    if !summary.failures.is_empty() {
        pretty_kv(w, "skipped lines", summary.stats.skipped_lines.to_string())?;
        pretty_kv(w, "failed files", summary.stats.failed_files.to_string())?;
    }
    pretty_kv(w, "elapsed", format!("{:.3}s", summary.elapsed.as_secs_f64()))?;
    Ok(())
}

/// Render a run summary to stdout in the requested format.
pub fn render_summary(mode: OutputMode, summary: &RunSummary) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => write_json(&mut out, summary)?,
        OutputMode::Text => write_text(&mut out, &summary.table)?,
        OutputMode::Pretty => write_pretty(&mut out, summary)?,
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for how to fix the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E1001").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Create a simple error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }
}

impl From<&TallyError> for CliError {
    fn from(err: &TallyError) -> Self {
        let kind = err.kind();
        Self {
            message: err.to_string(),
            suggestion: kind.hint().map(str::to_string),
            error_code: Some(kind.code().to_string()),
        }
    }
}

pub fn write_error(w: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut *w, &wrapper)?;
            writeln!(w)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match error.error_code {
                Some(ref code) => writeln!(w, "error[{code}]: {}", error.message)?,
                None => writeln!(w, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(w, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(&mut out, mode, error)
}

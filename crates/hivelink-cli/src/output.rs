//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats. Progress lines
//! from a run are written separately by [`LineProgress`].

use std::io::Write;

use hivelink_broker::{CheckId, CheckOutcome, OperatorStatus, Progress, RunReport};
use hivelink_config::ValueSource;
use serde::Serialize;
use tracing::warn;

use crate::cli::Format;
use crate::error::CliError;

const DIVIDER: &str = "---------------------------------------------------------------";

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as human-readable text.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

impl TableDisplay for RunReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Hive Login Summary")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Cluster:      {}", self.cluster)?;
        writeln!(writer, "Hive:         {}", self.hive)?;
        writeln!(writer, "Hive source:  {}", self.hive_source)?;
        if let Some(source) = self.hive_url_source {
            writeln!(writer, "Hive URL via: {source}")?;
        }
        writeln!(writer)?;
        for outcome in &self.checks {
            match outcome {
                CheckOutcome::Passed { check, .. } => writeln!(writer, "  PASS  {check}")?,
                CheckOutcome::Skipped { check, reason } => {
                    writeln!(writer, "  SKIP  {check} ({reason})")?;
                }
            }
        }
        writeln!(writer)?;
        let elapsed = self.finished_at - self.started_at;
        writeln!(
            writer,
            "{} of {} checks passed in {}ms",
            self.passed(),
            self.checks.len(),
            elapsed.num_milliseconds()
        )?;
        Ok(())
    }
}

/// One settings key with its resolved value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    /// Settings key.
    pub key: String,
    /// Environment variable that sets the key.
    pub env_var: String,
    /// Value, redacted for secrets; `None` if unset.
    pub value: Option<String>,
    /// Winning source; `None` if unset.
    pub source: Option<ValueSource>,
}

/// Settings listing.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigListing {
    /// Settings file in use, if any.
    pub file: Option<String>,
    /// Entries sorted by key.
    pub entries: Vec<ConfigEntry>,
}

impl TableDisplay for ConfigListing {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        match &self.file {
            Some(file) => writeln!(writer, "Settings file: {file}")?,
            None => writeln!(writer, "Settings file: <none>")?,
        }
        writeln!(writer)?;
        writeln!(writer, "{:<22} {:<22} {:<18} VALUE", "KEY", "ENV", "SOURCE")?;
        for entry in &self.entries {
            let source = entry.source.map_or_else(|| "-".to_string(), |s| s.to_string());
            writeln!(
                writer,
                "{:<22} {:<22} {:<18} {}",
                entry.key,
                entry.env_var,
                source,
                entry.value.as_deref().unwrap_or("<unset>")
            )?;
        }
        Ok(())
    }
}

impl TableDisplay for ConfigEntry {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let source = self.source.map_or_else(|| "-".to_string(), |s| s.to_string());
        writeln!(
            writer,
            "{} = {} ({source})",
            self.key,
            self.value.as_deref().unwrap_or("<unset>")
        )?;
        Ok(())
    }
}

/// Writes cluster operator status as an aligned table.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_operator_table<W: Write>(writer: &mut W, operators: &[OperatorStatus]) -> std::io::Result<()> {
    let width = operators
        .iter()
        .map(|o| o.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len())
        + 2;
    writeln!(writer, "{:<width$}{:<11}{:<13}DEGRADED", "NAME", "AVAILABLE", "PROGRESSING")?;
    for operator in operators {
        writeln!(
            writer,
            "{:<width$}{:<11}{:<13}{}",
            operator.name, operator.available, operator.progressing, operator.degraded
        )?;
    }
    Ok(())
}

/// Writes run progress as plain lines.
pub struct LineProgress<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> LineProgress<W> {
    /// Creates progress output over a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn emit(&mut self, result: std::io::Result<()>) {
        if let Err(e) = result {
            warn!(error = %e, "failed to write progress");
        }
    }
}

impl<W: Write + Send> Progress for LineProgress<W> {
    fn step(&mut self, message: &str) {
        let result = writeln!(self.writer, "{message}");
        self.emit(result);
    }

    fn divider(&mut self) {
        let result = writeln!(self.writer, "\n{DIVIDER}\n");
        self.emit(result);
    }

    fn operators(&mut self, operators: &[OperatorStatus]) {
        let result = write_operator_table(&mut self.writer, operators);
        self.emit(result);
    }

    fn passed(&mut self, check: &CheckId) {
        let result = writeln!(self.writer, "Create and test {check} - PASS");
        self.emit(result);
    }

    fn skipped(&mut self, check: &CheckId, why: &str) {
        let result = writeln!(self.writer, "Skipping {check}: {why}");
        self.emit(result);
    }
}

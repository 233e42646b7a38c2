use clap::ValueEnum;
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::outcome::Disposition;
use crate::pipeline::Diagnostic;
use crate::record::describe_value;
use crate::report::{BatchReport, ReportEntry};
use crate::validation::Violation;

pub const REPORTS_FOLDER: &str = "LOGS_REPORTS";

const COLUMNS: [&str; 8] = [
    "Filename",
    "Question ID",
    "Error Type",
    "Error Message",
    "Failed Field",
    "Actual Value",
    "Expected Format",
    "Timestamp",
];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Excel error: {0}")]
    Excel(#[from] XlsxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Report artifacts the binary can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Excel,
    Text,
    Json,
    Yaml,
}

/// One spreadsheet/log row.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub filename: String,
    pub question_id: String,
    pub error_type: String,
    pub message: String,
    pub field: String,
    pub actual: String,
    pub expected: String,
}

impl Finding {
    fn from_violation(entry: &ReportEntry, error_type: String, violation: &Violation) -> Self {
        Self {
            filename: entry.filename.clone(),
            question_id: entry.question_id_or_unknown().to_string(),
            error_type,
            message: violation.message.clone(),
            field: violation.field_path.clone(),
            actual: violation.observed.as_ref().map(describe_value).unwrap_or_default(),
            expected: violation.expected.clone().unwrap_or_default(),
        }
    }

    fn plain(entry: &ReportEntry, error_type: &str, message: String, field: Option<&str>) -> Self {
        Self {
            filename: entry.filename.clone(),
            question_id: entry.question_id_or_unknown().to_string(),
            error_type: error_type.to_string(),
            message,
            field: field.unwrap_or_default().to_string(),
            actual: String::new(),
            expected: String::new(),
        }
    }
}

/// Failure rows for every entry, in report order.
pub fn error_findings(report: &BatchReport) -> Vec<Finding> {
    let mut findings = Vec::new();
    for entry in report.entries() {
        match &entry.diagnostic {
            Diagnostic::None => {}
            Diagnostic::PreValidation { violations } | Diagnostic::PostValidation { violations } => {
                for violation in violations {
                    let error_type = format!("{} ({})", entry.disposition, violation.issue());
                    findings.push(Finding::from_violation(entry, error_type, violation));
                }
            }
            Diagnostic::Conversion { error } => {
                let mut finding = Finding::plain(
                    entry,
                    Disposition::ConversionFailed.label(),
                    error.reason.clone(),
                    error.path.as_deref(),
                );
                finding.expected = error.expression.clone().unwrap_or_default();
                findings.push(finding);
            }
            Diagnostic::Unexpected { message } => {
                findings.push(Finding::plain(entry, "Unexpected error", message.clone(), None));
            }
        }
        if let Some(sink_error) = &entry.sink_error {
            findings.push(Finding::plain(entry, "Write failed", sink_error.clone(), None));
        }
    }
    findings
}

pub fn warning_findings(report: &BatchReport) -> Vec<Finding> {
    report
        .entries()
        .iter()
        .flat_map(|entry| {
            entry
                .warnings
                .iter()
                .map(move |w| Finding::from_violation(entry, format!("Warning ({})", w.issue()), w))
        })
        .collect()
}

/// Print the boxed end-of-run summary.
pub fn print_summary(report: &BatchReport, verbose: bool) {
    let counts = report.counts();
    let rule = "=".repeat(60);

    if verbose && report.counts().failed() > 0 {
        println!("\n=== Failures ===");
        for entry in report.failures() {
            println!(
                "  ❌ {} ({}): {}",
                entry.filename,
                entry.question_id_or_unknown(),
                entry.disposition
            );
            for line in entry.diagnostic.lines() {
                println!("      - {}", line);
            }
        }
    }

    println!("\n{}", rule);
    println!("CONVERSION SUMMARY{}", if report.dry_run() { " (DRY RUN)" } else { "" });
    println!("{}", rule);
    println!("  Total files processed:          {}", report.total());
    println!("  ✓ Converted:                    {}", counts.converted);
    println!("  ❌ Pre-validation failed:        {}", counts.pre_validation_failed);
    println!("  ❌ Conversion failed:            {}", counts.conversion_failed);
    println!("  ❌ Post-validation failed:       {}", counts.post_validation_failed);
    if report.skipped() > 0 {
        println!("  ℹ Skipped by type filter:       {}", report.skipped());
    }
    if report.warning_count() > 0 {
        println!("  ⚠ Warnings:                     {}", report.warning_count());
    }
    if report.sink_failures() > 0 {
        println!("  ❌ Write failures:               {}", report.sink_failures());
    }
    if report.stopped_early() {
        println!("  ⚠ Stopped before all files were processed");
    }
    println!("  Success rate:                   {:.2}%", report.success_rate());
    println!("{}", rule);
}

pub fn render_text(report: &BatchReport) -> String {
    let counts = report.counts();
    let mut out = String::new();
    out.push_str("QUESTION CONVERSION LOG\n");
    out.push_str(&format!("Started:  {}\n", report.started_at().format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!("Finished: {}\n", report.finished_at().format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!("Dry run:  {}\n", if report.dry_run() { "yes" } else { "no" }));

    out.push_str("\n=== Summary ===\n");
    out.push_str(&format!("Total processed: {}\n", report.total()));
    for disposition in Disposition::ALL {
        out.push_str(&format!("{}: {}\n", disposition, counts.get(disposition)));
    }
    out.push_str(&format!("Skipped: {}\n", report.skipped()));
    out.push_str(&format!("Warnings: {}\n", report.warning_count()));
    out.push_str(&format!("Success rate: {:.2}%\n", report.success_rate()));

    for (title, findings) in [
        ("Errors", error_findings(report)),
        ("Warnings", warning_findings(report)),
    ] {
        out.push_str(&format!("\n=== {} ===\n", title));
        if findings.is_empty() {
            out.push_str("None\n");
        }
        for f in findings {
            out.push_str(&format!("[{}] ({}) {}: {}\n", f.filename, f.question_id, f.error_type, f.message));
            if !f.field.is_empty() {
                out.push_str(&format!("    field: {}\n", f.field));
            }
            if !f.actual.is_empty() {
                out.push_str(&format!("    actual: {}\n", f.actual));
            }
            if !f.expected.is_empty() {
                out.push_str(&format!("    expected: {}\n", f.expected));
            }
        }
    }
    out
}

/// Writes report artifacts into `<output>/LOGS_REPORTS`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_root: &Path) -> Self {
        Self {
            dir: output_root.join(REPORTS_FOLDER),
        }
    }

    /// Write the requested artifacts and return their paths.
    ///
    /// The spreadsheet and text log are skipped for dry runs and for batches
    /// without errors or warnings. JSON and YAML dumps are written whenever
    /// requested.
    pub fn write(&self, report: &BatchReport, formats: &[ReportFormat]) -> Result<Vec<PathBuf>, ReportError> {
        let stamp = report.started_at().format("%Y%m%d_%H%M%S").to_string();
        let findings_wanted = !report.dry_run() && report.has_findings();
        let mut written = Vec::new();

        for format in formats {
            let path = match format {
                ReportFormat::Excel if findings_wanted => {
                    let path = self.dir.join(format!("errors_{}.xlsx", stamp));
                    self.prepare()?;
                    write_workbook(report, &path)?;
                    path
                }
                ReportFormat::Text if findings_wanted => {
                    let path = self.dir.join(format!("conversion_{}.log", stamp));
                    self.write_file(&path, render_text(report))?;
                    path
                }
                ReportFormat::Json => {
                    let path = self.dir.join(format!("report_{}.json", stamp));
                    self.write_file(&path, serde_json::to_string_pretty(report)?)?;
                    path
                }
                ReportFormat::Yaml => {
                    let path = self.dir.join(format!("report_{}.yaml", stamp));
                    self.write_file(&path, serde_yaml::to_string(report)?)?;
                    path
                }
                _ => continue,
            };
            log::info!("Report written to {}", path.display());
            written.push(path);
        }
        Ok(written)
    }

    fn prepare(&self) -> Result<(), ReportError> {
        fs::create_dir_all(&self.dir).map_err(|source| ReportError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    fn write_file(&self, path: &Path, content: String) -> Result<(), ReportError> {
        self.prepare()?;
        fs::write(path, content).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn write_workbook(report: &BatchReport, path: &Path) -> Result<(), ReportError> {
    let mut workbook = Workbook::new();
    let timestamp = report.finished_at().format("%Y-%m-%d %H:%M:%S").to_string();

    let errors = workbook.add_worksheet();
    errors.set_name("Errors")?;
    fill_sheet(errors, &error_findings(report), &timestamp, Color::RGB(0xC00000))?;

    let warnings = workbook.add_worksheet();
    warnings.set_name("Warnings")?;
    fill_sheet(warnings, &warning_findings(report), &timestamp, Color::RGB(0xBF8F00))?;

    workbook.save(path)?;
    Ok(())
}

fn fill_sheet(sheet: &mut Worksheet, findings: &[Finding], timestamp: &str, header: Color) -> Result<(), XlsxError> {
    let header_format = Format::new()
        .set_bold()
        .set_background_color(header)
        .set_font_color(Color::White);

    for (col, title) in COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header_format)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    for (i, f) in findings.iter().enumerate() {
        let row = i as u32 + 1;
        let cells = [
            f.filename.as_str(),
            f.question_id.as_str(),
            f.error_type.as_str(),
            f.message.as_str(),
            f.field.as_str(),
            f.actual.as_str(),
            f.expected.as_str(),
            timestamp,
        ];
        for (col, cell) in cells.iter().enumerate() {
            sheet.write_string(row, col as u16, *cell)?;
        }
    }
    sheet.autofit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineResult, TerminalState};
    use crate::report::ReportBuilder;
    use crate::validation::ViolationKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_report(dry_run: bool) -> BatchReport {
        let mut builder = ReportBuilder::new(dry_run);
        let failed = PipelineResult {
            filename: "Q7.json".to_string(),
            question_id: Some("Q7".to_string()),
            type_name: Some("mcq".to_string()),
            terminal: TerminalState::PreFailed,
            diagnostic: Diagnostic::PreValidation {
                violations: vec![Violation::new("choices", ViolationKind::InvalidType, "expected array")
                    .with_expected("array")
                    .with_observed(json!("none"))],
            },
            output: None,
            warnings: vec![Violation::new(
                "explanation",
                ViolationKind::InvalidValue,
                "not wrapped in a single <p>",
            )],
        };
        builder.push(ReportEntry::new(&failed, Disposition::PreValidationFailed));
        builder.finish()
    }

    #[test]
    fn test_findings_rows() {
        let report = sample_report(false);
        let errors = error_findings(&report);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].question_id, "Q7");
        assert_eq!(errors[0].field, "choices");
        assert_eq!(errors[0].expected, "array");
        assert!(errors[0].error_type.starts_with("Pre-validation failed"));
        assert_eq!(warning_findings(&report).len(), 1);
    }

    #[test]
    fn test_text_log_sections() {
        let text = render_text(&sample_report(false));
        assert!(text.contains("=== Errors ==="));
        assert!(text.contains("[Q7.json] (Q7)"));
        assert!(text.contains("field: choices"));
        assert!(text.contains("Success rate: 0.00%"));
    }

    #[test]
    fn test_write_all_formats() {
        let out = TempDir::new().unwrap();
        let writer = ReportWriter::new(out.path());
        let written = writer
            .write(
                &sample_report(false),
                &[ReportFormat::Excel, ReportFormat::Text, ReportFormat::Json],
            )
            .unwrap();

        assert_eq!(written.len(), 3);
        for path in &written {
            assert!(path.is_file(), "{} missing", path.display());
            assert!(path.starts_with(out.path().join(REPORTS_FOLDER)));
        }
        let dump: serde_json::Value = serde_json::from_str(&fs::read_to_string(&written[2]).unwrap()).unwrap();
        assert_eq!(dump["entries"][0]["disposition"], "pre_validation_failed");
    }

    #[test]
    fn test_dry_run_skips_findings_artifacts() {
        let out = TempDir::new().unwrap();
        let writer = ReportWriter::new(out.path());
        let written = writer
            .write(&sample_report(true), &[ReportFormat::Excel, ReportFormat::Text])
            .unwrap();
        assert!(written.is_empty());
        assert!(!out.path().join(REPORTS_FOLDER).exists());
    }
}

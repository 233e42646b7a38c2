use chrono::{DateTime, Local};
use serde::Serialize;

use crate::outcome::Disposition;
use crate::pipeline::{Diagnostic, PipelineResult};
use crate::validation::Violation;

/// One processed record, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub filename: String,
    pub question_id: Option<String>,
    pub type_name: Option<String>,
    pub disposition: Disposition,
    pub diagnostic: Diagnostic,
    pub warnings: Vec<Violation>,
    /// Set when the sink failed to persist this record.
    pub sink_error: Option<String>,
}

impl ReportEntry {
    pub fn new(result: &PipelineResult, disposition: Disposition) -> Self {
        Self {
            filename: result.filename.clone(),
            question_id: result.question_id.clone(),
            type_name: result.type_name.clone(),
            disposition,
            diagnostic: result.diagnostic.clone(),
            warnings: result.warnings.clone(),
            sink_error: None,
        }
    }

    pub fn question_id_or_unknown(&self) -> &str {
        self.question_id.as_deref().unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispositionCounts {
    pub converted: usize,
    pub pre_validation_failed: usize,
    pub conversion_failed: usize,
    pub post_validation_failed: usize,
}

impl DispositionCounts {
    pub fn record(&mut self, disposition: Disposition) {
        *self.slot(disposition) += 1;
    }

    pub fn get(&self, disposition: Disposition) -> usize {
        match disposition {
            Disposition::Converted => self.converted,
            Disposition::PreValidationFailed => self.pre_validation_failed,
            Disposition::ConversionFailed => self.conversion_failed,
            Disposition::PostValidationFailed => self.post_validation_failed,
        }
    }

    fn slot(&mut self, disposition: Disposition) -> &mut usize {
        match disposition {
            Disposition::Converted => &mut self.converted,
            Disposition::PreValidationFailed => &mut self.pre_validation_failed,
            Disposition::ConversionFailed => &mut self.conversion_failed,
            Disposition::PostValidationFailed => &mut self.post_validation_failed,
        }
    }

    pub fn total(&self) -> usize {
        self.converted + self.failed()
    }

    pub fn failed(&self) -> usize {
        self.pre_validation_failed + self.conversion_failed + self.post_validation_failed
    }
}

/// Mutable accumulator used while a batch runs.
#[derive(Debug)]
pub struct ReportBuilder {
    started_at: DateTime<Local>,
    dry_run: bool,
    entries: Vec<ReportEntry>,
    counts: DispositionCounts,
    skipped: usize,
    stopped_early: bool,
}

impl ReportBuilder {
    pub fn new(dry_run: bool) -> Self {
        Self {
            started_at: Local::now(),
            dry_run,
            entries: Vec::new(),
            counts: DispositionCounts::default(),
            skipped: 0,
            stopped_early: false,
        }
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.counts.record(entry.disposition);
        self.entries.push(entry);
    }

    pub fn counts(&self) -> DispositionCounts {
        self.counts
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn mark_stopped(&mut self) {
        self.stopped_early = true;
    }

    pub fn finish(self) -> BatchReport {
        BatchReport {
            started_at: self.started_at,
            finished_at: Local::now(),
            dry_run: self.dry_run,
            entries: self.entries,
            counts: self.counts,
            skipped: self.skipped,
            stopped_early: self.stopped_early,
        }
    }
}

/// Finalized, read-only outcome of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    started_at: DateTime<Local>,
    finished_at: DateTime<Local>,
    dry_run: bool,
    counts: DispositionCounts,
    skipped: usize,
    stopped_early: bool,
    entries: Vec<ReportEntry>,
}

impl BatchReport {
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn counts(&self) -> DispositionCounts {
        self.counts
    }

    /// Records processed, excluding those the type filter skipped.
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn stopped_early(&self) -> bool {
        self.stopped_early
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Local> {
        self.finished_at
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries
            .iter()
            .filter(|e| e.disposition != Disposition::Converted)
    }

    pub fn warning_count(&self) -> usize {
        self.entries.iter().map(|e| e.warnings.len()).sum()
    }

    pub fn sink_failures(&self) -> usize {
        self.entries.iter().filter(|e| e.sink_error.is_some()).count()
    }

    /// Percentage of processed records that converted; 0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.counts.converted as f64 / self.entries.len() as f64 * 100.0
        }
    }

    /// True when every processed record converted and was persisted.
    pub fn is_clean(&self) -> bool {
        self.counts.failed() == 0 && self.sink_failures() == 0
    }

    pub fn has_findings(&self) -> bool {
        self.counts.failed() > 0 || self.warning_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TerminalState;

    fn result(filename: &str, terminal: TerminalState) -> PipelineResult {
        PipelineResult {
            filename: filename.to_string(),
            question_id: None,
            type_name: Some("mcq".to_string()),
            terminal,
            diagnostic: Diagnostic::None,
            output: None,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_counts_sum_to_entries() {
        let mut builder = ReportBuilder::new(false);
        builder.push(ReportEntry::new(&result("a.json", TerminalState::Succeeded), Disposition::Converted));
        builder.push(ReportEntry::new(
            &result("b.json", TerminalState::PreFailed),
            Disposition::PreValidationFailed,
        ));
        builder.push(ReportEntry::new(
            &result("c.json", TerminalState::PostFailed),
            Disposition::PostValidationFailed,
        ));
        builder.record_skipped();
        let report = builder.finish();

        assert_eq!(report.total(), 3);
        assert_eq!(report.counts().total(), 3);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failures().count(), 2);
        assert!(!report.is_clean());
        assert!((report.success_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_entry_order_is_preserved() {
        let mut builder = ReportBuilder::new(true);
        for name in ["z.json", "a.json", "m.json"] {
            builder.push(ReportEntry::new(&result(name, TerminalState::Succeeded), Disposition::Converted));
        }
        let report = builder.finish();
        let names: Vec<&str> = report.entries().iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["z.json", "a.json", "m.json"]);
        assert!(report.is_clean());
        assert!(report.dry_run());
    }

    #[test]
    fn test_empty_report() {
        let report = ReportBuilder::new(false).finish();
        assert_eq!(report.success_rate(), 0.0);
        assert!(!report.has_findings());
        assert_eq!(report.entries().len(), 0);
    }
}

use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::converter::panic_message;
use crate::input::InputRecord;
use crate::outcome::{Disposition, Router};
use crate::pipeline::{Pipeline, PipelineOptions, PipelineResult};
use crate::record::Record;
use crate::report::{BatchReport, DispositionCounts, ReportBuilder};
use crate::sink::{NullSink, Sink};
use crate::type_registry::TypeRegistry;

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Only records whose type is listed are processed. Aliases are accepted.
    pub type_filter: Option<Vec<String>>,
    /// Run every stage but persist nothing.
    pub dry_run: bool,
    pub pipeline: PipelineOptions,
}

/// A per-record failure outside validation and conversion.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct UnexpectedDefect(pub String);

/// Snapshot pushed to a [`ProgressObserver`] after each processed record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Position in the input, skipped records included.
    pub position: usize,
    pub total: usize,
    pub disposition: Disposition,
    pub counts: DispositionCounts,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.position as f64 / self.total as f64 * 100.0
        }
    }
}

pub trait ProgressObserver {
    fn on_record(&mut self, progress: &Progress);
}

#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_record(&mut self, _progress: &Progress) {}
}

/// Prints `Progress: i/n (p%)` at roughly every twentieth of the batch.
#[derive(Debug, Default)]
pub struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn on_record(&mut self, progress: &Progress) {
        let step = (progress.total / 20).max(1);
        if progress.position % step == 0 || progress.position == progress.total {
            println!(
                "Progress: {}/{} ({:.0}%)",
                progress.position,
                progress.total,
                progress.percent()
            );
        }
    }
}

/// Drives every input record through the pipeline, router and sink.
pub struct BatchOrchestrator<'r> {
    registry: &'r TypeRegistry,
    options: BatchOptions,
    type_filter: Option<Vec<String>>,
    stop: Arc<AtomicBool>,
}

impl<'r> BatchOrchestrator<'r> {
    pub fn new(registry: &'r TypeRegistry, options: BatchOptions) -> Self {
        let type_filter = options.type_filter.as_ref().map(|names| {
            names
                .iter()
                .map(|name| canonical_name(registry, name))
                .collect::<Vec<_>>()
        });
        Self {
            registry,
            options,
            type_filter,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raising this flag stops the batch before the next record starts.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn run<I>(&self, records: I, sink: &mut dyn Sink, progress: &mut dyn ProgressObserver) -> BatchReport
    where
        I: IntoIterator<Item = InputRecord>,
        I::IntoIter: ExactSizeIterator,
    {
        let records = records.into_iter();
        let total = records.len();
        let pipeline = Pipeline::new(self.registry, self.options.pipeline);
        let mut report = ReportBuilder::new(self.options.dry_run);
        let mut null_sink = NullSink;
        let sink: &mut dyn Sink = if self.options.dry_run { &mut null_sink } else { sink };

        log::info!(
            "Processing {} records{}",
            total,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        for (index, input) in records.enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                log::warn!("Stop requested; {} records left unprocessed", total - index);
                report.mark_stopped();
                break;
            }

            let source = input.payload.as_ref().ok().cloned();
            if let Some(value) = &source {
                if !self.accepts(value) {
                    log::debug!("Skipping {} (type not selected)", input.filename);
                    report.record_skipped();
                    continue;
                }
            }

            let filename = input.filename.clone();
            let result = match self.process(&pipeline, input) {
                Ok(result) => result,
                Err(defect) => {
                    log::error!("Unexpected defect in {}: {}", filename, defect);
                    let record = source.as_ref().map(|v| Record::new(filename.as_str(), v.clone()));
                    PipelineResult::unexpected(filename.as_str(), record.as_ref(), defect.to_string())
                }
            };

            let disposition = Router::new(&mut *sink, &mut report).route(&result, source.as_ref());
            progress.on_record(&Progress {
                position: index + 1,
                total,
                disposition,
                counts: report.counts(),
            });
        }

        let report = report.finish();
        log::info!(
            "Batch finished: {} processed, {} converted, {} failed, {} skipped",
            report.total(),
            report.counts().converted,
            report.counts().failed(),
            report.skipped()
        );
        report
    }

    /// The per-record boundary. Nothing unwinds past it.
    fn process(&self, pipeline: &Pipeline<'_>, input: InputRecord) -> Result<PipelineResult, UnexpectedDefect> {
        let value = input.payload.map_err(|e| UnexpectedDefect(e.to_string()))?;
        let record = Record::new(input.filename, value);
        panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&record)))
            .map_err(|payload| UnexpectedDefect(panic_message(payload.as_ref())))
    }

    /// A record is skipped only when its type is readable and not selected.
    fn accepts(&self, value: &Value) -> bool {
        let Some(filter) = &self.type_filter else {
            return true;
        };
        match value.get("type").and_then(Value::as_str) {
            Some(raw) => {
                let name = canonical_name(self.registry, raw);
                filter.iter().any(|selected| *selected == name)
            }
            None => true,
        }
    }
}

fn canonical_name(registry: &TypeRegistry, name: &str) -> String {
    registry
        .canonical(name)
        .map(str::to_string)
        .unwrap_or_else(|| name.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputError;
    use crate::sink::CollectingSink;
    use serde_json::json;
    use std::path::PathBuf;

    fn counting(question_id: &str) -> Value {
        json!({
            "question_id": question_id,
            "type": "counting",
            "stem": "<p>How many stars?</p>",
            "language": "en",
            "country": "us",
            "subject": "Math",
            "grade": 2,
            "section_id": 7,
            "choices": [],
            "answer": "4",
            "grid_size": "2x2"
        })
    }

    fn input(question_id: &str) -> InputRecord {
        InputRecord::parsed(format!("{}.json", question_id), counting(question_id))
    }

    #[derive(Default)]
    struct Recorder(Vec<Progress>);

    impl ProgressObserver for Recorder {
        fn on_record(&mut self, progress: &Progress) {
            self.0.push(*progress);
        }
    }

    #[test]
    fn test_every_record_routed_once() {
        let registry = TypeRegistry::builtin().unwrap();
        let orchestrator = BatchOrchestrator::new(&registry, BatchOptions::default());
        let mut sink = CollectingSink::default();
        let mut progress = Recorder::default();

        let report = orchestrator.run(vec![input("Q1"), input("Q2"), input("Q3")], &mut sink, &mut progress);

        assert_eq!(report.total(), 3);
        assert_eq!(report.counts().converted, 3);
        assert_eq!(sink.writes().len(), 3);
        assert_eq!(progress.0.last().unwrap().position, 3);
        assert_eq!(progress.0.last().unwrap().counts.converted, 3);
    }

    #[test]
    fn test_unreadable_record_does_not_stop_batch() {
        let registry = TypeRegistry::builtin().unwrap();
        let orchestrator = BatchOrchestrator::new(&registry, BatchOptions::default());
        let broken = InputRecord {
            filename: "broken.json".to_string(),
            payload: Err(InputError::MissingRoot(PathBuf::from("gone"))),
        };
        let mut sink = CollectingSink::default();

        let report = orchestrator.run(vec![input("Q1"), broken, input("Q3")], &mut sink, &mut NoProgress);

        assert_eq!(report.counts().converted, 2);
        assert_eq!(report.counts().conversion_failed, 1);
        assert_eq!(report.entries()[1].filename, "broken.json");
        assert_eq!(sink.writes()[1].payload, None);
    }

    #[test]
    fn test_type_filter_skips_without_counting() {
        let registry = TypeRegistry::builtin().unwrap();
        let options = BatchOptions {
            type_filter: Some(vec!["mcq".to_string()]),
            ..Default::default()
        };
        let orchestrator = BatchOrchestrator::new(&registry, options);
        let report = orchestrator.run(vec![input("Q1"), input("Q2")], &mut CollectingSink::default(), &mut NoProgress);

        assert_eq!(report.total(), 0);
        assert_eq!(report.skipped(), 2);
        assert!(report.is_clean());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let registry = TypeRegistry::builtin().unwrap();
        let options = BatchOptions {
            dry_run: true,
            ..Default::default()
        };
        let orchestrator = BatchOrchestrator::new(&registry, options);
        let mut sink = CollectingSink::default();
        let report = orchestrator.run(vec![input("Q1")], &mut sink, &mut NoProgress);

        assert!(sink.writes().is_empty());
        assert_eq!(report.counts().converted, 1);
        assert!(report.dry_run());
    }

    #[test]
    fn test_stop_between_records() {
        let registry = TypeRegistry::builtin().unwrap();
        let orchestrator = BatchOrchestrator::new(&registry, BatchOptions::default());
        orchestrator.stop_handle().store(true, Ordering::SeqCst);
        let report = orchestrator.run(vec![input("Q1"), input("Q2")], &mut CollectingSink::default(), &mut NoProgress);

        assert!(report.stopped_early());
        assert_eq!(report.total(), 0);
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::pipeline::{PipelineResult, TerminalState};
use crate::report::{ReportBuilder, ReportEntry};
use crate::sink::Sink;

/// Output category a record lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Converted,
    PreValidationFailed,
    ConversionFailed,
    PostValidationFailed,
}

impl Disposition {
    pub const ALL: [Disposition; 4] = [
        Disposition::Converted,
        Disposition::PreValidationFailed,
        Disposition::ConversionFailed,
        Disposition::PostValidationFailed,
    ];

    /// Folder under the output root.
    pub fn folder(&self) -> &'static str {
        match self {
            Disposition::Converted => "CONVERTED",
            Disposition::PreValidationFailed => "PRE_CONVERSION_VALIDATION_FAILED",
            Disposition::ConversionFailed => "CONVERSION_FAILED",
            Disposition::PostValidationFailed => "POST_CONVERSION_VALIDATION_FAILED",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Converted => "Converted",
            Disposition::PreValidationFailed => "Pre-validation failed",
            Disposition::ConversionFailed => "Conversion failed",
            Disposition::PostValidationFailed => "Post-validation failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        *self != Disposition::Converted
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn classify(result: &PipelineResult) -> Disposition {
    match result.terminal {
        TerminalState::Succeeded => Disposition::Converted,
        TerminalState::PreFailed => Disposition::PreValidationFailed,
        TerminalState::ConvertFailed => Disposition::ConversionFailed,
        TerminalState::PostFailed => Disposition::PostValidationFailed,
    }
}

/// Hands each classified record to the sink and appends it to the report.
pub struct Router<'a> {
    sink: &'a mut dyn Sink,
    report: &'a mut ReportBuilder,
}

impl<'a> Router<'a> {
    pub fn new(sink: &'a mut dyn Sink, report: &'a mut ReportBuilder) -> Self {
        Self { sink, report }
    }

    /// Route one record. `source` is the record as read, if it could be parsed.
    ///
    /// Converted and post-failed records are persisted in their converted
    /// form; anything that failed earlier is persisted as it arrived.
    pub fn route(&mut self, result: &PipelineResult, source: Option<&Value>) -> Disposition {
        let disposition = classify(result);
        let payload = match disposition {
            Disposition::Converted | Disposition::PostValidationFailed => result.output.as_ref(),
            Disposition::PreValidationFailed | Disposition::ConversionFailed => source,
        };

        let mut entry = ReportEntry::new(result, disposition);
        if disposition.is_failure() {
            log::warn!(
                "{} ({}): {}",
                result.filename,
                entry.question_id_or_unknown(),
                disposition
            );
        }

        if let Err(e) = self.sink.write(disposition, &result.filename, payload, &result.diagnostic) {
            log::error!("Failed to persist {}: {}", result.filename, e);
            entry.sink_error = Some(e.to_string());
        }

        self.report.push(entry);
        disposition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Diagnostic;
    use crate::sink::{CollectingSink, SinkError};
    use serde_json::json;

    fn result(terminal: TerminalState, output: Option<Value>) -> PipelineResult {
        PipelineResult {
            filename: "Q1.json".to_string(),
            question_id: Some("Q1".to_string()),
            type_name: Some("mcq".to_string()),
            terminal,
            diagnostic: Diagnostic::None,
            output,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_classify_is_exhaustive() {
        let pairs = [
            (TerminalState::Succeeded, Disposition::Converted),
            (TerminalState::PreFailed, Disposition::PreValidationFailed),
            (TerminalState::ConvertFailed, Disposition::ConversionFailed),
            (TerminalState::PostFailed, Disposition::PostValidationFailed),
        ];
        for (terminal, expected) in pairs {
            assert_eq!(classify(&result(terminal, None)), expected);
        }
    }

    #[test]
    fn test_route_payload_by_disposition() {
        let mut sink = CollectingSink::default();
        let mut report = ReportBuilder::new(false);
        let source = json!({ "type": "mcq", "legacy": true });
        let converted = json!({ "type": "mcq", "legacy": false });

        {
            let mut router = Router::new(&mut sink, &mut report);
            router.route(&result(TerminalState::Succeeded, Some(converted.clone())), Some(&source));
            router.route(&result(TerminalState::PreFailed, None), Some(&source));
            router.route(&result(TerminalState::PostFailed, Some(converted.clone())), Some(&source));
        }

        let writes = sink.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].payload, Some(converted.clone()));
        assert_eq!(writes[1].payload, Some(source));
        assert_eq!(writes[2].payload, Some(converted));
        assert_eq!(report.counts().total(), 3);
    }

    struct FailingSink;

    impl Sink for FailingSink {
        fn write(
            &mut self,
            _disposition: Disposition,
            _filename: &str,
            _payload: Option<&Value>,
            _diagnostic: &Diagnostic,
        ) -> Result<(), SinkError> {
            Err(SinkError::Rejected("disk full".to_string()))
        }
    }

    #[test]
    fn test_sink_failure_is_recorded() {
        let mut sink = FailingSink;
        let mut report = ReportBuilder::new(false);
        let disposition =
            Router::new(&mut sink, &mut report).route(&result(TerminalState::Succeeded, Some(json!({}))), None);

        assert_eq!(disposition, Disposition::Converted);
        let report = report.finish();
        assert_eq!(report.sink_failures(), 1);
        assert!(report.entries()[0].sink_error.as_deref().unwrap().contains("disk full"));
        assert!(!report.is_clean());
    }
}

// Legacy question migration: validate, convert and route question records
pub mod catalog;
pub mod config;
pub mod consistency;
pub mod converter;
pub mod error;
pub mod field_mapping;
pub mod input;
pub mod orchestrator;
pub mod outcome;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod reporter;
pub mod rules;
pub mod schema;
pub mod sink;
pub mod type_registry;
pub mod validation;

// Re-export core types for convenience
pub use converter::{convert, ConversionError, ConversionOutcome};
pub use error::MigrateError;
pub use orchestrator::{BatchOptions, BatchOrchestrator, ProgressObserver};
pub use outcome::{classify, Disposition, Router};
pub use pipeline::{Diagnostic, Pipeline, PipelineOptions, PipelineResult, TerminalState};
pub use record::Record;
pub use report::{BatchReport, ReportEntry};
pub use rules::{Rule, RuleError, RuleKind};
pub use sink::{DirectorySink, Sink, SinkError};
pub use type_registry::{RegistryError, TypeRegistry, TypeSpec};
pub use validation::{validate, Phase, ValidationResult, Violation, ViolationKind};

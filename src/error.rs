use thiserror::Error;

use crate::config::ConfigError;
use crate::input::InputError;
use crate::reporter::ReportError;
use crate::sink::SinkError;
use crate::type_registry::RegistryError;

/// Anything that stops the tool before or after the batch itself.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Type spec error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Output error: {0}")]
    Sink(#[from] SinkError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Unknown question type in filter: {0}")]
    UnknownType(String),
}

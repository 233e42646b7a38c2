use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::reporter::ReportFormat;

pub const DEFAULT_INPUT: &str = "INPUT";
pub const DEFAULT_OUTPUT: &str = "OUTPUTS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Parser, Debug, Default)]
#[command(name = "question-migrate")]
#[command(about = "Validate and convert legacy question JSON files to the new question format")]
pub struct Cli {
    /// Directory holding the legacy question files
    #[arg(short, long, value_name = "DIR", env = "QUESTION_MIGRATE_INPUT")]
    pub input: Option<PathBuf>,

    /// Root directory for converted files, failures and reports
    #[arg(short, long, value_name = "DIR", env = "QUESTION_MIGRATE_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Only process these question types (e.g. mcq,gapText)
    #[arg(short, long, value_name = "TYPES", value_delimiter = ',')]
    pub types: Option<Vec<String>>,

    /// Load type specs from this directory instead of the bundled set
    #[arg(long, value_name = "DIR")]
    pub specs: Option<PathBuf>,

    /// YAML file with default settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Validate and convert without writing any output files
    #[arg(long)]
    pub dry_run: bool,

    /// Print every finding and enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not require question_id to match the file name
    #[arg(long)]
    pub no_identity_check: bool,

    /// Report artifacts to write (repeatable)
    #[arg(long, value_enum, value_name = "FORMAT", value_delimiter = ',')]
    pub report_format: Vec<ReportFormat>,
}

/// Settings file; every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub types: Option<Vec<String>>,
    pub specs: Option<PathBuf>,
    pub dry_run: Option<bool>,
    pub verbose: Option<bool>,
    pub identity_check: Option<bool>,
    pub report_formats: Option<Vec<ReportFormat>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Effective run settings: command line over config file over defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub types: Option<Vec<String>>,
    pub specs: Option<PathBuf>,
    pub dry_run: bool,
    pub verbose: bool,
    pub check_identity: bool,
    pub report_formats: Vec<ReportFormat>,
}

impl Settings {
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(cli, file))
    }

    pub fn merge(cli: Cli, file: FileConfig) -> Self {
        let types = cli
            .types
            .or(file.types)
            .map(|names| {
                names
                    .into_iter()
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|names| !names.is_empty());

        let report_formats = if !cli.report_format.is_empty() {
            cli.report_format
        } else {
            file.report_formats
                .unwrap_or_else(|| vec![ReportFormat::Excel, ReportFormat::Text])
        };

        Self {
            input: cli.input.or(file.input).unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT)),
            output: cli.output.or(file.output).unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            types,
            specs: cli.specs.or(file.specs),
            dry_run: cli.dry_run || file.dry_run.unwrap_or(false),
            verbose: cli.verbose || file.verbose.unwrap_or(false),
            check_identity: !cli.no_identity_check && file.identity_check.unwrap_or(true),
            report_formats,
        }
    }
}

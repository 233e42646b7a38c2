use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::outcome::Disposition;
use crate::pipeline::Diagnostic;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {filename}: {source}")]
    Serialize {
        filename: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Sink rejected record: {0}")]
    Rejected(String),
}

/// Persists one record per call into the category its disposition names.
pub trait Sink {
    fn write(
        &mut self,
        disposition: Disposition,
        filename: &str,
        payload: Option<&Value>,
        diagnostic: &Diagnostic,
    ) -> Result<(), SinkError>;
}

/// Discards everything. Used for dry runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn write(
        &mut self,
        disposition: Disposition,
        filename: &str,
        _payload: Option<&Value>,
        _diagnostic: &Diagnostic,
    ) -> Result<(), SinkError> {
        log::debug!("Dry run: not writing {} to {}", filename, disposition.folder());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SinkWrite {
    pub disposition: Disposition,
    pub filename: String,
    pub payload: Option<Value>,
    pub diagnostic: Diagnostic,
}

/// Keeps every write in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    writes: Vec<SinkWrite>,
}

impl CollectingSink {
    pub fn writes(&self) -> &[SinkWrite] {
        &self.writes
    }
}

impl Sink for CollectingSink {
    fn write(
        &mut self,
        disposition: Disposition,
        filename: &str,
        payload: Option<&Value>,
        diagnostic: &Diagnostic,
    ) -> Result<(), SinkError> {
        self.writes.push(SinkWrite {
            disposition,
            filename: filename.to_string(),
            payload: payload.cloned(),
            diagnostic: diagnostic.clone(),
        });
        Ok(())
    }
}

/// Writes records into one folder per disposition under `root`.
///
/// Records that failed before conversion are copied byte for byte from the
/// source tree when one is configured, so the original file can be fixed and
/// resubmitted as is.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
    source_root: Option<PathBuf>,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            source_root: None,
        }
    }

    pub fn with_source_root(mut self, source_root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(source_root.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every category folder up front.
    pub fn prepare(&self) -> Result<(), SinkError> {
        for disposition in Disposition::ALL {
            let dir = self.root.join(disposition.folder());
            fs::create_dir_all(&dir).map_err(|source| SinkError::Io { path: dir, source })?;
        }
        Ok(())
    }

    pub fn destination(&self, disposition: Disposition, filename: &str) -> PathBuf {
        self.root.join(disposition.folder()).join(filename)
    }

    fn copy_source(&self, filename: &str, destination: &Path) -> Option<Result<(), SinkError>> {
        let source = self.source_root.as_ref()?.join(filename);
        if !source.is_file() {
            return None;
        }
        Some(
            fs::copy(&source, destination)
                .map(|_| ())
                .map_err(|e| SinkError::Io { path: source, source: e }),
        )
    }
}

impl Sink for DirectorySink {
    fn write(
        &mut self,
        disposition: Disposition,
        filename: &str,
        payload: Option<&Value>,
        _diagnostic: &Diagnostic,
    ) -> Result<(), SinkError> {
        let destination = self.destination(disposition, filename);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        if matches!(
            disposition,
            Disposition::PreValidationFailed | Disposition::ConversionFailed
        ) {
            if let Some(copied) = self.copy_source(filename, &destination) {
                log::debug!("Copied {} to {}", filename, destination.display());
                return copied;
            }
        }

        let Some(payload) = payload else {
            return Err(SinkError::Rejected(format!(
                "nothing to write for {} and no source file to copy",
                filename
            )));
        };
        let content = serde_json::to_string_pretty(payload).map_err(|source| SinkError::Serialize {
            filename: filename.to_string(),
            source,
        })?;
        fs::write(&destination, content).map_err(|source| SinkError::Io {
            path: destination.clone(),
            source,
        })?;
        log::debug!("Wrote {}", destination.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_category_folders() {
        let out = TempDir::new().unwrap();
        DirectorySink::new(out.path()).prepare().unwrap();
        for disposition in Disposition::ALL {
            assert!(out.path().join(disposition.folder()).is_dir());
        }
    }

    #[test]
    fn test_converted_written_as_pretty_utf8() {
        let out = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(out.path());
        sink.write(
            Disposition::Converted,
            "Q1.json",
            Some(&json!({ "stem": "ما هو؟" })),
            &Diagnostic::None,
        )
        .unwrap();

        let written = fs::read_to_string(out.path().join("CONVERTED/Q1.json")).unwrap();
        assert_eq!(written, "{\n  \"stem\": \"ما هو؟\"\n}");
    }

    #[test]
    fn test_pre_failure_copies_source_unchanged() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let original = "{\"type\":\"mcq\",   \"stem\": \"odd spacing\"}";
        fs::create_dir_all(input.path().join("batch")).unwrap();
        fs::write(input.path().join("batch/Q2.json"), original).unwrap();

        let mut sink = DirectorySink::new(out.path()).with_source_root(input.path());
        sink.write(
            Disposition::PreValidationFailed,
            "batch/Q2.json",
            Some(&json!({ "type": "mcq" })),
            &Diagnostic::None,
        )
        .unwrap();

        let copied =
            fs::read_to_string(out.path().join("PRE_CONVERSION_VALIDATION_FAILED/batch/Q2.json")).unwrap();
        assert_eq!(copied, original);
    }

    #[test]
    fn test_missing_payload_without_source_is_rejected() {
        let out = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(out.path());
        let err = sink
            .write(Disposition::ConversionFailed, "bad.json", None, &Diagnostic::None)
            .unwrap_err();
        assert!(matches!(err, SinkError::Rejected(_)));
    }
}

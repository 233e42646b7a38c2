use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Input directory not found: {0}")]
    MissingRoot(PathBuf),

    #[error("Failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One input file: its name relative to the input root and its parsed body.
#[derive(Debug)]
pub struct InputRecord {
    pub filename: String,
    pub payload: Result<Value, InputError>,
}

impl InputRecord {
    pub fn parsed(filename: impl Into<String>, value: Value) -> Self {
        Self {
            filename: filename.into(),
            payload: Ok(value),
        }
    }
}

/// Every `*.json` file under `root`, sorted by relative path.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>, InputError> {
    if !root.is_dir() {
        return Err(InputError::MissingRoot(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| InputError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        let is_json = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_json {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

pub fn read_record(path: &Path) -> Result<Value, InputError> {
    let bytes = fs::read(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes[..]);
    serde_json::from_slice(body).map_err(|source| InputError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads discovered files lazily, one per `next()`.
#[derive(Debug)]
pub struct RecordSource {
    root: PathBuf,
    files: std::vec::IntoIter<PathBuf>,
}

impl RecordSource {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, InputError> {
        let root = root.into();
        let files = discover(&root)?;
        log::info!("Found {} JSON files in {}", files.len(), root.display());
        Ok(Self {
            root,
            files: files.into_iter(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative_name(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl Iterator for RecordSource {
    type Item = InputRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files.next()?;
        Some(InputRecord {
            filename: self.relative_name(&path),
            payload: read_record(&path),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.files.size_hint()
    }
}

impl ExactSizeIterator for RecordSource {}

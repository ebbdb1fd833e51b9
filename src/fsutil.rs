use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Error that occurs when loading a JSON document from disk fails.
#[derive(Debug, thiserror::Error)]
pub enum JsonFileError {
    #[error(transparent)]
    FileOpen(#[from] FileOpenError),
    #[error("failed to decode JSON file `{path}`: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Reads and deserializes a JSON file.
///
/// # Example
/// ```no_run
/// # use autoexporter::fsutil;
/// let value: serde_json::Value = fsutil::read_json_file("/etc/autoexporter/catalog.json")?;
/// # Ok::<(), fsutil::JsonFileError>(())
/// ```
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, JsonFileError> {
    let path = path.as_ref();
    let reader = open_file_reader(path)?;
    serde_json::from_reader(reader).map_err(|source| JsonFileError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

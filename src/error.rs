use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("input file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("malformed entity stream: {0}")]
    Parse(String),

    /// The requested decoder is not compiled into this build. A
    /// configuration problem, distinct from malformed data.
    #[error("{0} support is not enabled in this build")]
    BackendUnavailable(&'static str),

    #[error("archive error: {0}")]
    Archive(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Opens errors keep the path when the file is simply missing, so the
    /// caller can tell a missing source apart from other I/O failures.
    pub fn open(path: &Path, err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::NotFound {
            Error::SourceNotFound(path.to_path_buf())
        } else {
            Error::Io(err)
        }
    }
}

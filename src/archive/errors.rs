use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read archive {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to write archive {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("{path} has no version.json; its entries were dumped to {dump_dir}")]
    MissingVersion { path: PathBuf, dump_dir: PathBuf },

    #[error("{path} has an unusable version.json ({message}): {raw}")]
    InvalidVersion {
        path: PathBuf,
        message: String,
        raw: String,
    },

    #[error("Failed to dump entry to {path}: {source}")]
    Dump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    pub(crate) fn read(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        ArchiveError::Read {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        ArchiveError::Write {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

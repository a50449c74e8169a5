use crate::class::{ClassError, EncodeError, SelectError};
use std::path::PathBuf;
use thiserror::Error;

/// Failure inside one transformer.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error(transparent)]
    Decode(#[from] ClassError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin path {path} exists but is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("Failed to read plugin directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unusable manifest.json in {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error(
        "{path}: entry point '{entry_point}' is not a registered transformer{}",
        hint(.suggestion)
    )]
    Contract {
        path: PathBuf,
        entry_point: String,
        suggestion: Option<String>,
    },

    #[error("Failed to load plugin {name} from {path}: {source}")]
    Load {
        path: PathBuf,
        name: String,
        #[source]
        source: TransformError,
    },

    #[error("Plugin {name} failed on {module}: {source}")]
    Transform {
        name: String,
        module: String,
        #[source]
        source: TransformError,
    },
}

fn hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_deref()
        .map(|s| format!(" (did you mean '{}'?)", s))
        .unwrap_or_default()
}

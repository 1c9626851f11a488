//! Errors raised while loading configuration or preparing directories.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot read {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("endpoint is not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no home directory found; pass --base-dir or set FIELD_OUTBOX_HOME")]
    NoHomeDir,
}

pub type CoreResult<T> = Result<T, CoreError>;

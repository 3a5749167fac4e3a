// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

use crate::receivers::tail::offset::OffsetParseError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watched directory {path:?} is unavailable: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Offset parse error: {0}")]
    OffsetParse(#[from] OffsetParseError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Regex error: {0}")]
    Regex(String),

    #[error("Sink closed")]
    SinkClosed,
}

impl Error {
    /// Whether the watched directory itself could not be listed.
    pub fn is_directory_unavailable(&self) -> bool {
        matches!(self, Error::DirectoryUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// SPDX-License-Identifier: Apache-2.0

//! Durable read position.
//!
//! An [`OffsetRecord`] names the file that was last read (by display name and by
//! platform identity), how many lines of it have been consumed, and the file's
//! modification time when it was last read. It is encoded as a single line:
//!
//! ```text
//! app.log$1835017$42$1700000000000
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::receivers::tail::input::FileId;

/// Field separator in the encoded form. Not expected to appear in log file names.
pub const OFFSET_DELIMITER: char = '$';

/// Encoded identity used when the platform could not resolve one.
pub const UNKNOWN_IDENTITY: i64 = -1;

const FIELD_COUNT: usize = 4;

/// Reasons an encoded offset record is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OffsetParseError {
    #[error("expected 4 fields separated by '$', found {found}")]
    FieldCount { found: usize },

    #[error("field '{field}' is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Where reading should resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetRecord {
    file_name: String,
    identity: Option<FileId>,
    line_offset: u64,
    modified_time: i64,
}

impl OffsetRecord {
    pub fn new(
        file_name: impl Into<String>,
        identity: Option<FileId>,
        line_offset: u64,
        modified_time: i64,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            identity,
            line_offset,
            modified_time,
        }
    }

    /// Last known display name of the tracked file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Platform identity of the tracked file, if it was resolvable.
    pub fn identity(&self) -> Option<FileId> {
        self.identity
    }

    /// Number of lines already consumed from the start of the file.
    pub fn line_offset(&self) -> u64 {
        self.line_offset
    }

    /// Modification time of the file at last read, in epoch milliseconds.
    pub fn modified_time(&self) -> i64 {
        self.modified_time
    }

    /// Canonical single-line encoding.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OffsetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = OFFSET_DELIMITER;
        write!(f, "{}{d}", self.file_name)?;
        match self.identity {
            Some(id) => write!(f, "{}", id.get())?,
            None => write!(f, "{}", UNKNOWN_IDENTITY)?,
        }
        write!(f, "{d}{}{d}{}", self.line_offset, self.modified_time)
    }
}

impl FromStr for OffsetRecord {
    type Err = OffsetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(OFFSET_DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(OffsetParseError::FieldCount {
                found: fields.len(),
            });
        }

        let identity = parse_identity(fields[1])?;
        let line_offset = fields[2]
            .parse::<u64>()
            .map_err(|_| invalid("line_offset", fields[2]))?;
        let modified_time = fields[3]
            .parse::<i64>()
            .map_err(|_| invalid("modified_time", fields[3]))?;

        Ok(Self {
            file_name: fields[0].to_string(),
            identity,
            line_offset,
            modified_time,
        })
    }
}

fn parse_identity(value: &str) -> Result<Option<FileId>, OffsetParseError> {
    if value == UNKNOWN_IDENTITY.to_string() {
        return Ok(None);
    }
    value
        .parse::<u64>()
        .map(|id| Some(FileId::new(id)))
        .map_err(|_| invalid("identity", value))
}

fn invalid(field: &'static str, value: &str) -> OffsetParseError {
    OffsetParseError::InvalidNumber {
        field,
        value: value.to_string(),
    }
}

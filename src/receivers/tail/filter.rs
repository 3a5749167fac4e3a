// SPDX-License-Identifier: Apache-2.0

use regex::Regex;

use crate::receivers::tail::error::{Error, Result};

/// Compile `pattern` so that it only matches a whole string.
pub fn full_match_regex(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| Error::Regex(format!("invalid pattern {:?}: {}", pattern, e)))
}

/// Decides which lines become records.
///
/// A line is kept when it fully matches the filter pattern and does not fully match
/// the ignore pattern. Rejected lines are still consumed by the reader.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    filter: Regex,
    ignore: Regex,
}

impl ContentFilter {
    pub fn new(filter_pattern: &str, ignore_pattern: &str) -> Result<Self> {
        Ok(Self {
            filter: full_match_regex(filter_pattern)?,
            ignore: full_match_regex(ignore_pattern)?,
        })
    }

    pub fn accepts(&self, line: &str) -> bool {
        self.filter.is_match(line) && !self.ignore.is_match(line)
    }
}

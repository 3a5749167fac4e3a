// SPDX-License-Identifier: Apache-2.0

//! Configuration for the tail receiver.

use std::path::PathBuf;
use std::time::Duration;

use crate::receivers::tail::filter::full_match_regex;

/// Name of the file holding the persisted offset inside `offset_dir`.
pub const OFFSET_FILE_NAME: &str = "offset";

/// Configuration for the tail receiver
#[derive(Debug, Clone)]
pub struct TailConfig {
    /// Directory whose files are tailed
    pub directory: PathBuf,
    /// Directory holding the persisted offset file
    pub offset_dir: PathBuf,
    /// Whether offsets are persisted and restored across restarts
    pub save_offsets: bool,
    /// Maximum number of lines read per poll
    pub batch_size: usize,
    /// Delay between scheduled runs
    pub poll_interval: Duration,
    /// File names fully matching this pattern are never tailed
    pub ignore_file_pattern: String,
    /// Lines fully matching this pattern are dropped
    pub ignore_content_pattern: String,
    /// Only lines fully matching this pattern are kept
    pub filter_content_pattern: String,
    /// First delay after the sink rejects a batch
    pub initial_backoff: Duration,
    /// Upper bound for the sink rejection delay
    pub max_backoff: Duration,
    /// First delay once reads keep coming back empty
    pub empty_read_delay: Duration,
    /// Upper bound for the empty read delay
    pub max_empty_read_delay: Duration,
    /// Empty reads tolerated before the empty read delay applies
    pub empty_read_grace: u32,
    /// Lines longer than this many bytes are truncated
    pub max_line_length: usize,
    /// How long the watched directory may stay unreadable before the receiver exits
    pub max_directory_failure: Duration,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            offset_dir: PathBuf::from("/var/lib/reltail"),
            save_offsets: false,
            batch_size: 100,
            poll_interval: Duration::from_millis(300),
            ignore_file_pattern: "^$".to_string(),
            ignore_content_pattern: "^$".to_string(),
            filter_content_pattern: ".*".to_string(),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(4000),
            empty_read_delay: Duration::from_millis(100),
            max_empty_read_delay: Duration::from_millis(500),
            empty_read_grace: 5,
            max_line_length: 1024 * 1024,
            max_directory_failure: Duration::from_secs(60),
        }
    }
}

impl TailConfig {
    /// Location of the persisted offset file.
    pub fn offsets_path(&self) -> PathBuf {
        self.offset_dir.join(OFFSET_FILE_NAME)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.directory.as_os_str().is_empty() {
            return Err("A directory to tail must be specified".to_string());
        }

        if self.save_offsets && self.offset_dir.as_os_str().is_empty() {
            return Err("An offset directory is required when saving offsets".to_string());
        }

        if self.batch_size == 0 {
            return Err("batch_size must be positive".to_string());
        }

        if self.poll_interval.is_zero() {
            return Err("poll_interval must be positive".to_string());
        }

        if self.max_backoff < self.initial_backoff {
            return Err("max_backoff must not be less than initial_backoff".to_string());
        }

        if self.max_empty_read_delay < self.empty_read_delay {
            return Err("max_empty_read_delay must not be less than empty_read_delay".to_string());
        }

        if self.max_line_length == 0 {
            return Err("max_line_length must be positive".to_string());
        }

        for (name, pattern) in [
            ("ignore_file_pattern", &self.ignore_file_pattern),
            ("ignore_content_pattern", &self.ignore_content_pattern),
            ("filter_content_pattern", &self.filter_content_pattern),
        ] {
            if let Err(e) = full_match_regex(pattern) {
                return Err(format!("{} is invalid: {}", name, e));
            }
        }

        Ok(())
    }
}

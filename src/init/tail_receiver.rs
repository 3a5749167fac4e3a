// SPDX-License-Identifier: Apache-2.0

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::receivers::tail::config::TailConfig;

#[derive(Debug, Args, Clone)]
pub struct TailReceiverArgs {
    /// Directory whose files are tailed
    #[arg(long, env = "RELTAIL_TAIL_DIRECTORY")]
    pub tail_directory: PathBuf,

    /// Directory holding the offset file
    #[arg(
        long,
        env = "RELTAIL_TAIL_OFFSET_DIR",
        default_value = "/var/lib/reltail"
    )]
    pub tail_offset_dir: PathBuf,

    /// Persist the offset and resume from it on restart
    #[arg(long, env = "RELTAIL_TAIL_SAVE_OFFSETS", default_value = "false")]
    pub tail_save_offsets: bool,

    /// Maximum number of lines read per batch
    #[arg(long, env = "RELTAIL_TAIL_BATCH_SIZE", default_value = "100")]
    pub tail_batch_size: usize,

    /// Delay in milliseconds between reads of the directory
    #[arg(long, env = "RELTAIL_TAIL_POLL_INTERVAL_MS", default_value = "300")]
    pub tail_poll_interval_ms: u64,

    /// File names fully matching this regex are not tailed
    #[arg(long, env = "RELTAIL_TAIL_IGNORE_FILE_PATTERN", default_value = "^$")]
    pub tail_ignore_file_pattern: String,

    /// Lines fully matching this regex are dropped
    #[arg(long, env = "RELTAIL_TAIL_IGNORE_CONTENT_PATTERN", default_value = "^$")]
    pub tail_ignore_content_pattern: String,

    /// Only lines fully matching this regex are kept
    #[arg(long, env = "RELTAIL_TAIL_FILTER_CONTENT_PATTERN", default_value = ".*")]
    pub tail_filter_content_pattern: String,

    /// Maximum delay in milliseconds between retries of a rejected batch
    #[arg(long, env = "RELTAIL_TAIL_MAX_BACKOFF_MS", default_value = "4000")]
    pub tail_max_backoff_ms: u64,

    /// Maximum line size in bytes (longer lines are truncated)
    #[arg(long, env = "RELTAIL_TAIL_MAX_LINE_LENGTH", default_value = "1048576")]
    pub tail_max_line_length: usize,

    /// Maximum duration in milliseconds the directory may stay unreadable before exiting
    #[arg(
        long,
        env = "RELTAIL_TAIL_MAX_DIRECTORY_FAILURE_MS",
        default_value = "60000"
    )]
    pub tail_max_directory_failure_ms: u64,
}

impl TailReceiverArgs {
    /// Build the receiver config from command line args
    pub fn build_config(&self) -> TailConfig {
        TailConfig {
            directory: self.tail_directory.clone(),
            offset_dir: self.tail_offset_dir.clone(),
            save_offsets: self.tail_save_offsets,
            batch_size: self.tail_batch_size,
            poll_interval: Duration::from_millis(self.tail_poll_interval_ms),
            ignore_file_pattern: self.tail_ignore_file_pattern.clone(),
            ignore_content_pattern: self.tail_ignore_content_pattern.clone(),
            filter_content_pattern: self.tail_filter_content_pattern.clone(),
            max_backoff: Duration::from_millis(self.tail_max_backoff_ms),
            max_line_length: self.tail_max_line_length,
            max_directory_failure: Duration::from_millis(self.tail_max_directory_failure_ms),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        tail: TailReceiverArgs,
    }

    #[test]
    fn test_defaults_match_config() {
        let cli = TestCli::try_parse_from(["reltail", "--tail-directory", "/var/log/app"]).unwrap();
        let config = cli.tail.build_config();
        let defaults = TailConfig::default();

        assert_eq!(config.directory, PathBuf::from("/var/log/app"));
        assert_eq!(config.offset_dir, defaults.offset_dir);
        assert_eq!(config.save_offsets, defaults.save_offsets);
        assert_eq!(config.batch_size, defaults.batch_size);
        assert_eq!(config.poll_interval, defaults.poll_interval);
        assert_eq!(config.ignore_file_pattern, defaults.ignore_file_pattern);
        assert_eq!(config.ignore_content_pattern, defaults.ignore_content_pattern);
        assert_eq!(config.filter_content_pattern, defaults.filter_content_pattern);
        assert_eq!(config.max_backoff, defaults.max_backoff);
        assert_eq!(config.max_line_length, defaults.max_line_length);
        assert_eq!(config.max_directory_failure, defaults.max_directory_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags() {
        let cli = TestCli::try_parse_from([
            "reltail",
            "--tail-directory",
            "/logs",
            "--tail-save-offsets",
            "--tail-batch-size",
            "5",
            "--tail-poll-interval-ms",
            "50",
            "--tail-filter-content-pattern",
            "INFO.*",
        ])
        .unwrap();
        let config = cli.tail.build_config();

        assert!(config.save_offsets);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.filter_content_pattern, "INFO.*");
        assert_eq!(config.offsets_path(), PathBuf::from("/var/lib/reltail/offset"));
    }

    #[test]
    fn test_directory_is_required() {
        assert!(TestCli::try_parse_from(["reltail"]).is_err());
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Tail receiver for a directory of rotating log files.
//!
//! The receiver follows one file at a time, reading new lines as they are appended
//! and moving on to the next file once the current one is rotated away. Its position
//! is an [`OffsetRecord`] that names the file, its identity and a line count, so a
//! restart picks up where the last delivered batch ended.
//!
//! Features:
//! - Inode-based file tracking across renames and rotations
//! - Offset persistence for resume after restarts
//! - Full-line regex filtering of file names and content
//! - At-least-once delivery with backoff when the sink pushes back

pub mod backoff;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod input;
pub mod offset;
pub mod persistence;
pub mod receiver;
pub mod sink;

pub use backoff::Backoff;
pub use config::TailConfig;
pub use engine::{PollOutcome, TailEngine};
pub use error::{Error, Result};
pub use filter::ContentFilter;
pub use input::{Bound, Candidate, DirectoryScanner, FileCursor, FileId};
pub use offset::{OffsetParseError, OffsetRecord};
pub use persistence::{OffsetStore, TextFileOffsetStore};
pub use receiver::{CycleReport, ScheduleState, TailCounters, TailReceiver, TailWorker};
pub use sink::{ChannelSink, Delivery, Sink, WriterSink};

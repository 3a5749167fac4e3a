// SPDX-License-Identifier: Apache-2.0

//! The resumption algorithm: one poll cycle over the watched directory.
//!
//! The engine keeps at most one open file. Each poll reconciles that file against
//! the directory as it is on disk now, reads the next batch of lines, and reports
//! where the next poll should resume. Rotation is noticed in two ways: the tracked
//! name now resolves to a different file, or a file modified after the tracked one
//! has appeared.

use tracing::{debug, info, warn};

use crate::receivers::tail::config::TailConfig;
use crate::receivers::tail::error::Result;
use crate::receivers::tail::filter::ContentFilter;
use crate::receivers::tail::input::{Bound, Candidate, DirectoryScanner, FileCursor, FileId};
use crate::receivers::tail::offset::OffsetRecord;

/// Result of one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Lines that passed the content filters, in file order
    pub records: Vec<String>,
    /// Where the next poll resumes, absent when the cycle made no progress
    pub offset: Option<OffsetRecord>,
}

impl PollOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    fn new(records: Vec<String>, offset: OffsetRecord) -> Self {
        Self {
            records,
            offset: Some(offset),
        }
    }
}

/// The open file plus what was known about it when it was last read.
#[derive(Debug)]
struct TrackedFile {
    cursor: FileCursor,
    identity: Option<FileId>,
    /// Modification time snapshot, epoch millis
    modified: i64,
}

impl TrackedFile {
    fn new(cursor: FileCursor, identity: Option<FileId>, modified: i64) -> Self {
        Self {
            cursor,
            identity,
            modified,
        }
    }

    /// Adopt a freshly opened cursor, reading identity and mtime from its handle.
    fn open(cursor: FileCursor, listed_modified: i64) -> Self {
        let identity = match cursor.file_id() {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(path = ?cursor.path(), error = %e, "Unable to resolve FileId");
                None
            }
        };
        let modified = cursor.modified_millis().unwrap_or(listed_modified);
        Self::new(cursor, identity, modified)
    }

    fn refresh_modified(&mut self) {
        match self.cursor.modified_millis() {
            Ok(modified) => self.modified = modified,
            Err(e) => {
                debug!(
                    path = ?self.cursor.path(),
                    error = %e,
                    "Unable to refresh modification time"
                )
            }
        }
    }

    fn record(&self) -> OffsetRecord {
        OffsetRecord::new(
            self.cursor.name(),
            self.identity,
            self.cursor.line(),
            self.modified,
        )
    }
}

/// TailEngine reads a directory of rotating log files one batch at a time.
///
/// A non-empty batch must be acknowledged with [`TailEngine::commit`] before the
/// engine reads anything else, so a rejected batch can be retried as is.
#[derive(Debug)]
pub struct TailEngine {
    scanner: DirectoryScanner,
    filter: ContentFilter,
    max_line_length: usize,
    current: Option<TrackedFile>,
    pending_delivery: bool,
}

impl TailEngine {
    pub fn new(config: &TailConfig) -> Result<Self> {
        let scanner = DirectoryScanner::new(config.directory.clone(), &config.ignore_file_pattern)?;
        let filter = ContentFilter::new(
            &config.filter_content_pattern,
            &config.ignore_content_pattern,
        )?;
        Ok(Self::with_parts(scanner, filter, config.max_line_length))
    }

    pub fn with_parts(
        scanner: DirectoryScanner,
        filter: ContentFilter,
        max_line_length: usize,
    ) -> Self {
        Self {
            scanner,
            filter,
            max_line_length,
            current: None,
            pending_delivery: false,
        }
    }

    /// Read up to `batch_size` lines.
    ///
    /// `last` is the most recent offset the caller holds. It is only consulted when
    /// the engine has no open file, which happens on start and after the tracked
    /// file was replaced under its name. Errors are returned only when the watched
    /// directory itself cannot be listed; anything wrong with a single file ends the
    /// cycle empty and is retried on the next poll.
    pub fn poll(&mut self, batch_size: usize, last: Option<&OffsetRecord>) -> Result<PollOutcome> {
        if self.pending_delivery {
            debug!("Previous batch not committed yet, skipping read");
            return Ok(PollOutcome::empty());
        }

        if self.current.is_none() {
            let tracked = match last {
                None => self.bootstrap()?,
                Some(record) => self.resume(record)?,
            };
            match tracked {
                Some(tracked) => self.current = Some(tracked),
                None => return Ok(PollOutcome::empty()),
            }
        } else if !self.revalidate() {
            return Ok(PollOutcome::empty());
        }

        let outcome = self.read_batch(batch_size)?;
        if !outcome.records.is_empty() {
            self.pending_delivery = true;
        }
        Ok(outcome)
    }

    /// Acknowledge the last batch. Calling it with nothing outstanding is a no-op.
    pub fn commit(&mut self) {
        self.pending_delivery = false;
    }

    /// Whether a returned batch is still waiting for [`TailEngine::commit`].
    pub fn is_pending(&self) -> bool {
        self.pending_delivery
    }

    /// Position of the open file, if any.
    pub fn position(&self) -> Option<OffsetRecord> {
        self.current.as_ref().map(TrackedFile::record)
    }

    /// Release the open file and drop any uncommitted batch. The next poll resumes
    /// from the offset the caller passes in.
    pub fn close(&mut self) {
        self.pending_delivery = false;
        if let Some(tracked) = self.current.take() {
            debug!(path = ?tracked.cursor.path(), "Closing tracked file");
        }
    }

    /// First run: start at the end of the newest file so history is not replayed.
    fn bootstrap(&self) -> Result<Option<TrackedFile>> {
        let candidate = match self.scanner.newest()? {
            Some(candidate) => candidate,
            None => {
                debug!(directory = ?self.scanner.directory(), "No files to tail yet");
                return Ok(None);
            }
        };
        let mut cursor = match self.scanner.open(&candidate, self.max_line_length) {
            Some(cursor) => cursor,
            None => return Ok(None),
        };

        match cursor.seek_to_end() {
            Ok(lines) => {
                info!(file = candidate.name(), lines, "Starting at end of newest file");
            }
            Err(e) => {
                warn!(path = ?candidate.path(), error = %e, "Failed to seek to end of file");
                return Ok(None);
            }
        }
        Ok(Some(TrackedFile::open(cursor, candidate.modified())))
    }

    /// Restart from a saved offset: find the file by identity, or else the oldest
    /// file modified no earlier than the saved snapshot.
    fn resume(&self, record: &OffsetRecord) -> Result<Option<TrackedFile>> {
        if let Some(id) = record.identity() {
            if let Some(candidate) = self.scanner.by_identity(id)? {
                debug!(file = candidate.name(), identity = %id, "Found tracked file by identity");
                return Ok(self.open_at(&candidate, record.line_offset(), Some(id)));
            }
        }

        let candidate = match self
            .scanner
            .oldest_after(record.modified_time(), Bound::Inclusive)?
        {
            Some(candidate) => candidate,
            None => {
                debug!(file = record.file_name(), "No file to resume from yet");
                return Ok(None);
            }
        };

        if candidate.name() == record.file_name() {
            debug!(file = candidate.name(), "Identity changed, continuing same file by name");
            Ok(self.open_at(&candidate, record.line_offset(), None))
        } else {
            warn!(
                previous = record.file_name(),
                file = candidate.name(),
                "Tracked file is gone, reading successor from the start"
            );
            Ok(self.open_at(&candidate, 0, None))
        }
    }

    /// Open `candidate` and skip `line` lines. `identity` overrides the one read
    /// from the handle.
    fn open_at(
        &self,
        candidate: &Candidate,
        line: u64,
        identity: Option<FileId>,
    ) -> Option<TrackedFile> {
        let mut cursor = self.scanner.open(candidate, self.max_line_length)?;
        match cursor.seek_to_line(line) {
            Ok(skipped) if skipped < line => {
                debug!(
                    file = candidate.name(),
                    expected = line,
                    skipped,
                    "File shorter than saved offset"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(path = ?candidate.path(), error = %e, "Failed to seek in file");
                return None;
            }
        }

        let mut tracked = TrackedFile::open(cursor, candidate.modified());
        if identity.is_some() {
            tracked.identity = identity;
        }
        Some(tracked)
    }

    /// Check that the tracked name still refers to the open file. Drops the file and
    /// returns false when it does not.
    fn revalidate(&mut self) -> bool {
        let Some(tracked) = self.current.as_ref() else {
            return false;
        };

        let on_disk = self.scanner.identity_of(tracked.cursor.name());
        if on_disk == tracked.identity {
            return true;
        }

        info!(
            file = tracked.cursor.name(),
            tracked = ?tracked.identity,
            on_disk = ?on_disk,
            "File was replaced under its name, searching again"
        );
        self.current = None;
        false
    }

    fn read_batch(&mut self, batch_size: usize) -> Result<PollOutcome> {
        let Some(tracked) = self.current.as_mut() else {
            return Ok(PollOutcome::empty());
        };

        // A still growing file advances its own mtime and must not count as its successor
        let newer = self
            .scanner
            .oldest_after(tracked.modified, Bound::Exclusive)?
            .filter(|candidate| candidate.name() != tracked.cursor.name());
        let draining = newer.is_some();

        let mut records = Vec::new();
        let mut reached_end = false;
        for _ in 0..batch_size {
            match tracked.cursor.read_line(draining) {
                Ok(Some(line)) => {
                    if self.filter.accepts(&line) {
                        records.push(line);
                    }
                }
                Ok(None) => {
                    reached_end = true;
                    break;
                }
                Err(e) => {
                    warn!(path = ?tracked.cursor.path(), error = %e, "Failed to read file");
                    self.current = None;
                    return Ok(PollOutcome::empty());
                }
            }
        }

        if let (Some(next), true) = (newer, reached_end) {
            if let Some(cursor) = self.scanner.open(&next, self.max_line_length) {
                info!(
                    from = tracked.cursor.name(),
                    lines = tracked.cursor.line(),
                    to = next.name(),
                    "Finished file, switching to newer file"
                );
                let handoff = TrackedFile::open(cursor, next.modified());
                let offset = handoff.record();
                self.current = Some(handoff);
                return Ok(PollOutcome::new(records, offset));
            }
        }

        tracked.refresh_modified();
        Ok(PollOutcome::new(records, tracked.record()))
    }
}

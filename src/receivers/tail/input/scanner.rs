// SPDX-License-Identifier: Apache-2.0

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use super::cursor::{FileCursor, epoch_millis};
use super::file_id::FileId;
use crate::receivers::tail::error::{Error, Result};
use crate::receivers::tail::filter::full_match_regex;

/// Prefix marking hidden files, which are never tailed.
const HIDDEN_PREFIX: char = '.';

/// How a modification time threshold treats files modified exactly at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Files modified at the threshold qualify
    Inclusive,
    /// Only files modified after the threshold qualify
    Exclusive,
}

/// An eligible file in the watched directory, as seen by one listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    path: PathBuf,
    name: String,
    modified: i64,
}

impl Candidate {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modification time at listing, in epoch milliseconds.
    pub fn modified(&self) -> i64 {
        self.modified
    }
}

/// Orders candidates by modification time, then by reverse name, so that the
/// maximum is the newest file and ties go to the lexicographically smallest name.
fn newer_first(a: &Candidate, b: &Candidate) -> Ordering {
    a.modified
        .cmp(&b.modified)
        .then_with(|| b.name.cmp(&a.name))
}

/// Orders candidates by modification time, then by name.
fn older_first(a: &Candidate, b: &Candidate) -> Ordering {
    a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name))
}

/// DirectoryScanner lists the files eligible for tailing in one directory.
///
/// Every query lists the directory again. Rotation is detected by comparing what is
/// on disk now with what was tracked, so listings are never cached.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    directory: PathBuf,
    ignore: Regex,
}

impl DirectoryScanner {
    /// Create a scanner ignoring file names that fully match `ignore_pattern`.
    pub fn new(directory: impl Into<PathBuf>, ignore_pattern: &str) -> Result<Self> {
        Ok(Self {
            directory: directory.into(),
            ignore: full_match_regex(ignore_pattern)?,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// List eligible files: regular files that are neither hidden nor ignored.
    pub fn candidates(&self) -> Result<Vec<Candidate>> {
        let entries = fs::read_dir(&self.directory).map_err(|e| Error::DirectoryUnavailable {
            path: self.directory.clone(),
            source: e,
        })?;

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        directory = ?self.directory,
                        error = %e,
                        "Failed to read directory entry"
                    );
                    continue;
                }
            };

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    debug!(name = ?name, "Skipping file with non UTF-8 name");
                    continue;
                }
            };
            if name.starts_with(HIDDEN_PREFIX) || self.ignore.is_match(&name) {
                continue;
            }

            let path = entry.path();
            // Follows symlinks, a link to a regular file is tailed like the file
            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to stat file, skipping");
                    continue;
                }
            };
            if metadata.is_dir() {
                continue;
            }
            let modified = match metadata.modified() {
                Ok(t) => epoch_millis(t),
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to read modification time, skipping");
                    continue;
                }
            };

            candidates.push(Candidate {
                path,
                name,
                modified,
            });
        }

        Ok(candidates)
    }

    /// The most recently modified file. Ties go to the smallest name.
    pub fn newest(&self) -> Result<Option<Candidate>> {
        Ok(self.candidates()?.into_iter().max_by(newer_first))
    }

    /// The least recently modified file whose modification time is at (when
    /// inclusive) or after `threshold`. Ties go to the smallest name.
    pub fn oldest_after(&self, threshold: i64, bound: Bound) -> Result<Option<Candidate>> {
        Ok(self
            .candidates()?
            .into_iter()
            .filter(|c| match bound {
                Bound::Inclusive => c.modified >= threshold,
                Bound::Exclusive => c.modified > threshold,
            })
            .min_by(older_first))
    }

    /// The file whose identity is `id`, if it is still in the directory.
    pub fn by_identity(&self, id: FileId) -> Result<Option<Candidate>> {
        for candidate in self.candidates()? {
            match FileId::from_path(&candidate.path) {
                Ok(candidate_id) if candidate_id == id => return Ok(Some(candidate)),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = ?candidate.path, error = %e, "Failed to get FileId, skipping");
                }
            }
        }
        Ok(None)
    }

    /// Identity of the file currently named `name`, or `None` if it cannot be
    /// resolved (deleted, unreadable, or unsupported by the platform).
    pub fn identity_of(&self, name: &str) -> Option<FileId> {
        let path = self.directory.join(name);
        match FileId::from_path(&path) {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(path = ?path, error = %e, "Failed to resolve FileId");
                None
            }
        }
    }

    /// Open a cursor on a candidate. Returns `None` if the file vanished or cannot be
    /// read; the caller retries on a later poll.
    pub fn open(&self, candidate: &Candidate, max_line_length: usize) -> Option<FileCursor> {
        match FileCursor::open(&candidate.path, max_line_length) {
            Ok(cursor) => Some(cursor),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = ?candidate.path, "File disappeared before it could be opened");
                None
            }
            Err(e) => {
                warn!(path = ?candidate.path, error = %e, "Failed to open file");
                None
            }
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Offset stored as one line in a text file, written with temp-file-then-rename.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::receivers::tail::error::{Error, Result};
use crate::receivers::tail::offset::OffsetRecord;
use crate::receivers::tail::persistence::OffsetStore;

/// Stores the offset in a single file.
#[derive(Debug, Clone)]
pub struct TextFileOffsetStore {
    path: PathBuf,
}

impl TextFileOffsetStore {
    /// Use the file at `path`. Its parent directory is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OffsetStore for TextFileOffsetStore {
    fn load(&self) -> Result<Option<OffsetRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No saved offset");
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "failed to read offset file {:?}: {}",
                    self.path, e
                )));
            }
        };

        let line = content
            .lines()
            .next()
            .unwrap_or("")
            .trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(line.parse()?))
    }

    fn save(&mut self, record: &OffsetRecord) -> Result<()> {
        atomic_write(&self.path, &record.encode())
    }
}

/// Atomically write `line` to a file by writing to a temp file and renaming.
fn atomic_write(path: &Path, line: &str) -> Result<()> {
    use portable_atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("failed to create offset directory: {}", e))
            })?;
        }
    }

    // Process ID plus a counter keeps concurrent writers off each other's temp files
    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    let file = File::create(&temp_path)
        .map_err(|e| Error::Persistence(format!("failed to create temp file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", line)
        .map_err(|e| Error::Persistence(format!("failed to write offset: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Persistence(format!("failed to flush offset: {}", e)))?;

    // Close the handle before rename
    drop(writer);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::Persistence(format!(
            "failed to rename offset file: {}",
            e
        )));
    }

    Ok(())
}

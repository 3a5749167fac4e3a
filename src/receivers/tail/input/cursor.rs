// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::file_id::FileId;

/// FileCursor reads one file line by line and counts the lines it has consumed.
///
/// A line ends with `\n`. The bytes after the last newline form a partial line,
/// which is only consumed when the caller allows it: the active file may still be
/// in the middle of writing it.
pub struct FileCursor {
    /// Path to the file
    path: PathBuf,
    /// File name within the watched directory
    name: String,
    /// Buffered reader over the open handle
    reader: BufReader<File>,
    /// Number of lines consumed since the start of the file
    line: u64,
    /// Byte position of the next unread line
    position: u64,
    /// Maximum length of a returned line in bytes
    max_line_length: usize,
    buf: Vec<u8>,
}

impl FileCursor {
    /// Open a file, positioned at its first line.
    pub fn open(path: impl AsRef<Path>, max_line_length: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path {:?} has no UTF-8 file name", path),
                )
            })?;
        let reader = BufReader::new(File::open(&path)?);

        Ok(Self {
            path,
            name,
            reader,
            line: 0,
            position: 0,
            max_line_length,
            buf: Vec::new(),
        })
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the file name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of lines consumed so far.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// The open handle backing this cursor.
    pub fn file(&self) -> &File {
        self.reader.get_ref()
    }

    /// Identity of the open file.
    pub fn file_id(&self) -> io::Result<FileId> {
        FileId::from_file(self.file())
    }

    /// Current modification time in epoch milliseconds, read from the open handle.
    pub fn modified_millis(&self) -> io::Result<i64> {
        let modified = self.file().metadata()?.modified()?;
        Ok(epoch_millis(modified))
    }

    /// Reopen the file and discard its first `lines` lines.
    ///
    /// Stops early without error when the file is shorter. Returns the number of lines
    /// actually skipped.
    pub fn seek_to_line(&mut self, lines: u64) -> io::Result<u64> {
        self.reopen()?;
        while self.line < lines {
            if self.advance(true)?.is_none() {
                break;
            }
        }
        Ok(self.line)
    }

    /// Reopen the file and consume every complete line. Returns the line count.
    pub fn seek_to_end(&mut self) -> io::Result<u64> {
        self.reopen()?;
        while self.advance(false)?.is_some() {}
        Ok(self.line)
    }

    /// Read the next line, without its terminator.
    ///
    /// Returns `None` at end of file. A trailing partial line is returned only when
    /// `allow_partial` is set; otherwise the cursor stays in front of it.
    pub fn read_line(&mut self, allow_partial: bool) -> io::Result<Option<String>> {
        let len = match self.advance(allow_partial)? {
            Some(len) => len,
            None => return Ok(None),
        };

        let mut bytes = &self.buf[..len];
        if let Some(stripped) = bytes.strip_suffix(b"\n") {
            bytes = stripped;
        }
        if let Some(stripped) = bytes.strip_suffix(b"\r") {
            bytes = stripped;
        }

        let mut line = String::from_utf8_lossy(bytes).into_owned();
        if line.len() > self.max_line_length {
            let mut end = self.max_line_length;
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            line.truncate(end);
        }
        Ok(Some(line))
    }

    fn reopen(&mut self) -> io::Result<()> {
        self.reader = BufReader::new(File::open(&self.path)?);
        self.line = 0;
        self.position = 0;
        Ok(())
    }

    /// Consume one line into `buf`, returning its raw length.
    fn advance(&mut self, allow_partial: bool) -> io::Result<Option<usize>> {
        self.buf.clear();
        let len = self.reader.read_until(b'\n', &mut self.buf)?;
        if len == 0 {
            return Ok(None);
        }

        if self.buf.last() != Some(&b'\n') && !allow_partial {
            // Rewind so the line is read again once the writer finishes it
            self.reader.seek(SeekFrom::Start(self.position))?;
            return Ok(None);
        }

        self.position += len as u64;
        self.line += 1;
        Ok(Some(len))
    }
}

impl std::fmt::Debug for FileCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCursor")
            .field("path", &self.path)
            .field("line", &self.line)
            .field("position", &self.position)
            .finish()
    }
}

/// Convert a timestamp to milliseconds since the Unix epoch (negative before it).
pub fn epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const MAX: usize = 1024;

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn append(path: &Path, content: &str) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
    }

    fn read_all(cursor: &mut FileCursor, allow_partial: bool) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = cursor.read_line(allow_partial).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_cursor_reads_lines_in_order() {
        let file = file_with("line 1\nline 2\nline 3\n");
        let mut cursor = FileCursor::open(file.path(), MAX).unwrap();

        assert_eq!(read_all(&mut cursor, false), vec!["line 1", "line 2", "line 3"]);
        assert_eq!(cursor.line(), 3);
    }

    #[test]
    fn test_seek_to_line() {
        let file = file_with("a\nb\nc\nd\n");
        let mut cursor = FileCursor::open(file.path(), MAX).unwrap();

        assert_eq!(cursor.seek_to_line(2).unwrap(), 2);
        assert_eq!(read_all(&mut cursor, false), vec!["c", "d"]);
    }

    #[test]
    fn test_seek_to_line_past_end_is_silent() {
        let file = file_with("a\nb\n");
        let mut cursor = FileCursor::open(file.path(), MAX).unwrap();

        assert_eq!(cursor.seek_to_line(10).unwrap(), 2);
        assert!(cursor.read_line(true).unwrap().is_none());
    }

    #[test]
    fn test_seek_to_line_rewinds_a_consumed_cursor() {
        let file = file_with("a\nb\nc\n");
        let mut cursor = FileCursor::open(file.path(), MAX).unwrap();
        read_all(&mut cursor, false);

        cursor.seek_to_line(1).unwrap();
        assert_eq!(read_all(&mut cursor, false), vec!["b", "c"]);
    }

    #[test]
    fn test_seek_to_end_counts_lines() {
        let file = file_with("existing 1\nexisting 2\n");
        let mut cursor = FileCursor::open(file.path(), MAX).unwrap();

        assert_eq!(cursor.seek_to_end().unwrap(), 2);
        assert!(cursor.read_line(false).unwrap().is_none());

        append(file.path(), "new\n");
        assert_eq!(cursor.read_line(false).unwrap().as_deref(), Some("new"));
        assert_eq!(cursor.line(), 3);
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let file = file_with("done\nhalf");
        let mut cursor = FileCursor::open(file.path(), MAX).unwrap();

        assert_eq!(read_all(&mut cursor, false), vec!["done"]);
        assert_eq!(cursor.line(), 1);

        append(file.path(), " written\n");
        assert_eq!(read_all(&mut cursor, false), vec!["half written"]);
        assert_eq!(cursor.line(), 2);
    }

    #[test]
    fn test_partial_line_accepted_when_allowed() {
        let file = file_with("done\nlast");
        let mut cursor = FileCursor::open(file.path(), MAX).unwrap();

        assert_eq!(read_all(&mut cursor, true), vec!["done", "last"]);
        assert_eq!(cursor.line(), 2);
    }

    #[test]
    fn test_seek_to_end_leaves_partial_line() {
        let file = file_with("a\nb\npartial");
        let mut cursor = FileCursor::open(file.path(), MAX).unwrap();

        assert_eq!(cursor.seek_to_end().unwrap(), 2);
        append(file.path(), "\n");
        assert_eq!(cursor.read_line(false).unwrap().as_deref(), Some("partial"));
    }

    #[test]
    fn test_crlf_and_empty_lines() {
        let file = file_with("one\r\n\r\ntwo\n");
        let mut cursor = FileCursor::open(file.path(), MAX).unwrap();

        assert_eq!(read_all(&mut cursor, false), vec!["one", "", "two"]);
    }

    #[test]
    fn test_long_lines_are_truncated_on_char_boundary() {
        let file = file_with("ééééé\n");
        // 'é' is two bytes, so five bytes falls inside the third character
        let mut cursor = FileCursor::open(file.path(), 5).unwrap();

        assert_eq!(cursor.read_line(false).unwrap().as_deref(), Some("éé"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"ok\xff\n").unwrap();
        file.flush().unwrap();
        let mut cursor = FileCursor::open(file.path(), MAX).unwrap();

        assert_eq!(cursor.read_line(false).unwrap().as_deref(), Some("ok\u{FFFD}"));
    }

    #[test]
    fn test_modified_millis() {
        let file = file_with("x\n");
        let cursor = FileCursor::open(file.path(), MAX).unwrap();

        let expected = epoch_millis(std::fs::metadata(file.path()).unwrap().modified().unwrap());
        assert_eq!(cursor.modified_millis().unwrap(), expected);
    }

    #[test]
    fn test_epoch_millis_before_epoch() {
        let time = UNIX_EPOCH - Duration::from_millis(1500);
        assert_eq!(epoch_millis(time), -1500);
        assert_eq!(epoch_millis(UNIX_EPOCH + Duration::from_millis(7)), 7);
    }
}

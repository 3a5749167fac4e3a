// SPDX-License-Identifier: Apache-2.0

//! Platform file identity based on inode (Unix) or file index (Windows).
//!
//! The identity survives renames, so a rotated file can be found again under its new
//! name. Deleting a file and creating a new one with the same name yields a different
//! identity.

use std::fs::File;
use std::io;
use std::path::Path;

/// Identifier of a file's underlying storage node, independent of its name.
///
/// All files tailed by one engine live in one directory, so the inode (or file index)
/// alone is unique among them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u64);

impl FileId {
    /// Create a FileId from a raw inode or file index value.
    /// Used for loading persisted state.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw inode (Unix) or file index (Windows).
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Create a FileId from an open file handle.
    #[cfg(unix)]
    pub fn from_file(file: &File) -> io::Result<Self> {
        use std::os::unix::fs::MetadataExt;

        let metadata = file.metadata()?;
        Ok(Self(metadata.ino()))
    }

    /// Create a FileId from an open file handle.
    #[cfg(windows)]
    pub fn from_file(file: &File) -> io::Result<Self> {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Foundation::HANDLE;
        use windows_sys::Win32::Storage::FileSystem::{
            BY_HANDLE_FILE_INFORMATION, GetFileInformationByHandle,
        };

        let handle = file.as_raw_handle() as HANDLE;
        let mut info: BY_HANDLE_FILE_INFORMATION = unsafe { std::mem::zeroed() };

        let result = unsafe { GetFileInformationByHandle(handle, &mut info) };
        if result == 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self(
            ((info.nFileIndexHigh as u64) << 32) | (info.nFileIndexLow as u64),
        ))
    }

    #[cfg(not(any(unix, windows)))]
    pub fn from_file(_file: &File) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "file identity is not available on this platform",
        ))
    }

    /// Create a FileId from a path.
    #[cfg(unix)]
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        use std::os::unix::fs::MetadataExt;

        // stat without opening, so unreadable files still resolve
        let metadata = std::fs::metadata(path)?;
        Ok(Self(metadata.ino()))
    }

    /// Create a FileId from a path by opening the file.
    #[cfg(not(unix))]
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_file(&file)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_file_id_from_file_matches_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();
        file.flush().unwrap();

        let f = file.reopen().unwrap();
        let from_file = FileId::from_file(&f).unwrap();
        let from_path = FileId::from_path(file.path()).unwrap();

        assert_eq!(from_file, from_path);
    }

    #[test]
    fn test_file_id_different_files() {
        let file1 = NamedTempFile::new().unwrap();
        let file2 = NamedTempFile::new().unwrap();

        let id1 = FileId::from_path(file1.path()).unwrap();
        let id2 = FileId::from_path(file2.path()).unwrap();

        assert_ne!(id1, id2);
    }

    #[test]
    fn test_file_id_stable_across_rename() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("app.log");
        let rotated = dir.path().join("app.log.1");
        std::fs::write(&original, "line\n").unwrap();

        let before = FileId::from_path(&original).unwrap();
        std::fs::rename(&original, &rotated).unwrap();
        let after = FileId::from_path(&rotated).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn test_file_id_changes_when_name_is_reused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let rotated = dir.path().join("app.log.1");
        std::fs::write(&path, "old\n").unwrap();
        let old_id = FileId::from_path(&path).unwrap();

        // Keep the old file alive under another name so its inode is not recycled
        std::fs::rename(&path, &rotated).unwrap();
        std::fs::write(&path, "new\n").unwrap();
        let new_id = FileId::from_path(&path).unwrap();

        assert_ne!(old_id, new_id);
    }

    #[test]
    fn test_file_id_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(FileId::from_path(dir.path().join("missing.log")).is_err());
    }

    #[test]
    fn test_file_id_display() {
        assert_eq!(format!("{}", FileId::new(456)), "456");
    }
}

//! Flat directory listing of log files.

use std::fs::{self, DirEntry, ReadDir};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::TallyError;

/// Lazy iterator over the eligible files of one directory.
///
/// Yields regular files only (symlinks are followed) and skips every entry
/// whose name starts with `.`. Subdirectories are not descended into. Order
/// is whatever the filesystem returns.
#[derive(Debug)]
pub struct LogFiles {
    dir: PathBuf,
    entries: ReadDir,
}

/// Start listing `dir`.
///
/// # Errors
///
/// Returns [`TallyError::UnreadableDirectory`] if the directory cannot be
/// opened.
pub fn scan_dir(dir: impl AsRef<Path>) -> Result<LogFiles, TallyError> {
    let dir = dir.as_ref().to_path_buf();
    let entries = fs::read_dir(&dir).map_err(|source| TallyError::UnreadableDirectory {
        path: dir.clone(),
        source,
    })?;
    Ok(LogFiles { dir, entries })
}

impl LogFiles {
    /// The directory being listed.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn unreadable(&self, source: io::Error) -> TallyError {
        TallyError::UnreadableDirectory {
            path: self.dir.clone(),
            source,
        }
    }
}

impl Iterator for LogFiles {
    type Item = Result<PathBuf, TallyError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(source) => return Some(Err(self.unreadable(source))),
            };
            if is_hidden(&entry) {
                continue;
            }
            match is_regular_file(&entry) {
                Ok(true) => return Some(Ok(entry.path())),
                Ok(false) => {}
                Err(source) => return Some(Err(self.unreadable(source))),
            }
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().as_encoded_bytes().first() == Some(&b'.')
}

fn is_regular_file(entry: &DirEntry) -> io::Result<bool> {
    let file_type = entry.file_type()?;
    if file_type.is_symlink() {
        // Dangling or unreadable links are not files.
        return Ok(fs::metadata(entry.path()).is_ok_and(|meta| meta.is_file()));
    }
    Ok(file_type.is_file())
}

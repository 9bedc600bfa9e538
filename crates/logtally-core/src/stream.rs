//! Line-at-a-time record decoding.
//!
//! [`LineStream`] reads one NDJSON log file through a single reused buffer,
//! so memory stays flat no matter how large the file is. Every line is
//! decoded independently; a bad line does not poison the lines after it.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::TallyError;
use crate::record::Record;

/// Lazy, single-pass iterator of [`Record`]s from one file.
///
/// Each item is either a decoded record or a [`TallyError`] naming the file
/// and 1-based line. A blank or whitespace-only line is not a JSON object, so
/// it decodes to [`TallyError::MalformedLine`] like any other bad line.
/// After a read error the stream is exhausted.
#[derive(Debug)]
pub struct LineStream<R> {
    path: PathBuf,
    reader: R,
    buf: Vec<u8>,
    line: u64,
    done: bool,
}

impl LineStream<BufReader<File>> {
    /// Open `path` for streaming.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::UnreadableFile`] if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TallyError> {
        let path = path.into();
        let file = File::open(&path).map_err(|source| TallyError::UnreadableFile {
            path: path.clone(),
            source,
        })?;
        Ok(Self::from_reader(path, BufReader::new(file)))
    }
}

impl<R: BufRead> LineStream<R> {
    /// Stream records out of any buffered reader. `path` is only used to
    /// label errors.
    pub fn from_reader(path: impl Into<PathBuf>, reader: R) -> Self {
        Self {
            path: path.into(),
            reader,
            buf: Vec::with_capacity(256),
            line: 0,
            done: false,
        }
    }

    /// The file this stream reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 1-based number of the line most recently read (0 before the first).
    #[must_use]
    pub const fn line(&self) -> u64 {
        self.line
    }
}

impl<R: BufRead> Iterator for LineStream<R> {
    type Item = Result<Record, TallyError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line += 1;
                    return Some(serde_json::from_slice::<Record>(&self.buf).map_err(|source| {
                        TallyError::MalformedLine {
                            path: self.path.clone(),
                            line: self.line,
                            source,
                        }
                    }));
                }
                Err(source) => {
                    self.done = true;
                    return Some(Err(TallyError::UnreadableFile {
                        path: self.path.clone(),
                        source,
                    }));
                }
            }
        }
        None
    }
}

//! # File Sink
//!
//! Append-only CSV writer bound to one session file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{LoggerError, Result};

/// Session file extension
const FILE_EXTENSION: &str = "csv";

/// Numbered suffixes tried after the plain name is taken
const MAX_NAME_SUFFIX: u32 = 99;

/// Destination the sink writes to
pub trait SinkOutput: Send + std::fmt::Debug {
    /// Write all bytes of one line
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush and persist written data
    fn sync(&mut self) -> io::Result<()>;
}

impl SinkOutput for File {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(self, data)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_data()
    }
}

/// Append-only writer for one session's output file
#[derive(Debug)]
pub struct FileSink {
    output: Box<dyn SinkOutput>,
    /// Absolute or config-relative path of the file
    path: PathBuf,
    /// Lines successfully appended, including the header
    lines_written: u64,
}

impl FileSink {
    /// Create a new `<stem>.csv` inside `dir`
    ///
    /// The directory is created if missing. An existing file is never
    /// reused: when the name is taken, `<stem>_1.csv`, `<stem>_2.csv` and so
    /// on are tried.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::FileCreate`] if the directory or file cannot be
    /// created, or every candidate name is taken
    pub fn create(dir: &Path, stem: &str) -> Result<Self> {
        let mut path = dir.join(format!("{}.{}", stem, FILE_EXTENSION));

        if let Err(source) = fs::create_dir_all(dir) {
            return Err(LoggerError::FileCreate { path, source });
        }

        let mut suffix = 0;
        let file = loop {
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => break file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && suffix < MAX_NAME_SUFFIX => {
                    debug!("{} exists, trying next name", path.display());
                    suffix += 1;
                    path = dir.join(format!("{}_{}.{}", stem, suffix, FILE_EXTENSION));
                }
                Err(source) => return Err(LoggerError::FileCreate { path, source }),
            }
        };

        debug!("Created session file {}", path.display());

        Ok(Self {
            output: Box::new(file),
            path,
            lines_written: 0,
        })
    }

    /// Sink over an arbitrary output, reported under `path`
    #[cfg(test)]
    pub(crate) fn with_output(path: PathBuf, output: Box<dyn SinkOutput>) -> Self {
        Self {
            output,
            path,
            lines_written: 0,
        }
    }

    /// Append one line followed by `\n`
    ///
    /// The line is written with a single `write_all` so concurrent readers
    /// never observe a partial record from this call.
    pub fn append(&mut self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        self.output.write_all(buf.as_bytes())?;
        self.lines_written += 1;
        Ok(())
    }

    /// Append a line, logging instead of returning a failure
    ///
    /// Used for mid-session records: a lost line must not end the session.
    pub fn append_or_warn(&mut self, line: &str) {
        if let Err(e) = self.append(line) {
            warn!("Failed to append record to {}: {}", self.path.display(), e);
        }
    }

    /// Flush buffered data and sync it to disk
    pub fn flush(&mut self) -> io::Result<()> {
        self.output.sync()
    }

    /// Path of the session file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component of the path
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Number of lines appended so far
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

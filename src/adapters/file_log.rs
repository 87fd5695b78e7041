//! Append-only log file adapter.
//!
//! Implements [`LogStorage`] over a regular file opened in append mode,
//! which is how the FAT-formatted SD card is mounted on the board and how
//! the host simulator writes its session log. Prior content is never
//! rewritten. Each `append` writes one complete line; when the write fails
//! partway, the file is cut back to its length before the line so a retry
//! never leaves a torn or duplicated line behind. `flush` pushes the data to
//! the medium with `sync_data`.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::app::ports::{LogStorage, StorageError};

/// File operations the adapter relies on.
pub trait AppendTarget: Write {
    /// Current length in bytes.
    fn byte_len(&self) -> io::Result<u64>;
    /// Cut the file back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    /// Make written data durable.
    fn sync(&mut self) -> io::Result<()>;
}

impl AppendTarget for File {
    fn byte_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

pub struct AppendFile<F = File> {
    file: F,
    path: PathBuf,
}

impl AppendFile {
    /// Open (creating if needed) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("LOG FILE: appending to {}", path.display());
        Ok(Self { file, path })
    }
}

impl<F: AppendTarget> AppendFile<F> {
    /// Wrap an already-open target positioned for appending.
    pub fn from_target(file: F, path: impl Into<PathBuf>) -> Self {
        Self {
            file,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_inner(self) -> F {
        self.file
    }
}

fn map_io(e: &io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => StorageError::Timeout,
        ErrorKind::StorageFull => StorageError::Full,
        _ => StorageError::Io,
    }
}

impl<F: AppendTarget> LogStorage for AppendFile<F> {
    fn append(&mut self, line: &[u8]) -> Result<(), StorageError> {
        let before = self.file.byte_len().map_err(|e| map_io(&e))?;
        let Err(e) = self.file.write_all(line) else {
            return Ok(());
        };
        if let Err(cut) = self.file.truncate(before) {
            error!(
                "LOG FILE: could not remove partial line from {} ({cut})",
                self.path.display()
            );
        }
        Err(map_io(&e))
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.file.flush().map_err(|e| map_io(&e))?;
        self.file.sync().map_err(|e| map_io(&e))
    }
}

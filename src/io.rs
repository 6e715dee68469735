//! Positioned file I/O for the database file
//!
//! The engine keeps exactly one durable artifact: the database file. This
//! backend provides positioned reads and writes plus the sync primitive
//! the commit protocol is built on. An advisory exclusive lock is taken on
//! the file itself at open, so a second process cannot attach to a live
//! database.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt as _;
use std::path::Path;

/// Raw file backend
pub struct FileIo {
    file: File,
    read_only: bool,
}

impl FileIo {
    /// Open or create the database file and take the exclusive lock
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true);
        if !read_only {
            options.write(true).create(true);
        }
        let file = options.open(path.as_ref())?;
        fs2::FileExt::try_lock_exclusive(&file)
            .map_err(|_| Error::Io("database file is locked by another process".into()))?;
        Ok(Self { file, read_only })
    }

    /// Whether this backend refuses writes
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Current file length in bytes
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Read exactly `len` bytes at `offset`
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }

    /// Write all of `data` at `offset`, extending the file as needed
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        self.file.write_all_at(data, offset)?;
        Ok(())
    }

    /// Flush written data to durable storage
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

impl Drop for FileIo {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

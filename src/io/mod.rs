//! Byte sources for program loading.
//!
//! A [`ByteProvider`] is an immutable handle to the raw bytes of an
//! executable image. Sources are read-only and may be streamed from offset 0
//! any number of times (once for MD5, once for SHA-256, once per extraction
//! pass). An optional [`Fsrl`] describes where the bytes came from and may
//! carry precomputed checksums.

pub mod error;
pub mod fsrl;

pub use fsrl::Fsrl;

use crate::io::error::{IoError, Result};
use bytes::Bytes;
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Default ceiling for files opened through [`FileByteProvider`] (1GB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Read-only access to the bytes being loaded.
pub trait ByteProvider: Send + Sync {
    /// Total length of the source in bytes.
    fn len(&self) -> u64;

    /// True when the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes starting at `offset`.
    fn read_bytes(&self, offset: u64, len: u64) -> Result<Bytes>;

    /// Open a stream positioned at `offset` that runs to the end of the source.
    fn input_stream(&self, offset: u64) -> Result<Box<dyn Read + '_>>;

    /// Absolute path of the backing file, if there is one.
    fn absolute_path(&self) -> Option<String>;

    /// Content locator describing the origin of the bytes.
    fn fsrl(&self) -> Option<&Fsrl>;
}

fn check_bounds(offset: u64, len: u64, size: u64) -> Result<(u64, u64)> {
    let end = offset
        .checked_add(len)
        .ok_or(IoError::OutOfBounds { offset, len, size })?;
    if end > size {
        return Err(IoError::OutOfBounds { offset, len, size });
    }
    Ok((offset, end))
}

/// A byte source held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryByteProvider {
    data: Bytes,
    fsrl: Option<Fsrl>,
    path: Option<String>,
}

impl MemoryByteProvider {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            fsrl: None,
            path: None,
        }
    }

    /// Attach a content locator; its path doubles as the absolute path.
    pub fn with_fsrl(mut self, fsrl: Fsrl) -> Self {
        self.path = Some(fsrl.path().to_string());
        self.fsrl = Some(fsrl);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl ByteProvider for MemoryByteProvider {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_bytes(&self, offset: u64, len: u64) -> Result<Bytes> {
        let (start, end) = check_bounds(offset, len, self.len())?;
        Ok(self.data.slice(start as usize..end as usize))
    }

    fn input_stream(&self, offset: u64) -> Result<Box<dyn Read + '_>> {
        let (start, _) = check_bounds(offset, 0, self.len())?;
        Ok(Box::new(Cursor::new(&self.data[start as usize..])))
    }

    fn absolute_path(&self) -> Option<String> {
        self.path.clone()
    }

    fn fsrl(&self) -> Option<&Fsrl> {
        self.fsrl.as_ref()
    }
}

/// A memory-mapped file byte source.
///
/// Files larger than the configured limit are refused at open time. Empty
/// files are not mapped.
#[derive(Debug)]
pub struct FileByteProvider {
    path: PathBuf,
    mmap: Option<Mmap>,
    file_size: u64,
    fsrl: Fsrl,
}

impl FileByteProvider {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_limit(path, DEFAULT_MAX_FILE_SIZE)
    }

    /// Opens and maps a file, refusing anything above `max_file_size` bytes.
    pub fn open_with_limit<P: AsRef<Path>>(path: P, max_file_size: u64) -> Result<Self> {
        let path = std::fs::canonicalize(path.as_ref())?;
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limit = max_file_size,
            "Opening byte source"
        );

        if file_size > max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = max_file_size,
                "File is too large"
            );
            return Err(IoError::FileTooLarge {
                limit: max_file_size,
                found: file_size,
            });
        }

        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: read-only map of a regular file that we keep open for the map's lifetime.
            Some(unsafe { Mmap::map(&file)? })
        };
        // The file may have changed since `metadata`; bounds follow the mapping.
        let file_size = mmap.as_ref().map_or(0, |m| m.len() as u64);

        let fsrl = Fsrl::from_path(path.to_string_lossy());
        Ok(Self {
            path,
            mmap,
            file_size,
            fsrl,
        })
    }

    /// Replace the locator, e.g. with one carrying a precomputed MD5.
    pub fn with_fsrl(mut self, fsrl: Fsrl) -> Self {
        self.fsrl = fsrl;
        self
    }

    fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

impl ByteProvider for FileByteProvider {
    fn len(&self) -> u64 {
        self.file_size
    }

    fn read_bytes(&self, offset: u64, len: u64) -> Result<Bytes> {
        let (start, end) = check_bounds(offset, len, self.file_size)?;
        trace!(path = %self.path.display(), offset = start, len, "Performed read");
        Ok(Bytes::copy_from_slice(&self.data()[start as usize..end as usize]))
    }

    fn input_stream(&self, offset: u64) -> Result<Box<dyn Read + '_>> {
        let (start, _) = check_bounds(offset, 0, self.file_size)?;
        Ok(Box::new(Cursor::new(&self.data()[start as usize..])))
    }

    fn absolute_path(&self) -> Option<String> {
        Some(self.path.to_string_lossy().into_owned())
    }

    fn fsrl(&self) -> Option<&Fsrl> {
        Some(&self.fsrl)
    }
}

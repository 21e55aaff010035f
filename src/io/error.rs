//! Custom error types for the I/O module.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("File size of {found} bytes exceeds the maximum allowed size of {limit} bytes.")]
    FileTooLarge { limit: u64, found: u64 },

    #[error("Read of {len} bytes at offset {offset:#x} is outside a source of {size} bytes.")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("Malformed content locator '{0}'")]
    MalformedLocator(String),

    #[error("An underlying I/O error occurred.")]
    StdIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IoError>;

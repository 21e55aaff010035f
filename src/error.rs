//! Error types for the Hoard program loading framework.
//!
//! This module provides structured error types using thiserror. Most loader
//! operations return [`Result`]; a handful of construction steps swallow
//! specific variants on purpose and report them through a `MessageLog`
//! instead.

use std::error::Error as StdError;
use thiserror::Error;

use crate::io::error::IoError;

/// Main error type for Hoard operations.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The user (or a deadline) cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bounded byte source errors
    #[error("Byte source error: {0}")]
    Source(#[from] IoError),

    /// A file with this name already exists in the destination container
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// The name is not acceptable to the destination container
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Any other storage failure from a destination container
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// A program mutation was attempted outside of a transaction
    #[error("No transaction is open on program '{0}'")]
    NoTransaction(String),

    /// The transaction id does not match the open transaction
    #[error("Transaction {0} is not the current transaction")]
    TransactionMismatch(u64),

    /// The program has been released by its owner
    #[error("Program '{0}' is closed")]
    ProgramClosed(String),

    /// A memory block overlaps existing memory
    #[error("Memory conflict: {0}")]
    MemoryConflict(String),

    /// An address could not be parsed or does not exist in the language
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A range runs past the end of its address space
    #[error("Address overflow: {0}")]
    AddressOverflow(String),

    /// A label name was rejected by the symbol table
    #[error("Invalid symbol name: {0}")]
    InvalidSymbolName(String),

    /// A label with this name already exists at the address
    #[error("Duplicate symbol '{name}' at {address}")]
    DuplicateSymbol { name: String, address: String },

    /// A function body overlaps an existing function
    #[error("Overlapping function at {0}")]
    OverlappingFunction(String),

    /// A load option carries an unusable value
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure raised by a format-specific extraction delegate
    #[error("Extraction failed: {0}")]
    Extraction(#[from] anyhow::Error),
}

/// Result type alias for Hoard operations
pub type Result<T> = std::result::Result<T, LoaderError>;

impl LoaderError {
    /// Build a storage error without an underlying cause.
    pub fn storage(message: impl Into<String>) -> Self {
        LoaderError::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Build a storage error wrapping an underlying cause.
    pub fn storage_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        LoaderError::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// True when this error is the cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoaderError::Cancelled)
    }
}

/// Render an error and every `source()` below it, one per line.
pub fn cause_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}

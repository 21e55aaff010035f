//! Hoard: turns raw byte sources into structured, addressable programs.
//!
//! The crate is organised leaves first:
//! - [`io`] and [`hashing`] read byte sources and establish content identity
//! - [`core`] holds the program model (address spaces, memory, symbols,
//!   functions, transactions)
//! - [`loader`] runs the load protocol on top of a pluggable
//!   [`loader::ProgramLoader`]

/// Configuration for loaders and byte sources
pub mod config;
/// Program model types
pub mod core;
/// Error types
pub mod error;
/// Content hashing
pub mod hashing;
/// Byte sources and content locators
pub mod io;
/// The load protocol
pub mod loader;
/// Tracing setup
pub mod logging;

pub use crate::config::LoaderConfig;
pub use crate::core::program::{Consumer, Program};
pub use crate::error::{LoaderError, Result};
pub use crate::io::{ByteProvider, FileByteProvider, Fsrl, MemoryByteProvider};
pub use crate::loader::{
    load, load_into, BinaryLoader, LoadOption, LoadSpec, LoadedProgram, MessageLog,
    ProgramContainer, ProgramLoader, TaskMonitor,
};

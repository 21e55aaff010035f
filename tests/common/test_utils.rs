//! Shared test utilities for creating temporary files.

use std::io::Write;
use tempfile::NamedTempFile;

/// Creates a temporary file with the given content.
///
/// The file is removed when the returned `NamedTempFile` is dropped.
pub fn create_temp_file(content: &[u8]) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Creates a temporary file of `size` bytes filled with a repeating pattern.
pub fn create_patterned_file(size: usize) -> NamedTempFile {
    let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    create_temp_file(&content)
}

//! Centralized module for content hashing.
//!
//! Program identity is keyed on MD5 and SHA-256 hex digests of the complete
//! byte source. The streaming variants read a source in fixed-size chunks so
//! large mapped images are never copied whole.

use md5::Context;
use sha2::{Digest, Sha256};
use std::io::{self, Read};

use crate::io::ByteProvider;

/// Default read size for streaming digests (64KB).
pub const DEFAULT_HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Computes the SHA-256 digest of the given data and returns it as a hex string.
pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the MD5 digest of the given data and returns it as a hex string.
pub fn md5_digest(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Streams `reader` to exhaustion through SHA-256.
pub fn sha256_reader<R: Read + ?Sized>(reader: &mut R, buffer_size: usize) -> io::Result<String> {
    let mut hasher = Sha256::new();
    pump(reader, buffer_size, |chunk| hasher.update(chunk))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Streams `reader` to exhaustion through MD5.
pub fn md5_reader<R: Read + ?Sized>(reader: &mut R, buffer_size: usize) -> io::Result<String> {
    let mut ctx = Context::new();
    pump(reader, buffer_size, |chunk| ctx.consume(chunk))?;
    Ok(format!("{:x}", ctx.compute()))
}

/// MD5 of a whole byte source, read from offset 0.
pub fn compute_binary_md5(provider: &dyn ByteProvider) -> crate::error::Result<String> {
    let mut stream = provider.input_stream(0)?;
    Ok(md5_reader(stream.as_mut(), DEFAULT_HASH_BUFFER_SIZE)?)
}

/// SHA-256 of a whole byte source, read from offset 0.
pub fn compute_binary_sha256(provider: &dyn ByteProvider) -> crate::error::Result<String> {
    let mut stream = provider.input_stream(0)?;
    Ok(sha256_reader(stream.as_mut(), DEFAULT_HASH_BUFFER_SIZE)?)
}

fn pump<R, F>(reader: &mut R, buffer_size: usize, mut sink: F) -> io::Result<()>
where
    R: Read + ?Sized,
    F: FnMut(&[u8]),
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => sink(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

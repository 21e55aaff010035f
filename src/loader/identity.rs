//! Program creation and content identity.
//!
//! A freshly created program records where its bytes came from and what they
//! hash to. MD5 is taken from the source's content locator when one was
//! precomputed; SHA-256 is always computed over the full source.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::core::address::Address;
use crate::core::language::{CompilerSpec, Language};
use crate::core::program::{info_keys, Consumer, Program};
use crate::error::Result;
use crate::hashing::{compute_binary_md5, compute_binary_sha256};
use crate::io::ByteProvider;

/// Canonical program name: the locator's file name, else `fallback`.
pub fn program_name_from_source(provider: &dyn ByteProvider, fallback: &str) -> String {
    match provider.fsrl() {
        Some(fsrl) => fsrl.name().to_string(),
        None => fallback.to_string(),
    }
}

/// Whether `image_base` can be applied to `program`.
///
/// Segmented bases are never applied, and neither are bases outside the
/// language's default address space. Neither case is an error.
pub fn should_set_image_base(program: &Program, image_base: Option<&Address>) -> bool {
    match image_base {
        None => false,
        Some(base) if base.is_segmented() => false,
        Some(base) => program
            .default_address_space()
            .is_some_and(|space| space.name == base.space && space.kind == base.space_kind),
    }
}

/// Create a program for `provider`, owned by `consumer`.
///
/// Event delivery is left disabled so listeners do not see the program until
/// the caller finishes constructing it.
pub fn create_program(
    provider: &dyn ByteProvider,
    fallback_name: &str,
    image_base: Option<Address>,
    format: Option<&str>,
    language: Arc<Language>,
    compiler_spec: CompilerSpec,
    consumer: &Consumer,
) -> Result<Program> {
    let name = program_name_from_source(provider, fallback_name);
    let mut program = Program::new(name, language, compiler_spec, consumer);
    program.set_events_enabled(false);

    if let Err(e) = initialize_identity(&mut program, provider, image_base, format) {
        program.release(consumer);
        return Err(e);
    }
    debug!(program = %program.name(), "Created program");
    Ok(program)
}

fn initialize_identity(
    program: &mut Program,
    provider: &dyn ByteProvider,
    image_base: Option<Address>,
    format: Option<&str>,
) -> Result<()> {
    let mut tx = program.transaction("Set program properties")?;
    tx.set_commit(true);
    set_program_properties(&mut tx, provider, format)?;
    if should_set_image_base(&tx, image_base.as_ref()) {
        if let Some(base) = image_base {
            tx.set_image_base(base)?;
        }
    } else if let Some(base) = &image_base {
        trace!(%base, "Image base not applied");
    }
    tx.end()
}

/// Record path, format, digests, locator and creation time on `program`.
///
/// Requires an open transaction.
pub fn set_program_properties(
    program: &mut Program,
    provider: &dyn ByteProvider,
    format: Option<&str>,
) -> Result<()> {
    if let Some(path) = provider.absolute_path() {
        program.set_property(info_keys::EXECUTABLE_PATH, path)?;
    }
    if let Some(format) = format {
        program.set_property(info_keys::EXECUTABLE_FORMAT, format)?;
    }

    let fsrl = provider.fsrl();
    let md5 = match fsrl.and_then(|f| f.md5()) {
        Some(precomputed) => {
            trace!(md5 = precomputed, "Reusing precomputed MD5");
            precomputed.to_string()
        }
        None => compute_binary_md5(provider)?,
    };
    if let Some(fsrl) = fsrl {
        let stored = if fsrl.md5().is_none() {
            fsrl.with_md5(md5.as_str())
        } else {
            fsrl.clone()
        };
        program.set_property(info_keys::SOURCE_FSRL, stored.to_string())?;
    }
    program.set_property(info_keys::EXECUTABLE_MD5, md5)?;

    let sha256 = compute_binary_sha256(provider)?;
    program.set_property(info_keys::EXECUTABLE_SHA256, sha256)?;
    program.set_property(info_keys::DATE_CREATED, chrono::Utc::now().to_rfc3339())?;
    Ok(())
}

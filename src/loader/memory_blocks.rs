//! Materialize the memory blocks a target language declares.

use tracing::debug;

use crate::core::address_space::AddressSpace;
use crate::core::language::Language;
use crate::core::program::Program;
use crate::error::{LoaderError, Result};
use crate::loader::message_log::MessageLog;

/// Upper bound on generated overlay block names.
const MAX_OVERLAY_NAMES: u32 = 999;

/// Create every default block of `language` in `program`.
///
/// Each definition is attempted on its own; a conflicting, overflowing or
/// badly addressed definition is logged and skipped. The surrounding
/// transaction always commits.
pub fn create_default_memory_blocks(
    program: &mut Program,
    language: &Language,
    log: &mut MessageLog,
) -> Result<()> {
    if language.default_memory_blocks.is_empty() {
        return Ok(());
    }
    let mut tx = program.transaction("Create default blocks")?;
    tx.set_commit(true);
    for def in &language.default_memory_blocks {
        match def.create_block(&mut tx) {
            Ok(()) => debug!(block = %def.name, "Created default memory block"),
            Err(LoaderError::MemoryConflict(_)) => {
                log.append_msg(format!(
                    "Failed to add language defined memory block due to conflict: {}",
                    def
                ));
            }
            Err(LoaderError::AddressOverflow(reason)) => {
                log.append_msg(format!(
                    "Failed to add language defined memory block due to address error {}",
                    def
                ));
                log.append_msg(format!(" >> {}", reason));
            }
            Err(LoaderError::InvalidAddress(reason)) => {
                log.append_msg(format!(
                    "Failed to add language defined memory block due to invalid address: {}",
                    def
                ));
                log.append_msg(format!(" >> Language definition error: {}", reason));
            }
            Err(e) => return Err(e),
        }
    }
    tx.end()
}

/// Name for a new block in `space`.
///
/// Ordinary blocks take the space name. Overlay blocks take the first
/// `ov<N>` that is not already an address space of the program.
pub fn generate_block_name(program: &Program, is_overlay: bool, space: &AddressSpace) -> String {
    if !is_overlay {
        return space.name.clone();
    }
    (1..=MAX_OVERLAY_NAMES)
        .map(|n| format!("ov{}", n))
        .find(|name| program.address_space(name).is_none())
        .unwrap_or_else(|| format!("ov{}", chrono::Utc::now().timestamp_millis()))
}

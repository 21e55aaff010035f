//! Processor-defined labels.
//!
//! Memory-mapped registers always get a pinned primary label, since p-code
//! may refer to them by address. The language's default symbols are applied
//! only when requested through the load options.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::core::address::Address;
use crate::core::program::Program;
use crate::core::symbol::SymbolSource;
use crate::error::{LoaderError, Result};
use crate::loader::options::{
    boolean_option_value, LoadOption, ANCHOR_LABELS_OPTION_NAME, APPLY_LABELS_OPTION_NAME,
};

/// Apply register labels and, if enabled, default symbols to `program`.
///
/// Label collisions and rejected names are skipped. The analyzed marker is
/// cleared so analysis runs again. The transaction always commits.
pub fn apply_processor_labels(options: &[LoadOption], program: &mut Program) -> Result<()> {
    let language = Arc::clone(program.language());
    let mut tx = program.transaction("Finalize load")?;
    tx.set_commit(true);

    for register in language.registers.iter().filter(|r| r.is_memory_mapped()) {
        create_symbol(&mut tx, &register.name, &register.address, false, true, true)?;
    }

    if boolean_option_value(APPLY_LABELS_OPTION_NAME, options, true) {
        let anchor = boolean_option_value(ANCHOR_LABELS_OPTION_NAME, options, true);
        for info in &language.default_symbols {
            create_symbol(&mut tx, &info.label, &info.address, info.entry, info.primary, anchor)?;
        }
        debug!(
            count = language.default_symbols.len(),
            anchor, "Applied default symbols"
        );
    }

    tx.set_analyzed(false)?;
    tx.end()
}

/// Create an imported label, skipping names the symbol table refuses.
pub fn create_symbol(
    program: &mut Program,
    name: &str,
    address: &Address,
    is_entry: bool,
    is_primary: bool,
    anchor: bool,
) -> Result<()> {
    let table = program.symbol_table_mut()?;
    match table.create_label(address, name, SymbolSource::Imported) {
        Ok(symbol) => symbol.pinned = anchor,
        Err(e @ (LoaderError::DuplicateSymbol { .. } | LoaderError::InvalidSymbolName(_))) => {
            trace!(error = %e, "Label skipped");
            return Ok(());
        }
        Err(e) => return Err(e),
    }
    if is_entry {
        table.add_external_entry_point(address);
    }
    if is_primary {
        table.set_primary(address, name);
    }
    Ok(())
}

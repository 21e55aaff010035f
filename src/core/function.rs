//! Function table.
//!
//! Loaders only ever create placeholder functions: a one-byte body at a known
//! entry that later analysis disassembles and grows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::address::Address;
use crate::core::program::Program;
use crate::core::symbol::SymbolSource;
use crate::error::{LoaderError, Result};

/// A function with a contiguous body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: Option<String>,
    pub entry: Address,
    /// Body length in bytes, starting at `entry`
    pub body_length: u64,
    pub source: SymbolSource,
}

impl Function {
    fn last_offset(&self) -> u64 {
        self.entry.offset + self.body_length.saturating_sub(1)
    }
}

/// Functions keyed by entry address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionTable {
    functions: BTreeMap<Address, Function>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function, rejecting bodies that overlap an existing one.
    pub fn create_function(&mut self, function: Function) -> Result<&Function> {
        if function.body_length == 0 {
            return Err(LoaderError::InvalidAddress(format!(
                "function at {} has an empty body",
                function.entry
            )));
        }
        let overlaps = self.functions.values().any(|f| {
            f.entry.same_space(&function.entry)
                && f.entry.offset <= function.last_offset()
                && function.entry.offset <= f.last_offset()
        });
        if overlaps {
            return Err(LoaderError::OverlappingFunction(function.entry.to_string()));
        }
        let entry = function.entry.clone();
        Ok(self.functions.entry(entry).or_insert(function))
    }

    pub fn function_at(&self, entry: &Address) -> Option<&Function> {
        self.functions.get(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Create a one-byte imported function at `entry` unless one exists there.
///
/// Rejected bodies (overlap, empty) are ignored; only failures of the
/// program itself, such as a missing transaction, are returned.
pub fn mark_as_function(program: &mut Program, name: Option<&str>, entry: &Address) -> Result<()> {
    if program.function_table().function_at(entry).is_some() {
        return Ok(());
    }
    let function = Function {
        name: name.map(str::to_string),
        entry: entry.clone(),
        body_length: 1,
        source: SymbolSource::Imported,
    };
    match program.function_table_mut()?.create_function(function) {
        Ok(_)
        | Err(LoaderError::OverlappingFunction(_))
        | Err(LoaderError::InvalidAddress(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

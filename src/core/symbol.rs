//! Symbol table for labels attached to program addresses.
//!
//! Several labels may share an address; exactly one of them is primary.
//! Pinned labels are marked so later analysis will not move or remove them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::address::Address;
use crate::error::{LoaderError, Result};

/// Namespace used for every label created during loading.
pub const GLOBAL_NAMESPACE: &str = "Global";

/// Symbol source types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolSource {
    /// Generated placeholder name
    Default,
    /// Imported from the binary or the target description
    Imported,
    /// Produced by an analysis pass
    Analysis,
    /// Entered by a user
    UserDefined,
}

impl fmt::Display for SymbolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolSource::Default => write!(f, "Default"),
            SymbolSource::Imported => write!(f, "Imported"),
            SymbolSource::Analysis => write!(f, "Analysis"),
            SymbolSource::UserDefined => write!(f, "UserDefined"),
        }
    }
}

/// A named label at an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub address: Address,
    pub namespace: String,
    pub source: SymbolSource,
    /// Primary label for its address
    pub primary: bool,
    /// Anchored against relocation/removal by later analysis
    pub pinned: bool,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} @ {}", self.namespace, self.name, self.address)?;
        if self.pinned {
            write!(f, " [pinned]")?;
        }
        Ok(())
    }
}

/// Check that a label name is acceptable.
pub fn validate_label_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LoaderError::InvalidSymbolName("label name is empty".to_string()));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(LoaderError::InvalidSymbolName(format!(
            "'{}' contains whitespace or control characters",
            name
        )));
    }
    Ok(())
}

/// Labels keyed by address, plus the set of external entry points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: BTreeMap<Address, Vec<Symbol>>,
    entry_points: BTreeSet<Address>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a label in the global namespace.
    ///
    /// The first label at an address becomes its primary label.
    ///
    /// # Errors
    /// `InvalidSymbolName` for unacceptable names and `DuplicateSymbol` when
    /// the address already carries a label with the same name.
    pub fn create_label(
        &mut self,
        address: &Address,
        name: &str,
        source: SymbolSource,
    ) -> Result<&mut Symbol> {
        validate_label_name(name)?;
        let at = self.symbols.entry(address.clone()).or_default();
        if at.iter().any(|s| s.name == name) {
            return Err(LoaderError::DuplicateSymbol {
                name: name.to_string(),
                address: address.to_string(),
            });
        }
        let primary = at.is_empty();
        let idx = at.len();
        at.push(Symbol {
            name: name.to_string(),
            address: address.clone(),
            namespace: GLOBAL_NAMESPACE.to_string(),
            source,
            primary,
            pinned: false,
        });
        Ok(&mut at[idx])
    }

    /// Make the named label the primary one at its address.
    pub fn set_primary(&mut self, address: &Address, name: &str) -> bool {
        let Some(at) = self.symbols.get_mut(address) else {
            return false;
        };
        if !at.iter().any(|s| s.name == name) {
            return false;
        }
        for s in at.iter_mut() {
            s.primary = s.name == name;
        }
        true
    }

    pub fn set_pinned(&mut self, address: &Address, name: &str, pinned: bool) -> bool {
        match self.symbol_mut(address, name) {
            Some(s) => {
                s.pinned = pinned;
                true
            }
            None => false,
        }
    }

    pub fn add_external_entry_point(&mut self, address: &Address) {
        self.entry_points.insert(address.clone());
    }

    pub fn is_external_entry_point(&self, address: &Address) -> bool {
        self.entry_points.contains(address)
    }

    pub fn external_entry_points(&self) -> impl Iterator<Item = &Address> {
        self.entry_points.iter()
    }

    pub fn primary_symbol(&self, address: &Address) -> Option<&Symbol> {
        self.symbols
            .get(address)
            .and_then(|at| at.iter().find(|s| s.primary))
    }

    pub fn symbols_at(&self, address: &Address) -> &[Symbol] {
        self.symbols.get(address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn symbol(&self, address: &Address, name: &str) -> Option<&Symbol> {
        self.symbols_at(address).iter().find(|s| s.name == name)
    }

    fn symbol_mut(&mut self, address: &Address, name: &str) -> Option<&mut Symbol> {
        self.symbols
            .get_mut(address)
            .and_then(|at| at.iter_mut().find(|s| s.name == name))
    }

    /// All labels with the given name, in address order.
    pub fn symbols_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.iter().filter(move |s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.symbols.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

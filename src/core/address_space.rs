//! AddressSpace types for program loading.
//!
//! This module provides the AddressSpace type that represents named addressing
//! domains declared by a target language, such as ordinary RAM, the register
//! file, constants, scratch (unique) space, and overlays.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressSpaceKind {
    /// Ordinary loaded memory
    Ram,
    /// Processor register file
    Register,
    /// Constant values
    Constant,
    /// Scratch space used by instruction semantics
    Unique,
    /// Stack-relative space
    Stack,
    /// Overlay address space (overlaid on another space)
    Overlay,
    /// Other/custom address space
    Other,
}

impl fmt::Display for AddressSpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressSpaceKind::Ram => "Ram",
            AddressSpaceKind::Register => "Register",
            AddressSpaceKind::Constant => "Constant",
            AddressSpaceKind::Unique => "Unique",
            AddressSpaceKind::Stack => "Stack",
            AddressSpaceKind::Overlay => "Overlay",
            AddressSpaceKind::Other => "Other",
        };
        write!(f, "{}", s)
    }
}

/// A named addressing domain within a program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressSpace {
    /// The name of this address space
    pub name: String,
    /// The kind of address space this represents
    pub kind: AddressSpaceKind,
    /// Width of an offset in this space, in bits (8..=64)
    pub bits: u8,
    /// Parent space for overlays
    #[serde(default)]
    pub base_space: Option<String>,
}

impl AddressSpace {
    /// Create a new AddressSpace.
    ///
    /// # Errors
    /// Returns an error if the name is blank, the width is out of range, or
    /// an overlay has no base space.
    pub fn new(
        name: impl Into<String>,
        kind: AddressSpaceKind,
        bits: u8,
        base_space: Option<String>,
    ) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("name cannot be empty or whitespace".to_string());
        }
        if !(8..=64).contains(&bits) {
            return Err(format!("address width {} is not within 8..=64 bits", bits));
        }
        if kind == AddressSpaceKind::Overlay && base_space.is_none() {
            return Err("overlay address spaces must have a base_space".to_string());
        }
        Ok(AddressSpace {
            name,
            kind,
            bits,
            base_space,
        })
    }

    /// Convenience constructor for an ordinary memory space.
    pub fn ram(name: impl Into<String>, bits: u8) -> Result<Self, String> {
        Self::new(name, AddressSpaceKind::Ram, bits, None)
    }

    /// Convenience constructor for a register space.
    pub fn register(name: impl Into<String>, bits: u8) -> Result<Self, String> {
        Self::new(name, AddressSpaceKind::Register, bits, None)
    }

    /// True for spaces that hold loaded memory (RAM and overlays of it).
    pub fn is_memory_space(&self) -> bool {
        matches!(self.kind, AddressSpaceKind::Ram | AddressSpaceKind::Overlay)
    }

    pub fn is_overlay(&self) -> bool {
        self.kind == AddressSpaceKind::Overlay
    }

    /// Largest valid offset in this space.
    pub fn max_offset(&self) -> u64 {
        if self.bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    /// True when `[offset, offset + length)` fits inside the space.
    pub fn contains_range(&self, offset: u64, length: u64) -> bool {
        if length == 0 {
            return offset <= self.max_offset();
        }
        match offset.checked_add(length - 1) {
            Some(last) => last <= self.max_offset(),
            None => false,
        }
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

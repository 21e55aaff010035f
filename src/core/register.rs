//! Register types for processor registers.
//!
//! Every register declared by a target language has an address. Most live in
//! the register space; memory-mapped registers (common on microcontrollers)
//! live in RAM and receive pinned labels when a program is loaded.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::address::Address;

/// Types of CPU registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterKind {
    /// General purpose registers
    General,
    /// Program counter
    ProgramCounter,
    /// Status/flags registers
    Flags,
    /// Peripheral and special function registers
    Special,
    /// Anything else
    Other,
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterKind::General => write!(f, "General"),
            RegisterKind::ProgramCounter => write!(f, "ProgramCounter"),
            RegisterKind::Flags => write!(f, "Flags"),
            RegisterKind::Special => write!(f, "Special"),
            RegisterKind::Other => write!(f, "Other"),
        }
    }
}

/// CPU register representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    /// Register name (e.g., "r0", "PORTB", "SREG")
    pub name: String,
    /// Size in bits
    pub size: u16,
    /// Type of register
    pub kind: RegisterKind,
    /// Where the register lives
    pub address: Address,
}

impl Register {
    pub fn new(name: impl Into<String>, size: u16, kind: RegisterKind, address: Address) -> Self {
        Self {
            name: name.into(),
            size,
            kind,
            address,
        }
    }

    /// Check if this register is mapped into ordinary memory
    pub fn is_memory_mapped(&self) -> bool {
        self.address.is_memory_address()
    }

    /// Get the size in bytes (rounded up)
    pub fn size_bytes(&self) -> usize {
        (self.size as usize).div_ceil(8)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bits @ {})", self.name, self.size, self.address)
    }
}

//! Target language descriptions.
//!
//! The loader consumes only a narrow slice of a processor definition: its
//! address spaces, registers, default symbols and default memory blocks. A
//! [`Language`] can be built in code or read from JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::address::Address;
use crate::core::address_space::AddressSpace;
use crate::core::memory::MemoryBlockDefinition;
use crate::core::register::{Register, RegisterKind};
use crate::error::{LoaderError, Result};

/// A default symbol declared by the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLabelInfo {
    pub label: String,
    pub address: Address,
    /// Mark the address as an external entry point
    #[serde(default)]
    pub entry: bool,
    /// Make this label primary at its address
    #[serde(default)]
    pub primary: bool,
}

/// Calling-convention / compiler model paired with a language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilerSpec {
    pub id: String,
}

impl CompilerSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for CompilerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// The parts of a processor definition the loader needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: String,
    pub spaces: Vec<AddressSpace>,
    pub default_space: String,
    #[serde(default)]
    pub registers: Vec<Register>,
    #[serde(default)]
    pub default_symbols: Vec<AddressLabelInfo>,
    #[serde(default)]
    pub default_memory_blocks: Vec<MemoryBlockDefinition>,
}

impl Language {
    /// A language with a single default space and nothing else.
    pub fn new(id: impl Into<String>, default_space: AddressSpace) -> Self {
        Self {
            id: id.into(),
            default_space: default_space.name.clone(),
            spaces: vec![default_space],
            registers: Vec::new(),
            default_symbols: Vec::new(),
            default_memory_blocks: Vec::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let lang: Language = serde_json::from_str(json)?;
        if lang.space(&lang.default_space).is_none() {
            return Err(LoaderError::InvalidAddress(format!(
                "default space '{}' is not declared by language '{}'",
                lang.default_space, lang.id
            )));
        }
        Ok(lang)
    }

    pub fn with_space(mut self, space: AddressSpace) -> Self {
        self.spaces.push(space);
        self
    }

    pub fn with_register(
        mut self,
        name: &str,
        size: u16,
        kind: RegisterKind,
        address: &str,
    ) -> Result<Self> {
        let address = self.parse_address(address)?;
        self.registers.push(Register::new(name, size, kind, address));
        Ok(self)
    }

    pub fn with_default_symbol(
        mut self,
        label: &str,
        address: &str,
        entry: bool,
        primary: bool,
    ) -> Result<Self> {
        let address = self.parse_address(address)?;
        self.default_symbols.push(AddressLabelInfo {
            label: label.to_string(),
            address,
            entry,
            primary,
        });
        Ok(self)
    }

    pub fn with_memory_block(mut self, def: MemoryBlockDefinition) -> Self {
        self.default_memory_blocks.push(def);
        self
    }

    pub fn space(&self, name: &str) -> Option<&AddressSpace> {
        self.spaces.iter().find(|s| s.name == name)
    }

    pub fn default_address_space(&self) -> Option<&AddressSpace> {
        self.space(&self.default_space)
    }

    /// Parse `space:offset`, `space:segment:offset` or a bare offset in the
    /// default space. Offsets are hexadecimal with an optional `0x` prefix.
    pub fn parse_address(&self, text: &str) -> Result<Address> {
        let invalid = || LoaderError::InvalidAddress(format!("'{}' in language {}", text, self.id));
        let parts: Vec<&str> = text.trim().split(':').collect();
        let (space_name, segment, offset) = match parts.as_slice() {
            [off] => (self.default_space.as_str(), None, *off),
            [space, off] => (*space, None, *off),
            [space, seg, off] => (*space, Some(*seg), *off),
            _ => return Err(invalid()),
        };
        let space = self.space(space_name).ok_or_else(invalid)?;
        let offset = parse_hex(offset).ok_or_else(invalid)?;
        match segment {
            Some(seg) => {
                let seg = parse_hex(seg)
                    .and_then(|s| u16::try_from(s).ok())
                    .ok_or_else(invalid)?;
                let offset = u16::try_from(offset).map_err(|_| invalid())?;
                Address::segmented(space, seg, offset).map_err(LoaderError::InvalidAddress)
            }
            None => Address::new(space, offset).map_err(LoaderError::InvalidAddress),
        }
    }
}

fn parse_hex(s: &str) -> Option<u64> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

//! Memory blocks and the target-declared default block definitions.
//!
//! A program's [`Memory`] is a set of non-overlapping blocks per address space.
//! Adding a block that overlaps existing memory or runs off the end of its
//! space fails with `MemoryConflict` / `AddressOverflow`; the loader turns
//! those into log messages rather than aborting.

use bitflags::bitflags;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::address::Address;
use crate::core::address_space::{AddressSpace, AddressSpaceKind};
use crate::core::program::Program;
use crate::error::{LoaderError, Result};

bitflags! {
    /// Access permissions of a memory block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Perms: u8 {
        const READ = 1;
        const WRITE = 2;
        const EXECUTE = 4;
    }
}

impl Perms {
    pub fn from_rwx(read: bool, write: bool, execute: bool) -> Self {
        let mut p = Perms::empty();
        p.set(Perms::READ, read);
        p.set(Perms::WRITE, write);
        p.set(Perms::EXECUTE, execute);
        p
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut perms = String::new();
        perms.push(if self.contains(Perms::READ) { 'r' } else { '-' });
        perms.push(if self.contains(Perms::WRITE) { 'w' } else { '-' });
        perms.push(if self.contains(Perms::EXECUTE) { 'x' } else { '-' });
        write!(f, "{}", perms)
    }
}

/// Backing data of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryContents {
    /// No bytes are known
    Uninitialized,
    /// Every byte has the same value
    Filled(u8),
    /// Bytes taken from the source image; length equals the block length
    Bytes(Bytes),
}

/// A contiguous range of program memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    pub name: String,
    pub start: Address,
    pub length: u64,
    pub perms: Perms,
    pub volatile: bool,
    pub overlay: bool,
    pub contents: MemoryContents,
    /// Free-form description of where the block came from
    pub source: String,
}

impl MemoryBlock {
    pub fn is_initialized(&self) -> bool {
        !matches!(self.contents, MemoryContents::Uninitialized)
    }

    /// Offset of the last byte; `length` is never zero for a stored block.
    pub fn end_offset(&self) -> u64 {
        self.start.offset + (self.length - 1)
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.start.same_space(addr)
            && addr.offset >= self.start.offset
            && addr.offset <= self.end_offset()
    }

    fn overlaps(&self, start: &Address, length: u64) -> bool {
        if !self.start.same_space(start) {
            return false;
        }
        let end = start.offset + (length - 1);
        start.offset <= self.end_offset() && self.start.offset <= end
    }

    /// Read one byte; `None` for uninitialized memory.
    pub fn byte_at(&self, addr: &Address) -> Option<u8> {
        if !self.contains(addr) {
            return None;
        }
        match &self.contents {
            MemoryContents::Uninitialized => None,
            MemoryContents::Filled(b) => Some(*b),
            MemoryContents::Bytes(data) => {
                data.get((addr.offset - self.start.offset) as usize).copied()
            }
        }
    }
}

impl fmt::Display for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} +{:#x}] {}",
            self.name, self.start, self.length, self.perms
        )
    }
}

/// All memory blocks of a program, ordered by start address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    blocks: Vec<MemoryBlock>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block after checking it against `space` and existing blocks.
    pub fn add_block(&mut self, space: &AddressSpace, block: MemoryBlock) -> Result<()> {
        if block.length == 0 {
            return Err(LoaderError::AddressOverflow(format!(
                "block '{}' has zero length",
                block.name
            )));
        }
        if !space.contains_range(block.start.offset, block.length) {
            return Err(LoaderError::AddressOverflow(format!(
                "block '{}' at {} with length {:#x} runs past the end of space '{}'",
                block.name, block.start, block.length, space.name
            )));
        }
        if let MemoryContents::Bytes(data) = &block.contents {
            if data.len() as u64 != block.length {
                return Err(LoaderError::InvalidAddress(format!(
                    "block '{}' holds {} bytes but declares length {:#x}",
                    block.name,
                    data.len(),
                    block.length
                )));
            }
        }
        if let Some(existing) = self
            .blocks
            .iter()
            .find(|b| b.overlaps(&block.start, block.length))
        {
            return Err(LoaderError::MemoryConflict(format!(
                "block '{}' overlaps existing block '{}'",
                block.name, existing.name
            )));
        }
        if self.block(&block.name).is_some() {
            return Err(LoaderError::MemoryConflict(format!(
                "a block named '{}' already exists",
                block.name
            )));
        }
        let key = (&block.start.space, block.start.offset);
        let pos = self
            .blocks
            .partition_point(|b| (&b.start.space, b.start.offset) < key);
        self.blocks.insert(pos, block);
        Ok(())
    }

    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    pub fn block(&self, name: &str) -> Option<&MemoryBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Highest end offset of any block in the named space.
    pub fn max_end_offset(&self, space: &str) -> Option<u64> {
        self.blocks
            .iter()
            .filter(|b| b.start.space == space)
            .map(MemoryBlock::end_offset)
            .max()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A memory block the target language expects every program to have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlockDefinition {
    pub name: String,
    /// Textual start address, `space:0xoffset` or a bare offset in the default space
    pub address: String,
    pub length: u64,
    #[serde(default = "default_perms")]
    pub perms: Perms,
    #[serde(default)]
    pub volatile: bool,
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub overlay: bool,
}

fn default_perms() -> Perms {
    Perms::READ
}

impl MemoryBlockDefinition {
    pub fn new(name: impl Into<String>, address: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            length,
            perms: default_perms(),
            volatile: false,
            initialized: false,
            overlay: false,
        }
    }

    /// Create this block in `program`. An open transaction is required.
    ///
    /// # Errors
    /// `InvalidAddress` if the start address does not parse against the
    /// program's language, `MemoryConflict` on overlap, `AddressOverflow` when
    /// the block runs off the end of its space.
    pub fn create_block(&self, program: &mut Program) -> Result<()> {
        let mut start = program.language().parse_address(&self.address)?;
        let mut space = program
            .address_space(&start.space)
            .cloned()
            .ok_or_else(|| LoaderError::InvalidAddress(self.address.clone()))?;

        if self.overlay {
            if program.address_space(&self.name).is_some() {
                return Err(LoaderError::MemoryConflict(format!(
                    "address space '{}' already exists",
                    self.name
                )));
            }
            space = AddressSpace::new(
                self.name.clone(),
                AddressSpaceKind::Overlay,
                space.bits,
                Some(space.name.clone()),
            )
            .map_err(LoaderError::InvalidAddress)?;
            start = Address::new(&space, start.offset).map_err(LoaderError::InvalidAddress)?;
        }

        let block = MemoryBlock {
            name: self.name.clone(),
            start,
            length: self.length,
            perms: self.perms,
            volatile: self.volatile,
            overlay: self.overlay,
            contents: if self.initialized {
                MemoryContents::Filled(0)
            } else {
                MemoryContents::Uninitialized
            },
            source: "Default Block".to_string(),
        };
        program.add_memory_block(space, block)
    }
}

impl fmt::Display for MemoryBlockDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} length={:#x} {}{}",
            self.name,
            self.address,
            self.length,
            self.perms,
            if self.overlay { " overlay" } else { "" }
        )
    }
}

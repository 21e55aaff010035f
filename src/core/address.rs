//! Address types for program loading.
//!
//! An [`Address`] is an offset qualified by the [`AddressSpace`] it lives in.
//! Segmented (`segment:offset`) forms are representable but are treated as
//! opaque by the loader; for example an image base in segmented form is never
//! applied.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::address_space::{AddressSpace, AddressSpaceKind};

/// A location inside a named address space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    /// Name of the owning address space
    pub space: String,
    /// Kind of the owning address space
    pub space_kind: AddressSpaceKind,
    /// The numeric offset within the space
    pub offset: u64,
    /// Width of the owning space in bits
    pub bits: u8,
    /// Segment selector for segmented (real-mode style) addresses
    #[serde(default)]
    pub segment: Option<u16>,
}

impl Address {
    /// Create an address in `space`.
    ///
    /// # Errors
    /// Returns an error if `offset` does not fit in the space.
    pub fn new(space: &AddressSpace, offset: u64) -> Result<Self, String> {
        if offset > space.max_offset() {
            return Err(format!(
                "offset {:#x} exceeds maximum for space '{}' ({:#x})",
                offset,
                space.name,
                space.max_offset()
            ));
        }
        Ok(Address {
            space: space.name.clone(),
            space_kind: space.kind,
            offset,
            bits: space.bits,
            segment: None,
        })
    }

    /// Create a segmented address; the flat offset is `segment * 16 + offset`.
    pub fn segmented(space: &AddressSpace, segment: u16, offset: u16) -> Result<Self, String> {
        let flat = (u64::from(segment) << 4) + u64::from(offset);
        let mut addr = Self::new(space, flat)?;
        addr.segment = Some(segment);
        Ok(addr)
    }

    /// True for addresses in loaded memory, as opposed to registers,
    /// constants, or other special spaces.
    pub fn is_memory_address(&self) -> bool {
        matches!(
            self.space_kind,
            AddressSpaceKind::Ram | AddressSpaceKind::Overlay
        )
    }

    pub fn is_segmented(&self) -> bool {
        self.segment.is_some()
    }

    fn max_offset(&self) -> u64 {
        if self.bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    /// Add an offset to this address, failing on overflow of the space.
    pub fn add(&self, delta: u64) -> Result<Self, String> {
        let offset = self
            .offset
            .checked_add(delta)
            .filter(|o| *o <= self.max_offset())
            .ok_or_else(|| format!("{} + {:#x} overflows space '{}'", self, delta, self.space))?;
        Ok(Address {
            offset,
            segment: None,
            ..self.clone()
        })
    }

    /// True when both addresses share a space.
    pub fn same_space(&self, other: &Address) -> bool {
        self.space == other.space
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.segment {
            Some(seg) => match self.offset.checked_sub(u64::from(seg) << 4) {
                Some(within) => write!(f, "{}:{:04x}:{:04x}", self.space, seg, within),
                None => write!(f, "{}:{:#x}", self.space, self.offset),
            },
            None => write!(f, "{}:{:#x}", self.space, self.offset),
        }
    }
}

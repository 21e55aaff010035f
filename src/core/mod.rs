//! Core data types for Hoard program loading.
//!
//! This module contains the program model that loaders populate: address
//! spaces and addresses, the target language description, memory, symbols,
//! functions and the transactional [`program::Program`] itself.

pub mod address;
pub mod address_space;
pub mod function;
pub mod language;
pub mod memory;
pub mod program;
pub mod register;
pub mod symbol;

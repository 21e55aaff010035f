//! Resolved load specifications.

use std::fmt;
use std::sync::Arc;

use crate::core::language::{CompilerSpec, Language};

/// Pairing of a target language with a compiler model.
///
/// An incomplete spec (the language or compiler could not be fully resolved)
/// makes every load a no-op.
#[derive(Debug, Clone)]
pub struct LoadSpec {
    pub language: Arc<Language>,
    pub compiler_spec: CompilerSpec,
    pub complete: bool,
}

impl LoadSpec {
    pub fn new(language: Arc<Language>, compiler_spec: CompilerSpec) -> Self {
        Self {
            language,
            compiler_spec,
            complete: true,
        }
    }

    /// A spec that was only partially resolved.
    pub fn incomplete(language: Arc<Language>, compiler_spec: CompilerSpec) -> Self {
        Self {
            complete: false,
            ..Self::new(language, compiler_spec)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl fmt::Display for LoadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.language.id, self.compiler_spec.id)?;
        if !self.complete {
            write!(f, " (incomplete)")?;
        }
        Ok(())
    }
}

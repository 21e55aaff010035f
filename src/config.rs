//! Configuration for the loader framework.
//!
//! Every section has working defaults, so a configuration file only needs
//! to name the values it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::io::DEFAULT_MAX_FILE_SIZE;
use crate::loader::options::COMMAND_LINE_ARG_PREFIX;

/// Master configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Byte source limits.
    pub io: IoConfig,
    /// Command-line naming of loader options.
    pub naming: NamingConfig,
    /// Defaults for the processor label options.
    pub labels: LabelConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Largest file a file-backed byte source will map.
    pub max_file_size: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub command_line_arg_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            command_line_arg_prefix: COMMAND_LINE_ARG_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Default of "Apply Processor Defined Labels".
    pub apply_by_default: bool,
    /// Default of "Anchor Processor Defined Labels".
    pub anchor_by_default: bool,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            apply_by_default: false,
            anchor_by_default: true,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

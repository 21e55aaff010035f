//! Load options recognized by every program loader.
//!
//! Two boolean options control processor-defined labels. Options with other
//! names pass through untouched for the format-specific loader to interpret.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LoaderError, Result};

pub const APPLY_LABELS_OPTION_NAME: &str = "Apply Processor Defined Labels";
pub const ANCHOR_LABELS_OPTION_NAME: &str = "Anchor Processor Defined Labels";

/// Prefix shared by every loader command-line argument.
pub const COMMAND_LINE_ARG_PREFIX: &str = "-loader";

/// Declared type of an option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Bool,
    Int,
    String,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Bool => write!(f, "bool"),
            OptionType::Int => write!(f, "int"),
            OptionType::String => write!(f, "string"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::String(s) => write!(f, "{}", s),
        }
    }
}

/// A named, typed load option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOption {
    pub name: String,
    pub value: OptionValue,
    pub declared_type: OptionType,
    /// Command-line flag, e.g. `-loader-applyLabels`
    #[serde(default)]
    pub arg: Option<String>,
}

impl LoadOption {
    pub fn new(name: impl Into<String>, value: OptionValue, declared_type: OptionType) -> Self {
        Self {
            name: name.into(),
            value,
            declared_type,
            arg: None,
        }
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, OptionValue::Bool(value), OptionType::Bool)
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }
}

/// The two label options with their defaults and command-line flags.
pub fn default_options(apply_labels_by_default: bool, arg_prefix: &str) -> Vec<LoadOption> {
    vec![
        LoadOption::boolean(APPLY_LABELS_OPTION_NAME, apply_labels_by_default)
            .with_arg(format!("{}-applyLabels", arg_prefix)),
        LoadOption::boolean(ANCHOR_LABELS_OPTION_NAME, true)
            .with_arg(format!("{}-anchorLabels", arg_prefix)),
    ]
}

/// Reject recognized options whose declared type is not boolean.
///
/// Returns a descriptive message for the first offending option.
pub fn validate_options(options: &[LoadOption]) -> std::result::Result<(), String> {
    for option in options {
        let recognized =
            option.name == APPLY_LABELS_OPTION_NAME || option.name == ANCHOR_LABELS_OPTION_NAME;
        if recognized && option.declared_type != OptionType::Bool {
            return Err(format!(
                "Invalid type for option: {} - {}",
                option.name, option.declared_type
            ));
        }
    }
    Ok(())
}

/// Value of the named boolean option, or `default` when it is absent or not
/// boolean.
pub fn boolean_option_value(name: &str, options: &[LoadOption], default: bool) -> bool {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_bool())
        .unwrap_or(default)
}

/// Apply `<flag> <value>` pairs from a command line to matching options.
///
/// Arguments not starting with `arg_prefix` are skipped. A prefixed flag that
/// matches no option, or a value that does not parse as the option's
/// declared type, is an error.
pub fn parse_option_args(
    args: &[String],
    options: &mut [LoadOption],
    arg_prefix: &str,
) -> Result<()> {
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        if !flag.starts_with(arg_prefix) {
            continue;
        }
        let option = options
            .iter_mut()
            .find(|o| o.arg.as_deref() == Some(flag.as_str()))
            .ok_or_else(|| {
                LoaderError::InvalidOption(format!("unknown loader argument {}", flag))
            })?;
        let raw = iter
            .next()
            .ok_or_else(|| LoaderError::InvalidOption(format!("{} requires a value", flag)))?;
        option.value = match option.declared_type {
            OptionType::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => OptionValue::Bool(true),
                "false" | "no" | "0" => OptionValue::Bool(false),
                _ => {
                    return Err(LoaderError::InvalidOption(format!(
                        "{} expects a boolean, got '{}'",
                        flag, raw
                    )))
                }
            },
            OptionType::Int => OptionValue::Int(raw.parse().map_err(|_| {
                LoaderError::InvalidOption(format!("{} expects an integer, got '{}'", flag, raw))
            })?),
            OptionType::String => OptionValue::String(raw.clone()),
        };
    }
    Ok(())
}

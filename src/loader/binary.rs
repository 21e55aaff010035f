//! Raw binary loader.
//!
//! Maps the whole byte source as one initialized block in the language's
//! default address space, at an optional base offset. Useful for firmware
//! images and as the reference implementation of [`ProgramLoader`].

use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::core::address::Address;
use crate::core::function::mark_as_function;
use crate::core::memory::{MemoryBlock, MemoryContents, Perms};
use crate::core::program::Program;
use crate::error::{LoaderError, Result};
use crate::io::{ByteProvider, FileByteProvider};
use crate::loader::container::ProgramContainer;
use crate::loader::identity::{create_program, program_name_from_source};
use crate::loader::memory_blocks::{create_default_memory_blocks, generate_block_name};
use crate::loader::message_log::MessageLog;
use crate::loader::monitor::TaskMonitor;
use crate::loader::options::{
    self, boolean_option_value, LoadOption, OptionType, OptionValue, ANCHOR_LABELS_OPTION_NAME,
};
use crate::loader::spec::LoadSpec;
use crate::loader::{LoadRequest, LoadedProgram, ProgramLoader};

pub const BINARY_FORMAT: &str = "Raw Binary";
pub const BASE_ADDRESS_OPTION_NAME: &str = "Base Address";
pub const ENTRY_FUNCTION_OPTION_NAME: &str = "Create Entry Function";

/// Loader for flat images with no container format.
#[derive(Debug, Clone, Default)]
pub struct BinaryLoader {
    config: LoaderConfig,
}

impl BinaryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Open a file as a byte source within the configured size limit.
    pub fn open_source<P: AsRef<Path>>(&self, path: P) -> Result<FileByteProvider> {
        Ok(FileByteProvider::open_with_limit(path, self.config.io.max_file_size)?)
    }

    fn base_offset(options: &[LoadOption]) -> Result<u64> {
        match options.iter().find(|o| o.name == BASE_ADDRESS_OPTION_NAME) {
            None => Ok(0),
            Some(o) => match &o.value {
                OptionValue::Int(v) => u64::try_from(*v).map_err(|_| {
                    LoaderError::InvalidOption(format!("negative base address {}", v))
                }),
                other => Err(LoaderError::InvalidOption(format!(
                    "{} must be an integer, got '{}'",
                    BASE_ADDRESS_OPTION_NAME, other
                ))),
            },
        }
    }

    fn source_block(
        name: String,
        start: Address,
        provider: &dyn ByteProvider,
    ) -> Result<MemoryBlock> {
        let data = provider.read_bytes(0, provider.len())?;
        Ok(MemoryBlock {
            name,
            start,
            length: provider.len(),
            perms: Perms::READ | Perms::WRITE | Perms::EXECUTE,
            volatile: false,
            overlay: false,
            contents: MemoryContents::Bytes(data),
            source: program_source_label(provider),
        })
    }

    fn populate(
        &self,
        program: &mut Program,
        provider: &dyn ByteProvider,
        base_offset: u64,
        options: &[LoadOption],
        log: &mut MessageLog,
    ) -> Result<()> {
        let language = Arc::clone(program.language());
        let space = language
            .default_address_space()
            .cloned()
            .ok_or_else(|| {
                let msg = format!("language {} has no default space", language.id);
                LoaderError::InvalidAddress(msg)
            })?;
        let base = Address::new(&space, base_offset).map_err(LoaderError::InvalidAddress)?;

        program.with_transaction("Load raw binary", |p| {
            if provider.is_empty() {
                log.append_msg("Source is empty; no bytes were loaded");
            } else {
                let name = generate_block_name(p, false, &space);
                let block = Self::source_block(name, base.clone(), provider)?;
                p.add_memory_block(space.clone(), block)?;
            }
            if boolean_option_value(ENTRY_FUNCTION_OPTION_NAME, options, false) {
                mark_as_function(p, Some("entry"), &base)?;
            }
            Ok(())
        })?;
        create_default_memory_blocks(program, &language, log)
    }
}

/// `base`, or `base_<n>` for the first `n` not already naming a block.
fn unique_block_name(program: &Program, base: &str) -> String {
    let memory = program.memory();
    if memory.block(base).is_none() {
        return base.to_string();
    }
    (1u32..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| memory.block(candidate).is_none())
        .unwrap_or_else(|| base.to_string())
}

fn program_source_label(provider: &dyn ByteProvider) -> String {
    match provider.fsrl() {
        Some(fsrl) => fsrl.to_string(),
        None => provider.absolute_path().unwrap_or_else(|| "memory".to_string()),
    }
}

impl ProgramLoader for BinaryLoader {
    fn name(&self) -> &str {
        BINARY_FORMAT
    }

    fn extract(
        &self,
        request: &LoadRequest<'_>,
        folder: Option<&Arc<dyn ProgramContainer>>,
        log: &mut MessageLog,
    ) -> Result<Vec<LoadedProgram>> {
        request.monitor.check_cancelled()?;
        let base_offset = Self::base_offset(request.options)?;
        let language = Arc::clone(&request.load_spec.language);
        let image_base = language
            .default_address_space()
            .and_then(|space| Address::new(space, base_offset).ok());

        let mut program = create_program(
            request.provider,
            request.name,
            image_base,
            Some(BINARY_FORMAT),
            language,
            request.load_spec.compiler_spec.clone(),
            request.consumer,
        )?;
        let populated =
            self.populate(&mut program, request.provider, base_offset, request.options, log);
        if let Err(e) = populated {
            program.release(request.consumer);
            return Err(e);
        }
        debug!(program = %program.name(), blocks = program.memory().len(), "Extracted raw binary");
        Ok(vec![LoadedProgram::new(program, folder.cloned())])
    }

    fn merge_into(
        &self,
        provider: &dyn ByteProvider,
        load_spec: &LoadSpec,
        _options: &[LoadOption],
        log: &mut MessageLog,
        program: &mut Program,
        monitor: &TaskMonitor,
    ) -> Result<bool> {
        monitor.check_cancelled()?;
        if provider.is_empty() {
            log.append_msg("Source is empty; nothing to merge");
            return Ok(false);
        }
        let Some(space) = program.address_space(&load_spec.language.default_space).cloned() else {
            log.append_msg(format!(
                "Program has no '{}' address space",
                load_spec.language.default_space
            ));
            return Ok(false);
        };
        let start = match program.memory().max_end_offset(&space.name) {
            None => Address::new(&space, 0),
            Some(end) => Address::new(&space, end).and_then(|last| last.add(1)),
        };
        let Ok(start) = start else {
            log.append_msg(format!("No room left in space '{}'", space.name));
            return Ok(false);
        };

        let name = unique_block_name(program, &program_name_from_source(provider, "merged"));
        let block = Self::source_block(name, start, provider)?;
        match program.add_memory_block(space, block) {
            Ok(()) => Ok(true),
            Err(e @ (LoaderError::MemoryConflict(_) | LoaderError::AddressOverflow(_))) => {
                log.append_exception(&e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn apply_labels_by_default(&self) -> bool {
        self.config.labels.apply_by_default
    }

    fn default_options(
        &self,
        _provider: &dyn ByteProvider,
        _load_spec: &LoadSpec,
        is_load_into: bool,
    ) -> Vec<LoadOption> {
        let prefix = &self.config.naming.command_line_arg_prefix;
        let mut list = options::default_options(self.apply_labels_by_default(), prefix);
        for option in &mut list {
            if option.name == ANCHOR_LABELS_OPTION_NAME {
                option.value = OptionValue::Bool(self.config.labels.anchor_by_default);
            }
        }
        if !is_load_into {
            list.push(
                LoadOption::new(BASE_ADDRESS_OPTION_NAME, OptionValue::Int(0), OptionType::Int)
                    .with_arg(format!("{}-baseAddr", prefix)),
            );
            list.push(
                LoadOption::boolean(ENTRY_FUNCTION_OPTION_NAME, false)
                    .with_arg(format!("{}-entryFunction", prefix)),
            );
        }
        list
    }

    fn validate_options(
        &self,
        _provider: &dyn ByteProvider,
        _load_spec: &LoadSpec,
        options: &[LoadOption],
    ) -> std::result::Result<(), String> {
        options::validate_options(options)?;
        for option in options {
            let expected = match option.name.as_str() {
                BASE_ADDRESS_OPTION_NAME => OptionType::Int,
                ENTRY_FUNCTION_OPTION_NAME => OptionType::Bool,
                _ => continue,
            };
            if option.declared_type != expected {
                return Err(format!(
                    "Invalid type for option: {} - {}",
                    option.name, option.declared_type
                ));
            }
        }
        Ok(())
    }
}

//! The program load protocol.
//!
//! Format-specific parsing is supplied through the [`ProgramLoader`]
//! capability trait. [`load`] drives a loader over a byte source: it
//! extracts candidate programs, anchors processor labels, saves each program
//! that has a destination, and releases everything it created if the load
//! fails or is cancelled. [`load_into`] merges bytes into an existing program
//! inside a single transaction.

pub mod binary;
pub mod container;
pub mod identity;
pub mod labels;
pub mod memory_blocks;
pub mod message_log;
pub mod monitor;
pub mod namer;
pub mod options;
pub mod spec;

pub use binary::BinaryLoader;
pub use container::{DirectoryContainer, MemoryContainer, ProgramContainer};
pub use identity::create_program;
pub use labels::apply_processor_labels;
pub use memory_blocks::{create_default_memory_blocks, generate_block_name};
pub use message_log::MessageLog;
pub use monitor::TaskMonitor;
pub use namer::create_program_file;
pub use options::{LoadOption, OptionType, OptionValue};
pub use spec::LoadSpec;

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::program::{Consumer, Program};
use crate::error::{LoaderError, Result};
use crate::io::ByteProvider;

/// A constructed program and where it should be saved.
///
/// `destination == None` keeps the program in memory only.
pub struct LoadedProgram {
    pub program: Program,
    pub destination: Option<Arc<dyn ProgramContainer>>,
}

impl LoadedProgram {
    pub fn new(program: Program, destination: Option<Arc<dyn ProgramContainer>>) -> Self {
        Self {
            program,
            destination,
        }
    }
}

impl fmt::Debug for LoadedProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedProgram")
            .field("program", &self.program)
            .field("destination", &self.destination.as_ref().map(|d| d.path()))
            .finish()
    }
}

/// Inputs shared by every extraction call.
#[derive(Clone, Copy)]
pub struct LoadRequest<'a> {
    pub provider: &'a dyn ByteProvider,
    /// Caller-supplied name for the primary program
    pub name: &'a str,
    pub load_spec: &'a LoadSpec,
    pub options: &'a [LoadOption],
    pub consumer: &'a Consumer,
    pub monitor: &'a TaskMonitor,
}

/// A format-specific loader.
pub trait ProgramLoader {
    fn name(&self) -> &str;

    /// Parse the byte source into one or more programs owned by
    /// `request.consumer`. The first program is the primary one.
    fn extract(
        &self,
        request: &LoadRequest<'_>,
        folder: Option<&Arc<dyn ProgramContainer>>,
        log: &mut MessageLog,
    ) -> Result<Vec<LoadedProgram>>;

    /// Add the bytes to an existing program. Runs inside a transaction that
    /// commits only when this returns `Ok(true)`.
    fn merge_into(
        &self,
        provider: &dyn ByteProvider,
        load_spec: &LoadSpec,
        options: &[LoadOption],
        log: &mut MessageLog,
        program: &mut Program,
        monitor: &TaskMonitor,
    ) -> Result<bool>;

    /// Whether the primary program is saved under the caller's name. When
    /// false, programs keep their own names inside a folder named after the
    /// caller's name.
    fn override_primary_name(&self) -> bool {
        true
    }

    fn apply_labels_by_default(&self) -> bool {
        false
    }

    /// Hook run once every candidate has been labelled and saved.
    fn post_load_fixups(
        &self,
        _loaded: &mut [LoadedProgram],
        _options: &[LoadOption],
        _log: &mut MessageLog,
        _monitor: &TaskMonitor,
    ) -> Result<()> {
        Ok(())
    }

    fn default_options(
        &self,
        _provider: &dyn ByteProvider,
        _load_spec: &LoadSpec,
        _is_load_into: bool,
    ) -> Vec<LoadOption> {
        options::default_options(self.apply_labels_by_default(), options::COMMAND_LINE_ARG_PREFIX)
    }

    /// `Err(message)` describing the first unusable option.
    fn validate_options(
        &self,
        _provider: &dyn ByteProvider,
        _load_spec: &LoadSpec,
        options: &[LoadOption],
    ) -> std::result::Result<(), String> {
        options::validate_options(options)
    }
}

/// Releases every program it still holds unless disarmed.
struct ReleaseGuard<'a> {
    loaded: Vec<LoadedProgram>,
    consumer: &'a Consumer,
    armed: bool,
}

impl<'a> ReleaseGuard<'a> {
    fn new(loaded: Vec<LoadedProgram>, consumer: &'a Consumer) -> Self {
        Self {
            loaded,
            consumer,
            armed: true,
        }
    }

    fn disarm(mut self) -> Vec<LoadedProgram> {
        self.armed = false;
        std::mem::take(&mut self.loaded)
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut released = 0;
        for loaded in &mut self.loaded {
            if loaded.program.is_owned_by(self.consumer) {
                loaded.program.release(self.consumer);
                released += 1;
            }
        }
        warn!(released, "Load aborted; released extracted programs");
    }
}

/// Load `provider` with `loader`.
///
/// Returns the programs that were saved, or that had no destination. A
/// program whose save fails is logged, released and left out. Any other
/// failure, including cancellation, releases every extracted program and is
/// returned as an error. An incomplete `load_spec` returns an empty list
/// without touching `folder`.
#[allow(clippy::too_many_arguments)]
pub fn load(
    loader: &dyn ProgramLoader,
    provider: &dyn ByteProvider,
    name: &str,
    folder: Option<Arc<dyn ProgramContainer>>,
    load_spec: &LoadSpec,
    options: &[LoadOption],
    log: &mut MessageLog,
    consumer: &Consumer,
    monitor: &TaskMonitor,
) -> Result<Vec<LoadedProgram>> {
    if !load_spec.is_complete() {
        debug!(loader = loader.name(), spec = %load_spec, "Incomplete load spec; nothing to load");
        return Ok(Vec::new());
    }
    loader
        .validate_options(provider, load_spec, options)
        .map_err(LoaderError::InvalidOption)?;

    let folder = match folder {
        Some(parent) if !loader.override_primary_name() => Some(parent.create_folder_path(name)?),
        other => other,
    };

    let span = crate::span_trace!("load", loader = loader.name(), name);
    let _enter = span.enter();
    info!(spec = %load_spec, "Loading");
    let request = LoadRequest {
        provider,
        name,
        load_spec,
        options,
        consumer,
        monitor,
    };
    let extracted = loader
        .extract(&request, folder.as_ref(), log)
        .map_err(|e| crate::log_error!(e, "extraction"))?;
    let mut guard = ReleaseGuard::new(extracted, consumer);

    let keep = finish_programs(loader, &mut guard.loaded, name, options, log, consumer, monitor)?;
    loader.post_load_fixups(&mut guard.loaded, options, log, monitor)?;

    let results: Vec<LoadedProgram> = guard
        .disarm()
        .into_iter()
        .zip(keep)
        .filter_map(|(loaded, kept)| kept.then_some(loaded))
        .collect();
    info!(count = results.len(), "Load complete");
    Ok(results)
}

/// Label and save each candidate; returns which ones belong in the result.
fn finish_programs(
    loader: &dyn ProgramLoader,
    loaded: &mut [LoadedProgram],
    name: &str,
    options: &[LoadOption],
    log: &mut MessageLog,
    consumer: &Consumer,
    monitor: &TaskMonitor,
) -> Result<Vec<bool>> {
    let total = loaded.len();
    monitor.set_maximum(total as u64);
    let mut keep = Vec::with_capacity(total);
    for (index, candidate) in loaded.iter_mut().enumerate() {
        monitor.check_cancelled()?;
        monitor.set_message(&format!(
            "Finishing {} ({} of {})",
            candidate.program.name(),
            index + 1,
            total
        ));

        apply_processor_labels(options, &mut candidate.program)?;
        candidate.program.set_events_enabled(true);

        let kept = match &candidate.destination {
            None => true,
            Some(destination) => {
                let file_name = if index == 0 && loader.override_primary_name() {
                    name.to_string()
                } else {
                    candidate.program.name().to_string()
                };
                let saved = create_program_file(
                    &candidate.program,
                    destination.as_ref(),
                    &file_name,
                    log,
                    monitor,
                )?;
                if !saved {
                    candidate.program.release(consumer);
                }
                saved
            }
        };
        keep.push(kept);
        monitor.increment_progress(1);
    }
    Ok(keep)
}

/// Merge `provider` into `program` through `loader`.
///
/// Events stay disabled for the duration. The merge runs in one transaction
/// that commits only when the loader reports success. An incomplete
/// `load_spec` returns `Ok(false)` without touching the program.
pub fn load_into(
    loader: &dyn ProgramLoader,
    provider: &dyn ByteProvider,
    load_spec: &LoadSpec,
    options: &[LoadOption],
    log: &mut MessageLog,
    program: &mut Program,
    monitor: &TaskMonitor,
) -> Result<bool> {
    if !load_spec.is_complete() {
        return Ok(false);
    }
    if program.is_closed() {
        return Err(LoaderError::ProgramClosed(program.name().to_string()));
    }
    program.set_events_enabled(false);
    let result = merge_in_transaction(loader, provider, load_spec, options, log, program, monitor);
    program.set_events_enabled(true);
    result
}

fn merge_in_transaction(
    loader: &dyn ProgramLoader,
    provider: &dyn ByteProvider,
    load_spec: &LoadSpec,
    options: &[LoadOption],
    log: &mut MessageLog,
    program: &mut Program,
    monitor: &TaskMonitor,
) -> Result<bool> {
    let description = format!("Loading - {}", loader.name());
    let mut tx = program.transaction(&description)?;
    let merged = loader.merge_into(provider, load_spec, options, log, &mut tx, monitor);
    tx.set_commit(matches!(merged, Ok(true)));
    let ended = tx.end();
    let merged = merged?;
    ended?;
    debug!(loader = loader.name(), merged, "Merge finished");
    Ok(merged)
}

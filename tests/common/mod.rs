//! Common test utilities and helpers.
//!
//! Languages, byte sources, containers and a scripted multi-program loader
//! shared by the integration tests.

#![allow(dead_code)]

pub mod test_utils;

use bytes::Bytes;
use hoard::core::address_space::AddressSpace;
use hoard::core::language::{CompilerSpec, Language};
use hoard::core::memory::MemoryBlockDefinition;
use hoard::core::program::{Program, ProgramEvent};
use hoard::core::register::RegisterKind;
use hoard::io::error::Result as IoResult;
use hoard::io::{ByteProvider, Fsrl, MemoryByteProvider};
use hoard::loader::container::{MemoryContainer, ProgramContainer};
use hoard::loader::{create_program, LoadRequest, LoadSpec, LoadedProgram, ProgramLoader};
use hoard::{LoadOption, LoaderError, MessageLog, Result, TaskMonitor};
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Known test vector
pub const FOX: &[u8] = b"The quick brown fox jumps over the lazy dog";
pub const FOX_MD5: &str = "9e107d9d372bb6826bd81d3542a419d6";
pub const FOX_SHA256: &str = "d7a8fbb307d7809469ca9abcb0082e4f8d5651e46d3cdb762d02d0bf37c9e592";

/// A small 8-bit microcontroller target with memory-mapped registers,
/// default symbols and no default blocks.
pub fn avr_language() -> Language {
    Language::new("avr8:LE:16:default", AddressSpace::ram("ram", 16).unwrap())
        .with_space(AddressSpace::register("register", 16).unwrap())
        .with_register("SREG", 8, RegisterKind::Flags, "ram:0x5f")
        .unwrap()
        .with_register("SPL", 8, RegisterKind::Special, "ram:0x5d")
        .unwrap()
        .with_register("r0", 8, RegisterKind::General, "register:0x0")
        .unwrap()
        .with_default_symbol("RESET", "ram:0x0", true, true)
        .unwrap()
        .with_default_symbol("INT0", "ram:0x2", true, false)
        .unwrap()
        .with_default_symbol("TIMER1_OVF", "ram:0x1a", false, false)
        .unwrap()
}

pub fn avr_spec() -> LoadSpec {
    LoadSpec::new(Arc::new(avr_language()), CompilerSpec::new("gcc"))
}

pub fn language_with_blocks(blocks: Vec<MemoryBlockDefinition>) -> Language {
    blocks
        .into_iter()
        .fold(avr_language(), |lang, def| lang.with_memory_block(def))
}

/// Record every event a program emits.
pub fn record_events(program: &mut Program) -> Arc<Mutex<Vec<ProgramEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    program.add_listener(Box::new(move |event| sink.lock().unwrap().push(event.clone())));
    seen
}

/// Byte source that counts how often it is streamed.
pub struct CountingProvider {
    inner: MemoryByteProvider,
    streams: AtomicUsize,
}

impl CountingProvider {
    pub fn new(data: &'static [u8], fsrl: Option<Fsrl>) -> Self {
        let inner = MemoryByteProvider::new(Bytes::from_static(data));
        let inner = match fsrl {
            Some(fsrl) => inner.with_fsrl(fsrl),
            None => inner,
        };
        Self {
            inner,
            streams: AtomicUsize::new(0),
        }
    }

    pub fn streams(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }
}

impl ByteProvider for CountingProvider {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn read_bytes(&self, offset: u64, len: u64) -> IoResult<Bytes> {
        self.inner.read_bytes(offset, len)
    }

    fn input_stream(&self, offset: u64) -> IoResult<Box<dyn Read + '_>> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        self.inner.input_stream(offset)
    }

    fn absolute_path(&self) -> Option<String> {
        self.inner.absolute_path()
    }

    fn fsrl(&self) -> Option<&Fsrl> {
        self.inner.fsrl()
    }
}

/// Container that counts calls and can refuse or cancel on chosen names.
#[derive(Debug)]
pub struct ScriptedContainer {
    pub inner: Arc<MemoryContainer>,
    pub create_calls: AtomicUsize,
    pub folder_calls: AtomicUsize,
    /// Names that fail with a storage error
    pub reject: Vec<String>,
    /// Cancel this monitor after the first successful save
    pub cancel_after_save: Option<Arc<TaskMonitor>>,
}

impl ScriptedContainer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::plain())
    }

    pub fn plain() -> Self {
        Self {
            inner: MemoryContainer::new("/project"),
            create_calls: AtomicUsize::new(0),
            folder_calls: AtomicUsize::new(0),
            reject: Vec::new(),
            cancel_after_save: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst) + self.folder_calls.load(Ordering::SeqCst)
    }
}

impl ProgramContainer for ScriptedContainer {
    fn path(&self) -> String {
        self.inner.path()
    }

    fn create_file(&self, name: &str, program: &Program, monitor: &TaskMonitor) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.iter().any(|r| r == name) {
            let cause = std::io::Error::other("disk quota exceeded");
            return Err(LoaderError::storage_with(format!("cannot store {}", name), cause));
        }
        self.inner.create_file(name, program, monitor)?;
        if let Some(monitor) = &self.cancel_after_save {
            monitor.cancel();
        }
        Ok(())
    }

    fn create_folder_path(&self, name: &str) -> Result<Arc<dyn ProgramContainer>> {
        self.folder_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_folder_path(name)
    }

    fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    fn file_names(&self) -> Vec<String> {
        self.inner.file_names()
    }
}

/// Loader producing `artifacts` programs from one source: the primary named
/// after the request, then `<name>-part<N>`.
pub struct ScriptedLoader {
    pub artifacts: usize,
    pub override_primary: bool,
    pub fail_extract: bool,
    pub extract_calls: AtomicUsize,
    pub fixup_calls: AtomicUsize,
    /// Names of programs that emitted `Closed`
    pub closed: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLoader {
    pub fn new(artifacts: usize) -> Self {
        Self {
            artifacts,
            override_primary: true,
            fail_extract: false,
            extract_calls: AtomicUsize::new(0),
            fixup_calls: AtomicUsize::new(0),
            closed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

impl ProgramLoader for ScriptedLoader {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn extract(
        &self,
        request: &LoadRequest<'_>,
        folder: Option<&Arc<dyn ProgramContainer>>,
        _log: &mut MessageLog,
    ) -> Result<Vec<LoadedProgram>> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_extract {
            return Err(anyhow::anyhow!("truncated header at offset 0x40").into());
        }
        let mut loaded = Vec::new();
        for index in 0..self.artifacts {
            let name = if index == 0 {
                request.name.to_string()
            } else {
                format!("{}-part{}", request.name, index)
            };
            let mut program = create_program(
                request.provider,
                &name,
                None,
                Some("Scripted"),
                Arc::clone(&request.load_spec.language),
                request.load_spec.compiler_spec.clone(),
                request.consumer,
            )?;
            let closed = Arc::clone(&self.closed);
            let label = name.clone();
            program.add_listener(Box::new(move |event| {
                if *event == ProgramEvent::Closed {
                    closed.lock().unwrap().push(label.clone());
                }
            }));
            loaded.push(LoadedProgram::new(program, folder.cloned()));
        }
        Ok(loaded)
    }

    fn merge_into(
        &self,
        _provider: &dyn ByteProvider,
        _load_spec: &LoadSpec,
        _options: &[LoadOption],
        log: &mut MessageLog,
        program: &mut Program,
        _monitor: &TaskMonitor,
    ) -> Result<bool> {
        program.set_property("Scripted Merge", "partial")?;
        log.append_msg("merge rejected");
        Ok(false)
    }

    fn override_primary_name(&self) -> bool {
        self.override_primary
    }

    fn post_load_fixups(
        &self,
        _loaded: &mut [LoadedProgram],
        _options: &[LoadOption],
        _log: &mut MessageLog,
        _monitor: &TaskMonitor,
    ) -> Result<()> {
        self.fixup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

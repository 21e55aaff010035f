//! The structured program under construction.
//!
//! A [`Program`] owns its memory, symbol table, function table and property
//! bag. Every structural mutation must happen inside a transaction; an
//! aborted transaction restores the state captured when the outermost
//! transaction opened. Change events are held back until the outermost
//! transaction commits, and are dropped entirely while event delivery is
//! disabled, so listeners never observe a half-built program.
//!
//! Ownership is tracked with [`Consumer`] tokens. When the last consumer
//! releases a program it is closed and refuses further mutation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::core::address::Address;
use crate::core::address_space::AddressSpace;
use crate::core::function::{Function, FunctionTable};
use crate::core::language::{CompilerSpec, Language};
use crate::core::memory::{Memory, MemoryBlock, Perms};
use crate::core::symbol::{Symbol, SymbolTable};
use crate::error::{LoaderError, Result};

/// Property bag keys written during program creation.
pub mod info_keys {
    pub const EXECUTABLE_PATH: &str = "Executable Location";
    pub const EXECUTABLE_FORMAT: &str = "Executable Format";
    pub const EXECUTABLE_MD5: &str = "Executable MD5";
    pub const EXECUTABLE_SHA256: &str = "Executable SHA256";
    pub const SOURCE_FSRL: &str = "FSRL";
    pub const DATE_CREATED: &str = "Date Created";
}

/// Opaque ownership token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Consumer(Uuid);

impl Consumer {
    pub fn new() -> Self {
        Consumer(Uuid::new_v4())
    }
}

impl Default for Consumer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Notifications delivered to program listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramEvent {
    /// A committed change, labelled by what changed
    Changed(String),
    /// Event delivery resumed after bulk construction
    Restored,
    /// The last consumer released the program
    Closed,
}

pub type ProgramListener = Box<dyn Fn(&ProgramEvent) + Send + Sync>;

/// Identifier returned by [`Program::start_transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

#[derive(Debug, Clone, Default)]
struct ProgramState {
    spaces: Vec<AddressSpace>,
    memory: Memory,
    symbols: SymbolTable,
    functions: FunctionTable,
    info: BTreeMap<String, String>,
    image_base: Option<Address>,
    analyzed: bool,
}

struct OpenTransaction {
    /// Ids of nested transactions, outermost first
    stack: Vec<(u64, String)>,
    snapshot: ProgramState,
    aborted: bool,
    pending: Vec<ProgramEvent>,
}

pub struct Program {
    name: String,
    language: Arc<Language>,
    compiler_spec: CompilerSpec,
    state: ProgramState,
    transaction: Option<OpenTransaction>,
    next_transaction: u64,
    events_enabled: bool,
    listeners: Vec<ProgramListener>,
    consumers: Vec<Consumer>,
    closed: bool,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("language", &self.language.id)
            .field("compiler_spec", &self.compiler_spec.id)
            .field("blocks", &self.state.memory.len())
            .field("symbols", &self.state.symbols.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Program {
    /// Create an empty program owned by `consumer`.
    pub fn new(
        name: impl Into<String>,
        language: Arc<Language>,
        compiler_spec: CompilerSpec,
        consumer: &Consumer,
    ) -> Self {
        let state = ProgramState {
            spaces: language.spaces.clone(),
            ..ProgramState::default()
        };
        Self {
            name: name.into(),
            language,
            compiler_spec,
            state,
            transaction: None,
            next_transaction: 1,
            events_enabled: true,
            listeners: Vec::new(),
            consumers: vec![*consumer],
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> &Arc<Language> {
        &self.language
    }

    pub fn compiler_spec(&self) -> &CompilerSpec {
        &self.compiler_spec
    }

    // ---- ownership -------------------------------------------------------

    pub fn add_consumer(&mut self, consumer: &Consumer) {
        if !self.consumers.contains(consumer) {
            self.consumers.push(*consumer);
        }
    }

    pub fn is_owned_by(&self, consumer: &Consumer) -> bool {
        self.consumers.contains(consumer)
    }

    /// Drop `consumer`'s claim. Closes the program when no claims remain.
    /// Returns false if `consumer` held no claim.
    pub fn release(&mut self, consumer: &Consumer) -> bool {
        let Some(pos) = self.consumers.iter().position(|c| c == consumer) else {
            warn!(program = %self.name, %consumer, "Release by a non-owning consumer ignored");
            return false;
        };
        self.consumers.remove(pos);
        if self.consumers.is_empty() {
            self.close();
        }
        true
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(tx) = self.transaction.take() {
            warn!(
                program = %self.name,
                open = tx.stack.len(),
                "Closing program with an open transaction"
            );
            self.state = tx.snapshot;
        }
        self.closed = true;
        debug!(program = %self.name, "Program closed");
        for listener in &self.listeners {
            listener(&ProgramEvent::Closed);
        }
        self.listeners.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ---- events ----------------------------------------------------------

    pub fn add_listener(&mut self, listener: ProgramListener) {
        self.listeners.push(listener);
    }

    pub fn events_enabled(&self) -> bool {
        self.events_enabled
    }

    /// Gate event delivery. Re-enabling emits a single `Restored` event.
    pub fn set_events_enabled(&mut self, enabled: bool) {
        if self.events_enabled == enabled {
            return;
        }
        self.events_enabled = enabled;
        if enabled && !self.closed {
            self.fire(&ProgramEvent::Restored);
        }
    }

    fn fire(&self, event: &ProgramEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    // ---- transactions ----------------------------------------------------

    /// Open a transaction, joining the current one if already open.
    pub fn start_transaction(&mut self, description: &str) -> Result<TransactionId> {
        if self.closed {
            return Err(LoaderError::ProgramClosed(self.name.clone()));
        }
        let id = self.next_transaction;
        self.next_transaction += 1;
        match &mut self.transaction {
            Some(tx) => tx.stack.push((id, description.to_string())),
            None => {
                self.transaction = Some(OpenTransaction {
                    stack: vec![(id, description.to_string())],
                    snapshot: self.state.clone(),
                    aborted: false,
                    pending: Vec::new(),
                });
            }
        }
        trace!(program = %self.name, id, description, "Transaction started");
        Ok(TransactionId(id))
    }

    /// Close the innermost transaction. The outermost close commits only if
    /// no transaction in the nest asked for a rollback.
    pub fn end_transaction(&mut self, id: TransactionId, commit: bool) -> Result<()> {
        let tx = self
            .transaction
            .as_mut()
            .ok_or_else(|| LoaderError::NoTransaction(self.name.clone()))?;
        match tx.stack.last() {
            Some((top, _)) if *top == id.0 => {}
            _ => return Err(LoaderError::TransactionMismatch(id.0)),
        }
        let (_, description) = tx.stack.pop().unwrap_or_default();
        if !commit {
            tx.aborted = true;
        }
        if !tx.stack.is_empty() {
            return Ok(());
        }

        let Some(tx) = self.transaction.take() else {
            return Ok(());
        };
        if tx.aborted {
            debug!(program = %self.name, description, "Transaction rolled back");
            self.state = tx.snapshot;
        } else {
            trace!(program = %self.name, description, "Transaction committed");
            if self.events_enabled {
                for event in &tx.pending {
                    self.fire(event);
                }
            }
        }
        Ok(())
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Scoped transaction that rolls back on drop unless marked for commit.
    pub fn transaction(&mut self, description: &str) -> Result<Transaction<'_>> {
        let id = self.start_transaction(description)?;
        Ok(Transaction {
            program: self,
            id,
            commit: false,
        })
    }

    /// Run `f` in a transaction; commit on `Ok`, roll back on `Err`.
    pub fn with_transaction<T, F>(&mut self, description: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Program) -> Result<T>,
    {
        let mut tx = self.transaction(description)?;
        let result = f(&mut *tx);
        tx.set_commit(result.is_ok());
        tx.end()?;
        result
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.closed {
            return Err(LoaderError::ProgramClosed(self.name.clone()));
        }
        if self.transaction.is_none() {
            return Err(LoaderError::NoTransaction(self.name.clone()));
        }
        Ok(())
    }

    fn record_change(&mut self, change: &str) {
        if let Some(tx) = self.transaction.as_mut() {
            tx.pending.push(ProgramEvent::Changed(change.to_string()));
        }
    }

    fn writable(&mut self, change: &str) -> Result<&mut ProgramState> {
        self.ensure_writable()?;
        self.record_change(change);
        Ok(&mut self.state)
    }

    // ---- address spaces and memory ---------------------------------------

    pub fn address_space(&self, name: &str) -> Option<&AddressSpace> {
        self.state.spaces.iter().find(|s| s.name == name)
    }

    pub fn address_spaces(&self) -> &[AddressSpace] {
        &self.state.spaces
    }

    pub fn default_address_space(&self) -> Option<&AddressSpace> {
        self.address_space(&self.language.default_space)
    }

    pub fn memory(&self) -> &Memory {
        &self.state.memory
    }

    /// Add a block in `space`; an overlay space is registered on first use.
    pub fn add_memory_block(&mut self, space: AddressSpace, block: MemoryBlock) -> Result<()> {
        self.ensure_writable()?;
        let known = self.state.spaces.iter().any(|s| s.name == space.name);
        if !known && !space.is_overlay() {
            return Err(LoaderError::InvalidAddress(format!(
                "space '{}' is not part of this program",
                space.name
            )));
        }
        self.state.memory.add_block(&space, block)?;
        if !known {
            self.state.spaces.push(space);
        }
        self.record_change("memory");
        Ok(())
    }

    // ---- symbols and functions -------------------------------------------

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.state.symbols
    }

    pub fn symbol_table_mut(&mut self) -> Result<&mut SymbolTable> {
        Ok(&mut self.writable("symbols")?.symbols)
    }

    pub fn function_table(&self) -> &FunctionTable {
        &self.state.functions
    }

    pub fn function_table_mut(&mut self) -> Result<&mut FunctionTable> {
        Ok(&mut self.writable("functions")?.functions)
    }

    // ---- properties ------------------------------------------------------

    pub fn property(&self, key: &str) -> Option<&str> {
        self.state.info.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.state.info
    }

    pub fn set_property(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.writable("properties")?
            .info
            .insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn executable_path(&self) -> Option<&str> {
        self.property(info_keys::EXECUTABLE_PATH)
    }

    pub fn executable_format(&self) -> Option<&str> {
        self.property(info_keys::EXECUTABLE_FORMAT)
    }

    pub fn executable_md5(&self) -> Option<&str> {
        self.property(info_keys::EXECUTABLE_MD5)
    }

    pub fn executable_sha256(&self) -> Option<&str> {
        self.property(info_keys::EXECUTABLE_SHA256)
    }

    pub fn source_fsrl(&self) -> Option<&str> {
        self.property(info_keys::SOURCE_FSRL)
    }

    pub fn image_base(&self) -> Option<&Address> {
        self.state.image_base.as_ref()
    }

    pub fn set_image_base(&mut self, base: Address) -> Result<()> {
        if self.address_space(&base.space).is_none() {
            return Err(LoaderError::InvalidAddress(base.to_string()));
        }
        self.writable("image base")?.image_base = Some(base);
        Ok(())
    }

    /// Whether auto-analysis has already run to completion.
    pub fn is_analyzed(&self) -> bool {
        self.state.analyzed
    }

    pub fn set_analyzed(&mut self, analyzed: bool) -> Result<()> {
        self.writable("analysis state")?.analyzed = analyzed;
        Ok(())
    }

    /// Serializable view of the program used by storage containers.
    pub fn to_snapshot(&self) -> ProgramSnapshot {
        ProgramSnapshot {
            name: self.name.clone(),
            language_id: self.language.id.clone(),
            compiler_spec_id: self.compiler_spec.id.clone(),
            properties: self.state.info.clone(),
            image_base: self.state.image_base.clone(),
            analyzed: self.state.analyzed,
            blocks: self
                .state
                .memory
                .blocks()
                .iter()
                .map(|b| BlockSnapshot {
                    name: b.name.clone(),
                    start: b.start.clone(),
                    length: b.length,
                    perms: b.perms,
                    initialized: b.is_initialized(),
                    overlay: b.overlay,
                    volatile: b.volatile,
                })
                .collect(),
            symbols: self.state.symbols.iter().cloned().collect(),
            entry_points: self.state.symbols.external_entry_points().cloned().collect(),
            functions: self.state.functions.iter().cloned().collect(),
        }
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        if !self.closed && !self.consumers.is_empty() {
            debug!(
                program = %self.name,
                consumers = self.consumers.len(),
                "Program dropped while still owned"
            );
        }
    }
}

/// Guard for an open transaction.
///
/// Dereferences to the [`Program`] so mutations go through the guard. The
/// transaction ends when the guard is dropped, committing if
/// [`set_commit`](Transaction::set_commit) was called with `true` and rolling
/// back otherwise, including during unwinding and `?` early returns.
pub struct Transaction<'a> {
    program: &'a mut Program,
    id: TransactionId,
    commit: bool,
}

impl Transaction<'_> {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn set_commit(&mut self, commit: bool) {
        self.commit = commit;
    }

    /// End now and report any error from closing.
    pub fn end(self) -> Result<()> {
        let mut this = std::mem::ManuallyDrop::new(self);
        let (id, commit) = (this.id, this.commit);
        this.program.end_transaction(id, commit)
    }
}

impl std::ops::Deref for Transaction<'_> {
    type Target = Program;

    fn deref(&self) -> &Program {
        self.program
    }
}

impl std::ops::DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Program {
        self.program
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.program.end_transaction(self.id, self.commit) {
            warn!(error = %e, "Failed to end transaction");
        }
    }
}

/// Memory block metadata as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub name: String,
    pub start: Address,
    pub length: u64,
    pub perms: Perms,
    pub initialized: bool,
    pub overlay: bool,
    pub volatile: bool,
}

/// Persisted form of a [`Program`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSnapshot {
    pub name: String,
    pub language_id: String,
    pub compiler_spec_id: String,
    pub properties: BTreeMap<String, String>,
    pub image_base: Option<Address>,
    pub analyzed: bool,
    pub blocks: Vec<BlockSnapshot>,
    pub symbols: Vec<Symbol>,
    pub entry_points: Vec<Address>,
    pub functions: Vec<Function>,
}

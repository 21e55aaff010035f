//! Destination containers for constructed programs.
//!
//! The loader consumes only a narrow create contract: store a program under a
//! name, failing with `DuplicateName` when the name is taken. Two
//! implementations are provided: an in-memory container and a directory of
//! JSON snapshot files.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::core::program::{Program, ProgramSnapshot};
use crate::error::{LoaderError, Result};
use crate::loader::monitor::TaskMonitor;

/// File extension used by [`DirectoryContainer`].
pub const SNAPSHOT_EXTENSION: &str = "hoard.json";

/// A storage location that programs can be saved into.
pub trait ProgramContainer: Send + Sync + fmt::Debug {
    /// Display path of the container.
    fn path(&self) -> String;

    /// Persist `program` under `name`.
    ///
    /// # Errors
    /// `DuplicateName` if the name is taken, `InvalidName` if it is not
    /// acceptable, `Cancelled` if the monitor was cancelled, and `Storage`
    /// or `Io` for anything else.
    fn create_file(&self, name: &str, program: &Program, monitor: &TaskMonitor) -> Result<()>;

    /// Get or create a child container.
    fn create_folder_path(&self, name: &str) -> Result<Arc<dyn ProgramContainer>>;

    fn contains(&self, name: &str) -> bool;

    fn file_names(&self) -> Vec<String>;
}

/// Check a program or folder name for storage.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LoaderError::InvalidName("name is empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(LoaderError::InvalidName(name.to_string()));
    }
    if name.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(LoaderError::InvalidName(format!(
            "'{}' contains a path separator or control character",
            name
        )));
    }
    Ok(())
}

/// Container that keeps serialized programs in memory.
#[derive(Debug, Default)]
pub struct MemoryContainer {
    path: String,
    files: Mutex<BTreeMap<String, String>>,
    folders: Mutex<BTreeMap<String, Arc<MemoryContainer>>>,
}

impl MemoryContainer {
    pub fn new(path: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            ..Self::default()
        })
    }

    /// Deserialize a stored program.
    pub fn snapshot(&self, name: &str) -> Result<Option<ProgramSnapshot>> {
        let files = self.lock_files()?;
        files
            .get(name)
            .map(|json| serde_json::from_str(json).map_err(LoaderError::from))
            .transpose()
    }

    pub fn folder(&self, name: &str) -> Option<Arc<MemoryContainer>> {
        self.folders.lock().ok()?.get(name).cloned()
    }

    fn lock_files(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.files
            .lock()
            .map_err(|_| LoaderError::storage(format!("container {} is poisoned", self.path)))
    }
}

impl ProgramContainer for MemoryContainer {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn create_file(&self, name: &str, program: &Program, monitor: &TaskMonitor) -> Result<()> {
        monitor.check_cancelled()?;
        validate_name(name)?;
        let json = serde_json::to_string(&program.to_snapshot())?;
        let mut files = self.lock_files()?;
        if files.contains_key(name) {
            return Err(LoaderError::DuplicateName(name.to_string()));
        }
        files.insert(name.to_string(), json);
        debug!(container = %self.path, name, "Stored program");
        Ok(())
    }

    fn create_folder_path(&self, name: &str) -> Result<Arc<dyn ProgramContainer>> {
        validate_name(name)?;
        let mut folders = self
            .folders
            .lock()
            .map_err(|_| LoaderError::storage(format!("container {} is poisoned", self.path)))?;
        let child_path = format!("{}/{}", self.path.trim_end_matches('/'), name);
        let child = folders
            .entry(name.to_string())
            .or_insert_with(|| MemoryContainer::new(child_path))
            .clone();
        Ok(child)
    }

    fn contains(&self, name: &str) -> bool {
        self.lock_files().map(|f| f.contains_key(name)).unwrap_or(false)
    }

    fn file_names(&self) -> Vec<String> {
        self.lock_files()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Container backed by a directory; one JSON snapshot file per program.
#[derive(Debug, Clone)]
pub struct DirectoryContainer {
    root: PathBuf,
}

impl DirectoryContainer {
    /// Use `root` as a container, creating it if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Arc<Self>> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Arc::new(Self { root }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, SNAPSHOT_EXTENSION))
    }

    pub fn snapshot(&self, name: &str) -> Result<ProgramSnapshot> {
        let text = fs::read_to_string(self.file_path(name))?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl ProgramContainer for DirectoryContainer {
    fn path(&self) -> String {
        self.root.display().to_string()
    }

    fn create_file(&self, name: &str, program: &Program, monitor: &TaskMonitor) -> Result<()> {
        monitor.check_cancelled()?;
        validate_name(name)?;
        let path = self.file_path(name);
        let json = serde_json::to_vec_pretty(&program.to_snapshot())?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(LoaderError::DuplicateName(name.to_string()))
            }
            Err(e) => {
                return Err(LoaderError::storage_with(
                    format!("cannot create {}", path.display()),
                    e,
                ))
            }
        };
        if let Err(e) = file.write_all(&json).and_then(|_| file.sync_all()) {
            // Do not leave a truncated file claiming the name.
            let _ = fs::remove_file(&path);
            return Err(LoaderError::storage_with(
                format!("cannot write {}", path.display()),
                e,
            ));
        }
        debug!(path = %path.display(), "Stored program");
        Ok(())
    }

    fn create_folder_path(&self, name: &str) -> Result<Arc<dyn ProgramContainer>> {
        validate_name(name)?;
        let child = DirectoryContainer::open(self.root.join(name))?;
        Ok(child)
    }

    fn contains(&self, name: &str) -> bool {
        self.file_path(name).is_file()
    }

    fn file_names(&self) -> Vec<String> {
        let suffix = format!(".{}", SNAPSHOT_EXTENSION);
        let mut names: Vec<String> = fs::read_dir(&self.root)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().to_str().map(str::to_string))
                    .filter_map(|n| n.strip_suffix(&suffix).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

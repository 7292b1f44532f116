//! One JSON document per file, guarded by a per-file lock.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::StoreError;

/// Outcome of a read-modify-write closure.
///
/// `Write` persists the mutated document, `Keep` leaves the file untouched.
pub enum Edit<R> {
    Write(R),
    Keep(R),
}

/// A JSON document stored at `path`.
///
/// A missing file reads as `T::default()` and is created on first read.
pub struct JsonFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    lenient: bool,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            lenient: false,
            _doc: PhantomData,
        }
    }

    /// Like [`JsonFile::new`], but an unparseable file reads as empty.
    pub fn lenient(path: impl Into<PathBuf>) -> Self {
        Self {
            lenient: true,
            ..Self::new(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document.
    pub fn read(&self) -> Result<T, StoreError> {
        let _guard = self.guard()?;
        self.read_unlocked()
    }

    /// Overwrite the whole document.
    pub fn write(&self, doc: &T) -> Result<(), StoreError> {
        let _guard = self.guard()?;
        self.write_unlocked(doc)
    }

    /// Read, let `edit` mutate, and write back if it asks to, all under the
    /// file lock.
    pub fn update<R>(&self, edit: impl FnOnce(&mut T) -> Edit<R>) -> Result<R, StoreError> {
        let _guard = self.guard()?;
        let mut doc = self.read_unlocked()?;
        match edit(&mut doc) {
            Edit::Write(out) => {
                self.write_unlocked(&doc)?;
                Ok(out)
            }
            Edit::Keep(out) => Ok(out),
        }
    }

    /// Take the file lock and keep it for several reads and writes.
    ///
    /// Callers holding more than one table lock take them in a fixed order:
    /// users before downloads.
    pub fn lock(&self) -> Result<Locked<'_, T>, StoreError> {
        Ok(Locked {
            file: self,
            _guard: self.guard()?,
        })
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.lock
            .lock()
            .map_err(|_| StoreError::Poisoned(self.path.display().to_string()))
    }

    fn read_unlocked(&self) -> Result<T, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let doc = T::default();
                self.write_unlocked(&doc)?;
                debug!(path = %self.path.display(), "Created empty JSON table");
                return Ok(doc);
            }
            Err(e) => return Err(StoreError::Io(format!("read {}: {e}", self.path.display()))),
        };

        if content.trim().is_empty() {
            return Ok(T::default());
        }

        match serde_json::from_str(&content) {
            Ok(doc) => Ok(doc),
            Err(e) if self.lenient => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable JSON table");
                Ok(T::default())
            }
            Err(e) => Err(StoreError::Parse(format!("{}: {e}", self.path.display()))),
        }
    }

    fn write_unlocked(&self, doc: &T) -> Result<(), StoreError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| StoreError::Io(format!("create {}: {e}", dir.display())))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| StoreError::Io(format!("temp file in {}: {e}", dir.display())))?;
        serde_json::to_writer_pretty(&mut tmp, doc)
            .map_err(|e| StoreError::Io(format!("serialize {}: {e}", self.path.display())))?;
        tmp.flush()
            .map_err(|e| StoreError::Io(format!("flush {}: {e}", self.path.display())))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Io(format!("replace {}: {}", self.path.display(), e.error)))?;
        Ok(())
    }
}

/// A [`JsonFile`] whose lock is held until this value is dropped.
pub struct Locked<'a, T> {
    file: &'a JsonFile<T>,
    _guard: MutexGuard<'a, ()>,
}

impl<T> Locked<'_, T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn read(&self) -> Result<T, StoreError> {
        self.file.read_unlocked()
    }

    pub fn write(&self, doc: &T) -> Result<(), StoreError> {
        self.file.write_unlocked(doc)
    }
}

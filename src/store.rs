// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! The sample store: a document behind a two-level lock.
//!
//! Readers and writers of sample content take the *size* lock, which is
//! shared. Anything that changes a document's length, channel layout, cues or
//! temp sets needs the exclusive *resize* lock. Structural edits are methods
//! on [`ResizeGuard`], so holding the resize lock is checked by the compiler.
//! Requests that would deadlock on the same thread are refused with
//! [`StoreError::LockMisuse`].

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::TempPath;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::pool_file::PoolFile;

mod channel;
mod document;
mod edit;
mod format;
mod temp;

pub use channel::{ChannelAccessor, ChannelMask, Sample, MAX_CHANNELS};
pub use document::Document;
pub use edit::RotateDirection;
pub use temp::TempHandle;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LockMode {
    Size,
    Resize,
}

thread_local! {
    /// Store locks held by the current thread.
    static HELD_LOCKS: RefCell<Vec<(u64, LockMode)>> = const { RefCell::new(Vec::new()) };
}

fn held_mode(store: u64) -> Option<LockMode> {
    HELD_LOCKS.with(|held| {
        let held = held.borrow();
        if held.contains(&(store, LockMode::Resize)) {
            Some(LockMode::Resize)
        } else if held.contains(&(store, LockMode::Size)) {
            Some(LockMode::Size)
        } else {
            None
        }
    })
}

fn note_acquired(store: u64, mode: LockMode) {
    HELD_LOCKS.with(|held| held.borrow_mut().push((store, mode)));
}

fn note_released(store: u64, mode: LockMode) {
    HELD_LOCKS.with(|held| {
        let mut held = held.borrow_mut();
        if let Some(position) = held.iter().rposition(|&entry| entry == (store, mode)) {
            held.swap_remove(position);
        }
    });
}

/// Shared access to a document. Sample content may be read and written, but
/// the document's shape is fixed while any size guard is alive.
pub struct SizeGuard<'a> {
    store: u64,
    document: RwLockReadGuard<'a, Document>,
}

impl Deref for SizeGuard<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.document
    }
}

impl Drop for SizeGuard<'_> {
    fn drop(&mut self) {
        note_released(self.store, LockMode::Size);
    }
}

/// Exclusive access to a document, required for structural edits.
pub struct ResizeGuard<'a> {
    store: u64,
    document: RwLockWriteGuard<'a, Document>,
}

impl Deref for ResizeGuard<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.document
    }
}

impl Drop for ResizeGuard<'_> {
    fn drop(&mut self) {
        note_released(self.store, LockMode::Resize);
    }
}

enum WorkingFile {
    /// A working copy deleted when the store closes.
    Temporary(TempPath),
    /// A file opened where it lies, e.g. after a crash.
    InPlace(PathBuf),
}

impl WorkingFile {
    fn path(&self) -> &Path {
        match self {
            WorkingFile::Temporary(path) => &**path,
            WorkingFile::InPlace(path) => path.as_path(),
        }
    }
}

/// Creates an empty working file in the configured directory.
fn new_working_file(config: &EngineConfig) -> Result<TempPath, StoreError> {
    let dir = config.working_dir();
    std::fs::create_dir_all(&dir)?;
    let file = tempfile::Builder::new()
        .prefix("soundpool-")
        .suffix(".work")
        .tempfile_in(&dir)?;
    Ok(file.into_temp_path())
}

/// A document and the working file it lives in.
pub struct SampleStore {
    id: u64,
    // Declared before `working` so the file handle closes before a temporary
    // working file is deleted.
    document: RwLock<Document>,
    working: WorkingFile,
}

impl SampleStore {
    fn new(document: Document, working: WorkingFile) -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            document: RwLock::new(document),
            working,
        }
    }

    /// Creates a new document of `length` silent samples in a temporary
    /// working file. A zero length is raised to one sample.
    pub fn create(
        sample_rate: u32,
        channel_count: usize,
        length: u64,
        config: &EngineConfig,
    ) -> Result<Self, StoreError> {
        let working = new_working_file(config)?;
        let pool_file = PoolFile::create(&working, config.pool_file_options())?;
        let document = Document::create(
            pool_file,
            config.clone(),
            sample_rate,
            channel_count,
            length,
        )?;
        Ok(Self::new(document, WorkingFile::Temporary(working)))
    }

    /// Opens a saved document by copying it into a temporary working file.
    /// The original is not touched until it is explicitly saved over.
    pub fn open_working<P: AsRef<Path>>(path: P, config: &EngineConfig) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let working = new_working_file(config)?;
        std::fs::copy(path, &working)?;
        let pool_file = PoolFile::open(&working, config.pool_file_options())?;
        let document = Document::load(pool_file, config.clone())?;
        info!(
            source = %path.display(),
            working = %working.display(),
            "Opened working copy"
        );
        Ok(Self::new(document, WorkingFile::Temporary(working)))
    }

    /// Opens a pool file in place, typically a working file left behind by a
    /// session that did not close cleanly. The file is kept when the store
    /// closes.
    pub fn recover<P: AsRef<Path>>(path: P, config: &EngineConfig) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let pool_file = PoolFile::open(path, config.pool_file_options())?;
        let document = Document::load(pool_file, config.clone())?;
        info!(path = %path.display(), "Recovered document");
        Ok(Self::new(document, WorkingFile::InPlace(path.to_path_buf())))
    }

    /// Path of the working file.
    pub fn working_path(&self) -> &Path {
        self.working.path()
    }

    /// Takes the shared size lock. A thread already holding the size lock on
    /// this store may take it again; one holding the resize lock may not.
    pub fn lock_size(&self) -> Result<SizeGuard<'_>, StoreError> {
        let document = match held_mode(self.id) {
            Some(LockMode::Resize) => {
                return Err(StoreError::LockMisuse(
                    "size lock requested while holding the resize lock",
                ))
            }
            Some(LockMode::Size) => self.document.read_recursive(),
            None => self.document.read(),
        };
        note_acquired(self.id, LockMode::Size);
        Ok(SizeGuard {
            store: self.id,
            document,
        })
    }

    /// Takes the exclusive resize lock, waiting for every size guard to be
    /// released.
    pub fn lock_resize(&self) -> Result<ResizeGuard<'_>, StoreError> {
        self.check_resize_allowed()?;
        let document = self.document.write();
        note_acquired(self.id, LockMode::Resize);
        debug!(store = self.id, "Acquired resize lock");
        Ok(ResizeGuard {
            store: self.id,
            document,
        })
    }

    /// Like [`SampleStore::lock_resize`], giving up after `timeout`.
    pub fn try_lock_resize_for(
        &self,
        timeout: Duration,
    ) -> Result<Option<ResizeGuard<'_>>, StoreError> {
        self.check_resize_allowed()?;
        let Some(document) = self.document.try_write_for(timeout) else {
            return Ok(None);
        };
        note_acquired(self.id, LockMode::Resize);
        Ok(Some(ResizeGuard {
            store: self.id,
            document,
        }))
    }

    fn check_resize_allowed(&self) -> Result<(), StoreError> {
        match held_mode(self.id) {
            Some(LockMode::Resize) => Err(StoreError::LockMisuse(
                "resize lock requested while already holding it",
            )),
            Some(LockMode::Size) => Err(StoreError::LockMisuse(
                "resize lock requested while holding the size lock",
            )),
            None => Ok(()),
        }
    }

    /// Closes the document. A temporary working file is deleted; a recovered
    /// file is left where it is, at its last checkpoint.
    pub fn close(self) -> Result<(), StoreError> {
        let SampleStore {
            id,
            document,
            working,
        } = self;
        drop(document);
        match working {
            WorkingFile::Temporary(path) => {
                debug!(store = id, path = %path.display(), "Removing working file");
                path.close()?;
            }
            WorkingFile::InPlace(path) => {
                debug!(store = id, path = %path.display(), "Closed document in place");
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleStore")
            .field("id", &self.id)
            .field("working", &self.working.path())
            .finish()
    }
}

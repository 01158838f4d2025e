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
use crate::pool_file::PoolFileError;

/// Errors surfaced by the sample store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An offset, length or channel mask was out of bounds. Nothing changed.
    #[error("Out of range: {0}")]
    Range(String),

    /// The locking discipline was violated, e.g. a thread asked for the
    /// resize lock while already holding a lock on the same store.
    #[error("Lock misuse: {0}")]
    LockMisuse(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file failed validation when opened and was refused.
    #[error("Corrupt file: {0}")]
    Corruption(String),

    #[error("Length of {requested} samples exceeds the configured maximum of {maximum}")]
    Capacity { requested: u64, maximum: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl From<PoolFileError> for StoreError {
    fn from(error: PoolFileError) -> Self {
        match error {
            PoolFileError::AlreadyExists(name) => StoreError::AlreadyExists(name),
            PoolFileError::NotFound(name) => StoreError::NotFound(name),
            e @ PoolFileError::TypeMismatch { .. } => StoreError::TypeMismatch(e.to_string()),
            e @ PoolFileError::Range { .. } => StoreError::Range(e.to_string()),
            PoolFileError::Corruption(reason) => StoreError::Corruption(reason),
            PoolFileError::Io(e) => StoreError::Io(e),
        }
    }
}

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
/// Error types for pool file operations
#[derive(Debug, thiserror::Error)]
pub enum PoolFileError {
    #[error("Pool already exists: {0}")]
    AlreadyExists(String),

    #[error("Pool not found: {0}")]
    NotFound(String),

    #[error("Pool {pool} holds {actual}, not {requested}")]
    TypeMismatch {
        pool: String,
        actual: String,
        requested: String,
    },

    #[error("Out of range access to pool {pool}: {message}")]
    Range { pool: String, message: String },

    #[error("Pool file is corrupt: {0}")]
    Corruption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolFileError {
    pub(crate) fn range(pool: &str, message: impl Into<String>) -> Self {
        PoolFileError::Range {
            pool: pool.to_string(),
            message: message.into(),
        }
    }
}

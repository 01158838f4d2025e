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
//! Cue points and the in-memory index over the cue pool.
//!
//! Cues are persisted in the "Cues" pool in insertion order. The index keeps a
//! time-sorted view alongside so lookups by position stay logarithmic.

use std::fmt;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::pool_file::{PoolElement, PoolFile};

/// Name of the pool holding cue records.
pub(crate) const CUES_POOL: &str = "Cues";

/// Longest cue name in bytes.
pub const MAX_CUE_NAME_LENGTH: usize = 64;

const RESERVED_BYTES: usize = 7;
const RECORD_SIZE: usize = MAX_CUE_NAME_LENGTH + RESERVED_BYTES + 1 + 8;

/// A named marker at a sample position.
///
/// Anchored cues are deleted when the audio under them is removed; other cues
/// slide to the start of the removed range.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cue {
    pub name: String,
    pub time: u64,
    pub is_anchored: bool,
}

impl Cue {
    pub fn new(name: impl Into<String>, time: u64, is_anchored: bool) -> Self {
        Self {
            name: name.into(),
            time,
            is_anchored,
        }
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}{}",
            self.name,
            self.time,
            if self.is_anchored { " (anchored)" } else { "" }
        )
    }
}

impl PoolElement for Cue {
    const SIZE: usize = RECORD_SIZE;
    const TYPE_TAG: &'static str = "cue";

    fn encode(&self, out: &mut [u8]) {
        out.fill(0);
        let name = self.name.as_bytes();
        let name_len = name.len().min(MAX_CUE_NAME_LENGTH);
        out[..name_len].copy_from_slice(&name[..name_len]);
        out[MAX_CUE_NAME_LENGTH + RESERVED_BYTES] = u8::from(self.is_anchored);
        out[RECORD_SIZE - 8..].copy_from_slice(&self.time.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let name_field = &bytes[..MAX_CUE_NAME_LENGTH];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_CUE_NAME_LENGTH);
        let mut time = [0u8; 8];
        time.copy_from_slice(&bytes[RECORD_SIZE - 8..]);
        Self {
            name: String::from_utf8_lossy(&name_field[..name_len]).into_owned(),
            time: u64::from_le_bytes(time),
            is_anchored: bytes[MAX_CUE_NAME_LENGTH + RESERVED_BYTES] != 0,
        }
    }
}

/// Checks a cue before it is stored in a document of `length` samples.
pub(crate) fn validate_cue(cue: &Cue, length: u64) -> Result<(), StoreError> {
    if cue.name.is_empty() {
        return Err(StoreError::Range("cue name is empty".into()));
    }
    if cue.name.len() > MAX_CUE_NAME_LENGTH {
        return Err(StoreError::Range(format!(
            "cue name is {} bytes, the limit is {}",
            cue.name.len(),
            MAX_CUE_NAME_LENGTH
        )));
    }
    if cue.name.contains('\0') {
        return Err(StoreError::Range("cue name contains a NUL byte".into()));
    }
    if cue.time >= length {
        return Err(StoreError::Range(format!(
            "cue time {} is past the end of the document ({} samples)",
            cue.time, length
        )));
    }
    Ok(())
}

/// The document's cues. Indices returned by lookups refer to persisted order
/// and stay valid until the next cue mutation.
#[derive(Clone, Debug, Default)]
pub struct CueIndex {
    cues: Vec<Cue>,
    /// Indices into `cues`, ordered by time and then by index.
    by_time: Vec<usize>,
    adjustments_enabled: bool,
}

impl CueIndex {
    /// Creates the cue pool in a fresh file.
    pub(crate) fn create(pool_file: &mut PoolFile) -> Result<Self, StoreError> {
        pool_file.create_pool::<Cue>(CUES_POOL)?;
        Ok(Self {
            cues: Vec::new(),
            by_time: Vec::new(),
            adjustments_enabled: true,
        })
    }

    /// Reads the cue pool. Cues lying past `length` are clamped in memory;
    /// the fix reaches disk with the next cue mutation.
    pub(crate) fn load(pool_file: &mut PoolFile, length: u64) -> Result<Self, StoreError> {
        if !pool_file.contains_pool(CUES_POOL) {
            warn!("File has no cue pool, creating an empty one");
            return Self::create(pool_file);
        }
        let accessor = pool_file.pool_accessor::<Cue>(CUES_POOL)?;
        let mut cues = accessor.read_vec(0, accessor.len() as usize)?;
        for cue in cues.iter_mut().filter(|cue| cue.time >= length) {
            warn!(cue = %cue, length, "Cue lies past the end of the document, clamping");
            cue.time = length.saturating_sub(1);
        }
        let mut index = Self {
            cues,
            by_time: Vec::new(),
            adjustments_enabled: true,
        };
        index.reindex();
        debug!(cues = index.len(), "Loaded cues");
        Ok(index)
    }

    fn reindex(&mut self) {
        let mut by_time: Vec<usize> = (0..self.cues.len()).collect();
        by_time.sort_by_key(|&i| (self.cues[i].time, i));
        self.by_time = by_time;
    }

    fn persist(&self, pool_file: &PoolFile, index: usize) -> Result<(), StoreError> {
        pool_file
            .pool_accessor::<Cue>(CUES_POOL)?
            .set(index as u64, self.cues[index].clone())?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Gets the cue at `index`.
    pub fn get(&self, index: usize) -> Option<&Cue> {
        self.cues.get(index)
    }

    /// Iterates over `(index, cue)` pairs in time order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Cue)> {
        self.by_time.iter().map(|&i| (i, &self.cues[i]))
    }

    /// Whether cue positions follow structural edits that span every channel.
    pub fn adjustments_enabled(&self) -> bool {
        self.adjustments_enabled
    }

    pub(crate) fn set_adjustments_enabled(&mut self, enabled: bool) {
        self.adjustments_enabled = enabled;
    }

    /// Finds the first cue with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.cues.iter().position(|cue| cue.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    /// Position in `by_time` of the first cue at or after `time`.
    fn lower_bound(&self, time: u64) -> usize {
        self.by_time.partition_point(|&i| self.cues[i].time < time)
    }

    /// Finds a cue exactly at `time`.
    pub fn find_at(&self, time: u64) -> Option<usize> {
        self.by_time
            .get(self.lower_bound(time))
            .copied()
            .filter(|&i| self.cues[i].time == time)
    }

    /// Finds the cue closest to `time`, returning its index and distance.
    /// Ties go to the earlier cue.
    pub fn find_nearest(&self, time: u64) -> Option<(usize, u64)> {
        let pos = self.lower_bound(time);
        let after = self
            .by_time
            .get(pos)
            .map(|&i| (i, self.cues[i].time - time));
        let before = pos
            .checked_sub(1)
            .map(|p| self.by_time[p])
            .map(|i| (i, time - self.cues[i].time));
        match (before, after) {
            (Some(b), Some(a)) => Some(if a.1 < b.1 { a } else { b }),
            (b, a) => b.or(a),
        }
    }

    /// Finds the last cue strictly before `time`.
    pub fn find_previous(&self, time: u64) -> Option<usize> {
        self.lower_bound(time)
            .checked_sub(1)
            .map(|p| self.by_time[p])
    }

    /// Finds the first cue strictly after `time`.
    pub fn find_next(&self, time: u64) -> Option<usize> {
        let pos = self.by_time.partition_point(|&i| self.cues[i].time <= time);
        self.by_time.get(pos).copied()
    }

    /// Appends a cue and returns its index.
    pub(crate) fn add(
        &mut self,
        pool_file: &mut PoolFile,
        cue: Cue,
        length: u64,
    ) -> Result<usize, StoreError> {
        validate_cue(&cue, length)?;
        let index = self.cues.len();
        pool_file.insert_space(CUES_POOL, index as u64, 1)?;
        self.cues.push(cue);
        self.persist(pool_file, index)?;
        self.reindex();
        Ok(index)
    }

    pub(crate) fn remove(
        &mut self,
        pool_file: &mut PoolFile,
        index: usize,
    ) -> Result<Cue, StoreError> {
        self.check_index(index)?;
        pool_file.remove_space(CUES_POOL, index as u64, 1)?;
        let cue = self.cues.remove(index);
        self.reindex();
        Ok(cue)
    }

    /// Replaces the cue at `index`.
    pub(crate) fn update(
        &mut self,
        pool_file: &PoolFile,
        index: usize,
        cue: Cue,
        length: u64,
    ) -> Result<(), StoreError> {
        self.check_index(index)?;
        validate_cue(&cue, length)?;
        self.cues[index] = cue;
        self.persist(pool_file, index)?;
        self.reindex();
        Ok(())
    }

    pub(crate) fn clear(&mut self, pool_file: &mut PoolFile) -> Result<(), StoreError> {
        pool_file.remove_space(CUES_POOL, 0, self.cues.len() as u64)?;
        self.cues.clear();
        self.by_time.clear();
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), StoreError> {
        if index >= self.cues.len() {
            return Err(StoreError::Range(format!(
                "cue index {} out of {} cues",
                index,
                self.cues.len()
            )));
        }
        Ok(())
    }

    /// Shifts cues at or after `at` to follow `length` inserted samples.
    pub(crate) fn adjust_for_insert(
        &mut self,
        pool_file: &PoolFile,
        at: u64,
        length: u64,
    ) -> Result<(), StoreError> {
        if length == 0 {
            return Ok(());
        }
        for index in 0..self.cues.len() {
            if self.cues[index].time >= at {
                self.cues[index].time += length;
                self.persist(pool_file, index)?;
            }
        }
        self.reindex();
        Ok(())
    }

    /// Updates cues for the removal of `length` samples at `at`. Anchored
    /// cues inside the range are deleted, others inside it move to `at`, and
    /// cues after it shift back.
    pub(crate) fn adjust_for_remove(
        &mut self,
        pool_file: &mut PoolFile,
        at: u64,
        length: u64,
    ) -> Result<(), StoreError> {
        if length == 0 {
            return Ok(());
        }
        let end = at + length;
        let mut doomed = Vec::new();
        for index in 0..self.cues.len() {
            let time = self.cues[index].time;
            if time < at {
                continue;
            }
            if time < end {
                if self.cues[index].is_anchored {
                    doomed.push(index);
                    continue;
                }
                self.cues[index].time = at;
            } else {
                self.cues[index].time = time - length;
            }
            self.persist(pool_file, index)?;
        }
        self.delete_all(pool_file, &doomed)
    }

    /// Pulls every cue inside a document of `length` samples. Anchored cues
    /// past the end are deleted; others move to the last sample.
    pub(crate) fn clamp_to_length(
        &mut self,
        pool_file: &mut PoolFile,
        length: u64,
    ) -> Result<(), StoreError> {
        let mut doomed = Vec::new();
        for index in 0..self.cues.len() {
            if self.cues[index].time < length {
                continue;
            }
            if self.cues[index].is_anchored {
                doomed.push(index);
            } else {
                self.cues[index].time = length.saturating_sub(1);
                self.persist(pool_file, index)?;
            }
        }
        self.delete_all(pool_file, &doomed)
    }

    /// Deletes the cues at the given ascending indices.
    fn delete_all(&mut self, pool_file: &mut PoolFile, indices: &[usize]) -> Result<(), StoreError> {
        for &index in indices.iter().rev() {
            debug!(cue = %self.cues[index], "Deleting cue");
            pool_file.remove_space(CUES_POOL, index as u64, 1)?;
            self.cues.remove(index);
        }
        self.reindex();
        Ok(())
    }
}

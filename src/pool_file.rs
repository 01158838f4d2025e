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

//! A block-structured container file holding any number of named pools.
//!
//! Each pool is an independently growable array of fixed-width elements.
//! Pool content lives in extents ("segments") scattered through the file and
//! the space allocation table (SAT) records which segments, in which order,
//! make up each pool. Inserting, removing or moving a range only rewrites SAT
//! entries and never touches content outside the edited range.
//!
//! The SAT is persisted by [`PoolFile::checkpoint`], which is the only point
//! at which a layout change becomes durable. Extents released since the last
//! checkpoint are not reused before the next one, so a crash at any moment
//! reopens the file exactly as it was at the last checkpoint.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

pub mod accessor;
mod alloc;
pub mod error;
mod header;
mod io;
mod sat;

#[cfg(test)]
mod tests;

pub use accessor::{PoolAccessor, PoolElement};
pub use error::PoolFileError;
pub use header::BLOCK_SIZE;
pub use sat::SatEntry;

use alloc::{round_up, FreeSpace};
use header::{checksum, FileHeader, DATA_START, HEADER_SLOTS};
use sat::{PoolRecord, Segment};

/// Size of the scratch buffer used when copying or zeroing content.
const COPY_BUFFER_BYTES: usize = 1 << 20;

/// Tunables for a pool file.
#[derive(Clone, Debug)]
pub struct PoolFileOptions {
    /// Largest extent handed out in one piece when a pool grows.
    pub max_segment_bytes: u64,
    /// Whether checkpoints flush to stable storage.
    pub sync: bool,
}

impl Default for PoolFileOptions {
    fn default() -> Self {
        Self {
            max_segment_bytes: 4 << 20,
            sync: true,
        }
    }
}

/// In-memory layout state captured before a compound edit so it can be
/// undone if the edit fails part way.
#[derive(Clone, Debug)]
pub struct PoolFileSnapshot {
    pools: BTreeMap<String, PoolRecord>,
    space: FreeSpace,
    sat_region: (u64, u64),
    generation: u64,
}

/// Summary of a defragmentation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefragmentStats {
    pub pools_moved: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// An open pool file. See the module documentation.
pub struct PoolFile {
    path: PathBuf,
    file: File,
    file_len: u64,
    options: PoolFileOptions,
    pools: BTreeMap<String, PoolRecord>,
    space: FreeSpace,
    /// Extent holding the committed SAT.
    sat_region: (u64, u64),
    /// Generation of the committed SAT.
    generation: u64,
}

impl PoolFile {
    /// Creates (or truncates) a pool file with no pools and commits its
    /// empty SAT.
    pub fn create<P: AsRef<Path>>(path: P, options: PoolFileOptions) -> Result<Self, PoolFileError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)?;
        file.set_len(DATA_START)?;

        let mut pool_file = Self {
            path,
            file,
            file_len: DATA_START,
            options,
            pools: BTreeMap::new(),
            space: FreeSpace::new(DATA_START),
            sat_region: (DATA_START, 0),
            generation: 0,
        };
        pool_file.checkpoint()?;
        info!(path = %pool_file.path.display(), "Created pool file");
        Ok(pool_file)
    }

    /// Opens an existing pool file at its most recent valid checkpoint. A file
    /// without a header slot and SAT that pass validation is refused.
    pub fn open<P: AsRef<Path>>(path: P, options: PoolFileOptions) -> Result<Self, PoolFileError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();
        if file_len < DATA_START {
            return Err(PoolFileError::Corruption(format!(
                "file is {} bytes, too short for a pool file",
                file_len
            )));
        }

        let mut headers = Vec::new();
        for slot in 0..HEADER_SLOTS {
            let mut buf = vec![0u8; BLOCK_SIZE as usize];
            io::read_exact_at(&file, &mut buf, slot * BLOCK_SIZE)?;
            match FileHeader::decode(&buf)? {
                Some(header) => headers.push(header),
                None => debug!(slot, "Header slot is blank or torn"),
            }
        }
        if headers.is_empty() {
            return Err(PoolFileError::Corruption("no valid header slot".into()));
        }
        headers.sort_by(|a, b| b.generation.cmp(&a.generation));

        for header in headers {
            match Self::load_sat(&file, &header, file_len) {
                Ok((pools, sat_region)) => {
                    let mut used: Vec<(u64, u64)> = pools
                        .values()
                        .flat_map(|record| record.segments.iter())
                        .map(|segment| (segment.offset, segment.capacity))
                        .collect();
                    used.push(sat_region);
                    let space = FreeSpace::from_used(used, DATA_START, file_len);

                    info!(
                        path = %path.display(),
                        generation = header.generation,
                        pools = pools.len(),
                        "Opened pool file"
                    );
                    return Ok(Self {
                        path,
                        file,
                        file_len,
                        options,
                        pools,
                        space,
                        sat_region,
                        generation: header.generation,
                    });
                }
                Err(PoolFileError::Corruption(reason)) => {
                    warn!(
                        generation = header.generation,
                        reason, "Skipping checkpoint that failed validation"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(PoolFileError::Corruption(
            "no checkpoint with a valid allocation table".into(),
        ))
    }

    fn load_sat(
        file: &File,
        header: &FileHeader,
        file_len: u64,
    ) -> Result<(BTreeMap<String, PoolRecord>, (u64, u64)), PoolFileError> {
        header
            .sat_offset
            .checked_add(header.sat_length)
            .filter(|end| header.sat_offset >= DATA_START && *end <= file_len)
            .ok_or_else(|| {
                PoolFileError::Corruption("allocation table lies outside the file".into())
            })?;

        let mut bytes = vec![0u8; header.sat_length as usize];
        io::read_exact_at(file, &mut bytes, header.sat_offset)?;
        if checksum(&bytes) != header.sat_checksum {
            return Err(PoolFileError::Corruption(
                "allocation table checksum mismatch".into(),
            ));
        }

        let pools = sat::decode(&bytes)?;
        let sat_region = (
            header.sat_offset,
            round_up(header.sat_length).min(file_len - header.sat_offset),
        );
        sat::validate(&pools, file_len, sat_region)?;
        Ok((pools, sat_region))
    }

    /// The path of the file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Generation number of the last committed checkpoint.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current length of the file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_len
    }

    /// Bytes of free space available for reuse.
    pub fn free_bytes(&self) -> u64 {
        self.space.free_bytes()
    }

    /// Number of separate free extents.
    pub fn free_fragments(&self) -> usize {
        self.space.fragment_count()
    }

    pub fn contains_pool(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    /// Names of all pools, in sorted order.
    pub fn pool_names(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    fn record(&self, name: &str) -> Result<&PoolRecord, PoolFileError> {
        self.pools
            .get(name)
            .ok_or_else(|| PoolFileError::NotFound(name.to_string()))
    }

    /// Number of elements in a pool.
    pub fn pool_size(&self, name: &str) -> Result<u64, PoolFileError> {
        Ok(self.record(name)?.element_count())
    }

    /// Number of segments a pool is spread across.
    pub fn pool_segment_count(&self, name: &str) -> Result<usize, PoolFileError> {
        Ok(self.record(name)?.segments.len())
    }

    /// Type tag of a pool's elements.
    pub fn pool_type(&self, name: &str) -> Result<&str, PoolFileError> {
        Ok(&self.record(name)?.type_tag)
    }

    /// Every row of the in-memory SAT, pool by pool in content order.
    pub fn sat_entries(&self) -> Vec<SatEntry> {
        self.pools
            .iter()
            .flat_map(|(name, record)| {
                record.segments.iter().map(move |segment| SatEntry {
                    pool: name.clone(),
                    offset: segment.offset,
                    length: segment.length,
                    capacity: segment.capacity,
                })
            })
            .collect()
    }

    /// Creates an empty pool of elements of type `T`.
    pub fn create_pool<T: PoolElement>(&mut self, name: &str) -> Result<(), PoolFileError> {
        if self.pools.contains_key(name) {
            return Err(PoolFileError::AlreadyExists(name.to_string()));
        }
        self.pools
            .insert(name.to_string(), PoolRecord::new(T::SIZE as u64, T::TYPE_TAG));
        debug!(pool = name, element = T::TYPE_TAG, "Created pool");
        Ok(())
    }

    /// Returns a typed view of a pool.
    pub fn pool_accessor<T: PoolElement>(&self, name: &str) -> Result<PoolAccessor<'_, T>, PoolFileError> {
        let (key, record) = self
            .pools
            .get_key_value(name)
            .ok_or_else(|| PoolFileError::NotFound(name.to_string()))?;
        PoolAccessor::new(self, key.as_str(), record)
    }

    /// Removes a pool and releases its space.
    pub fn remove_pool(&mut self, name: &str) -> Result<(), PoolFileError> {
        let record = self
            .pools
            .remove(name)
            .ok_or_else(|| PoolFileError::NotFound(name.to_string()))?;
        for segment in record.segments {
            self.space.quarantine(segment.offset, segment.capacity);
        }
        debug!(pool = name, "Removed pool");
        Ok(())
    }

    /// Renames a pool without touching its content.
    pub fn rename_pool(&mut self, from: &str, to: &str) -> Result<(), PoolFileError> {
        if from == to {
            return self.record(from).map(|_| ());
        }
        if self.pools.contains_key(to) {
            return Err(PoolFileError::AlreadyExists(to.to_string()));
        }
        let record = self
            .pools
            .remove(from)
            .ok_or_else(|| PoolFileError::NotFound(from.to_string()))?;
        self.pools.insert(to.to_string(), record);
        Ok(())
    }

    /// Removes every pool.
    pub fn clear(&mut self) {
        for record in std::mem::take(&mut self.pools).into_values() {
            for segment in record.segments {
                self.space.quarantine(segment.offset, segment.capacity);
            }
        }
    }

    fn byte_range(
        record: &PoolRecord,
        name: &str,
        offset: u64,
        length: u64,
        limit: u64,
    ) -> Result<(u64, u64), PoolFileError> {
        let element_size = record.element_size;
        offset
            .checked_add(length)
            .filter(|end| *end <= limit)
            .and_then(|_| Some((offset.checked_mul(element_size)?, length.checked_mul(element_size)?)))
            .ok_or_else(|| {
                PoolFileError::range(
                    name,
                    format!("{} elements at {} exceeds length {}", length, offset, limit),
                )
            })
    }

    fn grow_file(&mut self) -> Result<(), PoolFileError> {
        if self.space.end() > self.file_len {
            self.file.set_len(self.space.end())?;
            self.file_len = self.space.end();
        }
        Ok(())
    }

    fn tidy(&mut self, name: &str) {
        if let Some(record) = self.pools.get_mut(name) {
            for (offset, length) in record.coalesce() {
                self.space.quarantine(offset, length);
            }
        }
    }

    /// Inserts `length` elements of unspecified content at `offset`.
    /// Content after `offset` shifts up without being rewritten.
    pub fn insert_space(&mut self, name: &str, offset: u64, length: u64) -> Result<(), PoolFileError> {
        let record = self.record(name)?;
        let (byte_offset, _) = Self::byte_range(record, name, offset, 0, record.element_count())?;
        let mut bytes = length
            .checked_mul(record.element_size)
            .ok_or_else(|| PoolFileError::range(name, "length overflows"))?;
        if bytes == 0 {
            return Ok(());
        }

        let max_segment = self.options.max_segment_bytes;
        let record = self
            .pools
            .get_mut(name)
            .ok_or_else(|| PoolFileError::NotFound(name.to_string()))?;

        // Appends fill the last segment's spare capacity first.
        let mut at = byte_offset;
        if at == record.byte_size() {
            if let Some(last) = record.segments.last_mut() {
                let used = (last.capacity - last.length).min(bytes);
                last.length += used;
                bytes -= used;
                at += used;
                record.reindex();
            }
        }

        if bytes > 0 {
            let index = record.split_at(at);
            let mut left = bytes;
            let segments: Vec<Segment> = self
                .space
                .allocate(bytes, max_segment)
                .into_iter()
                .map(|(offset, capacity)| {
                    let length = left.min(capacity);
                    left -= length;
                    Segment {
                        offset,
                        length,
                        capacity,
                    }
                })
                .filter(|segment| segment.length > 0)
                .collect();
            record.segments.splice(index..index, segments);
            record.reindex();
        }

        self.tidy(name);
        self.grow_file()?;
        debug!(pool = name, offset, length, "Inserted space");
        Ok(())
    }

    /// Removes `length` elements at `offset`. Content after the removed range
    /// shifts down without being rewritten.
    pub fn remove_space(&mut self, name: &str, offset: u64, length: u64) -> Result<(), PoolFileError> {
        let record = self.record(name)?;
        let (byte_offset, bytes) =
            Self::byte_range(record, name, offset, length, record.element_count())?;
        if bytes == 0 {
            return Ok(());
        }

        let record = self
            .pools
            .get_mut(name)
            .ok_or_else(|| PoolFileError::NotFound(name.to_string()))?;
        let start = record.split_at(byte_offset);
        let stop = record.split_at(byte_offset + bytes);
        let removed: Vec<Segment> = record.segments.drain(start..stop).collect();
        record.reindex();
        for segment in removed {
            self.space.quarantine(segment.offset, segment.capacity);
        }

        self.tidy(name);
        debug!(pool = name, offset, length, "Removed space");
        Ok(())
    }

    /// Moves `length` elements from `src` at `src_offset` into `dest` at
    /// `dest_offset` by relinking segments; no content is copied. When `src`
    /// and `dest` are the same pool, `dest_offset` is taken after the moved
    /// range has been removed.
    pub fn move_data(
        &mut self,
        dest: &str,
        dest_offset: u64,
        src: &str,
        src_offset: u64,
        length: u64,
    ) -> Result<(), PoolFileError> {
        let src_record = self.record(src)?;
        let dest_record = self.record(dest)?;
        if src_record.type_tag != dest_record.type_tag {
            return Err(PoolFileError::TypeMismatch {
                pool: dest.to_string(),
                actual: dest_record.type_tag.clone(),
                requested: src_record.type_tag.clone(),
            });
        }
        let (src_byte_offset, bytes) =
            Self::byte_range(src_record, src, src_offset, length, src_record.element_count())?;
        let dest_limit = if src == dest {
            dest_record.element_count() - length
        } else {
            dest_record.element_count()
        };
        let (dest_byte_offset, _) = Self::byte_range(dest_record, dest, dest_offset, 0, dest_limit)?;
        if bytes == 0 {
            return Ok(());
        }

        let record = self
            .pools
            .get_mut(src)
            .ok_or_else(|| PoolFileError::NotFound(src.to_string()))?;
        let start = record.split_at(src_byte_offset);
        let stop = record.split_at(src_byte_offset + bytes);
        let moved: Vec<Segment> = record.segments.drain(start..stop).collect();
        record.reindex();

        let record = self
            .pools
            .get_mut(dest)
            .ok_or_else(|| PoolFileError::NotFound(dest.to_string()))?;
        let index = record.split_at(dest_byte_offset);
        record.segments.splice(index..index, moved);
        record.reindex();

        self.tidy(src);
        self.tidy(dest);
        debug!(dest, dest_offset, src, src_offset, length, "Moved data");
        Ok(())
    }

    /// Copies `length` elements from `src` at `src_offset` into newly
    /// inserted space in `dest` at `dest_offset`.
    pub fn copy_data(
        &mut self,
        dest: &str,
        dest_offset: u64,
        src: &str,
        src_offset: u64,
        length: u64,
    ) -> Result<(), PoolFileError> {
        if src == dest {
            return Err(PoolFileError::range(dest, "cannot copy a pool into itself"));
        }
        let src_record = self.record(src)?;
        let dest_record = self.record(dest)?;
        if src_record.type_tag != dest_record.type_tag {
            return Err(PoolFileError::TypeMismatch {
                pool: dest.to_string(),
                actual: dest_record.type_tag.clone(),
                requested: src_record.type_tag.clone(),
            });
        }
        let (src_byte_offset, bytes) =
            Self::byte_range(src_record, src, src_offset, length, src_record.element_count())?;
        let (dest_byte_offset, _) =
            Self::byte_range(dest_record, dest, dest_offset, 0, dest_record.element_count())?;

        self.insert_space(dest, dest_offset, length)?;
        let src_record = self.record(src)?;
        let dest_record = self.record(dest)?;
        let mut buffer = vec![0u8; COPY_BUFFER_BYTES.min(bytes as usize)];
        let mut done = 0;
        while done < bytes {
            let chunk = (bytes - done).min(buffer.len() as u64) as usize;
            self.read_raw(src_record, src_byte_offset + done, &mut buffer[..chunk])?;
            self.write_raw(dest_record, dest_byte_offset + done, &buffer[..chunk])?;
            done += chunk as u64;
        }
        Ok(())
    }

    /// Overwrites `length` elements at `offset` with zero bytes.
    pub fn zero(&self, name: &str, offset: u64, length: u64) -> Result<(), PoolFileError> {
        let record = self.record(name)?;
        let (byte_offset, bytes) =
            Self::byte_range(record, name, offset, length, record.element_count())?;
        let zeros = vec![0u8; COPY_BUFFER_BYTES.min(bytes as usize)];
        let mut done = 0;
        while done < bytes {
            let chunk = (bytes - done).min(zeros.len() as u64) as usize;
            self.write_raw(record, byte_offset + done, &zeros[..chunk])?;
            done += chunk as u64;
        }
        Ok(())
    }

    /// Locates the first byte of a span that must lie wholly inside the
    /// pool. Callers check ranges against the pool size first, so a span
    /// past the end means the record and its size disagree.
    fn span_start(
        record: &PoolRecord,
        byte_offset: u64,
        len: usize,
    ) -> Result<Option<(usize, u64)>, PoolFileError> {
        if len == 0 {
            return Ok(None);
        }
        let end = byte_offset.checked_add(len as u64);
        match (end, record.locate(byte_offset)) {
            (Some(end), Some(start)) if end <= record.byte_size() => Ok(Some(start)),
            _ => Err(PoolFileError::Corruption(format!(
                "{} bytes at {} lie outside a pool of {} bytes",
                len,
                byte_offset,
                record.byte_size()
            ))),
        }
    }

    pub(crate) fn read_raw(
        &self,
        record: &PoolRecord,
        byte_offset: u64,
        buf: &mut [u8],
    ) -> Result<(), PoolFileError> {
        let Some((mut index, mut within)) = Self::span_start(record, byte_offset, buf.len())? else {
            return Ok(());
        };
        let mut done = 0;
        while done < buf.len() {
            let segment = record.segments[index];
            let take = ((segment.length - within) as usize).min(buf.len() - done);
            io::read_exact_at(&self.file, &mut buf[done..done + take], segment.offset + within)?;
            done += take;
            index += 1;
            within = 0;
        }
        Ok(())
    }

    pub(crate) fn write_raw(
        &self,
        record: &PoolRecord,
        byte_offset: u64,
        buf: &[u8],
    ) -> Result<(), PoolFileError> {
        let Some((mut index, mut within)) = Self::span_start(record, byte_offset, buf.len())? else {
            return Ok(());
        };
        let mut done = 0;
        while done < buf.len() {
            let segment = record.segments[index];
            let take = ((segment.length - within) as usize).min(buf.len() - done);
            io::write_all_at(&self.file, &buf[done..done + take], segment.offset + within)?;
            done += take;
            index += 1;
            within = 0;
        }
        Ok(())
    }

    /// Persists the SAT as the new durable state of the file.
    ///
    /// The table is written to space the previous checkpoint does not use,
    /// then the alternate header slot is pointed at it. Only after the header
    /// is written do extents released since the previous checkpoint become
    /// reusable.
    pub fn checkpoint(&mut self) -> Result<(), PoolFileError> {
        let bytes = sat::encode(&self.pools);
        let (offset, capacity) = self.space.allocate_contiguous(bytes.len() as u64, false);
        let generation = self.generation + 1;

        let written = self.grow_file().and_then(|_| {
            io::write_all_at(&self.file, &bytes, offset)?;
            if self.options.sync {
                self.file.sync_data()?;
            }
            let header = FileHeader {
                generation,
                sat_offset: offset,
                sat_length: bytes.len() as u64,
                sat_checksum: checksum(&bytes),
            };
            io::write_all_at(&self.file, &header.encode(), FileHeader::slot_offset(generation))?;
            if self.options.sync {
                self.file.sync_data()?;
            }
            Ok(())
        });
        if let Err(e) = written {
            self.space.free(offset, capacity);
            return Err(e);
        }

        let (old_offset, old_capacity) = std::mem::replace(&mut self.sat_region, (offset, capacity));
        self.generation = generation;
        self.space.free(old_offset, old_capacity);
        self.space.release_quarantine();
        while self.space.trim_tail().is_some() {}
        if self.space.end() < self.file_len {
            self.file.set_len(self.space.end())?;
            self.file_len = self.space.end();
        }

        debug!(
            generation,
            sat_bytes = bytes.len(),
            file_bytes = self.file_len,
            "Checkpointed pool file"
        );
        Ok(())
    }

    /// Captures the in-memory layout.
    pub fn snapshot(&self) -> PoolFileSnapshot {
        PoolFileSnapshot {
            pools: self.pools.clone(),
            space: self.space.clone(),
            sat_region: self.sat_region,
            generation: self.generation,
        }
    }

    /// Restores a layout captured by [`PoolFile::snapshot`]. Only valid while
    /// no checkpoint has happened since the snapshot was taken.
    pub fn restore(&mut self, snapshot: PoolFileSnapshot) {
        debug_assert_eq!(snapshot.generation, self.generation);
        self.pools = snapshot.pools;
        self.space = snapshot.space;
        self.sat_region = snapshot.sat_region;
        self.generation = snapshot.generation;
    }

    /// Rewrites every pool into a single extent packed towards the start of
    /// the file, then truncates the freed tail. All content is copied twice
    /// (first past the end of the file, then back to the front), so this is
    /// meant for offline maintenance. Every relocation is checkpointed before
    /// the next one starts, so an interruption leaves a valid file.
    pub fn defragment(&mut self) -> Result<DefragmentStats, PoolFileError> {
        self.checkpoint()?;
        let mut stats = DefragmentStats {
            bytes_before: self.file_len,
            ..Default::default()
        };

        let mut names: Vec<(u64, String)> = self
            .pools
            .iter()
            .map(|(name, record)| {
                let first = record.segments.first().map(|s| s.offset).unwrap_or(u64::MAX);
                (first, name.clone())
            })
            .collect();
        names.sort();

        for (_, name) in &names {
            self.relocate(name, Placement::End)?;
        }
        for (_, name) in &names {
            if self.relocate(name, Placement::Lowest)? {
                stats.pools_moved += 1;
            }
        }

        stats.bytes_after = self.file_len;
        info!(
            path = %self.path.display(),
            pools_moved = stats.pools_moved,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "Defragmented pool file"
        );
        Ok(stats)
    }

    /// Copies a pool into one new extent and checkpoints. Returns false when
    /// the pool was left where it is.
    fn relocate(&mut self, name: &str, placement: Placement) -> Result<bool, PoolFileError> {
        let (size, single_offset) = {
            let record = self.record(name)?;
            let single = (record.segments.len() == 1).then(|| record.segments[0].offset);
            (record.byte_size(), single)
        };
        if size == 0 {
            return Ok(false);
        }
        let (offset, capacity) = match placement {
            Placement::End => self.space.allocate_at_end(size),
            Placement::Lowest => self.space.allocate_contiguous(size, true),
        };
        if placement == Placement::Lowest && single_offset.is_some_and(|current| offset > current) {
            self.space.free(offset, capacity);
            return Ok(false);
        }
        self.grow_file()?;

        let record = self.record(name)?;
        let mut buffer = vec![0u8; COPY_BUFFER_BYTES.min(size as usize)];
        let mut done = 0;
        while done < size {
            let chunk = (size - done).min(buffer.len() as u64) as usize;
            self.read_raw(record, done, &mut buffer[..chunk])?;
            io::write_all_at(&self.file, &buffer[..chunk], offset + done)?;
            done += chunk as u64;
        }

        let record = self
            .pools
            .get_mut(name)
            .ok_or_else(|| PoolFileError::NotFound(name.to_string()))?;
        let old = std::mem::replace(
            &mut record.segments,
            vec![Segment {
                offset,
                length: size,
                capacity,
            }],
        );
        record.reindex();
        for segment in old {
            self.space.quarantine(segment.offset, segment.capacity);
        }
        self.checkpoint()?;
        debug!(pool = name, offset, bytes = size, "Relocated pool");
        Ok(true)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Placement {
    End,
    Lowest,
}

impl std::fmt::Debug for PoolFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolFile")
            .field("path", &self.path)
            .field("generation", &self.generation)
            .field("pools", &self.pools.len())
            .finish()
    }
}

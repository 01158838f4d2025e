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
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::channel::{channel_pool_name, ChannelAccessor, Sample, MAX_CHANNELS};
use super::format::{FormatInfo, FORMAT_INFO_POOL};
use super::temp::{temp_pool_name, TempHandle, TempSet, TEMP_POOL_PREFIX};
use crate::config::EngineConfig;
use crate::cues::CueIndex;
use crate::error::StoreError;
use crate::peaks::{Peak, PeakCache};
use crate::pool_file::{PoolFile, PoolFileSnapshot};

pub(crate) const USER_NOTES_POOL: &str = "User Notes";

/// A multichannel audio document backed by a pool file.
///
/// A `Document` is only reachable through a [`super::SizeGuard`] or a
/// [`super::ResizeGuard`]. The methods here never change the document's
/// shape; channel content can still be written through [`ChannelAccessor`].
pub struct Document {
    pub(super) pool_file: PoolFile,
    pub(super) config: EngineConfig,
    pub(super) sample_rate: u32,
    pub(super) length: u64,
    pub(super) channel_names: Vec<String>,
    pub(super) modified: AtomicBool,
    pub(super) cues: CueIndex,
    pub(super) peaks: PeakCache,
    pub(super) temp_sets: BTreeMap<TempHandle, TempSet>,
    pub(super) next_temp: u32,
}

/// In-memory state captured before a structural edit.
pub(super) struct DocumentSnapshot {
    pool_file: PoolFileSnapshot,
    generation: u64,
    sample_rate: u32,
    length: u64,
    channel_names: Vec<String>,
    cues: CueIndex,
    temp_sets: BTreeMap<TempHandle, TempSet>,
    next_temp: u32,
}

pub(super) fn check_capacity(config: &EngineConfig, requested: u64) -> Result<(), StoreError> {
    match config.max_length() {
        Some(maximum) if requested > maximum => Err(StoreError::Capacity {
            requested,
            maximum,
        }),
        _ => Ok(()),
    }
}

impl Document {
    /// Lays out a new document in an empty pool file.
    pub(super) fn create(
        mut pool_file: PoolFile,
        config: EngineConfig,
        sample_rate: u32,
        channel_count: usize,
        length: u64,
    ) -> Result<Self, StoreError> {
        if channel_count == 0 || channel_count > MAX_CHANNELS {
            return Err(StoreError::Range(format!(
                "channel count {} is not between 1 and {}",
                channel_count, MAX_CHANNELS
            )));
        }
        if sample_rate == 0 {
            return Err(StoreError::Range("sample rate must be positive".into()));
        }
        let length = length.max(1);
        check_capacity(&config, length)?;

        pool_file.create_pool::<u8>(FORMAT_INFO_POOL)?;
        pool_file.create_pool::<u8>(USER_NOTES_POOL)?;
        let cues = CueIndex::create(&mut pool_file)?;
        let channel_names: Vec<String> = (0..channel_count).map(channel_pool_name).collect();
        for name in &channel_names {
            pool_file.create_pool::<Sample>(name)?;
            pool_file.insert_space(name, 0, length)?;
            pool_file.zero(name, 0, length)?;
        }

        let peaks = PeakCache::new(config.peak_chunk_size(), channel_count, length);
        let mut document = Self {
            pool_file,
            config,
            sample_rate,
            length,
            channel_names,
            modified: AtomicBool::new(false),
            cues,
            peaks,
            temp_sets: BTreeMap::new(),
            next_temp: 0,
        };
        document.flush()?;
        info!(
            path = %document.path().display(),
            channels = channel_count,
            sample_rate,
            length,
            "Created document"
        );
        Ok(document)
    }

    /// Reads a document from an opened pool file, discarding any temp pools
    /// a previous session left behind.
    pub(super) fn load(mut pool_file: PoolFile, config: EngineConfig) -> Result<Self, StoreError> {
        if !pool_file.contains_pool(FORMAT_INFO_POOL) {
            return Err(StoreError::Corruption("file has no format info".into()));
        }
        let format = pool_file.pool_accessor::<u8>(FORMAT_INFO_POOL)?;
        let info = FormatInfo::decode(&format.read_vec(0, format.len() as usize)?)?;

        let channel_count = info.channel_count as usize;
        if channel_count == 0 || channel_count > MAX_CHANNELS {
            return Err(StoreError::Corruption(format!(
                "format info names {} channels",
                channel_count
            )));
        }
        if info.sample_rate == 0 {
            return Err(StoreError::Corruption("format info has a zero sample rate".into()));
        }

        let channel_names: Vec<String> = (0..channel_count).map(channel_pool_name).collect();
        for name in &channel_names {
            if !pool_file.contains_pool(name) {
                return Err(StoreError::Corruption(format!("missing pool {}", name)));
            }
            let size = pool_file.pool_accessor::<Sample>(name)?.len();
            if size != info.length {
                return Err(StoreError::Corruption(format!(
                    "pool {} holds {} samples, format info says {}",
                    name, size, info.length
                )));
            }
        }

        let leftovers: Vec<String> = pool_file
            .pool_names()
            .filter(|name| name.starts_with(TEMP_POOL_PREFIX))
            .map(str::to_string)
            .collect();
        for name in leftovers {
            warn!(pool = %name, "Discarding temp pool left by an earlier session");
            pool_file.remove_pool(&name)?;
        }
        if !pool_file.contains_pool(USER_NOTES_POOL) {
            pool_file.create_pool::<u8>(USER_NOTES_POOL)?;
        }

        let mut length = info.length;
        if length == 0 {
            warn!("Document is empty, padding to one sample");
            for name in &channel_names {
                pool_file.insert_space(name, 0, 1)?;
                pool_file.zero(name, 0, 1)?;
            }
            length = 1;
        }

        let cues = CueIndex::load(&mut pool_file, length)?;
        let peaks = PeakCache::new(config.peak_chunk_size(), channel_count, length);
        let document = Self {
            pool_file,
            config,
            sample_rate: info.sample_rate,
            length,
            channel_names,
            modified: AtomicBool::new(false),
            cues,
            peaks,
            temp_sets: BTreeMap::new(),
            next_temp: 0,
        };
        info!(
            path = %document.path().display(),
            channels = channel_count,
            sample_rate = info.sample_rate,
            length,
            cues = document.cues.len(),
            "Loaded document"
        );
        Ok(document)
    }

    /// Path of the working file.
    pub fn path(&self) -> &Path {
        self.pool_file.path()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }

    /// Length in samples. Every channel has this length, and it is at least 1.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.length as f64 / f64::from(self.sample_rate))
    }

    /// Whether anything changed since the document was loaded or last saved.
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying pool file, for inspection.
    pub fn pool_file(&self) -> &PoolFile {
        &self.pool_file
    }

    fn check_channel(&self, channel: usize) -> Result<(), StoreError> {
        if channel >= self.channel_count() {
            return Err(StoreError::Range(format!(
                "channel {} of {}",
                channel,
                self.channel_count()
            )));
        }
        Ok(())
    }

    /// Read/write access to one channel.
    pub fn channel(&self, channel: usize) -> Result<ChannelAccessor<'_>, StoreError> {
        self.check_channel(channel)?;
        let data = self
            .pool_file
            .pool_accessor::<Sample>(&self.channel_names[channel])?;
        Ok(ChannelAccessor::new(
            data,
            Some((&self.peaks, channel)),
            &self.modified,
        ))
    }

    /// Accessors for every channel, in channel order.
    pub fn channels(&self) -> Result<Vec<ChannelAccessor<'_>>, StoreError> {
        (0..self.channel_count())
            .map(|channel| self.channel(channel))
            .collect()
    }

    /// Min and max of `channel` over `from..to`, or of the sample at `from`
    /// when `from >= to`.
    pub fn peak(&self, channel: usize, from: u64, to: u64) -> Result<Peak, StoreError> {
        self.check_channel(channel)?;
        let data = self
            .pool_file
            .pool_accessor::<Sample>(&self.channel_names[channel])?;
        Ok(self.peaks.query(channel, &data, from, to)?)
    }

    pub fn cues(&self) -> &CueIndex {
        &self.cues
    }

    /// The free-form notes stored with the document.
    pub fn user_notes(&self) -> Result<String, StoreError> {
        let notes = self.pool_file.pool_accessor::<u8>(USER_NOTES_POOL)?;
        let bytes = notes.read_vec(0, notes.len() as usize)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Handles of the temp sets currently held.
    pub fn temp_handles(&self) -> Vec<TempHandle> {
        self.temp_sets.keys().copied().collect()
    }

    fn temp_set(&self, handle: TempHandle) -> Result<&TempSet, StoreError> {
        self.temp_sets
            .get(&handle)
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))
    }

    /// Channels captured in a temp set.
    pub fn temp_mask(&self, handle: TempHandle) -> Result<super::ChannelMask, StoreError> {
        Ok(self.temp_set(handle)?.mask)
    }

    /// Samples held per channel by a temp set.
    pub fn temp_length(&self, handle: TempHandle) -> Result<u64, StoreError> {
        let set = self.temp_set(handle)?;
        let channel = set.mask.channels().next().ok_or_else(|| {
            StoreError::NotFound(format!("{} holds no channels", handle))
        })?;
        Ok(self.pool_file.pool_size(&temp_pool_name(handle, channel))?)
    }

    /// Access to the samples a temp set holds for `channel`.
    pub fn temp_channel(
        &self,
        handle: TempHandle,
        channel: usize,
    ) -> Result<ChannelAccessor<'_>, StoreError> {
        let set = self.temp_set(handle)?;
        if !set.mask.contains(channel) {
            return Err(StoreError::Range(format!(
                "{} holds no data for channel {}",
                handle, channel
            )));
        }
        let name = temp_pool_name(handle, channel);
        let data = self.pool_file.pool_accessor::<Sample>(&name)?;
        Ok(ChannelAccessor::new(data, None, &self.modified))
    }

    /// Rewrites the format record into fresh space and checkpoints the file.
    pub(super) fn flush(&mut self) -> Result<(), StoreError> {
        let info = FormatInfo {
            channel_count: self.channel_count() as u32,
            sample_rate: self.sample_rate,
            length: self.length,
        }
        .encode();
        let size = self.pool_file.pool_size(FORMAT_INFO_POOL)?;
        self.pool_file.remove_space(FORMAT_INFO_POOL, 0, size)?;
        self.pool_file
            .insert_space(FORMAT_INFO_POOL, 0, info.len() as u64)?;
        self.pool_file
            .pool_accessor::<u8>(FORMAT_INFO_POOL)?
            .write(0, &info)?;
        self.pool_file.checkpoint()?;
        Ok(())
    }

    fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            pool_file: self.pool_file.snapshot(),
            generation: self.pool_file.generation(),
            sample_rate: self.sample_rate,
            length: self.length,
            channel_names: self.channel_names.clone(),
            cues: self.cues.clone(),
            temp_sets: self.temp_sets.clone(),
            next_temp: self.next_temp,
        }
    }

    fn restore(&mut self, snapshot: DocumentSnapshot) {
        self.pool_file.restore(snapshot.pool_file);
        self.sample_rate = snapshot.sample_rate;
        self.length = snapshot.length;
        self.channel_names = snapshot.channel_names;
        self.cues = snapshot.cues;
        self.temp_sets = snapshot.temp_sets;
        self.next_temp = snapshot.next_temp;
        self.peaks.reset(self.channel_names.len(), self.length);
    }

    /// Runs a structural edit. If it fails, the document is rolled back to
    /// its state before the call. On success the channel lengths are checked
    /// and, if configured, the file is checkpointed.
    pub(super) fn transact<T>(
        &mut self,
        edit: impl FnOnce(&mut Self) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let snapshot = self.snapshot();
        let result = edit(self).and_then(|value| {
            self.commit()?;
            Ok(value)
        });
        if let Err(e) = &result {
            if self.pool_file.generation() == snapshot.generation {
                warn!(err = %e, "Edit failed, rolling back");
                self.restore(snapshot);
            } else {
                warn!(err = %e, "Edit failed after its checkpoint was written");
            }
        }
        result
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        for name in &self.channel_names {
            let size = self.pool_file.pool_size(name)?;
            assert_eq!(size, self.length, "pool {} diverged from the document length", name);
        }
        self.modified.store(true, Ordering::Release);
        if self.config.auto_checkpoint() {
            self.flush()?;
        }
        debug!(length = self.length, channels = self.channel_count(), "Committed edit");
        Ok(())
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("path", &self.path())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channel_count())
            .field("length", &self.length)
            .field("cues", &self.cues.len())
            .field("temp_sets", &self.temp_sets.len())
            .finish()
    }
}

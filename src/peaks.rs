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
//! Cached min/max summaries of channel data, used for waveform display.
//!
//! Each channel is divided into fixed-size chunks. A chunk's summary is
//! computed lazily the first time a query covers it and is marked dirty again
//! whenever the samples under it change.

use parking_lot::Mutex;

use crate::pool_file::{PoolAccessor, PoolFileError};
use crate::store::Sample;

/// The smallest and largest sample in a range.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Peak {
    pub min: Sample,
    pub max: Sample,
}

impl Peak {
    fn of(value: Sample) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn merge(self, other: Peak) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    fn scan(samples: &[Sample]) -> Option<Self> {
        let (&first, rest) = samples.split_first()?;
        Some(rest.iter().fold(Peak::of(first), |peak, &value| {
            peak.merge(Peak::of(value))
        }))
    }
}

#[derive(Clone, Copy, Debug)]
struct PeakChunk {
    peak: Peak,
    dirty: bool,
}

const DIRTY: PeakChunk = PeakChunk {
    peak: Peak { min: 0.0, max: 0.0 },
    dirty: true,
};

/// Per-channel chunk summaries. Queries take `&self` and run under the size
/// lock; edit hooks take `&mut self` and run under the resize lock.
#[derive(Debug)]
pub struct PeakCache {
    chunk_size: u64,
    channels: Vec<Mutex<Vec<PeakChunk>>>,
}

impl PeakCache {
    pub fn new(chunk_size: u64, channel_count: usize, length: u64) -> Self {
        let mut cache = Self {
            chunk_size: chunk_size.max(1),
            channels: Vec::new(),
        };
        cache.reset(channel_count, length);
        cache
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    fn chunk_count(&self, length: u64) -> usize {
        length.div_ceil(self.chunk_size) as usize
    }

    /// Drops every summary and resizes for the given shape.
    pub(crate) fn reset(&mut self, channel_count: usize, length: u64) {
        let count = self.chunk_count(length);
        self.channels = (0..channel_count)
            .map(|_| Mutex::new(vec![DIRTY; count]))
            .collect();
    }

    /// Returns the min and max of `data[from..to]`. When `from >= to` the
    /// single sample at `from` is summarized.
    pub(crate) fn query(
        &self,
        channel: usize,
        data: &PoolAccessor<'_, Sample>,
        from: u64,
        to: u64,
    ) -> Result<Peak, PoolFileError> {
        let length = data.len();
        if from >= length || to > length {
            return Err(PoolFileError::range(
                data.name(),
                format!("peak range {}..{} exceeds length {}", from, to, length),
            ));
        }
        if from >= to {
            return Ok(Peak::of(data.get(from)?));
        }
        let Some(chunks) = self.channels.get(channel) else {
            return Err(PoolFileError::range(
                data.name(),
                format!("no peak cache for channel {}", channel),
            ));
        };
        let mut chunks = chunks.lock();

        let mut result: Option<Peak> = None;
        for index in (from / self.chunk_size)..=((to - 1) / self.chunk_size) {
            let start = index * self.chunk_size;
            let end = (start + self.chunk_size).min(length);
            let cached = chunks
                .get_mut(index as usize)
                .filter(|_| from <= start && end <= to);
            let peak = match cached {
                Some(chunk) => {
                    if chunk.dirty {
                        chunk.peak = compute(data, start, end)?;
                        chunk.dirty = false;
                    }
                    chunk.peak
                }
                None => compute(data, from.max(start), to.min(end))?,
            };
            result = Some(result.map_or(peak, |acc| acc.merge(peak)));
        }
        Ok(result.unwrap_or_default())
    }

    /// Marks the chunks covering `start..stop` dirty.
    pub(crate) fn invalidate(&self, channel: usize, start: u64, stop: u64) {
        let Some(chunks) = self.channels.get(channel) else {
            return;
        };
        let mut chunks = chunks.lock();
        let first = (start / self.chunk_size) as usize;
        let last = (stop.div_ceil(self.chunk_size) as usize).min(chunks.len());
        for chunk in chunks.iter_mut().take(last).skip(first) {
            chunk.dirty = true;
        }
    }

    /// Follows `length` samples inserted at `at`. Chunk-aligned inserts keep
    /// the summaries on either side; otherwise everything from `at` on is
    /// dirtied.
    pub(crate) fn on_insert(&mut self, channel: usize, at: u64, length: u64, new_length: u64) {
        let count = self.chunk_count(new_length);
        let chunk_size = self.chunk_size;
        let chunks = self.channels[channel].get_mut();
        let first = (at / chunk_size) as usize;
        if at % chunk_size == 0 && length % chunk_size == 0 && first <= chunks.len() {
            let added = (length / chunk_size) as usize;
            chunks.splice(first..first, std::iter::repeat(DIRTY).take(added));
        } else {
            chunks.resize(count, DIRTY);
            dirty_from(chunks, first);
        }
        debug_assert_eq!(chunks.len(), count);
    }

    /// Follows the removal of `length` samples at `at`.
    pub(crate) fn on_remove(&mut self, channel: usize, at: u64, length: u64, new_length: u64) {
        let count = self.chunk_count(new_length);
        let chunk_size = self.chunk_size;
        let chunks = self.channels[channel].get_mut();
        let first = (at / chunk_size) as usize;
        let removed = (length / chunk_size) as usize;
        if at % chunk_size == 0 && length % chunk_size == 0 && first + removed <= chunks.len() {
            chunks.drain(first..first + removed);
        } else {
            chunks.truncate(count);
            chunks.resize(count, DIRTY);
            dirty_from(chunks, first);
        }
        debug_assert_eq!(chunks.len(), count);
    }

    /// Follows a change in length at the end of the channel.
    pub(crate) fn resize(&mut self, channel: usize, old_length: u64, new_length: u64) {
        let count = self.chunk_count(new_length);
        let boundary = (old_length.min(new_length) / self.chunk_size) as usize;
        let chunks = self.channels[channel].get_mut();
        chunks.resize(count, DIRTY);
        dirty_from(chunks, boundary);
    }

    /// Adds `count` channels of all-dirty summaries before channel `at`.
    pub(crate) fn insert_channels(&mut self, at: usize, count: usize, length: u64) {
        let chunks = self.chunk_count(length);
        let added: Vec<_> = (0..count).map(|_| Mutex::new(vec![DIRTY; chunks])).collect();
        self.channels.splice(at..at, added);
    }

    pub(crate) fn remove_channels(&mut self, at: usize, count: usize) {
        self.channels.drain(at..at + count);
    }

    /// Moves the summaries of channel `a` to `b` and vice versa.
    pub(crate) fn swap_channels(&mut self, a: usize, b: usize) {
        self.channels.swap(a, b);
    }

    #[cfg(test)]
    fn dirty_chunks(&self, channel: usize) -> Vec<bool> {
        self.channels[channel]
            .lock()
            .iter()
            .map(|chunk| chunk.dirty)
            .collect()
    }
}

fn dirty_from(chunks: &mut [PeakChunk], first: usize) {
    for chunk in chunks.iter_mut().skip(first) {
        chunk.dirty = true;
    }
}

fn compute(data: &PoolAccessor<'_, Sample>, start: u64, end: u64) -> Result<Peak, PoolFileError> {
    let samples = data.read_vec(start, (end - start) as usize)?;
    Ok(Peak::scan(&samples).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use crate::pool_file::{PoolFile, PoolFileOptions};

    use super::*;

    fn channel_file(samples: &[Sample]) -> (tempfile::TempDir, PoolFile) {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut file = PoolFile::create(
            dir.path().join("peaks.spool"),
            PoolFileOptions {
                sync: false,
                ..Default::default()
            },
        )
        .expect("create");
        file.create_pool::<Sample>("Channel 0").expect("pool");
        file.insert_space("Channel 0", 0, samples.len() as u64)
            .expect("insert");
        file.pool_accessor::<Sample>("Channel 0")
            .expect("accessor")
            .write(0, samples)
            .expect("write");
        (dir, file)
    }

    fn ramp(length: usize) -> Vec<Sample> {
        (0..length).map(|i| (i as Sample / 10.0).sin()).collect()
    }

    fn brute(samples: &[Sample], from: usize, to: usize) -> Peak {
        if from >= to {
            return Peak::of(samples[from]);
        }
        Peak::scan(&samples[from..to]).expect("non-empty")
    }

    #[test]
    fn query_matches_brute_force() {
        let samples = ramp(1234);
        let (_dir, file) = channel_file(&samples);
        let data = file.pool_accessor::<Sample>("Channel 0").expect("accessor");
        let cache = PeakCache::new(100, 1, samples.len() as u64);

        for &(from, to) in &[
            (0, 1234),
            (0, 100),
            (50, 250),
            (99, 101),
            (1200, 1234),
            (700, 700),
            (800, 10),
            (1233, 1234),
        ] {
            let peak = cache.query(0, &data, from, to).expect("query");
            assert_eq!(peak, brute(&samples, from as usize, to as usize), "{from}..{to}");
        }
    }

    #[test]
    fn query_out_of_range() {
        let (_dir, file) = channel_file(&ramp(10));
        let data = file.pool_accessor::<Sample>("Channel 0").expect("accessor");
        let cache = PeakCache::new(4, 1, 10);
        assert!(cache.query(0, &data, 10, 10).is_err());
        assert!(cache.query(0, &data, 0, 11).is_err());
    }

    #[test]
    fn chunks_cleaned_by_query_and_dirtied_by_writes() {
        let samples = ramp(1000);
        let (_dir, file) = channel_file(&samples);
        let data = file.pool_accessor::<Sample>("Channel 0").expect("accessor");
        let cache = PeakCache::new(250, 1, 1000);

        assert_eq!(cache.dirty_chunks(0), vec![true; 4]);
        cache.query(0, &data, 0, 1000).expect("query");
        assert_eq!(cache.dirty_chunks(0), vec![false; 4]);

        data.write(300, &[5.0]).expect("write");
        cache.invalidate(0, 300, 301);
        assert_eq!(cache.dirty_chunks(0), vec![false, true, false, false]);
        let peak = cache.query(0, &data, 0, 1000).expect("query");
        assert_eq!(peak.max, 5.0);
    }

    #[test]
    fn aligned_edits_keep_summaries() {
        let mut cache = PeakCache::new(100, 1, 1000);
        for chunk in cache.channels[0].get_mut().iter_mut() {
            chunk.dirty = false;
        }
        cache.on_insert(0, 200, 200, 1200);
        let dirty = cache.dirty_chunks(0);
        assert_eq!(dirty.len(), 12);
        assert_eq!(dirty.iter().filter(|&&d| d).count(), 2);
        assert!(dirty[2] && dirty[3]);

        cache.on_remove(0, 200, 200, 1000);
        assert_eq!(cache.dirty_chunks(0), vec![false; 10]);
    }

    #[test]
    fn unaligned_edits_dirty_the_tail() {
        let mut cache = PeakCache::new(100, 1, 1000);
        for chunk in cache.channels[0].get_mut().iter_mut() {
            chunk.dirty = false;
        }
        cache.on_remove(0, 450, 30, 970);
        let dirty = cache.dirty_chunks(0);
        assert_eq!(dirty.len(), 10);
        assert_eq!(&dirty[..4], &[false; 4]);
        assert!(dirty[4..].iter().all(|&d| d));

        cache.resize(0, 970, 1010);
        assert_eq!(cache.dirty_chunks(0).len(), 11);
    }

    #[test]
    fn edits_keep_results_correct() {
        let samples = ramp(1000);
        let (_dir, mut file) = channel_file(&samples);
        let mut cache = PeakCache::new(64, 1, 1000);
        {
            let data = file.pool_accessor::<Sample>("Channel 0").expect("accessor");
            cache.query(0, &data, 0, 1000).expect("warm");
        }

        file.remove_space("Channel 0", 128, 64).expect("remove");
        cache.on_remove(0, 128, 64, 936);
        file.insert_space("Channel 0", 10, 7).expect("insert");
        file.zero("Channel 0", 10, 7).expect("zero");
        cache.on_insert(0, 10, 7, 943);

        let mut expected = samples.clone();
        expected.drain(128..192);
        expected.splice(10..10, std::iter::repeat(0.0).take(7));

        let data = file.pool_accessor::<Sample>("Channel 0").expect("accessor");
        for &(from, to) in &[(0, 943), (5, 300), (600, 943)] {
            assert_eq!(
                cache.query(0, &data, from, to).expect("query"),
                brute(&expected, from as usize, to as usize)
            );
        }
    }

    #[test]
    fn channel_layout_changes() {
        let mut cache = PeakCache::new(10, 2, 35);
        cache.insert_channels(1, 2, 35);
        assert_eq!(cache.channels.len(), 4);
        assert_eq!(cache.dirty_chunks(1).len(), 4);
        cache.remove_channels(0, 3);
        assert_eq!(cache.channels.len(), 1);
        cache.channels[0].get_mut()[1].dirty = false;
        cache.insert_channels(1, 1, 35);
        cache.swap_channels(0, 1);
        assert_eq!(cache.dirty_chunks(0), vec![true; 4]);
        assert_eq!(cache.dirty_chunks(1), vec![true, false, true, true]);
        cache.reset(3, 5);
        assert_eq!(cache.channels.len(), 3);
        assert_eq!(cache.dirty_chunks(2).len(), 1);
    }
}

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
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StoreError;
use crate::peaks::PeakCache;
use crate::pool_file::PoolAccessor;

/// The sample type held in every channel.
pub type Sample = f32;

/// Most channels a document can hold.
pub const MAX_CHANNELS: usize = 64;

/// Pool name for channel `index`.
pub(crate) fn channel_pool_name(index: usize) -> String {
    format!("Channel {}", index)
}

/// A set of channel indices, used to select which channels an edit touches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChannelMask(u64);

impl ChannelMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Selects channels `0..count`.
    pub fn all(count: usize) -> Self {
        match count {
            0 => Self(0),
            c if c >= MAX_CHANNELS => Self(u64::MAX),
            c => Self((1u64 << c) - 1),
        }
    }

    /// Selects one channel. Indices past [`MAX_CHANNELS`] select nothing.
    pub fn single(channel: usize) -> Self {
        Self(bit(channel))
    }

    pub fn with(self, channel: usize) -> Self {
        Self(self.0 | bit(channel))
    }

    pub fn without(self, channel: usize) -> Self {
        Self(self.0 & !bit(channel))
    }

    pub fn contains(self, channel: usize) -> bool {
        self.0 & bit(channel) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Whether the mask selects exactly channels `0..count`.
    pub fn is_all(self, count: usize) -> bool {
        self == Self::all(count)
    }

    /// Whether every channel in `self` is also in `other`.
    pub fn is_subset(self, other: ChannelMask) -> bool {
        self.0 & !other.0 == 0
    }

    /// Channels selected by both masks.
    pub fn intersect(self, other: ChannelMask) -> Self {
        Self(self.0 & other.0)
    }

    /// Iterates the selected channel indices in ascending order.
    pub fn channels(self) -> impl Iterator<Item = usize> {
        (0..MAX_CHANNELS).filter(move |&channel| self.contains(channel))
    }

    /// Checks the mask is non-empty and within a document of `channel_count`
    /// channels.
    pub(crate) fn validate(self, channel_count: usize) -> Result<(), StoreError> {
        if self.is_empty() {
            return Err(StoreError::Range("channel mask selects no channels".into()));
        }
        if !self.is_subset(Self::all(channel_count)) {
            return Err(StoreError::Range(format!(
                "channel mask {:#x} selects channels past {}",
                self.0, channel_count
            )));
        }
        Ok(())
    }
}

fn bit(channel: usize) -> u64 {
    if channel < MAX_CHANNELS {
        1u64 << channel
    } else {
        0
    }
}

impl FromIterator<usize> for ChannelMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ChannelMask::empty(), |mask, channel| mask.with(channel))
    }
}

/// Read/write access to one channel's samples. Writes mark the document as
/// modified and dirty the peak chunks they touch.
#[derive(Clone)]
pub struct ChannelAccessor<'a> {
    data: PoolAccessor<'a, Sample>,
    peaks: Option<(&'a PeakCache, usize)>,
    modified: &'a AtomicBool,
}

impl<'a> ChannelAccessor<'a> {
    pub(crate) fn new(
        data: PoolAccessor<'a, Sample>,
        peaks: Option<(&'a PeakCache, usize)>,
        modified: &'a AtomicBool,
    ) -> Self {
        Self {
            data,
            peaks,
            modified,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fills `out` with the samples starting at `offset`.
    pub fn read(&self, offset: u64, out: &mut [Sample]) -> Result<(), StoreError> {
        Ok(self.data.read(offset, out)?)
    }

    pub fn read_vec(&self, offset: u64, count: usize) -> Result<Vec<Sample>, StoreError> {
        Ok(self.data.read_vec(offset, count)?)
    }

    /// Overwrites the samples starting at `offset`.
    pub fn write(&self, offset: u64, samples: &[Sample]) -> Result<(), StoreError> {
        self.data.write(offset, samples)?;
        if let Some((peaks, channel)) = self.peaks {
            peaks.invalidate(channel, offset, offset + samples.len() as u64);
        }
        self.modified.store(true, Ordering::Release);
        Ok(())
    }

    pub fn get(&self, index: u64) -> Result<Sample, StoreError> {
        Ok(self.data.get(index)?)
    }

    pub fn set(&self, index: u64, value: Sample) -> Result<(), StoreError> {
        self.write(index, std::slice::from_ref(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_basics() {
        let mask = ChannelMask::single(0).with(2);
        assert!(mask.contains(0));
        assert!(!mask.contains(1));
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.channels().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(mask.without(0), ChannelMask::single(2));
        assert_eq!([2, 0].into_iter().collect::<ChannelMask>(), mask);
        assert!(mask.is_subset(ChannelMask::all(3)));
        assert_eq!(mask.intersect(ChannelMask::all(2)), ChannelMask::single(0));
        assert!(mask.intersect(ChannelMask::single(1)).is_empty());
        assert!(!mask.is_all(3));
        assert!(ChannelMask::all(3).is_all(3));
        assert_eq!(ChannelMask::all(MAX_CHANNELS).count(), MAX_CHANNELS);
        assert!(ChannelMask::single(MAX_CHANNELS).is_empty());
    }

    #[test]
    fn mask_validation() {
        assert!(ChannelMask::all(2).validate(2).is_ok());
        assert!(matches!(
            ChannelMask::empty().validate(2),
            Err(StoreError::Range(_))
        ));
        assert!(matches!(
            ChannelMask::single(2).validate(2),
            Err(StoreError::Range(_))
        ));
    }
}

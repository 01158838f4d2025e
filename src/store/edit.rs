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
//! Structural edits. Every method here needs the resize lock and either
//! completes or leaves the document as it found it.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::Ordering;

use tracing::{debug, info};

use super::channel::{channel_pool_name, ChannelMask, Sample, MAX_CHANNELS};
use super::document::{check_capacity, Document, USER_NOTES_POOL};
use super::temp::{temp_pool_name, Padding, TempHandle, TempSet, SWAP_SCRATCH_POOL};
use super::ResizeGuard;
use crate::cues::Cue;
use crate::error::StoreError;
use crate::pool_file::DefragmentStats;

/// Which way [`ResizeGuard::rotate`] moves samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotateDirection {
    /// Samples move towards the start; those pushed off the front reappear
    /// at the end.
    Left,
    /// Samples move towards the end; those pushed off the end reappear at
    /// the front.
    Right,
}

fn check_range(at: u64, length: u64, limit: u64) -> Result<(), StoreError> {
    match at.checked_add(length) {
        Some(end) if end <= limit => Ok(()),
        _ => Err(StoreError::Range(format!(
            "{} samples at {} exceeds length {}",
            length, at, limit
        ))),
    }
}

impl Document {
    /// Every channel of the document.
    pub fn all_channels(&self) -> ChannelMask {
        ChannelMask::all(self.channel_count())
    }

    /// Cues follow an edit only when it spans every channel.
    fn adjusts_cues(&self, mask: ChannelMask) -> bool {
        mask.is_all(self.channel_count()) && self.cues.adjustments_enabled()
    }

    /// Refuses an edit that would grow the document past the configured
    /// maximum before any work is done.
    fn check_growth(&self, added: u64, max_length: Option<u64>) -> Result<(), StoreError> {
        let mut target = self.length.saturating_add(added);
        if let Some(max_length) = max_length {
            target = target.min(max_length);
        }
        if target > self.length {
            check_capacity(&self.config, target)?;
        }
        Ok(())
    }

    fn insert_channel_space(
        &mut self,
        channel: usize,
        at: u64,
        length: u64,
        zero_fill: bool,
    ) -> Result<(), StoreError> {
        let name = &self.channel_names[channel];
        self.pool_file.insert_space(name, at, length)?;
        if zero_fill {
            self.pool_file.zero(name, at, length)?;
        }
        let new_length = self.pool_file.pool_size(name)?;
        self.peaks.on_insert(channel, at, length, new_length);
        Ok(())
    }

    fn remove_channel_space(&mut self, channel: usize, at: u64, length: u64) -> Result<(), StoreError> {
        let name = &self.channel_names[channel];
        self.pool_file.remove_space(name, at, length)?;
        let new_length = self.pool_file.pool_size(name)?;
        self.peaks.on_remove(channel, at, length, new_length);
        Ok(())
    }

    /// Brings every channel to the longest channel's length, capped at
    /// `max_length` and raised to at least one sample. Short channels gain
    /// silence at the end; long ones lose their tail.
    fn match_lengths(&mut self, max_length: Option<u64>) -> Result<(), StoreError> {
        let sizes = self.channel_sizes()?;
        let mut target = sizes.iter().copied().max().unwrap_or(0);
        if let Some(max_length) = max_length {
            target = target.min(max_length);
        }
        let target = target.max(1);
        if target > self.length {
            check_capacity(&self.config, target)?;
        }

        for (channel, size) in sizes.into_iter().enumerate() {
            let name = &self.channel_names[channel];
            if size < target {
                self.pool_file.insert_space(name, size, target - size)?;
                self.pool_file.zero(name, size, target - size)?;
            } else if size > target {
                self.pool_file.remove_space(name, target, size - target)?;
            } else {
                continue;
            }
            debug!(channel, from = size, to = target, "Matched channel length");
            self.peaks.resize(channel, size, target);
        }
        self.length = target;
        self.cues.clamp_to_length(&mut self.pool_file, target)
    }

    fn channel_sizes(&self) -> Result<Vec<u64>, StoreError> {
        Ok(self
            .channel_names
            .iter()
            .map(|name| self.pool_file.pool_size(name))
            .collect::<Result<Vec<u64>, _>>()?)
    }

    /// Notes on a temp set which channels `match_lengths` padded, given the
    /// channel sizes from before it ran.
    fn record_padding(&mut self, handle: TempHandle, before: &[u64]) {
        let length = self.length;
        let channels: ChannelMask = before
            .iter()
            .enumerate()
            .filter(|(_, size)| **size < length)
            .map(|(channel, _)| channel)
            .collect();
        let Some(start) = channels.channels().next().map(|channel| before[channel]) else {
            return;
        };
        if channels.channels().any(|channel| before[channel] != start) {
            return;
        }
        if let Some(set) = self.temp_sets.get_mut(&handle) {
            set.padding = Some(Padding {
                channels,
                start,
                document_length: length,
            });
            debug!(%handle, channels = channels.count(), samples = length - start, "Recorded padding");
        }
    }

    /// Takes the padding recorded on a temp set, provided the document has
    /// not changed length since and `fits` accepts it.
    fn take_padding(
        &mut self,
        handle: TempHandle,
        fits: impl FnOnce(&Padding) -> bool,
    ) -> Option<Padding> {
        let length = self.length;
        let set = self.temp_sets.get_mut(&handle)?;
        let padding = set.padding.take()?;
        (padding.document_length == length && fits(&padding)).then_some(padding)
    }

    /// Drops the padding's worth of samples from the end of each padded
    /// channel.
    fn strip_padding(&mut self, padding: Padding) -> Result<(), StoreError> {
        for channel in padding.channels.channels() {
            let size = self.pool_file.pool_size(&self.channel_names[channel])?;
            let length = padding.length().min(size);
            self.remove_channel_space(channel, size - length, length)?;
        }
        debug!(channels = padding.channels.count(), samples = padding.length(), "Stripped padding");
        Ok(())
    }

    fn new_temp_handle(&mut self) -> TempHandle {
        let handle = TempHandle(self.next_temp);
        self.next_temp += 1;
        handle
    }

    /// Moves `length` samples at `at` out of each masked channel into a new
    /// temp set, then appends `fudge` samples following the range, with
    /// silence standing in for any that lie past the end of a channel.
    fn move_out(
        &mut self,
        mask: ChannelMask,
        at: u64,
        length: u64,
        fudge: u64,
    ) -> Result<TempHandle, StoreError> {
        let handle = self.new_temp_handle();
        for channel in mask.channels() {
            let temp = temp_pool_name(handle, channel);
            self.pool_file.create_pool::<Sample>(&temp)?;
            self.pool_file
                .move_data(&temp, 0, &self.channel_names[channel], at, length)?;
            let remaining = self.pool_file.pool_size(&self.channel_names[channel])?;
            self.peaks.on_remove(channel, at, length, remaining);

            let available = fudge.min(remaining - at);
            if available > 0 {
                self.pool_file
                    .copy_data(&temp, length, &self.channel_names[channel], at, available)?;
            }
            if fudge > available {
                self.pool_file
                    .insert_space(&temp, length + available, fudge - available)?;
                self.pool_file
                    .zero(&temp, length + available, fudge - available)?;
            }
        }
        self.temp_sets.insert(handle, TempSet::new(mask));
        debug!(%handle, channels = mask.count(), at, length, fudge, "Moved audio to temp");
        Ok(handle)
    }

    /// Moves the first `length` samples of each masked channel's temp pool
    /// into the channel at `at`.
    fn move_in(
        &mut self,
        mask: ChannelMask,
        handle: TempHandle,
        at: u64,
        length: u64,
    ) -> Result<(), StoreError> {
        for channel in mask.channels() {
            let temp = temp_pool_name(handle, channel);
            self.pool_file
                .move_data(&self.channel_names[channel], at, &temp, 0, length)?;
            let new_length = self.pool_file.pool_size(&self.channel_names[channel])?;
            self.peaks.on_insert(channel, at, length, new_length);
        }
        debug!(%handle, channels = mask.count(), at, length, "Moved audio from temp");
        Ok(())
    }

    fn release_temp(&mut self, handle: TempHandle) -> Result<(), StoreError> {
        let set = self
            .temp_sets
            .remove(&handle)
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))?;
        for channel in set.mask.channels() {
            let temp = temp_pool_name(handle, channel);
            if self.pool_file.contains_pool(&temp) {
                self.pool_file.remove_pool(&temp)?;
            }
        }
        debug!(%handle, "Released temp set");
        Ok(())
    }

    /// Checks that `handle` holds at least `length` samples for every channel
    /// in `mask`.
    fn check_temp(&self, mask: ChannelMask, handle: TempHandle, length: u64) -> Result<(), StoreError> {
        let held = self.temp_mask(handle)?;
        if !mask.is_subset(held) {
            return Err(StoreError::Range(format!(
                "{} holds channels {:#x}, not {:#x}",
                handle,
                held.bits(),
                mask.bits()
            )));
        }
        for channel in mask.channels() {
            let size = self.pool_file.pool_size(&temp_pool_name(handle, channel))?;
            check_range(0, length, size)?;
        }
        Ok(())
    }
}

impl ResizeGuard<'_> {
    /// Inserts `length` samples at `at` in the masked channels, optionally
    /// zero-filled. Unselected channels are padded at the end so all
    /// channels keep equal lengths. The result is capped at `max_length`.
    pub fn add_space(
        &mut self,
        mask: ChannelMask,
        at: u64,
        length: u64,
        zero_fill: bool,
        max_length: Option<u64>,
    ) -> Result<(), StoreError> {
        mask.validate(self.channel_count())?;
        check_range(at, 0, self.length())?;
        self.check_growth(length, max_length)?;
        let adjust = self.adjusts_cues(mask);
        self.document.transact(|doc| {
            for channel in mask.channels() {
                doc.insert_channel_space(channel, at, length, zero_fill)?;
            }
            if adjust {
                doc.cues.adjust_for_insert(&doc.pool_file, at, length)?;
            }
            doc.match_lengths(max_length)
        })
    }

    /// Removes `length` samples at `at` from the masked channels. If the
    /// mask does not cover every channel, the edited channels are padded
    /// with silence at the end and the document keeps its length.
    pub fn remove_space(
        &mut self,
        mask: ChannelMask,
        at: u64,
        length: u64,
        max_length: Option<u64>,
    ) -> Result<(), StoreError> {
        mask.validate(self.channel_count())?;
        check_range(at, length, self.length())?;
        let adjust = self.adjusts_cues(mask);
        self.document.transact(|doc| {
            for channel in mask.channels() {
                doc.remove_channel_space(channel, at, length)?;
            }
            if adjust {
                doc.cues.adjust_for_remove(&mut doc.pool_file, at, length)?;
            }
            doc.match_lengths(max_length)
        })
    }

    /// Moves a range out of the masked channels into a new temp set. The
    /// temp set also receives `fudge` extra samples copied from just after
    /// the range, padded with silence past the end of the channel.
    pub fn move_to_temp(
        &mut self,
        mask: ChannelMask,
        at: u64,
        length: u64,
        fudge: u64,
    ) -> Result<TempHandle, StoreError> {
        mask.validate(self.channel_count())?;
        check_range(at, length, self.length())?;
        let adjust = self.adjusts_cues(mask);
        self.document.transact(|doc| {
            let handle = doc.move_out(mask, at, length, fudge)?;
            if adjust {
                doc.cues.adjust_for_remove(&mut doc.pool_file, at, length)?;
            }
            let before = doc.channel_sizes()?;
            doc.match_lengths(None)?;
            doc.record_padding(handle, &before);
            Ok(handle)
        })
    }

    /// Copies a range of the masked channels into a new temp set, leaving
    /// the document unchanged.
    pub fn copy_to_temp(
        &mut self,
        mask: ChannelMask,
        at: u64,
        length: u64,
    ) -> Result<TempHandle, StoreError> {
        mask.validate(self.channel_count())?;
        check_range(at, length, self.length())?;
        self.document.transact(|doc| {
            let handle = doc.new_temp_handle();
            for channel in mask.channels() {
                let temp = temp_pool_name(handle, channel);
                doc.pool_file.create_pool::<Sample>(&temp)?;
                doc.pool_file
                    .copy_data(&temp, 0, &doc.channel_names[channel], at, length)?;
            }
            doc.temp_sets.insert(handle, TempSet::new(mask));
            debug!(%handle, channels = mask.count(), at, length, "Copied audio to temp");
            Ok(handle)
        })
    }

    /// Moves a range out to a new temp set and fills the hole with
    /// `replace_length` samples of silence.
    pub fn move_to_temp_and_replace(
        &mut self,
        mask: ChannelMask,
        at: u64,
        length: u64,
        replace_length: u64,
        fudge: u64,
    ) -> Result<TempHandle, StoreError> {
        mask.validate(self.channel_count())?;
        check_range(at, length, self.length())?;
        self.check_growth(replace_length.saturating_sub(length), None)?;
        let adjust = self.adjusts_cues(mask);
        self.document.transact(|doc| {
            let handle = doc.move_out(mask, at, length, fudge)?;
            for channel in mask.channels() {
                doc.insert_channel_space(channel, at, replace_length, true)?;
            }
            if adjust {
                doc.cues.adjust_for_remove(&mut doc.pool_file, at, length)?;
                doc.cues.adjust_for_insert(&doc.pool_file, at, replace_length)?;
            }
            let before = doc.channel_sizes()?;
            doc.match_lengths(None)?;
            doc.record_padding(handle, &before);
            Ok(handle)
        })
    }

    /// Moves the first `length` samples of a temp set's channels into the
    /// document at `at`. With `release` the temp set is discarded afterwards.
    pub fn move_from_temp(
        &mut self,
        mask: ChannelMask,
        handle: TempHandle,
        at: u64,
        length: u64,
        release: bool,
        max_length: Option<u64>,
    ) -> Result<(), StoreError> {
        mask.validate(self.channel_count())?;
        self.check_temp(mask, handle, length)?;
        check_range(at, 0, self.length())?;
        self.check_growth(length, max_length)?;
        let adjust = self.adjusts_cues(mask);
        self.document.transact(|doc| {
            let padding = doc.take_padding(handle, |padding| {
                padding.channels.intersect(mask).is_empty() || at <= padding.start
            });
            doc.move_in(mask, handle, at, length)?;
            if adjust {
                doc.cues.adjust_for_insert(&doc.pool_file, at, length)?;
            }
            if let Some(padding) = padding {
                doc.strip_padding(padding)?;
            }
            doc.match_lengths(max_length)?;
            if release {
                doc.release_temp(handle)?;
            }
            Ok(())
        })
    }

    /// Removes `remove_length` samples at `remove_at`, then moves temp data
    /// in at `move_at`, which is a position after the removal.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_then_move_from_temp(
        &mut self,
        mask: ChannelMask,
        remove_at: u64,
        remove_length: u64,
        handle: TempHandle,
        move_at: u64,
        move_length: u64,
        release: bool,
        max_length: Option<u64>,
    ) -> Result<(), StoreError> {
        mask.validate(self.channel_count())?;
        check_range(remove_at, remove_length, self.length())?;
        self.check_temp(mask, handle, move_length)?;
        check_range(move_at, 0, self.length() - remove_length)?;
        self.check_growth(move_length.saturating_sub(remove_length), max_length)?;
        let adjust = self.adjusts_cues(mask);
        self.document.transact(|doc| {
            let padding = doc.take_padding(handle, |padding| {
                padding.channels.intersect(mask).is_empty()
                    || (remove_at + remove_length <= padding.start
                        && move_at <= padding.start - remove_length)
            });
            for channel in mask.channels() {
                doc.remove_channel_space(channel, remove_at, remove_length)?;
            }
            doc.move_in(mask, handle, move_at, move_length)?;
            if adjust {
                doc.cues
                    .adjust_for_remove(&mut doc.pool_file, remove_at, remove_length)?;
                doc.cues.adjust_for_insert(&doc.pool_file, move_at, move_length)?;
            }
            if let Some(padding) = padding {
                doc.strip_padding(padding)?;
            }
            doc.match_lengths(max_length)?;
            if release {
                doc.release_temp(handle)?;
            }
            Ok(())
        })
    }

    /// Deletes a temp set and its pools.
    pub fn discard_temp(&mut self, handle: TempHandle) -> Result<(), StoreError> {
        self.temp_mask(handle)?;
        self.document.transact(|doc| doc.release_temp(handle))
    }

    /// Rotates `start..stop` of the masked channels by `amount` samples.
    pub fn rotate(
        &mut self,
        mask: ChannelMask,
        start: u64,
        stop: u64,
        amount: u64,
        direction: RotateDirection,
    ) -> Result<(), StoreError> {
        mask.validate(self.channel_count())?;
        if start > stop {
            return Err(StoreError::Range(format!(
                "rotation range {}..{} is reversed",
                start, stop
            )));
        }
        check_range(start, stop - start, self.length())?;
        let span = stop - start;
        if span == 0 || amount % span == 0 {
            return Ok(());
        }
        let amount = amount % span;
        self.document.transact(|doc| {
            for channel in mask.channels() {
                let name = &doc.channel_names[channel];
                match direction {
                    RotateDirection::Left => {
                        doc.pool_file
                            .move_data(name, stop - amount, name, start, amount)?
                    }
                    RotateDirection::Right => {
                        doc.pool_file
                            .move_data(name, start, name, stop - amount, amount)?
                    }
                }
                doc.peaks.invalidate(channel, start, stop);
            }
            Ok(())
        })
    }

    /// Exchanges `length` samples at `at` between two channels.
    pub fn swap_channels(
        &mut self,
        a: usize,
        b: usize,
        at: u64,
        length: u64,
    ) -> Result<(), StoreError> {
        ChannelMask::single(a).with(b).validate(self.channel_count())?;
        check_range(at, length, self.length())?;
        if a == b || length == 0 {
            return Ok(());
        }
        self.document.transact(|doc| {
            if doc.pool_file.contains_pool(SWAP_SCRATCH_POOL) {
                doc.pool_file.remove_pool(SWAP_SCRATCH_POOL)?;
            }
            let (name_a, name_b) = (&doc.channel_names[a], &doc.channel_names[b]);
            doc.pool_file.create_pool::<Sample>(SWAP_SCRATCH_POOL)?;
            doc.pool_file
                .move_data(SWAP_SCRATCH_POOL, 0, name_a, at, length)?;
            doc.pool_file.move_data(name_a, at, name_b, at, length)?;
            doc.pool_file
                .move_data(name_b, at, SWAP_SCRATCH_POOL, 0, length)?;
            doc.pool_file.remove_pool(SWAP_SCRATCH_POOL)?;
            if at == 0 && length == doc.length {
                doc.peaks.swap_channels(a, b);
            } else {
                doc.peaks.invalidate(a, at, at + length);
                doc.peaks.invalidate(b, at, at + length);
            }
            Ok(())
        })
    }

    /// Overwrites a range of the masked channels with silence.
    pub fn silence(&mut self, mask: ChannelMask, at: u64, length: u64) -> Result<(), StoreError> {
        mask.validate(self.channel_count())?;
        check_range(at, length, self.length())?;
        for channel in mask.channels() {
            self.document
                .pool_file
                .zero(&self.document.channel_names[channel], at, length)?;
            self.document.peaks.invalidate(channel, at, at + length);
        }
        self.document.modified.store(true, Ordering::Release);
        Ok(())
    }

    /// Inserts `count` silent channels before channel `at`.
    pub fn add_channels(&mut self, at: usize, count: usize) -> Result<(), StoreError> {
        let channel_count = self.channel_count();
        if count == 0 || at > channel_count || channel_count + count > MAX_CHANNELS {
            return Err(StoreError::Range(format!(
                "cannot add {} channels at {} to {} (limit {})",
                count, at, channel_count, MAX_CHANNELS
            )));
        }
        self.document.transact(|doc| {
            for channel in (at..channel_count).rev() {
                doc.pool_file.rename_pool(
                    &channel_pool_name(channel),
                    &channel_pool_name(channel + count),
                )?;
            }
            for channel in at..at + count {
                let name = channel_pool_name(channel);
                doc.pool_file.create_pool::<Sample>(&name)?;
                doc.pool_file.insert_space(&name, 0, doc.length)?;
                doc.pool_file.zero(&name, 0, doc.length)?;
            }
            doc.channel_names = (0..channel_count + count).map(channel_pool_name).collect();
            doc.peaks.insert_channels(at, count, doc.length);
            info!(at, count, channels = channel_count + count, "Added channels");
            Ok(())
        })
    }

    /// Deletes `count` channels starting at `at`. At least one channel must
    /// remain.
    pub fn remove_channels(&mut self, at: usize, count: usize) -> Result<(), StoreError> {
        let channel_count = self.channel_count();
        if count == 0 || at + count > channel_count || count >= channel_count {
            return Err(StoreError::Range(format!(
                "cannot remove {} channels at {} from {}",
                count, at, channel_count
            )));
        }
        self.document.transact(|doc| {
            for channel in at..at + count {
                doc.pool_file.remove_pool(&channel_pool_name(channel))?;
            }
            for channel in at + count..channel_count {
                doc.pool_file.rename_pool(
                    &channel_pool_name(channel),
                    &channel_pool_name(channel - count),
                )?;
            }
            doc.channel_names = (0..channel_count - count).map(channel_pool_name).collect();
            doc.peaks.remove_channels(at, count);
            info!(at, count, channels = channel_count - count, "Removed channels");
            Ok(())
        })
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), StoreError> {
        if sample_rate == 0 {
            return Err(StoreError::Range("sample rate must be positive".into()));
        }
        self.document.transact(|doc| {
            doc.sample_rate = sample_rate;
            Ok(())
        })
    }

    /// Replaces the document's notes.
    pub fn set_user_notes(&mut self, notes: &str) -> Result<(), StoreError> {
        self.document.transact(|doc| {
            let size = doc.pool_file.pool_size(USER_NOTES_POOL)?;
            doc.pool_file.remove_space(USER_NOTES_POOL, 0, size)?;
            doc.pool_file
                .insert_space(USER_NOTES_POOL, 0, notes.len() as u64)?;
            doc.pool_file
                .pool_accessor::<u8>(USER_NOTES_POOL)?
                .write(0, notes.as_bytes())?;
            Ok(())
        })
    }

    /// Adds a cue and returns its index. Names are not required to be unique.
    pub fn add_cue(
        &mut self,
        name: &str,
        time: u64,
        is_anchored: bool,
    ) -> Result<usize, StoreError> {
        let cue = Cue::new(name, time, is_anchored);
        self.document
            .transact(|doc| doc.cues.add(&mut doc.pool_file, cue, doc.length))
    }

    pub fn remove_cue(&mut self, index: usize) -> Result<Cue, StoreError> {
        self.document
            .transact(|doc| doc.cues.remove(&mut doc.pool_file, index))
    }

    /// Replaces the cue at `index`.
    pub fn update_cue(&mut self, index: usize, cue: Cue) -> Result<(), StoreError> {
        self.document
            .transact(|doc| doc.cues.update(&doc.pool_file, index, cue, doc.length))
    }

    pub fn clear_cues(&mut self) -> Result<(), StoreError> {
        self.document
            .transact(|doc| doc.cues.clear(&mut doc.pool_file))
    }

    /// Controls whether cues follow edits that span every channel.
    pub fn set_cue_adjustments_enabled(&mut self, enabled: bool) {
        self.document.cues.set_adjustments_enabled(enabled);
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.document.modified.store(modified, Ordering::Release);
    }

    /// Checkpoints the working file.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.document.flush()
    }

    /// Writes a complete copy of the document to `path`, replacing any file
    /// there only once the copy is on disk.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<(), StoreError> {
        let dest = path.as_ref();
        self.document.flush()?;
        if dest == self.path() {
            self.set_modified(false);
            return Ok(());
        }

        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        let mut source = File::open(self.path())?;
        std::io::copy(&mut source, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged.persist(dest).map_err(|e| StoreError::Io(e.error))?;

        self.set_modified(false);
        info!(path = %dest.display(), bytes = self.pool_file().file_size(), "Saved document");
        Ok(())
    }

    /// Checkpoints, then packs every pool into one extent.
    pub fn defragment(&mut self) -> Result<DefragmentStats, StoreError> {
        self.document.flush()?;
        Ok(self.document.pool_file.defragment()?)
    }
}

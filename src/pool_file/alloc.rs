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

//! Free space bookkeeping for a pool file.

use std::collections::{BTreeMap, BTreeSet};

use super::header::BLOCK_SIZE;

/// Rounds a byte count up to whole blocks.
pub fn round_up(bytes: u64) -> u64 {
    bytes.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Tracks free extents of the file. Space freed since the last checkpoint is
/// quarantined: the committed allocation table may still point at it, so it
/// only becomes reusable once a newer table has been committed.
#[derive(Clone, Debug)]
pub struct FreeSpace {
    by_offset: BTreeMap<u64, u64>,
    by_size: BTreeSet<(u64, u64)>,
    quarantined: Vec<(u64, u64)>,
    end: u64,
}

impl FreeSpace {
    /// Creates free space for an empty data area ending at `end`.
    pub fn new(end: u64) -> Self {
        Self {
            by_offset: BTreeMap::new(),
            by_size: BTreeSet::new(),
            quarantined: Vec::new(),
            end,
        }
    }

    /// Derives the free space of an existing file from the extents in use.
    pub fn from_used(mut used: Vec<(u64, u64)>, data_start: u64, file_len: u64) -> Self {
        let mut space = Self::new(file_len);
        used.sort_unstable();
        let mut cursor = data_start;
        for (offset, length) in used {
            if offset > cursor {
                space.insert(cursor, offset - cursor);
            }
            cursor = cursor.max(offset + length);
        }
        if file_len > cursor {
            space.insert(cursor, file_len - cursor);
        }
        space
    }

    /// The logical end of the file.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Total bytes of reusable free space.
    pub fn free_bytes(&self) -> u64 {
        self.by_offset.values().sum()
    }

    /// Number of separate free extents.
    pub fn fragment_count(&self) -> usize {
        self.by_offset.len()
    }

    /// Total bytes waiting for the next checkpoint.
    pub fn quarantined_bytes(&self) -> u64 {
        self.quarantined.iter().map(|(_, length)| length).sum()
    }

    fn insert(&mut self, offset: u64, length: u64) {
        self.by_offset.insert(offset, length);
        self.by_size.insert((length, offset));
    }

    fn take(&mut self, offset: u64) -> Option<u64> {
        let length = self.by_offset.remove(&offset)?;
        self.by_size.remove(&(length, offset));
        Some(length)
    }

    /// Returns an extent to the free list, merging it with its neighbours.
    pub fn free(&mut self, mut offset: u64, mut length: u64) {
        if length == 0 {
            return;
        }
        if let Some((&previous, &previous_length)) = self.by_offset.range(..offset).next_back() {
            if previous + previous_length == offset {
                self.take(previous);
                offset = previous;
                length += previous_length;
            }
        }
        if let Some(next_length) = self.take(offset + length) {
            length += next_length;
        }
        self.insert(offset, length);
    }

    /// Holds an extent back until [`FreeSpace::release_quarantine`].
    pub fn quarantine(&mut self, offset: u64, length: u64) {
        if length > 0 {
            self.quarantined.push((offset, length));
        }
    }

    /// Makes all quarantined extents reusable. Called once a checkpoint has
    /// committed a table that no longer references them.
    pub fn release_quarantine(&mut self) {
        for (offset, length) in std::mem::take(&mut self.quarantined) {
            self.free(offset, length);
        }
    }

    fn carve(&mut self, offset: u64, wanted: u64) -> (u64, u64) {
        let length = self.take(offset).unwrap_or(0);
        debug_assert!(length >= wanted);
        if length > wanted {
            self.insert(offset + wanted, length - wanted);
        }
        (offset, wanted)
    }

    /// Grows the file by `wanted` bytes, absorbing a free extent at the end of
    /// the file if there is one.
    fn extend(&mut self, wanted: u64) -> (u64, u64) {
        let start = match self.by_offset.range(..self.end).next_back() {
            Some((&offset, &length)) if offset + length == self.end => {
                self.take(offset);
                offset
            }
            _ => self.end,
        };
        self.end = start + wanted;
        (start, wanted)
    }

    /// Allocates at least `bytes` bytes as one or more extents no larger than
    /// `max_piece`. Each piece comes from the smallest free extent that can
    /// hold it; the file is extended only when none can.
    pub fn allocate(&mut self, bytes: u64, max_piece: u64) -> Vec<(u64, u64)> {
        let max_piece = round_up(max_piece.max(1));
        let mut remaining = round_up(bytes);
        let mut pieces = Vec::new();
        while remaining > 0 {
            let wanted = remaining.min(max_piece);
            let best_fit = self
                .by_size
                .range((wanted, 0)..)
                .next()
                .map(|(_, offset)| *offset);
            let piece = match best_fit {
                Some(offset) => self.carve(offset, wanted),
                None => self.extend(wanted),
            };
            pieces.push(piece);
            remaining -= wanted;
        }
        pieces
    }

    /// Allocates one contiguous extent of at least `bytes` bytes. With
    /// `lowest` set, the free extent closest to the start of the file wins
    /// instead of the best fit.
    pub fn allocate_contiguous(&mut self, bytes: u64, lowest: bool) -> (u64, u64) {
        let wanted = round_up(bytes.max(1));
        let found = if lowest {
            self.by_offset
                .iter()
                .find(|(_, length)| **length >= wanted)
                .map(|(offset, _)| *offset)
        } else {
            self.by_size
                .range((wanted, 0)..)
                .next()
                .map(|(_, offset)| *offset)
        };
        match found {
            Some(offset) => self.carve(offset, wanted),
            None => self.extend(wanted),
        }
    }

    /// Allocates one extent at the end of the file, ignoring free extents
    /// elsewhere.
    pub fn allocate_at_end(&mut self, bytes: u64) -> (u64, u64) {
        self.extend(round_up(bytes.max(1)))
    }

    /// Drops a free extent touching the end of the file and returns the new
    /// end if it moved.
    pub fn trim_tail(&mut self) -> Option<u64> {
        let (&offset, &length) = self.by_offset.range(..self.end).next_back()?;
        if offset + length != self.end {
            return None;
        }
        self.take(offset);
        self.end = offset;
        Some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: u64 = 2 * BLOCK_SIZE;

    #[test]
    fn test_extends_when_empty() {
        let mut space = FreeSpace::new(START);
        assert_eq!(space.allocate(10, 1 << 20), vec![(START, BLOCK_SIZE)]);
        assert_eq!(space.end(), START + BLOCK_SIZE);
    }

    #[test]
    fn test_best_fit() {
        let mut space = FreeSpace::new(START + 20 * BLOCK_SIZE);
        space.free(START, 4 * BLOCK_SIZE);
        space.free(START + 10 * BLOCK_SIZE, BLOCK_SIZE);
        space.free(START + 15 * BLOCK_SIZE, 2 * BLOCK_SIZE);

        let pieces = space.allocate(BLOCK_SIZE + 1, 1 << 20);
        assert_eq!(pieces, vec![(START + 15 * BLOCK_SIZE, 2 * BLOCK_SIZE)]);
        assert_eq!(space.fragment_count(), 2);
    }

    #[test]
    fn test_pieces_are_bounded() {
        let mut space = FreeSpace::new(START);
        let pieces = space.allocate(5 * BLOCK_SIZE, 2 * BLOCK_SIZE);
        assert_eq!(
            pieces.iter().map(|(_, length)| *length).collect::<Vec<_>>(),
            vec![2 * BLOCK_SIZE, 2 * BLOCK_SIZE, BLOCK_SIZE]
        );
    }

    #[test]
    fn test_free_coalesces() {
        let mut space = FreeSpace::new(START + 3 * BLOCK_SIZE);
        space.free(START, BLOCK_SIZE);
        space.free(START + 2 * BLOCK_SIZE, BLOCK_SIZE);
        space.free(START + BLOCK_SIZE, BLOCK_SIZE);
        assert_eq!(space.fragment_count(), 1);
        assert_eq!(space.free_bytes(), 3 * BLOCK_SIZE);
    }

    #[test]
    fn test_quarantine_is_not_reused() {
        let mut space = FreeSpace::new(START + BLOCK_SIZE);
        space.quarantine(START, BLOCK_SIZE);
        assert_eq!(space.allocate(1, 1 << 20), vec![(START + BLOCK_SIZE, BLOCK_SIZE)]);

        space.release_quarantine();
        assert_eq!(space.allocate(1, 1 << 20), vec![(START, BLOCK_SIZE)]);
    }

    #[test]
    fn test_extend_absorbs_free_tail() {
        let mut space = FreeSpace::new(START + 2 * BLOCK_SIZE);
        space.free(START + BLOCK_SIZE, BLOCK_SIZE);
        assert_eq!(
            space.allocate_contiguous(3 * BLOCK_SIZE, false),
            (START + BLOCK_SIZE, 3 * BLOCK_SIZE)
        );
        assert_eq!(space.end(), START + 4 * BLOCK_SIZE);
    }

    #[test]
    fn test_from_used_and_trim_tail() {
        let used = vec![(START + BLOCK_SIZE, BLOCK_SIZE)];
        let mut space = FreeSpace::from_used(used, START, START + 4 * BLOCK_SIZE);
        assert_eq!(space.fragment_count(), 2);
        assert_eq!(space.trim_tail(), Some(START + 2 * BLOCK_SIZE));
        assert_eq!(space.free_bytes(), BLOCK_SIZE);
    }
}

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

//! The space allocation table: which extents of the file hold which pool.

use std::collections::BTreeMap;

use super::error::PoolFileError;
use super::header::DATA_START;

/// A contiguous extent of the file holding part of a pool. `length` bytes of
/// pool content start at `offset`; the bytes up to `capacity` are reserved
/// for the pool but hold no content yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub offset: u64,
    pub length: u64,
    pub capacity: u64,
}

/// One row of the allocation table, as shown to inspection tools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SatEntry {
    pub pool: String,
    pub offset: u64,
    pub length: u64,
    pub capacity: u64,
}

/// A pool's layout. The pool's content is its segments concatenated in order.
#[derive(Clone, Debug)]
pub struct PoolRecord {
    pub element_size: u64,
    pub type_tag: String,
    pub segments: Vec<Segment>,
    /// Logical byte offset of each segment within the pool.
    starts: Vec<u64>,
    size: u64,
}

impl PoolRecord {
    pub fn new(element_size: u64, type_tag: &str) -> Self {
        Self {
            element_size,
            type_tag: type_tag.to_string(),
            segments: Vec::new(),
            starts: Vec::new(),
            size: 0,
        }
    }

    fn with_segments(element_size: u64, type_tag: String, segments: Vec<Segment>) -> Self {
        let mut record = Self {
            element_size,
            type_tag,
            segments,
            starts: Vec::new(),
            size: 0,
        };
        record.reindex();
        record
    }

    /// Size of the pool content in bytes.
    pub fn byte_size(&self) -> u64 {
        self.size
    }

    /// Size of the pool content in elements.
    pub fn element_count(&self) -> u64 {
        self.size / self.element_size
    }

    /// Recomputes segment start offsets after the segment list changed.
    pub fn reindex(&mut self) {
        self.starts.clear();
        let mut position = 0;
        for segment in &self.segments {
            self.starts.push(position);
            position += segment.length;
        }
        self.size = position;
        debug_assert!(
            self.size % self.element_size == 0,
            "pool byte length {} is not a multiple of element size {}",
            self.size,
            self.element_size
        );
    }

    /// Finds the segment holding the given byte and the byte's offset within it.
    pub fn locate(&self, byte_offset: u64) -> Option<(usize, u64)> {
        if byte_offset >= self.size {
            return None;
        }
        let index = match self.starts.binary_search(&byte_offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        Some((index, byte_offset - self.starts[index]))
    }

    /// Makes sure a segment boundary exists at the given byte offset and
    /// returns the index of the segment starting there (or the segment count
    /// when the offset is the end of the pool). No data moves; a split
    /// segment's spare capacity stays with its right half.
    pub fn split_at(&mut self, byte_offset: u64) -> usize {
        debug_assert!(byte_offset <= self.size);
        let Some((index, within)) = self.locate(byte_offset) else {
            return self.segments.len();
        };
        if within == 0 {
            return index;
        }

        let segment = self.segments[index];
        self.segments[index] = Segment {
            offset: segment.offset,
            length: within,
            capacity: within,
        };
        self.segments.insert(
            index + 1,
            Segment {
                offset: segment.offset + within,
                length: segment.length - within,
                capacity: segment.capacity - within,
            },
        );
        self.reindex();
        index + 1
    }

    /// Merges neighbouring segments that are also neighbours on disk and
    /// returns the spare capacity that had to be cut from segments which are
    /// no longer at the end of the pool.
    pub fn coalesce(&mut self) -> Vec<(u64, u64)> {
        let mut released = Vec::new();
        let last = self.segments.len().saturating_sub(1);
        for (index, segment) in self.segments.iter_mut().enumerate() {
            if index < last && segment.capacity > segment.length {
                released.push((
                    segment.offset + segment.length,
                    segment.capacity - segment.length,
                ));
                segment.capacity = segment.length;
            }
        }

        let mut merged: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            match merged.last_mut() {
                Some(previous)
                    if previous.length == previous.capacity
                        && previous.offset + previous.capacity == segment.offset =>
                {
                    previous.length += segment.length;
                    previous.capacity += segment.capacity;
                }
                _ => merged.push(segment),
            }
        }
        self.segments = merged;
        self.reindex();
        released
    }
}

/// Serializes the table. All integers are little-endian.
pub fn encode(pools: &BTreeMap<String, PoolRecord>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(pools.len() as u32).to_le_bytes());
    for (name, record) in pools {
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&(record.element_size as u32).to_le_bytes());
        out.extend_from_slice(&(record.type_tag.len() as u16).to_le_bytes());
        out.extend_from_slice(record.type_tag.as_bytes());
        out.extend_from_slice(&(record.segments.len() as u32).to_le_bytes());
        for segment in &record.segments {
            out.extend_from_slice(&segment.offset.to_le_bytes());
            out.extend_from_slice(&segment.length.to_le_bytes());
            out.extend_from_slice(&segment.capacity.to_le_bytes());
        }
    }
    out
}

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, count: usize) -> Result<&'a [u8], PoolFileError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| PoolFileError::Corruption("allocation table is truncated".into()))?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, PoolFileError> {
        let mut raw = [0u8; 2];
        raw.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(raw))
    }

    fn u32(&mut self) -> Result<u32, PoolFileError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, PoolFileError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn string(&mut self) -> Result<String, PoolFileError> {
        let len = self.u16()? as usize;
        String::from_utf8(self.take(len)?.to_vec())
            .map_err(|_| PoolFileError::Corruption("pool name is not UTF-8".into()))
    }
}

/// Deserializes the table produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<BTreeMap<String, PoolRecord>, PoolFileError> {
    let mut reader = Reader { bytes, position: 0 };
    let pool_count = reader.u32()?;
    let mut pools = BTreeMap::new();
    for _ in 0..pool_count {
        let name = reader.string()?;
        let element_size = u64::from(reader.u32()?);
        let type_tag = reader.string()?;
        let segment_count = reader.u32()? as usize;
        let mut segments = Vec::with_capacity(segment_count.min(bytes.len() / 24));
        for _ in 0..segment_count {
            segments.push(Segment {
                offset: reader.u64()?,
                length: reader.u64()?,
                capacity: reader.u64()?,
            });
        }
        if element_size == 0 {
            return Err(PoolFileError::Corruption(format!(
                "pool {} has zero element size",
                name
            )));
        }
        let size = segments
            .iter()
            .try_fold(0u64, |total, segment| total.checked_add(segment.length))
            .ok_or_else(|| PoolFileError::Corruption(format!("pool {} overflows", name)))?;
        if size % element_size != 0 {
            return Err(PoolFileError::Corruption(format!(
                "pool {} is not a whole number of elements",
                name
            )));
        }
        if pools
            .insert(
                name.clone(),
                PoolRecord::with_segments(element_size, type_tag, segments),
            )
            .is_some()
        {
            return Err(PoolFileError::Corruption(format!(
                "pool {} listed twice",
                name
            )));
        }
    }
    if reader.position != bytes.len() {
        return Err(PoolFileError::Corruption(
            "trailing bytes after allocation table".into(),
        ));
    }
    Ok(pools)
}

/// Checks a decoded table against the file it came from. Every segment must
/// lie inside the file's data area and no two extents may overlap.
pub fn validate(
    pools: &BTreeMap<String, PoolRecord>,
    file_len: u64,
    sat_region: (u64, u64),
) -> Result<(), PoolFileError> {
    let mut extents = vec![sat_region];
    for (name, record) in pools {
        let corrupt = |message: &str| PoolFileError::Corruption(format!("pool {}: {}", name, message));
        if record.byte_size() % record.element_size != 0 {
            return Err(corrupt("length is not a whole number of elements"));
        }
        for segment in &record.segments {
            if segment.length == 0 || segment.length > segment.capacity {
                return Err(corrupt("segment length is invalid"));
            }
            let end = segment
                .offset
                .checked_add(segment.capacity)
                .ok_or_else(|| corrupt("segment overflows"))?;
            if segment.offset < DATA_START || end > file_len {
                return Err(corrupt("segment lies outside the file"));
            }
            extents.push((segment.offset, segment.capacity));
        }
    }

    extents.sort_unstable();
    for pair in extents.windows(2) {
        if pair[0].0 + pair[0].1 > pair[1].0 {
            return Err(PoolFileError::Corruption(format!(
                "extents overlap at offset {}",
                pair[1].0
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(segments: &[(u64, u64, u64)]) -> PoolRecord {
        PoolRecord::with_segments(
            4,
            "f32".into(),
            segments
                .iter()
                .map(|(offset, length, capacity)| Segment {
                    offset: *offset,
                    length: *length,
                    capacity: *capacity,
                })
                .collect(),
        )
    }

    #[test]
    fn test_locate() {
        let record = record(&[(8192, 100, 100), (20000, 40, 4096)]);
        assert_eq!(record.byte_size(), 140);
        assert_eq!(record.locate(0), Some((0, 0)));
        assert_eq!(record.locate(99), Some((0, 99)));
        assert_eq!(record.locate(100), Some((1, 0)));
        assert_eq!(record.locate(139), Some((1, 39)));
        assert_eq!(record.locate(140), None);
    }

    #[test]
    fn test_split_keeps_spare_capacity_on_the_right() {
        let mut record = record(&[(8192, 100, 4096)]);
        assert_eq!(record.split_at(40), 1);
        assert_eq!(
            record.segments,
            vec![
                Segment {
                    offset: 8192,
                    length: 40,
                    capacity: 40
                },
                Segment {
                    offset: 8232,
                    length: 60,
                    capacity: 4056
                },
            ]
        );
        // Splitting on an existing boundary is a no-op.
        assert_eq!(record.split_at(40), 1);
        assert_eq!(record.split_at(100), 2);
        assert_eq!(record.segments.len(), 2);
    }

    #[test]
    fn test_coalesce_rejoins_split_segments() {
        let mut record = record(&[(8192, 100, 4096)]);
        record.split_at(40);
        assert!(record.coalesce().is_empty());
        assert_eq!(
            record.segments,
            vec![Segment {
                offset: 8192,
                length: 100,
                capacity: 4096
            }]
        );
    }

    #[test]
    fn test_coalesce_releases_interior_spare_capacity() {
        let mut record = record(&[(8192, 100, 4096), (20000, 8, 8)]);
        assert_eq!(record.coalesce(), vec![(8292, 3996)]);
        assert_eq!(record.segments[0].capacity, 100);
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let mut pools = BTreeMap::new();
        pools.insert("Channel 0".to_string(), record(&[(8192, 100, 100)]));
        let bytes = encode(&pools);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded["Channel 0"].segments, pools["Channel 0"].segments);
        assert!(matches!(
            decode(&bytes[..bytes.len() - 3]),
            Err(PoolFileError::Corruption(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        let mut partial = PoolRecord::new(4, "f32");
        partial.segments.push(Segment {
            offset: 8192,
            length: 6,
            capacity: 8,
        });
        let mut pools = BTreeMap::new();
        pools.insert("a".to_string(), partial);
        assert!(matches!(
            decode(&encode(&pools)),
            Err(PoolFileError::Corruption(_))
        ));

        let mut huge = PoolRecord::new(1, "u8");
        for offset in [8192, 16384] {
            huge.segments.push(Segment {
                offset,
                length: u64::MAX - 1,
                capacity: u64::MAX - 1,
            });
        }
        let mut pools = BTreeMap::new();
        pools.insert("b".to_string(), huge);
        assert!(matches!(
            decode(&encode(&pools)),
            Err(PoolFileError::Corruption(_))
        ));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut pools = BTreeMap::new();
        pools.insert("a".to_string(), record(&[(8192, 100, 100)]));
        pools.insert("b".to_string(), record(&[(8200, 8, 8)]));
        assert!(matches!(
            validate(&pools, 1 << 20, (12288, 64)),
            Err(PoolFileError::Corruption(_))
        ));
    }

    #[test]
    fn test_validate_rejects_segment_past_end_of_file() {
        let mut pools = BTreeMap::new();
        pools.insert("a".to_string(), record(&[(8192, 100, 4096)]));
        assert!(validate(&pools, 8192 + 4096, (0, 0)).is_ok());
        assert!(matches!(
            validate(&pools, 8192 + 100, (0, 0)),
            Err(PoolFileError::Corruption(_))
        ));
    }
}

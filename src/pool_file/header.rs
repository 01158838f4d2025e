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

//! The fixed header slots at the start of every pool file.
//!
//! Two slots alternate between checkpoints. Each slot names the generation
//! it belongs to and where that generation's allocation table lives, so a
//! torn write to one slot leaves the other one usable.

use super::error::PoolFileError;

/// Signature written at the start of both header slots.
pub const SIGNATURE: [u8; 16] = *b"SOUNDPOOL-FILE\0\0";

/// On-disk layout version of the header and allocation table.
pub const FORMAT_VERSION: u32 = 1;

/// Allocation granularity and header slot size.
pub const BLOCK_SIZE: u64 = 4096;

/// Number of header slots.
pub const HEADER_SLOTS: u64 = 2;

/// First byte available to pool data.
pub const DATA_START: u64 = BLOCK_SIZE * HEADER_SLOTS;

/// Number of meaningful bytes in a header slot; the rest of the block is zero.
const ENCODED_LEN: usize = 64;

/// One decoded header slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub generation: u64,
    pub sat_offset: u64,
    pub sat_length: u64,
    pub sat_checksum: u64,
}

impl FileHeader {
    /// Byte offset of the slot that the given generation is written to.
    pub fn slot_offset(generation: u64) -> u64 {
        (generation % HEADER_SLOTS) * BLOCK_SIZE
    }

    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut buf = [0u8; ENCODED_LEN];
        buf[0..16].copy_from_slice(&SIGNATURE);
        buf[16..20].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[20..24].copy_from_slice(&(BLOCK_SIZE as u32).to_le_bytes());
        write_u64(&mut buf, 24, self.generation);
        write_u64(&mut buf, 32, self.sat_offset);
        write_u64(&mut buf, 40, self.sat_length);
        write_u64(&mut buf, 48, self.sat_checksum);
        let checksum = checksum(&buf[0..56]);
        write_u64(&mut buf, 56, checksum);
        buf
    }

    /// Decodes a slot. Returns `Ok(None)` for a slot that was never written,
    /// or whose signature or checksum does not match. A torn write can hit
    /// any byte of the slot, so neither is fatal on its own; the caller
    /// refuses the file when no slot decodes.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>, PoolFileError> {
        if buf.len() < ENCODED_LEN {
            return Err(PoolFileError::Corruption("header too small".into()));
        }
        if buf[0..16] != SIGNATURE || read_u64(buf, 56) != checksum(&buf[0..56]) {
            return Ok(None);
        }
        let version = u32::from_le_bytes(read_4(buf, 16));
        if version != FORMAT_VERSION {
            return Err(PoolFileError::Corruption(format!(
                "unsupported pool file version {}",
                version
            )));
        }
        let block_size = u32::from_le_bytes(read_4(buf, 20));
        if u64::from(block_size) != BLOCK_SIZE {
            return Err(PoolFileError::Corruption(format!(
                "unsupported block size {}",
                block_size
            )));
        }

        Ok(Some(Self {
            generation: read_u64(buf, 24),
            sat_offset: read_u64(buf, 32),
            sat_length: read_u64(buf, 40),
            sat_checksum: read_u64(buf, 48),
        }))
    }
}

/// FNV-1a over the given bytes.
pub fn checksum(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(PRIME)
    })
}

fn read_4(buf: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    out
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(out)
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FileHeader {
        FileHeader {
            generation: 7,
            sat_offset: DATA_START,
            sat_length: 120,
            sat_checksum: 0xdead_beef,
        }
    }

    #[test]
    fn test_decode_encoded_header() {
        let decoded = FileHeader::decode(&header().encode()).unwrap();
        assert_eq!(decoded, Some(header()));
    }

    #[test]
    fn test_blank_slot_is_empty() {
        assert_eq!(FileHeader::decode(&[0u8; 64]).unwrap(), None);
    }

    #[test]
    fn test_torn_slot_is_ignored() {
        let mut buf = header().encode();
        buf[30] ^= 0xff;
        assert_eq!(FileHeader::decode(&buf).unwrap(), None);
    }

    #[test]
    fn test_bad_signature_is_ignored() {
        let mut buf = header().encode();
        buf[3] = b'X';
        assert_eq!(FileHeader::decode(&buf).unwrap(), None);
    }

    #[test]
    fn test_short_slot_is_corrupt() {
        assert!(matches!(
            FileHeader::decode(&[0u8; 10]),
            Err(PoolFileError::Corruption(_))
        ));
    }

    #[test]
    fn test_slots_alternate() {
        assert_eq!(FileHeader::slot_offset(2), 0);
        assert_eq!(FileHeader::slot_offset(3), BLOCK_SIZE);
    }
}

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
//! The "Format Info" pool: a small versioned record describing the document.
//!
//! Layout, all integers little-endian:
//!
//! | version | fields                                                         |
//! |---------|----------------------------------------------------------------|
//! | 1       | version u32, channels u32, sample rate u32, length u64          |
//! | 2       | v1 followed by a sample byte-order byte (0 little, 1 big)       |
//! | 3       | v2 followed by a sample encoding byte (1 = 32-bit float)        |
//!
//! Version 3 is written; all three are read.

use crate::error::StoreError;

pub(crate) const FORMAT_INFO_POOL: &str = "Format Info";

const CURRENT_VERSION: u32 = 3;
const V1_SIZE: usize = 20;

const LITTLE_ENDIAN: u8 = 0;
const BIG_ENDIAN: u8 = 1;
const ENCODING_F32: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FormatInfo {
    pub channel_count: u32,
    pub sample_rate: u32,
    pub length: u64,
}

impl FormatInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(V1_SIZE + 2);
        out.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
        out.extend_from_slice(&self.channel_count.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
        out.push(LITTLE_ENDIAN);
        out.push(ENCODING_F32);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let field = |range: std::ops::Range<usize>| {
            bytes.get(range).ok_or_else(|| {
                StoreError::Corruption(format!("format info is truncated at {} bytes", bytes.len()))
            })
        };
        let u32_at = |offset: usize| -> Result<u32, StoreError> {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(field(offset..offset + 4)?);
            Ok(u32::from_le_bytes(raw))
        };

        let version = u32_at(0)?;
        let required = match version {
            1 => V1_SIZE,
            2 => V1_SIZE + 1,
            3 => V1_SIZE + 2,
            v => {
                return Err(StoreError::UnsupportedFormat(format!(
                    "format info version {}",
                    v
                )))
            }
        };
        field(0..required)?;

        let mut length = [0u8; 8];
        length.copy_from_slice(field(12..20)?);
        let info = Self {
            channel_count: u32_at(4)?,
            sample_rate: u32_at(8)?,
            length: u64::from_le_bytes(length),
        };

        if version >= 2 {
            match bytes[V1_SIZE] {
                LITTLE_ENDIAN => {}
                BIG_ENDIAN => {
                    return Err(StoreError::UnsupportedFormat(
                        "big-endian sample data".into(),
                    ))
                }
                other => {
                    return Err(StoreError::Corruption(format!(
                        "unknown byte order marker {}",
                        other
                    )))
                }
            }
        }
        if version >= 3 && bytes[V1_SIZE + 1] != ENCODING_F32 {
            return Err(StoreError::UnsupportedFormat(format!(
                "sample encoding {}",
                bytes[V1_SIZE + 1]
            )));
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1(channels: u32, rate: u32, length: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
        out
    }

    #[test]
    fn current_version() {
        let info = FormatInfo {
            channel_count: 2,
            sample_rate: 44100,
            length: 123_456_789_012,
        };
        let bytes = info.encode();
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(FormatInfo::decode(&bytes).expect("decode"), info);
    }

    #[test]
    fn older_versions() {
        let expected = FormatInfo {
            channel_count: 1,
            sample_rate: 8000,
            length: 99,
        };
        assert_eq!(FormatInfo::decode(&v1(1, 8000, 99)).expect("v1"), expected);

        let mut v2 = v1(1, 8000, 99);
        v2[0] = 2;
        v2.push(LITTLE_ENDIAN);
        assert_eq!(FormatInfo::decode(&v2).expect("v2"), expected);

        v2[V1_SIZE] = BIG_ENDIAN;
        assert!(matches!(
            FormatInfo::decode(&v2),
            Err(StoreError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn rejects_bad_records() {
        assert!(matches!(
            FormatInfo::decode(&[3, 0]),
            Err(StoreError::Corruption(_))
        ));
        let mut bytes = v1(1, 1, 1);
        bytes[0] = 9;
        assert!(matches!(
            FormatInfo::decode(&bytes),
            Err(StoreError::UnsupportedFormat(_))
        ));
        let mut bytes = FormatInfo {
            channel_count: 1,
            sample_rate: 1,
            length: 1,
        }
        .encode();
        bytes[V1_SIZE + 1] = 7;
        assert!(matches!(
            FormatInfo::decode(&bytes),
            Err(StoreError::UnsupportedFormat(_))
        ));
        bytes.truncate(V1_SIZE + 1);
        assert!(matches!(
            FormatInfo::decode(&bytes),
            Err(StoreError::Corruption(_))
        ));
    }
}

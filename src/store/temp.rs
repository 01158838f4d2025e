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
use std::fmt;

use super::channel::ChannelMask;

/// Pools whose names start with this are temporary and never outlive a
/// session.
pub(crate) const TEMP_POOL_PREFIX: &str = "Temp ";

/// Scratch pool used while swapping channels.
pub(crate) const SWAP_SCRATCH_POOL: &str = "Temp Swap";

/// Identifies a set of temporary pools holding audio moved or copied out of
/// the document, one pool per channel in the originating mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempHandle(pub(crate) u32);

impl fmt::Display for TempHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "temp #{}", self.0)
    }
}

/// Bookkeeping for one temp set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TempSet {
    pub mask: ChannelMask,
    /// Silence appended when the set was moved out, if any.
    pub padding: Option<Padding>,
}

impl TempSet {
    pub fn new(mask: ChannelMask) -> Self {
        Self {
            mask,
            padding: None,
        }
    }
}

/// Trailing silence added to `channels` to keep lengths equal after a
/// partial move out. Each padded channel held `start` samples before the
/// silence and the document was `document_length` long afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Padding {
    pub channels: ChannelMask,
    pub start: u64,
    pub document_length: u64,
}

impl Padding {
    pub fn length(&self) -> u64 {
        self.document_length - self.start
    }
}

pub(crate) fn temp_pool_name(handle: TempHandle, channel: usize) -> String {
    format!("{}{} Channel {}", TEMP_POOL_PREFIX, handle.0, channel)
}

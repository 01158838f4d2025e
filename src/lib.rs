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
//! A crash-safe store for multichannel audio documents.
//!
//! Audio lives in a [`pool_file::PoolFile`]: a single file holding named,
//! typed, growable arrays called pools. Inserting or removing a range of a
//! pool relinks segments instead of moving data, so edits cost time in
//! proportion to the number of segments touched rather than the length of
//! the audio. A [`store::SampleStore`] builds a document (channels, cues,
//! notes and temporary clipboard pools) on top, guarded by a shared size
//! lock and an exclusive resize lock.
pub mod config;
pub mod cues;
pub mod error;
pub mod peaks;
pub mod pool_file;
pub mod store;
pub mod translator;
pub mod util;

pub use config::EngineConfig;
pub use error::StoreError;
pub use store::{ChannelMask, Sample, SampleStore};

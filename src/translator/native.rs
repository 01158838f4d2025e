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
use std::path::Path;

use super::{has_extension, Translator, TranslatorError};
use crate::config::EngineConfig;
use crate::store::SampleStore;

/// File extension of native pool files.
pub const NATIVE_EXTENSION: &str = "spool";

/// Reads and writes the store's own pool file format.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeTranslator;

impl Translator for NativeTranslator {
    fn name(&self) -> &'static str {
        "Native"
    }

    fn handles_path(&self, path: &Path) -> bool {
        has_extension(path, &[NATIVE_EXTENSION])
    }

    fn load(&self, path: &Path, config: &EngineConfig) -> Result<SampleStore, TranslatorError> {
        Ok(SampleStore::open_working(path, config)?)
    }

    fn save(&self, store: &SampleStore, path: &Path) -> Result<(), TranslatorError> {
        store.lock_resize()?.save_as(path)?;
        Ok(())
    }
}

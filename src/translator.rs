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
//! Loading and saving documents in external file formats.
//!
//! A translator only touches a [`SampleStore`] through its public API, so
//! formats can be added without reaching into pool internals.

use std::path::Path;

use crate::config::EngineConfig;
use crate::store::SampleStore;

mod error;
mod native;
mod wav;

pub use error::TranslatorError;
pub use native::NativeTranslator;
pub use wav::WavTranslator;

/// Samples per channel moved between a file and the store at a time.
const BLOCK_FRAMES: usize = 4096;

/// Converts between a file format and a [`SampleStore`].
pub trait Translator: Send + Sync {
    /// Short display name of the format.
    fn name(&self) -> &'static str;

    /// Whether this translator claims `path`, judged by its extension.
    fn handles_path(&self, path: &Path) -> bool;

    /// Reads `path` into a new store.
    fn load(&self, path: &Path, config: &EngineConfig) -> Result<SampleStore, TranslatorError>;

    /// Writes the store's document to `path`.
    fn save(&self, store: &SampleStore, path: &Path) -> Result<(), TranslatorError>;
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Every built-in translator.
pub fn translators() -> Vec<Box<dyn Translator>> {
    vec![
        Box::new(NativeTranslator),
        Box::new(WavTranslator::default()),
    ]
}

/// Finds the translator for `path`.
pub fn translator_for(path: &Path) -> Result<Box<dyn Translator>, TranslatorError> {
    translators()
        .into_iter()
        .find(|translator| translator.handles_path(path))
        .ok_or_else(|| TranslatorError::Unsupported(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_translator_lookup() {
        assert_eq!(
            translator_for(Path::new("a/b/song.WAV")).unwrap().name(),
            "WAV"
        );
        assert_eq!(
            translator_for(Path::new("song.spool")).unwrap().name(),
            "Native"
        );
        assert!(matches!(
            translator_for(Path::new("song.flac")),
            Err(TranslatorError::Unsupported(_))
        ));
        assert!(translator_for(Path::new("no_extension")).is_err());
    }
}

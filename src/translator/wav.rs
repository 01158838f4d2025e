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

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::info;

use super::{has_extension, Translator, TranslatorError, BLOCK_FRAMES};
use crate::config::EngineConfig;
use crate::store::{ChannelAccessor, Sample, SampleStore, MAX_CHANNELS};

/// Reads integer and float WAV files; writes 32-bit float, or 16/24-bit
/// integer PCM when configured.
#[derive(Clone, Copy, Debug)]
pub struct WavTranslator {
    bits_per_sample: u16,
}

impl Default for WavTranslator {
    fn default() -> Self {
        Self {
            bits_per_sample: 32,
        }
    }
}

impl WavTranslator {
    /// A translator that writes `bits_per_sample`-bit files. 32 bits are
    /// written as float, 16 and 24 as integers.
    pub fn with_bits_per_sample(bits_per_sample: u16) -> Result<Self, TranslatorError> {
        match bits_per_sample {
            16 | 24 | 32 => Ok(Self { bits_per_sample }),
            other => Err(TranslatorError::Unsupported(format!(
                "{}-bit WAV output",
                other
            ))),
        }
    }

    fn spec(&self, channels: u16, sample_rate: u32) -> WavSpec {
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: if self.bits_per_sample == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

impl Translator for WavTranslator {
    fn name(&self) -> &'static str {
        "WAV"
    }

    fn handles_path(&self, path: &Path) -> bool {
        has_extension(path, &["wav", "wave"])
    }

    fn load(&self, path: &Path, config: &EngineConfig) -> Result<SampleStore, TranslatorError> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels);
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(TranslatorError::Unsupported(format!(
                "{} channel WAV file",
                channels
            )));
        }
        let frames = u64::from(reader.duration());
        let store = SampleStore::create(spec.sample_rate, channels, frames, config)?;

        {
            let guard = store.lock_size()?;
            let accessors = guard.channels()?;
            let mut planar: Vec<Vec<Sample>> = vec![Vec::with_capacity(BLOCK_FRAMES); channels];
            let mut position = 0u64;
            let mut channel = 0;

            let samples: Box<dyn Iterator<Item = Result<Sample, hound::Error>> + '_> =
                match spec.sample_format {
                    SampleFormat::Float => Box::new(reader.samples::<f32>()),
                    SampleFormat::Int => {
                        let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as Sample;
                        Box::new(
                            reader
                                .samples::<i32>()
                                .map(move |sample| sample.map(|value| value as Sample * scale)),
                        )
                    }
                };
            for sample in samples {
                planar[channel].push(sample?);
                channel += 1;
                if channel == channels {
                    channel = 0;
                    if planar[0].len() == BLOCK_FRAMES {
                        write_block(&accessors, &mut planar, &mut position)?;
                    }
                }
            }
            write_block(&accessors, &mut planar, &mut position)?;
        }

        store.lock_resize()?.set_modified(false);
        info!(
            path = %path.display(),
            channels,
            sample_rate = spec.sample_rate,
            bits = spec.bits_per_sample,
            frames,
            "Loaded WAV file"
        );
        Ok(store)
    }

    fn save(&self, store: &SampleStore, path: &Path) -> Result<(), TranslatorError> {
        let guard = store.lock_size()?;
        let spec = self.spec(guard.channel_count() as u16, guard.sample_rate());
        let mut writer = WavWriter::create(path, spec)?;
        let accessors = guard.channels()?;
        let length = guard.length();
        let int_scale = ((1i64 << (self.bits_per_sample - 1)) - 1) as Sample;

        let mut planar = vec![vec![0.0; BLOCK_FRAMES]; accessors.len()];
        let mut position = 0u64;
        while position < length {
            let frames = (length - position).min(BLOCK_FRAMES as u64) as usize;
            for (accessor, samples) in accessors.iter().zip(planar.iter_mut()) {
                accessor.read(position, &mut samples[..frames])?;
            }
            for frame in 0..frames {
                for samples in &planar {
                    let sample = samples[frame];
                    if spec.sample_format == SampleFormat::Float {
                        writer.write_sample(sample)?;
                    } else {
                        writer.write_sample((sample.clamp(-1.0, 1.0) * int_scale).round() as i32)?;
                    }
                }
            }
            position += frames as u64;
        }
        writer.finalize()?;
        info!(
            path = %path.display(),
            channels = spec.channels,
            bits = spec.bits_per_sample,
            frames = length,
            "Saved WAV file"
        );
        Ok(())
    }
}

/// Writes buffered de-interleaved samples to each channel and advances
/// `position` past them.
fn write_block(
    accessors: &[ChannelAccessor<'_>],
    planar: &mut [Vec<Sample>],
    position: &mut u64,
) -> Result<(), TranslatorError> {
    let frames = planar.first().map_or(0, Vec::len) as u64;
    for (accessor, samples) in accessors.iter().zip(planar.iter_mut()) {
        accessor.write(*position, samples)?;
        samples.clear();
    }
    *position += frames;
    Ok(())
}

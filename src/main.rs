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
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{crate_version, Parser, Subcommand};
use tracing::{error, info};

use soundpool::pool_file::PoolFile;
use soundpool::translator::{translator_for, NativeTranslator, Translator, WavTranslator};
use soundpool::util::{bytes_display, duration_display, filename_display};
use soundpool::{EngineConfig, SampleStore};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Inspects and converts soundpool documents."
)]
struct Cli {
    /// Path to a YAML engine config. SOUNDPOOL_* environment variables
    /// override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints a document's format, length, cues and notes.
    Info {
        /// The document to describe, in any supported format.
        path: PathBuf,
    },
    /// Lists the pools and segments of a pool file.
    Pools {
        /// The pool file to list.
        path: PathBuf,
    },
    /// Checks that a pool file opens cleanly as a document.
    Verify {
        /// The pool file to check.
        path: PathBuf,
    },
    /// Packs every pool of a pool file into a single extent, in place.
    Defrag {
        /// The pool file to defragment.
        path: PathBuf,
    },
    /// Converts an audio file into a native pool file.
    Import {
        /// The file to read, e.g. a WAV file.
        input: PathBuf,
        /// The pool file to write.
        output: PathBuf,
    },
    /// Converts a native pool file into another format.
    Export {
        /// The pool file to read.
        input: PathBuf,
        /// The file to write; the format follows its extension.
        output: PathBuf,
        /// Bits per sample for WAV output (16, 24 or 32).
        #[arg(short, long, default_value_t = 32)]
        bits: u16,
    },
}

fn describe(path: &Path, config: &EngineConfig) -> Result<(), Box<dyn Error>> {
    let store = translator_for(path)?.load(path, config)?;
    {
        let document = store.lock_size()?;
        println!("{}:", filename_display(path));
        println!("  Channels:    {}", document.channel_count());
        println!("  Sample rate: {} Hz", document.sample_rate());
        println!(
            "  Length:      {} samples ({})",
            document.length(),
            duration_display(document.duration())
        );
        let cues = document.cues();
        println!("  Cues ({}):", cues.len());
        for (_, cue) in cues.iter() {
            println!("  - {}", cue);
        }
        let notes = document.user_notes()?;
        if !notes.is_empty() {
            println!("  Notes:");
            for line in notes.lines() {
                println!("    {}", line);
            }
        }
    }
    store.close()?;
    Ok(())
}

fn pools(path: &Path, config: &EngineConfig) -> Result<(), Box<dyn Error>> {
    let pool_file = PoolFile::open(path, config.pool_file_options())?;
    println!(
        "{} (generation {}, {}, {} free in {} fragments):",
        filename_display(path),
        pool_file.generation(),
        bytes_display(pool_file.file_size()),
        bytes_display(pool_file.free_bytes()),
        pool_file.free_fragments()
    );
    for name in pool_file.pool_names() {
        println!(
            "- {} [{}]: {} elements in {} segments",
            name,
            pool_file.pool_type(name)?,
            pool_file.pool_size(name)?,
            pool_file.pool_segment_count(name)?
        );
    }
    for entry in pool_file.sat_entries() {
        println!(
            "    {:<24} offset {:>12} length {:>12} capacity {:>12}",
            entry.pool, entry.offset, entry.length, entry.capacity
        );
    }
    Ok(())
}

fn verify(path: &Path, config: &EngineConfig) -> Result<(), Box<dyn Error>> {
    let store = SampleStore::open_working(path, config)?;
    {
        let document = store.lock_size()?;
        for channel in 0..document.channel_count() {
            document.peak(channel, 0, document.length())?;
        }
        println!(
            "{}: OK ({} channels, {} samples, {} cues)",
            filename_display(path),
            document.channel_count(),
            document.length(),
            document.cues().len()
        );
    }
    store.close()?;
    Ok(())
}

fn defrag(path: &Path, config: &EngineConfig) -> Result<(), Box<dyn Error>> {
    let store = SampleStore::recover(path, config)?;
    let stats = store.lock_resize()?.defragment()?;
    println!(
        "{}: moved {} pools, {} -> {}",
        filename_display(path),
        stats.pools_moved,
        bytes_display(stats.bytes_before),
        bytes_display(stats.bytes_after)
    );
    store.close()?;
    Ok(())
}

fn import(input: &Path, output: &Path, config: &EngineConfig) -> Result<(), Box<dyn Error>> {
    let translator = translator_for(input)?;
    let store = translator.load(input, config)?;
    NativeTranslator.save(&store, output)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        format = translator.name(),
        "Imported"
    );
    store.close()?;
    Ok(())
}

fn export(
    input: &Path,
    output: &Path,
    bits: u16,
    config: &EngineConfig,
) -> Result<(), Box<dyn Error>> {
    let store = NativeTranslator.load(input, config)?;
    let wav = WavTranslator::with_bits_per_sample(bits)?;
    let translator: Box<dyn Translator> = if wav.handles_path(output) {
        Box::new(wav)
    } else {
        translator_for(output)?
    };
    translator.save(&store, output)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        format = translator.name(),
        "Exported"
    );
    store.close()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = run(cli);
    if let Err(e) = &result {
        error!(err = %e, "Command failed");
    }
    result
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { path } => describe(&path, &config),
        Commands::Pools { path } => pools(&path, &config),
        Commands::Verify { path } => verify(&path, &config),
        Commands::Defrag { path } => defrag(&path, &config),
        Commands::Import { input, output } => import(&input, &output, &config),
        Commands::Export {
            input,
            output,
            bits,
        } => export(&input, &output, bits, &config),
    }
}

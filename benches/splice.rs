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
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use soundpool::pool_file::{PoolFile, PoolFileOptions};
use soundpool::{ChannelMask, EngineConfig, SampleStore};

fn options() -> PoolFileOptions {
    PoolFileOptions {
        sync: false,
        ..Default::default()
    }
}

fn benchmark_splice(c: &mut Criterion) {
    let mut group = c.benchmark_group("splice");

    // Splice cost should track segment count, not pool length.
    for length in [1u64 << 16, 1 << 20, 1 << 24] {
        let dir = tempfile::tempdir().unwrap();
        let mut pool_file = PoolFile::create(dir.path().join("bench.spool"), options()).unwrap();
        pool_file.create_pool::<f32>("samples").unwrap();
        pool_file.insert_space("samples", 0, length).unwrap();

        group.bench_with_input(BenchmarkId::new("insert_remove_middle", length), &length, |b, &length| {
            b.iter(|| {
                pool_file.insert_space("samples", black_box(length / 2), 1000).unwrap();
                pool_file.remove_space("samples", black_box(length / 2), 1000).unwrap();
            })
        });
    }

    group.finish();
}

fn benchmark_cut_paste(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::default()
        .with_working_dir(dir.path())
        .with_sync(false)
        .with_auto_checkpoint(false);
    let store = SampleStore::create(48000, 2, 48000 * 60, &config).unwrap();
    let mask = ChannelMask::all(2);

    c.bench_function("cut_paste_one_second", |b| {
        b.iter(|| {
            let mut guard = store.lock_resize().unwrap();
            let handle = guard.move_to_temp(mask, black_box(48000 * 10), 48000, 0).unwrap();
            guard
                .move_from_temp(mask, handle, black_box(48000 * 30), 48000, true, None)
                .unwrap();
        })
    });

    c.bench_function("peak_full_channel", |b| {
        b.iter(|| {
            let guard = store.lock_size().unwrap();
            black_box(guard.peak(0, 0, guard.length()).unwrap())
        })
    });
}

criterion_group!(benches, benchmark_splice, benchmark_cut_paste);
criterion_main!(benches);

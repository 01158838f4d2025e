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
#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    use crate::pool_file::header::DATA_START;
    use crate::pool_file::{PoolFile, PoolFileError, PoolFileOptions, BLOCK_SIZE};

    fn options() -> PoolFileOptions {
        PoolFileOptions {
            max_segment_bytes: 2 * BLOCK_SIZE,
            sync: false,
        }
    }

    fn new_file(dir: &TempDir) -> PoolFile {
        PoolFile::create(dir.path().join("test.pool"), options()).unwrap()
    }

    fn contents(pool_file: &PoolFile, name: &str) -> Vec<u32> {
        let accessor = pool_file.pool_accessor::<u32>(name).unwrap();
        accessor.read_vec(0, accessor.len() as usize).unwrap()
    }

    fn fill(pool_file: &mut PoolFile, name: &str, values: &[u32]) {
        let at = pool_file.pool_size(name).unwrap();
        pool_file.insert_space(name, at, values.len() as u64).unwrap();
        pool_file
            .pool_accessor::<u32>(name)
            .unwrap()
            .write(at, values)
            .unwrap();
    }

    #[test]
    fn test_create_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.pool");
        {
            let mut pool_file = PoolFile::create(&path, options()).unwrap();
            pool_file.create_pool::<u32>("numbers").unwrap();
            fill(&mut pool_file, "numbers", &(0..1000).collect::<Vec<_>>());
            pool_file.create_pool::<u8>("empty").unwrap();
            pool_file.checkpoint().unwrap();
        }

        let pool_file = PoolFile::open(&path, options()).unwrap();
        assert_eq!(contents(&pool_file, "numbers"), (0..1000).collect::<Vec<_>>());
        assert_eq!(pool_file.pool_size("empty").unwrap(), 0);
        assert_eq!(
            pool_file.pool_names().collect::<Vec<_>>(),
            vec!["empty", "numbers"]
        );
    }

    #[test]
    fn test_pool_errors() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();

        assert!(matches!(
            pool_file.create_pool::<u32>("a"),
            Err(PoolFileError::AlreadyExists(_))
        ));
        assert!(matches!(
            pool_file.pool_accessor::<u32>("b"),
            Err(PoolFileError::NotFound(_))
        ));
        assert!(matches!(
            pool_file.pool_accessor::<f32>("a"),
            Err(PoolFileError::TypeMismatch { .. })
        ));
        assert!(matches!(
            pool_file.insert_space("a", 1, 10),
            Err(PoolFileError::Range { .. })
        ));
        assert!(matches!(
            pool_file.remove_pool("b"),
            Err(PoolFileError::NotFound(_))
        ));

        fill(&mut pool_file, "a", &[1, 2, 3]);
        let accessor = pool_file.pool_accessor::<u32>("a").unwrap();
        assert!(matches!(accessor.get(3), Err(PoolFileError::Range { .. })));
        assert!(matches!(
            accessor.write(2, &[9, 9]),
            Err(PoolFileError::Range { .. })
        ));
    }

    #[test]
    fn test_insert_space_in_middle() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        fill(&mut pool_file, "a", &(0..5000).collect::<Vec<_>>());

        pool_file.insert_space("a", 1234, 10).unwrap();
        pool_file
            .pool_accessor::<u32>("a")
            .unwrap()
            .write(1234, &[7; 10])
            .unwrap();

        let mut expected: Vec<u32> = (0..5000).collect();
        expected.splice(1234..1234, [7; 10]);
        assert_eq!(contents(&pool_file, "a"), expected);
    }

    #[test]
    fn test_remove_space() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        fill(&mut pool_file, "a", &(0..5000).collect::<Vec<_>>());

        pool_file.remove_space("a", 100, 3000).unwrap();
        let mut expected: Vec<u32> = (0..5000).collect();
        expected.drain(100..3100);
        assert_eq!(contents(&pool_file, "a"), expected);

        pool_file.remove_space("a", 0, 2000).unwrap();
        assert_eq!(pool_file.pool_size("a").unwrap(), 0);
        assert_eq!(pool_file.pool_segment_count("a").unwrap(), 0);
    }

    #[test]
    fn test_move_data_between_pools() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        pool_file.create_pool::<u32>("b").unwrap();
        fill(&mut pool_file, "a", &(0..3000).collect::<Vec<_>>());
        fill(&mut pool_file, "b", &[100, 200]);

        pool_file.move_data("b", 1, "a", 500, 1000).unwrap();

        let mut a: Vec<u32> = (0..3000).collect();
        let moved: Vec<u32> = a.drain(500..1500).collect();
        let mut b = vec![100, 200];
        b.splice(1..1, moved);
        assert_eq!(contents(&pool_file, "a"), a);
        assert_eq!(contents(&pool_file, "b"), b);
    }

    #[test]
    fn test_move_data_within_pool() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        fill(&mut pool_file, "a", &(0..10).collect::<Vec<_>>());

        // Move the first three elements to the end.
        pool_file.move_data("a", 7, "a", 0, 3).unwrap();
        assert_eq!(contents(&pool_file, "a"), vec![3, 4, 5, 6, 7, 8, 9, 0, 1, 2]);

        assert!(matches!(
            pool_file.move_data("a", 8, "a", 0, 3),
            Err(PoolFileError::Range { .. })
        ));
    }

    #[test]
    fn test_move_data_type_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        pool_file.create_pool::<f32>("b").unwrap();
        fill(&mut pool_file, "a", &[1, 2, 3]);
        assert!(matches!(
            pool_file.move_data("b", 0, "a", 0, 1),
            Err(PoolFileError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_raw_access_past_the_end_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        fill(&mut pool_file, "a", &[1, 2, 3]);
        let record = pool_file.pools["a"].clone();

        let mut buf = [0u8; 8];
        assert!(matches!(
            pool_file.read_raw(&record, 8, &mut buf),
            Err(PoolFileError::Corruption(_))
        ));
        assert!(matches!(
            pool_file.write_raw(&record, 12, &buf),
            Err(PoolFileError::Corruption(_))
        ));
        pool_file.read_raw(&record, 12, &mut []).unwrap();
        pool_file.read_raw(&record, 4, &mut buf).unwrap();
        assert_eq!(buf, [2, 0, 0, 0, 3, 0, 0, 0]);
    }

    #[test]
    fn test_copy_data() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        pool_file.create_pool::<u32>("b").unwrap();
        fill(&mut pool_file, "a", &(0..100).collect::<Vec<_>>());

        pool_file.copy_data("b", 0, "a", 10, 20).unwrap();
        assert_eq!(contents(&pool_file, "a"), (0..100).collect::<Vec<_>>());
        assert_eq!(contents(&pool_file, "b"), (10..30).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        fill(&mut pool_file, "a", &[5; 10]);
        pool_file.zero("a", 2, 3).unwrap();
        assert_eq!(contents(&pool_file, "a"), vec![5, 5, 0, 0, 0, 5, 5, 5, 5, 5]);
    }

    #[test]
    fn test_rename_pool() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        pool_file.create_pool::<u32>("b").unwrap();
        fill(&mut pool_file, "a", &[1, 2]);

        assert!(matches!(
            pool_file.rename_pool("a", "b"),
            Err(PoolFileError::AlreadyExists(_))
        ));
        pool_file.rename_pool("a", "c").unwrap();
        assert!(!pool_file.contains_pool("a"));
        assert_eq!(contents(&pool_file, "c"), vec![1, 2]);
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.pool");
        {
            let mut pool_file = PoolFile::create(&path, options()).unwrap();
            pool_file.create_pool::<u32>("a").unwrap();
            fill(&mut pool_file, "a", &(0..5000).collect::<Vec<_>>());
            pool_file.checkpoint().unwrap();

            pool_file.clear();
            assert_eq!(pool_file.pool_names().count(), 0);
            pool_file.checkpoint().unwrap();
        }

        let pool_file = PoolFile::open(&path, options()).unwrap();
        assert_eq!(pool_file.pool_names().count(), 0);
    }

    #[test]
    fn test_uncommitted_edits_are_lost_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.pool");
        {
            let mut pool_file = PoolFile::create(&path, options()).unwrap();
            pool_file.create_pool::<u32>("a").unwrap();
            fill(&mut pool_file, "a", &(0..4000).collect::<Vec<_>>());
            pool_file.checkpoint().unwrap();

            // Removed space must not be reused before the next checkpoint,
            // otherwise this write would clobber committed content.
            pool_file.remove_space("a", 0, 4000).unwrap();
            pool_file.create_pool::<u32>("b").unwrap();
            fill(&mut pool_file, "b", &[0xdead_beef; 4000]);
        }

        let pool_file = PoolFile::open(&path, options()).unwrap();
        assert!(!pool_file.contains_pool("b"));
        assert_eq!(contents(&pool_file, "a"), (0..4000).collect::<Vec<_>>());
    }

    #[test]
    fn test_removed_space_is_reused_after_checkpoint() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        pool_file.create_pool::<u32>("b").unwrap();
        fill(&mut pool_file, "a", &[1; 4096]);
        fill(&mut pool_file, "b", &[2; 16]);
        pool_file.checkpoint().unwrap();
        let size = pool_file.file_size();

        pool_file.remove_space("a", 0, 4096).unwrap();
        pool_file.checkpoint().unwrap();
        assert!(pool_file.free_bytes() >= 4096 * 4);

        fill(&mut pool_file, "a", &[3; 4096]);
        pool_file.checkpoint().unwrap();
        assert!(pool_file.file_size() <= size);
    }

    #[test]
    fn test_torn_header_falls_back_to_previous_checkpoint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.pool");
        {
            let mut pool_file = PoolFile::create(&path, options()).unwrap();
            pool_file.create_pool::<u32>("a").unwrap();
            fill(&mut pool_file, "a", &(0..100).collect::<Vec<_>>());
            pool_file.checkpoint().unwrap();
            assert_eq!(pool_file.generation(), 2);

            fill(&mut pool_file, "a", &[9; 5000]);
            pool_file.checkpoint().unwrap();
            assert_eq!(pool_file.generation(), 3);
        }

        // Tear the newest header slot.
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(BLOCK_SIZE + 30)).unwrap();
        file.write_all(&[0xff, 0xff]).unwrap();
        drop(file);

        let pool_file = PoolFile::open(&path, options()).unwrap();
        assert_eq!(pool_file.generation(), 2);
        assert_eq!(contents(&pool_file, "a"), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_garbled_signature_falls_back_to_previous_checkpoint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.pool");
        {
            let mut pool_file = PoolFile::create(&path, options()).unwrap();
            pool_file.create_pool::<u32>("a").unwrap();
            fill(&mut pool_file, "a", &[1, 2, 3]);
            pool_file.checkpoint().unwrap();
            fill(&mut pool_file, "a", &[4, 5]);
            pool_file.checkpoint().unwrap();
            assert_eq!(pool_file.generation(), 3);
        }

        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(BLOCK_SIZE)).unwrap();
        file.write_all(&[0xff; 16]).unwrap();
        drop(file);

        let pool_file = PoolFile::open(&path, options()).unwrap();
        assert_eq!(pool_file.generation(), 2);
        assert_eq!(contents(&pool_file, "a"), vec![1, 2, 3]);
    }

    #[test]
    fn test_refuses_corrupt_allocation_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.pool");
        {
            let mut pool_file = PoolFile::create(&path, options()).unwrap();
            pool_file.create_pool::<u32>("a").unwrap();
            fill(&mut pool_file, "a", &[1; 10]);
            pool_file.checkpoint().unwrap();
        }

        // Scribble over the whole data area, including both tables.
        let len = std::fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(DATA_START)).unwrap();
        file.write_all(&vec![0x55; (len - DATA_START) as usize])
            .unwrap();
        drop(file);

        assert!(matches!(
            PoolFile::open(&path, options()),
            Err(PoolFileError::Corruption(_))
        ));
    }

    #[test]
    fn test_refuses_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-a-pool.txt");
        std::fs::write(&path, vec![b'x'; 3 * BLOCK_SIZE as usize]).unwrap();
        assert!(matches!(
            PoolFile::open(&path, options()),
            Err(PoolFileError::Corruption(_))
        ));

        std::fs::write(&path, b"short").unwrap();
        assert!(matches!(
            PoolFile::open(&path, options()),
            Err(PoolFileError::Corruption(_))
        ));
    }

    #[test]
    fn test_snapshot_restore() {
        let dir = TempDir::new().unwrap();
        let mut pool_file = new_file(&dir);
        pool_file.create_pool::<u32>("a").unwrap();
        fill(&mut pool_file, "a", &(0..100).collect::<Vec<_>>());

        let snapshot = pool_file.snapshot();
        pool_file.remove_space("a", 10, 50).unwrap();
        pool_file.create_pool::<u32>("b").unwrap();
        pool_file.restore(snapshot);

        assert!(!pool_file.contains_pool("b"));
        assert_eq!(contents(&pool_file, "a"), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_defragment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.pool");
        let mut pool_file = PoolFile::create(&path, options()).unwrap();
        pool_file.create_pool::<u32>("a").unwrap();
        pool_file.create_pool::<u32>("b").unwrap();
        let mut a: Vec<u32> = Vec::new();
        let mut b: Vec<u32> = Vec::new();
        for round in 0..20u32 {
            let chunk: Vec<u32> = (0..700).map(|i| round * 1000 + i).collect();
            fill(&mut pool_file, "a", &chunk);
            a.extend(&chunk);
            fill(&mut pool_file, "b", &chunk);
            b.extend(&chunk);
        }
        pool_file.remove_space("a", 3000, 5000).unwrap();
        a.drain(3000..8000);
        pool_file.checkpoint().unwrap();
        assert!(pool_file.pool_segment_count("a").unwrap() > 1);

        let stats = pool_file.defragment().unwrap();
        assert!(stats.bytes_after <= stats.bytes_before);
        assert_eq!(pool_file.pool_segment_count("a").unwrap(), 1);
        assert_eq!(pool_file.pool_segment_count("b").unwrap(), 1);
        assert_eq!(contents(&pool_file, "a"), a);
        assert_eq!(contents(&pool_file, "b"), b);
        drop(pool_file);

        let pool_file = PoolFile::open(&path, options()).unwrap();
        assert_eq!(contents(&pool_file, "a"), a);
        assert_eq!(contents(&pool_file, "b"), b);
    }

    #[test]
    fn test_random_splices_match_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.pool");
        let mut pool_file = PoolFile::create(&path, options()).unwrap();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let names = ["left", "right"];
        let mut models: Vec<Vec<u32>> = vec![Vec::new(), Vec::new()];
        for name in names {
            pool_file.create_pool::<u32>(name).unwrap();
        }

        let mut next_value = 0u32;
        for step in 0..300 {
            let which = rng.gen_range(0..2);
            let name = names[which];
            let len = models[which].len() as u64;
            match rng.gen_range(0..4) {
                0 | 1 => {
                    let at = rng.gen_range(0..=len);
                    let count = rng.gen_range(1..3000u64);
                    let values: Vec<u32> = (0..count as u32).map(|i| next_value + i).collect();
                    next_value += count as u32;
                    pool_file.insert_space(name, at, count).unwrap();
                    pool_file
                        .pool_accessor::<u32>(name)
                        .unwrap()
                        .write(at, &values)
                        .unwrap();
                    models[which].splice(at as usize..at as usize, values);
                }
                2 if len > 0 => {
                    let at = rng.gen_range(0..len);
                    let count = rng.gen_range(1..=len - at);
                    pool_file.remove_space(name, at, count).unwrap();
                    models[which].drain(at as usize..(at + count) as usize);
                }
                3 if len > 0 => {
                    let other = 1 - which;
                    let at = rng.gen_range(0..len);
                    let count = rng.gen_range(1..=len - at);
                    let dest_at = rng.gen_range(0..=models[other].len() as u64);
                    pool_file
                        .move_data(names[other], dest_at, name, at, count)
                        .unwrap();
                    let moved: Vec<u32> = models[which]
                        .drain(at as usize..(at + count) as usize)
                        .collect();
                    models[other].splice(dest_at as usize..dest_at as usize, moved);
                }
                _ => {}
            }
            if step % 25 == 0 {
                pool_file.checkpoint().unwrap();
            }
            for (index, name) in names.iter().enumerate() {
                assert_eq!(contents(&pool_file, name), models[index], "step {}", step);
            }
        }

        pool_file.checkpoint().unwrap();
        drop(pool_file);
        let pool_file = PoolFile::open(&path, options()).unwrap();
        for (index, name) in names.iter().enumerate() {
            assert_eq!(contents(&pool_file, name), models[index]);
        }
    }
}

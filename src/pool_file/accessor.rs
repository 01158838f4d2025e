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

//! Typed views over pools.

use std::marker::PhantomData;

use super::error::PoolFileError;
use super::sat::PoolRecord;
use super::PoolFile;

/// A value that can be stored in a pool. Elements are encoded explicitly to
/// fixed-width little-endian records, so the file layout does not depend on
/// the host.
pub trait PoolElement: Clone + Default + Send + Sync + 'static {
    /// Encoded size in bytes.
    const SIZE: usize;
    /// Name recorded in the allocation table for pools of this type.
    const TYPE_TAG: &'static str;

    /// Writes the element into exactly `SIZE` bytes.
    fn encode(&self, out: &mut [u8]);

    /// Reads an element from exactly `SIZE` bytes.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_pool_element {
    ($($ty:ty => $tag:literal),* $(,)?) => {
        $(
            impl PoolElement for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
                const TYPE_TAG: &'static str = $tag;

                fn encode(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_pool_element!(
    u8 => "u8",
    i16 => "i16",
    u16 => "u16",
    i32 => "i32",
    u32 => "u32",
    i64 => "i64",
    u64 => "u64",
    f32 => "f32",
    f64 => "f64",
);

/// A bounds-checked read/write view of one pool. Offsets and lengths are in
/// elements. The view borrows the pool file, so the pool's layout cannot
/// change while it exists; content writes go straight to disk.
pub struct PoolAccessor<'a, T> {
    file: &'a PoolFile,
    name: &'a str,
    record: &'a PoolRecord,
    _element: PhantomData<fn() -> T>,
}

impl<T> Clone for PoolAccessor<'_, T> {
    fn clone(&self) -> Self {
        Self {
            file: self.file,
            name: self.name,
            record: self.record,
            _element: PhantomData,
        }
    }
}

impl<'a, T: PoolElement> PoolAccessor<'a, T> {
    pub(super) fn new(
        file: &'a PoolFile,
        name: &'a str,
        record: &'a PoolRecord,
    ) -> Result<Self, PoolFileError> {
        if record.type_tag != T::TYPE_TAG || record.element_size != T::SIZE as u64 {
            return Err(PoolFileError::TypeMismatch {
                pool: name.to_string(),
                actual: record.type_tag.clone(),
                requested: T::TYPE_TAG.to_string(),
            });
        }
        Ok(Self {
            file,
            name,
            record,
            _element: PhantomData,
        })
    }

    /// The pool's name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Number of elements in the pool.
    pub fn len(&self) -> u64 {
        self.record.element_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, offset: u64, count: usize) -> Result<(), PoolFileError> {
        match offset.checked_add(count as u64) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(PoolFileError::range(
                self.name,
                format!(
                    "{} elements at {} exceeds length {}",
                    count,
                    offset,
                    self.len()
                ),
            )),
        }
    }

    /// Fills `out` with the elements starting at `offset`.
    pub fn read(&self, offset: u64, out: &mut [T]) -> Result<(), PoolFileError> {
        self.check(offset, out.len())?;
        if out.is_empty() {
            return Ok(());
        }
        let mut bytes = vec![0u8; out.len() * T::SIZE];
        self.file
            .read_raw(self.record, offset * T::SIZE as u64, &mut bytes)?;
        for (value, raw) in out.iter_mut().zip(bytes.chunks_exact(T::SIZE)) {
            *value = T::decode(raw);
        }
        Ok(())
    }

    /// Reads `count` elements starting at `offset` into a new vector.
    pub fn read_vec(&self, offset: u64, count: usize) -> Result<Vec<T>, PoolFileError> {
        let mut out = vec![T::default(); count];
        self.read(offset, &mut out)?;
        Ok(out)
    }

    /// Overwrites the elements starting at `offset`.
    pub fn write(&self, offset: u64, data: &[T]) -> Result<(), PoolFileError> {
        self.check(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        let mut bytes = vec![0u8; data.len() * T::SIZE];
        for (value, raw) in data.iter().zip(bytes.chunks_exact_mut(T::SIZE)) {
            value.encode(raw);
        }
        self.file
            .write_raw(self.record, offset * T::SIZE as u64, &bytes)
    }

    pub fn get(&self, index: u64) -> Result<T, PoolFileError> {
        let mut out = [T::default()];
        self.read(index, &mut out)?;
        let [value] = out;
        Ok(value)
    }

    pub fn set(&self, index: u64, value: T) -> Result<(), PoolFileError> {
        self.write(index, std::slice::from_ref(&value))
    }
}

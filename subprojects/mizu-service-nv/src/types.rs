//! Status words, device fds and ioctl field helpers.

use core::fmt;

/// Status word returned by every nvdrv command after the IPC result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NvResult {
    Success = 0,
    NotImplemented = 1,
    NotSupported = 2,
    NotInitialized = 3,
    BadParameter = 4,
    InsufficientMemory = 6,
    InvalidState = 8,
    FileOperationFailed = 0x30003,
    IoctlFailed = 0x3000F,
}

impl NvResult {
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }
}

/// NV driver file descriptor, identifies an opened device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Fd(u32);

impl Fd {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Value sent on the wire.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd{}", self.0)
    }
}

#[inline]
pub const fn nv_ioc_dir(request: u32) -> u32 {
    (request >> 30) & 0x3
}

#[inline]
pub const fn nv_ioc_size(request: u32) -> usize {
    ((request >> 16) & 0x3FFF) as usize
}

/// Extracts the device group (`'G'`, `'H'`, ...) from an ioctl request code.
#[inline]
pub const fn nv_ioc_group(request: u32) -> u8 {
    (request >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioctl_fields() {
        // NVGPU_IOCTL_CHANNEL_KICKOFF_PB
        let request = 0xC018_481B;
        assert_eq!(nv_ioc_dir(request), 3);
        assert_eq!(nv_ioc_size(request), 0x18);
        assert_eq!(nv_ioc_group(request), b'H');
    }
}

//! Latched events backed by `eventfd`.
//!
//! The fd of an [`Event`] is what goes on the wire: handlers push it with
//! `push_copy_fds` and the kernel wraps it in a copy handle at response time.

use std::{
    os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
    time::Duration,
};

use crate::error::ServctlError;

/// One-bit latched signal with a pollable fd.
///
/// The event stays signaled until [`clear`](Self::clear) is called. It is
/// closed when dropped.
#[derive(Debug)]
pub struct Event {
    fd: OwnedFd,
}

impl Event {
    /// Creates an unsignaled event.
    pub fn new() -> Result<Self, ServctlError> {
        // SAFETY: eventfd has no pointer arguments.
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if fd < 0 {
            return Err(ServctlError::last_os_error());
        }
        // SAFETY: `fd` was just returned by eventfd and is owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }

    /// Signals the event.
    pub fn signal(&self) -> Result<(), ServctlError> {
        let one = 1u64.to_ne_bytes();
        // SAFETY: Writing 8 bytes from a live stack buffer.
        let ret = unsafe { libc::write(self.fd.as_raw_fd(), one.as_ptr().cast(), one.len()) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            // Counter saturated: the event is already signaled.
            if err.raw_os_error() == Some(libc::EAGAIN) {
                return Ok(());
            }
            return Err(ServctlError::Os(err));
        }
        Ok(())
    }

    /// Clears the event. Clearing an unsignaled event is a no-op.
    pub fn clear(&self) -> Result<(), ServctlError> {
        let mut buf = [0u8; 8];
        // SAFETY: Reading 8 bytes into a live stack buffer.
        let ret = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EAGAIN) {
                return Ok(());
            }
            return Err(ServctlError::Os(err));
        }
        Ok(())
    }

    /// Returns whether the event is currently signaled.
    pub fn is_signaled(&self) -> bool {
        wait_readable(self.fd.as_fd(), Duration::ZERO).unwrap_or(false)
    }
}

impl AsFd for Event {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Waits up to `timeout` for `fd` to become readable.
pub fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<bool, ServctlError> {
    let mut pollfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
    // SAFETY: One valid pollfd entry.
    let ret = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    if ret < 0 {
        return Err(ServctlError::last_os_error());
    }
    Ok(ret > 0 && (pollfd.revents & libc::POLLIN) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_event_is_unsignaled() {
        let event = Event::new().unwrap();
        assert!(!event.is_signaled());
    }

    #[test]
    fn test_signal_latches_until_clear() {
        let event = Event::new().unwrap();
        event.signal().unwrap();
        assert!(event.is_signaled());
        assert!(event.is_signaled());
        event.clear().unwrap();
        assert!(!event.is_signaled());
    }

    #[test]
    fn test_clear_unsignaled_is_noop() {
        let event = Event::new().unwrap();
        event.clear().unwrap();
        event.clear().unwrap();
        assert!(!event.is_signaled());
    }

    #[test]
    fn test_duplicated_fd_observes_signal() {
        let event = Event::new().unwrap();
        let dup = event.as_fd().try_clone_to_owned().unwrap();
        event.signal().unwrap();
        assert!(wait_readable(dup.as_fd(), Duration::from_millis(10)).unwrap());
    }
}

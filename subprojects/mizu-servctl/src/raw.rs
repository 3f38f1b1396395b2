//! Raw `servctl` ABI of the host kernel module.
//!
//! The module exposes a single multiplexed syscall. The first argument picks
//! the operation, the remaining ones are operation specific. Each call returns
//! a non-negative value on success or `-1` with `errno` set.

use core::ffi::c_long;

use crate::kernel::COMMAND_BUFFER_WORDS;

//<editor-fold desc="Types and Constants">

/// A raw handle type.
///
/// Alias for `u32`.
pub type Handle = u32;

/// Invalid handle
pub const INVALID_HANDLE: Handle = 0;

/// Pseudo handle for the current thread
pub const CUR_THREAD_HANDLE: Handle = 0xFFFF8000;

/// Pseudo handle for the current process
pub const CUR_PROCESS_HANDLE: Handle = 0xFFFF8001;

/// Syscall number the host module registers when none is configured.
pub const DEFAULT_SERVCTL_SYSCALL: c_long = 0x1337;

/// Create a session handle bound to `(owner_tid, session_id)`.
pub const SCTL_CREATE_SESSION_HANDLE: c_long = 1;
/// Wrap a host fd in a guest copy handle.
pub const SCTL_CREATE_COPY_HANDLE: c_long = 2;
/// Copy bytes out of the requester's address space.
pub const SCTL_READ_BUFFER: c_long = 3;
/// Copy bytes into the requester's address space.
pub const SCTL_WRITE_BUFFER: c_long = 4;
/// Return the pid of the requester being served by the calling thread.
pub const SCTL_GET_PROCESS_ID: c_long = 5;
/// Block until a request envelope is available for the calling thread.
pub const SCTL_WAIT_REQUEST: c_long = 6;
/// Answer the request last received by the calling thread.
pub const SCTL_REPLY: c_long = 7;
/// Wake a thread blocked in [`SCTL_WAIT_REQUEST`] with `ESHUTDOWN`.
pub const SCTL_TERMINATE_THREAD: c_long = 8;

/// [`RequestEnvelope::kind`] for a request message.
pub const ENVELOPE_REQUEST: u32 = 0;
/// [`RequestEnvelope::kind`] for a closed session.
pub const ENVELOPE_SESSION_CLOSED: u32 = 1;

/// Request envelope filled by [`SCTL_WAIT_REQUEST`].
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RequestEnvelope {
    pub session_id: u64,
    pub pid: u64,
    pub kind: u32,
    pub _padding: u32,
    pub command_buffer: [u32; COMMAND_BUFFER_WORDS],
}

impl Default for RequestEnvelope {
    fn default() -> Self {
        Self {
            session_id: 0,
            pid: 0,
            kind: ENVELOPE_REQUEST,
            _padding: 0,
            command_buffer: [0; COMMAND_BUFFER_WORDS],
        }
    }
}

//</editor-fold>

/// Issues a `servctl` operation.
///
/// Returns the raw return value, or the `errno` of a failing call.
///
/// # Safety
///
/// Pointer arguments must be valid for the operation's documented access.
pub unsafe fn servctl(
    sysno: c_long,
    op: c_long,
    a0: usize,
    a1: usize,
    a2: usize,
) -> Result<c_long, i32> {
    // SAFETY: Caller upholds the pointer contract of `op`.
    let ret = unsafe { libc::syscall(sysno, op, a0, a1, a2) };
    if ret < 0 {
        Err(std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EIO))
    } else {
        Ok(ret)
    }
}

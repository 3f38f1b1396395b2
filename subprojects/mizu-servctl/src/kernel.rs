use std::os::fd::BorrowedFd;

use crate::{
    error::ServctlError,
    handle::{CopyHandle, ProcessId, SessionHandle, SessionId, ThreadId, VAddr},
};

/// Number of 32-bit words in a command buffer.
pub const COMMAND_BUFFER_WORDS: usize = 0x40;

/// A raw 256-byte command buffer as exchanged with the kernel.
pub type RawCommandBuffer = [u32; COMMAND_BUFFER_WORDS];

/// Something the kernel delivered to a service thread.
#[derive(Debug, Clone)]
pub enum KernelEvent {
    /// A request message on `session`.
    Request {
        session: SessionId,
        pid: ProcessId,
        command_buffer: Box<RawCommandBuffer>,
    },
    /// The client side of `session` is gone.
    SessionClosed { session: SessionId, pid: ProcessId },
}

/// The host kernel primitives consumed by the IPC runtime.
///
/// Buffer transfers and [`process_id`](Kernel::process_id) operate against the
/// requester currently being served by the calling thread.
pub trait Kernel: Send + Sync {
    /// Creates a session handle whose requests are routed to `owner` tagged
    /// with `session`. Anonymous ports use [`ThreadId::ANONYMOUS`].
    fn create_session_handle(
        &self,
        owner: ThreadId,
        session: SessionId,
    ) -> Result<SessionHandle, ServctlError>;

    /// Wraps a host file descriptor in a guest copy handle.
    fn create_copy_handle(&self, fd: BorrowedFd<'_>) -> Result<CopyHandle, ServctlError>;

    /// Copies `dst.len()` bytes from the requester's address space.
    fn read_buffer(&self, addr: VAddr, dst: &mut [u8]) -> Result<(), ServctlError>;

    /// Copies `src` into the requester's address space.
    fn write_buffer(&self, addr: VAddr, src: &[u8]) -> Result<(), ServctlError>;

    /// Returns the guest pid of the current requester.
    fn process_id(&self) -> Result<ProcessId, ServctlError>;

    /// Blocks until something is delivered to `owner`.
    ///
    /// Returns [`ServctlError::Terminated`] once the thread must exit.
    fn receive(&self, owner: ThreadId) -> Result<KernelEvent, ServctlError>;

    /// Answers the request last received by `owner` on `session`.
    fn reply(
        &self,
        owner: ThreadId,
        session: SessionId,
        command_buffer: &RawCommandBuffer,
    ) -> Result<(), ServctlError>;

    /// Makes the next [`receive`](Kernel::receive) of `owner` return
    /// [`ServctlError::Terminated`].
    fn terminate(&self, owner: ThreadId) -> Result<(), ServctlError>;
}

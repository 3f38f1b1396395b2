use core::ffi::c_long;
use std::os::fd::{AsRawFd, BorrowedFd};

use crate::{
    error::ServctlError,
    handle::{CopyHandle, ProcessId, SessionHandle, SessionId, ThreadId, VAddr},
    kernel::{Kernel, KernelEvent, RawCommandBuffer},
    raw::{self, RequestEnvelope},
};

/// [`Kernel`] backed by the host module's `servctl` syscall.
#[derive(Debug, Clone, Copy)]
pub struct HostKernel {
    sysno: c_long,
}

impl HostKernel {
    /// Uses the given syscall number for every `servctl` operation.
    pub const fn new(sysno: c_long) -> Self {
        Self { sysno }
    }

    fn call(&self, op: c_long, a0: usize, a1: usize, a2: usize) -> Result<c_long, ServctlError> {
        // SAFETY: Every caller below passes pointers that live for the call
        // and match the access documented for `op`.
        unsafe { raw::servctl(self.sysno, op, a0, a1, a2) }.map_err(|errno| {
            let err = ServctlError::from_errno(errno);
            log::error!(target: "Kernel", "critical: servctl op {op} failed: {err}");
            err
        })
    }
}

impl Default for HostKernel {
    fn default() -> Self {
        Self::new(raw::DEFAULT_SERVCTL_SYSCALL)
    }
}

impl Kernel for HostKernel {
    fn create_session_handle(
        &self,
        owner: ThreadId,
        session: SessionId,
    ) -> Result<SessionHandle, ServctlError> {
        let ret = self.call(
            raw::SCTL_CREATE_SESSION_HANDLE,
            owner.to_raw() as isize as usize,
            session.to_raw() as usize,
            0,
        )?;
        Ok(SessionHandle::from_raw(ret as u32))
    }

    fn create_copy_handle(&self, fd: BorrowedFd<'_>) -> Result<CopyHandle, ServctlError> {
        let ret = self.call(raw::SCTL_CREATE_COPY_HANDLE, fd.as_raw_fd() as usize, 0, 0)?;
        Ok(CopyHandle::from_raw(ret as u32))
    }

    fn read_buffer(&self, addr: VAddr, dst: &mut [u8]) -> Result<(), ServctlError> {
        if dst.is_empty() {
            return Ok(());
        }
        self.call(
            raw::SCTL_READ_BUFFER,
            addr as usize,
            dst.as_mut_ptr() as usize,
            dst.len(),
        )?;
        Ok(())
    }

    fn write_buffer(&self, addr: VAddr, src: &[u8]) -> Result<(), ServctlError> {
        if src.is_empty() {
            return Ok(());
        }
        self.call(
            raw::SCTL_WRITE_BUFFER,
            addr as usize,
            src.as_ptr() as usize,
            src.len(),
        )?;
        Ok(())
    }

    fn process_id(&self) -> Result<ProcessId, ServctlError> {
        let mut pid = 0u64;
        self.call(raw::SCTL_GET_PROCESS_ID, &mut pid as *mut u64 as usize, 0, 0)?;
        Ok(ProcessId::new(pid))
    }

    fn receive(&self, _owner: ThreadId) -> Result<KernelEvent, ServctlError> {
        let mut envelope = RequestEnvelope::default();
        // SAFETY: `envelope` is a repr(C) struct the kernel fills in place.
        let ret = unsafe {
            raw::servctl(
                self.sysno,
                raw::SCTL_WAIT_REQUEST,
                &mut envelope as *mut RequestEnvelope as usize,
                0,
                0,
            )
        };
        if let Err(errno) = ret {
            // Termination is the normal way out of the run loop.
            return Err(ServctlError::from_errno(errno));
        }

        let session = SessionId::from_raw(envelope.session_id);
        let pid = ProcessId::new(envelope.pid);
        match envelope.kind {
            raw::ENVELOPE_SESSION_CLOSED => Ok(KernelEvent::SessionClosed { session, pid }),
            _ => Ok(KernelEvent::Request {
                session,
                pid,
                command_buffer: Box::new(envelope.command_buffer),
            }),
        }
    }

    fn reply(
        &self,
        _owner: ThreadId,
        session: SessionId,
        command_buffer: &RawCommandBuffer,
    ) -> Result<(), ServctlError> {
        self.call(
            raw::SCTL_REPLY,
            session.to_raw() as usize,
            command_buffer.as_ptr() as usize,
            0,
        )?;
        Ok(())
    }

    fn terminate(&self, owner: ThreadId) -> Result<(), ServctlError> {
        self.call(
            raw::SCTL_TERMINATE_THREAD,
            owner.to_raw() as isize as usize,
            0,
            0,
        )?;
        Ok(())
    }
}

//! In-process [`Kernel`] backend.
//!
//! `LoopbackKernel` keeps the routing semantics of the host module without a
//! kernel: session handles map to `(owner thread, session id)`, each service
//! thread has an inbox, and a client blocks in
//! [`send_sync_request`](LoopbackKernel::send_sync_request) until the owner
//! replies. Guest memory is a set of byte regions registered with
//! [`map_memory`](LoopbackKernel::map_memory).

use std::{
    collections::{BTreeMap, HashMap},
    os::fd::{BorrowedFd, OwnedFd},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::{
    error::ServctlError,
    handle::{CopyHandle, ProcessId, SessionHandle, SessionId, ThreadId, VAddr},
    kernel::{Kernel, KernelEvent, RawCommandBuffer},
};

/// How long a client waits for a reply before giving up.
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// First handle value handed out. Low values are left unused so tests can
/// tell a real handle from a small integer.
const FIRST_HANDLE: u32 = 0x100;

enum Envelope {
    Request {
        session: SessionId,
        pid: ProcessId,
        command_buffer: Box<RawCommandBuffer>,
        reply: Sender<Box<RawCommandBuffer>>,
    },
    Closed {
        session: SessionId,
        pid: ProcessId,
    },
    Terminate,
}

#[derive(Debug, Clone, Copy)]
struct Route {
    owner: ThreadId,
    session: SessionId,
}

struct Pending {
    session: SessionId,
    pid: ProcessId,
    reply: Sender<Box<RawCommandBuffer>>,
}

#[derive(Default)]
struct State {
    next_handle: u32,
    sessions: HashMap<u32, Route>,
    copies: HashMap<u32, OwnedFd>,
    inboxes: HashMap<ThreadId, (Sender<Envelope>, Receiver<Envelope>)>,
    pending: HashMap<ThreadId, Pending>,
    memory: BTreeMap<VAddr, Vec<u8>>,
}

impl State {
    fn allocate_handle(&mut self) -> u32 {
        if self.next_handle < FIRST_HANDLE {
            self.next_handle = FIRST_HANDLE;
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn inbox(&mut self, owner: ThreadId) -> &(Sender<Envelope>, Receiver<Envelope>) {
        self.inboxes
            .entry(owner)
            .or_insert_with(crossbeam_channel::unbounded)
    }

    fn region(&self, addr: VAddr, len: usize) -> Option<(VAddr, usize)> {
        let (&start, bytes) = self.memory.range(..=addr).next_back()?;
        let offset = (addr - start) as usize;
        (offset + len <= bytes.len()).then_some((start, offset))
    }
}

/// In-process kernel with the host module's routing semantics.
#[derive(Default)]
pub struct LoopbackKernel {
    state: Mutex<State>,
}

impl LoopbackKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a client handle on a fresh session served by `owner`.
    ///
    /// The owner must learn about the session through its own channel (a
    /// mailbox adoption) before the handle is used.
    pub fn connect(&self, owner: ThreadId) -> Result<(SessionHandle, SessionId), ServctlError> {
        let session = SessionId::fresh();
        let handle = self.create_session_handle(owner, session)?;
        Ok((handle, session))
    }

    /// Terminates every service thread that has an inbox.
    pub fn shutdown(&self) {
        let senders: Vec<_> = {
            let state = self.state.lock();
            state.inboxes.values().map(|(tx, _)| tx.clone()).collect()
        };
        log::debug!(target: "Kernel", "loopback shutdown, {} inboxes", senders.len());
        for sender in senders {
            let _ = sender.send(Envelope::Terminate);
        }
    }

    /// Sends a request on `handle` and blocks until the owner replies.
    ///
    /// The reply overwrites `command_buffer`.
    pub fn send_sync_request(
        &self,
        handle: SessionHandle,
        pid: ProcessId,
        command_buffer: &mut RawCommandBuffer,
    ) -> Result<(), ServctlError> {
        let (route, sender) = {
            let mut state = self.state.lock();
            let route = *state
                .sessions
                .get(&handle.to_raw())
                .ok_or(ServctlError::InvalidHandle)?;
            if route.owner.is_anonymous() {
                return Err(ServctlError::SessionClosed);
            }
            let sender = state.inbox(route.owner).0.clone();
            (route, sender)
        };

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        sender
            .send(Envelope::Request {
                session: route.session,
                pid,
                command_buffer: Box::new(*command_buffer),
                reply: reply_tx,
            })
            .map_err(|_| ServctlError::SessionClosed)?;

        match reply_rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(reply) => {
                *command_buffer = *reply;
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(ServctlError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(ServctlError::SessionClosed),
        }
    }

    /// Closes a client handle, notifying the owner that the session is gone.
    pub fn close_handle(&self, handle: SessionHandle, pid: ProcessId) -> Result<(), ServctlError> {
        let mut state = self.state.lock();
        let route = state
            .sessions
            .remove(&handle.to_raw())
            .ok_or(ServctlError::InvalidHandle)?;
        if route.owner.is_anonymous() {
            return Ok(());
        }
        let sender = state.inbox(route.owner).0.clone();
        drop(state);
        sender
            .send(Envelope::Closed {
                session: route.session,
                pid,
            })
            .map_err(|_| ServctlError::SessionClosed)
    }

    /// Returns the session id a handle routes to.
    pub fn session_of(&self, handle: SessionHandle) -> Option<SessionId> {
        self.state
            .lock()
            .sessions
            .get(&handle.to_raw())
            .map(|route| route.session)
    }

    /// Returns the owner thread a handle routes to.
    pub fn owner_of(&self, handle: SessionHandle) -> Option<ThreadId> {
        self.state
            .lock()
            .sessions
            .get(&handle.to_raw())
            .map(|route| route.owner)
    }

    /// Duplicates the host fd behind a copy handle.
    pub fn copy_handle_fd(&self, handle: CopyHandle) -> Option<OwnedFd> {
        let state = self.state.lock();
        state.copies.get(&handle.to_raw())?.try_clone().ok()
    }

    /// Registers a guest memory region of `len` zero bytes at `addr`.
    pub fn map_memory(&self, addr: VAddr, len: usize) {
        self.state.lock().memory.insert(addr, vec![0; len]);
    }

    /// Writes guest memory from the test harness side.
    pub fn write_guest(&self, addr: VAddr, bytes: &[u8]) -> Result<(), ServctlError> {
        self.write_buffer(addr, bytes)
    }

    /// Reads guest memory from the test harness side.
    pub fn read_guest(&self, addr: VAddr, len: usize) -> Result<Vec<u8>, ServctlError> {
        let mut out = vec![0; len];
        self.read_buffer(addr, &mut out)?;
        Ok(out)
    }
}

impl Kernel for LoopbackKernel {
    fn create_session_handle(
        &self,
        owner: ThreadId,
        session: SessionId,
    ) -> Result<SessionHandle, ServctlError> {
        let mut state = self.state.lock();
        let handle = state.allocate_handle();
        state.sessions.insert(handle, Route { owner, session });
        if !owner.is_anonymous() {
            state.inbox(owner);
        }
        log::trace!(target: "Kernel", "session handle {handle:#x} -> {session} on {owner:?}");
        Ok(SessionHandle::from_raw(handle))
    }

    fn create_copy_handle(&self, fd: BorrowedFd<'_>) -> Result<CopyHandle, ServctlError> {
        let owned = fd.try_clone_to_owned().map_err(ServctlError::Os)?;
        let mut state = self.state.lock();
        let handle = state.allocate_handle();
        state.copies.insert(handle, owned);
        Ok(CopyHandle::from_raw(handle))
    }

    fn read_buffer(&self, addr: VAddr, dst: &mut [u8]) -> Result<(), ServctlError> {
        if dst.is_empty() {
            return Ok(());
        }
        let state = self.state.lock();
        let (start, offset) = state
            .region(addr, dst.len())
            .ok_or(ServctlError::InvalidAddress)?;
        let region = &state.memory[&start];
        dst.copy_from_slice(&region[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_buffer(&self, addr: VAddr, src: &[u8]) -> Result<(), ServctlError> {
        if src.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock();
        let (start, offset) = state
            .region(addr, src.len())
            .ok_or(ServctlError::InvalidAddress)?;
        let region = state
            .memory
            .get_mut(&start)
            .ok_or(ServctlError::InvalidAddress)?;
        region[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn process_id(&self) -> Result<ProcessId, ServctlError> {
        let state = self.state.lock();
        state
            .pending
            .get(&ThreadId::current())
            .map(|pending| pending.pid)
            .ok_or(ServctlError::InvalidArgument)
    }

    fn receive(&self, owner: ThreadId) -> Result<KernelEvent, ServctlError> {
        let receiver = self.state.lock().inbox(owner).1.clone();
        match receiver.recv() {
            Ok(Envelope::Request {
                session,
                pid,
                command_buffer,
                reply,
            }) => {
                self.state
                    .lock()
                    .pending
                    .insert(owner, Pending { session, pid, reply });
                Ok(KernelEvent::Request {
                    session,
                    pid,
                    command_buffer,
                })
            }
            Ok(Envelope::Closed { session, pid }) => Ok(KernelEvent::SessionClosed { session, pid }),
            Ok(Envelope::Terminate) | Err(_) => Err(ServctlError::Terminated),
        }
    }

    fn reply(
        &self,
        owner: ThreadId,
        session: SessionId,
        command_buffer: &RawCommandBuffer,
    ) -> Result<(), ServctlError> {
        let pending = self
            .state
            .lock()
            .pending
            .remove(&owner)
            .ok_or(ServctlError::InvalidArgument)?;
        if pending.session != session {
            return Err(ServctlError::InvalidArgument);
        }
        pending
            .reply
            .send(Box::new(*command_buffer))
            .map_err(|_| ServctlError::SessionClosed)
    }

    fn terminate(&self, owner: ThreadId) -> Result<(), ServctlError> {
        let sender = self.state.lock().inbox(owner).0.clone();
        sender
            .send(Envelope::Terminate)
            .map_err(|_| ServctlError::InvalidArgument)
    }
}

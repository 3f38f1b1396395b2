//! Service threads.
//!
//! Each service runs on its own OS thread. The thread owns a table of the
//! sessions it serves, keyed by [`SessionId`], and a mailbox through which
//! other threads hand it new sessions or deferred work.
//!
//! The mailbox is drained before and after every kernel receive, so a
//! session posted before its handle was created is always in place by the
//! time the first request on it is dispatched.

use std::{collections::HashMap, sync::Arc};

use crossbeam_channel::{Receiver, Sender};
use mizu_result::{
    ERR_REMOTE_PROCESS_DEAD, ERR_SF_INVALID_HEADER, RESULT_SUCCESS, ResultCode, ToResultCode,
};
use mizu_servctl::{KernelEvent, ProcessId, RawCommandBuffer, ServctlError, SessionId, ThreadId};
use mizu_sf::{
    CommandBuffer, CommandKind, cmif::DomainCommand, hipc::Header, hipc::MessageType,
    parse_request, write_error_response,
};
use parking_lot::Mutex;

use crate::{
    context::{RequestContext, ThreadContext},
    controller::Controller,
    session::{SessionHandler, SessionRequestManager},
};

/// Work delivered to a service thread outside the kernel.
pub enum ThreadMessage {
    /// Start serving `session` with `handler`; the manager is built on the
    /// receiving thread.
    Adopt {
        session: SessionId,
        pid: ProcessId,
        handler: Arc<dyn SessionHandler>,
    },
    /// Tear down `session` without waiting for its handles to close. Sent
    /// when the client handle for an adopted session could not be created.
    Discard { session: SessionId },
    /// Run a closure on the service thread.
    Run(Box<dyn FnOnce() + Send>),
}

impl core::fmt::Debug for ThreadMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Adopt { session, pid, handler } => f
                .debug_struct("Adopt")
                .field("session", session)
                .field("pid", pid)
                .field("handler", &handler.name())
                .finish(),
            Self::Discard { session } => {
                f.debug_struct("Discard").field("session", session).finish()
            }
            Self::Run(_) => f.write_str("Run(..)"),
        }
    }
}

/// A message could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("no mailbox for thread {0:?}")]
    UnknownThread(ThreadId),
    #[error("mailbox of thread {0:?} is closed")]
    Closed(ThreadId),
}

impl ToResultCode for MailboxError {
    fn to_result_code(&self) -> ResultCode {
        ERR_REMOTE_PROCESS_DEAD
    }
}

/// Mailboxes of the running service threads.
#[derive(Default)]
pub struct ThreadDirectory {
    mailboxes: Mutex<HashMap<ThreadId, Sender<ThreadMessage>>>,
}

impl ThreadDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the mailbox of `thread`, replacing any previous one.
    pub fn register(&self, thread: ThreadId) -> Receiver<ThreadMessage> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.mailboxes.lock().insert(thread, tx);
        rx
    }

    pub fn unregister(&self, thread: ThreadId) {
        self.mailboxes.lock().remove(&thread);
    }

    pub fn contains(&self, thread: ThreadId) -> bool {
        self.mailboxes.lock().contains_key(&thread)
    }

    pub fn len(&self) -> usize {
        self.mailboxes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.lock().is_empty()
    }

    pub fn post(&self, thread: ThreadId, message: ThreadMessage) -> Result<(), MailboxError> {
        let sender = self
            .mailboxes
            .lock()
            .get(&thread)
            .cloned()
            .ok_or(MailboxError::UnknownThread(thread))?;
        sender
            .send(message)
            .map_err(|_| MailboxError::Closed(thread))
    }
}

impl core::fmt::Debug for ThreadDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadDirectory")
            .field("threads", &self.mailboxes.lock().len())
            .finish()
    }
}

struct SessionEntry {
    manager: SessionRequestManager,
    open_handles: u32,
}

/// The run loop of one service thread.
pub struct ServiceThread {
    context: ThreadContext,
    mailbox: Receiver<ThreadMessage>,
    sessions: HashMap<SessionId, SessionEntry>,
}

impl ServiceThread {
    pub fn new(context: ThreadContext, mailbox: Receiver<ThreadMessage>) -> Self {
        Self {
            context,
            mailbox,
            sessions: HashMap::new(),
        }
    }

    #[inline]
    pub fn context(&self) -> &ThreadContext {
        &self.context
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, session: SessionId) -> bool {
        self.sessions.contains_key(&session)
    }

    /// Number of open handles on `session`.
    pub fn open_handles(&self, session: SessionId) -> u32 {
        self.sessions
            .get(&session)
            .map_or(0, |entry| entry.open_handles)
    }

    /// Starts serving `session` with one open handle.
    pub fn adopt(&mut self, session: SessionId, manager: SessionRequestManager) {
        log::debug!(target: "IPC", "adopting session {session} ({manager:?})");
        let previous = self.sessions.insert(
            session,
            SessionEntry {
                manager,
                open_handles: 1,
            },
        );
        if let Some(previous) = previous {
            log::error!(target: "IPC", "session {session} adopted twice");
            previous.manager.teardown();
        }
    }

    /// Tears down `session` regardless of its open handles.
    pub fn discard(&mut self, session: SessionId) {
        if let Some(entry) = self.sessions.remove(&session) {
            log::debug!(target: "IPC", "session {session} discarded");
            entry.manager.teardown();
        }
    }

    /// Handles every pending mailbox message.
    pub fn drain_mailbox(&mut self) {
        while let Ok(message) = self.mailbox.try_recv() {
            match message {
                ThreadMessage::Adopt {
                    session,
                    pid,
                    handler,
                } => {
                    let manager = SessionRequestManager::with_handler(pid, handler);
                    self.adopt(session, manager);
                }
                ThreadMessage::Discard { session } => self.discard(session),
                ThreadMessage::Run(work) => work(),
            }
        }
    }

    /// Serves kernel events until the thread is terminated.
    pub fn run(mut self) -> Result<(), ServctlError> {
        let tid = self.context.thread_id();
        let kernel = self.context.kernel().clone();
        log::debug!(target: "IPC", "service thread {tid:?} running");

        let result = loop {
            self.drain_mailbox();
            let event = match kernel.receive(tid) {
                Ok(event) => event,
                Err(ServctlError::Terminated) => break Ok(()),
                Err(err) => {
                    log::error!(target: "Kernel", "critical: receive on {tid:?} failed: {err}");
                    break Err(err);
                }
            };
            self.drain_mailbox();

            match event {
                KernelEvent::Request {
                    session,
                    pid,
                    command_buffer,
                } => {
                    let reply = self.handle_request(session, pid, &command_buffer);
                    if let Err(err) = kernel.reply(tid, session, &reply) {
                        log::error!(target: "Kernel", "critical: reply on session {session} failed: {err}");
                    }
                }
                KernelEvent::SessionClosed { session, pid } => {
                    log::debug!(target: "IPC", "peer {pid} closed session {session}");
                    self.release_handle(session);
                }
            }
        };

        for (_, entry) in self.sessions.drain() {
            entry.manager.teardown();
        }
        log::debug!(target: "IPC", "service thread {tid:?} stopped");
        result
    }

    /// Serves one request and returns the reply buffer.
    pub fn handle_request(
        &mut self,
        session: SessionId,
        pid: ProcessId,
        command_buffer: &RawCommandBuffer,
    ) -> RawCommandBuffer {
        let buf = CommandBuffer::from_words(*command_buffer);
        let Some(entry) = self.sessions.get_mut(&session) else {
            return Self::unknown_session_reply(session, &buf);
        };

        let request = match parse_request(&buf, entry.manager.is_domain()) {
            Ok(request) => request,
            Err(err) => {
                log::error!(target: "IPC", "malformed request on session {session}: {err}");
                let tipc_type = tipc_type_of(&buf);
                let mut out = CommandBuffer::new();
                write_error_response(&mut out, tipc_type, false, err.to_result_code());
                return out.into_words();
            }
        };

        if request.is_close() {
            // The entry goes away before the kernel sees the acknowledgement.
            self.release_handle(session);
            return CommandBuffer::new().into_words();
        }

        if request.domain_command() == Some(DomainCommand::CloseVirtualHandle) {
            let code = match request.target_object() {
                Some(id) => entry.manager.close_domain_handler(id).err(),
                None => Some(ERR_REMOTE_PROCESS_DEAD),
            };
            let mut out = CommandBuffer::new();
            write_error_response(&mut out, None, true, code.unwrap_or(RESULT_SUCCESS));
            return out.into_words();
        }

        if let CommandKind::Cmif(ty) = request.kind
            && !ty.is_request()
            && !ty.is_control()
        {
            log::warn!(target: "IPC", "unsupported command type {ty:?} on session {session}");
            let mut out = CommandBuffer::new();
            write_error_response(&mut out, None, false, ERR_SF_INVALID_HEADER);
            return out.into_words();
        }

        let handler = entry.manager.handler_for(request.object_id());
        let is_control = request.kind.is_control();
        let mut ctx = RequestContext::new(
            &self.context,
            &mut entry.manager,
            session,
            pid,
            buf,
            request,
        );
        let result = if is_control {
            Controller::handle(&mut ctx)
        } else {
            match handler {
                Some(handler) => handler.handle_sync_request(&mut ctx),
                None => {
                    log::warn!(
                        target: "IPC",
                        "no handler for session {session} object {:?}",
                        ctx.object_id()
                    );
                    Err(ERR_REMOTE_PROCESS_DEAD)
                }
            }
        };
        let finished = ctx.finish(result);

        if finished.convert_to_domain {
            entry.manager.convert_to_domain();
        }
        entry.open_handles += finished.clones;
        for staged in finished.staged {
            self.adopt(staged.session, staged.manager);
        }
        finished.buffer.into_words()
    }

    fn unknown_session_reply(session: SessionId, buf: &CommandBuffer) -> RawCommandBuffer {
        let header = Header::pop(&mut buf.reader(0));
        let kind = CommandKind::from_message_type(MessageType::from_raw(header.message_type()));
        if kind.is_ok_and(CommandKind::is_close) {
            return CommandBuffer::new().into_words();
        }
        log::warn!(target: "IPC", "request on unknown session {session}");
        let mut out = CommandBuffer::new();
        write_error_response(&mut out, tipc_type_of(buf), false, ERR_REMOTE_PROCESS_DEAD);
        out.into_words()
    }

    /// Drops one handle of `session`, tearing the session down with the
    /// last one.
    pub fn release_handle(&mut self, session: SessionId) {
        let Some(entry) = self.sessions.get_mut(&session) else {
            return;
        };
        entry.open_handles = entry.open_handles.saturating_sub(1);
        if entry.open_handles > 0 {
            log::debug!(target: "IPC", "session {session}: {} handles left", entry.open_handles);
            return;
        }
        if let Some(entry) = self.sessions.remove(&session) {
            log::debug!(target: "IPC", "session {session} closed");
            entry.manager.teardown();
        }
    }
}

fn tipc_type_of(buf: &CommandBuffer) -> Option<MessageType> {
    let ty = MessageType::from_raw(Header::pop(&mut buf.reader(0)).message_type());
    ty.is_tipc().then_some(ty)
}

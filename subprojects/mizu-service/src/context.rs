//! Request context and response builder.
//!
//! A [`RequestContext`] wraps one decoded request while its handler runs.
//! Parameters are popped from a read cursor; the response is written through
//! a [`ResponseBuilder`] into a separate outgoing buffer, so handlers may keep
//! reading after they start responding. Handles, copy fds and domain objects
//! are queued and only placed when the run loop calls
//! [`finish`](RequestContext::finish).

use std::{
    os::fd::{AsFd, OwnedFd},
    sync::Arc,
};

use bitflags::bitflags;
use mizu_result::{RESULT_UNKNOWN, Result, ResultCode, ToResultCode};
use mizu_servctl::{Kernel, ProcessId, SessionHandle, SessionId, ThreadId};
use mizu_sf::{
    CommandBuffer, CommandKind, ParsedRequest, ResponseFormat, ResponseLayout, WordWriter,
    emit_response, hipc::MessageType, push_result, write_error_response,
};
use mizu_sync::Shared;
use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::{
    reporter::{Reporter, UnimplementedReport},
    session::{SessionHandler, SessionRequestManager},
    wire::WireEnum,
};

/// What a service thread lends to every request it serves.
pub struct ThreadContext {
    kernel: Arc<dyn Kernel>,
    reporter: Shared<Reporter>,
    thread_id: ThreadId,
}

impl ThreadContext {
    pub fn new(kernel: Arc<dyn Kernel>, reporter: Shared<Reporter>, thread_id: ThreadId) -> Self {
        Self {
            kernel,
            reporter,
            thread_id,
        }
    }

    #[inline]
    pub fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }

    #[inline]
    pub fn reporter(&self) -> &Shared<Reporter> {
        &self.reporter
    }

    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

bitflags! {
    /// Response emission flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResponseFlags: u32 {
        /// Move objects travel as handles even on a domain session.
        const ALWAYS_MOVE_HANDLES = 1 << 0;
    }
}

/// A session created by `push_ipc_interface`, adopted by the run loop
/// before the reply is sent.
#[derive(Debug)]
pub struct StagedSession {
    pub session: SessionId,
    pub manager: SessionRequestManager,
}

/// The outcome of a request, ready to be applied by the run loop.
#[derive(Debug)]
pub struct FinishedRequest {
    pub buffer: CommandBuffer,
    pub convert_to_domain: bool,
    pub staged: Vec<StagedSession>,
    /// Extra handles opened on the current session.
    pub clones: u32,
}

/// One request being served.
pub struct RequestContext<'a> {
    thread: &'a ThreadContext,
    manager: &'a mut SessionRequestManager,
    session_id: SessionId,
    pid: ProcessId,
    incoming: CommandBuffer,
    request: ParsedRequest,
    cursor: usize,
    outgoing: CommandBuffer,
    layout: Option<ResponseLayout>,
    overflowed: bool,
    failure: Option<ResultCode>,
    move_handles: Vec<u32>,
    copy_fds: Vec<OwnedFd>,
    domain_objects: Vec<u32>,
    staged: Vec<StagedSession>,
    clones: u32,
    convert_to_domain: bool,
}

impl<'a> RequestContext<'a> {
    pub fn new(
        thread: &'a ThreadContext,
        manager: &'a mut SessionRequestManager,
        session_id: SessionId,
        pid: ProcessId,
        incoming: CommandBuffer,
        request: ParsedRequest,
    ) -> Self {
        let cursor = request.params_index;
        Self {
            thread,
            manager,
            session_id,
            pid,
            incoming,
            request,
            cursor,
            outgoing: CommandBuffer::new(),
            layout: None,
            overflowed: false,
            failure: None,
            move_handles: Vec::new(),
            copy_fds: Vec::new(),
            domain_objects: Vec::new(),
            staged: Vec::new(),
            clones: 0,
            convert_to_domain: false,
        }
    }

    /// Guest pid of the requester, as reported by the kernel.
    #[inline]
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Pid the client put in the request, if any.
    #[inline]
    pub fn sent_pid(&self) -> Option<u64> {
        self.request.pid
    }

    #[inline]
    pub fn command(&self) -> u32 {
        self.request.command
    }

    #[inline]
    pub fn command_type(&self) -> CommandKind {
        self.request.kind
    }

    #[inline]
    pub fn is_tipc(&self) -> bool {
        self.request.is_tipc()
    }

    /// Returns `true` if the request carried a domain header.
    #[inline]
    pub fn is_domain(&self) -> bool {
        self.request.domain.is_some()
    }

    #[inline]
    pub fn object_id(&self) -> Option<u32> {
        self.request.object_id()
    }

    #[inline]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread.thread_id
    }

    #[inline]
    pub fn request(&self) -> &ParsedRequest {
        &self.request
    }

    #[inline]
    pub fn manager(&self) -> &SessionRequestManager {
        self.manager
    }

    /// Copy handles received with the request.
    #[inline]
    pub fn copy_handles(&self) -> &[u32] {
        &self.request.copy_handles
    }

    /// Move handles received with the request.
    #[inline]
    pub fn move_handles(&self) -> &[u32] {
        &self.request.move_handles
    }

    #[inline]
    pub fn kernel(&self) -> &dyn Kernel {
        self.thread.kernel.as_ref()
    }

    // --- parameters ---

    /// Pops a plain-data value, advancing by whole words.
    pub fn pop_raw<T: FromBytes>(&mut self) -> T {
        let mut r = self.incoming.reader(self.cursor);
        let value = r.pop_raw::<T>();
        self.cursor = r.index();
        value
    }

    /// Pops a scalar. Sub-word types still consume a full word.
    #[inline]
    pub fn pop<T: FromBytes>(&mut self) -> T {
        self.pop_raw()
    }

    /// Pops a word as a boolean.
    pub fn pop_bool(&mut self) -> bool {
        self.pop::<u32>() & 0xFF != 0
    }

    /// Pops a word and maps it to `E`.
    pub fn pop_enum<E: WireEnum>(&mut self) -> Option<E> {
        let raw = self.pop::<u32>();
        let value = E::from_wire(raw);
        if value.is_none() {
            log::warn!(target: "IPC", "invalid enum value {raw:#x} in command {}", self.command());
        }
        value
    }

    pub fn pop_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut r = self.incoming.reader(self.cursor);
        let bytes = r.pop_bytes(len);
        self.cursor = r.index();
        bytes
    }

    /// Skips `words` parameter words.
    pub fn skip(&mut self, words: usize) {
        self.cursor += words;
    }

    // --- buffers ---

    fn input_descriptor(&self, index: usize) -> Option<(u64, usize)> {
        match self.request.buffer_a.get(index) {
            Some(a) if a.size() > 0 => Some((a.address(), a.size() as usize)),
            _ => self
                .request
                .buffer_x
                .get(index)
                .map(|x| (x.address(), x.size() as usize)),
        }
    }

    fn output_descriptor(&self, index: usize) -> Option<(u64, usize)> {
        match self.request.buffer_b.get(index) {
            Some(b) if b.size() > 0 => Some((b.address(), b.size() as usize)),
            _ => self
                .request
                .buffer_c
                .get(index)
                .map(|c| (c.address(), c.size() as usize)),
        }
    }

    pub fn can_read_buffer(&self, index: usize) -> bool {
        self.input_descriptor(index).is_some_and(|(_, size)| size > 0)
    }

    pub fn can_write_buffer(&self, index: usize) -> bool {
        self.output_descriptor(index).is_some_and(|(_, size)| size > 0)
    }

    pub fn read_buffer_size(&self, index: usize) -> usize {
        self.input_descriptor(index).map_or(0, |(_, size)| size)
    }

    pub fn write_buffer_size(&self, index: usize) -> usize {
        self.output_descriptor(index).map_or(0, |(_, size)| size)
    }

    /// Reads input buffer `index` (A if present, else X).
    pub fn read_buffer(&self, index: usize) -> Result<Vec<u8>> {
        let Some((address, size)) = self.input_descriptor(index) else {
            log::warn!(target: "IPC", "command {} has no input buffer {index}", self.command());
            return Ok(Vec::new());
        };
        let mut out = vec![0; size];
        self.thread
            .kernel
            .read_buffer(address, &mut out)
            .map_err(|err| {
                log::error!(target: "Kernel", "critical: read_buffer({address:#x}, {size}) failed: {err}");
                err.to_result_code()
            })?;
        Ok(out)
    }

    /// Writes output buffer `index` (B if present, else C), clamped to the
    /// descriptor size. Returns the number of bytes written.
    pub fn write_buffer(&self, index: usize, bytes: &[u8]) -> Result<usize> {
        if bytes.is_empty() {
            log::warn!(target: "IPC", "command {}: empty write to buffer {index}", self.command());
            return Ok(0);
        }
        let Some((address, size)) = self.output_descriptor(index) else {
            log::warn!(target: "IPC", "command {} has no output buffer {index}", self.command());
            return Ok(0);
        };
        let len = bytes.len().min(size);
        self.thread
            .kernel
            .write_buffer(address, &bytes[..len])
            .map_err(|err| {
                log::error!(target: "Kernel", "critical: write_buffer({address:#x}, {len}) failed: {err}");
                err.to_result_code()
            })?;
        Ok(len)
    }

    // --- lifecycle ---

    /// Converts the session to a domain once this response is built.
    pub fn convert_to_domain(&mut self) {
        self.convert_to_domain = true;
    }

    /// Records that another handle now refers to this session.
    pub fn add_session_clone(&mut self) {
        self.clones += 1;
    }

    /// Logs and records a call to a command with no handler.
    pub fn report_unimplemented(&mut self, service: &str, name: Option<&'static str>) {
        self.thread.reporter.write().record(UnimplementedReport {
            service: service.to_owned(),
            command: self.command(),
            name,
            pid: self.pid,
        });
    }

    fn tipc_type(&self) -> Option<MessageType> {
        self.is_tipc().then(|| self.request.message_type())
    }

    /// Starts the response. `normal_params` counts the result words.
    pub fn response(
        &mut self,
        normal_params: u32,
        copy_handles: u32,
        move_objects: u32,
    ) -> ResponseBuilder<'_, 'a> {
        self.response_with_flags(
            normal_params,
            copy_handles,
            move_objects,
            ResponseFlags::empty(),
        )
    }

    pub fn response_with_flags(
        &mut self,
        normal_params: u32,
        copy_handles: u32,
        move_objects: u32,
        flags: ResponseFlags,
    ) -> ResponseBuilder<'_, 'a> {
        let format = ResponseFormat {
            tipc_type: self.tipc_type(),
            is_domain: self.is_domain(),
            normal_params,
            num_copy_handles: copy_handles,
            num_move_objects: move_objects,
            always_move_handles: flags.contains(ResponseFlags::ALWAYS_MOVE_HANDLES),
        };
        let layout = emit_response(&mut self.outgoing, &format);
        self.layout = Some(layout);
        self.overflowed = false;
        self.move_handles.clear();
        self.copy_fds.clear();
        self.domain_objects.clear();
        ResponseBuilder {
            index: layout.data_payload_index,
            ctx: self,
        }
    }

    /// Places queued handles and objects, or turns the response into an
    /// error response.
    pub fn finish(mut self, result: Result<()>) -> FinishedRequest {
        if let Err(code) = result.and_then(|()| self.seal()) {
            log::trace!(target: "IPC", "command {} failed with {code}", self.command());
            let tipc_type = self.tipc_type();
            let is_domain = self.is_domain();
            write_error_response(&mut self.outgoing, tipc_type, is_domain, code);

            // Objects pushed by a failed request never reach the client.
            for staged in self.staged.drain(..) {
                staged.manager.teardown();
            }
            for raw in self.domain_objects.drain(..) {
                if let Some(id) = mizu_sf::cmif::ObjectId::new(raw) {
                    let _ = self.manager.close_domain_handler(id);
                }
            }
            self.clones = 0;
        }

        FinishedRequest {
            buffer: self.outgoing,
            convert_to_domain: self.convert_to_domain,
            staged: self.staged,
            clones: self.clones,
        }
    }

    fn seal(&mut self) -> Result<()> {
        if let Some(code) = self.failure {
            return Err(code);
        }
        let Some(layout) = self.layout else {
            log::error!(target: "IPC", "command {} returned without a response", self.command());
            return Err(RESULT_UNKNOWN);
        };
        if self.overflowed {
            log::error!(target: "IPC", "command {}: response overflows the command buffer", self.command());
            return Err(RESULT_UNKNOWN);
        }

        let mut copy_handles = Vec::with_capacity(self.copy_fds.len());
        for fd in &self.copy_fds {
            let handle = self
                .thread
                .kernel
                .create_copy_handle(fd.as_fd())
                .map_err(|err| {
                    log::error!(target: "Kernel", "critical: create_copy_handle failed: {err}");
                    err.to_result_code()
                })?;
            copy_handles.push(handle.to_raw());
        }

        let command = self.request.command;
        layout
            .write_handles(&mut self.outgoing, &copy_handles, &self.move_handles)
            .and_then(|()| layout.write_domain_objects(&mut self.outgoing, &self.domain_objects))
            .map_err(|err| {
                log::error!(target: "IPC", "command {command}: {err}");
                RESULT_UNKNOWN
            })
    }
}

/// Writes the response of a [`RequestContext`].
pub struct ResponseBuilder<'c, 'a> {
    ctx: &'c mut RequestContext<'a>,
    index: usize,
}

impl ResponseBuilder<'_, '_> {
    fn write(&mut self, f: impl FnOnce(&mut WordWriter<'_>)) {
        let mut w = self.ctx.outgoing.writer(self.index);
        f(&mut w);
        self.index = w.index();
        if w.overflowed() {
            self.ctx.overflowed = true;
        }
    }

    /// Pushes the result code: two words under CMIF, one under TIPC.
    pub fn push_result(&mut self, code: ResultCode) -> &mut Self {
        let is_tipc = self.ctx.is_tipc();
        self.write(|w| push_result(w, is_tipc, code));
        self
    }

    /// Pushes a scalar. Sub-word types still take a full word.
    pub fn push<T: IntoBytes + Immutable>(&mut self, value: T) -> &mut Self {
        self.push_raw(&value)
    }

    /// Pushes a plain-data value in wire order.
    pub fn push_raw<T: IntoBytes + Immutable>(&mut self, value: &T) -> &mut Self {
        self.write(|w| w.push_raw(value));
        self
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.push(value as u32)
    }

    pub fn push_enum<E: WireEnum>(&mut self, value: E) -> &mut Self {
        self.push(value.to_wire())
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.write(|w| w.push_bytes(bytes));
        self
    }

    pub fn skip(&mut self, words: usize, zero: bool) -> &mut Self {
        self.write(|w| w.skip(words, zero));
        self
    }

    pub fn align_with_padding(&mut self) -> &mut Self {
        self.write(|w| w.align_with_padding());
        self
    }

    pub fn push_move_handle(&mut self, handle: SessionHandle) -> &mut Self {
        self.ctx.move_handles.push(handle.to_raw());
        self
    }

    pub fn push_move_handles(
        &mut self,
        handles: impl IntoIterator<Item = SessionHandle>,
    ) -> &mut Self {
        for handle in handles {
            self.push_move_handle(handle);
        }
        self
    }

    /// Queues a host fd to be sent as a copy handle.
    pub fn push_copy_fd(&mut self, fd: impl AsFd) -> &mut Self {
        match fd.as_fd().try_clone_to_owned() {
            Ok(owned) => self.ctx.copy_fds.push(owned),
            Err(err) => {
                log::error!(target: "Kernel", "critical: failed to duplicate fd: {err}");
                self.ctx.failure = Some(RESULT_UNKNOWN);
            }
        }
        self
    }

    pub fn push_copy_fds<F: AsFd>(&mut self, fds: impl IntoIterator<Item = F>) -> &mut Self {
        for fd in fds {
            self.push_copy_fd(fd);
        }
        self
    }

    /// Sends an interface: a domain object on a domain session, otherwise a
    /// new session handle served by the current thread.
    pub fn push_ipc_interface(&mut self, handler: Arc<dyn SessionHandler>) -> &mut Self {
        let ctx = &mut *self.ctx;
        if ctx.is_domain() {
            let id = ctx.manager.append_domain_handler(handler);
            ctx.domain_objects.push(id.to_raw());
            return self;
        }

        let session = SessionId::fresh();
        match ctx
            .thread
            .kernel
            .create_session_handle(ctx.thread.thread_id, session)
        {
            Ok(handle) => {
                log::debug!(
                    target: "IPC",
                    "pushed interface {} as session {session}",
                    handler.name()
                );
                ctx.staged.push(StagedSession {
                    session,
                    manager: SessionRequestManager::with_handler(ctx.pid, handler),
                });
                ctx.move_handles.push(handle.to_raw());
            }
            Err(err) => {
                log::error!(
                    target: "IPC",
                    "critical: failed to create session for {}: {err}",
                    handler.name()
                );
                ctx.move_handles.push(0);
            }
        }
        self
    }
}

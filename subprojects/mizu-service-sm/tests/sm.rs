use std::{
    collections::HashSet,
    os::fd::BorrowedFd,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    thread::JoinHandle,
};

use mizu_result::{
    ERR_REMOTE_PROCESS_DEAD, ERR_SM_ALREADY_REGISTERED, ERR_SM_INVALID_NAME,
    ERR_SM_NOT_INITIALIZED, ERR_SM_NOT_REGISTERED, RESULT_SUCCESS, Result,
};
use mizu_servctl::{
    CopyHandle, Kernel, KernelEvent, LoopbackKernel, ProcessId, RawCommandBuffer, ServctlError,
    SessionHandle, SessionId, ThreadId, VAddr,
};
use mizu_service::{
    FunctionInfo, Reporter, RequestContext, ServiceCore, ServiceFramework, ServiceThread,
    SessionHandler, SessionRequestManager, ThreadContext, ThreadDirectory, ThreadMessage,
};
use mizu_service_sm::{IUserInterface, RegisterServiceIn, ServiceManager};
use mizu_sf::{CommandBuffer, ServiceName, cmif, tipc};
use mizu_sync::Shared;
use proptest::prelude::*;

const CLIENT: ProcessId = ProcessId::new(0x80);

struct AudOut {
    core: ServiceCore,
    setups: AtomicU32,
    cleanups: AtomicU32,
}

impl AudOut {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            core: ServiceCore::new("audout:u"),
            setups: AtomicU32::new(0),
            cleanups: AtomicU32::new(0),
        })
    }

    fn list_audio_outs(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        ctx.response(3, 0, 0).push_result(RESULT_SUCCESS).push(1u32);
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] =
        &[FunctionInfo::new(0, Some(Self::list_audio_outs), "ListAudioOuts")];
}

impl ServiceFramework for AudOut {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }

    fn setup_session(&self, _pid: ProcessId) {
        self.setups.fetch_add(1, Ordering::SeqCst);
    }

    fn cleanup_session(&self, _pid: ProcessId) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fabric {
    kernel: Arc<LoopbackKernel>,
    directory: Arc<ThreadDirectory>,
    manager: Shared<ServiceManager>,
    workers: Vec<JoinHandle<std::result::Result<(), ServctlError>>>,
}

impl Fabric {
    fn new() -> Self {
        Self {
            kernel: Arc::new(LoopbackKernel::new()),
            directory: Arc::new(ThreadDirectory::new()),
            manager: Shared::new(ServiceManager::new()),
            workers: Vec::new(),
        }
    }

    fn spawn(&mut self, tid: ThreadId) {
        let mailbox = self.directory.register(tid);
        let context = ThreadContext::new(self.kernel.clone(), Shared::new(Reporter::default()), tid);
        let thread = ServiceThread::new(context, mailbox);
        self.workers.push(std::thread::spawn(move || thread.run()));
    }

    fn connect(&self, tid: ThreadId, handler: Arc<dyn SessionHandler>) -> SessionHandle {
        let (handle, session) = self.kernel.connect(tid).unwrap();
        self.directory
            .post(
                tid,
                ThreadMessage::Adopt {
                    session,
                    pid: CLIENT,
                    handler,
                },
            )
            .unwrap();
        handle
    }

    fn send(&self, handle: SessionHandle, pid: ProcessId, buf: &CommandBuffer) -> CommandBuffer {
        let mut words = *buf.as_words();
        self.kernel.send_sync_request(handle, pid, &mut words).unwrap();
        CommandBuffer::from_words(words)
    }

    fn shutdown(self) {
        self.kernel.shutdown();
        for worker in self.workers {
            worker.join().unwrap().unwrap();
        }
    }
}

fn encode(request: cmif::Request) -> CommandBuffer {
    let mut buf = CommandBuffer::new();
    request.encode(&mut buf);
    buf
}

fn wire_name(name: &str) -> u64 {
    ServiceName::new(name).unwrap().to_u64()
}

#[test]
fn test_get_service_then_close() {
    let sm_tid = ThreadId::from_raw(7000);
    let audout_tid = ThreadId::from_raw(7001);
    let mut fabric = Fabric::new();
    fabric.spawn(sm_tid);
    fabric.spawn(audout_tid);

    let audout = AudOut::new();
    fabric
        .manager
        .write()
        .register_service("audout:u", 8, Some(audout.clone()), audout_tid)
        .unwrap();
    let sm = Arc::new(IUserInterface::new(
        fabric.manager.clone(),
        fabric.directory.clone(),
    ));
    let sm_handle = fabric.connect(sm_tid, sm);

    // GetService before Initialize.
    let get = encode(cmif::Request::new(1).push(&wire_name("audout:u")));
    let reply = fabric.send(sm_handle, CLIENT, &get);
    assert_eq!(
        cmif::response_result(&reply, false).unwrap(),
        ERR_SM_NOT_INITIALIZED
    );

    let reply = fabric.send(sm_handle, CLIENT, &encode(cmif::Request::new(0).send_pid(0)));
    assert_eq!(cmif::response_result(&reply, false).unwrap(), RESULT_SUCCESS);

    let reply = fabric.send(sm_handle, CLIENT, &get);
    let response = cmif::parse_response(&reply, false, 0).unwrap();
    let handle = SessionHandle::from_raw(response.move_handles[0]);
    assert!(handle.is_valid());
    assert_eq!(fabric.kernel.owner_of(handle), Some(audout_tid));

    let reply = fabric.send(handle, CLIENT, &encode(cmif::Request::new(0)));
    assert_eq!(cmif::parse_response(&reply, false, 4).unwrap().word(0), 1);

    let mut close = CommandBuffer::new();
    cmif::make_close_request(&mut close);
    fabric.send(handle, CLIENT, &close);
    assert_eq!(audout.cleanups.load(Ordering::SeqCst), 1);

    let reply = fabric.send(handle, CLIENT, &encode(cmif::Request::new(0)));
    assert_eq!(
        cmif::response_result(&reply, false).unwrap(),
        ERR_REMOTE_PROCESS_DEAD
    );

    fabric.shutdown();
}

/// Serves `sm:` synchronously on the test thread.
struct SyncSm {
    thread: ServiceThread,
    session: SessionId,
    manager: Shared<ServiceManager>,
    directory: Arc<ThreadDirectory>,
    mailboxes: Vec<crossbeam_channel::Receiver<ThreadMessage>>,
}

impl SyncSm {
    fn new(tid: ThreadId) -> Self {
        Self::with_kernel(tid, Arc::new(LoopbackKernel::new()))
    }

    fn with_kernel(tid: ThreadId, kernel: Arc<dyn Kernel>) -> Self {
        let directory = Arc::new(ThreadDirectory::new());
        let manager = Shared::new(ServiceManager::new());
        let mailbox = directory.register(tid);
        let context = ThreadContext::new(kernel, Shared::new(Reporter::default()), tid);
        let mut thread = ServiceThread::new(context, mailbox);

        let session = SessionId::fresh();
        let sm = Arc::new(IUserInterface::new(manager.clone(), directory.clone()));
        thread.adopt(session, SessionRequestManager::with_handler(CLIENT, sm));
        Self {
            thread,
            session,
            manager,
            directory,
            mailboxes: Vec::new(),
        }
    }

    fn call(&mut self, buf: &CommandBuffer) -> CommandBuffer {
        CommandBuffer::from_words(self.thread.handle_request(self.session, CLIENT, buf.as_words()))
    }

    fn cmif(&mut self, request: cmif::Request) -> CommandBuffer {
        self.call(&encode(request))
    }

    fn tipc(&mut self, request: tipc::Request) -> CommandBuffer {
        let mut buf = CommandBuffer::new();
        request.encode(&mut buf);
        self.call(&buf)
    }

    fn owner(&mut self, tid: ThreadId) {
        self.mailboxes.push(self.directory.register(tid));
    }
}

/// Loopback kernel that has run out of handles.
struct HandleStarved(LoopbackKernel);

impl Kernel for HandleStarved {
    fn create_session_handle(
        &self,
        _owner: ThreadId,
        _session: SessionId,
    ) -> std::result::Result<SessionHandle, ServctlError> {
        Err(ServctlError::OutOfHandles)
    }

    fn create_copy_handle(&self, fd: BorrowedFd<'_>) -> std::result::Result<CopyHandle, ServctlError> {
        self.0.create_copy_handle(fd)
    }

    fn read_buffer(&self, addr: VAddr, dst: &mut [u8]) -> std::result::Result<(), ServctlError> {
        self.0.read_buffer(addr, dst)
    }

    fn write_buffer(&self, addr: VAddr, src: &[u8]) -> std::result::Result<(), ServctlError> {
        self.0.write_buffer(addr, src)
    }

    fn process_id(&self) -> std::result::Result<ProcessId, ServctlError> {
        self.0.process_id()
    }

    fn receive(&self, owner: ThreadId) -> std::result::Result<KernelEvent, ServctlError> {
        self.0.receive(owner)
    }

    fn reply(
        &self,
        owner: ThreadId,
        session: SessionId,
        command_buffer: &RawCommandBuffer,
    ) -> std::result::Result<(), ServctlError> {
        self.0.reply(owner, session, command_buffer)
    }

    fn terminate(&self, owner: ThreadId) -> std::result::Result<(), ServctlError> {
        self.0.terminate(owner)
    }
}

#[test]
fn test_failed_handle_discards_adopted_session() {
    let mut sm = SyncSm::with_kernel(
        ThreadId::from_raw(7400),
        Arc::new(HandleStarved(LoopbackKernel::new())),
    );
    let owner_tid = ThreadId::from_raw(7401);
    let mailbox = sm.directory.register(owner_tid);
    let audout = AudOut::new();
    sm.manager
        .write()
        .register_service("audout:u", 4, Some(audout.clone()), owner_tid)
        .unwrap();
    sm.cmif(cmif::Request::new(0).send_pid(0));

    let reply = sm.cmif(cmif::Request::new(1).push(&wire_name("audout:u")));
    assert_ne!(cmif::response_result(&reply, false).unwrap(), RESULT_SUCCESS);

    let context = ThreadContext::new(
        Arc::new(LoopbackKernel::new()),
        Shared::new(Reporter::default()),
        owner_tid,
    );
    let mut owner = ServiceThread::new(context, mailbox);
    owner.drain_mailbox();
    assert_eq!(owner.session_count(), 0);
    assert_eq!(audout.setups.load(Ordering::SeqCst), 1);
    assert_eq!(audout.cleanups.load(Ordering::SeqCst), 1);
}

#[test]
fn test_initialized_flag_ends_with_last_session() {
    let sm = Arc::new(IUserInterface::new(
        Shared::new(ServiceManager::new()),
        Arc::new(ThreadDirectory::new()),
    ));
    let first = SessionRequestManager::with_handler(CLIENT, sm.clone());
    let second = SessionRequestManager::with_handler(CLIENT, sm.clone());
    assert_eq!(sm.session_count(CLIENT), 2);

    let mut thread = ServiceThread::new(
        ThreadContext::new(
            Arc::new(LoopbackKernel::new()),
            Shared::new(Reporter::default()),
            ThreadId::from_raw(7500),
        ),
        crossbeam_channel::never(),
    );
    let session = SessionId::fresh();
    thread.adopt(session, first);
    let reply = CommandBuffer::from_words(thread.handle_request(
        session,
        CLIENT,
        encode(cmif::Request::new(0).send_pid(0)).as_words(),
    ));
    assert_eq!(cmif::response_result(&reply, false).unwrap(), RESULT_SUCCESS);
    assert!(sm.is_initialized(CLIENT));

    thread.discard(session);
    assert!(sm.is_initialized(CLIENT));
    second.teardown();
    assert!(!sm.is_initialized(CLIENT));
    assert_eq!(sm.session_count(CLIENT), 0);
}

#[test]
fn test_register_service_name_rules() {
    let mut sm = SyncSm::new(ThreadId::from_raw(7100));
    let register = |name: ServiceName| {
        cmif::Request::new(2).push(&RegisterServiceIn::new(name, false, 4))
    };

    let reply = sm.cmif(register(ServiceName::default()));
    assert_eq!(cmif::response_result(&reply, false).unwrap(), ERR_SM_INVALID_NAME);

    let apm = ServiceName::new("apm").unwrap();
    let reply = sm.cmif(register(apm));
    let response = cmif::parse_response(&reply, false, 0).unwrap();
    assert_eq!(response.move_handles.len(), 1);
    assert!(sm.manager.read().is_registered("apm"));

    let reply = sm.cmif(register(apm));
    assert_eq!(
        cmif::response_result(&reply, false).unwrap(),
        ERR_SM_ALREADY_REGISTERED
    );

    let unregister = || cmif::Request::new(3).push(&wire_name("apm"));
    let reply = sm.cmif(unregister());
    assert_eq!(cmif::response_result(&reply, false).unwrap(), RESULT_SUCCESS);
    let reply = sm.cmif(unregister());
    assert_eq!(
        cmif::response_result(&reply, false).unwrap(),
        ERR_SM_NOT_REGISTERED
    );
}

#[test]
fn test_tipc_get_service_returns_zero_handle_on_failure() {
    let mut sm = SyncSm::new(ThreadId::from_raw(7200));
    let response = tipc::parse_response(&sm.tipc(tipc::Request::new(0).send_pid(0))).unwrap();
    assert_eq!(response.result, RESULT_SUCCESS);

    let response =
        tipc::parse_response(&sm.tipc(tipc::Request::new(1).push(&wire_name("bsd:u")))).unwrap();
    assert_eq!(response.result, ERR_SM_NOT_REGISTERED);
    assert_eq!(response.move_handles, vec![0]);

    let owner = ThreadId::from_raw(7201);
    sm.owner(owner);
    sm.manager
        .write()
        .register_service("bsd:u", 4, Some(AudOut::new()), owner)
        .unwrap();
    let response =
        tipc::parse_response(&sm.tipc(tipc::Request::new(1).push(&wire_name("bsd:u")))).unwrap();
    assert_eq!(response.result, RESULT_SUCCESS);
    assert_ne!(response.move_handles[0], 0);
}

fn service_names() -> impl Strategy<Value = HashSet<String>> {
    prop::collection::hash_set("[a-z][a-z:]{0,7}", 1..8)
}

proptest! {
    #[test]
    fn test_get_service_handles_are_distinct(names in service_names()) {
        let mut sm = SyncSm::new(ThreadId::from_raw(7300));
        let owner = ThreadId::from_raw(7301);
        sm.owner(owner);
        for name in &names {
            sm.manager
                .write()
                .register_service(name, 4, Some(AudOut::new()), owner)
                .unwrap();
        }
        sm.cmif(cmif::Request::new(0).send_pid(0));

        let mut handles = HashSet::new();
        for name in &names {
            for _ in 0..2 {
                let reply = sm.cmif(cmif::Request::new(1).push(&wire_name(name)));
                let response = cmif::parse_response(&reply, false, 0);
                prop_assert!(response.is_ok());
                let handle = response.unwrap().move_handles[0];
                prop_assert!(handles.insert(handle));
            }
        }
    }
}

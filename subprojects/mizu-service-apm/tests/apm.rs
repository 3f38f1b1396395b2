use std::sync::Arc;

use mizu_result::{RESULT_SUCCESS, kernel};
use mizu_servctl::{LoopbackKernel, ProcessId, SessionHandle, SessionId, ThreadId};
use mizu_service::{Reporter, ServiceThread, SessionRequestManager, ThreadContext};
use mizu_service_apm::{
    ApmController, IManager, ISystemManager, PerformanceConfiguration, SERVICE_NAME,
};
use mizu_sf::{CommandBuffer, cmif};
use mizu_sync::Shared;

const PID: ProcessId = ProcessId::new(0x90);

struct Apm {
    kernel: Arc<LoopbackKernel>,
    thread: ServiceThread,
    controller: Shared<ApmController>,
    manager: SessionId,
    system: SessionId,
}

impl Apm {
    fn new() -> Self {
        let kernel = Arc::new(LoopbackKernel::new());
        let context = ThreadContext::new(
            kernel.clone(),
            Shared::new(Reporter::default()),
            ThreadId::from_raw(8000),
        );
        let (_tx, rx) = crossbeam_channel::unbounded();
        let mut thread = ServiceThread::new(context, rx);

        let controller = Shared::new(ApmController::new().unwrap());
        let manager = SessionId::fresh();
        thread.adopt(
            manager,
            SessionRequestManager::with_handler(
                PID,
                Arc::new(IManager::new(SERVICE_NAME, controller.clone())),
            ),
        );
        let system = SessionId::fresh();
        thread.adopt(
            system,
            SessionRequestManager::with_handler(
                PID,
                Arc::new(ISystemManager::new(controller.clone())),
            ),
        );
        Self {
            kernel,
            thread,
            controller,
            manager,
            system,
        }
    }

    fn call(&mut self, session: SessionId, request: cmif::Request) -> CommandBuffer {
        let mut buf = CommandBuffer::new();
        request.encode(&mut buf);
        CommandBuffer::from_words(self.thread.handle_request(session, PID, buf.as_words()))
    }

    fn open_session(&mut self) -> SessionId {
        let reply = self.call(self.manager, cmif::Request::new(0));
        let response = cmif::parse_response(&reply, false, 0).unwrap();
        let handle = SessionHandle::from_raw(response.move_handles[0]);
        self.kernel.session_of(handle).unwrap()
    }
}

#[test]
fn test_session_configuration_is_shared_with_system() {
    let mut apm = Apm::new();
    let session = apm.open_session();

    let reply = apm.call(
        session,
        cmif::Request::new(0).push(&1i32).push(&0x9222_000Cu32),
    );
    assert_eq!(cmif::response_result(&reply, false).unwrap(), RESULT_SUCCESS);

    let reply = apm.call(session, cmif::Request::new(1).push(&1i32));
    assert_eq!(cmif::parse_response(&reply, false, 4).unwrap().word(0), 0x9222_000C);

    let reply = apm.call(apm.system, cmif::Request::new(0).push(&1i32));
    assert_eq!(cmif::response_result(&reply, false).unwrap(), RESULT_SUCCESS);

    let reply = apm.call(apm.manager, cmif::Request::new(1));
    assert_eq!(cmif::parse_response(&reply, false, 4).unwrap().word(0), 1);

    let reply = apm.call(apm.system, cmif::Request::new(7));
    assert_eq!(cmif::parse_response(&reply, false, 4).unwrap().word(0), 0x9222_000C);
}

#[test]
fn test_invalid_mode_is_rejected() {
    let mut apm = Apm::new();
    let session = apm.open_session();
    let reply = apm.call(session, cmif::Request::new(1).push(&5i32));
    assert_eq!(
        cmif::response_result(&reply, false).unwrap(),
        kernel::INVALID_ARGUMENT
    );
}

#[test]
fn test_cpu_boost_and_performance_event() {
    let mut apm = Apm::new();
    let reply = apm.call(apm.system, cmif::Request::new(6).push(&1u32));
    assert_eq!(cmif::response_result(&reply, false).unwrap(), RESULT_SUCCESS);
    assert_eq!(
        apm.controller.read().current_performance_configuration(),
        PerformanceConfiguration::CONFIG_15
    );

    let reply = apm.call(apm.system, cmif::Request::new(6).push(&9u32));
    assert_eq!(
        cmif::response_result(&reply, false).unwrap(),
        kernel::INVALID_ARGUMENT
    );

    let reply = apm.call(apm.system, cmif::Request::new(1));
    let response = cmif::parse_response(&reply, false, 0).unwrap();
    assert_eq!(response.copy_handles.len(), 1);

    apm.call(apm.system, cmif::Request::new(0).push(&1i32));
    assert!(apm.controller.read().performance_event().is_signaled());
}

#[test]
fn test_overclock_flag_round_trips_through_session() {
    let mut apm = Apm::new();
    let session = apm.open_session();
    apm.call(session, cmif::Request::new(2).push(&1u32));
    let reply = apm.call(apm.manager, cmif::Request::new(6));
    assert_eq!(cmif::parse_response(&reply, false, 4).unwrap().word(0) & 0xFF, 1);
}

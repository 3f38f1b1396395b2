use std::sync::Arc;

use mizu_servctl::{LoopbackKernel, ProcessId, SessionId, ThreadId};
use mizu_service::{Reporter, ServiceThread, SessionRequestManager, ThreadContext};
use mizu_service_nv::{GpuTable, INvDrvServices, NvResult};
use mizu_sf::{CommandBuffer, cmif};
use mizu_sync::Shared;
use proptest::prelude::*;

const PID: ProcessId = ProcessId::new(0xB0);
const PATH_ADDR: u64 = 0x1000;

struct Nv {
    kernel: Arc<LoopbackKernel>,
    reporter: Shared<Reporter>,
    gpus: Shared<GpuTable>,
    service: Arc<INvDrvServices>,
    thread: ServiceThread,
}

impl Nv {
    fn new() -> Self {
        let kernel = Arc::new(LoopbackKernel::new());
        kernel.map_memory(PATH_ADDR, 0x100);
        let reporter = Shared::new(Reporter::default());
        let context = ThreadContext::new(kernel.clone(), reporter.clone(), ThreadId::from_raw(9100));
        let (_tx, rx) = crossbeam_channel::unbounded();
        let gpus = Shared::new(GpuTable::new());
        Self {
            kernel,
            reporter,
            service: Arc::new(INvDrvServices::new("nvdrv", gpus.clone())),
            gpus,
            thread: ServiceThread::new(context, rx),
        }
    }

    fn open_session(&mut self) -> SessionId {
        let session = SessionId::fresh();
        self.thread.adopt(
            session,
            SessionRequestManager::with_handler(PID, self.service.clone()),
        );
        session
    }

    fn call(&mut self, session: SessionId, request: cmif::Request) -> CommandBuffer {
        let mut buf = CommandBuffer::new();
        request.encode(&mut buf);
        CommandBuffer::from_words(self.thread.handle_request(session, PID, buf.as_words()))
    }

    fn open(&mut self, session: SessionId, path: &str) -> (u32, u32) {
        let mut bytes = path.as_bytes().to_vec();
        bytes.push(0);
        self.kernel.write_guest(PATH_ADDR, &bytes).unwrap();
        let reply = self.call(
            session,
            cmif::Request::new(0).add_in_buffer(PATH_ADDR, bytes.len() as u64),
        );
        let response = cmif::parse_response(&reply, false, 8).unwrap();
        (response.word(0), response.word(1))
    }

    fn status(&mut self, session: SessionId, request: cmif::Request) -> u32 {
        let reply = self.call(session, request);
        cmif::parse_response(&reply, false, 4).unwrap().word(0)
    }
}

#[test]
fn test_sessions_pin_the_gpu() {
    let mut nv = Nv::new();
    let first = nv.open_session();
    let second = nv.open_session();
    assert_eq!(nv.gpus.read().refcount(PID), 2);

    nv.thread.release_handle(first);
    assert_eq!(nv.gpus.read().refcount(PID), 1);
    nv.thread.release_handle(second);
    assert!(nv.gpus.read().is_empty());
}

#[test]
fn test_device_lifecycle() {
    let mut nv = Nv::new();
    let session = nv.open_session();

    let (fd, status) = nv.open(session, "/dev/nvhost-ctrl");
    assert_eq!(status, NvResult::Success.to_raw());
    assert_ne!(fd, 0);
    let (_, status) = nv.open(session, "/dev/sda");
    assert_eq!(status, NvResult::FileOperationFailed.to_raw());

    let reply = nv.call(session, cmif::Request::new(4).push(&fd).push(&1u32));
    let response = cmif::parse_response(&reply, false, 4).unwrap();
    assert_eq!(response.copy_handles.len(), 1);
    assert_eq!(response.word(0), NvResult::Success.to_raw());

    let status = nv.status(session, cmif::Request::new(1).push(&fd).push(&0xC018_481Bu32));
    assert_eq!(status, NvResult::NotImplemented.to_raw());
    assert_eq!(nv.reporter.read().len(), 1);

    assert_eq!(nv.status(session, cmif::Request::new(2).push(&fd)), 0);
    assert_eq!(
        nv.status(session, cmif::Request::new(2).push(&fd)),
        NvResult::BadParameter.to_raw()
    );
}

#[test]
fn test_initialize_and_aruid() {
    let mut nv = Nv::new();
    let session = nv.open_session();
    assert_eq!(nv.status(session, cmif::Request::new(3).push(&0x80_0000u32)), 0);
    assert_eq!(nv.status(session, cmif::Request::new(8).push(&0x1234u64)), 0);
    let reply = nv.call(session, cmif::Request::new(13).push(&1u32));
    assert!(cmif::parse_response(&reply, false, 0).is_ok());
}

#[derive(Debug, Clone)]
enum Op {
    Grab(u8),
    Put(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![(0u8..4).prop_map(Op::Grab), (0u8..4).prop_map(Op::Put)]
}

proptest! {
    #[test]
    fn test_refcount_matches_outstanding_grabs(ops in prop::collection::vec(op(), 0..64)) {
        let mut table = GpuTable::new();
        let mut model = [0u32; 4];
        for op in ops {
            match op {
                Op::Grab(pid) => {
                    table.grab(ProcessId::new(pid as u64));
                    model[pid as usize] += 1;
                }
                Op::Put(pid) => {
                    table.put(ProcessId::new(pid as u64));
                    model[pid as usize] = model[pid as usize].saturating_sub(1);
                }
            }
        }
        for (pid, expected) in model.iter().enumerate() {
            let pid = ProcessId::new(pid as u64);
            prop_assert_eq!(table.refcount(pid), *expected);
            prop_assert_eq!(table.gpu(pid).is_some(), *expected > 0);
        }
        prop_assert_eq!(table.len(), model.iter().filter(|n| **n > 0).count());
    }
}

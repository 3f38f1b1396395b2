use std::sync::Arc;

use mizu_result::RESULT_SUCCESS;
use mizu_servctl::{LoopbackKernel, ProcessId, SessionHandle, SessionId, ThreadId};
use mizu_service::{Reporter, ServiceThread, SessionRequestManager, ThreadContext, WireEnum};
use mizu_service_nv::GpuTable;
use mizu_service_vi::{
    BinderObjectId, BinderStatus, DisplayName, ERR_VI_NOT_FOUND, ERR_VI_OPERATION_FAILED,
    ERR_VI_PERMISSION_DENIED, ERR_VI_UNSUPPORTED, IHOSBinderDriver, IManagerRootService,
    IgbpBuffer, MultiFence, NativeWindow, NvFlinger, PIXEL_FORMAT_RGBA8888, PRODUCER_INTERFACE,
    Parcel, QueueBufferInput, SERVICE_NAME_DISPDRV, TransactionCode,
};
use mizu_sf::{CommandBuffer, cmif};
use mizu_sync::Shared;

const PID: ProcessId = ProcessId::new(0xA0);
const IN_ADDR: u64 = 0x10_000;
const OUT_ADDR: u64 = 0x20_000;
const BUF_LEN: usize = 0x400;

struct Vi {
    kernel: Arc<LoopbackKernel>,
    thread: ServiceThread,
    nv_flinger: Shared<NvFlinger>,
    display_service: SessionId,
    dispdrv: SessionId,
}

impl Vi {
    fn new() -> Self {
        let kernel = Arc::new(LoopbackKernel::new());
        kernel.map_memory(IN_ADDR, BUF_LEN);
        kernel.map_memory(OUT_ADDR, BUF_LEN);
        let context = ThreadContext::new(
            kernel.clone(),
            Shared::new(Reporter::default()),
            ThreadId::from_raw(9500),
        );
        let (_tx, rx) = crossbeam_channel::unbounded();
        let mut thread = ServiceThread::new(context, rx);

        let nv_flinger = Shared::new(NvFlinger::new().unwrap());
        let root = SessionId::fresh();
        thread.adopt(
            root,
            SessionRequestManager::with_handler(
                PID,
                Arc::new(IManagerRootService::new(nv_flinger.clone())),
            ),
        );
        let dispdrv = SessionId::fresh();
        thread.adopt(
            dispdrv,
            SessionRequestManager::with_handler(
                PID,
                Arc::new(IHOSBinderDriver::new(SERVICE_NAME_DISPDRV, nv_flinger.clone())),
            ),
        );

        let mut vi = Self {
            kernel,
            thread,
            nv_flinger,
            display_service: root,
            dispdrv,
        };
        let reply = vi.call(root, cmif::Request::new(2).push(&0u32));
        let response = cmif::parse_response(&reply, false, 0).unwrap();
        let handle = SessionHandle::from_raw(response.move_handles[0]);
        vi.display_service = vi.kernel.session_of(handle).unwrap();
        vi
    }

    fn call_as(&mut self, pid: ProcessId, session: SessionId, request: cmif::Request) -> CommandBuffer {
        let mut buf = CommandBuffer::new();
        request.encode(&mut buf);
        CommandBuffer::from_words(self.thread.handle_request(session, pid, buf.as_words()))
    }

    fn call(&mut self, session: SessionId, request: cmif::Request) -> CommandBuffer {
        self.call_as(PID, session, request)
    }

    fn display(&mut self, request: cmif::Request, size: usize) -> cmif::Response {
        let reply = self.call(self.display_service, request);
        cmif::parse_response(&reply, false, size).unwrap()
    }

    fn display_result(&mut self, request: cmif::Request) -> mizu_result::ResultCode {
        let reply = self.call(self.display_service, request);
        cmif::response_result(&reply, false).unwrap()
    }

    fn read_native_window(&self, size: usize) -> NativeWindow {
        let bytes = self.kernel.read_guest(OUT_ADDR, size).unwrap();
        Parcel::from_transaction(&bytes)
            .unwrap()
            .read_flattened::<NativeWindow>()
            .unwrap()
    }

    fn transact(
        &mut self,
        binder_id: i32,
        code: TransactionCode,
        args: impl FnOnce(&mut Parcel),
    ) -> Parcel {
        let mut parcel = Parcel::new();
        parcel.write_interface_token(PRODUCER_INTERFACE);
        args(&mut parcel);
        let input = parcel.serialize();
        self.kernel.write_guest(IN_ADDR, &input).unwrap();

        let request = cmif::Request::new(0)
            .push(&binder_id)
            .push(&code.to_wire())
            .push(&0u32)
            .add_in_buffer(IN_ADDR, input.len() as u64)
            .add_out_buffer(OUT_ADDR, BUF_LEN as u64);
        let reply = self.call(self.dispdrv, request);
        assert_eq!(cmif::response_result(&reply, false).unwrap(), RESULT_SUCCESS);
        Parcel::from_transaction(&self.kernel.read_guest(OUT_ADDR, BUF_LEN).unwrap()).unwrap()
    }
}

fn status(reply: &mut Parcel) -> BinderStatus {
    BinderStatus::from_code(reply.read_i32().unwrap()).unwrap()
}

#[test]
fn test_stray_layer_frame_reaches_compositor() {
    let mut vi = Vi::new();

    let response = vi.display(
        cmif::Request::new(1010).push(&DisplayName::from_ascii("Default")),
        8,
    );
    let display = response.u64_at(0);
    assert_eq!(display, 0);

    let response = vi.display(
        cmif::Request::new(2030)
            .push(&0u32)
            .push(&0u32)
            .push(&display)
            .add_out_buffer(OUT_ADDR, BUF_LEN as u64),
        16,
    );
    let layer = response.u64_at(0);
    let size = response.u64_at(2) as usize;
    let window = vi.read_native_window(size);
    assert_eq!(window.magic, 2);
    assert_eq!(&window.dispdrv[..7], b"dispdrv");

    let response = vi.display(
        cmif::Request::new(2020)
            .push(&DisplayName::from_ascii("Default"))
            .push(&layer)
            .push(&0u64)
            .add_out_buffer(OUT_ADDR, BUF_LEN as u64),
        8,
    );
    assert_eq!(response.u64_at(0) as usize, size);
    let binder_id = vi.read_native_window(size).binder_id;
    assert_eq!(binder_id, window.binder_id);

    let buffer = IgbpBuffer::new(1280, 720, PIXEL_FORMAT_RGBA8888);
    let mut reply = vi.transact(binder_id, TransactionCode::Connect, |p| {
        p.write_i32(0);
        p.write_i32(2);
        p.write_i32(0);
    });
    reply.read_raw::<mizu_service_vi::QueueBufferOutput>().unwrap();
    assert_eq!(status(&mut reply), BinderStatus::NoError);

    let mut reply = vi.transact(binder_id, TransactionCode::SetPreallocatedBuffer, |p| {
        p.write_i32(0);
        p.write_i32(1);
        p.write_flattened_object(&buffer.raw);
    });
    assert_eq!(status(&mut reply), BinderStatus::NoError);

    let mut reply = vi.transact(binder_id, TransactionCode::DequeueBuffer, |p| {
        for word in [0, 1280, 720, PIXEL_FORMAT_RGBA8888, 0] {
            p.write_u32(word);
        }
    });
    let slot = reply.read_i32().unwrap();
    assert_eq!(slot, 0);
    assert_eq!(reply.read_i32().unwrap(), 1);
    reply.read_flattened::<MultiFence>().unwrap();
    assert_eq!(status(&mut reply), BinderStatus::NoError);

    let mut reply = vi.transact(binder_id, TransactionCode::QueueBuffer, |p| {
        p.write_i32(slot);
        p.write_flattened(&QueueBufferInput {
            swap_interval: 1,
            ..QueueBufferInput::default()
        });
    });
    reply.read_raw::<mizu_service_vi::QueueBufferOutput>().unwrap();
    assert_eq!(status(&mut reply), BinderStatus::NoError);

    let mut gpus = GpuTable::new();
    let gpu = gpus.grab(PID);
    assert_eq!(vi.nv_flinger.read().compose(&gpus), 1);
    assert_eq!(gpu.read().frames_presented(), 1);

    let reply = vi.call(vi.dispdrv, cmif::Request::new(2).push(&binder_id).push(&0u32));
    assert_eq!(cmif::parse_response(&reply, false, 0).unwrap().copy_handles.len(), 1);

    let response = vi.display(cmif::Request::new(5202).push(&display), 0);
    assert_eq!(response.copy_handles.len(), 1);
    assert!(vi.nv_flinger.read().vsync_event(mizu_service_vi::DisplayId::new(0)).unwrap().is_signaled());
}

#[test]
fn test_display_errors() {
    let mut vi = Vi::new();
    let code = vi.display_result(cmif::Request::new(1010).push(&DisplayName::from_ascii("Nope")));
    assert_eq!(code, ERR_VI_NOT_FOUND);
    assert_eq!(vi.display_result(cmif::Request::new(1020).push(&3u64)), ERR_VI_NOT_FOUND);

    let response = vi.display(cmif::Request::new(1102).push(&0u64), 16);
    assert_eq!((response.u64_at(0), response.u64_at(2)), (1280, 720));

    let reply = vi.call(
        vi.dispdrv,
        cmif::Request::new(0)
            .push(&BinderObjectId::new(77).to_raw())
            .push(&1u32)
            .push(&0u32),
    );
    assert_eq!(cmif::response_result(&reply, false).unwrap(), ERR_VI_NOT_FOUND);
}

#[test]
fn test_layer_scaling_and_ownership() {
    let mut vi = Vi::new();
    let response = vi.display(
        cmif::Request::new(2030)
            .push(&0u32)
            .push(&0u32)
            .push(&0u64)
            .add_out_buffer(OUT_ADDR, BUF_LEN as u64),
        16,
    );
    let layer = response.u64_at(0);

    let scaling = |mode: u32| cmif::Request::new(2101).push(&mode).push(&0u32).push(&layer);
    assert_eq!(vi.display_result(scaling(4)), RESULT_SUCCESS);
    assert_eq!(vi.display_result(scaling(1)), ERR_VI_UNSUPPORTED);
    assert_eq!(vi.display_result(scaling(9)), ERR_VI_OPERATION_FAILED);

    let session = vi.display_service;
    let reply = vi.call_as(
        ProcessId::new(0xA1),
        session,
        cmif::Request::new(2021).push(&layer),
    );
    assert_eq!(cmif::response_result(&reply, false).unwrap(), ERR_VI_PERMISSION_DENIED);

    assert_eq!(vi.display_result(cmif::Request::new(2021).push(&layer)), RESULT_SUCCESS);
    assert_eq!(vi.nv_flinger.read().layer_count(), 0);
    assert_eq!(vi.display_result(cmif::Request::new(2031).push(&layer)), ERR_VI_NOT_FOUND);
}

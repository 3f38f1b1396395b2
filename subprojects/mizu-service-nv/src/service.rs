//! `INvDrvServices` on `nvdrv`, `nvdrv:a` and `nvdrv:s`.

use mizu_result::{RESULT_SUCCESS, Result, ToResultCode};
use mizu_servctl::ProcessId;
use mizu_service::{FunctionInfo, RequestContext, ServiceCore, ServiceFramework};
use mizu_sync::Shared;

use crate::{
    gpu::{Gpu, GpuTable},
    proto::nv_cmds,
    types::{Fd, NvResult, nv_ioc_dir, nv_ioc_size},
};

/// NV driver front end. Each session pins the GPU of its process.
pub struct INvDrvServices {
    core: ServiceCore,
    gpus: Shared<GpuTable>,
}

impl INvDrvServices {
    pub fn new(name: &str, gpus: Shared<GpuTable>) -> Self {
        Self {
            core: ServiceCore::new(name),
            gpus,
        }
    }

    fn gpu(&self, pid: ProcessId) -> Option<Shared<Gpu>> {
        let gpu = self.gpus.read().gpu(pid);
        if gpu.is_none() {
            log::error!(target: "Service_NVDRV", "critical: no gpu for {pid}");
        }
        gpu
    }

    fn push_status(ctx: &mut RequestContext<'_>, status: NvResult) {
        ctx.response(3, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(status.to_raw());
    }

    fn open(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let raw = ctx.read_buffer(0)?;
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let path = String::from_utf8_lossy(&raw[..len]).into_owned();

        let (fd, status) = match self.gpu(ctx.pid()) {
            None => (0, NvResult::NotInitialized),
            Some(gpu) => match gpu.write().open(&path) {
                Some(fd) => {
                    log::debug!(target: "Service_NVDRV", "opened {path} as {fd}");
                    (fd.to_raw(), NvResult::Success)
                }
                None => {
                    log::warn!(target: "Service_NVDRV", "unknown device {path:?}");
                    (0, NvResult::FileOperationFailed)
                }
            },
        };
        ctx.response(4, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(fd)
            .push(status.to_raw());
        Ok(())
    }

    fn ioctl(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let fd = Fd::from_raw(ctx.pop::<u32>());
        let request = ctx.pop::<u32>();
        let device = self.gpu(ctx.pid()).and_then(|gpu| gpu.read().device(fd));
        let Some(device) = device else {
            log::warn!(target: "Service_NVDRV", "ioctl {request:#010x} on unknown {fd}");
            Self::push_status(ctx, NvResult::BadParameter);
            return Ok(());
        };

        log::warn!(
            target: "Service_NVDRV",
            "unimplemented ioctl {request:#010x} on {device} (dir {}, size {:#x})",
            nv_ioc_dir(request),
            nv_ioc_size(request)
        );
        ctx.report_unimplemented(self.core.name(), Some("Ioctl"));
        Self::push_status(ctx, NvResult::NotImplemented);
        Ok(())
    }

    fn close(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let fd = Fd::from_raw(ctx.pop::<u32>());
        let closed = self
            .gpu(ctx.pid())
            .is_some_and(|gpu| gpu.write().close(fd));
        let status = if closed {
            log::debug!(target: "Service_NVDRV", "closed {fd}");
            NvResult::Success
        } else {
            NvResult::BadParameter
        };
        Self::push_status(ctx, status);
        Ok(())
    }

    fn initialize(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let transfer_memory_size = ctx.pop::<u32>();
        log::debug!(
            target: "Service_NVDRV",
            "initialize from {} with {transfer_memory_size:#x} bytes of transfer memory",
            ctx.pid()
        );
        Self::push_status(ctx, NvResult::Success);
        Ok(())
    }

    fn query_event(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let fd = Fd::from_raw(ctx.pop::<u32>());
        let event_id = ctx.pop::<u32>();
        let Some(gpu) = self.gpu(ctx.pid()) else {
            Self::push_status(ctx, NvResult::NotInitialized);
            return Ok(());
        };

        let mut gpu = gpu.write();
        if gpu.device(fd).is_none() {
            drop(gpu);
            Self::push_status(ctx, NvResult::BadParameter);
            return Ok(());
        }
        let event = gpu.event(event_id).map_err(|err| {
            log::error!(target: "Service_NVDRV", "critical: event {event_id:#x} failed: {err}");
            err.to_result_code()
        })?;
        ctx.response(3, 1, 0)
            .push_result(RESULT_SUCCESS)
            .push_copy_fd(event)
            .push(NvResult::Success.to_raw());
        Ok(())
    }

    fn set_aruid(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let aruid = ctx.pop::<u64>();
        log::debug!(target: "Service_NVDRV", "aruid {aruid:#x} for {}", ctx.pid());
        Self::push_status(ctx, NvResult::Success);
        Ok(())
    }

    fn set_graphics_firmware_memory_margin_enabled(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let enabled = ctx.pop_bool();
        log::debug!(target: "Service_NVDRV", "firmware memory margin enabled = {enabled}");
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::new(nv_cmds::OPEN, Some(Self::open), "Open"),
        FunctionInfo::new(nv_cmds::IOCTL, Some(Self::ioctl), "Ioctl"),
        FunctionInfo::new(nv_cmds::CLOSE, Some(Self::close), "Close"),
        FunctionInfo::new(nv_cmds::INITIALIZE, Some(Self::initialize), "Initialize"),
        FunctionInfo::new(nv_cmds::QUERY_EVENT, Some(Self::query_event), "QueryEvent"),
        FunctionInfo::new(nv_cmds::MAP_SHARED_MEMORY, None, "MapSharedMemory"),
        FunctionInfo::new(nv_cmds::GET_STATUS, None, "GetStatus"),
        FunctionInfo::new(nv_cmds::SET_ARUID_FOR_TEST, None, "SetAruidForTest"),
        FunctionInfo::new(nv_cmds::SET_ARUID, Some(Self::set_aruid), "SetAruid"),
        FunctionInfo::new(nv_cmds::DUMP_GRAPHICS_MEMORY_INFO, None, "DumpGraphicsMemoryInfo"),
        FunctionInfo::new(10, None, "InitializeDevtools"),
        FunctionInfo::new(nv_cmds::IOCTL2, None, "Ioctl2"),
        FunctionInfo::new(nv_cmds::IOCTL3, None, "Ioctl3"),
        FunctionInfo::new(
            nv_cmds::SET_GRAPHICS_FIRMWARE_MEMORY_MARGIN_ENABLED,
            Some(Self::set_graphics_firmware_memory_margin_enabled),
            "SetGraphicsFirmwareMemoryMarginEnabled",
        ),
    ];
}

impl ServiceFramework for INvDrvServices {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }

    fn setup_session(&self, pid: ProcessId) {
        self.gpus.write().grab(pid);
    }

    fn cleanup_session(&self, pid: ProcessId) {
        self.gpus.write().put(pid);
    }
}

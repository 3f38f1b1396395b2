//! `IApplicationDisplayService`.

use std::sync::Arc;

use mizu_result::{RESULT_SUCCESS, Result};
use mizu_service::{FunctionInfo, RequestContext, ServiceCore, ServiceFramework};
use mizu_sync::Shared;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    cmif::binder::IHOSBinderDriver,
    nvflinger::{NvFlinger, NvFlingerError},
    parcel::Parcel,
    proto::{
        ERR_VI_NOT_FOUND, ERR_VI_OPERATION_FAILED, ERR_VI_PERMISSION_DENIED, ERR_VI_UNSUPPORTED,
        SERVICE_NAME_DISPDRV, application_cmds as cmds,
    },
    types::{BinderObjectId, DisplayId, DisplayName, LayerId, ScalingMode},
};

/// Flattened native window handed to the guest by `OpenLayer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct NativeWindow {
    pub magic: u32,
    pub process_id: u32,
    pub binder_id: i32,
    pub _pad: [u32; 3],
    pub dispdrv: [u8; 8],
    pub _pad2: [u32; 2],
}

static_assertions::const_assert_eq!(size_of::<NativeWindow>(), 0x28);

impl NativeWindow {
    const MAGIC: u32 = 2;

    pub fn new(binder_id: BinderObjectId) -> Self {
        let mut dispdrv = [0; 8];
        dispdrv[..SERVICE_NAME_DISPDRV.len()].copy_from_slice(SERVICE_NAME_DISPDRV.as_bytes());
        Self {
            magic: Self::MAGIC,
            process_id: 1,
            binder_id: binder_id.to_raw(),
            _pad: [0; 3],
            dispdrv,
            _pad2: [0; 2],
        }
    }

    /// Serialized parcel carrying this window.
    pub fn to_parcel(&self) -> Vec<u8> {
        let mut parcel = Parcel::new();
        parcel.write_flattened(self);
        parcel.serialize()
    }
}

fn layer_error(err: NvFlingerError) -> mizu_result::ResultCode {
    log::warn!(target: "Service_VI", "{err}");
    match err {
        NvFlingerError::DisplayNotFound(_) | NvFlingerError::LayerNotFound(_) => ERR_VI_NOT_FOUND,
        NvFlingerError::Servctl(_) => ERR_VI_OPERATION_FAILED,
    }
}

/// Display and layer management for applications.
pub struct IApplicationDisplayService {
    core: ServiceCore,
    nv_flinger: Shared<NvFlinger>,
}

impl IApplicationDisplayService {
    pub fn new(nv_flinger: Shared<NvFlinger>) -> Self {
        Self {
            core: ServiceCore::new("IApplicationDisplayService"),
            nv_flinger,
        }
    }

    fn get_relay_service(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        ctx.response(2, 0, 1)
            .push_result(RESULT_SUCCESS)
            .push_ipc_interface(Arc::new(IHOSBinderDriver::new(
                "IHOSBinderDriverRelay",
                self.nv_flinger.clone(),
            )));
        Ok(())
    }

    fn open_display(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let name = ctx.pop::<DisplayName>();
        let id = self.nv_flinger.write().open_display(name.as_str());
        let Some(id) = id else {
            log::warn!(target: "Service_VI", "OpenDisplay({:?}): no such display", name.as_str());
            return Err(ERR_VI_NOT_FOUND);
        };
        ctx.response(4, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(id.to_raw());
        Ok(())
    }

    fn close_display(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let id = DisplayId::new(ctx.pop::<u64>());
        if !self.nv_flinger.write().close_display(id) {
            log::warn!(target: "Service_VI", "CloseDisplay({id}): not open");
            return Err(ERR_VI_NOT_FOUND);
        }
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn get_display_resolution(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let id = DisplayId::new(ctx.pop::<u64>());
        let resolution = self.nv_flinger.read().display_resolution(id);
        let (width, height) = resolution.ok_or(ERR_VI_NOT_FOUND)?;
        ctx.response(6, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(u64::from(width))
            .push(u64::from(height));
        Ok(())
    }

    /// Writes the native window of `layer` to output buffer 0.
    fn write_native_window(
        &self,
        ctx: &mut RequestContext<'_>,
        layer: LayerId,
    ) -> Result<usize> {
        let binder_id = self
            .nv_flinger
            .read()
            .layer(layer)
            .map(|layer| layer.buffer_queue().id());
        let binder_id = binder_id.ok_or_else(|| {
            log::warn!(target: "Service_VI", "{layer} does not exist");
            ERR_VI_NOT_FOUND
        })?;
        let parcel = NativeWindow::new(binder_id).to_parcel();
        ctx.write_buffer(0, &parcel)
    }

    fn open_layer(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let display = ctx.pop::<DisplayName>();
        let layer = LayerId::new(ctx.pop::<u64>());
        let aruid = ctx.pop::<u64>();
        log::debug!(target: "Service_VI", "OpenLayer({:?}, {layer}, aruid={aruid:#x})", display.as_str());

        let size = self.write_native_window(ctx, layer)?;
        ctx.response(4, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(size as u64);
        Ok(())
    }

    fn close_layer(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let layer = LayerId::new(ctx.pop::<u64>());
        let mut nv_flinger = self.nv_flinger.write();
        let owner = nv_flinger.layer(layer).map(|layer| layer.owner());
        match owner {
            None => return Err(ERR_VI_NOT_FOUND),
            Some(owner) if owner != ctx.pid() => {
                log::warn!(target: "Service_VI", "CloseLayer({layer}) from {} owned by {owner}", ctx.pid());
                return Err(ERR_VI_PERMISSION_DENIED);
            }
            Some(_) => nv_flinger.destroy_layer(layer).map_err(layer_error)?,
        }
        drop(nv_flinger);
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn create_stray_layer(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let flags = ctx.pop::<u32>();
        ctx.skip(1);
        let display = DisplayId::new(ctx.pop::<u64>());
        log::debug!(target: "Service_VI", "CreateStrayLayer({display}, flags={flags:#x})");

        let layer = self
            .nv_flinger
            .write()
            .create_layer(display, ctx.pid())
            .map_err(layer_error)?;
        let size = self.write_native_window(ctx, layer)?;
        ctx.response(6, 0, 0)
            .push_result(RESULT_SUCCESS)
            .push(layer.to_raw())
            .push(size as u64);
        Ok(())
    }

    fn destroy_stray_layer(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let layer = LayerId::new(ctx.pop::<u64>());
        self.nv_flinger
            .write()
            .destroy_layer(layer)
            .map_err(layer_error)?;
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn set_layer_scaling_mode(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let mode = ctx.pop_enum::<ScalingMode>();
        ctx.skip(1);
        let layer = LayerId::new(ctx.pop::<u64>());
        let mode = mode.ok_or(ERR_VI_OPERATION_FAILED)?;
        if !matches!(mode, ScalingMode::ScaleToLayer | ScalingMode::PreserveAspectRatio) {
            log::warn!(target: "Service_VI", "unsupported scaling mode {mode:?} on {layer}");
            return Err(ERR_VI_UNSUPPORTED);
        }
        self.nv_flinger
            .write()
            .set_layer_scaling_mode(layer, mode)
            .map_err(layer_error)?;
        ctx.response(2, 0, 0).push_result(RESULT_SUCCESS);
        Ok(())
    }

    fn get_display_vsync_event(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let id = DisplayId::new(ctx.pop::<u64>());
        let nv_flinger = self.nv_flinger.read();
        let event = nv_flinger.vsync_event(id).ok_or(ERR_VI_NOT_FOUND)?;
        ctx.response(2, 1, 0)
            .push_result(RESULT_SUCCESS)
            .push_copy_fd(event);
        Ok(())
    }

    const HANDLERS: &'static [FunctionInfo<Self>] = &[
        FunctionInfo::new(cmds::GET_RELAY_SERVICE, Some(Self::get_relay_service), "GetRelayService"),
        FunctionInfo::new(cmds::GET_SYSTEM_DISPLAY_SERVICE, None, "GetSystemDisplayService"),
        FunctionInfo::new(cmds::GET_MANAGER_DISPLAY_SERVICE, None, "GetManagerDisplayService"),
        FunctionInfo::new(
            cmds::GET_INDIRECT_DISPLAY_TRANSACTION_SERVICE,
            None,
            "GetIndirectDisplayTransactionService",
        ),
        FunctionInfo::new(cmds::LIST_DISPLAYS, None, "ListDisplays"),
        FunctionInfo::new(cmds::OPEN_DISPLAY, Some(Self::open_display), "OpenDisplay"),
        FunctionInfo::new(cmds::CLOSE_DISPLAY, Some(Self::close_display), "CloseDisplay"),
        FunctionInfo::new(
            cmds::GET_DISPLAY_RESOLUTION,
            Some(Self::get_display_resolution),
            "GetDisplayResolution",
        ),
        FunctionInfo::new(cmds::OPEN_LAYER, Some(Self::open_layer), "OpenLayer"),
        FunctionInfo::new(cmds::CLOSE_LAYER, Some(Self::close_layer), "CloseLayer"),
        FunctionInfo::new(cmds::CREATE_STRAY_LAYER, Some(Self::create_stray_layer), "CreateStrayLayer"),
        FunctionInfo::new(cmds::DESTROY_STRAY_LAYER, Some(Self::destroy_stray_layer), "DestroyStrayLayer"),
        FunctionInfo::new(
            cmds::SET_LAYER_SCALING_MODE,
            Some(Self::set_layer_scaling_mode),
            "SetLayerScalingMode",
        ),
        FunctionInfo::new(
            cmds::GET_DISPLAY_VSYNC_EVENT,
            Some(Self::get_display_vsync_event),
            "GetDisplayVsyncEvent",
        ),
    ];
}

impl ServiceFramework for IApplicationDisplayService {
    fn core(&self) -> &ServiceCore {
        &self.core
    }

    fn handlers() -> &'static [FunctionInfo<Self>] {
        Self::HANDLERS
    }
}

//! Names, command ids and result codes of the display services.

use mizu_result::{ErrorModule, ResultCode};

pub const SERVICE_NAME_MANAGER: &str = "vi:m";

/// Standalone binder relay, next to the one `vi:m` hands out.
pub const SERVICE_NAME_DISPDRV: &str = "dispdrv";

/// `IManagerRootService`.
pub mod root_cmds {
    pub const GET_DISPLAY_SERVICE_MANAGER: u32 = 2;
    pub const GET_DISPLAY_SERVICE_WITH_PROXY_NAME_EXCHANGE: u32 = 3;
}

/// `IApplicationDisplayService`.
pub mod application_cmds {
    pub const GET_RELAY_SERVICE: u32 = 100;
    pub const GET_SYSTEM_DISPLAY_SERVICE: u32 = 101;
    pub const GET_MANAGER_DISPLAY_SERVICE: u32 = 102;
    pub const GET_INDIRECT_DISPLAY_TRANSACTION_SERVICE: u32 = 103;

    pub const LIST_DISPLAYS: u32 = 1000;
    pub const OPEN_DISPLAY: u32 = 1010;
    pub const CLOSE_DISPLAY: u32 = 1020;

    pub const GET_DISPLAY_RESOLUTION: u32 = 1102;

    pub const OPEN_LAYER: u32 = 2020;
    pub const CLOSE_LAYER: u32 = 2021;
    /// Layers without a managed owner; the caller renders into them directly.
    pub const CREATE_STRAY_LAYER: u32 = 2030;
    pub const DESTROY_STRAY_LAYER: u32 = 2031;

    pub const SET_LAYER_SCALING_MODE: u32 = 2101;

    pub const GET_DISPLAY_VSYNC_EVENT: u32 = 5202;
}

/// `IHOSBinderDriver`.
pub mod binder_cmds {
    pub const TRANSACT_PARCEL: u32 = 0;
    pub const ADJUST_REFCOUNT: u32 = 1;
    pub const GET_NATIVE_HANDLE: u32 = 2;
    /// Same as `TRANSACT_PARCEL`, with auto-select buffers.
    pub const TRANSACT_PARCEL_AUTO: u32 = 3;
}

/// Resolution every display reports.
pub const DISPLAY_WIDTH: u32 = 1280;
pub const DISPLAY_HEIGHT: u32 = 720;

pub const ERR_VI_OPERATION_FAILED: ResultCode = ResultCode::new(ErrorModule::Display, 1);

pub const ERR_VI_PERMISSION_DENIED: ResultCode = ResultCode::new(ErrorModule::Display, 5);

pub const ERR_VI_UNSUPPORTED: ResultCode = ResultCode::new(ErrorModule::Display, 6);

pub const ERR_VI_NOT_FOUND: ResultCode = ResultCode::new(ErrorModule::Display, 7);

//! NV service protocol constants.

pub const SERVICE_NAME_APPLICATION: &str = "nvdrv";

pub const SERVICE_NAME_APPLET: &str = "nvdrv:a";

pub const SERVICE_NAME_SYSTEM: &str = "nvdrv:s";

pub mod nv_cmds {
    pub const OPEN: u32 = 0;

    pub const IOCTL: u32 = 1;

    pub const CLOSE: u32 = 2;

    pub const INITIALIZE: u32 = 3;

    pub const QUERY_EVENT: u32 = 4;

    pub const MAP_SHARED_MEMORY: u32 = 5;

    pub const GET_STATUS: u32 = 6;

    pub const SET_ARUID_FOR_TEST: u32 = 7;

    /// Set the applet resource user id.
    pub const SET_ARUID: u32 = 8;

    pub const DUMP_GRAPHICS_MEMORY_INFO: u32 = 9;

    /// Ioctl with extra input buffer.
    pub const IOCTL2: u32 = 11;

    /// Ioctl with extra output buffer.
    pub const IOCTL3: u32 = 12;

    pub const SET_GRAPHICS_FIRMWARE_MEMORY_MARGIN_ENABLED: u32 = 13;
}

/// Device nodes `Open` accepts.
pub const DEVICE_PATHS: &[&str] = &[
    "/dev/nvhost-ctrl",
    "/dev/nvhost-ctrl-gpu",
    "/dev/nvmap",
    "/dev/nvhost-gpu",
    "/dev/nvhost-as-gpu",
    "/dev/nvdisp_disp0",
    "/dev/nvhost-nvdec",
    "/dev/nvhost-nvjpg",
    "/dev/nvhost-vic",
];

/// Number of host1x syncpoints tracked per guest.
pub const MAX_SYNCPOINTS: usize = 192;

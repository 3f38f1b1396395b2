//! NV driver service (`nvdrv`, `nvdrv:a`, `nvdrv:s`).
//!
//! Every open session holds a reference on the [`Gpu`] of its process in
//! the shared [`GpuTable`]. Device ioctls are not emulated and are reported
//! as unimplemented.

mod gpu;
mod proto;
mod service;
mod types;

pub use self::{
    gpu::{Gpu, GpuTable},
    proto::{
        DEVICE_PATHS, MAX_SYNCPOINTS, SERVICE_NAME_APPLET, SERVICE_NAME_APPLICATION,
        SERVICE_NAME_SYSTEM, nv_cmds,
    },
    service::INvDrvServices,
    types::{Fd, NvResult, nv_ioc_dir, nv_ioc_group, nv_ioc_size},
};

//! VI (Visual Interface) service.
//!
//! - `vi:m` hands out [`IApplicationDisplayService`], which opens displays
//!   and creates layers on the shared [`NvFlinger`].
//! - Every layer owns a [`BufferQueue`]. Guests drive it with binder
//!   transactions through [`IHOSBinderDriver`] (`dispdrv` or the relay).
//! - [`NvFlinger::compose`] runs once per vsync: it acquires and releases
//!   the oldest queued frame of each layer and signals the display vsync events.

pub mod binder;
pub mod buffer_queue;
mod cmif;
mod nvflinger;
pub mod parcel;
mod proto;
pub mod types;

pub use self::{
    binder::{BinderStatus, PRODUCER_INTERFACE, QueueBufferInput, QueueBufferOutput, TransactionCode},
    buffer_queue::{BUFFER_SLOTS, Buffer, BufferQueue, BufferQueueError, BufferStatus},
    cmif::{
        application::{IApplicationDisplayService, NativeWindow},
        binder::IHOSBinderDriver,
        root::IManagerRootService,
    },
    nvflinger::{DISPLAY_NAMES, Display, Layer, NvFlinger, NvFlingerError},
    parcel::{PARCEL_MAX_PAYLOAD, Parcel, ParcelError, ParcelHeader},
    proto::{
        DISPLAY_HEIGHT, DISPLAY_WIDTH, ERR_VI_NOT_FOUND, ERR_VI_OPERATION_FAILED,
        ERR_VI_PERMISSION_DENIED, ERR_VI_UNSUPPORTED, SERVICE_NAME_DISPDRV, SERVICE_NAME_MANAGER,
        application_cmds, binder_cmds, root_cmds,
    },
    types::{
        BinderObjectId, BufferTransformFlags, DisplayId, DisplayName, Fence, IgbpBuffer, LayerId,
        MultiFence, PIXEL_FORMAT_RGBA8888, QueryType, Rect, ScalingMode,
    },
};

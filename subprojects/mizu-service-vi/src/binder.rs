//! `IGraphicBufferProducer` transactions.
//!
//! Each transaction parcel starts with an interface token, followed by the
//! transaction arguments. Replies end with an Android status code.

use mizu_service::{WireEnum, wire_enum};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    buffer_queue::{BufferQueue, BufferQueueError},
    parcel::{Parcel, ParcelError},
    types::{BufferTransformFlags, IgbpBuffer, MultiFence, QueryType, Rect},
};

/// Interface token expected on every producer transaction.
pub const PRODUCER_INTERFACE: &str = "android.gui.IGraphicBufferProducer";

wire_enum! {
    /// Producer transaction codes.
    pub enum TransactionCode {
        RequestBuffer = 1,
        SetBufferCount = 2,
        DequeueBuffer = 3,
        DetachBuffer = 4,
        DetachNextBuffer = 5,
        AttachBuffer = 6,
        QueueBuffer = 7,
        CancelBuffer = 8,
        Query = 9,
        Connect = 10,
        Disconnect = 11,
        AllocateBuffers = 13,
        SetPreallocatedBuffer = 14,
    }
}

/// Android status codes written at the end of every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum BinderStatus {
    NoError = 0,
    WouldBlock = -11,
    NoMemory = -12,
    NoInit = -19,
    BadValue = -22,
    InvalidOperation = -38,
    UnknownTransaction = -74,
}

impl BinderStatus {
    #[inline]
    pub const fn to_code(self) -> i32 {
        self as i32
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::NoError,
            -11 => Self::WouldBlock,
            -12 => Self::NoMemory,
            -19 => Self::NoInit,
            -22 => Self::BadValue,
            -38 => Self::InvalidOperation,
            -74 => Self::UnknownTransaction,
            _ => return None,
        })
    }
}

impl From<BufferQueueError> for BinderStatus {
    fn from(err: BufferQueueError) -> Self {
        log::warn!(target: "BufferQueue", "{err}");
        Self::BadValue
    }
}

/// Flattened `QueueBuffer` arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct QueueBufferInput {
    /// Timestamp split in two words, low first.
    pub timestamp: [u32; 2],
    pub is_auto_timestamp: i32,
    pub crop: Rect,
    pub scaling_mode: i32,
    pub transform: u32,
    pub sticky_transform: u32,
    pub _pad: u32,
    pub swap_interval: u32,
    pub multi_fence: MultiFence,
}

static_assertions::const_assert_eq!(size_of::<QueueBufferInput>(), 0x54);

impl QueueBufferInput {
    pub fn timestamp(&self) -> i64 {
        (u64::from(self.timestamp[1]) << 32 | u64::from(self.timestamp[0])) as i64
    }
}

/// Reply of `QueueBuffer` and `Connect`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct QueueBufferOutput {
    pub width: u32,
    pub height: u32,
    pub transform_hint: u32,
    pub num_pending_buffers: u32,
}

impl QueueBufferOutput {
    fn display() -> Self {
        Self {
            width: crate::proto::DISPLAY_WIDTH,
            height: crate::proto::DISPLAY_HEIGHT,
            transform_hint: 0,
            num_pending_buffers: 0,
        }
    }
}

/// Runs transaction `code` against `queue` and returns the serialized reply.
///
/// A producer-side failure is reported through the reply status. Only a
/// malformed input parcel fails the whole transaction.
pub fn transact(queue: &BufferQueue, code: u32, input: &[u8]) -> Result<Vec<u8>, ParcelError> {
    let mut parcel = Parcel::from_transaction(input)?;
    let mut reply = Parcel::new();

    let Some(code) = TransactionCode::from_wire(code) else {
        log::error!(target: "BufferQueue", "unknown transaction {code}");
        reply.write_i32(BinderStatus::UnknownTransaction.to_code());
        return Ok(reply.serialize());
    };

    let interface = parcel.read_interface_token()?;
    if interface != PRODUCER_INTERFACE {
        log::warn!(target: "BufferQueue", "{code:?} on unexpected interface {interface:?}");
    }
    log::trace!(target: "BufferQueue", "{}: {code:?}", queue.id());

    let status = match code {
        TransactionCode::RequestBuffer => request_buffer(queue, &mut parcel, &mut reply)?,
        TransactionCode::SetBufferCount => {
            let count = parcel.read_i32()?;
            log::debug!(target: "BufferQueue", "SetBufferCount({count})");
            BinderStatus::NoError
        }
        TransactionCode::DequeueBuffer => dequeue_buffer(queue, &mut parcel, &mut reply)?,
        TransactionCode::QueueBuffer => queue_buffer(queue, &mut parcel, &mut reply)?,
        TransactionCode::CancelBuffer => {
            let slot = parcel.read_i32()?;
            let fence = parcel.read_flattened::<MultiFence>()?;
            status_of(queue.cancel_buffer(slot as u32, fence))
        }
        TransactionCode::Query => {
            let what = parcel.read_i32()?;
            let value = QueryType::from_wire(what as u32)
                .ok_or(BinderStatus::BadValue)
                .and_then(|what| queue.query(what).map_err(BinderStatus::from));
            match value {
                Ok(value) => {
                    reply.write_u32(value);
                    BinderStatus::NoError
                }
                Err(status) => {
                    reply.write_u32(0);
                    status
                }
            }
        }
        TransactionCode::Connect => {
            let _listener = parcel.read_i32()?;
            let api = parcel.read_i32()?;
            let _producer_controlled_by_app = parcel.read_i32()?;
            log::debug!(target: "BufferQueue", "{} connect api {api}", queue.id());
            queue.connect();
            reply.write_raw(&QueueBufferOutput::display());
            BinderStatus::NoError
        }
        TransactionCode::Disconnect => {
            let api = parcel.read_i32()?;
            log::debug!(target: "BufferQueue", "{} disconnect api {api}", queue.id());
            queue.disconnect();
            BinderStatus::NoError
        }
        TransactionCode::SetPreallocatedBuffer => {
            let slot = parcel.read_i32()?;
            let has_buffer = parcel.read_i32()? != 0;
            if has_buffer {
                let raw = parcel.read_flattened_object()?;
                match IgbpBuffer::from_flattened(&raw) {
                    Some(buffer) => status_of(queue.set_preallocated_buffer(slot as u32, buffer)),
                    None => BinderStatus::BadValue,
                }
            } else {
                BinderStatus::NoError
            }
        }
        TransactionCode::DetachBuffer
        | TransactionCode::DetachNextBuffer
        | TransactionCode::AttachBuffer
        | TransactionCode::AllocateBuffers => {
            log::warn!(target: "BufferQueue", "unimplemented transaction {code:?}");
            BinderStatus::InvalidOperation
        }
    };

    reply.write_i32(status.to_code());
    Ok(reply.serialize())
}

fn status_of(result: Result<(), BufferQueueError>) -> BinderStatus {
    match result {
        Ok(()) => BinderStatus::NoError,
        Err(err) => err.into(),
    }
}

fn request_buffer(
    queue: &BufferQueue,
    parcel: &mut Parcel,
    reply: &mut Parcel,
) -> Result<BinderStatus, ParcelError> {
    let slot = parcel.read_i32()?;
    Ok(match queue.request_buffer(slot as u32) {
        Ok(buffer) => {
            reply.write_i32(1);
            reply.write_flattened_object(&buffer.raw);
            BinderStatus::NoError
        }
        Err(err) => {
            reply.write_i32(0);
            err.into()
        }
    })
}

fn dequeue_buffer(
    queue: &BufferQueue,
    parcel: &mut Parcel,
    reply: &mut Parcel,
) -> Result<BinderStatus, ParcelError> {
    let is_async = parcel.read_u32()? != 0;
    let width = parcel.read_u32()?;
    let height = parcel.read_u32()?;
    let _format = parcel.read_u32()?;
    let _usage = parcel.read_u32()?;

    let dequeued = if is_async {
        queue.try_dequeue_buffer(width, height)
    } else {
        queue.dequeue_buffer(width, height)
    };
    Ok(match dequeued {
        Some((slot, fence)) => {
            reply.write_i32(slot as i32);
            reply.write_i32(1);
            reply.write_flattened(&fence);
            BinderStatus::NoError
        }
        None if is_async && queue.is_connected() => {
            reply.write_i32(-1);
            BinderStatus::WouldBlock
        }
        None => {
            reply.write_i32(-1);
            BinderStatus::NoInit
        }
    })
}

fn queue_buffer(
    queue: &BufferQueue,
    parcel: &mut Parcel,
    reply: &mut Parcel,
) -> Result<BinderStatus, ParcelError> {
    let slot = parcel.read_i32()?;
    let input = parcel.read_flattened::<QueueBufferInput>()?;
    let result = queue.queue_buffer(
        slot as u32,
        BufferTransformFlags::from_bits_truncate(input.transform),
        input.crop,
        input.swap_interval,
        input.multi_fence,
    );
    reply.write_raw(&QueueBufferOutput::display());
    Ok(status_of(result))
}

//! CMIF (Command Message Interface Format).
//!
//! CMIF is the command serialization layer built on top of HIPC. Its payload
//! sits 16-byte aligned inside the HIPC data words and starts with a magic
//! header, followed by the 64-bit command id (requests) or result (responses).
//!
//! **Non-Domain Request:**
//! ```text
//! [HIPC Header + Descriptors]
//! [Padding to 16-byte alignment]
//! [DataPayloadHeader: magic="SFCI", version]
//! [command_id, token]
//! [Payload data]
//! ```
//!
//! **Domain Request:**
//! ```text
//! [HIPC Header + Descriptors]
//! [Padding to 16-byte alignment]
//! [DomainInHeader (16 bytes): command, object_id, token]
//! [DataPayloadHeader + command_id + payload]
//! [Object IDs array]
//! ```
//!
//! Domains multiplex several service objects over one session. Each object is
//! named by a 1-based [`ObjectId`]; the original session object becomes id 1
//! when the session is converted.
//!
//! This module holds the wire structures and a client-side request builder
//! and response parser, used to talk to services from tests and tools. The
//! server side lives in [`request`](crate::request) and
//! [`response`](crate::response).

use mizu_result::ResultCode;
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    buffer::{CommandBuffer, align_up_words},
    error::ParseResponseError,
    hipc::{
        self, BufferCMode, BufferDescriptor, BufferMode, RecvListEntry, SpecialHeader,
        StaticDescriptor,
    },
};

/// Magic number for CMIF input headers ("SFCI").
pub const IN_HEADER_MAGIC: u32 = 0x49434653;

/// Magic number for CMIF output headers ("SFCO").
pub const OUT_HEADER_MAGIC: u32 = 0x4F434653;

/// CMIF command type (stored in the HIPC message type field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum CommandType {
    #[default]
    Invalid = 0,
    LegacyRequest = 1,
    Close = 2,
    LegacyControl = 3,
    Request = 4,
    Control = 5,
    RequestWithContext = 6,
    ControlWithContext = 7,
}

impl CommandType {
    /// Decodes a raw message type, if it names a CMIF command type.
    pub const fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::Invalid,
            1 => Self::LegacyRequest,
            2 => Self::Close,
            3 => Self::LegacyControl,
            4 => Self::Request,
            5 => Self::Control,
            6 => Self::RequestWithContext,
            7 => Self::ControlWithContext,
            _ => return None,
        })
    }

    /// Request types carry a domain header on domain sessions.
    pub const fn is_request(self) -> bool {
        matches!(self, Self::Request | Self::RequestWithContext)
    }

    /// Control types are served by the built-in controller.
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Control | Self::ControlWithContext)
    }
}

impl From<CommandType> for hipc::MessageType {
    fn from(cmd: CommandType) -> Self {
        hipc::MessageType::from_raw(cmd as u16)
    }
}

/// Domain command (first byte of the domain header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DomainCommand {
    /// Deliver the message to the addressed object.
    SendMessage = 1,
    /// Close the addressed object.
    CloseVirtualHandle = 2,
}

impl DomainCommand {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::SendMessage),
            2 => Some(Self::CloseVirtualHandle),
            _ => None,
        }
    }
}

/// `SFCI`/`SFCO` header (8 bytes). The 64-bit command id or result follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DataPayloadHeader {
    pub magic: u32,
    pub version: u32,
}

const_assert_eq!(size_of::<DataPayloadHeader>(), 8);

/// Domain input header (16 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DomainInHeader {
    /// Raw [`DomainCommand`].
    pub command: u8,
    /// Number of object ids after the payload.
    pub num_in_objects: u8,
    /// Size of the CMIF header and payload in bytes.
    pub data_size: u16,
    /// Target object id within the domain.
    pub object_id: u32,
    pub _padding: u32,
    /// Context token.
    pub token: u32,
}

const_assert_eq!(size_of::<DomainInHeader>(), 16);

/// Domain output header (16 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DomainOutHeader {
    /// Number of object ids returned.
    pub num_out_objects: u32,
    pub _padding: [u32; 3],
}

const_assert_eq!(size_of::<DomainOutHeader>(), 16);

/// A domain object identifier. Valid ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Returns `None` for zero, which never names an object.
    #[inline]
    pub const fn new(raw: u32) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Zero-based slot index in the domain table.
    #[inline]
    pub const fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// The id of slot `index`.
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }
}

impl core::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Client-side CMIF request.
///
/// Collects descriptors, handles and payload, then lays them out with
/// [`encode`](Self::encode). Addresses are guest virtual addresses.
#[derive(Debug, Clone, Default)]
pub struct Request {
    command_type: CommandType,
    object_id: Option<ObjectId>,
    domain_command: Option<DomainCommand>,
    command_id: u32,
    context: u32,
    data: Vec<u8>,
    send_pid: Option<u64>,
    copy_handles: Vec<u32>,
    move_handles: Vec<u32>,
    send_statics: Vec<StaticDescriptor>,
    send_buffers: Vec<BufferDescriptor>,
    recv_buffers: Vec<BufferDescriptor>,
    exch_buffers: Vec<BufferDescriptor>,
    recv_list: Vec<RecvListEntry>,
    objects: Vec<u32>,
}

impl Request {
    /// A `Request` message for `command_id`.
    pub fn new(command_id: u32) -> Self {
        Self {
            command_type: CommandType::Request,
            command_id,
            ..Default::default()
        }
    }

    /// A `Control` message for `command_id`.
    pub fn control(command_id: u32) -> Self {
        Self {
            command_type: CommandType::Control,
            command_id,
            ..Default::default()
        }
    }

    /// Addresses the request to a domain object.
    pub fn object_id(mut self, id: ObjectId) -> Self {
        self.object_id = Some(id);
        self.domain_command = Some(DomainCommand::SendMessage);
        self
    }

    /// Sets the context token; switches to the `*WithContext` command type.
    pub fn context(mut self, context: u32) -> Self {
        self.context = context;
        self.command_type = match self.command_type {
            CommandType::Request => CommandType::RequestWithContext,
            CommandType::Control => CommandType::ControlWithContext,
            other => other,
        };
        self
    }

    /// Appends raw payload bytes.
    pub fn data(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Appends a plain-data payload value.
    pub fn push<T: IntoBytes + Immutable>(self, value: &T) -> Self {
        self.data(value.as_bytes())
    }

    /// Sends a process id slot.
    pub fn send_pid(mut self, pid: u64) -> Self {
        self.send_pid = Some(pid);
        self
    }

    /// Adds a copy handle.
    pub fn add_handle(mut self, handle: u32) -> Self {
        self.copy_handles.push(handle);
        self
    }

    /// Adds a move handle.
    pub fn add_move_handle(mut self, handle: u32) -> Self {
        self.move_handles.push(handle);
        self
    }

    /// Adds an input pointer descriptor (Type X).
    pub fn add_in_pointer(mut self, address: u64, size: u16) -> Self {
        let index = self.send_statics.len() as u8;
        self.send_statics
            .push(StaticDescriptor::new_send(address, size, index));
        self
    }

    /// Adds a mapped input buffer (Type A).
    pub fn add_in_buffer(mut self, address: u64, size: u64) -> Self {
        self.send_buffers
            .push(BufferDescriptor::new_buffer(address, size, BufferMode::Normal));
        self
    }

    /// Adds a mapped output buffer (Type B).
    pub fn add_out_buffer(mut self, address: u64, size: u64) -> Self {
        self.recv_buffers
            .push(BufferDescriptor::new_buffer(address, size, BufferMode::Normal));
        self
    }

    /// Adds an exchange buffer (Type W).
    pub fn add_inout_buffer(mut self, address: u64, size: u64) -> Self {
        self.exch_buffers
            .push(BufferDescriptor::new_buffer(address, size, BufferMode::Normal));
        self
    }

    /// Adds a fixed-size output pointer (Type C).
    pub fn add_out_fixed_pointer(mut self, address: u64, size: u16) -> Self {
        self.recv_list.push(RecvListEntry::new_recv(address, size));
        self
    }

    /// Adds an input domain object id.
    pub fn add_object(mut self, id: ObjectId) -> Self {
        self.objects.push(id.to_raw());
        self
    }

    /// Writes the request into `buf`, replacing its contents.
    pub fn encode(&self, buf: &mut CommandBuffer) {
        buf.clear();

        // 16 bytes of alignment slack, optional domain header, payload header,
        // command id and data.
        let payload_bytes = size_of::<DataPayloadHeader>() + 8 + self.data.len();
        let mut data_bytes = 16 + payload_bytes;
        if self.object_id.is_some() {
            data_bytes += size_of::<DomainInHeader>() + self.objects.len() * 4;
        }
        let num_data_words = data_bytes.div_ceil(4);

        let recv_static_mode = match self.recv_list.len() {
            0 => BufferCMode::Disabled,
            n => BufferCMode::Descriptors(n as u8),
        };
        let has_special = self.send_pid.is_some()
            || !self.copy_handles.is_empty()
            || !self.move_handles.is_empty();

        let header = hipc::Header::new()
            .with_message_type(self.command_type as u16)
            .with_num_send_statics(self.send_statics.len() as u8)
            .with_num_send_buffers(self.send_buffers.len() as u8)
            .with_num_recv_buffers(self.recv_buffers.len() as u8)
            .with_num_exch_buffers(self.exch_buffers.len() as u8)
            .with_num_data_words(num_data_words as u16)
            .with_recv_static_mode(recv_static_mode.to_raw())
            .with_has_special_header(has_special);

        let mut w = buf.writer(0);
        header.push(&mut w);
        write_special(&mut w, self.send_pid, &self.copy_handles, &self.move_handles);
        for desc in &self.send_statics {
            desc.push(&mut w);
        }
        for desc in self
            .send_buffers
            .iter()
            .chain(&self.recv_buffers)
            .chain(&self.exch_buffers)
        {
            desc.push(&mut w);
        }

        let data_start = w.index();
        w.align_with_padding();

        if let Some(object_id) = self.object_id {
            w.push_raw(&DomainInHeader {
                command: self
                    .domain_command
                    .unwrap_or(DomainCommand::SendMessage) as u8,
                num_in_objects: self.objects.len() as u8,
                data_size: payload_bytes as u16,
                object_id: object_id.to_raw(),
                _padding: 0,
                token: self.context,
            });
        }

        w.push_raw(&DataPayloadHeader {
            magic: IN_HEADER_MAGIC,
            version: u32::from(self.context != 0),
        });
        w.push_u32(self.command_id);
        w.push_u32(if self.object_id.is_some() { 0 } else { self.context });
        w.push_bytes(&self.data);
        for &object in &self.objects {
            w.push_u32(object);
        }

        w.set_index(data_start + num_data_words);
        for desc in &self.recv_list {
            desc.push(&mut w);
        }
    }
}

fn write_special(
    w: &mut crate::buffer::WordWriter<'_>,
    pid: Option<u64>,
    copy_handles: &[u32],
    move_handles: &[u32],
) {
    if pid.is_none() && copy_handles.is_empty() && move_handles.is_empty() {
        return;
    }
    SpecialHeader::new()
        .with_send_pid(pid.is_some())
        .with_num_copy_handles(copy_handles.len() as u8)
        .with_num_move_handles(move_handles.len() as u8)
        .push(w);
    if let Some(pid) = pid {
        w.push_u64(pid);
    }
    for &handle in copy_handles.iter().chain(move_handles) {
        w.push_u32(handle);
    }
}

/// Builds a session close message.
pub fn make_close_request(buf: &mut CommandBuffer) {
    buf.clear();
    hipc::Header::new()
        .with_message_type(CommandType::Close as u16)
        .push(&mut buf.writer(0));
}

/// Builds a `CloseVirtualHandle` message for a domain object.
pub fn make_domain_close_request(buf: &mut CommandBuffer, object_id: ObjectId) {
    buf.clear();
    let num_data_words = (16 + size_of::<DomainInHeader>()) / 4;
    let mut w = buf.writer(0);
    hipc::Header::new()
        .with_message_type(CommandType::Request as u16)
        .with_num_data_words(num_data_words as u16)
        .push(&mut w);
    w.align_with_padding();
    w.push_raw(&DomainInHeader {
        command: DomainCommand::CloseVirtualHandle as u8,
        object_id: object_id.to_raw(),
        ..Default::default()
    });
}

/// Client-side view of a CMIF response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Payload words after the result.
    pub data: Vec<u32>,
    /// Returned domain object ids.
    pub objects: Vec<u32>,
    /// Returned copy handles.
    pub copy_handles: Vec<u32>,
    /// Returned move handles.
    pub move_handles: Vec<u32>,
}

impl Response {
    /// Returns payload word `index`, or zero.
    pub fn word(&self, index: usize) -> u32 {
        self.data.get(index).copied().unwrap_or(0)
    }

    /// Returns the 64-bit payload value at word `index`.
    pub fn u64_at(&self, index: usize) -> u64 {
        self.word(index) as u64 | ((self.word(index + 1) as u64) << 32)
    }
}

/// Parses a CMIF response carrying `size` payload bytes after the result.
///
/// A non-success result is returned as [`ParseResponseError::ServiceError`].
pub fn parse_response(
    buf: &CommandBuffer,
    is_domain: bool,
    size: usize,
) -> Result<Response, ParseResponseError> {
    let mut r = buf.reader(0);
    let header = hipc::Header::pop(&mut r);

    let (copy_handles, move_handles) = if header.has_special_header() {
        let special = SpecialHeader::pop(&mut r);
        if special.send_pid() {
            r.skip(2);
        }
        let copy: Vec<u32> = (0..special.num_copy_handles())
            .map(|_| r.pop_u32())
            .collect();
        let moves: Vec<u32> = (0..special.num_move_handles())
            .map(|_| r.pop_u32())
            .collect();
        (copy, moves)
    } else {
        (Vec::new(), Vec::new())
    };
    r.skip(header.num_send_statics() as usize * StaticDescriptor::WORDS);
    r.set_index(align_up_words(r.index()));

    let num_objects = if is_domain {
        r.pop_raw::<DomainOutHeader>().num_out_objects as usize
    } else {
        0
    };

    let payload = r.pop_raw::<DataPayloadHeader>();
    if payload.magic != OUT_HEADER_MAGIC {
        return Err(ParseResponseError::InvalidMagic);
    }
    let result = ResultCode::from_raw(r.pop_u32());
    r.skip(1);
    if result.is_error() {
        return Err(ParseResponseError::ServiceError(result));
    }

    let data_words = size.div_ceil(4);
    let data = (0..data_words).map(|_| r.pop_u32()).collect();
    let objects = (0..num_objects).map(|_| r.pop_u32()).collect();

    Ok(Response {
        data,
        objects,
        copy_handles,
        move_handles,
    })
}

/// Returns the result code of a CMIF response without validating the rest.
pub fn response_result(buf: &CommandBuffer, is_domain: bool) -> Result<ResultCode, ParseResponseError> {
    match parse_response(buf, is_domain, 0) {
        Ok(_) => Ok(ResultCode::from_raw(0)),
        Err(ParseResponseError::ServiceError(code)) => Ok(code),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::CommandBuffer;

    #[test]
    fn test_request_payload_is_aligned() {
        let mut buf = CommandBuffer::new();
        Request::new(7)
            .push(&0x1122_3344u32)
            .add_handle(0x55)
            .encode(&mut buf);

        // Header (2) + special (1) + handle (1) puts the payload at word 4.
        assert_eq!(buf.word(4), IN_HEADER_MAGIC);
        assert_eq!(buf.word(6), 7);
        assert_eq!(buf.word(8), 0x1122_3344);
    }

    #[test]
    fn test_domain_request_header() {
        let mut buf = CommandBuffer::new();
        Request::new(3)
            .object_id(ObjectId::new(2).unwrap())
            .encode(&mut buf);
        let header = hipc::Header::pop(&mut buf.reader(0));
        assert_eq!(header.message_type(), CommandType::Request as u16);

        let domain = buf.reader(4).pop_raw::<DomainInHeader>();
        assert_eq!(domain.command, DomainCommand::SendMessage as u8);
        assert_eq!(domain.object_id, 2);
        assert_eq!(buf.word(8), IN_HEADER_MAGIC);
    }

    #[test]
    fn test_context_switches_command_type() {
        let mut buf = CommandBuffer::new();
        Request::control(3).context(1).encode(&mut buf);
        assert_eq!(buf.word(0) & 0xFFFF, CommandType::ControlWithContext as u32);
    }

    #[test]
    fn test_parse_response_rejects_bad_magic() {
        let buf = CommandBuffer::new();
        assert!(matches!(
            parse_response(&buf, false, 0),
            Err(ParseResponseError::InvalidMagic)
        ));
    }

    #[test]
    fn test_object_id_rejects_zero() {
        assert!(ObjectId::new(0).is_none());
        let id = ObjectId::from_index(1);
        assert_eq!(id.to_raw(), 2);
        assert_eq!(id.index(), 1);
    }
}

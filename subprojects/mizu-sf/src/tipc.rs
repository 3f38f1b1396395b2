//! TIPC (Tiny IPC).
//!
//! TIPC stores the command id directly in the HIPC message type as `id + 16`
//! and carries neither a magic header nor domain support.
//!
//! | Aspect              | CMIF                     | TIPC                      |
//! |---------------------|--------------------------|---------------------------|
//! | Command ID          | In CMIF header           | HIPC message type (ID+16) |
//! | Domain support      | Yes                      | No                        |
//! | Magic headers       | SFCI/SFCO                | None                      |
//! | Close command       | Type=2                   | Type=15                   |
//! | Result code         | After the SFCO header    | First u32 of data words   |
//! | Object passing      | Domain object IDs        | Move handles              |
//!
//! **Request:**
//! ```text
//! [HIPC Header (type = command_id + 16)]
//! [HIPC Descriptors (buffers, handles)]
//! [Data Words (raw payload)]
//! ```
//!
//! **Response:**
//! ```text
//! [HIPC Header (type echoed)]
//! [HIPC Descriptors (handles)]
//! [Result Code (u32)]
//! [Response Payload]
//! ```

use mizu_result::ResultCode;
use zerocopy::{Immutable, IntoBytes};

use crate::{
    buffer::CommandBuffer,
    error::ParseResponseError,
    hipc::{self, BufferDescriptor, BufferMode, MessageType, SpecialHeader},
};

/// Message type of a TIPC session close.
pub const CLOSE_MESSAGE_TYPE: u16 = 15;

/// TIPC command types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    /// Close session (type = 15).
    Close,
    /// Command `id` (type = `id + 16`).
    Request(u32),
}

impl CommandType {
    /// Decodes a raw message type, if it is in the TIPC range.
    pub const fn from_message_type(ty: MessageType) -> Option<Self> {
        match ty.to_raw() {
            CLOSE_MESSAGE_TYPE => Some(Self::Close),
            raw if raw >= MessageType::TIPC_COMMAND_REGION => {
                Some(Self::Request((raw - MessageType::TIPC_COMMAND_REGION) as u32))
            }
            _ => None,
        }
    }

    /// Creates a request message type from a command id.
    #[inline]
    pub const fn request(id: u32) -> MessageType {
        MessageType::from_raw((id + MessageType::TIPC_COMMAND_REGION as u32) as u16)
    }
}

impl From<CommandType> for MessageType {
    fn from(cmd: CommandType) -> Self {
        match cmd {
            CommandType::Close => MessageType::from_raw(CLOSE_MESSAGE_TYPE),
            CommandType::Request(id) => CommandType::request(id),
        }
    }
}

/// Client-side TIPC request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    request_id: u32,
    data: Vec<u8>,
    send_pid: Option<u64>,
    copy_handles: Vec<u32>,
    send_buffers: Vec<BufferDescriptor>,
    recv_buffers: Vec<BufferDescriptor>,
    exch_buffers: Vec<BufferDescriptor>,
}

impl Request {
    pub fn new(request_id: u32) -> Self {
        Self {
            request_id,
            ..Default::default()
        }
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

    pub fn send_pid(mut self, pid: u64) -> Self {
        self.send_pid = Some(pid);
        self
    }

    /// Adds a copy handle to the request.
    pub fn add_handle(mut self, handle: u32) -> Self {
        self.copy_handles.push(handle);
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

    /// Writes the request into `buf`, replacing its contents.
    pub fn encode(&self, buf: &mut CommandBuffer) {
        buf.clear();
        let has_special = self.send_pid.is_some() || !self.copy_handles.is_empty();
        let header = hipc::Header::new()
            .with_message_type(CommandType::request(self.request_id).to_raw())
            .with_num_send_buffers(self.send_buffers.len() as u8)
            .with_num_recv_buffers(self.recv_buffers.len() as u8)
            .with_num_exch_buffers(self.exch_buffers.len() as u8)
            .with_num_data_words(self.data.len().div_ceil(4) as u16)
            .with_has_special_header(has_special);

        let mut w = buf.writer(0);
        header.push(&mut w);
        if has_special {
            SpecialHeader::new()
                .with_send_pid(self.send_pid.is_some())
                .with_num_copy_handles(self.copy_handles.len() as u8)
                .push(&mut w);
            if let Some(pid) = self.send_pid {
                w.push_u64(pid);
            }
            for &handle in &self.copy_handles {
                w.push_u32(handle);
            }
        }
        for desc in self
            .send_buffers
            .iter()
            .chain(&self.recv_buffers)
            .chain(&self.exch_buffers)
        {
            desc.push(&mut w);
        }
        w.push_bytes(&self.data);
    }
}

/// Builds a TIPC close message.
pub fn make_close_request(buf: &mut CommandBuffer) {
    buf.clear();
    hipc::Header::new()
        .with_message_type(CLOSE_MESSAGE_TYPE)
        .push(&mut buf.writer(0));
}

/// Client-side view of a TIPC response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Result code (first data word).
    pub result: ResultCode,
    /// Payload words after the result.
    pub data: Vec<u32>,
    /// Returned copy handles.
    pub copy_handles: Vec<u32>,
    /// Returned move handles.
    pub move_handles: Vec<u32>,
}

/// Parses a TIPC response.
///
/// Unlike CMIF, a failing result does not hide the handles: TIPC services
/// still return the (invalid) handle words alongside the error.
pub fn parse_response(buf: &CommandBuffer) -> Result<Response, ParseResponseError> {
    let mut r = buf.reader(0);
    let header = hipc::Header::pop(&mut r);

    let mut response = Response::default();
    if header.has_special_header() {
        let special = SpecialHeader::pop(&mut r);
        if special.send_pid() {
            r.skip(2);
        }
        response.copy_handles = (0..special.num_copy_handles())
            .map(|_| r.pop_u32())
            .collect();
        response.move_handles = (0..special.num_move_handles())
            .map(|_| r.pop_u32())
            .collect();
    }

    let num_data_words = header.num_data_words() as usize;
    if num_data_words == 0 {
        return Err(ParseResponseError::EmptyResponse);
    }
    response.result = ResultCode::from_raw(r.pop_u32());
    response.data = (1..num_data_words).map(|_| r.pop_u32()).collect();
    Ok(response)
}

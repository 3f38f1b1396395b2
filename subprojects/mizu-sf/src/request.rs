//! Server-side decoding of incoming requests.

use crate::{
    buffer::CommandBuffer,
    cmif::{self, DataPayloadHeader, DomainCommand, DomainInHeader, IN_HEADER_MAGIC, ObjectId},
    error::ParseError,
    hipc::{
        BufferCMode, BufferDescriptor, Header, MessageType, RecvListEntry, SpecialHeader,
        StaticDescriptor,
    },
    tipc,
};

/// Protocol-level kind of an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Cmif(cmif::CommandType),
    Tipc(tipc::CommandType),
}

impl CommandKind {
    /// Decodes the header message type.
    pub fn from_message_type(ty: MessageType) -> Result<Self, ParseError> {
        if let Some(cmd) = tipc::CommandType::from_message_type(ty) {
            return Ok(Self::Tipc(cmd));
        }
        cmif::CommandType::from_raw(ty.to_raw())
            .map(Self::Cmif)
            .ok_or(ParseError::UnknownMessageType(ty.to_raw()))
    }

    /// Returns `true` for CMIF close and TIPC close.
    pub const fn is_close(self) -> bool {
        matches!(
            self,
            Self::Cmif(cmif::CommandType::Close) | Self::Tipc(tipc::CommandType::Close)
        )
    }

    pub const fn is_tipc(self) -> bool {
        matches!(self, Self::Tipc(_))
    }

    pub const fn is_control(self) -> bool {
        match self {
            Self::Cmif(ty) => ty.is_control(),
            Self::Tipc(_) => false,
        }
    }
}

/// A decoded incoming request.
///
/// Descriptors and handles are copied out of the command buffer; the word
/// indices refer back into it so the payload can be popped in place.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub header: Header,
    pub kind: CommandKind,
    /// Process id sent by the client, when the pid flag was set.
    pub pid: Option<u64>,
    pub copy_handles: Vec<u32>,
    pub move_handles: Vec<u32>,
    pub buffer_x: Vec<StaticDescriptor>,
    pub buffer_a: Vec<BufferDescriptor>,
    pub buffer_b: Vec<BufferDescriptor>,
    pub buffer_w: Vec<BufferDescriptor>,
    pub buffer_c: Vec<RecvListEntry>,
    pub buffer_c_mode: BufferCMode,
    /// Domain header, when the session is a domain and the type is a request.
    pub domain: Option<DomainInHeader>,
    /// Object ids passed after the domain payload.
    pub domain_objects: Vec<u32>,
    /// Word index just past the payload header (CMIF) or the descriptors (TIPC).
    pub data_payload_offset: usize,
    /// Command id.
    pub command: u32,
    /// Word index of the first parameter.
    pub params_index: usize,
}

impl ParsedRequest {
    #[inline]
    pub fn message_type(&self) -> MessageType {
        MessageType::from_raw(self.header.message_type())
    }

    #[inline]
    pub fn is_tipc(&self) -> bool {
        self.kind.is_tipc()
    }

    #[inline]
    pub fn is_close(&self) -> bool {
        self.kind.is_close()
    }

    /// Domain command, when the request carried a domain header.
    pub fn domain_command(&self) -> Option<DomainCommand> {
        self.domain
            .as_ref()
            .and_then(|domain| DomainCommand::from_raw(domain.command))
    }

    /// Raw target object id, when the request carried a domain header.
    pub fn object_id(&self) -> Option<u32> {
        self.domain.as_ref().map(|domain| domain.object_id)
    }

    /// Target object id as a validated [`ObjectId`].
    pub fn target_object(&self) -> Option<ObjectId> {
        self.object_id().and_then(ObjectId::new)
    }

    fn empty(header: Header, kind: CommandKind, index: usize) -> Self {
        Self {
            header,
            kind,
            pid: None,
            copy_handles: Vec::new(),
            move_handles: Vec::new(),
            buffer_x: Vec::new(),
            buffer_a: Vec::new(),
            buffer_b: Vec::new(),
            buffer_w: Vec::new(),
            buffer_c: Vec::new(),
            buffer_c_mode: BufferCMode::Disabled,
            domain: None,
            domain_objects: Vec::new(),
            data_payload_offset: index,
            command: 0,
            params_index: index,
        }
    }
}

/// Decodes an incoming request.
///
/// `is_domain` tells whether the receiving session has been converted; only
/// then is a domain header expected, and only on request message types.
pub fn parse_request(buf: &CommandBuffer, is_domain: bool) -> Result<ParsedRequest, ParseError> {
    let mut r = buf.reader(0);
    let header = Header::pop(&mut r);
    let kind = CommandKind::from_message_type(MessageType::from_raw(header.message_type()))?;

    let mut req = ParsedRequest::empty(header, kind, r.index());
    if kind.is_close() {
        return Ok(req);
    }

    if header.has_special_header() {
        let special = SpecialHeader::pop(&mut r);
        if special.send_pid() {
            req.pid = Some(r.pop_u64());
        }
        req.copy_handles = (0..special.num_copy_handles())
            .map(|_| r.pop_u32())
            .collect();
        req.move_handles = (0..special.num_move_handles())
            .map(|_| r.pop_u32())
            .collect();
    }

    req.buffer_x = (0..header.num_send_statics())
        .map(|_| StaticDescriptor::pop(&mut r))
        .collect();
    req.buffer_a = (0..header.num_send_buffers())
        .map(|_| BufferDescriptor::pop(&mut r))
        .collect();
    req.buffer_b = (0..header.num_recv_buffers())
        .map(|_| BufferDescriptor::pop(&mut r))
        .collect();
    req.buffer_w = (0..header.num_exch_buffers())
        .map(|_| BufferDescriptor::pop(&mut r))
        .collect();

    let buffer_c_offset = r.index() + header.num_data_words() as usize;

    if let CommandKind::Cmif(ty) = kind {
        r.align();
        if is_domain && ty.is_request() {
            let domain = r.pop_raw::<DomainInHeader>();
            let command = DomainCommand::from_raw(domain.command)
                .ok_or(ParseError::UnknownDomainCommand(domain.command))?;
            req.domain = Some(domain);
            if command == DomainCommand::CloseVirtualHandle {
                req.data_payload_offset = r.index();
                req.params_index = r.index();
                return Ok(req);
            }

            let objects_at = r.index() + (domain.data_size as usize).div_ceil(4);
            let mut objects = buf.reader(objects_at);
            req.domain_objects = (0..domain.num_in_objects)
                .map(|_| objects.pop_u32())
                .collect();
        }

        let payload = r.pop_raw::<DataPayloadHeader>();
        if payload.magic != IN_HEADER_MAGIC {
            return Err(ParseError::InvalidMagic(payload.magic));
        }
    }
    req.data_payload_offset = r.index();

    r.set_index(buffer_c_offset);
    req.buffer_c_mode = BufferCMode::from_raw(header.recv_static_mode());
    req.buffer_c = (0..req.buffer_c_mode.count())
        .map(|_| RecvListEntry::pop(&mut r))
        .collect();

    r.set_index(req.data_payload_offset);
    match kind {
        CommandKind::Tipc(tipc::CommandType::Request(id)) => req.command = id,
        _ => {
            req.command = r.pop_u32();
            // The command is a u64; the high word is the token.
            r.skip(1);
        }
    }
    req.params_index = r.index();

    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cmif::{DomainCommand, Request},
        hipc::BufferMode,
    };

    #[test]
    fn test_parse_plain_request() {
        let mut buf = CommandBuffer::new();
        Request::new(0x1234_5678)
            .push(&0xDEAD_BEEF_CAFE_BABEu64)
            .encode(&mut buf);

        let req = parse_request(&buf, false).unwrap();
        assert_eq!(req.kind, CommandKind::Cmif(cmif::CommandType::Request));
        assert_eq!(req.command, 0x1234_5678);
        assert_eq!(req.data_payload_offset, 6);
        assert_eq!(buf.reader(req.params_index).pop_u64(), 0xDEAD_BEEF_CAFE_BABE);
        assert!(req.domain.is_none());
    }

    #[test]
    fn test_parse_handles_and_pid() {
        let mut buf = CommandBuffer::new();
        Request::new(1)
            .send_pid(0x55)
            .add_handle(0x10)
            .add_move_handle(0x20)
            .encode(&mut buf);

        let req = parse_request(&buf, false).unwrap();
        assert_eq!(req.pid, Some(0x55));
        assert_eq!(req.copy_handles, vec![0x10]);
        assert_eq!(req.move_handles, vec![0x20]);
        assert_eq!(req.data_payload_offset % 4, 2);
    }

    #[test]
    fn test_parse_descriptors_in_order() {
        let mut buf = CommandBuffer::new();
        Request::new(2)
            .add_in_pointer(0x1000, 0x10)
            .add_in_buffer(0x2000, 0x20)
            .add_out_buffer(0x3000, 0x30)
            .add_inout_buffer(0x4000, 0x40)
            .add_out_fixed_pointer(0x5000, 0x50)
            .encode(&mut buf);

        let req = parse_request(&buf, false).unwrap();
        assert_eq!(req.buffer_x[0].address(), 0x1000);
        assert_eq!(req.buffer_a[0].address(), 0x2000);
        assert_eq!(req.buffer_a[0].mode(), BufferMode::Normal);
        assert_eq!(req.buffer_b[0].size(), 0x30);
        assert_eq!(req.buffer_w[0].address(), 0x4000);
        assert_eq!(req.buffer_c_mode, BufferCMode::Descriptors(1));
        assert_eq!(req.buffer_c[0].address(), 0x5000);
        assert_eq!(req.buffer_c[0].size(), 0x50);
        assert_eq!(req.command, 2);
    }

    #[test]
    fn test_parse_domain_request() {
        let mut buf = CommandBuffer::new();
        Request::new(9)
            .object_id(ObjectId::new(2).unwrap())
            .push(&7u32)
            .add_object(ObjectId::new(3).unwrap())
            .encode(&mut buf);

        let req = parse_request(&buf, true).unwrap();
        assert_eq!(req.domain_command(), Some(DomainCommand::SendMessage));
        assert_eq!(req.object_id(), Some(2));
        assert_eq!(req.domain_objects, vec![3]);
        assert_eq!(req.command, 9);
        assert_eq!(buf.word(req.params_index), 7);
    }

    #[test]
    fn test_domain_header_ignored_when_not_domain() {
        let mut buf = CommandBuffer::new();
        Request::new(9)
            .object_id(ObjectId::new(2).unwrap())
            .encode(&mut buf);
        // On a plain session the domain header is read as the payload header.
        assert!(matches!(
            parse_request(&buf, false),
            Err(ParseError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_parse_close_virtual_handle_stops_early() {
        let mut buf = CommandBuffer::new();
        cmif::make_domain_close_request(&mut buf, ObjectId::new(4).unwrap());
        let req = parse_request(&buf, true).unwrap();
        assert_eq!(req.domain_command(), Some(DomainCommand::CloseVirtualHandle));
        assert_eq!(req.object_id(), Some(4));
        assert_eq!(req.command, 0);
    }

    #[test]
    fn test_parse_close_messages() {
        let mut buf = CommandBuffer::new();
        cmif::make_close_request(&mut buf);
        assert!(parse_request(&buf, false).unwrap().is_close());

        tipc::make_close_request(&mut buf);
        let req = parse_request(&buf, false).unwrap();
        assert!(req.is_close());
        assert!(req.is_tipc());
    }

    #[test]
    fn test_parse_tipc_request() {
        let mut buf = CommandBuffer::new();
        tipc::Request::new(1).push(&0x3A6D_73u64).encode(&mut buf);
        let req = parse_request(&buf, false).unwrap();
        assert_eq!(req.kind, CommandKind::Tipc(tipc::CommandType::Request(1)));
        assert_eq!(req.command, 1);
        assert_eq!(req.params_index, 2);
        assert_eq!(buf.reader(req.params_index).pop_u64(), 0x3A6D_73);
    }

    #[test]
    fn test_missing_magic_is_an_error() {
        let mut buf = CommandBuffer::new();
        Request::new(1).encode(&mut buf);
        buf.set_word(4, 0);
        assert_eq!(parse_request(&buf, false).unwrap_err(), ParseError::InvalidMagic(0));
    }

    #[test]
    fn test_unknown_message_type() {
        let mut buf = CommandBuffer::new();
        buf.set_word(0, 9);
        assert_eq!(
            parse_request(&buf, false).unwrap_err(),
            ParseError::UnknownMessageType(9)
        );
    }
}

//! Server-side emission of responses.
//!
//! [`emit_response`] writes the header, reserves the handle slots and places
//! the `SFCO` header; the caller then pushes the result and parameters from
//! [`ResponseLayout::data_payload_index`]. Handles and domain object ids are
//! written last by [`ResponseLayout::write_handles`] and
//! [`ResponseLayout::write_domain_objects`], once copy fds have been turned
//! into handles.

use mizu_result::ResultCode;

use crate::{
    buffer::{CommandBuffer, WordWriter},
    cmif::{DataPayloadHeader, DomainOutHeader, OUT_HEADER_MAGIC},
    hipc::{Header, MessageType, SpecialHeader},
};

/// What the response will carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseFormat {
    /// Message type to echo back, for TIPC requests.
    pub tipc_type: Option<MessageType>,
    /// The request carried a domain header.
    pub is_domain: bool,
    /// Number of parameter words, including the two result words.
    pub normal_params: u32,
    pub num_copy_handles: u32,
    /// Interfaces or handles to move out.
    pub num_move_objects: u32,
    /// Move objects as handles even on a domain session.
    pub always_move_handles: bool,
}

/// Where the parts of an emitted response live, in words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseLayout {
    pub is_tipc: bool,
    pub is_domain: bool,
    /// First handle slot, when a handle descriptor was emitted.
    pub handles_offset: Option<usize>,
    pub num_copy_handles: u32,
    pub num_move_handles: u32,
    pub num_domain_objects: u32,
    pub normal_params: u32,
    /// First parameter word (where the result goes).
    pub data_payload_index: usize,
    /// First domain object id word.
    pub domain_objects_offset: usize,
}

/// Lays out the response skeleton in `buf`, which is zeroed first.
pub fn emit_response(buf: &mut CommandBuffer, format: &ResponseFormat) -> ResponseLayout {
    buf.clear();

    let is_tipc = format.tipc_type.is_some();
    let mut raw_data_size = if is_tipc {
        format.normal_params.saturating_sub(1)
    } else {
        format.normal_params
    };

    let (num_move_handles, num_domain_objects) =
        if !format.is_domain || format.always_move_handles {
            (format.num_move_objects, 0)
        } else {
            (0, format.num_move_objects)
        };

    if format.is_domain {
        raw_data_size += (size_of::<DomainOutHeader>() / 4) as u32 + num_domain_objects;
    }
    if !is_tipc {
        // Payload header, alignment slack and the parameters again for padding.
        raw_data_size += (size_of::<DataPayloadHeader>() / 4) as u32 + 4 + format.normal_params;
    }

    let has_handles = format.num_copy_handles > 0 || num_move_handles > 0;
    let header = Header::new()
        .with_message_type(format.tipc_type.map_or(0, MessageType::to_raw))
        .with_num_data_words(raw_data_size as u16)
        .with_has_special_header(has_handles);

    let mut w = buf.writer(0);
    header.push(&mut w);

    let mut handles_offset = None;
    if has_handles {
        SpecialHeader::new()
            .with_num_copy_handles(format.num_copy_handles as u8)
            .with_num_move_handles(num_move_handles as u8)
            .push(&mut w);
        handles_offset = Some(w.index());
        w.skip((format.num_copy_handles + num_move_handles) as usize, true);
    }

    if !is_tipc {
        w.align_with_padding();
        if format.is_domain {
            w.push_raw(&DomainOutHeader {
                num_out_objects: num_domain_objects,
                _padding: [0; 3],
            });
        }
        w.push_raw(&DataPayloadHeader {
            magic: OUT_HEADER_MAGIC,
            version: 0,
        });
    }

    let data_payload_index = w.index();
    ResponseLayout {
        is_tipc,
        is_domain: format.is_domain,
        handles_offset,
        num_copy_handles: format.num_copy_handles,
        num_move_handles,
        num_domain_objects,
        normal_params: format.normal_params,
        data_payload_index,
        domain_objects_offset: data_payload_index + format.normal_params as usize,
    }
}

/// Handle or object counts differ from what the layout declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("declared {declared} {what}, got {actual}")]
pub struct CountMismatch {
    pub what: &'static str,
    pub declared: u32,
    pub actual: usize,
}

impl ResponseLayout {
    /// Fills the handle slots: copy handles first, then move handles.
    pub fn write_handles(
        &self,
        buf: &mut CommandBuffer,
        copy_handles: &[u32],
        move_handles: &[u32],
    ) -> Result<(), CountMismatch> {
        check("copy handles", self.num_copy_handles, copy_handles.len())?;
        check("move handles", self.num_move_handles, move_handles.len())?;
        let Some(offset) = self.handles_offset else {
            return Ok(());
        };
        let mut w = buf.writer(offset);
        for &handle in copy_handles.iter().chain(move_handles) {
            w.push_u32(handle);
        }
        Ok(())
    }

    /// Writes domain object ids after the declared parameters.
    pub fn write_domain_objects(
        &self,
        buf: &mut CommandBuffer,
        objects: &[u32],
    ) -> Result<(), CountMismatch> {
        check("domain objects", self.num_domain_objects, objects.len())?;
        let mut w = buf.writer(self.domain_objects_offset);
        for &object in objects {
            w.push_u32(object);
        }
        Ok(())
    }

    /// Returns a writer positioned at the first parameter word.
    pub fn params_writer<'a>(&self, buf: &'a mut CommandBuffer) -> WordWriter<'a> {
        buf.writer(self.data_payload_index)
    }
}

fn check(what: &'static str, declared: u32, actual: usize) -> Result<(), CountMismatch> {
    if declared as usize == actual {
        Ok(())
    } else {
        Err(CountMismatch {
            what,
            declared,
            actual,
        })
    }
}

/// Pushes a result code: two words under CMIF, one under TIPC.
pub fn push_result(w: &mut WordWriter<'_>, is_tipc: bool, code: ResultCode) {
    if is_tipc {
        w.push_u32(code.to_raw());
    } else {
        w.push_u64(code.to_raw() as u64);
    }
}

/// Replaces `buf` with a response that carries only `code`.
pub fn write_error_response(
    buf: &mut CommandBuffer,
    tipc_type: Option<MessageType>,
    is_domain: bool,
    code: ResultCode,
) -> ResponseLayout {
    let layout = emit_response(
        buf,
        &ResponseFormat {
            tipc_type,
            is_domain,
            normal_params: 2,
            ..Default::default()
        },
    );
    push_result(&mut layout.params_writer(buf), layout.is_tipc, code);
    layout
}

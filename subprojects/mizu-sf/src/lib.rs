//! Service Framework (SF) wire codec.
//!
//! This crate implements the **Service Framework** serialization layer used by
//! Horizon OS services, from the service side. The name "SF" comes from the
//! CMIF protocol's magic headers: `"SFCI"` (Service Framework Command Input)
//! and `"SFCO"` (Service Framework Command Output).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  Services (sm:, vi:m, ...)  │  Application layer
//! ├─────────────────────────────┤
//! │  CMIF / TIPC                │  Command serialization (SF layer)
//! ├─────────────────────────────┤
//! │  HIPC                       │  Message framing & descriptors
//! ├─────────────────────────────┤
//! │  servctl                    │  Host kernel transport
//! └─────────────────────────────┘
//! ```
//!
//! All parsing and emission works on a [`CommandBuffer`] of 0x40 words
//! through bounds-checked word cursors.
//!
//! # Protocols
//!
//! - **HIPC**: message framing, buffer descriptors, handles and raw data
//!   layout. See the [`hipc`] module.
//! - **CMIF**: command interface with domain support (object multiplexing).
//!   See the [`cmif`] module.
//! - **TIPC**: command id stored in the HIPC message type, no domains. See
//!   the [`tipc`] module.
//!
//! Incoming requests are decoded by [`parse_request`]; responses are laid out
//! by [`emit_response`].

pub mod buffer;
pub mod cmif;
mod error;
pub mod hipc;
pub mod request;
pub mod response;
mod service_name;
pub mod tipc;

pub use self::{
    buffer::{COMMAND_BUFFER_SIZE, COMMAND_BUFFER_WORDS, CommandBuffer, WordReader, WordWriter},
    error::{ParseError, ParseResponseError},
    request::{CommandKind, ParsedRequest, parse_request},
    response::{
        CountMismatch, ResponseFormat, ResponseLayout, emit_response, push_result,
        write_error_response,
    },
    service_name::{ServiceName, ServiceNameError},
};

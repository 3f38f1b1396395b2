//! HIPC message framing.
//!
//! HIPC is the low-level layout of a command buffer: a two-word header, an
//! optional handle descriptor, the X/A/B/W buffer descriptors, the data words
//! and an optional C-descriptor list at the tail. CMIF and TIPC define what
//! goes inside the data words.
//!
//! # Message Layout
//!
//! ```text
//! Offset  Size   Field
//! ──────────────────────────────────────────────────────────────
//! 0x00    0x08   Header (message type, descriptor counts)
//! 0x08    0x04   SpecialHeader (optional: PID flag, handle counts)
//! 0x0C    0x08   ProcessId (optional: if send_pid is set)
//!         var    Copy Handles (4 bytes × num_copy_handles)
//!         var    Move Handles (4 bytes × num_move_handles)
//!         var    Send Statics / Type X (8 bytes each)
//!         var    Send Buffers / Type A (12 bytes each)
//!         var    Recv Buffers / Type B (12 bytes each)
//!         var    Exch Buffers / Type W (12 bytes each)
//!         var    Data Words (raw payload, 4 bytes each)
//!         var    Recv List / Type C (8 bytes each)
//! ──────────────────────────────────────────────────────────────
//! ```
//!
//! # Descriptor Types
//!
//! | Type | Name          | Direction      | Mechanism        | Size Limit |
//! |------|---------------|----------------|------------------|------------|
//! | X    | Send Static   | Client→Server  | Pointer (copy)   | 64 KB      |
//! | A    | Send Buffer   | Client→Server  | Memory mapping   | 64 GB      |
//! | B    | Recv Buffer   | Server→Client  | Memory mapping   | 64 GB      |
//! | W    | Exch Buffer   | Bidirectional  | Memory mapping   | 64 GB      |
//! | C    | Recv List     | Server→Client  | Pointer (copy)   | 64 KB      |
//!
//! The header's C flag encodes the receive list: 0 disabled, 1 inline (no
//! descriptors), 2 one descriptor, `n >= 3` means `n - 2` descriptors.
//!
//! # Address Encoding
//!
//! **Static Descriptor (8 bytes):**
//! ```text
//! Bits 0-5:   index (6 bits)
//! Bits 6-11:  address[36:41] (6 bits)
//! Bits 12-15: address[32:35] (4 bits)
//! Bits 16-31: size (16 bits, max 64KB)
//! Bits 32-63: address[0:31] (32 bits)
//! ```
//!
//! **Buffer Descriptor (12 bytes):**
//! ```text
//! Bits 0-31:  size[0:31] (32 bits)
//! Bits 32-63: address[0:31] (32 bits)
//! Bits 64-65: mode (2 bits)
//! Bits 66-87: address[36:57] (22 bits)
//! Bits 88-91: size[32:35] (4 bits)
//! Bits 92-95: address[32:35] (4 bits)
//! ```
//!
//! # References
//!
//! - [Switchbrew IPC Marshalling](https://switchbrew.org/wiki/IPC_Marshalling)

use core::mem::size_of;

use modular_bitfield::prelude::*;
use static_assertions::const_assert_eq;

use crate::buffer::{WordReader, WordWriter};

/// Buffer transfer mode for HIPC buffer descriptors.
#[derive(BitfieldSpecifier, Debug, Clone, Copy, PartialEq, Eq)]
#[bits = 2]
pub enum BufferMode {
    /// Normal buffer mapping.
    Normal = 0,
    /// Non-secure memory area.
    NonSecure = 1,
    /// Invalid/device memory (cannot be mapped).
    Invalid = 2,
    /// Non-device memory area.
    NonDevice = 3,
}

/// HIPC message header (8 bytes).
#[bitfield]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Header {
    /// Message type. Command type for CMIF, `id + 16` for TIPC.
    pub message_type: B16,
    /// Number of X descriptors.
    pub num_send_statics: B4,
    /// Number of A descriptors.
    pub num_send_buffers: B4,
    /// Number of B descriptors.
    pub num_recv_buffers: B4,
    /// Number of W descriptors.
    pub num_exch_buffers: B4,
    /// Number of data words in the message.
    pub num_data_words: B10,
    /// C flag (see [`BufferCMode`]).
    pub recv_static_mode: B4,
    #[skip]
    __padding: B6,
    /// Offset to receive list (unused).
    pub recv_list_offset: B11,
    /// Whether a handle descriptor follows.
    pub has_special_header: bool,
}

const_assert_eq!(size_of::<Header>(), 8);

/// HIPC handle descriptor (4 bytes).
#[bitfield]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SpecialHeader {
    /// Whether a 64-bit process id follows.
    pub send_pid: bool,
    /// Number of copy handles.
    pub num_copy_handles: B4,
    /// Number of move handles.
    pub num_move_handles: B4,
    #[skip]
    __padding: B23,
}

const_assert_eq!(size_of::<SpecialHeader>(), 4);

/// X descriptor (8 bytes).
#[bitfield]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct StaticDescriptor {
    /// Index for matching send/receive pairs.
    pub index: B6,
    /// Address bits 36-41.
    pub address_high: B6,
    /// Address bits 32-35.
    pub address_mid: B4,
    /// Size of the buffer.
    pub size: B16,
    /// Address bits 0-31.
    pub address_low: B32,
}

const_assert_eq!(size_of::<StaticDescriptor>(), 8);

impl StaticDescriptor {
    /// Creates an X descriptor for `size` bytes at guest `address`.
    pub fn new_send(address: u64, size: u16, index: u8) -> Self {
        Self::new()
            .with_index(index & 0x3F)
            .with_address_low(address as u32)
            .with_address_mid(((address >> 32) & 0xF) as u8)
            .with_address_high(((address >> 36) & 0x3F) as u8)
            .with_size(size)
    }

    /// Reconstructs the full address from the split fields.
    pub fn address(&self) -> u64 {
        self.address_low() as u64
            | ((self.address_mid() as u64) << 32)
            | ((self.address_high() as u64) << 36)
    }
}

/// A/B/W descriptor (12 bytes).
#[bitfield]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct BufferDescriptor {
    /// Size bits 0-31.
    pub size_low: B32,
    /// Address bits 0-31.
    pub address_low: B32,
    /// Buffer mode (Normal, NonSecure, etc.).
    pub mode: BufferMode,
    /// Address bits 36-57.
    pub address_high: B22,
    /// Size bits 32-35.
    pub size_high: B4,
    /// Address bits 32-35.
    pub address_mid: B4,
}

const_assert_eq!(size_of::<BufferDescriptor>(), 12);

impl BufferDescriptor {
    /// Creates a buffer descriptor for `size` bytes at guest `address`.
    pub fn new_buffer(address: u64, size: u64, mode: BufferMode) -> Self {
        Self::new()
            .with_mode(mode)
            .with_address_low(address as u32)
            .with_address_mid(((address >> 32) & 0xF) as u8)
            .with_address_high(((address >> 36) & 0x3F_FFFF) as u32)
            .with_size_low(size as u32)
            .with_size_high(((size >> 32) & 0xF) as u8)
    }

    /// Reconstructs the full address from the split fields.
    pub fn address(&self) -> u64 {
        self.address_low() as u64
            | ((self.address_mid() as u64) << 32)
            | ((self.address_high() as u64) << 36)
    }

    /// Reconstructs the full size from the split fields.
    pub fn size(&self) -> u64 {
        self.size_low() as u64 | ((self.size_high() as u64) << 32)
    }
}

/// C descriptor (8 bytes).
#[bitfield]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct RecvListEntry {
    /// Address bits 0-31.
    pub address_low: B32,
    /// Address bits 32-47.
    pub address_high: B16,
    /// Size of the buffer.
    pub size: B16,
}

const_assert_eq!(size_of::<RecvListEntry>(), 8);

impl RecvListEntry {
    /// Creates a C descriptor for `size` bytes at guest `address`.
    pub fn new_recv(address: u64, size: u16) -> Self {
        Self::new()
            .with_address_low(address as u32)
            .with_address_high(((address >> 32) & 0xFFFF) as u16)
            .with_size(size)
    }

    /// Reconstructs the full address from the split fields.
    pub fn address(&self) -> u64 {
        self.address_low() as u64 | ((self.address_high() as u64) << 32)
    }
}

/// Generates word-cursor codecs for the packed header and descriptor types.
macro_rules! impl_wire_words {
    ($($ty:ty => $len:literal),* $(,)?) => {$(
        impl $ty {
            /// Number of words this value occupies on the wire.
            pub const WORDS: usize = $len / 4;

            /// Pops the value from the cursor.
            pub fn pop(reader: &mut WordReader<'_>) -> Self {
                let mut raw = [0u8; $len];
                raw.copy_from_slice(&reader.pop_bytes($len));
                Self::from_bytes(raw)
            }

            /// Pushes the value at the cursor.
            pub fn push(&self, writer: &mut WordWriter<'_>) {
                writer.push_bytes(&(*self).into_bytes());
            }
        }
    )*};
}

impl_wire_words! {
    Header => 8,
    SpecialHeader => 4,
    StaticDescriptor => 8,
    BufferDescriptor => 12,
    RecvListEntry => 8,
}

/// Raw 16-bit message type from the header.
///
/// Protocol-specific command types (CMIF, TIPC) convert into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct MessageType(u16);

impl MessageType {
    /// First message type of the TIPC command region.
    pub const TIPC_COMMAND_REGION: u16 = 16;

    #[inline]
    pub const fn from_raw(value: u16) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn to_raw(self) -> u16 {
        self.0
    }

    /// Returns `true` for TIPC commands (type 16 and above).
    #[inline]
    pub const fn is_tipc(self) -> bool {
        self.0 >= Self::TIPC_COMMAND_REGION
    }
}

/// Decoded C flag from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferCMode {
    /// No receive list.
    Disabled,
    /// Receive into the inline message buffer; no descriptors.
    Inline,
    /// Exactly this many C descriptors.
    Descriptors(u8),
}

impl BufferCMode {
    /// Decodes the 4-bit header field.
    #[inline]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Disabled,
            1 => Self::Inline,
            2 => Self::Descriptors(1),
            n => Self::Descriptors(n - 2),
        }
    }

    /// Encodes back into the 4-bit header field.
    #[inline]
    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::Inline => 1,
            Self::Descriptors(0) => 0,
            Self::Descriptors(1) => 2,
            Self::Descriptors(n) => n + 2,
        }
    }

    /// Number of C descriptors present on the wire.
    #[inline]
    pub const fn count(self) -> usize {
        match self {
            Self::Disabled | Self::Inline => 0,
            Self::Descriptors(n) => n as usize,
        }
    }
}

//! Ids, names and wire structures shared by the display services.

use core::fmt;

use mizu_service::wire_enum;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct DisplayId(u64);

impl DisplayId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LayerId(u64);

impl LayerId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Binder object ID. Each buffer queue is one binder object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BinderObjectId(i32);

impl BinderObjectId {
    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for BinderObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binder#{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(transparent)]
pub struct DisplayName([u8; 0x40]);

impl DisplayName {
    pub const fn new() -> Self {
        Self([0; 0x40])
    }

    /// Creates a DisplayName, truncating to 63 bytes.
    pub fn from_ascii(s: &str) -> Self {
        let mut data = [0u8; 0x40];
        let bytes = s.as_bytes();
        let len = bytes.len().min(0x3F);
        data[..len].copy_from_slice(&bytes[..len]);
        Self(data)
    }

    /// Returns the display name up to the first NUL.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(0x40);
        core::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl Default for DisplayName {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DisplayName").field(&self.as_str()).finish()
    }
}

wire_enum! {
    pub enum ScalingMode {
        None = 0,
        Freeze = 1,
        ScaleToLayer = 2,
        ScaleAndCrop = 3,
        PreserveAspectRatio = 4,
    }
}

/// Pixel format of RGBA8888 surfaces.
pub const PIXEL_FORMAT_RGBA8888: u32 = 1;

wire_enum! {
    /// `Query` selectors understood by the buffer queue.
    pub enum QueryType {
        NativeWindowWidth = 0,
        NativeWindowHeight = 1,
        NativeWindowFormat = 2,
    }
}

/// One GPU fence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Fence {
    pub id: u32,
    pub value: u32,
}

/// Up to four fences guarding a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct MultiFence {
    pub num_fences: u32,
    pub fences: [Fence; 4],
}

static_assertions::const_assert_eq!(size_of::<MultiFence>(), 0x24);

/// Crop rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

bitflags::bitflags! {
    /// Native window transform applied on present.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct BufferTransformFlags: u32 {
        const FLIP_H = 0x01;
        const FLIP_V = 0x02;
        const ROTATE_90 = 0x04;
        const ROTATE_180 = 0x03;
        const ROTATE_270 = 0x07;
    }
}

/// Leading fields of a flattened graphic buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct GraphicBufferHeader {
    pub magic: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: u32,
    pub usage: u32,
    pub pid: u32,
    pub refcount: u32,
    pub num_fds: u32,
    pub num_ints: u32,
}

/// Buffer parameters a producer preallocates into a slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgbpBuffer {
    pub header: GraphicBufferHeader,
    /// The flattened buffer as received, echoed back by `RequestBuffer`.
    pub raw: Vec<u8>,
}

impl IgbpBuffer {
    /// Parses a flattened graphic buffer. Returns `None` if it is too short.
    pub fn from_flattened(raw: &[u8]) -> Option<Self> {
        let (header, _) = GraphicBufferHeader::read_from_prefix(raw).ok()?;
        Some(Self {
            header,
            raw: raw.to_vec(),
        })
    }

    /// A buffer carrying only dimensions and format.
    pub fn new(width: u32, height: u32, format: u32) -> Self {
        let header = GraphicBufferHeader {
            magic: 0x4742_5546,
            width,
            height,
            stride: width,
            format,
            ..GraphicBufferHeader::default()
        };
        Self {
            header,
            raw: header.as_bytes().to_vec(),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.header.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.header.height
    }
}

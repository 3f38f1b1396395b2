//! Android Parcel serialization for binder transactions.
//!
//! A transaction buffer is a [`ParcelHeader`] followed by the payload and an
//! (always empty) object table. Payload values are 4-byte aligned.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Maximum parcel payload size.
pub const PARCEL_MAX_PAYLOAD: usize = 0x400;

/// Strict-mode policy written before interface tokens.
const STRICT_MODE_POLICY: i32 = 0x100;

/// Parcel header structure.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ParcelHeader {
    /// Size of the payload data.
    pub payload_size: u32,
    /// Offset to payload data from start of parcel.
    pub payload_off: u32,
    /// Size of the objects data.
    pub objects_size: u32,
    /// Offset to objects data from start of parcel.
    pub objects_off: u32,
}

impl ParcelHeader {
    /// Size of the parcel header.
    pub const SIZE: usize = 16;
}

/// Readable and writable parcel payload.
#[derive(Debug, Clone, Default)]
pub struct Parcel {
    payload: Vec<u8>,
    pos: usize,
}

impl Parcel {
    pub const fn new() -> Self {
        Self {
            payload: Vec::new(),
            pos: 0,
        }
    }

    /// Extracts the payload of a serialized transaction buffer.
    pub fn from_transaction(buf: &[u8]) -> Result<Self, ParcelError> {
        let (header, _) =
            ParcelHeader::read_from_prefix(buf).map_err(|_| ParcelError::Truncated)?;
        let start = header.payload_off as usize;
        let end = start
            .checked_add(header.payload_size as usize)
            .ok_or(ParcelError::BadHeader)?;
        if start < ParcelHeader::SIZE || end > buf.len() || header.payload_size as usize > PARCEL_MAX_PAYLOAD {
            return Err(ParcelError::BadHeader);
        }
        Ok(Self {
            payload: buf[start..end].to_vec(),
            pos: 0,
        })
    }

    /// Serializes header and payload into one transaction buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let header = ParcelHeader {
            payload_size: self.payload.len() as u32,
            payload_off: ParcelHeader::SIZE as u32,
            objects_size: 0,
            objects_off: (ParcelHeader::SIZE + self.payload.len()) as u32,
        };
        let mut out = Vec::with_capacity(ParcelHeader::SIZE + self.payload.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    #[inline]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Writes raw data, padded to 4 bytes.
    pub fn write_data(&mut self, data: &[u8]) {
        self.payload.extend_from_slice(data);
        let aligned = self.payload.len().next_multiple_of(4);
        self.payload.resize(aligned, 0);
    }

    /// Reads `size` bytes and skips the padding after them.
    pub fn read_data(&mut self, size: usize) -> Result<&[u8], ParcelError> {
        let aligned = size.next_multiple_of(4);
        let end = self.pos.checked_add(size).ok_or(ParcelError::Truncated)?;
        if end > self.payload.len() {
            return Err(ParcelError::Truncated);
        }
        let start = self.pos;
        self.pos = (start + aligned).min(self.payload.len());
        Ok(&self.payload[start..end])
    }

    pub fn write_raw<T: IntoBytes + Immutable>(&mut self, value: &T) {
        self.write_data(value.as_bytes());
    }

    pub fn read_raw<T: FromBytes>(&mut self) -> Result<T, ParcelError> {
        let bytes = self.read_data(size_of::<T>())?;
        T::read_from_bytes(bytes).map_err(|_| ParcelError::Truncated)
    }

    pub fn write_i32(&mut self, val: i32) {
        self.write_data(&val.to_le_bytes());
    }

    pub fn write_u32(&mut self, val: u32) {
        self.write_data(&val.to_le_bytes());
    }

    pub fn write_u64(&mut self, val: u64) {
        self.write_data(&val.to_le_bytes());
    }

    pub fn read_i32(&mut self) -> Result<i32, ParcelError> {
        self.read_raw()
    }

    pub fn read_u32(&mut self) -> Result<u32, ParcelError> {
        self.read_raw()
    }

    pub fn read_u64(&mut self) -> Result<u64, ParcelError> {
        self.read_raw()
    }

    /// Writes an ASCII string as NUL-terminated UTF-16.
    pub fn write_string16(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        let units: Vec<u8> = s
            .encode_utf16()
            .chain(core::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect();
        self.write_data(&units);
    }

    pub fn read_string16(&mut self) -> Result<String, ParcelError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(String::new());
        }
        let bytes = self.read_data((len as usize + 1) * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take(len as usize)
            .collect();
        String::from_utf16(&units).map_err(|_| ParcelError::BadString)
    }

    /// Writes an interface token (strict mode + interface name).
    pub fn write_interface_token(&mut self, interface: &str) {
        self.write_i32(STRICT_MODE_POLICY);
        self.write_string16(interface);
    }

    /// Reads an interface token and returns the interface name.
    pub fn read_interface_token(&mut self) -> Result<String, ParcelError> {
        let _strict_mode = self.read_i32()?;
        self.read_string16()
    }

    /// Reads a flattened object (`len`, `fd_count`, data).
    pub fn read_flattened_object(&mut self) -> Result<Vec<u8>, ParcelError> {
        let len = self.read_i32()?;
        let fd_count = self.read_i32()?;
        if fd_count != 0 {
            return Err(ParcelError::FdsNotAllowed);
        }
        if len < 0 {
            return Err(ParcelError::BadHeader);
        }
        Ok(self.read_data(len as usize)?.to_vec())
    }

    pub fn write_flattened_object(&mut self, data: &[u8]) {
        self.write_i32(data.len() as i32);
        self.write_i32(0);
        self.write_data(data);
    }

    /// Reads a flattened plain-data value.
    pub fn read_flattened<T: FromBytes>(&mut self) -> Result<T, ParcelError> {
        let data = self.read_flattened_object()?;
        T::read_from_prefix(&data)
            .map(|(value, _)| value)
            .map_err(|_| ParcelError::Truncated)
    }

    pub fn write_flattened<T: IntoBytes + Immutable>(&mut self, value: &T) {
        self.write_flattened_object(value.as_bytes());
    }
}

/// Error decoding a parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParcelError {
    #[error("parcel ends before the requested value")]
    Truncated,
    #[error("invalid parcel header")]
    BadHeader,
    #[error("invalid UTF-16 string")]
    BadString,
    #[error("file descriptors are not supported")]
    FdsNotAllowed,
}

//! Service name type.
//!
//! Names are up to 8 printable ASCII characters, zero padded, so the whole
//! name travels as one `u64` parameter word pair.

use mizu_result::{ERR_SM_INVALID_NAME, ResultCode, ToResultCode};
use static_assertions::const_assert_eq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(C)]
pub struct ServiceName {
    name: [u8; 8],
}

const_assert_eq!(size_of::<ServiceName>(), size_of::<u64>());

/// A name that cannot be registered or looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServiceNameError {
    #[error("service name is empty")]
    Empty,
    #[error("service name is longer than 8 bytes")]
    TooLong,
    #[error("service name contains non-printable or non-ASCII bytes")]
    NonAscii,
}

impl ToResultCode for ServiceNameError {
    fn to_result_code(&self) -> ResultCode {
        ERR_SM_INVALID_NAME
    }
}

impl ServiceName {
    pub const MAX_LEN: usize = 8;

    /// Packs `name` into its 8-byte wire form.
    ///
    /// Returns `None` if the name exceeds 8 bytes or is not printable ASCII.
    #[inline]
    pub const fn new(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() > Self::MAX_LEN {
            return None;
        }

        let mut result = [0u8; 8];
        let mut c = 0;
        while c < bytes.len() {
            if !is_printable(bytes[c]) {
                return None;
            }
            result[c] = bytes[c];
            c += 1;
        }
        Some(Self { name: result })
    }

    /// Checks a name for registration: 1..=8 printable ASCII bytes.
    pub fn validate(name: &str) -> Result<Self, ServiceNameError> {
        if name.is_empty() {
            return Err(ServiceNameError::Empty);
        }
        if name.len() > Self::MAX_LEN {
            return Err(ServiceNameError::TooLong);
        }
        Self::new(name).ok_or(ServiceNameError::NonAscii)
    }

    /// Decodes a name popped from the wire.
    ///
    /// Bytes outside `0x20..=0x7E` are dropped and the rest compacted, so
    /// the zero padding disappears and stray control bytes are ignored.
    pub fn parse_wire(raw: u64) -> Self {
        let mut name = [0u8; 8];
        let mut len = 0;
        for byte in raw.to_le_bytes() {
            if is_printable(byte) {
                name[len] = byte;
                len += 1;
            }
        }
        Self { name }
    }

    /// Converts the service name to its wire `u64`.
    #[inline]
    pub const fn to_u64(&self) -> u64 {
        u64::from_le_bytes(self.name)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.name[..self.len()]
    }

    pub const fn len(&self) -> usize {
        let mut i = 0;
        while i < Self::MAX_LEN {
            if self.name[i] == 0 {
                return i;
            }
            i += 1;
        }
        Self::MAX_LEN
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Only printable ASCII is ever stored.
        core::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }
}

const fn is_printable(byte: u8) -> bool {
    byte >= 0x20 && byte <= 0x7E
}

impl core::fmt::Display for ServiceName {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl PartialEq<str> for ServiceName {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for ServiceName {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<ServiceName> for &str {
    #[inline]
    fn eq(&self, other: &ServiceName) -> bool {
        other == self
    }
}

impl PartialEq<u64> for ServiceName {
    #[inline]
    fn eq(&self, other: &u64) -> bool {
        self.to_u64() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_compare() {
        let name = ServiceName::new("sm:").unwrap();
        assert_eq!(name, "sm:");
        assert_eq!(name.len(), 3);
        assert_eq!(name.to_u64(), 0x3A6D73);
        assert!(ServiceName::new("toolongname").is_none());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert_eq!(ServiceName::validate(""), Err(ServiceNameError::Empty));
        assert_eq!(
            ServiceName::validate("123456789"),
            Err(ServiceNameError::TooLong)
        );
        assert_eq!(
            ServiceName::validate("ap\u{1}"),
            Err(ServiceNameError::NonAscii)
        );
        assert_eq!(
            ServiceNameError::Empty.to_result_code(),
            ERR_SM_INVALID_NAME
        );
        assert!(ServiceName::validate("nvdrv:a").is_ok());
    }

    #[test]
    fn test_parse_wire_keeps_printable_bytes() {
        let raw = u64::from_le_bytes([b'a', 0x01, b'p', b'm', 0, 0, 0xFF, 0]);
        let name = ServiceName::parse_wire(raw);
        assert_eq!(name, "apm");
        assert_eq!(name.to_string(), "apm");
    }
}

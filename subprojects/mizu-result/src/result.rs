//! The [`ResultCode`] type.

use crate::module::{ErrorModule, IntoDescription};

/// Successful result code
const SUCCESS: u32 = 0;

/// Mask for the module field (9 bits)
const MODULE_MASK: u32 = 0x1FF;
/// Mask for the description field (13 bits)
const DESCRIPTION_MASK: u32 = 0x1FFF;
/// Shift amount for the description field
const DESCRIPTION_SHIFT: u32 = 9;

/// Type alias for Result with [`ResultCode`] as the error type.
///
/// This is the return type of every IPC command handler. An `Err` is turned
/// into a minimal error response by the dispatcher.
pub type Result<T, E = ResultCode> = core::result::Result<T, E>;

/// A code plus an optional value. The value is only reachable on success.
pub type ResultVal<T> = Result<T>;

/// A Horizon OS result code, either success or an error.
///
/// Two codes are equal iff their raw words match. Ordering follows the raw
/// word, which gives a total order usable as a map key.
///
/// # Formatting
///
/// The code is formatted as `2XXX-YYYY` where:
///  - `XXX` is `2000` + module number
///  - `YYYY` is the `description`
///
/// ```rust
/// use mizu_result::{ErrorModule, ResultCode};
///
/// let rc = ResultCode::from_parts(ErrorModule::Sm, 7u32);
/// assert_eq!(format!("{}", rc), "2021-0007");
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[repr(transparent)]
pub struct ResultCode(u32);

impl ResultCode {
    /// Creates a new [`ResultCode`] from a raw value
    #[inline]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw value of the [`ResultCode`]
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Creates a code from a module and a description, usable in `const` items.
    #[inline]
    pub const fn new(module: ErrorModule, description: u32) -> Self {
        let module_val = (module as u32) & MODULE_MASK;
        let desc_val = (description & DESCRIPTION_MASK) << DESCRIPTION_SHIFT;
        Self(module_val | desc_val)
    }

    /// Creates a new [`ResultCode`] from a module and description
    #[inline]
    pub fn from_parts(module: ErrorModule, description: impl IntoDescription) -> Self {
        Self::new(module, description.into_value())
    }

    /// Returns true if the [`ResultCode`] represents a success
    #[inline]
    pub const fn is_success(&self) -> bool {
        self.0 == SUCCESS
    }

    /// Returns true if the [`ResultCode`] represents an error
    #[inline]
    pub const fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// Returns the raw module number
    #[inline]
    pub const fn module_id(&self) -> u32 {
        self.0 & MODULE_MASK
    }

    /// Returns the module that caused the error, if it is a known one
    #[inline]
    pub const fn module(&self) -> Option<ErrorModule> {
        ErrorModule::from_raw(self.module_id())
    }

    /// Returns the description value
    #[inline]
    pub const fn description(&self) -> u32 {
        (self.0 >> DESCRIPTION_SHIFT) & DESCRIPTION_MASK
    }

    /// Converts the code into a [`Result`], with `Ok(())` on success.
    #[inline]
    pub const fn into_result(self) -> Result<()> {
        if self.is_success() { Ok(()) } else { Err(self) }
    }
}

impl core::fmt::Display for ResultCode {
    /// Formats the result code as a `2XXX-YYYY` string.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:04}", 2000 + self.module_id(), self.description())
    }
}

impl core::fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResultCode")
            .field("code", &format_args!("{}", self))
            .field("module", &self.module())
            .field("description", &self.description())
            .field("raw", &format_args!("{:#x}", self.0))
            .finish()
    }
}

impl core::error::Error for ResultCode {}

impl From<u32> for ResultCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<ResultCode> for u32 {
    fn from(value: ResultCode) -> Self {
        value.0
    }
}

/// Conversion of a typed error into the code sent back over IPC.
pub trait ToResultCode {
    /// Returns the wire code for this error.
    fn to_result_code(&self) -> ResultCode;
}

impl ToResultCode for ResultCode {
    fn to_result_code(&self) -> ResultCode {
        *self
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_success_is_zero() {
        let rc = ResultCode::from_raw(0);
        assert!(rc.is_success());
        assert!(!rc.is_error());
        assert_eq!(rc.into_result(), Ok(()));
    }

    #[test]
    fn test_from_parts_packs_module_and_description() {
        let rc = ResultCode::from_parts(ErrorModule::Hipc, 301u32);
        assert_eq!(rc.module_id(), 11);
        assert_eq!(rc.description(), 301);
        assert_eq!(rc.to_raw(), 11 | (301 << 9));
        assert_eq!(rc.module(), Some(ErrorModule::Hipc));
    }

    #[test]
    fn test_display_format() {
        let rc = ResultCode::new(ErrorModule::Kernel, 404);
        assert_eq!(format!("{}", rc), "2001-0404");
    }

    #[test]
    fn test_unknown_module_is_none() {
        let rc = ResultCode::from_raw(0x1FF);
        assert_eq!(rc.module(), None);
    }

    proptest! {
        #[test]
        fn test_parts_roundtrip(module in 0u32..0x200, desc in 0u32..0x2000) {
            let raw = module | (desc << 9);
            let rc = ResultCode::from_raw(raw);
            prop_assert_eq!(rc.module_id(), module);
            prop_assert_eq!(rc.description(), desc);
        }

        #[test]
        fn test_equality_matches_raw(a in any::<u32>(), b in any::<u32>()) {
            let (ra, rb) = (ResultCode::from_raw(a), ResultCode::from_raw(b));
            prop_assert_eq!(ra == rb, a == b);
            prop_assert_eq!(ra.cmp(&rb), a.cmp(&b));
        }
    }
}

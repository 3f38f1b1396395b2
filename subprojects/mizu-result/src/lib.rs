//! # mizu-result
//!
//! Horizon OS result codes as seen on the IPC wire.
//!
//! Every IPC response carries a 32-bit result code. The code packs the module
//! that produced the error together with a module-specific description:
//!
//! - **Bits 0-8:** Module ID
//! - **Bits 9-21:** Description
//! - **Bits 22-31:** Reserved
//!
//! A raw value of `0` is success.
//!
//! Handlers propagate codes with `?` over [`Result`]. The [`r_try!`],
//! [`r_unless!`] and [`r_succeed_if!`] macros cover the remaining early-return
//! forms used by service code.
//!
//! ## References
//! - [Switchbrew Wiki: Error Codes](https://switchbrew.org/wiki/Error_codes)

mod codes;
mod module;
mod result;

pub use self::{
    codes::*,
    module::{ErrorModule, IntoDescription},
    result::{Result, ResultCode, ResultVal, ToResultCode},
};

/// Returns early with the given code when it is an error.
///
/// The expression must evaluate to a [`ResultCode`]. The enclosing function
/// must return a `Result<_, E>` where `E: From<ResultCode>`.
#[macro_export]
macro_rules! r_try {
    ($code:expr) => {{
        let rc: $crate::ResultCode = $code;
        if rc.is_error() {
            return ::core::result::Result::Err(::core::convert::From::from(rc));
        }
    }};
}

/// Returns early with `$code` when `$cond` does not hold.
#[macro_export]
macro_rules! r_unless {
    ($cond:expr, $code:expr) => {
        if !($cond) {
            return ::core::result::Result::Err(::core::convert::From::from($code));
        }
    };
}

/// Returns early with success when `$cond` holds.
///
/// The success value is `Default::default()`, which is `()` for handlers.
#[macro_export]
macro_rules! r_succeed_if {
    ($cond:expr) => {
        if $cond {
            return ::core::result::Result::Ok(::core::default::Default::default());
        }
    };
}

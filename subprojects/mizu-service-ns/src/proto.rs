//! `ns:am2` constants.

use mizu_result::{ErrorModule, ResultCode};

pub const SERVICE_NAME: &str = "ns:am2";

pub const CMD_GET_APPLICATION_DESIRED_LANGUAGE: u32 = 1400;

pub const CMD_CONVERT_APPLICATION_LANGUAGE_TO_LANGUAGE_CODE: u32 = 1401;

/// The system language has no application language, or the requested
/// application language is out of range.
pub const ERR_APPLICATION_LANGUAGE_NOT_FOUND: ResultCode = ResultCode::new(ErrorModule::Ns, 300);

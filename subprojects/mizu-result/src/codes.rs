//! Result codes owned by the IPC core, plus the kernel descriptions the
//! syscall shim maps errno values onto.

use crate::{ErrorModule, ResultCode};

/// Successful result.
pub const RESULT_SUCCESS: ResultCode = ResultCode::from_raw(0);

/// Catch-all failure used when no better code exists.
pub const RESULT_UNKNOWN: ResultCode = ResultCode::from_raw(u32::MAX);

/// The session peer is gone. Clients must reopen the service.
pub const ERR_REMOTE_PROCESS_DEAD: ResultCode = ResultCode::new(ErrorModule::Hipc, 301);

/// `sm:` was used before `Initialize`.
pub const ERR_SM_NOT_INITIALIZED: ResultCode = ResultCode::new(ErrorModule::Sm, 2);
/// The service name is already registered.
pub const ERR_SM_ALREADY_REGISTERED: ResultCode = ResultCode::new(ErrorModule::Sm, 4);
/// The service name is empty, too long or not ASCII.
pub const ERR_SM_INVALID_NAME: ResultCode = ResultCode::new(ErrorModule::Sm, 6);
/// No service is registered under the name.
pub const ERR_SM_NOT_REGISTERED: ResultCode = ResultCode::new(ErrorModule::Sm, 7);

/// The LDN service is a disabled stub.
pub const ERR_LDN_DISABLED: ResultCode = ResultCode::new(ErrorModule::Ldn, 22);

/// The command id is not in the service's table.
pub const ERR_SF_UNKNOWN_COMMAND_ID: ResultCode = ResultCode::new(ErrorModule::Sf, 221);
/// The command id is known but has no implementation.
pub const ERR_SF_NOT_IMPLEMENTED: ResultCode = ResultCode::new(ErrorModule::Sf, 1);
/// The incoming payload is malformed.
pub const ERR_SF_INVALID_HEADER: ResultCode = ResultCode::new(ErrorModule::Sf, 202);

/// Kernel descriptions used by the syscall shim.
pub mod kernel {
    use crate::{ErrorModule, ResultCode};

    pub const OUT_OF_SESSIONS: ResultCode = ResultCode::new(ErrorModule::Kernel, 7);
    pub const INVALID_ARGUMENT: ResultCode = ResultCode::new(ErrorModule::Kernel, 14);
    pub const NOT_IMPLEMENTED: ResultCode = ResultCode::new(ErrorModule::Kernel, 33);
    pub const INVALID_SIZE: ResultCode = ResultCode::new(ErrorModule::Kernel, 101);
    pub const INVALID_ADDRESS: ResultCode = ResultCode::new(ErrorModule::Kernel, 102);
    pub const OUT_OF_RESOURCE: ResultCode = ResultCode::new(ErrorModule::Kernel, 103);
    pub const OUT_OF_MEMORY: ResultCode = ResultCode::new(ErrorModule::Kernel, 104);
    pub const OUT_OF_HANDLES: ResultCode = ResultCode::new(ErrorModule::Kernel, 105);
    pub const INVALID_CURRENT_MEMORY: ResultCode = ResultCode::new(ErrorModule::Kernel, 106);
    pub const INVALID_HANDLE: ResultCode = ResultCode::new(ErrorModule::Kernel, 114);
    pub const INVALID_POINTER: ResultCode = ResultCode::new(ErrorModule::Kernel, 115);
    pub const TIMED_OUT: ResultCode = ResultCode::new(ErrorModule::Kernel, 117);
    pub const CANCELLED: ResultCode = ResultCode::new(ErrorModule::Kernel, 118);
    pub const NOT_FOUND: ResultCode = ResultCode::new(ErrorModule::Kernel, 121);
    pub const BUSY: ResultCode = ResultCode::new(ErrorModule::Kernel, 122);
    pub const SESSION_CLOSED: ResultCode = ResultCode::new(ErrorModule::Kernel, 123);
    pub const INVALID_STATE: ResultCode = ResultCode::new(ErrorModule::Kernel, 125);
    pub const NOT_SUPPORTED: ResultCode = ResultCode::new(ErrorModule::Kernel, 127);
    pub const PORT_CLOSED: ResultCode = ResultCode::new(ErrorModule::Kernel, 131);
    pub const LIMIT_REACHED: ResultCode = ResultCode::new(ErrorModule::Kernel, 132);
    pub const TERMINATION_REQUESTED: ResultCode = ResultCode::new(ErrorModule::Kernel, 59);
}

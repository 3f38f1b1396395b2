use mizu_result::{RESULT_UNKNOWN, ResultCode, ToResultCode, kernel as kerr};

/// Error returned by the [`Kernel`](crate::Kernel) primitives.
#[derive(Debug, thiserror::Error)]
pub enum ServctlError {
    /// The handle does not name a live kernel object.
    #[error("invalid handle")]
    InvalidHandle,
    /// The guest address is not mapped in the requester.
    #[error("invalid guest address")]
    InvalidAddress,
    /// The kernel handle table is full.
    #[error("out of handles")]
    OutOfHandles,
    /// The host ran out of memory.
    #[error("out of memory")]
    OutOfMemory,
    /// The session was closed by its peer.
    #[error("session closed")]
    SessionClosed,
    /// An argument was rejected.
    #[error("invalid argument")]
    InvalidArgument,
    /// The operation is not provided by this kernel.
    #[error("not supported")]
    NotSupported,
    /// The peer did not answer in time.
    #[error("timed out")]
    TimedOut,
    /// The calling thread was asked to terminate.
    #[error("thread terminated")]
    Terminated,
    /// Any other host failure.
    #[error("os error")]
    Os(#[source] std::io::Error),
}

impl ServctlError {
    /// Maps an `errno` value returned by the host module.
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::EBADF => Self::InvalidHandle,
            libc::EFAULT => Self::InvalidAddress,
            libc::EMFILE | libc::ENFILE => Self::OutOfHandles,
            libc::ENOMEM => Self::OutOfMemory,
            libc::EPIPE | libc::ECONNRESET => Self::SessionClosed,
            libc::EINVAL => Self::InvalidArgument,
            libc::ENOSYS | libc::EOPNOTSUPP => Self::NotSupported,
            libc::ETIMEDOUT => Self::TimedOut,
            libc::ESHUTDOWN => Self::Terminated,
            other => Self::Os(std::io::Error::from_raw_os_error(other)),
        }
    }

    /// Maps the calling thread's last `errno`.
    pub fn last_os_error() -> Self {
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(errno) => Self::from_errno(errno),
            None => Self::Os(err),
        }
    }
}

impl ToResultCode for ServctlError {
    fn to_result_code(&self) -> ResultCode {
        match self {
            Self::InvalidHandle => kerr::INVALID_HANDLE,
            Self::InvalidAddress => kerr::INVALID_CURRENT_MEMORY,
            Self::OutOfHandles => kerr::OUT_OF_HANDLES,
            Self::OutOfMemory => kerr::OUT_OF_MEMORY,
            Self::SessionClosed => kerr::SESSION_CLOSED,
            Self::InvalidArgument => kerr::INVALID_ARGUMENT,
            Self::NotSupported => kerr::NOT_SUPPORTED,
            Self::TimedOut => kerr::TIMED_OUT,
            Self::Terminated => kerr::TERMINATION_REQUESTED,
            Self::Os(_) => RESULT_UNKNOWN,
        }
    }
}

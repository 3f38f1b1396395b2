use mizu_result::{ERR_SF_INVALID_HEADER, ResultCode, ToResultCode};

/// Error returned by [`parse_request`](crate::parse_request).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The message type is neither a CMIF nor a TIPC command type.
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),
    /// The data payload does not start with `SFCI`.
    #[error("invalid payload magic {0:#010x}")]
    InvalidMagic(u32),
    /// The domain header names no known domain command.
    #[error("unknown domain command {0}")]
    UnknownDomainCommand(u8),
}

impl ToResultCode for ParseError {
    fn to_result_code(&self) -> ResultCode {
        ERR_SF_INVALID_HEADER
    }
}

/// Error returned by the client-side response parsers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseResponseError {
    /// Response contains invalid CMIF magic header.
    #[error("invalid CMIF magic header")]
    InvalidMagic,
    /// Response data words are empty.
    #[error("empty response data")]
    EmptyResponse,
    /// Service returned a non-zero result code.
    #[error("service error: {0}")]
    ServiceError(ResultCode),
}

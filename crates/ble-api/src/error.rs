//! Transport error type.

use thiserror::Error;

/// Error returned by any call into the transport stack.
///
/// Failures are handled locally by the caller: logged with the operation and
/// the numeric [`code`](BleError::code), fatal to the step being attempted,
/// never to the process.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleError {
    #[error("transport already initialized")]
    AlreadyInitialized,
    #[error("transport not initialized")]
    NotInitialized,
    #[error("unknown attribute handle")]
    InvalidHandle,
    #[error("data does not fit the available buffer")]
    BufferOverflow,
    #[error("transport operation failed with code {0}")]
    OperationFailed(u32),
}

impl BleError {
    /// Stable numeric code for diagnostic output.
    pub fn code(&self) -> u32 {
        match self {
            Self::AlreadyInitialized => 1,
            Self::NotInitialized => 2,
            Self::InvalidHandle => 3,
            Self::BufferOverflow => 4,
            Self::OperationFailed(code) => *code,
        }
    }
}

use std::{fmt, io, net};

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Outcome of a non-blocking network operation.
///
/// `Wait` means the operation made no progress and should be retried once the
/// underlying socket is ready again; it is not an error condition by itself.
#[derive(Debug)]
pub enum NetworkError {
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug)]
pub enum ErrorType {
    ProtocolMismatch,
    VersionMismatch,
    SequenceMismatch,
    PayloadTooLarge,
    EmptyPayload,
    IncorrectCategory,
    Serialization,
    AddrParse,
    Io(io::ErrorKind),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Wait => write!(f, "operation would block"),
            NetworkError::Fatal(kind) => write!(f, "fatal network error: {:?}", kind),
        }
    }
}

impl std::error::Error for NetworkError {}

impl From<io::Error> for NetworkError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetworkError {
    fn from(_: net::AddrParseError) -> Self {
        NetworkError::Fatal(ErrorType::AddrParse)
    }
}

pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetworkResult<T> {
    fn has_failed(&self) -> bool {
        matches!(self, Err(NetworkError::Fatal(_)))
    }
}

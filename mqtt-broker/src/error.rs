use std::fmt::{self, Display};

use mqtt_core::err::{DecodeError, EncodeError};

#[derive(Debug)]
pub struct ServerError {
    kind: ErrorKind,
    message: String,
}

impl ServerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Encode,
    Io,
    Protocol,
    Auth,
    Timeout,
}

impl Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ServerError {}

impl From<DecodeError> for ServerError {
    fn from(err: DecodeError) -> Self {
        Self::new(ErrorKind::Decode, err.to_string())
    }
}

impl From<EncodeError> for ServerError {
    fn from(err: EncodeError) -> Self {
        Self::new(ErrorKind::Encode, err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

// Codes follow the numbering in
// https://github.com/grpc/grpc/blob/master/doc/statuscodes.md

use std::fmt;

/// Outcome category of a call, encoded as a single byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Code {
    /// The call succeeded.
    Ok = 0,
    /// An unexpected fault happened inside the service.
    Unknown = 2,
    /// The request carried a value the service refuses to handle.
    InvalidArgument = 3,
    /// The client gave up waiting for the reply.
    DeadlineExceeded = 4,
    /// The framework itself failed to encode or decode a message.
    Internal = 13,
    /// The server could not be reached.
    Unavailable = 14,
}

impl Code {
    /// Parse a wire byte, `None` for codes this crate never sends.
    pub fn from_u8(value: u8) -> Option<Self> {
        let code = match value {
            0 => Code::Ok,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            13 => Code::Internal,
            14 => Code::Unavailable,
            _ => return None,
        };
        Some(code)
    }

    /// The wire byte of this code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Code::Ok => "OK",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
        };
        f.write_str(name)
    }
}

/// A failed call as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
}

macro_rules! status_ctor {
    ($name:ident, $code:ident) => {
        #[doc = concat!("A status with code `", stringify!($code), "`.")]
        pub fn $name<S: Into<String>>(message: S) -> Self {
            Status::new(Code::$code, message)
        }
    };
}

impl Status {
    /// Build a status from a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Status {
            code,
            message: message.into(),
        }
    }

    status_ctor!(unknown, Unknown);
    status_ctor!(invalid_argument, InvalidArgument);
    status_ctor!(deadline_exceeded, DeadlineExceeded);
    status_ctor!(internal, Internal);
    status_ctor!(unavailable, Unavailable);

    /// Category of the failure.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Human readable description sent by the server.
    pub fn message(&self) -> &str {
        &self.message
    }
}
